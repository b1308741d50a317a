use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::backend::{Backend, RequestContext};
use crate::error::AppError;
use crate::model::{ProjectId, ProjectStats, ProjectSummary};

#[derive(Debug, Default)]
struct StatsState {
    summary: Option<ProjectSummary>,
    stale: bool,
    last_error: Option<String>,
    requested: u64,
    applied: u64,
}

/// Keeps the per-cluster and per-tag counts of a project in sync after
/// edits. Failures never reach the edit that triggered the refresh; they only
/// mark the statistics as stale.
#[derive(Clone)]
pub struct StatsRefresher {
    backend: Arc<dyn Backend>,
    ctx: RequestContext,
    project_id: ProjectId,
    state: Arc<RwLock<StatsState>>,
}

impl StatsRefresher {
    pub fn new(backend: Arc<dyn Backend>, ctx: RequestContext, project_id: ProjectId) -> Self {
        Self {
            backend,
            ctx,
            project_id,
            state: Arc::new(RwLock::new(StatsState::default())),
        }
    }

    pub async fn summary(&self) -> Option<ProjectSummary> {
        self.state.read().await.summary.clone()
    }

    pub async fn stats(&self) -> Option<ProjectStats> {
        self.state.read().await.summary.as_ref().map(|s| s.stats.clone())
    }

    /// True when the last refresh failed and the counts may be behind.
    pub async fn is_stale(&self) -> bool {
        self.state.read().await.stale
    }

    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    /// Fetches fresh statistics. A response older than one already applied is
    /// dropped.
    pub async fn refresh(&self) -> Result<(), AppError> {
        let ticket = {
            let mut state = self.state.write().await;
            state.requested += 1;
            state.requested
        };

        let result = self.backend.project_summary(&self.ctx, self.project_id).await;

        let mut state = self.state.write().await;
        if ticket < state.applied {
            log::debug!("Dropping out-of-order statistics response {}", ticket);
            return Ok(());
        }
        state.applied = ticket;
        match result {
            Ok(summary) => {
                log::debug!(
                    "Statistics refreshed: {} clusters, {} tags",
                    summary.stats.clusters.len(),
                    summary.stats.tags.len()
                );
                state.summary = Some(summary);
                state.stale = false;
                state.last_error = None;
                Ok(())
            }
            Err(e) => {
                log::warn!("Statistics refresh for project {} failed: {}", self.project_id, e);
                state.stale = true;
                state.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Fire-and-forget refresh.
    pub fn spawn_refresh(&self) -> JoinHandle<()> {
        let refresher = self.clone();
        tokio::spawn(async move {
            // the error is already recorded as staleness
            let _ = refresher.refresh().await;
        })
    }
}
