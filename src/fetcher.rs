use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::backend::{Backend, RequestContext};
use crate::criteria::FilterCriteria;
use crate::error::AppError;
use crate::model::ProjectId;
use crate::store::ImageStore;

pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_secs(30);
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The listing replaced the working set.
    Loaded(usize),
    /// Nothing to fetch: no project or empty criteria.
    Skipped,
    /// A newer criteria set was applied while this request was in flight.
    Superseded,
}

#[derive(Debug, Default)]
struct FetchState {
    project_id: Option<ProjectId>,
    criteria: FilterCriteria,
    generation: u64,
    expires_at: Option<Instant>,
}

/// Loads the image list for the applied criteria and keeps its signed URLs
/// fresh.
#[derive(Clone)]
pub struct ImageFetcher {
    backend: Arc<dyn Backend>,
    ctx: RequestContext,
    store: ImageStore,
    state: Arc<RwLock<FetchState>>,
    safety_margin: Duration,
}

impl ImageFetcher {
    pub fn new(backend: Arc<dyn Backend>, ctx: RequestContext, store: ImageStore) -> Self {
        Self::with_safety_margin(backend, ctx, store, DEFAULT_SAFETY_MARGIN)
    }

    pub fn with_safety_margin(
        backend: Arc<dyn Backend>,
        ctx: RequestContext,
        store: ImageStore,
        safety_margin: Duration,
    ) -> Self {
        Self {
            backend,
            ctx,
            store,
            state: Arc::new(RwLock::new(FetchState::default())),
            safety_margin,
        }
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }

    pub async fn criteria(&self) -> FilterCriteria {
        self.state.read().await.criteria.clone()
    }

    pub async fn project_id(&self) -> Option<ProjectId> {
        self.state.read().await.project_id
    }

    #[cfg(test)]
    pub(crate) async fn expires_at(&self) -> Option<Instant> {
        self.state.read().await.expires_at
    }

    /// Switches to a new criteria set. The working set is emptied before the
    /// request goes out so images of the previous filter are never shown under
    /// the new one.
    pub async fn apply(&self, project_id: ProjectId, criteria: FilterCriteria) -> Result<FetchOutcome, AppError> {
        let generation = {
            let mut state = self.state.write().await;
            state.generation += 1;
            state.project_id = Some(project_id);
            state.criteria = criteria.clone();
            state.expires_at = None;
            if criteria.is_empty() {
                self.store.replace(Vec::new()).await;
            } else {
                self.store.begin_loading().await;
            }
            state.generation
        };
        log::debug!(
            "Applied criteria generation {} for project {}: {:?}",
            generation,
            project_id,
            criteria
        );

        self.fetch_generation(generation, Some(project_id), criteria).await
    }

    /// Re-runs the last applied criteria.
    pub async fn fetch(&self) -> Result<FetchOutcome, AppError> {
        let (generation, project_id, criteria) = {
            let state = self.state.read().await;
            (state.generation, state.project_id, state.criteria.clone())
        };
        self.fetch_generation(generation, project_id, criteria).await
    }

    /// Re-fetches once if the signed URLs of the last listing are about to
    /// expire. Returns `None` when no refresh was due.
    pub async fn refresh_if_expired(&self) -> Result<Option<FetchOutcome>, AppError> {
        let (marker, generation, project_id, criteria) = {
            let mut state = self.state.write().await;
            match state.expires_at {
                Some(at) if Instant::now() >= at => {
                    // taken so overlapping ticks cannot refresh twice
                    state.expires_at = None;
                    (at, state.generation, state.project_id, state.criteria.clone())
                }
                _ => return Ok(None),
            }
        };

        log::info!("Signed URLs expired, refreshing image list");
        match self.fetch_generation(generation, project_id, criteria).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) => {
                let mut state = self.state.write().await;
                if state.generation == generation && state.expires_at.is_none() {
                    state.expires_at = Some(marker);
                }
                Err(e)
            }
        }
    }

    async fn fetch_generation(
        &self,
        generation: u64,
        project_id: Option<ProjectId>,
        criteria: FilterCriteria,
    ) -> Result<FetchOutcome, AppError> {
        let Some(project_id) = project_id else {
            log::debug!("No project selected, skipping image fetch");
            return Ok(FetchOutcome::Skipped);
        };
        if criteria.is_empty() {
            log::debug!("All filter criteria are empty, skipping image fetch");
            return Ok(FetchOutcome::Skipped);
        }

        log::debug!("Fetching images for project {} (generation {})", project_id, generation);
        let result = self.backend.list_images(&self.ctx, project_id, &criteria).await;

        let mut state = self.state.write().await;
        if state.generation != generation {
            log::debug!(
                "Discarding image list for generation {}, current is {}",
                generation,
                state.generation
            );
            return Ok(FetchOutcome::Superseded);
        }

        match result {
            Ok(listing) => {
                let count = listing.images.len();
                state.expires_at = listing
                    .expiration_seconds
                    .map(|secs| Instant::now() + Duration::from_secs(secs).saturating_sub(self.safety_margin));
                self.store.replace(listing.images).await;
                log::info!("Loaded {} images for project {}", count, project_id);
                Ok(FetchOutcome::Loaded(count))
            }
            Err(e) => {
                log::error!("Failed to fetch images for project {}: {}", project_id, e);
                self.store.fail_loading(e.to_string()).await;
                Err(e)
            }
        }
    }

    /// Starts the periodic expiry check. The task stops when the returned
    /// handle is dropped.
    pub fn spawn_refresh_loop(&self, period: Duration) -> RefreshLoop {
        let fetcher = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // the first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = fetcher.refresh_if_expired().await {
                    log::warn!("Background image refresh failed: {}", e);
                }
            }
        });
        RefreshLoop { handle }
    }
}

/// Owner of a running refresh loop.
#[derive(Debug)]
pub struct RefreshLoop {
    handle: JoinHandle<()>,
}

impl Drop for RefreshLoop {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
