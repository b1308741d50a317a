//! One project page: the search sidebar, the paginated grid and the editor,
//! wired the way the dashboard page wires them.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Backend, RequestContext};
use crate::config::AppConfig;
use crate::criteria::FilterCriteria;
use crate::editor::ImageEditor;
use crate::error::AppError;
use crate::fetcher::{FetchOutcome, ImageFetcher, RefreshLoop, DEFAULT_REFRESH_INTERVAL, DEFAULT_SAFETY_MARGIN};
use crate::model::{Image, ProjectId};
use crate::pagination::{page_count, Paginator, DEFAULT_PAGE_SIZE};
use crate::search::SearchController;
use crate::stats::StatsRefresher;
use crate::store::ImageStore;
use crate::validation::validate_cluster_name;

#[derive(Debug, Clone, Copy)]
pub struct ViewSettings {
    pub page_size: usize,
    pub refresh_interval: Duration,
    pub safety_margin: Duration,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            safety_margin: DEFAULT_SAFETY_MARGIN,
        }
    }
}

impl From<&AppConfig> for ViewSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            page_size: config.page_size,
            refresh_interval: Duration::from_secs(config.refresh_interval_secs),
            safety_margin: Duration::from_secs(config.expiry_safety_margin_secs),
        }
    }
}

/// The rendered state of the current grid page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub images: Vec<Image>,
    pub page: usize,
    pub page_count: usize,
    pub total: usize,
    pub loading: bool,
    pub error: Option<String>,
}

pub struct ProjectView {
    backend: Arc<dyn Backend>,
    ctx: RequestContext,
    project_id: ProjectId,
    settings: ViewSettings,
    search: SearchController,
    fetcher: ImageFetcher,
    editor: ImageEditor,
    stats: StatsRefresher,
    paginator: Paginator,
    refresh: Option<RefreshLoop>,
}

impl ProjectView {
    pub fn new(backend: Arc<dyn Backend>, ctx: RequestContext, project_id: ProjectId, settings: ViewSettings) -> Self {
        let store = ImageStore::new();
        let stats = StatsRefresher::new(backend.clone(), ctx.clone(), project_id);
        let fetcher =
            ImageFetcher::with_safety_margin(backend.clone(), ctx.clone(), store.clone(), settings.safety_margin);
        let editor = ImageEditor::new(backend.clone(), ctx.clone(), project_id, store, stats.clone());

        Self {
            backend,
            ctx,
            project_id,
            settings,
            search: SearchController::new(),
            fetcher,
            editor,
            stats,
            paginator: Paginator::new(settings.page_size),
            refresh: None,
        }
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn search(&self) -> &SearchController {
        &self.search
    }

    pub fn search_mut(&mut self) -> &mut SearchController {
        &mut self.search
    }

    pub fn editor(&self) -> &ImageEditor {
        &self.editor
    }

    pub fn editor_mut(&mut self) -> &mut ImageEditor {
        &mut self.editor
    }

    pub fn stats(&self) -> &StatsRefresher {
        &self.stats
    }

    pub fn fetcher(&self) -> &ImageFetcher {
        &self.fetcher
    }

    pub fn is_refreshing(&self) -> bool {
        self.refresh.is_some()
    }

    /// Submits the sidebar. A rejected submit leaves the applied criteria and
    /// the grid as they were.
    pub async fn submit_search(&mut self) -> Result<FetchOutcome, AppError> {
        self.search.submit()?;
        match self.search.take_triggered() {
            Some(criteria) => self.apply(criteria).await,
            None => Ok(FetchOutcome::Skipped),
        }
    }

    /// Clears the sidebar and the grid.
    pub async fn clear_search(&mut self) -> Result<FetchOutcome, AppError> {
        self.search.clear();
        self.apply(FilterCriteria::default()).await
    }

    async fn apply(&mut self, criteria: FilterCriteria) -> Result<FetchOutcome, AppError> {
        // the old loop belongs to the old criteria
        self.refresh = None;
        self.paginator.reset();
        self.editor.clear_selection();
        self.editor
            .set_view_cluster(criteria.single_cluster().map(str::to_string));

        let empty = criteria.is_empty();
        let outcome = self.fetcher.apply(self.project_id, criteria).await;
        if !empty {
            self.refresh = Some(self.fetcher.spawn_refresh_loop(self.settings.refresh_interval));
        }
        outcome
    }

    /// Moves every image back to its original cluster, then reloads the grid
    /// and the statistics.
    pub async fn reset_project(&mut self) -> Result<FetchOutcome, AppError> {
        self.backend.reset_project(&self.ctx, self.project_id).await?;
        log::info!("Project {} reset to original clusters", self.project_id);
        self.editor.clear_selection();
        self.stats.spawn_refresh();
        self.fetcher.fetch().await
    }

    /// Undoes every move into or out of `cluster`, then reloads the grid and
    /// the statistics.
    pub async fn reset_cluster(&mut self, cluster: &str) -> Result<FetchOutcome, AppError> {
        validate_cluster_name(cluster)?;
        self.backend.reset_cluster(&self.ctx, self.project_id, cluster).await?;
        log::info!("Cluster '{}' of project {} reset", cluster, self.project_id);
        self.editor.clear_selection();
        self.stats.spawn_refresh();
        self.fetcher.fetch().await
    }

    pub fn go_to_page(&mut self, page: usize) {
        self.paginator.go_to(page);
    }

    /// The current page, after pulling the page number back to 1 if edits
    /// shrank the list below it.
    pub async fn page(&mut self) -> Page {
        let snapshot = self.fetcher.store().snapshot().await;
        let total = snapshot.images.len();
        self.paginator.clamp(total);
        Page {
            images: self.paginator.slice(&snapshot.images).to_vec(),
            page: self.paginator.page(),
            page_count: page_count(total, self.paginator.page_size()),
            total,
            loading: snapshot.loading,
            error: snapshot.error,
        }
    }

    /// Selects every image on the current page for batch editing.
    pub async fn select_page(&mut self) {
        let ids: Vec<_> = self.page().await.images.iter().map(|i| i.id).collect();
        self.editor.select_all(ids);
    }
}
