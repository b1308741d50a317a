use crate::criteria::FilterCriteria;
use crate::error::AppError;
use crate::model::{BatchRequest, ImageId, ImageListing, ObjectUpdate, ProjectId, ProjectSummary};
use async_trait::async_trait;

/// Authentication context for one backend call. Built at the edge for every
/// request and handed down explicitly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub access_token: String,
    pub subject: Option<String>,
}

impl RequestContext {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            subject: None,
        }
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// The image/cluster/project service, as seen by the dashboard core.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Lists images matching `criteria`. "No images found" is an empty listing,
    /// never an error.
    async fn list_images(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
        criteria: &FilterCriteria,
    ) -> Result<ImageListing, AppError>;

    async fn update_image(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
        image_id: ImageId,
        update: &ObjectUpdate,
    ) -> Result<(), AppError>;

    async fn batch_update(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
        request: &BatchRequest,
    ) -> Result<(), AppError>;

    async fn project_summary(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
    ) -> Result<ProjectSummary, AppError>;

    /// Moves every image of the project back to its original cluster.
    async fn reset_project(&self, ctx: &RequestContext, project_id: ProjectId) -> Result<(), AppError>;

    /// Undoes every move into or out of one cluster, addressed by label.
    async fn reset_cluster(&self, ctx: &RequestContext, project_id: ProjectId, cluster: &str)
        -> Result<(), AppError>;
}

#[cfg(test)]
pub mod testing {
    //! In-memory backend that records every call it receives.

    use super::*;
    use crate::model::{Image, Project, ProjectStats};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        List(ProjectId, FilterCriteria),
        Update(ProjectId, ImageId, ObjectUpdate),
        Batch(ProjectId, BatchRequest),
        Summary(ProjectId),
        Reset(ProjectId),
        ResetCluster(ProjectId, String),
    }

    #[derive(Default)]
    struct Inner {
        calls: Vec<Call>,
        listings: VecDeque<Result<ImageListing, (u16, String)>>,
        fail_updates: bool,
        fail_batches: bool,
        fail_summary: bool,
        list_delay: VecDeque<Duration>,
        last_context: Option<RequestContext>,
    }

    #[derive(Clone, Default)]
    pub struct RecordingBackend {
        inner: Arc<Mutex<Inner>>,
    }

    impl RecordingBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push_listing(&self, images: Vec<Image>, expiration_seconds: Option<u64>) {
            self.inner.lock().unwrap().listings.push_back(Ok(ImageListing {
                images,
                expiration_seconds,
            }));
        }

        pub fn push_listing_error(&self, message: &str) {
            self.push_listing_status(500, message);
        }

        pub fn push_listing_status(&self, status: u16, message: &str) {
            self.inner
                .lock()
                .unwrap()
                .listings
                .push_back(Err((status, message.to_string())));
        }

        /// Delays the next listing response; consumed in order.
        pub fn push_list_delay(&self, delay: Duration) {
            self.inner.lock().unwrap().list_delay.push_back(delay);
        }

        pub fn fail_updates(&self, fail: bool) {
            self.inner.lock().unwrap().fail_updates = fail;
        }

        pub fn fail_batches(&self, fail: bool) {
            self.inner.lock().unwrap().fail_batches = fail;
        }

        pub fn fail_summary(&self, fail: bool) {
            self.inner.lock().unwrap().fail_summary = fail;
        }

        pub fn calls(&self) -> Vec<Call> {
            self.inner.lock().unwrap().calls.clone()
        }

        pub fn last_context(&self) -> Option<RequestContext> {
            self.inner.lock().unwrap().last_context.clone()
        }

        pub fn list_calls(&self) -> usize {
            self.calls().iter().filter(|c| matches!(c, Call::List(..))).count()
        }

        pub fn mutation_calls(&self) -> Vec<Call> {
            self.calls()
                .into_iter()
                .filter(|c| {
                    matches!(c, Call::Update(..) | Call::Batch(..) | Call::Reset(..) | Call::ResetCluster(..))
                })
                .collect()
        }
    }

    pub fn image(id: ImageId, cluster_id: &str, tags: &[&str]) -> Image {
        Image {
            id,
            name: Some(format!("img_{id}")),
            url: Some(format!("https://storage.test/{id}.png?token=abc")),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            cluster_id: cluster_id.to_string(),
            original_cluster: cluster_id.to_string(),
        }
    }

    #[async_trait]
    impl Backend for RecordingBackend {
        async fn list_images(
            &self,
            ctx: &RequestContext,
            project_id: ProjectId,
            criteria: &FilterCriteria,
        ) -> Result<ImageListing, AppError> {
            let (delay, next) = {
                let mut inner = self.inner.lock().unwrap();
                inner.last_context = Some(ctx.clone());
                inner.calls.push(Call::List(project_id, criteria.clone()));
                (inner.list_delay.pop_front(), inner.listings.pop_front())
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            match next {
                Some(Ok(listing)) => Ok(listing),
                Some(Err((status, message))) => Err(AppError::from_status(status, &message)),
                None => Ok(ImageListing::default()),
            }
        }

        async fn update_image(
            &self,
            _ctx: &RequestContext,
            project_id: ProjectId,
            image_id: ImageId,
            update: &ObjectUpdate,
        ) -> Result<(), AppError> {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(Call::Update(project_id, image_id, update.clone()));
            if inner.fail_updates {
                return Err(AppError::Backend { status: 500, message: "update failed".into() });
            }
            Ok(())
        }

        async fn batch_update(
            &self,
            _ctx: &RequestContext,
            project_id: ProjectId,
            request: &BatchRequest,
        ) -> Result<(), AppError> {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(Call::Batch(project_id, request.clone()));
            if inner.fail_batches {
                return Err(AppError::Backend { status: 500, message: "batch failed".into() });
            }
            Ok(())
        }

        async fn project_summary(
            &self,
            _ctx: &RequestContext,
            project_id: ProjectId,
        ) -> Result<ProjectSummary, AppError> {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(Call::Summary(project_id));
            if inner.fail_summary {
                return Err(AppError::Backend { status: 500, message: "stats failed".into() });
            }
            Ok(ProjectSummary {
                data: Project {
                    id: project_id,
                    project_name: "Test".into(),
                    created_at: None,
                },
                stats: ProjectStats::default(),
            })
        }

        async fn reset_project(&self, _ctx: &RequestContext, project_id: ProjectId) -> Result<(), AppError> {
            self.inner.lock().unwrap().calls.push(Call::Reset(project_id));
            Ok(())
        }

        async fn reset_cluster(
            &self,
            _ctx: &RequestContext,
            project_id: ProjectId,
            cluster: &str,
        ) -> Result<(), AppError> {
            self.inner
                .lock()
                .unwrap()
                .calls
                .push(Call::ResetCluster(project_id, cluster.to_string()));
            Ok(())
        }
    }
}
