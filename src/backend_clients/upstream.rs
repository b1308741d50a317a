use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::backend::{Backend, RequestContext};
use crate::criteria::FilterCriteria;
use crate::error::AppError;
use crate::model::{
    BatchOperation, BatchRequest, Image, ImageId, ImageListing, ObjectUpdate, Project, ProjectId, ProjectStats,
    ProjectSummary,
};

use super::{base_url, ensure_success, http_client, join_segments, read_body};

#[derive(Debug, Deserialize)]
struct StorageListing {
    #[serde(default)]
    data: Vec<Image>,
    #[serde(default)]
    expiration_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
struct StorageBatch<'a> {
    object_ids: &'a [ImageId],
    operations: &'a BatchOperation,
}

#[derive(Debug, Deserialize)]
struct StorageProject {
    data: Project,
    #[serde(default)]
    statistics: ProjectStats,
}

/// Client of the storage/projects service behind the proxy.
pub struct UpstreamClient {
    client: Client,
    base: Url,
}

impl UpstreamClient {
    pub fn new(base: &str, timeout: Duration) -> Result<Self, AppError> {
        log::debug!("Creating storage service client for {}", base);
        Ok(Self {
            client: http_client(timeout)?,
            base: base_url(base)?,
        })
    }

    fn storage_url(&self, path: &str) -> Result<Url, AppError> {
        Ok(self.base.join(&format!("api/storage/{}", path))?)
    }

    fn listing_url(&self, project_id: ProjectId, criteria: &FilterCriteria) -> Result<Url, AppError> {
        let mut url = self.storage_url(&format!("{}/get_images", project_id))?;
        let pairs = criteria.query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url)
    }
}

/// The storage service answers 404 when a filter matches nothing; that is an
/// ordinary empty result for the dashboard.
fn parse_listing(status: u16, body: &str) -> Result<ImageListing, AppError> {
    if status == 404 {
        log::debug!("Storage service found no images, returning empty listing");
        return Ok(ImageListing::default());
    }
    ensure_success(status, body)?;
    let listing: StorageListing = serde_json::from_str(body)?;
    Ok(ImageListing {
        images: listing.data,
        expiration_seconds: listing.expiration_seconds,
    })
}

fn parse_project(status: u16, body: &str) -> Result<ProjectSummary, AppError> {
    ensure_success(status, body)?;
    let project: StorageProject = serde_json::from_str(body)?;
    Ok(ProjectSummary {
        data: project.data,
        stats: project.statistics,
    })
}

#[async_trait]
impl Backend for UpstreamClient {
    async fn list_images(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
        criteria: &FilterCriteria,
    ) -> Result<ImageListing, AppError> {
        let url = self.listing_url(project_id, criteria)?;
        log::debug!("Upstream GET {}", url);
        let response = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, ctx.bearer())
            .send()
            .await?;
        let (status, body) = read_body(response).await?;
        parse_listing(status, &body)
    }

    async fn update_image(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
        image_id: ImageId,
        update: &ObjectUpdate,
    ) -> Result<(), AppError> {
        let url = self.storage_url(&format!("{}/{}", project_id, image_id))?;
        log::debug!("Upstream PUT {}", url);
        let response = self
            .client
            .put(url)
            .header(reqwest::header::AUTHORIZATION, ctx.bearer())
            .json(update)
            .send()
            .await?;
        let (status, body) = read_body(response).await?;
        ensure_success(status, &body)
    }

    async fn batch_update(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
        request: &BatchRequest,
    ) -> Result<(), AppError> {
        let url = self.storage_url(&format!("{}/batch_update", project_id))?;
        log::debug!(
            "Upstream POST {} ({} on {} objects)",
            url,
            request.operation.operation_type(),
            request.object_ids.len()
        );
        let response = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, ctx.bearer())
            .json(&StorageBatch {
                object_ids: &request.object_ids,
                operations: &request.operation,
            })
            .send()
            .await?;
        let (status, body) = read_body(response).await?;
        ensure_success(status, &body)
    }

    async fn project_summary(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
    ) -> Result<ProjectSummary, AppError> {
        let mut url = self.base.join(&format!("api/projects/{}", project_id))?;
        url.query_pairs_mut().append_pair("include_stats", "true");
        let response = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, ctx.bearer())
            .send()
            .await?;
        let (status, body) = read_body(response).await?;
        parse_project(status, &body)
    }

    async fn reset_project(&self, ctx: &RequestContext, project_id: ProjectId) -> Result<(), AppError> {
        let url = self.storage_url(&format!("{}/reset", project_id))?;
        log::info!("Upstream POST {}", url);
        let response = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, ctx.bearer())
            .send()
            .await?;
        let (status, body) = read_body(response).await?;
        ensure_success(status, &body)
    }

    async fn reset_cluster(&self, ctx: &RequestContext, project_id: ProjectId, cluster: &str) -> Result<(), AppError> {
        let url = join_segments(&self.base, &["api", "clusters", project_id.to_string().as_str(), cluster, "reset"])?;
        log::info!("Upstream POST {}", url);
        let response = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, ctx.bearer())
            .send()
            .await?;
        let (status, body) = read_body(response).await?;
        ensure_success(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn not_found_listing_is_empty_success() {
        let body = r#"{"error": "No objects found", "details": "No objects found"}"#;
        assert_eq!(parse_listing(404, body).unwrap(), ImageListing::default());
    }

    #[test]
    fn listing_keeps_expiration() {
        let body = json!({
            "data": [
                {"id": 1, "name": "a", "url": "https://s/a.png", "tags": ["x"], "cluster_id": 2, "original_cluster": 1}
            ],
            "expiration_seconds": 86400,
            "cached": false
        })
        .to_string();
        let listing = parse_listing(200, &body).unwrap();
        assert_eq!(listing.expiration_seconds, Some(86400));
        assert!(listing.images[0].is_relocated());
    }

    #[test]
    fn other_failures_propagate() {
        let err = parse_listing(400, r#"{"error": "Clusters not found: x"}"#).unwrap_err();
        assert!(matches!(err, AppError::Backend { status: 400, .. }));
    }

    #[test]
    fn project_statistics_are_renamed() {
        let body = json!({
            "data": {"id": 3, "project_name": "Birds"},
            "cached": false,
            "statistics": {
                "clusters": [{"name": "1", "frequency": 12, "label": null}],
                "tags": [{"name": "red", "frequency": 2}]
            }
        })
        .to_string();
        let summary = parse_project(200, &body).unwrap();
        assert_eq!(summary.data.project_name, "Birds");
        assert_eq!(summary.stats.clusters[0].frequency, 12);
        assert_eq!(summary.stats.clusters[0].label, "");
        assert_eq!(summary.stats.tags[0].name, "red");
    }

    #[test]
    fn batch_body_uses_operations_map() {
        let request = BatchRequest {
            object_ids: vec![1, 2],
            operation: BatchOperation::AddTags(vec!["a".into()]),
        };
        let body = serde_json::to_value(StorageBatch {
            object_ids: &request.object_ids,
            operations: &request.operation,
        })
        .unwrap();
        assert_eq!(body, json!({"object_ids": [1, 2], "operations": {"add_tags": ["a"]}}));
    }

    #[test]
    fn listing_url_targets_storage_blueprint() {
        let client = UpstreamClient::new("http://backend:5000", Duration::from_secs(5)).unwrap();
        let url = client
            .listing_url(8, &FilterCriteria { tags: vec!["a".into()], ..FilterCriteria::default() })
            .unwrap();
        assert_eq!(url.path(), "/api/storage/8/get_images");
        assert_eq!(url.query(), Some("tags_list=a"));
    }
}
