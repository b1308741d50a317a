use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::backend::{Backend, RequestContext};
use crate::criteria::FilterCriteria;
use crate::error::AppError;
use crate::model::{
    BatchPayload, BatchRequest, ImageId, ImageListResponse, ImageListing, ObjectUpdate, ProjectId, ProjectSummary,
};

use super::{base_url, ensure_success, http_client, join_segments, read_body};

/// Talks to the dashboard's own `/api` routes.
pub struct ProxyClient {
    client: Client,
    base: Url,
}

impl ProxyClient {
    pub fn new(base: &str, timeout: Duration) -> Result<Self, AppError> {
        log::debug!("Creating proxy client for {}", base);
        Ok(Self {
            client: http_client(timeout)?,
            base: base_url(base)?,
        })
    }

    fn listing_url(&self, project_id: ProjectId, criteria: &FilterCriteria) -> Result<Url, AppError> {
        let mut url = self.base.join(&format!("api/images/{}", project_id))?;
        let pairs = criteria.query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
        Ok(url)
    }

    fn objects_url(&self, project_id: ProjectId, suffix: Option<&str>) -> Result<Url, AppError> {
        let path = match suffix {
            Some(suffix) => format!("api/objects/{}/{}", project_id, suffix),
            None => format!("api/objects/{}", project_id),
        };
        Ok(self.base.join(&path)?)
    }
}

fn parse_listing(status: u16, body: &str) -> Result<ImageListing, AppError> {
    if status == 404 {
        return Ok(ImageListing::default());
    }
    ensure_success(status, body)?;
    let response: ImageListResponse = serde_json::from_str(body)?;
    Ok(response.into())
}

#[async_trait]
impl Backend for ProxyClient {
    async fn list_images(
        &self,
        ctx: &RequestContext,
        project_id: ProjectId,
        criteria: &FilterCriteria,
    ) -> Result<ImageListing, AppError> {
        let url = self.listing_url(project_id, criteria)?;
        log::debug!("GET {}", url);
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
        let url = self.objects_url(project_id, Some(&image_id.to_string()))?;
        log::debug!("PUT {}", url);
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
        let url = self.objects_url(project_id, None)?;
        log::debug!("POST {} ({} objects)", url, request.object_ids.len());
        let response = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, ctx.bearer())
            .json(&BatchPayload::from(request))
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
        let url = self.base.join(&format!("api/project/{}", project_id))?;
        let response = self
            .client
            .get(url)
            .header(reqwest::header::AUTHORIZATION, ctx.bearer())
            .send()
            .await?;
        let (status, body) = read_body(response).await?;
        ensure_success(status, &body)?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn reset_project(&self, ctx: &RequestContext, project_id: ProjectId) -> Result<(), AppError> {
        let url = self.objects_url(project_id, Some("reset"))?;
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
