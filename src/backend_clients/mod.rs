//! HTTP implementations of [`Backend`](crate::backend::Backend).

pub mod proxy;
pub mod upstream;

use std::time::Duration;

use reqwest::Client;
use url::Url;

use crate::error::AppError;

pub(crate) fn http_client(timeout: Duration) -> Result<Client, AppError> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(concat!("clusterize/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Parses `base` so that relative joins append to its path instead of
/// replacing the last segment.
pub(crate) fn base_url(base: &str) -> Result<Url, AppError> {
    let mut url = Url::parse(base)?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

/// Joins `segments` onto `base`, percent-encoding each one.
pub(crate) fn join_segments(base: &Url, segments: &[&str]) -> Result<Url, AppError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| AppError::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Reads the response body, turning non-2xx statuses into errors.
pub(crate) async fn read_body(response: reqwest::Response) -> Result<(u16, String), AppError> {
    let status = response.status().as_u16();
    let body = response.text().await?;
    log::trace!("Backend responded {} with {} bytes", status, body.len());
    Ok((status, body))
}

pub(crate) fn ensure_success(status: u16, body: &str) -> Result<(), AppError> {
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(AppError::from_status(status, body))
    }
}
