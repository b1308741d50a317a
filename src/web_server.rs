use actix_files::NamedFile;
use actix_web::dev::Payload;
use actix_web::http::header::{HeaderMap, AUTHORIZATION};
use actix_web::{web, App, FromRequest, HttpRequest, HttpResponse, HttpServer};
use futures::future::{ready, Ready};
use std::path::Path;
use std::sync::Arc;

use crate::backend::{Backend, RequestContext};
use crate::config::AppConfig;
use crate::criteria::{FilterCriteria, ImageQuery};
use crate::error::AppError;
use crate::model::{BatchPayload, BatchRequest, ImageId, ImageListResponse, ImageListing, ObjectUpdate, ProjectId};

const ACCESS_TOKEN_HEADER: &str = "x-access-token";
const SUBJECT_HEADER: &str = "x-user-sub";

/// Reads the caller's token from `Authorization: Bearer ..`, falling back to
/// the header the auth middleware injects.
fn context_from_headers(headers: &HeaderMap) -> Result<RequestContext, AppError> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);
    let injected = headers
        .get(ACCESS_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim);

    let token = bearer.or(injected).filter(|t| !t.is_empty()).ok_or(AppError::Unauthorized)?;
    let subject = headers
        .get(SUBJECT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    Ok(RequestContext {
        access_token: token.to_string(),
        subject,
    })
}

impl FromRequest for RequestContext {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = context_from_headers(req.headers());
        if result.is_err() {
            log::debug!("Rejected {} {}: no access token", req.method(), req.path());
        }
        ready(result)
    }
}

async fn index(app_config: web::Data<AppConfig>) -> Result<NamedFile, AppError> {
    let index_path = Path::new(&app_config.static_directory).join("index.html");
    NamedFile::open_async(&index_path).await.map_err(|e| {
        log::error!("Error serving {:?}: {}", index_path, e);
        AppError::Io(e)
    })
}

async fn get_images(
    backend: web::Data<Arc<dyn Backend>>,
    ctx: RequestContext,
    path: web::Path<ProjectId>,
    query: web::Query<ImageQuery>,
) -> Result<HttpResponse, AppError> {
    let project_id = path.into_inner();
    let criteria = FilterCriteria::from(query.into_inner());
    log::debug!("Received image list request for project {}: {:?}", project_id, criteria);

    let listing = match backend.list_images(&ctx, project_id, &criteria).await {
        Ok(listing) => listing,
        Err(AppError::NotFound(message)) => {
            log::debug!("No images for project {}: {}", project_id, message);
            ImageListing::default()
        }
        Err(e) => return Err(e),
    };

    Ok(HttpResponse::Ok().json(ImageListResponse::from(listing)))
}

async fn update_object(
    backend: web::Data<Arc<dyn Backend>>,
    ctx: RequestContext,
    path: web::Path<(ProjectId, ImageId)>,
    body: web::Json<ObjectUpdate>,
) -> Result<HttpResponse, AppError> {
    let (project_id, image_id) = path.into_inner();
    log::debug!("Updating image {} in project {}", image_id, project_id);
    backend.update_image(&ctx, project_id, image_id, &body).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Object updated successfully",
    })))
}

async fn batch_update(
    backend: web::Data<Arc<dyn Backend>>,
    ctx: RequestContext,
    path: web::Path<ProjectId>,
    body: web::Json<BatchPayload>,
) -> Result<HttpResponse, AppError> {
    let project_id = path.into_inner();
    let request = BatchRequest::try_from(body.into_inner())?;
    log::debug!(
        "Batch {} on {} images in project {}",
        request.operation.operation_type(),
        request.object_ids.len(),
        project_id
    );
    backend.batch_update(&ctx, project_id, &request).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": format!("Successfully updated {} objects", request.object_ids.len()),
    })))
}

async fn reset_project(
    backend: web::Data<Arc<dyn Backend>>,
    ctx: RequestContext,
    path: web::Path<ProjectId>,
) -> Result<HttpResponse, AppError> {
    let project_id = path.into_inner();
    log::info!("Resetting project {}", project_id);
    backend.reset_project(&ctx, project_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Project reset successfully",
    })))
}

async fn reset_cluster(
    backend: web::Data<Arc<dyn Backend>>,
    ctx: RequestContext,
    path: web::Path<(ProjectId, String)>,
) -> Result<HttpResponse, AppError> {
    let (project_id, cluster) = path.into_inner();
    log::info!("Resetting cluster '{}' of project {}", cluster, project_id);
    backend.reset_cluster(&ctx, project_id, &cluster).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Cluster reset successfully",
    })))
}

async fn get_project(
    backend: web::Data<Arc<dyn Backend>>,
    ctx: RequestContext,
    path: web::Path<ProjectId>,
) -> Result<HttpResponse, AppError> {
    let project_id = path.into_inner();
    let summary = backend.project_summary(&ctx, project_id).await?;
    Ok(HttpResponse::Ok().json(summary))
}

/// The `/api` routes. `/reset` is registered ahead of `/{image_id}` so it is
/// not swallowed by the image route.
pub fn api_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/images/{project_id}").route(web::get().to(get_images)))
        .service(web::resource("/api/objects/{project_id}/reset").route(web::post().to(reset_project)))
        .service(web::resource("/api/objects/{project_id}/{image_id}").route(web::put().to(update_object)))
        .service(web::resource("/api/objects/{project_id}").route(web::post().to(batch_update)))
        .service(web::resource("/api/clusters/{project_id}/{cluster}/reset").route(web::post().to(reset_cluster)))
        .service(web::resource("/api/project/{project_id}").route(web::get().to(get_project)));
}

pub async fn start_web_server(config: Arc<AppConfig>, backend: Arc<dyn Backend>) -> std::io::Result<()> {
    let port = config.web_port;
    let static_directory = config.static_directory.clone();
    let config_data = web::Data::from(config);
    let backend_data = web::Data::new(backend);

    log::info!("Starting web server on port: {}", port);
    log::debug!("Serving static files from {}", static_directory);

    HttpServer::new(move || {
        App::new()
            .app_data(config_data.clone())
            .app_data(backend_data.clone())
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                AppError::BadRequest(err.to_string()).into()
            }))
            .configure(api_routes)
            .service(actix_files::Files::new("/static", &static_directory))
            .default_service(web::to(index))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
