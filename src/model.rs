use serde::{Deserialize, Deserializer, Serialize};

use crate::error::AppError;

pub type ImageId = i64;
pub type ProjectId = i64;

/// One managed image as returned by the listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: ImageId,
    #[serde(default)]
    pub name: Option<String>,
    /// Time-limited signed URL; `None` when the storage service failed to sign it.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
    /// Storage row id of the current cluster. Filters and moves address
    /// clusters by label, so this is only ever compared with `original_cluster`.
    #[serde(alias = "cluster", deserialize_with = "string_or_number")]
    pub cluster_id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub original_cluster: String,
}

impl Image {
    /// An image is relocated once it no longer sits in the cluster it was
    /// uploaded into.
    pub fn is_relocated(&self) -> bool {
        !self.original_cluster.is_empty() && self.cluster_id != self.original_cluster
    }

    /// Appends tags that are not already present, keeping existing order.
    /// Returns whether anything was added.
    pub fn merge_tags<'a, I>(&mut self, tags: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut changed = false;
        for tag in tags {
            if !self.tags.contains(tag) {
                self.tags.push(tag.clone());
                changed = true;
            }
        }
        changed
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Cluster ids arrive as numbers from the storage service and as strings from
/// older payloads, so both are accepted and held as text.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "expected cluster as string or number, got {other}"
        ))),
    }
}

/// Result of one image-list request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImageListing {
    pub images: Vec<Image>,
    /// Lifetime of the signed URLs, as declared by the server.
    pub expiration_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ImageListData {
    #[serde(default)]
    pub data: Vec<Image>,
}

/// Proxy response for `GET /api/images/{project_id}`.
#[derive(Debug, Deserialize, Serialize)]
pub struct ImageListResponse {
    pub data: ImageListData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_seconds: Option<u64>,
}

impl From<ImageListing> for ImageListResponse {
    fn from(listing: ImageListing) -> Self {
        Self {
            data: ImageListData { data: listing.images },
            expiration_seconds: listing.expiration_seconds,
        }
    }
}

impl From<ImageListResponse> for ImageListing {
    fn from(response: ImageListResponse) -> Self {
        Self {
            images: response.data.data,
            expiration_seconds: response.expiration_seconds,
        }
    }
}

/// Body of the single-image PUT. An empty `new_cluster` leaves the cluster alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectUpdate {
    pub tags: Vec<String>,
    #[serde(default)]
    pub new_cluster: String,
}

/// One batch operation. Serializes in the storage service's `operations` form,
/// e.g. `{"add_tags": ["a"]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOperation {
    AddTags(Vec<String>),
    NewCluster(String),
}

impl BatchOperation {
    pub fn operation_type(&self) -> &'static str {
        match self {
            BatchOperation::AddTags(_) => "add_tags",
            BatchOperation::NewCluster(_) => "new_cluster",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub object_ids: Vec<ImageId>,
    pub operation: BatchOperation,
}

/// Proxy wire form of a batch request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPayload {
    pub object_ids: Vec<ImageId>,
    pub operation_type: String,
    pub operation_values: serde_json::Value,
}

impl From<&BatchRequest> for BatchPayload {
    fn from(request: &BatchRequest) -> Self {
        let operation_values = match &request.operation {
            BatchOperation::AddTags(tags) => serde_json::json!(tags),
            BatchOperation::NewCluster(cluster) => serde_json::json!(cluster),
        };
        Self {
            object_ids: request.object_ids.clone(),
            operation_type: request.operation.operation_type().to_string(),
            operation_values,
        }
    }
}

impl TryFrom<BatchPayload> for BatchRequest {
    type Error = AppError;

    fn try_from(payload: BatchPayload) -> Result<Self, Self::Error> {
        if payload.object_ids.is_empty() {
            return Err(AppError::BadRequest("object_ids is required and cannot be empty".into()));
        }

        let operation = match payload.operation_type.as_str() {
            "add_tags" => {
                let tags: Vec<String> = serde_json::from_value(payload.operation_values)
                    .map_err(|_| AppError::BadRequest("add_tags requires an array of strings".into()))?;
                if tags.is_empty() {
                    return Err(AppError::BadRequest("add_tags cannot be empty".into()));
                }
                BatchOperation::AddTags(tags)
            }
            "new_cluster" => {
                let cluster = match payload.operation_values {
                    serde_json::Value::String(s) => s,
                    serde_json::Value::Array(mut values) if values.len() == 1 => match values.pop() {
                        Some(serde_json::Value::String(s)) => s,
                        _ => return Err(AppError::BadRequest("new_cluster must be a string".into())),
                    },
                    _ => {
                        return Err(AppError::BadRequest(
                            "new_cluster requires a string or a single-element array".into(),
                        ))
                    }
                };
                if cluster.trim().is_empty() {
                    return Err(AppError::BadRequest("new_cluster cannot be empty".into()));
                }
                BatchOperation::NewCluster(cluster)
            }
            other => {
                return Err(AppError::BadRequest(format!("Unknown operation_type: {other}")));
            }
        };

        Ok(Self {
            object_ids: payload.object_ids,
            operation,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterStat {
    pub name: String,
    pub frequency: u64,
    #[serde(default, deserialize_with = "null_as_string")]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagStat {
    pub name: String,
    pub frequency: u64,
}

fn null_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Per-cluster and per-tag frequencies for a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectStats {
    #[serde(default)]
    pub clusters: Vec<ClusterStat>,
    #[serde(default)]
    pub tags: Vec<TagStat>,
}

/// Proxy response for `GET /api/project/{project_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub data: Project,
    #[serde(default)]
    pub stats: ProjectStats,
}
