use thiserror::Error;

pub const TAG_MIN_LEN: usize = 2;
pub const TAG_MAX_LEN: usize = 30;
pub const CLUSTER_MAX_LEN: usize = 20;

/// Client-side input errors. Raised before any network call and never
/// accompanied by a state change.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Search input is empty.")]
    EmptySearch,

    #[error("Tag must be at least 2 characters.")]
    TagTooShort,

    #[error("Tag must be less than 30 characters.")]
    TagTooLong,

    #[error("Tag contains invalid characters. Only letters, numbers, hyphens, and underscores are allowed.")]
    TagInvalidCharacters,

    #[error("Cluster name is required.")]
    ClusterEmpty,

    #[error("Cluster name must be less than 20 characters.")]
    ClusterTooLong,

    #[error("Cluster name contains invalid characters. Only letters, numbers, hyphens, and underscores are allowed.")]
    ClusterInvalidCharacters,

    #[error("Provide either a new tag or a new cluster, not both.")]
    AmbiguousEdit,

    #[error("No images selected.")]
    EmptySelection,

    #[error("No tags provided.")]
    EmptyTags,
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

pub fn validate_tag(tag: &str) -> Result<(), ValidationError> {
    let len = tag.chars().count();
    if len < TAG_MIN_LEN {
        return Err(ValidationError::TagTooShort);
    }
    if len > TAG_MAX_LEN {
        return Err(ValidationError::TagTooLong);
    }
    if !tag.chars().all(is_name_char) {
        return Err(ValidationError::TagInvalidCharacters);
    }
    Ok(())
}

pub fn validate_cluster_name(name: &str) -> Result<(), ValidationError> {
    let len = name.chars().count();
    if len == 0 {
        return Err(ValidationError::ClusterEmpty);
    }
    if len > CLUSTER_MAX_LEN {
        return Err(ValidationError::ClusterTooLong);
    }
    if !name.chars().all(is_name_char) {
        return Err(ValidationError::ClusterInvalidCharacters);
    }
    Ok(())
}

/// Rules for one token of comma-separated batch input. The minimum length of
/// the single-image dialog does not apply here.
pub fn validate_batch_tag(tag: &str) -> Result<(), ValidationError> {
    if tag.chars().count() > TAG_MAX_LEN {
        return Err(ValidationError::TagTooLong);
    }
    if tag.is_empty() || !tag.chars().all(is_name_char) {
        return Err(ValidationError::TagInvalidCharacters);
    }
    Ok(())
}

/// Splits comma-separated batch input, trimming tokens and dropping empty ones.
pub fn split_tag_input(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
