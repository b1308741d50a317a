use serde::{Deserialize, Serialize};

/// The filter set an image listing is requested with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterCriteria {
    #[serde(default)]
    pub clusters: Vec<String>,
    #[serde(default)]
    pub label_names: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub relocated: bool,
}

impl FilterCriteria {
    pub fn clusters<I, S>(clusters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            clusters: clusters.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// True when no criterion would narrow the listing. Such a set must never
    /// reach the backend, since it would mean "every image in the project".
    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty() && self.label_names.is_empty() && self.tags.is_empty() && !self.relocated
    }

    /// The cluster being browsed when exactly one cluster is selected.
    pub fn single_cluster(&self) -> Option<&str> {
        match self.clusters.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }

    /// Query parameters for the listing endpoint. Collections are comma-joined
    /// and empty criteria are omitted.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if !self.clusters.is_empty() {
            pairs.push(("clusters", self.clusters.join(",")));
        }
        if !self.label_names.is_empty() {
            pairs.push(("label_names", self.label_names.join(",")));
        }
        if !self.tags.is_empty() {
            pairs.push(("tags_list", self.tags.join(",")));
        }
        if self.relocated {
            pairs.push(("relocated_images", "true".to_string()));
        }
        pairs
    }
}

/// Raw query string of the listing endpoint as the proxy receives it.
#[derive(Debug, Default, Deserialize)]
pub struct ImageQuery {
    pub clusters: Option<String>,
    pub label_names: Option<String>,
    pub tags_list: Option<String>,
    pub relocated_images: Option<String>,
}

fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl From<ImageQuery> for FilterCriteria {
    fn from(query: ImageQuery) -> Self {
        Self {
            clusters: split_list(query.clusters.as_deref()),
            label_names: split_list(query.label_names.as_deref()),
            tags: split_list(query.tags_list.as_deref()),
            relocated: query.relocated_images.as_deref() == Some("true"),
        }
    }
}
