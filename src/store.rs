use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::model::{Image, ImageId};

/// Identifies one optimistic single-image edit so that only the latest edit
/// of an image may roll itself back.
pub type MutationId = u64;

#[derive(Debug, Default)]
struct StoreState {
    images: Vec<Image>,
    version: u64,
    loading: bool,
    error: Option<String>,
    next_mutation: MutationId,
    latest_mutation: HashMap<ImageId, MutationId>,
}

impl StoreState {
    fn bump(&mut self) {
        self.version += 1;
    }
}

/// Point-in-time copy of the working set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub images: Vec<Image>,
    pub version: u64,
    pub loading: bool,
    pub error: Option<String>,
}

/// The in-memory image list shared by the fetcher, the editor and pagination.
/// Every change happens under one write lock and bumps `version`.
#[derive(Debug, Clone, Default)]
pub struct ImageStore {
    state: Arc<RwLock<StoreState>>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> Snapshot {
        let state = self.state.read().await;
        Snapshot {
            images: state.images.clone(),
            version: state.version,
            loading: state.loading,
            error: state.error.clone(),
        }
    }

    pub async fn images(&self) -> Vec<Image> {
        self.state.read().await.images.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.images.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get(&self, id: ImageId) -> Option<Image> {
        self.state.read().await.images.iter().find(|i| i.id == id).cloned()
    }

    pub async fn version(&self) -> u64 {
        self.state.read().await.version
    }

    /// Empties the list and raises the loading flag ahead of a new fetch.
    pub async fn begin_loading(&self) {
        let mut state = self.state.write().await;
        state.images.clear();
        state.latest_mutation.clear();
        state.loading = true;
        state.error = None;
        state.bump();
    }

    /// Wholesale replacement with a fresh listing.
    pub async fn replace(&self, images: Vec<Image>) {
        let mut state = self.state.write().await;
        state.images = images;
        state.latest_mutation.clear();
        state.loading = false;
        state.error = None;
        state.bump();
    }

    pub async fn fail_loading(&self, message: String) {
        let mut state = self.state.write().await;
        state.loading = false;
        state.error = Some(message);
        state.bump();
    }

    /// Registers a new optimistic edit of `id` and returns its correlation id.
    pub async fn begin_mutation(&self, id: ImageId) -> MutationId {
        let mut state = self.state.write().await;
        state.next_mutation += 1;
        let mutation = state.next_mutation;
        state.latest_mutation.insert(id, mutation);
        mutation
    }

    /// Replaces the tags of one image. Returns false if it is not in the list.
    pub async fn set_tags(&self, id: ImageId, tags: Vec<String>) -> bool {
        let mut state = self.state.write().await;
        let Some(image) = state.images.iter_mut().find(|i| i.id == id) else {
            return false;
        };
        image.tags = tags;
        state.bump();
        true
    }

    /// Restores tags only if `mutation` is still the latest edit of the image.
    pub async fn revert_tags(&self, id: ImageId, mutation: MutationId, tags: Vec<String>) -> bool {
        let mut state = self.state.write().await;
        if state.latest_mutation.get(&id) != Some(&mutation) {
            return false;
        }
        let Some(image) = state.images.iter_mut().find(|i| i.id == id) else {
            return false;
        };
        image.tags = tags;
        state.latest_mutation.remove(&id);
        state.bump();
        true
    }

    /// Removes one image from the view and returns it with its former index.
    pub async fn remove(&self, id: ImageId) -> Option<(usize, Image)> {
        let mut state = self.state.write().await;
        let index = state.images.iter().position(|i| i.id == id)?;
        let image = state.images.remove(index);
        state.bump();
        Some((index, image))
    }

    /// Puts back an image removed by an optimistic cluster move, unless a later
    /// edit or a reload took over.
    pub async fn restore(&self, index: usize, image: Image, mutation: MutationId) -> bool {
        let mut state = self.state.write().await;
        if state.latest_mutation.get(&image.id) != Some(&mutation) {
            return false;
        }
        if state.images.iter().any(|i| i.id == image.id) {
            return false;
        }
        state.latest_mutation.remove(&image.id);
        let index = index.min(state.images.len());
        state.images.insert(index, image);
        state.bump();
        true
    }

    pub async fn remove_many(&self, ids: &[ImageId]) -> usize {
        let mut state = self.state.write().await;
        let before = state.images.len();
        state.images.retain(|i| !ids.contains(&i.id));
        let removed = before - state.images.len();
        if removed > 0 {
            state.bump();
        }
        removed
    }

    /// Unions `tags` into every listed image.
    pub async fn merge_tags(&self, ids: &[ImageId], tags: &[String]) -> usize {
        let mut state = self.state.write().await;
        let mut changed = 0;
        for image in state.images.iter_mut().filter(|i| ids.contains(&i.id)) {
            if image.merge_tags(tags) {
                changed += 1;
            }
        }
        if changed > 0 {
            state.bump();
        }
        changed
    }
}
