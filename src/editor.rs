use std::sync::Arc;

use crate::backend::{Backend, RequestContext};
use crate::error::AppError;
use crate::model::{BatchOperation, BatchRequest, ImageId, ObjectUpdate, ProjectId};
use crate::selection::Selection;
use crate::stats::StatsRefresher;
use crate::store::ImageStore;
use crate::validation::{
    split_tag_input, validate_cluster_name, validate_batch_tag, validate_tag, ValidationError,
};

/// Text entered in the single-image edit dialog.
#[derive(Debug, Clone, Default)]
pub struct EditInput {
    pub new_tag: String,
    pub new_cluster: String,
}

impl EditInput {
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            new_tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn cluster(cluster: impl Into<String>) -> Self {
        Self {
            new_cluster: cluster.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// Nothing to change; no request was sent.
    NoOp,
    /// Applied locally and accepted by the backend.
    Applied,
    /// The backend rejected the change. `reverted` tells whether the local
    /// optimistic change was rolled back (a newer edit may have replaced it).
    Failed { reverted: bool },
}

/// Results of the two halves of a batch submit; `None` when that half had no
/// input.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub add_tags: Option<Result<(), AppError>>,
    pub change_cluster: Option<Result<(), AppError>>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        !matches!(self.add_tags, Some(Err(_))) && !matches!(self.change_cluster, Some(Err(_)))
    }
}

#[derive(Debug)]
pub enum BatchSubmit {
    NothingSelected,
    Submitted(BatchReport),
}

/// Tag and cluster edits for one image or a selection of images.
pub struct ImageEditor {
    backend: Arc<dyn Backend>,
    ctx: RequestContext,
    project_id: ProjectId,
    store: ImageStore,
    stats: StatsRefresher,
    view_cluster: Option<String>,
    selection: Selection,
    batch_tags: String,
    batch_cluster: String,
}

impl ImageEditor {
    pub fn new(
        backend: Arc<dyn Backend>,
        ctx: RequestContext,
        project_id: ProjectId,
        store: ImageStore,
        stats: StatsRefresher,
    ) -> Self {
        Self {
            backend,
            ctx,
            project_id,
            store,
            stats,
            view_cluster: None,
            selection: Selection::new(),
            batch_tags: String::new(),
            batch_cluster: String::new(),
        }
    }

    /// The cluster the grid is showing, if it is filtered on exactly one.
    pub fn set_view_cluster(&mut self, cluster: Option<String>) {
        self.view_cluster = cluster;
    }

    pub fn view_cluster(&self) -> Option<&str> {
        self.view_cluster.as_deref()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn toggle_selection(&mut self, id: ImageId) -> bool {
        self.selection.toggle(id)
    }

    pub fn select_all<I: IntoIterator<Item = ImageId>>(&mut self, ids: I) {
        self.selection.select_all(ids);
    }

    /// Leaves batch mode: drops the selection and both pending inputs.
    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.batch_tags.clear();
        self.batch_cluster.clear();
    }

    pub fn set_batch_tags(&mut self, text: impl Into<String>) {
        self.batch_tags = text.into();
    }

    pub fn set_batch_cluster(&mut self, text: impl Into<String>) {
        self.batch_cluster = text.into();
    }

    pub fn batch_tags(&self) -> &str {
        &self.batch_tags
    }

    pub fn batch_cluster(&self) -> &str {
        &self.batch_cluster
    }

    /// Adds one tag to, or moves, a single image. Exactly one of the two
    /// inputs may be filled in; with neither this does nothing.
    pub async fn submit(&self, image_id: ImageId, input: EditInput) -> Result<EditOutcome, ValidationError> {
        let tag = input.new_tag.trim();
        let cluster = input.new_cluster.trim();

        match (tag.is_empty(), cluster.is_empty()) {
            (true, true) => Ok(EditOutcome::NoOp),
            (false, false) => Err(ValidationError::AmbiguousEdit),
            (true, false) => {
                validate_cluster_name(cluster)?;
                Ok(self.move_image(image_id, cluster).await)
            }
            (false, true) => {
                validate_tag(tag)?;
                Ok(self.add_tag(image_id, tag).await)
            }
        }
    }

    async fn move_image(&self, image_id: ImageId, cluster: &str) -> EditOutcome {
        let Some(image) = self.store.get(image_id).await else {
            log::debug!("Image {} is not in view, ignoring cluster change", image_id);
            return EditOutcome::NoOp;
        };
        if self.view_cluster.as_deref() == Some(cluster) {
            log::debug!("Image {} is already in '{}'", image_id, cluster);
            return EditOutcome::NoOp;
        }

        let mutation = self.store.begin_mutation(image_id).await;
        let removed = self.store.remove(image_id).await;
        let update = ObjectUpdate {
            tags: image.tags.clone(),
            new_cluster: cluster.to_string(),
        };

        match self.push_update(image_id, &update).await {
            Ok(()) => EditOutcome::Applied,
            Err(_) => {
                let reverted = match removed {
                    Some((index, image)) => self.store.restore(index, image, mutation).await,
                    None => false,
                };
                EditOutcome::Failed { reverted }
            }
        }
    }

    async fn add_tag(&self, image_id: ImageId, tag: &str) -> EditOutcome {
        let Some(image) = self.store.get(image_id).await else {
            log::debug!("Image {} is not in view, ignoring new tag", image_id);
            return EditOutcome::NoOp;
        };
        if image.tags.iter().any(|t| t == tag) {
            log::debug!("Image {} already has tag '{}'", image_id, tag);
            return EditOutcome::NoOp;
        }

        let mut tags = image.tags.clone();
        tags.push(tag.to_string());
        self.replace_tags(image_id, image.tags, tags).await
    }

    /// Removes `tag` (exact match) from one image.
    pub async fn remove_tag(&self, image_id: ImageId, tag: &str) -> EditOutcome {
        let Some(image) = self.store.get(image_id).await else {
            return EditOutcome::NoOp;
        };
        if !image.tags.iter().any(|t| t == tag) {
            return EditOutcome::NoOp;
        }

        let tags: Vec<String> = image.tags.iter().filter(|t| *t != tag).cloned().collect();
        self.replace_tags(image_id, image.tags, tags).await
    }

    async fn replace_tags(&self, image_id: ImageId, previous: Vec<String>, tags: Vec<String>) -> EditOutcome {
        let mutation = self.store.begin_mutation(image_id).await;
        self.store.set_tags(image_id, tags.clone()).await;

        let update = ObjectUpdate {
            tags,
            new_cluster: String::new(),
        };
        match self.push_update(image_id, &update).await {
            Ok(()) => EditOutcome::Applied,
            Err(_) => EditOutcome::Failed {
                reverted: self.store.revert_tags(image_id, mutation, previous).await,
            },
        }
    }

    async fn push_update(&self, image_id: ImageId, update: &ObjectUpdate) -> Result<(), AppError> {
        match self
            .backend
            .update_image(&self.ctx, self.project_id, image_id, update)
            .await
        {
            Ok(()) => {
                log::debug!("Updated image {}", image_id);
                self.stats.spawn_refresh();
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to update image {}: {}", image_id, e);
                Err(e)
            }
        }
    }

    /// Adds `tags` to every image in `ids` with one request.
    pub async fn batch_add_tags(&self, ids: &[ImageId], tags: &[String]) -> Result<(), AppError> {
        if ids.is_empty() {
            return Err(ValidationError::EmptySelection.into());
        }
        if tags.is_empty() {
            return Err(ValidationError::EmptyTags.into());
        }

        let mut unique: Vec<String> = Vec::with_capacity(tags.len());
        for tag in tags {
            if !unique.contains(tag) {
                unique.push(tag.clone());
            }
        }

        let request = BatchRequest {
            object_ids: ids.to_vec(),
            operation: BatchOperation::AddTags(unique.clone()),
        };
        self.backend
            .batch_update(&self.ctx, self.project_id, &request)
            .await
            .map_err(|e| {
                log::error!("Batch tag update of {} images failed: {}", ids.len(), e);
                e
            })?;

        let changed = self.store.merge_tags(ids, &unique).await;
        log::info!("Added {:?} to {} images ({} changed locally)", unique, ids.len(), changed);
        self.stats.spawn_refresh();
        Ok(())
    }

    /// Moves every image in `ids` to `cluster` with one request. Images leave
    /// the grid unless `cluster` is the one being viewed.
    pub async fn batch_change_cluster(&self, ids: &[ImageId], cluster: &str) -> Result<(), AppError> {
        if ids.is_empty() {
            return Err(ValidationError::EmptySelection.into());
        }
        let cluster = cluster.trim();
        if cluster.is_empty() {
            return Err(ValidationError::ClusterEmpty.into());
        }

        let request = BatchRequest {
            object_ids: ids.to_vec(),
            operation: BatchOperation::NewCluster(cluster.to_string()),
        };
        self.backend
            .batch_update(&self.ctx, self.project_id, &request)
            .await
            .map_err(|e| {
                log::error!("Batch move of {} images to '{}' failed: {}", ids.len(), cluster, e);
                e
            })?;

        // listed images already belong to the viewed cluster
        if self.view_cluster.as_deref() != Some(cluster) {
            let removed = self.store.remove_many(ids).await;
            log::info!("Moved {} images to '{}', {} left the view", ids.len(), cluster, removed);
        }
        self.stats.spawn_refresh();
        Ok(())
    }

    /// Applies the pending batch inputs to the selection. Tags go first, the
    /// cluster move second, and the move is attempted even if tagging failed.
    /// Afterwards the selection and inputs are cleared whatever the outcome.
    pub async fn handle_batch_submit(&mut self) -> Result<BatchSubmit, ValidationError> {
        if self.selection.is_empty() {
            log::warn!("Batch submit ignored: no images selected");
            return Ok(BatchSubmit::NothingSelected);
        }

        let tags = split_tag_input(&self.batch_tags);
        let cluster = self.batch_cluster.trim().to_string();
        for tag in &tags {
            validate_batch_tag(tag)?;
        }
        if !cluster.is_empty() {
            validate_cluster_name(&cluster)?;
        }

        let ids = self.selection.ids();
        let mut report = BatchReport::default();
        if !tags.is_empty() {
            report.add_tags = Some(self.batch_add_tags(&ids, &tags).await);
        }
        if !cluster.is_empty() {
            report.change_cluster = Some(self.batch_change_cluster(&ids, &cluster).await);
        }

        self.clear_selection();
        Ok(BatchSubmit::Submitted(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::testing::{image, Call, RecordingBackend};

    async fn editor_with(backend: &RecordingBackend, images: Vec<crate::model::Image>) -> ImageEditor {
        let store = ImageStore::new();
        store.replace(images).await;
        let backend: Arc<dyn Backend> = Arc::new(backend.clone());
        let ctx = RequestContext::new("token");
        let stats = StatsRefresher::new(backend.clone(), ctx.clone(), 1);
        let mut editor = ImageEditor::new(backend, ctx, 1, store, stats);
        editor.set_view_cluster(Some("1".into()));
        editor
    }

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn single_tag_add() {
        let backend = RecordingBackend::new();
        let editor = editor_with(&backend, vec![image(1, "1", &["tag1", "tag2"])]).await;

        let outcome = editor.submit(1, EditInput::tag("tag3")).await.unwrap();
        assert_eq!(outcome, EditOutcome::Applied);
        assert_eq!(editor.store.get(1).await.unwrap().tags, tags(&["tag1", "tag2", "tag3"]));
        assert_eq!(
            backend.mutation_calls(),
            vec![Call::Update(
                1,
                1,
                ObjectUpdate {
                    tags: tags(&["tag1", "tag2", "tag3"]),
                    new_cluster: String::new(),
                }
            )]
        );
    }

    #[tokio::test]
    async fn single_edit_without_input_is_silent() {
        let backend = RecordingBackend::new();
        let editor = editor_with(&backend, vec![image(1, "1", &[])]).await;

        assert_eq!(editor.submit(1, EditInput::default()).await.unwrap(), EditOutcome::NoOp);
        assert_eq!(
            editor
                .submit(1, EditInput { new_tag: "a1".into(), new_cluster: "b".into() })
                .await
                .unwrap_err(),
            ValidationError::AmbiguousEdit
        );
        assert_eq!(
            editor.submit(1, EditInput::tag("bad tag!")).await.unwrap_err(),
            ValidationError::TagInvalidCharacters
        );
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn duplicate_single_tag_is_noop() {
        let backend = RecordingBackend::new();
        let editor = editor_with(&backend, vec![image(1, "1", &["tag1"])]).await;

        assert_eq!(editor.submit(1, EditInput::tag("tag1")).await.unwrap(), EditOutcome::NoOp);
        assert!(backend.mutation_calls().is_empty());
    }

    #[tokio::test]
    async fn single_move_removes_from_view() {
        let backend = RecordingBackend::new();
        let editor = editor_with(&backend, vec![image(1, "1", &["x1"]), image(2, "1", &[])]).await;

        assert_eq!(editor.submit(1, EditInput::cluster("7")).await.unwrap(), EditOutcome::Applied);
        assert!(editor.store.get(1).await.is_none());
        assert_eq!(
            backend.mutation_calls(),
            vec![Call::Update(1, 1, ObjectUpdate { tags: tags(&["x1"]), new_cluster: "7".into() })]
        );

        // same cluster: nothing to do
        assert_eq!(editor.submit(2, EditInput::cluster("1")).await.unwrap(), EditOutcome::NoOp);
    }

    #[tokio::test]
    async fn failed_single_edits_are_rolled_back() {
        let backend = RecordingBackend::new();
        backend.fail_updates(true);
        let editor = editor_with(&backend, vec![image(1, "1", &["tag1"]), image(2, "1", &[])]).await;

        let outcome = editor.submit(1, EditInput::tag("tag2")).await.unwrap();
        assert_eq!(outcome, EditOutcome::Failed { reverted: true });
        assert_eq!(editor.store.get(1).await.unwrap().tags, tags(&["tag1"]));

        let outcome = editor.submit(1, EditInput::cluster("9")).await.unwrap();
        assert_eq!(outcome, EditOutcome::Failed { reverted: true });
        let ids: Vec<_> = editor.store.images().await.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn remove_tag_exact_match() {
        let backend = RecordingBackend::new();
        let editor = editor_with(&backend, vec![image(1, "1", &["red", "reddish"])]).await;

        assert_eq!(editor.remove_tag(1, "red").await, EditOutcome::Applied);
        assert_eq!(editor.store.get(1).await.unwrap().tags, tags(&["reddish"]));
        assert_eq!(editor.remove_tag(1, "red").await, EditOutcome::NoOp);
        assert_eq!(backend.mutation_calls().len(), 1);
    }

    #[tokio::test]
    async fn batch_add_tags_unions_without_duplicates() {
        let backend = RecordingBackend::new();
        let editor = editor_with(
            &backend,
            vec![image(1, "1", &["a", "x"]), image(2, "1", &[]), image(3, "1", &["b"])],
        )
        .await;

        editor.batch_add_tags(&[1, 2], &tags(&["a", "b", "a"])).await.unwrap();
        assert_eq!(editor.store.get(1).await.unwrap().tags, tags(&["a", "x", "b"]));
        assert_eq!(editor.store.get(2).await.unwrap().tags, tags(&["a", "b"]));
        assert_eq!(editor.store.get(3).await.unwrap().tags, tags(&["b"]));
        assert_eq!(
            backend.mutation_calls(),
            vec![Call::Batch(
                1,
                BatchRequest { object_ids: vec![1, 2], operation: BatchOperation::AddTags(tags(&["a", "b"])) }
            )]
        );
    }

    #[tokio::test]
    async fn batch_operations_reject_empty_input() {
        let backend = RecordingBackend::new();
        let editor = editor_with(&backend, vec![image(1, "1", &[])]).await;

        assert!(editor.batch_add_tags(&[], &tags(&["a"])).await.is_err());
        assert!(editor.batch_add_tags(&[1], &[]).await.is_err());
        assert!(editor.batch_change_cluster(&[], "c").await.is_err());
        assert!(editor.batch_change_cluster(&[1], "   ").await.is_err());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn batch_move_evicts_unless_same_cluster() {
        let backend = RecordingBackend::new();
        let editor = editor_with(&backend, vec![image(1, "1", &[]), image(2, "1", &[]), image(3, "1", &[])]).await;

        editor.batch_change_cluster(&[1, 2], "1").await.unwrap();
        assert_eq!(editor.store.len().await, 3);

        editor.batch_change_cluster(&[1, 2], "2").await.unwrap();
        let ids: Vec<_> = editor.store.images().await.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![3]);
    }

    #[tokio::test]
    async fn moves_into_viewed_cluster_keep_storage_ids() {
        let stored: crate::model::Image = serde_json::from_value(serde_json::json!({
            "id": 1, "name": "cat_01", "url": null, "tags": ["x1"], "cluster_id": 17, "original_cluster": 17
        }))
        .unwrap();
        let backend = RecordingBackend::new();
        let mut editor = editor_with(&backend, vec![stored]).await;
        editor.set_view_cluster(Some("animals".into()));

        assert_eq!(editor.submit(1, EditInput::cluster("animals")).await.unwrap(), EditOutcome::NoOp);
        assert!(backend.mutation_calls().is_empty());

        editor.batch_change_cluster(&[1], "animals").await.unwrap();
        let image = editor.store.get(1).await.unwrap();
        assert_eq!(image.cluster_id, "17");
        assert!(!image.is_relocated());
        assert_eq!(backend.mutation_calls().len(), 1);
    }

    #[tokio::test]
    async fn failed_batch_leaves_store_untouched() {
        let backend = RecordingBackend::new();
        backend.fail_batches(true);
        let editor = editor_with(&backend, vec![image(1, "1", &[])]).await;

        assert!(editor.batch_change_cluster(&[1], "2").await.is_err());
        assert_eq!(editor.store.len().await, 1);
    }

    #[tokio::test]
    async fn batch_submit_runs_both_and_always_clears() {
        for fail in [false, true] {
            let backend = RecordingBackend::new();
            backend.fail_batches(fail);
            let mut editor = editor_with(&backend, vec![image(1, "1", &[]), image(2, "1", &[])]).await;
            editor.toggle_selection(1);
            editor.toggle_selection(2);
            editor.set_batch_tags("a, b");
            editor.set_batch_cluster("c");

            let BatchSubmit::Submitted(report) = editor.handle_batch_submit().await.unwrap() else {
                panic!("expected a submitted batch");
            };
            assert_eq!(report.is_success(), !fail);
            assert_eq!(
                backend.mutation_calls(),
                vec![
                    Call::Batch(
                        1,
                        BatchRequest { object_ids: vec![1, 2], operation: BatchOperation::AddTags(tags(&["a", "b"])) }
                    ),
                    Call::Batch(
                        1,
                        BatchRequest { object_ids: vec![1, 2], operation: BatchOperation::NewCluster("c".into()) }
                    ),
                ]
            );
            assert!(editor.selection().is_empty());
            assert!(editor.batch_tags().is_empty());
            assert!(editor.batch_cluster().is_empty());
        }
    }

    #[tokio::test]
    async fn batch_submit_without_selection_does_nothing() {
        let backend = RecordingBackend::new();
        let mut editor = editor_with(&backend, vec![image(1, "1", &[])]).await;
        editor.set_batch_tags("a");

        assert!(matches!(editor.handle_batch_submit().await.unwrap(), BatchSubmit::NothingSelected));
        assert_eq!(editor.batch_tags(), "a");
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn invalid_batch_input_keeps_selection() {
        let backend = RecordingBackend::new();
        let mut editor = editor_with(&backend, vec![image(1, "1", &[])]).await;
        editor.toggle_selection(1);
        editor.set_batch_tags("ok, not ok");

        assert_eq!(
            editor.handle_batch_submit().await.unwrap_err(),
            ValidationError::TagInvalidCharacters
        );
        assert!(editor.selection().contains(1));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn overlong_batch_tag_is_rejected() {
        let backend = RecordingBackend::new();
        let mut editor = editor_with(&backend, vec![image(1, "1", &[])]).await;
        editor.toggle_selection(1);
        editor.set_batch_tags("a".repeat(31));

        assert_eq!(editor.handle_batch_submit().await.unwrap_err(), ValidationError::TagTooLong);
        assert_eq!(editor.batch_tags(), "a".repeat(31));
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn successful_edit_refreshes_statistics() {
        let backend = RecordingBackend::new();
        let editor = editor_with(&backend, vec![image(1, "1", &[])]).await;

        editor.batch_add_tags(&[1], &tags(&["a"])).await.unwrap();
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
        assert!(backend.calls().contains(&Call::Summary(1)));
    }
}
