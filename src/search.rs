use crate::criteria::FilterCriteria;
use crate::validation::ValidationError;

/// A change to one pending criterion.
#[derive(Debug, Clone, PartialEq)]
pub enum CriterionUpdate {
    Clusters(Vec<String>),
    LabelNames(Vec<String>),
    Tags(Vec<String>),
    Relocated(bool),
}

/// Holds what the user is configuring in the sidebar apart from what has been
/// applied, so the fetcher only reacts to an explicit submit.
#[derive(Debug, Default, Clone)]
pub struct SearchController {
    pending: FilterCriteria,
    search_triggered: bool,
    error: Option<ValidationError>,
}

impl SearchController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> &FilterCriteria {
        &self.pending
    }

    pub fn search_triggered(&self) -> bool {
        self.search_triggered
    }

    /// Inline error of the last submit, if it was rejected.
    pub fn error(&self) -> Option<&ValidationError> {
        self.error.as_ref()
    }

    pub fn set(&mut self, update: CriterionUpdate) {
        match update {
            CriterionUpdate::Clusters(clusters) => self.pending.clusters = clusters,
            CriterionUpdate::LabelNames(labels) => self.pending.label_names = labels,
            CriterionUpdate::Tags(tags) => self.pending.tags = tags,
            CriterionUpdate::Relocated(relocated) => self.pending.relocated = relocated,
        }
    }

    pub fn submit(&mut self) -> Result<(), ValidationError> {
        if self.pending.is_empty() {
            log::debug!("Rejected search with empty criteria");
            self.error = Some(ValidationError::EmptySearch);
            return Err(ValidationError::EmptySearch);
        }
        self.error = None;
        self.search_triggered = true;
        Ok(())
    }

    /// Hands a triggered search over to the view: returns the criteria to
    /// apply and resets the trigger.
    pub fn take_triggered(&mut self) -> Option<FilterCriteria> {
        if !self.search_triggered {
            return None;
        }
        self.search_triggered = false;
        Some(self.pending.clone())
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
