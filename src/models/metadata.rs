use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default name of the host's log event table.
pub const DEFAULT_LOG_EVENT_TABLE: &str = "redcap_log_event";

/// Project-level metadata the host pushes to the service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectInfo {
    pub project_id: i64,
    /// Table holding the project's audit log entries.
    pub log_event_table: String,
    pub synced_at: DateTime<Utc>,
}

/// One field of a project's data dictionary.
///
/// Only the properties the built-in features need are kept: the form the
/// field lives on, its position, its annotation (`misc`) and, for survey
/// forms, the survey page it is displayed on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldMetadata {
    pub field_name: String,
    pub form_name: String,
    pub field_order: i64,
    /// Field annotation text (action tags and free text).
    #[serde(default)]
    pub misc: Option<String>,
    #[serde(default)]
    pub survey_page: Option<u32>,
}

impl FieldMetadata {
    pub fn new(form_name: impl Into<String>, field_name: impl Into<String>, field_order: i64) -> Self {
        Self {
            field_name: field_name.into(),
            form_name: form_name.into(),
            field_order,
            misc: None,
            survey_page: None,
        }
    }

    pub fn with_annotation(mut self, misc: impl Into<String>) -> Self {
        self.misc = Some(misc.into());
        self
    }

    pub fn on_survey_page(mut self, page: u32) -> Self {
        self.survey_page = Some(page);
        self
    }

    /// Annotation text, empty when the field has none.
    pub fn annotation(&self) -> &str {
        self.misc.as_deref().unwrap_or("")
    }
}

/// Input for replacing a project's metadata. Existing fields are dropped.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncMetadataInput {
    /// Defaults to [`DEFAULT_LOG_EVENT_TABLE`] if not specified.
    pub log_event_table: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldMetadata>,
}
