//! Fixed display strings and markup fragments.

/// Badge prefixed to every link and label the module adds.
pub const AI_BADGE: &str =
    "<span class=\"badge badge-info\" style=\"font-weight:normal;font-size:80%;\">AI</span> ";

/// Badge used inside host dropdown menus.
pub const AI_MENU_BADGE: &str =
    "<span class=\"badge badge-info\" style=\"font-weight:normal\">AI</span> ";

pub const REVEAL_HIDDEN_LINK: &str = "Reveal hidden fields";
pub const DESIGNER_CODE_TITLE: &str = "Field Annotation";
pub const QUERY_RECORD_DATA_LINK: &str = "Query record data";
pub const QUERY_RECORD_LOGS_LINK: &str = "Query record logs";
pub const SHOW_LOGGING_LINK: &str = "Show record in logging";

pub const LINK_DESIGNER_ENHANCEMENTS: &str = "Designer enhancements";
pub const LINK_DATA_ENTRY_ANNOTATIONS: &str = "Data entry annotations";
pub const LINK_SURVEY_ANNOTATIONS: &str = "Survey annotations";

pub const FEATURE_DIALOG_TITLE: &str = "Admin Insights";

pub const STATE_ON_ICON: &str = "<i class=\"fas fa-toggle-on text-success ms-2\"></i>";
pub const STATE_OFF_ICON: &str = "<i class=\"fas fa-toggle-off ms-2\" style=\"opacity:.5;\"></i>";

/// Label of the admin link that toggles `feature`.
pub fn toggle_link_label(feature: &str) -> Option<&'static str> {
    use insights_core::models::*;
    match feature {
        DESIGNER_ENHANCEMENTS => Some(LINK_DESIGNER_ENHANCEMENTS),
        DATA_ENTRY_ANNOTATIONS => Some(LINK_DATA_ENTRY_ANNOTATIONS),
        SURVEY_ANNOTATIONS => Some(LINK_SURVEY_ANNOTATIONS),
        _ => None,
    }
}
