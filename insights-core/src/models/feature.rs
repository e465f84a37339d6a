use serde::{Deserialize, Serialize};

pub const REVEAL_HIDDEN: &str = "reveal-hidden";
pub const DATA_ENTRY_ANNOTATIONS: &str = "data-entry-annotations";
pub const SURVEY_ANNOTATIONS: &str = "survey-annotations";
pub const DESIGNER_ENHANCEMENTS: &str = "designer-enhancements";
pub const QUERY_RECORD_RHP: &str = "query-record-rhp";
pub const QUERY_RECORD_DQT: &str = "query-record-dqt";
pub const SHOW_RECORD_LOG_RHP: &str = "show-record-log-rhp";

/// Features that are offered only when their per-project toggle is on.
pub const TOGGLEABLE_FEATURES: &[&str] = &[
    DATA_ENTRY_ANNOTATIONS,
    SURVEY_ANNOTATIONS,
    DESIGNER_ENHANCEMENTS,
];

const SETTING_PREFIX: &str = "show-";
const TOGGLE_PREFIX: &str = "toggle-";

pub fn is_toggleable(feature: &str) -> bool {
    TOGGLEABLE_FEATURES.contains(&feature)
}

/// Project setting key under which a feature's toggle state is persisted.
pub fn setting_key(feature: &str) -> String {
    format!("{SETTING_PREFIX}{feature}")
}

/// Remote action name that flips a feature's toggle state.
pub fn toggle_action(feature: &str) -> String {
    format!("{TOGGLE_PREFIX}{feature}")
}

/// Inverse of [`toggle_action`]. Returns the feature for a `toggle-*` action.
pub fn parse_toggle_action(action: &str) -> Option<&str> {
    action
        .strip_prefix(TOGGLE_PREFIX)
        .filter(|feature| !feature.is_empty())
}

/// Display state of a toggleable feature.
///
/// - `On`: the feature is offered on matching pages
/// - `Off`: the feature is not offered (also the state when nothing is stored)
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeatureState {
    On,
    #[default]
    Off,
}

impl FeatureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "on" => Some(Self::On),
            "off" => Some(Self::Off),
            _ => None,
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, Self::On)
    }

    pub fn flipped(&self) -> Self {
        match self {
            Self::On => Self::Off,
            Self::Off => Self::On,
        }
    }
}

impl From<bool> for FeatureState {
    fn from(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}
