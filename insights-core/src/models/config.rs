use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameter bag a handler writes into. Serialized next to the `feature` key.
pub type FeatureParams = Map<String, Value>;

const FEATURE_KEY: &str = "feature";

/// A feature that made it into the page, with its handler-written parameters.
///
/// The parameters are flattened into the JSON object, so the wire shape is
/// `{ "feature": "reveal-hidden", "linkLabel": "...", "isSurvey": false }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureConfig {
    pub feature: String,
    #[serde(flatten)]
    pub params: FeatureParams,
}

impl FeatureConfig {
    /// A `feature` entry in `params` would collide with the identifier key
    /// on the wire and is dropped.
    pub fn new(feature: impl Into<String>, mut params: FeatureParams) -> Self {
        let feature = feature.into();
        if params.shift_remove(FEATURE_KEY).is_some() {
            tracing::warn!(feature = %feature, "Dropped reserved 'feature' parameter");
        }
        Self { feature, params }
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

/// A per-feature failure recorded during a registry pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeatureError {
    pub msg: String,
    pub details: String,
}

impl FeatureError {
    pub fn unknown(feature: &str) -> Self {
        Self {
            msg: format!("Unknown feature '{feature}'."),
            details: format!("No handler is registered for '{feature}'."),
        }
    }

    pub fn failed(feature: &str, details: impl Into<String>) -> Self {
        Self {
            msg: format!("Failed to add feature '{feature}'."),
            details: details.into(),
        }
    }
}

/// Result of one registry pass: active features in request order plus all
/// failures in the order they were encountered.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AggregateConfig {
    pub features: Vec<FeatureConfig>,
    pub errors: Vec<FeatureError>,
}

impl AggregateConfig {
    pub fn feature(&self, id: &str) -> Option<&FeatureConfig> {
        self.features.iter().find(|f| f.feature == id)
    }

    pub fn feature_ids(&self) -> Vec<&str> {
        self.features.iter().map(|f| f.feature.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty() && self.errors.is_empty()
    }
}

/// The object embedded into the page and handed to the client dispatcher.
///
/// `features` and `errors` (and the `feature` key of each entry) are the
/// stable contract. New optional fields may be added.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PagePayload {
    #[serde(flatten)]
    pub config: AggregateConfig,
    pub version: String,
    #[serde(default)]
    pub debug: bool,
}

impl PagePayload {
    pub fn new(config: AggregateConfig, version: impl Into<String>, debug: bool) -> Self {
        Self {
            config,
            version: version.into(),
            debug,
        }
    }
}
