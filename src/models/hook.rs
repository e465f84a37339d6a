use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use insights_core::models::{FeatureState, PagePayload};

/// The user a host hook runs for. Privileges are decided by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostUser {
    pub user_id: Option<String>,
    #[serde(default)]
    pub is_super_user: bool,
    /// Set on survey pages when the browser also carries an admin session.
    #[serde(default)]
    pub has_admin_session: bool,
}

impl HostUser {
    pub fn super_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            is_super_user: true,
            has_admin_session: true,
        }
    }

    pub fn regular(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Default::default()
        }
    }
}

fn first_instance() -> i64 {
    1
}

/// "Record form about to render".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataEntryFormHook {
    pub user: HostUser,
    /// Page render this hook belongs to. The host sends the id returned by
    /// the first hook of a page with every later hook of the same page.
    #[serde(default)]
    pub render_id: Option<Uuid>,
    pub project_id: i64,
    pub record: String,
    pub instrument: String,
    pub event_id: Option<i64>,
    pub group_id: Option<i64>,
    #[serde(default = "first_instance")]
    pub repeat_instance: i64,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// "Survey page about to render".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyPageHook {
    pub user: HostUser,
    /// Page render this hook belongs to. The host sends the id returned by
    /// the first hook of a page with every later hook of the same page.
    #[serde(default)]
    pub render_id: Option<Uuid>,
    pub project_id: i64,
    pub record: Option<String>,
    pub instrument: String,
    pub event_id: Option<i64>,
    pub group_id: Option<i64>,
    pub survey_hash: Option<String>,
    pub response_id: Option<i64>,
    #[serde(default = "first_instance")]
    pub repeat_instance: i64,
    /// Request parameters, including `__page__` for multi-page surveys.
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// The kind of host page, as determined by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageKind {
    /// Online Designer with a form loaded.
    DesignerForm { form: String },
    /// Record Home Page of an existing record.
    RecordHomePage { record: String, arm: Option<String> },
    DatabaseQueryTool,
    Survey,
    #[default]
    Other,
}

/// "Any page top".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EveryPageTopHook {
    pub user: HostUser,
    /// Page render this hook belongs to. The host sends the id returned by
    /// the first hook of a page with every later hook of the same page.
    #[serde(default)]
    pub render_id: Option<Uuid>,
    pub project_id: Option<i64>,
    /// Host page path, e.g. `Design/online_designer.php`.
    pub page: String,
    #[serde(default)]
    pub page_kind: PageKind,
    #[serde(default)]
    pub params: HashMap<String, String>,
    /// Anti-forgery token of the current page, needed to submit queries.
    pub csrf_token: Option<String>,
}

/// A module action link the host is about to display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModuleLink {
    pub key: String,
    pub name: String,
    /// Host-defined properties (url, icon, target, ...) passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// "Module action link about to render".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkCheckHook {
    pub user: HostUser,
    pub project_id: Option<i64>,
    pub link: ModuleLink,
}

/// "Out-of-band action request arrives".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AjaxRequest {
    pub user: HostUser,
    pub project_id: Option<i64>,
    #[serde(default)]
    pub payload: Value,
}

/// Answer to an action request. `result` is `None` for unhandled actions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AjaxResponse {
    pub result: Option<String>,
}

/// A piece of markup or data the host has to place into the page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Injection {
    /// Script and stylesheet of the client dispatcher. Emitted once per render.
    Assets { js: String, css: String },
    /// One configuration payload for the client dispatcher.
    Init { payload: PagePayload },
}

/// Everything a hook invocation contributes to the rendered page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PageOutput {
    /// Sent back by the host with later hooks of the same page.
    pub render_id: Uuid,
    pub injections: Vec<Injection>,
    /// `injections` rendered as markup, ready to print into the page.
    pub html: String,
}

impl PageOutput {
    pub fn payloads(&self) -> impl Iterator<Item = &PagePayload> {
        self.injections.iter().filter_map(|i| match i {
            Injection::Init { payload } => Some(payload),
            Injection::Assets { .. } => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.injections.is_empty()
    }
}

/// Toggle state of one feature in one project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureStateResponse {
    pub project_id: i64,
    pub feature: String,
    pub state: FeatureState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetFeatureStateInput {
    pub state: FeatureState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DebugModeResponse {
    pub enabled: bool,
}
