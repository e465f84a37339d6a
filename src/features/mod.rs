//! Built-in feature handlers.
//!
//! Every handler reads the [`PageContext`] of the current render, writes the
//! parameters its client-side initializer needs and returns whether the
//! feature should be included in the page payload.

pub mod labels;

use std::sync::Arc;

use insights_core::registry::{FeatureRegistry, HandlerError, RegistryError};
use serde_json::{json, Map, Value};

use crate::config::HostConfig;
use crate::models::*;

/// Read access to host project metadata.
pub trait ProjectMetadata: Send + Sync {
    fn form_fields(&self, project_id: i64, form: &str) -> anyhow::Result<Vec<FieldMetadata>>;

    fn survey_page_fields(
        &self,
        project_id: i64,
        form: &str,
        page: u32,
    ) -> anyhow::Result<Vec<FieldMetadata>>;

    fn log_event_table(&self, project_id: i64) -> anyhow::Result<String>;
}

/// Environment handed to every handler of one render.
#[derive(Clone)]
pub struct FeatureEnv {
    pub metadata: Arc<dyn ProjectMetadata>,
    pub host: Arc<HostConfig>,
    /// Anti-forgery token of the page being rendered, if the host sent one.
    pub csrf_token: Option<String>,
}

type BuiltinHandler = fn(&FeatureEnv, &PageContext, &mut FeatureParams) -> Result<bool, HandlerError>;

const BUILTIN: &[(&str, BuiltinHandler)] = &[
    (REVEAL_HIDDEN, reveal_hidden),
    (DATA_ENTRY_ANNOTATIONS, form_annotations),
    (SURVEY_ANNOTATIONS, form_annotations),
    (DESIGNER_ENHANCEMENTS, designer_enhancements),
    (QUERY_RECORD_RHP, query_record_rhp),
    (QUERY_RECORD_DQT, query_record_dqt),
    (SHOW_RECORD_LOG_RHP, show_record_log_rhp),
];

/// Registry with all built-in features.
pub fn builtin_registry() -> Result<FeatureRegistry<FeatureEnv>, RegistryError> {
    let mut registry = FeatureRegistry::new();
    for (id, handler) in BUILTIN {
        registry.register(*id, *handler)?;
    }
    Ok(registry)
}

fn require_pid(ctx: &PageContext) -> Result<i64, HandlerError> {
    ctx.pid.ok_or(HandlerError::MissingContext("pid"))
}

fn require<'a>(value: &'a Option<String>, name: &'static str) -> Result<&'a str, HandlerError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or(HandlerError::MissingContext(name))
}

fn metadata_error(e: anyhow::Error) -> HandlerError {
    HandlerError::Metadata(e.to_string())
}

fn annotation_map(fields: &[FieldMetadata]) -> Map<String, Value> {
    fields
        .iter()
        .map(|f| (f.field_name.clone(), Value::String(f.annotation().to_string())))
        .collect()
}

fn reveal_hidden(
    _env: &FeatureEnv,
    ctx: &PageContext,
    params: &mut FeatureParams,
) -> Result<bool, HandlerError> {
    params.insert(
        "linkLabel".into(),
        json!(format!("{}{}", labels::AI_BADGE, labels::REVEAL_HIDDEN_LINK)),
    );
    params.insert("isSurvey".into(), json!(ctx.is_survey));
    Ok(true)
}

/// Shared by data entry and survey annotations. Surveys only get the fields
/// of the survey page being displayed.
fn form_annotations(
    env: &FeatureEnv,
    ctx: &PageContext,
    params: &mut FeatureParams,
) -> Result<bool, HandlerError> {
    let pid = require_pid(ctx)?;
    let form = require(&ctx.form, "form")?;

    let fields = if ctx.is_survey {
        env.metadata
            .survey_page_fields(pid, form, ctx.survey_page())
            .map_err(metadata_error)?
    } else {
        env.metadata.form_fields(pid, form).map_err(metadata_error)?
    };
    if fields.is_empty() {
        return Ok(false);
    }

    params.insert("fields".into(), Value::Object(annotation_map(&fields)));
    params.insert("isSurvey".into(), json!(ctx.is_survey));
    Ok(true)
}

fn designer_enhancements(
    env: &FeatureEnv,
    ctx: &PageContext,
    params: &mut FeatureParams,
) -> Result<bool, HandlerError> {
    let pid = require_pid(ctx)?;
    let form = require(&ctx.form, "form")?;

    let fields = env.metadata.form_fields(pid, form).map_err(metadata_error)?;
    if fields.is_empty() {
        return Ok(false);
    }

    params.insert("fields".into(), Value::Object(annotation_map(&fields)));
    params.insert("codeTitle".into(), json!(labels::DESIGNER_CODE_TITLE));
    Ok(true)
}

fn query_record_rhp(
    env: &FeatureEnv,
    ctx: &PageContext,
    params: &mut FeatureParams,
) -> Result<bool, HandlerError> {
    let pid = require_pid(ctx)?;
    let record = require(&ctx.record, "record")?;

    params.insert("record".into(), json!(record));
    params.insert("pid".into(), json!(pid));
    params.insert(
        "dqtLink".into(),
        json!(env.host.versioned_url("ControlCenter/database_query_tool.php")),
    );
    params.insert(
        "labelData".into(),
        json!(format!("{}{}", labels::AI_MENU_BADGE, labels::QUERY_RECORD_DATA_LINK)),
    );
    params.insert(
        "labelLogs".into(),
        json!(format!("{}{}", labels::AI_MENU_BADGE, labels::QUERY_RECORD_LOGS_LINK)),
    );
    Ok(true)
}

/// Prepares the query the Database Query Tool runs for a record. Requests
/// without a valid mode or project id are skipped.
fn query_record_dqt(
    env: &FeatureEnv,
    ctx: &PageContext,
    params: &mut FeatureParams,
) -> Result<bool, HandlerError> {
    let Some(mode) = ctx.param("ai-query-for").filter(|m| matches!(*m, "data" | "logs")) else {
        return Ok(false);
    };
    let Some(pid) = ctx.param("ai-query-pid").and_then(sanitize_project_id) else {
        return Ok(false);
    };
    let record = escape_sql_literal(ctx.param("ai-query-id").unwrap_or_default());

    let query = if mode == "data" {
        format!(
            "SELECT *\n FROM redcap_data\n WHERE `project_id` = {pid} AND `record` = '{record}'"
        )
    } else {
        let table = env.metadata.log_event_table(pid).map_err(metadata_error)?;
        if !is_plain_identifier(&table) {
            return Err(HandlerError::Metadata(format!(
                "Invalid log event table name: {table}"
            )));
        }
        format!(
            "SELECT *\n FROM {table}\n WHERE `project_id` = {pid} AND `pk` = '{record}'\n ORDER BY `log_event_id` DESC"
        )
    };

    let token = env
        .csrf_token
        .as_deref()
        .ok_or(HandlerError::MissingContext("csrf_token"))?;

    params.insert("query".into(), json!(query));
    params.insert("csrfToken".into(), json!(token));
    Ok(true)
}

fn show_record_log_rhp(
    env: &FeatureEnv,
    ctx: &PageContext,
    params: &mut FeatureParams,
) -> Result<bool, HandlerError> {
    let pid = require_pid(ctx)?;
    let record = require(&ctx.record, "record")?;

    params.insert("record".into(), json!(record));
    params.insert(
        "url".into(),
        json!(env.host.versioned_url(&format!("Logging/index.php?pid={pid}"))),
    );
    params.insert(
        "label".into(),
        json!(format!("{}{}", labels::AI_MENU_BADGE, labels::SHOW_LOGGING_LINK)),
    );
    Ok(true)
}

/// Accepts only positive integer project ids.
pub fn sanitize_project_id(raw: &str) -> Option<i64> {
    raw.trim().parse::<i64>().ok().filter(|pid| *pid > 0)
}

/// Escape a value for use inside a single-quoted SQL string literal.
pub fn escape_sql_literal(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '\'' => escaped.push_str("\\'"),
            '"' => escaped.push_str("\\\""),
            '\0' => escaped.push_str("\\0"),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\x1a' => escaped.push_str("\\Z"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
