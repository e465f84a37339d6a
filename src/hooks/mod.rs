//! Host page-event hooks.
//!
//! Each hook call is one render: it builds a [`PageContext`], decides which
//! features to request (caller-side gating by user privileges and toggle
//! state), runs them through the registry and returns what has to be placed
//! into the page. Per-call state lives in [`RenderState`]. Hooks of the same
//! host page share a render id, and the service remembers which render ids
//! already received the client assets for [`PAGE_TTL`].
//!
//! Storage failures while deciding what to render are logged and treated as
//! "off"; a page always gets its output.

mod render;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use insights_core::registry::FeatureRegistry;
use thiserror::Error;
use uuid::Uuid;

use crate::config::HostConfig;
use crate::db::Database;
use crate::features::{labels, FeatureEnv};
use crate::models::*;

pub use render::render_html;

/// Errors surfaced by hook calls.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("Insufficient rights.")]
    Unauthorized,

    #[error("Action '{0}' requires a project context")]
    MissingProject(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// How long a page render id is remembered after its assets were injected.
pub const PAGE_TTL: Duration = Duration::from_secs(300);

/// Upper bound on remembered page renders.
const MAX_PAGES: usize = 10_000;

/// Request-scoped state of one hook call.
#[derive(Debug)]
pub struct RenderState {
    pub render_id: Uuid,
    assets_injected: bool,
    csrf_token: Option<String>,
    injections: Vec<Injection>,
}

impl RenderState {
    /// Continue the page render `render_id`, or start a new one.
    pub fn new(render_id: Option<Uuid>, csrf_token: Option<String>) -> Self {
        Self {
            render_id: render_id.unwrap_or_else(Uuid::new_v4),
            assets_injected: false,
            csrf_token,
            injections: Vec::new(),
        }
    }

    pub fn assets_injected(&self) -> bool {
        self.assets_injected
    }
}

/// Render ids of pages that already received the client assets.
#[derive(Debug, Default)]
struct InjectedPages {
    seen: HashMap<Uuid, Instant>,
}

impl InjectedPages {
    /// Remember `render_id`. Returns `false` if it is already known.
    fn insert(&mut self, render_id: Uuid, now: Instant) -> bool {
        let fresh = |at: &Instant| now.saturating_duration_since(*at) < PAGE_TTL;
        if self.seen.get(&render_id).is_some_and(fresh) {
            return false;
        }
        if self.seen.len() >= MAX_PAGES {
            self.seen.retain(|_, at| fresh(at));
        }
        if self.seen.len() >= MAX_PAGES {
            let oldest = self
                .seen
                .iter()
                .min_by_key(|(_, at)| **at)
                .map(|(id, _)| *id);
            if let Some(oldest) = oldest {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(render_id, now);
        true
    }
}

#[derive(Clone)]
pub struct HookService {
    registry: Arc<FeatureRegistry<FeatureEnv>>,
    db: Database,
    host: Arc<HostConfig>,
    pages: Arc<Mutex<InjectedPages>>,
}

impl HookService {
    pub fn new(registry: FeatureRegistry<FeatureEnv>, db: Database, host: HostConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            db,
            host: Arc::new(host),
            pages: Arc::default(),
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn host(&self) -> &HostConfig {
        &self.host
    }

    // ============================================================
    // Hooks
    // ============================================================

    pub fn data_entry_form(&self, hook: DataEntryFormHook) -> Result<PageOutput, HookError> {
        let mut render = RenderState::new(hook.render_id, None);
        if !hook.user.is_super_user {
            return Ok(self.finish(render));
        }

        let mut features = vec![REVEAL_HIDDEN];
        if self.feature_state(hook.project_id, DATA_ENTRY_ANNOTATIONS).is_on() {
            features.push(DATA_ENTRY_ANNOTATIONS);
        }

        let ctx = PageContext {
            pid: Some(hook.project_id),
            record: Some(hook.record),
            form: Some(hook.instrument),
            event_id: hook.event_id,
            instance: Some(hook.repeat_instance),
            dag_id: hook.group_id,
            is_survey: false,
            params: hook.params,
            ..Default::default()
        };
        self.add_features(&mut render, &features, &ctx);
        Ok(self.finish(render))
    }

    pub fn survey_page(&self, hook: SurveyPageHook) -> Result<PageOutput, HookError> {
        let mut render = RenderState::new(hook.render_id, None);
        if !hook.user.has_admin_session {
            return Ok(self.finish(render));
        }

        let mut features = vec![REVEAL_HIDDEN];
        if self.feature_state(hook.project_id, SURVEY_ANNOTATIONS).is_on() {
            features.push(SURVEY_ANNOTATIONS);
        }

        let ctx = PageContext {
            pid: Some(hook.project_id),
            record: hook.record,
            form: Some(hook.instrument),
            event_id: hook.event_id,
            instance: Some(hook.repeat_instance),
            dag_id: hook.group_id,
            is_survey: true,
            params: hook.params,
            ..Default::default()
        };
        self.add_features(&mut render, &features, &ctx);
        Ok(self.finish(render))
    }

    pub fn every_page_top(&self, hook: EveryPageTopHook) -> Result<PageOutput, HookError> {
        let mut render = RenderState::new(hook.render_id, hook.csrf_token);
        if !hook.user.is_super_user || hook.page.is_empty() {
            return Ok(self.finish(render));
        }

        let mut ctx = PageContext {
            pid: hook.project_id,
            page: Some(hook.page),
            params: hook.params,
            ..Default::default()
        };

        match hook.page_kind {
            PageKind::DesignerForm { form } => {
                ctx.form = Some(form);
                if let Some(pid) = hook.project_id {
                    if self.feature_state(pid, DESIGNER_ENHANCEMENTS).is_on() {
                        self.add_features(&mut render, &[DESIGNER_ENHANCEMENTS], &ctx);
                    }
                }
            }
            PageKind::RecordHomePage { record, arm } => {
                ctx.record = Some(record);
                ctx.arm = arm;
                self.add_features(&mut render, &[SHOW_RECORD_LOG_RHP, QUERY_RECORD_RHP], &ctx);
            }
            PageKind::DatabaseQueryTool if ctx.param("ai-query-for").is_some() => {
                self.add_features(&mut render, &[QUERY_RECORD_DQT], &ctx);
            }
            PageKind::Survey => {
                ctx.is_survey = true;
            }
            PageKind::DatabaseQueryTool | PageKind::Other => {}
        }

        // Project pages always get the client dispatcher, even without features.
        if !ctx.is_survey && hook.project_id.is_some() && !render.assets_injected {
            self.add_features::<&str>(&mut render, &[], &ctx);
        }
        Ok(self.finish(render))
    }

    /// Decorate the module's own admin links. Returns `None` for links that
    /// should not be shown.
    pub fn link_check_display(&self, hook: LinkCheckHook) -> Result<Option<ModuleLink>, HookError> {
        if !hook.user.is_super_user {
            return Ok(None);
        }
        let Some(pid) = hook.project_id else {
            return Ok(None);
        };
        let Some(feature) = parse_toggle_action(&hook.link.key)
            .filter(|f| is_toggleable(f))
            .map(str::to_string)
        else {
            return Ok(None);
        };
        let Some(label) = labels::toggle_link_label(&feature) else {
            return Ok(None);
        };

        let state = self.feature_state(pid, &feature);
        let mut link = hook.link;
        link.name = format!(
            "{}{}<span id=\"ai-{}-state\">{}</span>",
            labels::AI_BADGE,
            label,
            feature,
            state_icon(state)
        );
        Ok(Some(link))
    }

    /// Out-of-band actions. Authorization failures reject the request.
    pub fn module_ajax(&self, action: &str, request: AjaxRequest) -> Result<AjaxResponse, HookError> {
        if !request.user.is_super_user {
            tracing::warn!(action, user = ?request.user.user_id, "Rejected action from non-super user");
            return Err(HookError::Unauthorized);
        }

        if let Some(feature) = parse_toggle_action(action).filter(|f| is_toggleable(f)) {
            let pid = request
                .project_id
                .ok_or_else(|| HookError::MissingProject(action.to_string()))?;
            let state = self.db.toggle_feature_state(pid, feature)?;
            return Ok(AjaxResponse {
                result: Some(state_icon(state).to_string()),
            });
        }

        match action {
            "get-feature-dialog" => Ok(AjaxResponse {
                result: Some(feature_dialog()),
            }),
            _ => {
                tracing::debug!(action, "Unhandled action");
                Ok(AjaxResponse::default())
            }
        }
    }

    // ============================================================
    // Feature management
    // ============================================================

    /// Run `features` through the registry and queue the resulting payload.
    /// May be called several times per render; assets are queued only once
    /// per page.
    pub fn add_features<S: AsRef<str>>(
        &self,
        render: &mut RenderState,
        features: &[S],
        ctx: &PageContext,
    ) {
        let env = FeatureEnv {
            metadata: Arc::new(self.db.clone()),
            host: self.host.clone(),
            csrf_token: render.csrf_token.clone(),
        };
        let config = self.registry.assemble(features, ctx, &env);
        if !config.errors.is_empty() {
            tracing::warn!(
                render_id = %render.render_id,
                errors = config.errors.len(),
                "Some features failed to set up"
            );
        }

        if !render.assets_injected {
            if self.first_on_page(render.render_id) {
                render.injections.push(Injection::Assets {
                    js: self.host.script_url(),
                    css: self.host.stylesheet_url(),
                });
            } else {
                tracing::debug!(render_id = %render.render_id, "Assets already on page");
            }
            render.assets_injected = true;
        }

        let debug = self.db.debug_mode().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read debug mode, assuming off");
            false
        });
        let payload = PagePayload::new(config, self.host.module_version.clone(), debug);
        render.injections.push(Injection::Init { payload });
    }

    fn first_on_page(&self, render_id: Uuid) -> bool {
        self.pages
            .lock()
            .expect("page registry lock poisoned")
            .insert(render_id, Instant::now())
    }

    fn finish(&self, render: RenderState) -> PageOutput {
        let html = render_html(&render.injections, &self.host);
        PageOutput {
            render_id: render.render_id,
            injections: render.injections,
            html,
        }
    }

    /// Toggle state for gating. Unreadable state counts as off.
    fn feature_state(&self, project_id: i64, feature: &str) -> FeatureState {
        self.db
            .get_feature_state(project_id, feature)
            .unwrap_or_else(|e| {
                tracing::error!(project_id, feature, error = %e, "Failed to read feature state");
                FeatureState::Off
            })
    }
}

pub fn state_icon(state: FeatureState) -> &'static str {
    match state {
        FeatureState::On => labels::STATE_ON_ICON,
        FeatureState::Off => labels::STATE_OFF_ICON,
    }
}

fn feature_dialog() -> String {
    format!(
        r#"<div id="ai-feature-dialog" class="modal modal-dialog-centered modal-dialog-scrollable modal-lg" tabindex="-1">
    <div class="modal-dialog">
        <div class="modal-content">
            <div class="modal-header">
                <h5 class="modal-title">{badge} {title}</h5>
                <button type="button" class="btn-close" data-bs-dismiss="modal" aria-label="Close"></button>
            </div>
            <div class="modal-body"></div>
            <div class="modal-footer">
                <button type="button" class="btn btn-secondary" data-bs-dismiss="modal">Close</button>
            </div>
        </div>
    </div>
</div>"#,
        badge = labels::AI_BADGE,
        title = labels::FEATURE_DIALOG_TITLE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_is_known_until_it_expires() {
        let mut pages = InjectedPages::default();
        let id = Uuid::new_v4();
        let start = Instant::now();

        assert!(pages.insert(id, start));
        assert!(!pages.insert(id, start + Duration::from_secs(1)));
        assert!(pages.insert(id, start + PAGE_TTL + Duration::from_secs(1)));
    }

    #[test]
    fn remembered_pages_are_bounded() {
        let mut pages = InjectedPages::default();
        let start = Instant::now();
        let first = Uuid::new_v4();
        pages.insert(first, start);
        for i in 1..=MAX_PAGES {
            pages.insert(Uuid::new_v4(), start + Duration::from_millis(i as u64));
        }

        assert_eq!(pages.seen.len(), MAX_PAGES);
        assert!(!pages.seen.contains_key(&first));
    }
}
