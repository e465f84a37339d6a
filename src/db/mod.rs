mod schema;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::Value;

use crate::features::ProjectMetadata;
use crate::models::*;
use insights_core::toggle::ToggleStore;

const DEBUG_MODE_KEY: &str = "debug-mode";

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_default() -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "admin-insights")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        let db_path = dirs.data_dir().join("admin-insights.db");
        Self::open(db_path)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Project settings
    // ============================================================

    pub fn get_project_setting(&self, project_id: i64, key: &str) -> Result<Option<Value>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        read_project_setting(&conn, project_id, key)
    }

    pub fn set_project_setting(&self, project_id: i64, key: &str, value: &Value) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        write_project_setting(&conn, project_id, key, value)
    }

    pub fn remove_project_setting(&self, project_id: i64, key: &str) -> Result<bool> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let rows = conn.execute(
            "DELETE FROM project_settings WHERE project_id = ? AND key = ?",
            (project_id, key),
        )?;
        Ok(rows > 0)
    }

    // ============================================================
    // Feature toggle state
    // ============================================================

    /// Toggle state of a feature in a project. Unset reads as off.
    pub fn get_feature_state(&self, project_id: i64, feature: &str) -> Result<FeatureState> {
        let value = self.get_project_setting(project_id, &setting_key(feature))?;
        Ok(FeatureState::from(value.as_ref().is_some_and(is_truthy)))
    }

    pub fn set_feature_state(
        &self,
        project_id: i64,
        feature: &str,
        state: FeatureState,
    ) -> Result<FeatureState> {
        self.set_project_setting(project_id, &setting_key(feature), &Value::Bool(state.is_on()))?;
        tracing::debug!(project_id, feature, state = state.as_str(), "Feature state set");
        Ok(state)
    }

    /// Flip a feature's state and return the new one. Read and write happen
    /// under the same connection lock.
    pub fn toggle_feature_state(&self, project_id: i64, feature: &str) -> Result<FeatureState> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let key = setting_key(feature);
        let current = read_project_setting(&conn, project_id, &key)?;
        let next = FeatureState::from(current.as_ref().is_some_and(is_truthy)).flipped();
        write_project_setting(&conn, project_id, &key, &Value::Bool(next.is_on()))?;
        tracing::info!(project_id, feature, state = next.as_str(), "Feature toggled");
        Ok(next)
    }

    // ============================================================
    // System settings
    // ============================================================

    pub fn get_system_setting(&self, key: &str) -> Result<Option<Value>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM system_settings WHERE key = ?",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|s| serde_json::from_str(&s).map_err(Into::into))
            .transpose()
    }

    pub fn set_system_setting(&self, key: &str, value: &Value) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        conn.execute(
            "INSERT INTO system_settings (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            (key, serde_json::to_string(value)?, Utc::now().to_rfc3339()),
        )?;
        Ok(())
    }

    pub fn debug_mode(&self) -> Result<bool> {
        Ok(self
            .get_system_setting(DEBUG_MODE_KEY)?
            .as_ref()
            .is_some_and(is_truthy))
    }

    pub fn set_debug_mode(&self, enabled: bool) -> Result<()> {
        self.set_system_setting(DEBUG_MODE_KEY, &Value::Bool(enabled))
    }

    // ============================================================
    // Project metadata
    // ============================================================

    /// Replace everything known about a project's metadata.
    pub fn sync_project_metadata(
        &self,
        project_id: i64,
        input: SyncMetadataInput,
    ) -> Result<ProjectInfo> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let now = Utc::now();
        let log_event_table = input
            .log_event_table
            .unwrap_or_else(|| DEFAULT_LOG_EVENT_TABLE.to_string());

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO projects (project_id, log_event_table, synced_at) VALUES (?, ?, ?)
             ON CONFLICT(project_id) DO UPDATE SET
                log_event_table = excluded.log_event_table,
                synced_at = excluded.synced_at",
            (project_id, &log_event_table, now.to_rfc3339()),
        )?;
        tx.execute(
            "DELETE FROM project_fields WHERE project_id = ?",
            [project_id],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO project_fields (project_id, field_name, form_name, field_order, misc, survey_page)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )?;
            for field in &input.fields {
                stmt.execute((
                    project_id,
                    &field.field_name,
                    &field.form_name,
                    field.field_order,
                    &field.misc,
                    field.survey_page,
                ))?;
            }
        }
        tx.commit()?;

        tracing::info!(
            project_id,
            fields = input.fields.len(),
            "Project metadata synced"
        );

        Ok(ProjectInfo {
            project_id,
            log_event_table,
            synced_at: now,
        })
    }

    pub fn get_project_info(&self, project_id: i64) -> Result<Option<ProjectInfo>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let info = conn
            .query_row(
                "SELECT project_id, log_event_table, synced_at FROM projects WHERE project_id = ?",
                [project_id],
                |row| {
                    Ok(ProjectInfo {
                        project_id: row.get(0)?,
                        log_event_table: row.get(1)?,
                        synced_at: parse_datetime(row.get::<_, String>(2)?),
                    })
                },
            )
            .optional()?;
        Ok(info)
    }

    /// Fields of a form in display order.
    pub fn get_form_fields(&self, project_id: i64, form: &str) -> Result<Vec<FieldMetadata>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT field_name, form_name, field_order, misc, survey_page
             FROM project_fields WHERE project_id = ? AND form_name = ? ORDER BY field_order",
        )?;

        let fields = stmt
            .query_map((project_id, form), map_field)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(fields)
    }

    /// Fields shown on one page of a survey form, in display order.
    pub fn get_survey_page_fields(
        &self,
        project_id: i64,
        form: &str,
        page: u32,
    ) -> Result<Vec<FieldMetadata>> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let mut stmt = conn.prepare(
            "SELECT field_name, form_name, field_order, misc, survey_page
             FROM project_fields
             WHERE project_id = ? AND form_name = ? AND COALESCE(survey_page, 1) = ?
             ORDER BY field_order",
        )?;

        let fields = stmt
            .query_map((project_id, form, page), map_field)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(fields)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
        }
    }
}

impl ToggleStore for Database {
    type Error = anyhow::Error;

    fn get(&self, scope: i64, feature: &str) -> Result<bool> {
        Ok(self.get_feature_state(scope, feature)?.is_on())
    }

    fn set(&self, scope: i64, feature: &str, on: bool) -> Result<()> {
        self.set_feature_state(scope, feature, FeatureState::from(on))?;
        Ok(())
    }

    fn toggle(&self, scope: i64, feature: &str) -> Result<bool> {
        Ok(self.toggle_feature_state(scope, feature)?.is_on())
    }
}

impl ProjectMetadata for Database {
    fn form_fields(&self, project_id: i64, form: &str) -> Result<Vec<FieldMetadata>> {
        self.get_form_fields(project_id, form)
    }

    fn survey_page_fields(
        &self,
        project_id: i64,
        form: &str,
        page: u32,
    ) -> Result<Vec<FieldMetadata>> {
        self.get_survey_page_fields(project_id, form, page)
    }

    fn log_event_table(&self, project_id: i64) -> Result<String> {
        Ok(self
            .get_project_info(project_id)?
            .map(|info| info.log_event_table)
            .unwrap_or_else(|| DEFAULT_LOG_EVENT_TABLE.to_string()))
    }
}

fn read_project_setting(conn: &Connection, project_id: i64, key: &str) -> Result<Option<Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM project_settings WHERE project_id = ? AND key = ?",
            (project_id, key),
            |row| row.get(0),
        )
        .optional()?;
    raw.map(|s| serde_json::from_str(&s).map_err(Into::into))
        .transpose()
}

fn write_project_setting(conn: &Connection, project_id: i64, key: &str, value: &Value) -> Result<()> {
    conn.execute(
        "INSERT INTO project_settings (project_id, key, value, updated_at) VALUES (?, ?, ?, ?)
         ON CONFLICT(project_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        (
            project_id,
            key,
            serde_json::to_string(value)?,
            Utc::now().to_rfc3339(),
        ),
    )?;
    Ok(())
}

fn map_field(row: &rusqlite::Row<'_>) -> rusqlite::Result<FieldMetadata> {
    Ok(FieldMetadata {
        field_name: row.get(0)?,
        form_name: row.get(1)?,
        field_order: row.get(2)?,
        misc: row.get(3)?,
        survey_page: row.get(4)?,
    })
}

/// Loose truthiness of a stored setting (`true`, non-zero, non-empty).
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty() && s != "0" && s != "false",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Null => false,
    }
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
