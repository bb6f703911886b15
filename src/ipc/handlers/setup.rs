use crate::db;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Map, Value};

#[derive(Clone, Copy)]
enum SetupSection {
    Curriculum,
}

impl SetupSection {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "curriculum" => Some(Self::Curriculum),
            _ => None,
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Curriculum => "setup.curriculum",
        }
    }
}

fn default_section(section: SetupSection) -> Value {
    match section {
        SetupSection::Curriculum => json!({
            "defaultSectionTitle": "New Section",
            "defaultModuleTitle": "New Module",
            "defaultDurationMinutes": 0
        }),
    }
}

fn as_object_mut(value: &mut Value) -> Result<&mut Map<String, Value>, String> {
    value
        .as_object_mut()
        .ok_or_else(|| "internal setup object must be a JSON object".to_string())
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_title_default(v: &Value, key: &str) -> Result<String, String> {
    let s = v
        .as_str()
        .ok_or_else(|| format!("{} must be string", key))?
        .trim();
    if s.is_empty() {
        return Err(format!("{} must not be empty", key));
    }
    if s.len() > 80 {
        return Err(format!("{} length must be <= 80", key));
    }
    Ok(s.to_string())
}

fn merge_section_patch(
    section: SetupSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = as_object_mut(current)?;
    for (k, v) in patch {
        match section {
            SetupSection::Curriculum => match k.as_str() {
                "defaultSectionTitle" | "defaultModuleTitle" => {
                    obj.insert(k.clone(), Value::String(parse_title_default(v, k)?));
                }
                // 0 = do not pre-fill a duration on new modules.
                "defaultDurationMinutes" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 0, 600)?));
                }
                _ => return Err(format!("unknown curriculum field: {}", k)),
            },
        }
    }
    Ok(())
}

fn load_section(conn: &rusqlite::Connection, section: SetupSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Best-effort apply: malformed historical values should not block setup UI.
            let _ = merge_section_patch(section, &mut current, saved_obj);
        }
    }
    Ok(current)
}

/// Builder defaults for the curriculum handlers: fallback titles and the
/// optional duration pre-fill. Falls back to the compiled defaults when no
/// workspace is open or the settings row is unreadable.
pub fn curriculum_defaults(conn: Option<&rusqlite::Connection>) -> (String, String, Option<i64>) {
    let value = conn
        .and_then(|c| load_section(c, SetupSection::Curriculum).ok())
        .unwrap_or_else(|| default_section(SetupSection::Curriculum));
    let section_title = value
        .get("defaultSectionTitle")
        .and_then(|v| v.as_str())
        .unwrap_or("New Section")
        .to_string();
    let module_title = value
        .get("defaultModuleTitle")
        .and_then(|v| v.as_str())
        .unwrap_or("New Module")
        .to_string();
    let duration = value
        .get("defaultDurationMinutes")
        .and_then(|v| v.as_i64())
        .filter(|n| *n > 0);
    (section_title, module_title, duration)
}

fn handle_setup_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let curriculum = match load_section(conn, SetupSection::Curriculum) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    ok(&req.id, json!({ "curriculum": curriculum }))
}

fn handle_setup_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(section_raw) = req.params.get("section").and_then(|v| v.as_str()) else {
        return err(&req.id, "bad_params", "missing section", None);
    };
    let Some(section) = SetupSection::parse(section_raw) else {
        return err(&req.id, "bad_params", "unknown section", None);
    };
    let Some(patch_obj) = req.params.get("patch").and_then(|v| v.as_object()) else {
        return err(&req.id, "bad_params", "patch must be an object", None);
    };

    let mut current = match load_section(conn, section) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if let Err(msg) = merge_section_patch(section, &mut current, patch_obj) {
        return err(&req.id, "bad_params", msg, None);
    }
    if let Err(e) = db::settings_set_json(conn, section.key(), &current) {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }
    ok(&req.id, json!({ "ok": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "setup.get" => Some(handle_setup_get(state, req)),
        "setup.update" => Some(handle_setup_update(state, req)),
        _ => None,
    }
}
