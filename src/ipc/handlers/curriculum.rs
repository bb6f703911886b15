use chrono::{DateTime, NaiveDate};
use serde_json::{json, Value as JsonValue};

use crate::builder;
use crate::curriculum::{ModuleInput, ModuleKind, ModulePatch, ReadingFormat, SectionPatch};
use crate::db;
use crate::drag;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, BuilderSession, Request};

use super::setup;

fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

fn required_index(req: &Request, key: &str) -> Result<usize, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .ok_or_else(|| {
            err(
                &req.id,
                "bad_params",
                format!("{} must be a non-negative integer", key),
                None,
            )
        })
}

/// Nullable string param: absent and null both mean None.
fn optional_str(params: &JsonValue, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_kind(v: &JsonValue) -> Result<ModuleKind, String> {
    v.as_str()
        .and_then(ModuleKind::parse)
        .ok_or_else(|| "kind must be one of: video, reading, assignment, quiz, live_session".into())
}

fn parse_reading_format(v: &JsonValue) -> Result<Option<ReadingFormat>, String> {
    if v.is_null() {
        return Ok(None);
    }
    v.as_str()
        .and_then(ReadingFormat::parse)
        .map(Some)
        .ok_or_else(|| "readingFormat must be one of: rich_text, external_link".into())
}

fn parse_duration(v: &JsonValue) -> Result<Option<i64>, String> {
    if v.is_null() {
        return Ok(None);
    }
    match v.as_i64() {
        Some(n) if n >= 0 => Ok(Some(n)),
        _ => Err("durationMinutes must be a non-negative integer or null".into()),
    }
}

/// Unlock timestamps are a plain date or an RFC 3339 date-time.
fn parse_unlock_at(v: &JsonValue) -> Result<Option<String>, String> {
    if v.is_null() {
        return Ok(None);
    }
    let s = v
        .as_str()
        .ok_or_else(|| "unlockAt must be string or null".to_string())?
        .trim();
    if s.is_empty() {
        return Ok(None);
    }
    if NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok() || DateTime::parse_from_rfc3339(s).is_ok() {
        Ok(Some(s.to_string()))
    } else {
        Err("unlockAt must be YYYY-MM-DD or an RFC 3339 date-time".into())
    }
}

fn parse_module_input(params: &JsonValue, default_duration: Option<i64>) -> Result<ModuleInput, String> {
    let Some(input) = params.get("input").and_then(|v| v.as_object()) else {
        return Err("missing input".into());
    };
    let kind = parse_kind(input.get("kind").unwrap_or(&JsonValue::Null))?;
    let reading_format = match input.get("readingFormat") {
        Some(v) => parse_reading_format(v)?,
        None => None,
    };
    let duration_minutes = match input.get("durationMinutes") {
        Some(v) => parse_duration(v)?,
        None => default_duration,
    };
    let required = match input.get("required") {
        Some(v) if !v.is_null() => v.as_bool().ok_or("required must be boolean")?,
        _ => true,
    };
    let free_preview = match input.get("freePreview") {
        Some(v) if !v.is_null() => v.as_bool().ok_or("freePreview must be boolean")?,
        _ => false,
    };
    let unlock_at = match input.get("unlockAt") {
        Some(v) => parse_unlock_at(v)?,
        None => None,
    };
    Ok(ModuleInput {
        title: input
            .get("title")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        kind,
        reading_format,
        duration_minutes,
        required,
        free_preview,
        unlock_at,
    })
}

fn parse_section_patch(params: &JsonValue) -> Result<SectionPatch, String> {
    let Some(obj) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err("patch must be an object".into());
    };
    let mut patch = SectionPatch::default();
    for (k, v) in obj {
        match k.as_str() {
            "title" => {
                patch.title = Some(v.as_str().ok_or("title must be string")?.to_string());
            }
            "description" => {
                patch.description = Some(if v.is_null() {
                    None
                } else {
                    let s = v.as_str().ok_or("description must be string or null")?.trim();
                    if s.is_empty() {
                        None
                    } else {
                        Some(s.to_string())
                    }
                });
            }
            "expanded" => {
                patch.expanded = Some(v.as_bool().ok_or("expanded must be boolean")?);
            }
            _ => return Err(format!("unknown section field: {}", k)),
        }
    }
    Ok(patch)
}

fn parse_module_patch(params: &JsonValue) -> Result<ModulePatch, String> {
    let Some(obj) = params.get("patch").and_then(|v| v.as_object()) else {
        return Err("patch must be an object".into());
    };
    let mut patch = ModulePatch::default();
    for (k, v) in obj {
        match k.as_str() {
            "title" => {
                patch.title = Some(v.as_str().ok_or("title must be string")?.to_string());
            }
            "kind" => {
                patch.kind = Some(parse_kind(v)?);
            }
            "readingFormat" => {
                patch.reading_format = Some(parse_reading_format(v)?);
            }
            "durationMinutes" => {
                patch.duration_minutes = Some(parse_duration(v)?);
            }
            "required" => {
                patch.required = Some(v.as_bool().ok_or("required must be boolean")?);
            }
            "freePreview" => {
                patch.free_preview = Some(v.as_bool().ok_or("freePreview must be boolean")?);
            }
            "unlockAt" => {
                patch.unlock_at = Some(parse_unlock_at(v)?);
            }
            "sectionId" => {
                patch.section_id = Some(if v.is_null() {
                    None
                } else {
                    Some(
                        v.as_str()
                            .ok_or("sectionId must be string or null")?
                            .to_string(),
                    )
                });
            }
            _ => return Err(format!("unknown module field: {}", k)),
        }
    }
    Ok(patch)
}

fn session_response(req: &Request, session: &BuilderSession, extra: JsonValue) -> serde_json::Value {
    let mut result = json!({ "tree": session.tree.snapshot() });
    if let Some(obj) = extra.as_object() {
        for (k, v) in obj {
            result[k] = v.clone();
        }
    }
    ok(&req.id, result)
}

fn handle_open(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match db::course_exists(conn, &course_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "course not found", None),
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    let tree = match builder::load_tree(conn, &course_id) {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_query_failed", format!("{e:#}"), None),
    };
    tracing::debug!(course = %course_id, modules = tree.module_count(), "builder session opened");

    // Replaces any open session; unsaved edits are the front-end's to flush
    // before navigating away.
    let session = BuilderSession {
        course_id: course_id.clone(),
        tree,
        drag: drag::DragState::Idle,
    };
    let resp = session_response(req, &session, json!({ "courseId": course_id }));
    state.builder = Some(session);
    resp
}

fn handle_tree(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.builder.as_ref() else {
        return err(&req.id, "no_builder", "open a course first", None);
    };
    ok(
        &req.id,
        json!({
            "courseId": session.course_id,
            "tree": session.tree.snapshot(),
            "drag": session.drag.snapshot(),
        }),
    )
}

fn handle_close(state: &mut AppState, req: &Request) -> serde_json::Value {
    state.builder = None;
    ok(&req.id, json!({ "ok": true }))
}

fn handle_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.builder.as_mut() else {
        return err(&req.id, "no_builder", "open a course first", None);
    };

    match builder::save_tree(conn, &mut session.tree) {
        Ok(stats) => {
            let id_map: serde_json::Map<String, JsonValue> = stats
                .id_map
                .iter()
                .map(|(placeholder, assigned)| (placeholder.clone(), json!(assigned)))
                .collect();
            tracing::info!(
                course = %session.course_id,
                inserted = stats.inserted,
                updated = stats.updated,
                "curriculum saved"
            );
            ok(
                &req.id,
                json!({
                    "inserted": stats.inserted,
                    "updated": stats.updated,
                    "idMap": id_map,
                    "tree": session.tree.snapshot(),
                }),
            )
        }
        Err(e) => err(&req.id, &e.code, e.message, e.details),
    }
}

fn handle_sections_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (section_fallback, _, _) = setup::curriculum_defaults(state.db.as_ref());
    let Some(session) = state.builder.as_mut() else {
        return err(&req.id, "no_builder", "open a course first", None);
    };
    let title = optional_str(&req.params, "title");
    let (tree, section_id) = session
        .tree
        .add_section(title.as_deref(), &section_fallback);
    session.tree = tree;
    let session = &*session;
    session_response(req, session, json!({ "sectionId": section_id }))
}

fn handle_sections_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (section_fallback, _, _) = setup::curriculum_defaults(state.db.as_ref());
    let Some(session) = state.builder.as_mut() else {
        return err(&req.id, "no_builder", "open a course first", None);
    };
    let section_id = match required_str(req, "sectionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let patch = match parse_section_patch(&req.params) {
        Ok(p) => p,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    session.tree = session
        .tree
        .update_section(&section_id, &patch, &section_fallback);
    let session = &*session;
    session_response(req, session, json!({ "ok": true }))
}

fn handle_sections_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.builder.as_mut() else {
        return err(&req.id, "no_builder", "open a course first", None);
    };
    let section_id = match required_str(req, "sectionId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    session.tree = session.tree.delete_section(&section_id);
    let session = &*session;
    session_response(req, session, json!({ "ok": true }))
}

fn handle_sections_move(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.builder.as_mut() else {
        return err(&req.id, "no_builder", "open a course first", None);
    };
    let from = match required_index(req, "fromIndex") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let to = match required_index(req, "toIndex") {
        Ok(v) => v,
        Err(e) => return e,
    };
    session.tree = session.tree.move_section(from, to);
    let session = &*session;
    session_response(req, session, json!({ "ok": true }))
}

fn handle_modules_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (_, module_fallback, default_duration) = setup::curriculum_defaults(state.db.as_ref());
    let Some(session) = state.builder.as_mut() else {
        return err(&req.id, "no_builder", "open a course first", None);
    };
    let section_id = optional_str(&req.params, "sectionId");
    let input = match parse_module_input(&req.params, default_duration) {
        Ok(v) => v,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    let (tree, module_id) =
        session
            .tree
            .add_module(section_id.as_deref(), &input, &module_fallback);
    let Some(module_id) = module_id else {
        return err(&req.id, "not_found", "target section not found", None);
    };
    session.tree = tree;
    let session = &*session;
    session_response(req, session, json!({ "moduleId": module_id }))
}

fn handle_modules_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (_, module_fallback, _) = setup::curriculum_defaults(state.db.as_ref());
    let Some(session) = state.builder.as_mut() else {
        return err(&req.id, "no_builder", "open a course first", None);
    };
    let module_id = match required_str(req, "moduleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let patch = match parse_module_patch(&req.params) {
        Ok(p) => p,
        Err(msg) => return err(&req.id, "bad_params", msg, None),
    };
    session.tree = session
        .tree
        .update_module(&module_id, &patch, &module_fallback);
    let session = &*session;
    session_response(req, session, json!({ "ok": true }))
}

fn handle_modules_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.builder.as_mut() else {
        return err(&req.id, "no_builder", "open a course first", None);
    };
    let module_id = match required_str(req, "moduleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    session.tree = session.tree.delete_module(&module_id);
    let session = &*session;
    session_response(req, session, json!({ "ok": true }))
}

fn handle_modules_duplicate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.builder.as_mut() else {
        return err(&req.id, "no_builder", "open a course first", None);
    };
    let module_id = match required_str(req, "moduleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let (tree, clone_id) = session.tree.duplicate_module(&module_id);
    let Some(clone_id) = clone_id else {
        return err(&req.id, "not_found", "module not found", None);
    };
    session.tree = tree;
    let session = &*session;
    session_response(req, session, json!({ "moduleId": clone_id }))
}

fn handle_modules_move(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.builder.as_mut() else {
        return err(&req.id, "no_builder", "open a course first", None);
    };
    let module_id = match required_str(req, "moduleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let index = match required_index(req, "index") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let section_id = optional_str(&req.params, "sectionId");
    session.tree = session
        .tree
        .move_module(&module_id, section_id.as_deref(), index);
    let session = &*session;
    session_response(req, session, json!({ "ok": true }))
}

fn handle_drag_start(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.builder.as_mut() else {
        return err(&req.id, "no_builder", "open a course first", None);
    };
    let item_id = match required_str(req, "itemId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    session.drag = drag::start(&session.tree, &item_id);
    ok(&req.id, json!({ "drag": session.drag.snapshot() }))
}

fn handle_drag_over(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.builder.as_mut() else {
        return err(&req.id, "no_builder", "open a course first", None);
    };
    let container = optional_str(&req.params, "sectionId");
    session.tree = drag::over_container(&session.drag, &session.tree, container.as_deref());
    let session = &*session;
    session_response(req, session, json!({ "drag": session.drag.snapshot() }))
}

fn handle_drag_end(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.builder.as_mut() else {
        return err(&req.id, "no_builder", "open a course first", None);
    };
    let over_id = optional_str(&req.params, "overId");
    let (tree, drag_state) = drag::end(&session.drag, &session.tree, over_id.as_deref());
    session.tree = tree;
    session.drag = drag_state;
    let session = &*session;
    session_response(req, session, json!({ "drag": session.drag.snapshot() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "curriculum.open" => Some(handle_open(state, req)),
        "curriculum.tree" => Some(handle_tree(state, req)),
        "curriculum.close" => Some(handle_close(state, req)),
        "curriculum.save" => Some(handle_save(state, req)),
        "curriculum.sections.add" => Some(handle_sections_add(state, req)),
        "curriculum.sections.update" => Some(handle_sections_update(state, req)),
        "curriculum.sections.delete" => Some(handle_sections_delete(state, req)),
        "curriculum.sections.move" => Some(handle_sections_move(state, req)),
        "curriculum.modules.add" => Some(handle_modules_add(state, req)),
        "curriculum.modules.update" => Some(handle_modules_update(state, req)),
        "curriculum.modules.delete" => Some(handle_modules_delete(state, req)),
        "curriculum.modules.duplicate" => Some(handle_modules_duplicate(state, req)),
        "curriculum.modules.move" => Some(handle_modules_move(state, req)),
        "curriculum.drag.start" => Some(handle_drag_start(state, req)),
        "curriculum.drag.over" => Some(handle_drag_over(state, req)),
        "curriculum.drag.end" => Some(handle_drag_end(state, req)),
        _ => None,
    }
}
