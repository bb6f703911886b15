use anyhow::Context;
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;

use crate::curriculum::CurriculumTree;
use crate::db;
use crate::identity::{self, IdMap};

#[derive(Debug, Clone, Serialize)]
pub struct BuilderError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl BuilderError {
    fn for_entity(code: &str, entity: &str, entity_id: &str, cause: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: cause.into(),
            details: Some(json!({ "entity": entity, "entityId": entity_id })),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SaveStats {
    pub inserted: usize,
    pub updated: usize,
    pub id_map: IdMap,
}

/// Two bulk reads ordered by position, then the in-memory tree. Stored
/// positions are trusted as-is. A failed read surfaces before any tree
/// value exists.
pub fn load_tree(conn: &Connection, course_id: &str) -> anyhow::Result<CurriculumTree> {
    let sections = db::sections_for_course(conn, course_id)
        .with_context(|| format!("failed to load sections for course {}", course_id))?;
    let modules = db::modules_for_course(conn, course_id)
        .with_context(|| format!("failed to load modules for course {}", course_id))?;
    Ok(CurriculumTree::from_rows(course_id, sections, modules))
}

/// Walk the tree and emit one insert or update per entity: placeholder ids
/// route to insert (the store assigns the real id), persisted ids to update.
/// Sections go first so every module's section reference can substitute
/// through the id map before it is written.
///
/// There is no wrapping transaction. The first failing write aborts the
/// remainder and already-committed writes stay; assigned ids are written
/// back into the tree even on that path, so re-running the save routes the
/// persisted entities to update instead of duplicating them.
pub fn save_tree(conn: &Connection, tree: &mut CurriculumTree) -> Result<SaveStats, BuilderError> {
    let mut stats = SaveStats {
        inserted: 0,
        updated: 0,
        id_map: IdMap::new(),
    };
    let result = write_rows(conn, tree, &mut stats);
    tree.apply_assigned_ids(&stats.id_map);
    result.map(|()| stats)
}

fn write_rows(
    conn: &Connection,
    tree: &CurriculumTree,
    stats: &mut SaveStats,
) -> Result<(), BuilderError> {
    for section in tree.sections() {
        if identity::is_placeholder(&section.id) {
            let assigned = db::insert_section(conn, section).map_err(|e| {
                BuilderError::for_entity("db_insert_failed", "section", &section.id, e.to_string())
            })?;
            stats.id_map.record(&section.id, assigned);
            stats.inserted += 1;
        } else {
            db::update_section(conn, section).map_err(|e| {
                BuilderError::for_entity("db_update_failed", "section", &section.id, e.to_string())
            })?;
            stats.updated += 1;
        }
    }

    for module in tree.modules() {
        let mut row = module.clone();
        row.section_id = row
            .section_id
            .map(|sid| stats.id_map.resolve(&sid).to_string());
        if identity::is_placeholder(&module.id) {
            let assigned = db::insert_module(conn, &row).map_err(|e| {
                BuilderError::for_entity("db_insert_failed", "module", &module.id, e.to_string())
            })?;
            stats.id_map.record(&module.id, assigned);
            stats.inserted += 1;
        } else {
            db::update_module(conn, &row).map_err(|e| {
                BuilderError::for_entity("db_update_failed", "module", &module.id, e.to_string())
            })?;
            stats.updated += 1;
        }
    }
    Ok(())
}
