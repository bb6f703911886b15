use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

use crate::curriculum::{Module, ModuleKind, ReadingFormat, Section};

pub const DB_FILE: &str = "coursedesk.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_sections(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            position INTEGER NOT NULL,
            FOREIGN KEY(course_id) REFERENCES courses(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_course_sections_course ON course_sections(course_id, position)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS course_modules(
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL,
            section_id TEXT,
            module_number INTEGER NOT NULL,
            title TEXT NOT NULL,
            kind TEXT NOT NULL,
            reading_format TEXT,
            duration_minutes INTEGER,
            required INTEGER NOT NULL DEFAULT 1,
            free_preview INTEGER NOT NULL DEFAULT 0,
            unlock_at TEXT,
            position INTEGER NOT NULL,
            FOREIGN KEY(course_id) REFERENCES courses(id),
            FOREIGN KEY(section_id) REFERENCES course_sections(id)
        )",
        [],
    )?;
    // Workspaces created before unlock scheduling shipped lack the column.
    ensure_modules_unlock_at(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_course_modules_course ON course_modules(course_id, position)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_course_modules_section ON course_modules(section_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(conn)
}

fn ensure_modules_unlock_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "course_modules", "unlock_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE course_modules ADD COLUMN unlock_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn course_exists(conn: &Connection, course_id: &str) -> anyhow::Result<bool> {
    let found = conn
        .query_row("SELECT 1 FROM courses WHERE id = ?", [course_id], |_r| {
            Ok(())
        })
        .optional()?;
    Ok(found.is_some())
}

pub fn sections_for_course(conn: &Connection, course_id: &str) -> anyhow::Result<Vec<Section>> {
    let mut stmt = conn.prepare(
        "SELECT id, course_id, title, description, position
         FROM course_sections
         WHERE course_id = ?
         ORDER BY position, id",
    )?;
    let rows = stmt
        .query_map([course_id], |row| {
            Ok(Section {
                id: row.get(0)?,
                course_id: row.get(1)?,
                title: row.get(2)?,
                description: row.get(3)?,
                position: row.get(4)?,
                // View-only; everything loads expanded.
                expanded: true,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn modules_for_course(conn: &Connection, course_id: &str) -> anyhow::Result<Vec<Module>> {
    let mut stmt = conn.prepare(
        "SELECT id, course_id, section_id, module_number, title, kind, reading_format,
                duration_minutes, required, free_preview, unlock_at, position
         FROM course_modules
         WHERE course_id = ?
         ORDER BY position, id",
    )?;
    let rows = stmt
        .query_map([course_id], |row| {
            let kind_raw: String = row.get(5)?;
            let format_raw: Option<String> = row.get(6)?;
            Ok(Module {
                id: row.get(0)?,
                course_id: row.get(1)?,
                section_id: row.get(2)?,
                module_number: row.get(3)?,
                title: row.get(4)?,
                // Unknown stored kinds degrade to video rather than failing
                // the whole load.
                kind: ModuleKind::parse(&kind_raw).unwrap_or(ModuleKind::Video),
                reading_format: format_raw.as_deref().and_then(ReadingFormat::parse),
                duration_minutes: row.get(7)?,
                required: row.get::<_, i64>(8)? != 0,
                free_preview: row.get::<_, i64>(9)? != 0,
                unlock_at: row.get(10)?,
                position: row.get(11)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Insert a section row; the store assigns and returns the id. The caller's
/// placeholder id is never written.
pub fn insert_section(conn: &Connection, section: &Section) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO course_sections(id, course_id, title, description, position)
         VALUES(?, ?, ?, ?, ?)",
        (
            &id,
            &section.course_id,
            &section.title,
            &section.description,
            section.position,
        ),
    )?;
    Ok(id)
}

pub fn update_section(conn: &Connection, section: &Section) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE course_sections SET title = ?, description = ?, position = ? WHERE id = ?",
        (
            &section.title,
            &section.description,
            section.position,
            &section.id,
        ),
    )?;
    Ok(())
}

/// Insert a module row; `module.section_id` must already be a persisted
/// section id (resolved through the save's id map).
pub fn insert_module(conn: &Connection, module: &Module) -> anyhow::Result<String> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO course_modules(
            id, course_id, section_id, module_number, title, kind, reading_format,
            duration_minutes, required, free_preview, unlock_at, position
         ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &id,
            &module.course_id,
            &module.section_id,
            module.module_number,
            &module.title,
            module.kind.as_str(),
            module.reading_format.map(ReadingFormat::as_str),
            module.duration_minutes,
            module.required as i64,
            module.free_preview as i64,
            &module.unlock_at,
            module.position,
        ),
    )?;
    Ok(id)
}

pub fn update_module(conn: &Connection, module: &Module) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE course_modules SET
            section_id = ?, module_number = ?, title = ?, kind = ?, reading_format = ?,
            duration_minutes = ?, required = ?, free_preview = ?, unlock_at = ?, position = ?
         WHERE id = ?",
        (
            &module.section_id,
            module.module_number,
            &module.title,
            module.kind.as_str(),
            module.reading_format.map(ReadingFormat::as_str),
            module.duration_minutes,
            module.required as i64,
            module.free_preview as i64,
            &module.unlock_at,
            module.position,
            &module.id,
        ),
    )?;
    Ok(())
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(
    conn: &Connection,
    key: &str,
    value: &serde_json::Value,
) -> anyhow::Result<()> {
    let text = serde_json::to_string(value)?;
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, text),
    )?;
    Ok(())
}
