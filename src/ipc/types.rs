use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::curriculum::CurriculumTree;
use crate::drag::DragState;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The single open curriculum builder session. One operator, one course at a
/// time; opening another course replaces it wholesale.
pub struct BuilderSession {
    pub course_id: String,
    pub tree: CurriculumTree,
    pub drag: DragState,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub builder: Option<BuilderSession>,
}
