use serde::Serialize;
use serde_json::json;

use crate::curriculum::CurriculumTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DragKind {
    Section,
    Module,
}

/// Gesture state between discrete input events. Commit is synchronous inside
/// `end`, so only Idle and Dragging are observable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragState {
    Idle,
    Dragging { active_id: String, kind: DragKind },
}

impl DragState {
    pub fn snapshot(&self) -> serde_json::Value {
        match self {
            DragState::Idle => json!({ "state": "idle" }),
            DragState::Dragging { active_id, kind } => json!({
                "state": "dragging",
                "activeId": active_id,
                "kind": kind,
            }),
        }
    }
}

/// Classify the grabbed item by membership in the current section-id set.
/// An id the tree does not know stays Idle.
pub fn start(tree: &CurriculumTree, item_id: &str) -> DragState {
    if tree.has_section(item_id) {
        DragState::Dragging {
            active_id: item_id.to_string(),
            kind: DragKind::Section,
        }
    } else if tree.module(item_id).is_some() {
        DragState::Dragging {
            active_id: item_id.to_string(),
            kind: DragKind::Module,
        }
    } else {
        DragState::Idle
    }
}

/// Drag-over a container (section id, or None = ungrouped). A module hovering
/// over a container other than its own is re-parented to that container's
/// end immediately, so the layout tracks the hover target. The move is
/// provisional in intent only: it is not rolled back if the gesture is later
/// cancelled, the last hovered container wins.
pub fn over_container(
    state: &DragState,
    tree: &CurriculumTree,
    container: Option<&str>,
) -> CurriculumTree {
    let DragState::Dragging { active_id, kind } = state else {
        return tree.clone();
    };
    if *kind != DragKind::Module {
        return tree.clone();
    }
    let Some(module) = tree.module(active_id) else {
        return tree.clone();
    };
    if module.section_id.as_deref() == container {
        return tree.clone();
    }
    let end = tree.container_modules(container).len();
    tree.move_module(active_id, container, end)
}

/// Drop (or release). Dropping a section on another section, or a module on
/// another module in the same container, reorders by the two items' current
/// indices. Same-id drops, missing targets, and kind mismatches end the
/// gesture with no further mutation.
pub fn end(
    state: &DragState,
    tree: &CurriculumTree,
    over_id: Option<&str>,
) -> (CurriculumTree, DragState) {
    let DragState::Dragging { active_id, kind } = state else {
        return (tree.clone(), DragState::Idle);
    };
    let Some(over_id) = over_id else {
        return (tree.clone(), DragState::Idle);
    };
    if over_id == active_id {
        return (tree.clone(), DragState::Idle);
    }

    let next = match kind {
        DragKind::Section => {
            match (tree.section_index(active_id), tree.section_index(over_id)) {
                (Some(from), Some(to)) => tree.move_section(from, to),
                _ => tree.clone(),
            }
        }
        DragKind::Module => {
            let same_container = match (tree.module(active_id), tree.module(over_id)) {
                (Some(a), Some(b)) => a.section_id == b.section_id,
                _ => false,
            };
            if same_container {
                match (tree.module(active_id), tree.container_index(over_id)) {
                    (Some(active), Some(to)) => {
                        let container = active.section_id.clone();
                        tree.move_module(active_id, container.as_deref(), to)
                    }
                    _ => tree.clone(),
                }
            } else {
                tree.clone()
            }
        }
    };
    (next, DragState::Idle)
}
