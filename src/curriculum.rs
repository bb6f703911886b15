use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::identity;
use crate::ordering::{self, Positioned};

pub const COPY_SUFFIX: &str = " (Copy)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    Video,
    Reading,
    Assignment,
    Quiz,
    LiveSession,
}

impl ModuleKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "video" => Some(Self::Video),
            "reading" => Some(Self::Reading),
            "assignment" => Some(Self::Assignment),
            "quiz" => Some(Self::Quiz),
            "live_session" => Some(Self::LiveSession),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Reading => "reading",
            Self::Assignment => "assignment",
            Self::Quiz => "quiz",
            Self::LiveSession => "live_session",
        }
    }
}

/// Content representation for reading modules only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingFormat {
    RichText,
    ExternalLink,
}

impl ReadingFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rich_text" => Some(Self::RichText),
            "external_link" => Some(Self::ExternalLink),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RichText => "rich_text",
            Self::ExternalLink => "external_link",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub course_id: String,
    pub title: String,
    pub description: Option<String>,
    pub position: i64,
    /// View concern only; never persisted.
    pub expanded: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: String,
    pub course_id: String,
    /// None = the ungrouped bucket.
    pub section_id: Option<String>,
    /// 1-based, unique across the whole course, independent of grouping.
    pub module_number: i64,
    pub title: String,
    pub kind: ModuleKind,
    pub reading_format: Option<ReadingFormat>,
    pub duration_minutes: Option<i64>,
    pub required: bool,
    pub free_preview: bool,
    pub unlock_at: Option<String>,
    pub position: i64,
}

impl Positioned for Section {
    fn position(&self) -> i64 {
        self.position
    }
    fn set_position(&mut self, position: i64) {
        self.position = position;
    }
}

impl Positioned for Module {
    fn position(&self) -> i64 {
        self.position
    }
    fn set_position(&mut self, position: i64) {
        self.position = position;
    }
}

#[derive(Debug, Clone, Default)]
pub struct SectionPatch {
    pub title: Option<String>,
    /// Outer Some = field present in the patch; inner None clears it.
    pub description: Option<Option<String>>,
    pub expanded: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ModulePatch {
    pub title: Option<String>,
    pub kind: Option<ModuleKind>,
    pub reading_format: Option<Option<ReadingFormat>>,
    pub duration_minutes: Option<Option<i64>>,
    pub required: Option<bool>,
    pub free_preview: Option<bool>,
    pub unlock_at: Option<Option<String>>,
    /// Present => re-parent; inner None = ungrouped.
    pub section_id: Option<Option<String>>,
}

#[derive(Debug, Clone)]
pub struct ModuleInput {
    pub title: Option<String>,
    pub kind: ModuleKind,
    pub reading_format: Option<ReadingFormat>,
    pub duration_minutes: Option<i64>,
    pub required: bool,
    pub free_preview: bool,
    pub unlock_at: Option<String>,
}

/// One course's sections + modules as an immutable value. Every operation
/// takes `&self` and returns the next tree; callers replace their copy
/// wholesale. "Not found" is a silent no-op returning an unchanged clone.
#[derive(Debug, Clone)]
pub struct CurriculumTree {
    pub course_id: String,
    sections: Vec<Section>,
    /// Flat list kept in canonical course order: each section's modules in
    /// display order, then the ungrouped bucket.
    modules: Vec<Module>,
}

impl CurriculumTree {
    pub fn new(course_id: impl Into<String>) -> Self {
        Self {
            course_id: course_id.into(),
            sections: Vec::new(),
            modules: Vec::new(),
        }
    }

    /// Build from stored rows, already ordered by position. Stored positions
    /// are trusted, not re-validated; a module whose section reference
    /// matches no loaded section lands in the ungrouped bucket.
    pub fn from_rows(
        course_id: impl Into<String>,
        sections: Vec<Section>,
        modules: Vec<Module>,
    ) -> Self {
        let mut tree = Self {
            course_id: course_id.into(),
            sections,
            modules,
        };
        for m in &mut tree.modules {
            let known = m
                .section_id
                .as_deref()
                .map(|sid| tree.sections.iter().any(|s| s.id == sid))
                .unwrap_or(true);
            if !known {
                m.section_id = None;
            }
        }
        tree.normalize();
        tree
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn has_section(&self, id: &str) -> bool {
        self.sections.iter().any(|s| s.id == id)
    }

    pub fn section_index(&self, id: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.id == id)
    }

    pub fn module(&self, id: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.id == id)
    }

    /// Modules of one container (a section, or None = ungrouped) in display
    /// order.
    pub fn container_modules(&self, section_id: Option<&str>) -> Vec<&Module> {
        self.modules
            .iter()
            .filter(|m| m.section_id.as_deref() == section_id)
            .collect()
    }

    /// A module's index within its own container.
    pub fn container_index(&self, module_id: &str) -> Option<usize> {
        let target = self.module(module_id)?;
        self.container_modules(target.section_id.as_deref())
            .iter()
            .position(|m| m.id == module_id)
    }

    pub fn add_section(&self, title: Option<&str>, fallback_title: &str) -> (Self, String) {
        let mut next = self.clone();
        let title = non_empty_or(title, fallback_title);
        let id = identity::placeholder_id();
        next.sections = ordering::append(
            &next.sections,
            Section {
                id: id.clone(),
                course_id: next.course_id.clone(),
                title,
                description: None,
                position: next.sections.len() as i64,
                expanded: true,
            },
        );
        next.normalize();
        (next, id)
    }

    pub fn update_section(&self, id: &str, patch: &SectionPatch, fallback_title: &str) -> Self {
        let mut next = self.clone();
        let Some(section) = next.sections.iter_mut().find(|s| s.id == id) else {
            return next;
        };
        if let Some(title) = &patch.title {
            section.title = non_empty_or(Some(title), fallback_title);
        }
        if let Some(description) = &patch.description {
            section.description = description.clone();
        }
        if let Some(expanded) = patch.expanded {
            section.expanded = expanded;
        }
        next
    }

    /// Remove a section. Its modules are never deleted: they re-parent to
    /// the ungrouped bucket, appended after its existing members in their
    /// previous relative order.
    pub fn delete_section(&self, id: &str) -> Self {
        let mut next = self.clone();
        if !next.has_section(id) {
            return next;
        }
        next.sections = ordering::remove_where(&next.sections, |s| s.id == id);

        let (orphans, kept): (Vec<Module>, Vec<Module>) = next
            .modules
            .drain(..)
            .partition(|m| m.section_id.as_deref() == Some(id));
        next.modules = kept;
        for mut m in orphans {
            m.section_id = None;
            next.modules.push(m);
        }
        next.normalize();
        next
    }

    /// Append a module at the end of the target container. Returns the new
    /// module's id, or None when the target section does not exist.
    pub fn add_module(
        &self,
        section_id: Option<&str>,
        input: &ModuleInput,
        fallback_title: &str,
    ) -> (Self, Option<String>) {
        let mut next = self.clone();
        if let Some(sid) = section_id {
            if !next.has_section(sid) {
                return (next, None);
            }
        }
        let id = identity::placeholder_id();
        let position = next.container_modules(section_id).len() as i64;
        let reading_format = normalize_reading_format(input.kind, input.reading_format);
        next.modules.push(Module {
            id: id.clone(),
            course_id: next.course_id.clone(),
            section_id: section_id.map(str::to_string),
            module_number: next.modules.len() as i64 + 1,
            title: non_empty_or(input.title.as_deref(), fallback_title),
            kind: input.kind,
            reading_format,
            duration_minutes: input.duration_minutes,
            required: input.required,
            free_preview: input.free_preview,
            unlock_at: input.unlock_at.clone(),
            position,
        });
        next.normalize();
        (next, Some(id))
    }

    pub fn update_module(&self, id: &str, patch: &ModulePatch, fallback_title: &str) -> Self {
        let mut next = self.clone();
        let Some(current) = next.module(id) else {
            return next;
        };

        // A section-reference change routes through a move to the end of the
        // new container before the remaining fields merge.
        if let Some(new_ref) = &patch.section_id {
            if new_ref.as_deref() != current.section_id.as_deref() {
                let end = next.container_modules(new_ref.as_deref()).len();
                next = next.move_module(id, new_ref.as_deref(), end);
            }
        }

        let Some(module) = next.modules.iter_mut().find(|m| m.id == id) else {
            return next;
        };
        if let Some(title) = &patch.title {
            module.title = non_empty_or(Some(title), fallback_title);
        }
        if let Some(kind) = patch.kind {
            module.kind = kind;
        }
        if let Some(reading_format) = patch.reading_format {
            module.reading_format = reading_format;
        }
        module.reading_format = normalize_reading_format(module.kind, module.reading_format);
        if let Some(duration) = patch.duration_minutes {
            module.duration_minutes = duration;
        }
        if let Some(required) = patch.required {
            module.required = required;
        }
        if let Some(free_preview) = patch.free_preview {
            module.free_preview = free_preview;
        }
        if let Some(unlock_at) = &patch.unlock_at {
            module.unlock_at = unlock_at.clone();
        }
        next
    }

    pub fn delete_module(&self, id: &str) -> Self {
        let mut next = self.clone();
        let before = next.modules.len();
        next.modules.retain(|m| m.id != id);
        if next.modules.len() != before {
            next.normalize();
        }
        next
    }

    /// Clone a module under a fresh placeholder id, title suffixed
    /// " (Copy)", appended at the end of the source module's container.
    pub fn duplicate_module(&self, id: &str) -> (Self, Option<String>) {
        let mut next = self.clone();
        let Some(source) = next.module(id) else {
            return (next, None);
        };
        let mut clone = source.clone();
        let clone_id = identity::placeholder_id();
        clone.id = clone_id.clone();
        clone.title = format!("{}{}", source.title.trim_end(), COPY_SUFFIX);
        clone.position = next.container_modules(source.section_id.as_deref()).len() as i64;
        next.modules.push(clone);
        next.normalize();
        (next, Some(clone_id))
    }

    /// Re-parent and/or reorder a module. Removal from the source container
    /// and insertion at the clamped destination index both renumber densely;
    /// a same-container move degenerates to a plain reorder.
    pub fn move_module(&self, id: &str, to_section: Option<&str>, to_index: usize) -> Self {
        let mut next = self.clone();
        if let Some(sid) = to_section {
            if !next.has_section(sid) {
                return next;
            }
        }
        let Some(pos) = next.modules.iter().position(|m| m.id == id) else {
            return next;
        };
        let mut moved = next.modules.remove(pos);
        moved.section_id = to_section.map(str::to_string);

        let mut dest: Vec<Module> = Vec::new();
        let mut rest: Vec<Module> = Vec::new();
        for m in next.modules.drain(..) {
            if m.section_id.as_deref() == to_section {
                dest.push(m);
            } else {
                rest.push(m);
            }
        }
        let dest = ordering::insert_at(&dest, moved, to_index);

        next.modules = rest;
        next.modules.extend(dest);
        next.normalize();
        next
    }

    pub fn move_section(&self, from_index: usize, to_index: usize) -> Self {
        let mut next = self.clone();
        next.sections = ordering::move_item(&next.sections, from_index, to_index);
        next.normalize();
        next
    }

    /// Ordered JSON view for the front-end: sections with nested modules,
    /// plus the ungrouped bucket.
    pub fn snapshot(&self) -> serde_json::Value {
        let sections: Vec<serde_json::Value> = self
            .sections
            .iter()
            .map(|s| {
                let modules: Vec<&Module> = self.container_modules(Some(&s.id));
                let mut value = serde_json::to_value(s).unwrap_or_else(|_| json!({}));
                value["modules"] = json!(modules);
                value
            })
            .collect();
        let ungrouped: Vec<&Module> = self.container_modules(None);
        json!({
            "courseId": self.course_id,
            "sections": sections,
            "ungrouped": ungrouped,
        })
    }

    /// Swap placeholder ids for store-assigned ones after a save round-trip.
    /// Section references substitute through the same map, so retrying a
    /// partially failed save routes already-persisted entities to update.
    pub fn apply_assigned_ids(&mut self, map: &identity::IdMap) {
        for s in &mut self.sections {
            s.id = map.resolve(&s.id).to_string();
        }
        for m in &mut self.modules {
            m.id = map.resolve(&m.id).to_string();
            if let Some(sid) = &m.section_id {
                m.section_id = Some(map.resolve(sid).to_string());
            }
        }
    }

    /// Restore the invariants every operation funnels through: dense section
    /// positions, canonical flat module order, dense per-container module
    /// positions, and course-wide module numbers 1..=N.
    fn normalize(&mut self) {
        self.sections = ordering::renumber(&self.sections);

        let mut ordered: Vec<Module> = Vec::with_capacity(self.modules.len());
        for section in &self.sections {
            ordered.extend(
                self.modules
                    .iter()
                    .filter(|m| m.section_id.as_deref() == Some(section.id.as_str()))
                    .cloned(),
            );
        }
        ordered.extend(
            self.modules
                .iter()
                .filter(|m| m.section_id.is_none())
                .cloned(),
        );

        let mut container_counts: std::collections::HashMap<Option<String>, i64> =
            std::collections::HashMap::new();
        for (i, m) in ordered.iter_mut().enumerate() {
            let count = container_counts.entry(m.section_id.clone()).or_insert(0);
            m.position = *count;
            *count += 1;
            m.module_number = i as i64 + 1;
        }
        self.modules = ordered;
    }
}

fn non_empty_or(value: Option<&str>, fallback: &str) -> String {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => fallback.to_string(),
    }
}

/// Reading format travels only with reading modules: forced to rich_text
/// when absent on a reading module, cleared for every other kind.
fn normalize_reading_format(
    kind: ModuleKind,
    format: Option<ReadingFormat>,
) -> Option<ReadingFormat> {
    match kind {
        ModuleKind::Reading => Some(format.unwrap_or(ReadingFormat::RichText)),
        _ => None,
    }
}
