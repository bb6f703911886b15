use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Prefix reserved for client-issued ids. Persisted ids are store-assigned
/// UUIDv4 strings, which can never start with this.
const PLACEHOLDER_PREFIX: &str = "local-";

static NEXT_PLACEHOLDER: AtomicU64 = AtomicU64::new(1);

/// Issue a placeholder id distinct from every id issued earlier in this
/// process and recognizable as not-yet-persisted.
pub fn placeholder_id() -> String {
    let n = NEXT_PLACEHOLDER.fetch_add(1, Ordering::Relaxed);
    format!("{}{}", PLACEHOLDER_PREFIX, n)
}

/// The save path routes on this: placeholder => insert, otherwise => update.
pub fn is_placeholder(id: &str) -> bool {
    id.starts_with(PLACEHOLDER_PREFIX)
}

/// Placeholder-id to store-assigned-id substitutions collected during a save.
#[derive(Debug, Default, Clone)]
pub struct IdMap {
    map: HashMap<String, String>,
}

impl IdMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, placeholder: impl Into<String>, assigned: impl Into<String>) {
        self.map.insert(placeholder.into(), assigned.into());
    }

    /// Resolve an id through the map; persisted ids pass through unchanged.
    pub fn resolve<'a>(&'a self, id: &'a str) -> &'a str {
        match self.map.get(id) {
            Some(assigned) => assigned.as_str(),
            None => id,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.map.iter()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
