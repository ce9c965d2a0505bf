//! Preprocessor-defines container.
//!
//! The define set is both the switch panel for conditional shader code paths
//! and the cache key deciding whether a submesh needs a fresh effect.

use std::collections::BTreeMap;

/// Turn a block name into a define-friendly key.
pub fn define_key(name: &str) -> String {
    let mut key: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    if key.is_empty() {
        key.push('_');
    }
    key
}

/// Boolean/int keyed define set with a processed/unprocessed dirty state.
///
/// Mutations only dirty the container when they actually change a value, so
/// a stable scene settles after one readiness pass. Keys are ordered, which
/// makes [`MaterialDefines::to_define_string`] deterministic and usable as a
/// compile key.
#[derive(Clone, Debug, Default)]
pub struct MaterialDefines {
    bools: BTreeMap<String, bool>,
    ints: BTreeMap<String, i32>,
    dirty: bool,
    render_id: u64,
    material_build_id: u64,
}

impl MaterialDefines {
    /// Fresh container for a given material build; starts unprocessed.
    pub fn new(material_build_id: u64) -> Self {
        Self {
            dirty: true,
            material_build_id,
            ..Self::default()
        }
    }

    /// The material build this container was prepared against.
    pub fn material_build_id(&self) -> u64 {
        self.material_build_id
    }

    /// Register a boolean key without dirtying (structural allocation).
    pub fn ensure_bool(&mut self, key: &str) {
        if !self.bools.contains_key(key) {
            self.bools.insert(key.to_string(), false);
        }
    }

    pub fn set_bool(&mut self, key: &str, value: bool) {
        if self.bools.get(key) != Some(&value) {
            self.bools.insert(key.to_string(), value);
            self.dirty = true;
        }
    }

    pub fn bool_value(&self, key: &str) -> bool {
        self.bools.get(key).copied().unwrap_or(false)
    }

    pub fn set_int(&mut self, key: &str, value: i32) {
        if self.ints.get(key) != Some(&value) {
            self.ints.insert(key.to_string(), value);
            self.dirty = true;
        }
    }

    pub fn int_value(&self, key: &str) -> i32 {
        self.ints.get(key).copied().unwrap_or(0)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_as_processed(&mut self) {
        self.dirty = false;
    }

    /// Re-arm the dirty flag so the next readiness check recompiles; used
    /// while a hot-swapped effect is still pending.
    pub fn mark_as_unprocessed(&mut self) {
        self.dirty = true;
    }

    pub fn mark_all_as_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn render_id(&self) -> u64 {
        self.render_id
    }

    pub fn set_render_id(&mut self, render_id: u64) {
        self.render_id = render_id;
    }

    /// Canonical preprocessor text; doubles as the effect cache key.
    pub fn to_define_string(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.bools {
            if *value {
                out.push_str("#define ");
                out.push_str(key);
                out.push('\n');
            }
        }
        for (key, value) in &self.ints {
            out.push_str(&format!("#define {key} {value}\n"));
        }
        out
    }
}
