//! Per-build bookkeeping shared between the two stage states.

use std::collections::HashMap;
use std::fmt;

use crate::blocks::BlockId;
use crate::types::ValueType;

/// Facts discovered while emitting code that outlive the build.
#[derive(Clone, Copy, Debug, Default)]
pub struct CompilationHints {
    pub need_world_view_matrix: bool,
    pub need_world_view_projection_matrix: bool,
    pub need_alpha_blending: bool,
    pub need_alpha_testing: bool,
}

/// A non-fatal problem noticed during a build, attributed to a block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilationIssue {
    pub block: String,
    pub message: String,
}

impl fmt::Display for CompilationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.block, self.message)
    }
}

/// State shared by both stages of a single build.
///
/// Recreated from scratch on every build so no stale classification or
/// naming survives a rebuild. Block lists hold arena ids in discovery
/// order, which keeps every downstream pass deterministic.
#[derive(Debug)]
pub struct SharedData {
    pub build_id: u64,
    pub emit_comments: bool,
    pub verbose: bool,
    pub hints: CompilationHints,

    pub blocking_blocks: Vec<BlockId>,
    pub blocks_with_defines: Vec<BlockId>,
    pub repeatable_content_blocks: Vec<BlockId>,
    pub dynamic_uniform_blocks: Vec<BlockId>,
    pub bindable_blocks: Vec<BlockId>,
    pub blocks_with_fallbacks: Vec<BlockId>,
    pub texture_blocks: Vec<BlockId>,
    pub input_blocks: Vec<BlockId>,
    pub animated_inputs: Vec<BlockId>,

    issues: Vec<CompilationIssue>,
    variable_names: HashMap<String, u32>,
    varyings: Vec<String>,
    varying_declaration: String,
    repeatable_anchors: u32,
}

impl SharedData {
    pub fn new(build_id: u64, emit_comments: bool, verbose: bool) -> Self {
        Self {
            build_id,
            emit_comments,
            verbose,
            hints: CompilationHints::default(),
            blocking_blocks: Vec::new(),
            blocks_with_defines: Vec::new(),
            repeatable_content_blocks: Vec::new(),
            dynamic_uniform_blocks: Vec::new(),
            bindable_blocks: Vec::new(),
            blocks_with_fallbacks: Vec::new(),
            texture_blocks: Vec::new(),
            input_blocks: Vec::new(),
            animated_inputs: Vec::new(),
            issues: Vec::new(),
            variable_names: HashMap::new(),
            varyings: Vec::new(),
            varying_declaration: String::new(),
            repeatable_anchors: 0,
        }
    }

    /// Hand out a variable name derived from `hint` that no other caller of
    /// this build has received yet.
    pub fn free_variable_name(&mut self, hint: &str) -> String {
        let mut base: String = hint
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        if base.is_empty() {
            base.push('v');
        }
        if base.as_bytes()[0].is_ascii_digit() {
            base.insert(0, '_');
        }
        let count = self.variable_names.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{base}{}", *count - 1)
        }
    }

    /// Declare a varying once; returns false when it already existed.
    pub fn register_varying(&mut self, name: &str, ty: ValueType) -> bool {
        if self.varyings.iter().any(|v| v == name) {
            return false;
        }
        self.varyings.push(name.to_string());
        self.varying_declaration
            .push_str(&format!("varying {} {};\n", ty.glsl_name(), name));
        true
    }

    pub fn varying_declaration(&self) -> &str {
        &self.varying_declaration
    }

    /// Anchor line for content that is re-expanded on every defines change.
    pub fn next_repeatable_anchor(&mut self) -> String {
        let anchor = format!("//__REPEATABLE_CONTENT_{}__", self.repeatable_anchors);
        self.repeatable_anchors += 1;
        anchor
    }

    pub fn push_issue(&mut self, block: impl Into<String>, message: impl Into<String>) {
        self.issues.push(CompilationIssue {
            block: block.into(),
            message: message.into(),
        });
    }

    pub fn issues(&self) -> &[CompilationIssue] {
        &self.issues
    }

    pub fn take_issues(&mut self) -> Vec<CompilationIssue> {
        std::mem::take(&mut self.issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_variable_names_never_collide() {
        let mut shared = SharedData::new(0, false, false);
        assert_eq!(shared.free_variable_name("color"), "color");
        assert_eq!(shared.free_variable_name("color"), "color1");
        assert_eq!(shared.free_variable_name("color"), "color2");
    }

    #[test]
    fn hints_are_sanitized_into_identifiers() {
        let mut shared = SharedData::new(0, false, false);
        assert_eq!(shared.free_variable_name("base color!"), "basecolor");
        assert_eq!(shared.free_variable_name("2d"), "_2d");
        assert_eq!(shared.free_variable_name(""), "v");
    }

    #[test]
    fn build_settings_are_carried() {
        let shared = SharedData::new(7, true, true);
        assert_eq!(shared.build_id, 7);
        assert!(shared.emit_comments);
        assert!(shared.verbose);
    }

    #[test]
    fn varyings_declare_once() {
        let mut shared = SharedData::new(0, false, false);
        assert!(shared.register_varying("v_uv", ValueType::Vec2));
        assert!(!shared.register_varying("v_uv", ValueType::Vec2));
        assert_eq!(shared.varying_declaration(), "varying vec2 v_uv;\n");
    }
}
