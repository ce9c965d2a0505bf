//! Per-stage shader assembly state.

use crate::blocks::BlockId;
use crate::material::shared_data::SharedData;
use crate::types::{Stage, ValueType};

/// GLSL sampler flavor for a declared sampler uniform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SamplerKind {
    Sampler2D,
    SamplerCube,
}

impl SamplerKind {
    fn glsl_name(self) -> &'static str {
        match self {
            SamplerKind::Sampler2D => "sampler2D",
            SamplerKind::SamplerCube => "samplerCube",
        }
    }
}

/// Accumulates one stage of a build: declarations, the function body, and
/// the per-stage visited set.
///
/// During the build the state holds only the body; [`BuildState::finalize`]
/// assembles the full translation unit and snapshots it so later repeatable
/// content passes can restore a pristine source before re-expanding anchors.
#[derive(Debug)]
pub struct BuildState {
    stage: Stage,
    body: String,
    compilation_string: String,
    built_compilation_string: String,
    attributes: Vec<String>,
    uniforms: Vec<String>,
    samplers: Vec<String>,
    constants: Vec<String>,
    attribute_declaration: String,
    uniform_declaration: String,
    constant_declaration: String,
    sampler_declaration: String,
    built: Vec<bool>,
}

impl BuildState {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            body: String::new(),
            compilation_string: String::new(),
            built_compilation_string: String::new(),
            attributes: Vec::new(),
            uniforms: Vec::new(),
            samplers: Vec::new(),
            constants: Vec::new(),
            attribute_declaration: String::new(),
            uniform_declaration: String::new(),
            constant_declaration: String::new(),
            sampler_declaration: String::new(),
            built: Vec::new(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub(crate) fn is_built(&self, id: BlockId) -> bool {
        self.built.get(id.index()).copied().unwrap_or(false)
    }

    pub(crate) fn mark_built(&mut self, id: BlockId) {
        if self.built.len() <= id.index() {
            self.built.resize(id.index() + 1, false);
        }
        self.built[id.index()] = true;
    }

    pub(crate) fn push_line(&mut self, line: impl AsRef<str>) {
        self.body.push_str(line.as_ref());
        self.body.push('\n');
    }

    pub(crate) fn comment(&mut self, text: &str) {
        self.body.push_str("// ");
        self.body.push_str(text);
        self.body.push('\n');
    }

    pub(crate) fn register_attribute(&mut self, name: &str, ty: ValueType) {
        if self.attributes.iter().any(|a| a == name) {
            return;
        }
        self.attributes.push(name.to_string());
        self.attribute_declaration
            .push_str(&format!("attribute {} {};\n", ty.glsl_name(), name));
    }

    pub(crate) fn emit_uniform(&mut self, name: &str, ty: ValueType) {
        if self.uniforms.iter().any(|u| u == name) {
            return;
        }
        self.uniforms.push(name.to_string());
        self.uniform_declaration
            .push_str(&format!("uniform {} {};\n", ty.glsl_name(), name));
    }

    /// Track a uniform name for the effect's list without declaring it in
    /// the shader text; the declaration comes from an engine-side include.
    pub(crate) fn register_uniform_name(&mut self, name: &str) {
        if !self.uniforms.iter().any(|u| u == name) {
            self.uniforms.push(name.to_string());
        }
    }

    pub(crate) fn emit_constant(&mut self, name: &str, ty: ValueType, literal: &str) {
        if self.constants.iter().any(|c| c == name) {
            return;
        }
        self.constants.push(name.to_string());
        self.constant_declaration
            .push_str(&format!("const {} {} = {};\n", ty.glsl_name(), name, literal));
    }

    pub(crate) fn emit_sampler(&mut self, name: &str, kind: SamplerKind) {
        if self.samplers.iter().any(|s| s == name) {
            return;
        }
        self.samplers.push(name.to_string());
        self.sampler_declaration
            .push_str(&format!("uniform {} {};\n", kind.glsl_name(), name));
    }

    /// Fragment compilation reads the uniform scope produced by the vertex
    /// pass, so a dual-target input declares once and resolves in both
    /// stages.
    pub(crate) fn inherit_uniform_scope(&mut self, vertex: &BuildState) {
        self.uniforms = vertex.uniforms.clone();
        self.uniform_declaration = vertex.uniform_declaration.clone();
        self.constants = vertex.constants.clone();
        self.constant_declaration = vertex.constant_declaration.clone();
    }

    /// Assemble the full shader source and snapshot it.
    pub(crate) fn finalize(&mut self, shared: &SharedData) {
        let mut source = String::new();
        if self.stage == Stage::Fragment {
            source.push_str("precision highp float;\n");
        }
        source.push_str(&self.constant_declaration);
        source.push_str(&self.uniform_declaration);
        source.push_str(&self.sampler_declaration);
        if self.stage == Stage::Vertex {
            source.push_str(&self.attribute_declaration);
        }
        source.push_str(shared.varying_declaration());
        source.push_str("\nvoid main(void) {\n");
        source.push_str(&self.body);
        source.push_str("}\n");
        self.compilation_string = source.clone();
        self.built_compilation_string = source;
    }

    /// Drop any expanded repeatable content, going back to the anchored
    /// snapshot taken at finalize time.
    pub(crate) fn restore_built_snapshot(&mut self) {
        self.compilation_string = self.built_compilation_string.clone();
    }

    /// Replace an anchor line with generated text (or drop it when empty).
    pub(crate) fn replace_content(&mut self, anchor: &str, text: &str) {
        self.compilation_string = self.compilation_string.replace(anchor, text);
    }

    /// The current shader source; only meaningful after [`Self::finalize`].
    pub fn source(&self) -> &str {
        &self.compilation_string
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn uniforms(&self) -> &[String] {
        &self.uniforms
    }

    pub fn samplers(&self) -> &[String] {
        &self.samplers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_declarations_are_dropped() {
        let mut state = BuildState::new(Stage::Vertex);
        state.emit_uniform("world", ValueType::Matrix);
        state.emit_uniform("world", ValueType::Matrix);
        assert_eq!(state.uniforms(), ["world"]);
        assert_eq!(state.uniform_declaration, "uniform mat4 world;\n");
    }

    #[test]
    fn snapshot_restores_anchor_text() {
        let shared = SharedData::new(0, false, false);
        let mut state = BuildState::new(Stage::Fragment);
        state.push_line("//__REPEATABLE_CONTENT_0__");
        state.finalize(&shared);
        state.replace_content("//__REPEATABLE_CONTENT_0__", "diffuse += light0;");
        assert!(state.source().contains("diffuse += light0;"));
        state.restore_built_snapshot();
        assert!(state.source().contains("//__REPEATABLE_CONTENT_0__"));
    }

    #[test]
    fn vertex_keeps_attributes_and_fragment_gets_precision() {
        let shared = SharedData::new(0, false, false);
        let mut vertex = BuildState::new(Stage::Vertex);
        vertex.register_attribute("position", ValueType::Vec3);
        vertex.finalize(&shared);
        assert!(vertex.source().starts_with("attribute vec3 position;\n"));

        let mut fragment = BuildState::new(Stage::Fragment);
        fragment.finalize(&shared);
        assert!(fragment.source().starts_with("precision highp float;\n"));
    }
}
