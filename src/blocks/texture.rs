//! Texture sampling blocks.
//!
//! Dual-target: the vertex stage computes the sampling coordinates and
//! transfers them through a varying, the fragment stage owns the sampler and
//! the actual fetch. Blocking: the material is not ready while the bound
//! texture is still loading.

use crate::graph::MaterialGraph;
use crate::material::build_state::{BuildState, SamplerKind};
use crate::material::defines::{define_key, MaterialDefines};
use crate::material::effect::{Effect, TextureRef};
use crate::material::shared_data::SharedData;
use crate::types::{BlockTarget, Stage, ValueType};

use super::{input, Block, BlockId, BlockKind, ResolvedInput};

/// The two texture-producing block shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureVariant {
    /// Plain 2D sampling driven by a uv set.
    Standard,
    /// Cube sampling driven by a reflection direction.
    Reflection,
}

#[derive(Clone, Debug)]
pub struct TextureBlock {
    variant: TextureVariant,
    texture: Option<TextureRef>,
    varying_name: String,
    sampler_name: String,
}

impl TextureBlock {
    pub fn variant(&self) -> TextureVariant {
        self.variant
    }

    pub fn texture(&self) -> Option<&TextureRef> {
        self.texture.as_ref()
    }

    pub fn set_texture(&mut self, texture: Option<TextureRef>) {
        self.texture = texture;
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.texture.as_ref().is_none_or(|t| t.is_ready())
    }

    pub(crate) fn sampler_name(&self) -> &str {
        &self.sampler_name
    }

    pub(crate) fn reset_build_scratch(&mut self) {
        self.varying_name.clear();
        self.sampler_name.clear();
    }
}

/// 2D texture block sampling with a uv coordinate.
pub fn texture(name: &str) -> Block {
    Block::new(
        name,
        BlockTarget::VertexAndFragment,
        BlockKind::Texture(TextureBlock {
            variant: TextureVariant::Standard,
            texture: None,
            varying_name: String::new(),
            sampler_name: String::new(),
        }),
    )
    .with_input("uv", ValueType::Vec2)
    .with_output("rgba", ValueType::Color4)
    .with_output("rgb", ValueType::Color3)
}

/// Cube texture block sampling with a reflection direction.
pub fn reflection_texture(name: &str) -> Block {
    Block::new(
        name,
        BlockTarget::VertexAndFragment,
        BlockKind::Texture(TextureBlock {
            variant: TextureVariant::Reflection,
            texture: None,
            varying_name: String::new(),
            sampler_name: String::new(),
        }),
    )
    .with_input("direction", ValueType::Vec3)
    .with_output("rgba", ValueType::Color4)
    .with_output("rgb", ValueType::Color3)
}

/// Wire a default uv attribute when the coordinate input was left open.
/// Reuses an existing uv attribute input block if the graph has one.
pub(crate) fn auto_configure(graph: &mut MaterialGraph, id: BlockId) {
    let block = graph.block(id);
    let BlockKind::Texture(data) = &block.kind else {
        return;
    };
    if data.variant != TextureVariant::Standard || block.inputs[0].is_connected() {
        return;
    }
    let existing = graph.find_block(|b| {
        matches!(
            &b.kind,
            BlockKind::Input(input) if matches!(
                input.source(),
                input::InputSource::Attribute(name) if name == "uv"
            )
        )
    });
    let source = existing
        .unwrap_or_else(|| graph.add_block(input::attribute("uv", "uv", ValueType::Vec2)));
    // Both ports exist by construction.
    let _ = graph.connect(source, "output", id, "uv", false);
}

pub(crate) fn build(
    block: &mut Block,
    inputs: &[ResolvedInput],
    state: &mut BuildState,
    shared: &mut SharedData,
) {
    let BlockKind::Texture(data) = &mut block.kind else {
        return;
    };
    let coordinate_type = match data.variant {
        TextureVariant::Standard => ValueType::Vec2,
        TextureVariant::Reflection => ValueType::Vec3,
    };
    match state.stage() {
        Stage::Vertex => {
            if inputs[0].expr.is_none() {
                shared.push_issue(
                    &block.name,
                    format!("input '{}' is not connected", block.inputs[0].name),
                );
            }
            if data.varying_name.is_empty() {
                let base = shared.free_variable_name(&format!("{}UV", block.name));
                data.varying_name = format!("v_{base}");
            }
            shared.register_varying(&data.varying_name, coordinate_type);
            state.push_line(format!(
                "{} = {};",
                data.varying_name,
                inputs[0].expr_or_zero()
            ));
        }
        Stage::Fragment => {
            if data.varying_name.is_empty() {
                // The vertex pass did not reach this block; keep the shader
                // well-formed and report it.
                shared.push_issue(&block.name, "no coordinates were produced in the vertex stage");
                let base = shared.free_variable_name(&format!("{}UV", block.name));
                data.varying_name = format!("v_{base}");
                shared.register_varying(&data.varying_name, coordinate_type);
            }
            if data.sampler_name.is_empty() {
                data.sampler_name = shared.free_variable_name(&format!("{}Sampler", block.name));
            }
            let (sampler_kind, fetch) = match data.variant {
                TextureVariant::Standard => (SamplerKind::Sampler2D, "texture2D"),
                TextureVariant::Reflection => (SamplerKind::SamplerCube, "textureCube"),
            };
            state.emit_sampler(&data.sampler_name, sampler_kind);
            let out = shared.free_variable_name(&block.name);
            state.push_line(format!(
                "vec4 {out} = {fetch}({}, {});",
                data.sampler_name, data.varying_name
            ));
            block.outputs[0].associated_variable = out.clone();
            block.outputs[1].associated_variable = format!("{out}.rgb");
        }
    }
}

pub(crate) fn initialize_defines(block: &Block, _data: &TextureBlock, defines: &mut MaterialDefines) {
    defines.ensure_bool(&texture_define(block));
}

pub(crate) fn prepare_defines(block: &Block, data: &TextureBlock, defines: &mut MaterialDefines) {
    defines.set_bool(&texture_define(block), data.texture.is_some());
}

pub(crate) fn bind(data: &TextureBlock, effect: &dyn Effect) {
    if let Some(texture) = &data.texture
        && !data.sampler_name.is_empty()
    {
        effect.set_texture(&data.sampler_name, texture);
    }
}

fn texture_define(block: &Block) -> String {
    format!("{}_TEXTURE", define_key(&block.name))
}
