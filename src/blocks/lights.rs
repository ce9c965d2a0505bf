//! Light accumulation block.
//!
//! Unique per material. Its emitted body depends on the final define set
//! (one `LIGHT{i}` define per active light), so the build pass only leaves a
//! repeatable-content anchor behind; the real per-light statements are
//! expanded at readiness time once the defines are known. Per-light uniform
//! data itself lives in engine-provided `Light{i}` uniform buffers.

use crate::material::build_state::BuildState;
use crate::material::defines::MaterialDefines;
use crate::material::effect::EffectFallbacks;
use crate::material::shared_data::SharedData;
use crate::material::submesh::MeshInfo;
use crate::types::{BlockTarget, ValueType};

use super::{Block, BlockKind, DefineContext, ResolvedInput};

#[derive(Clone, Debug)]
pub struct LightsBlock {
    anchor: String,
    output_var: String,
    color_expr: String,
}

impl LightsBlock {
    pub(crate) fn reset_build_scratch(&mut self) {
        self.anchor.clear();
        self.output_var.clear();
        self.color_expr.clear();
    }
}

/// Light accumulation block; sums the diffuse contribution of every active
/// light, modulated by the optional `color` input.
pub fn lights(name: &str) -> Block {
    Block::new(
        name,
        BlockTarget::Fragment,
        BlockKind::Lights(LightsBlock {
            anchor: String::new(),
            output_var: String::new(),
            color_expr: String::new(),
        }),
    )
    .with_input("color", ValueType::Color3)
    .with_output("diffuse", ValueType::Color3)
}

pub(crate) fn build(
    block: &mut Block,
    inputs: &[ResolvedInput],
    state: &mut BuildState,
    shared: &mut SharedData,
) {
    let BlockKind::Lights(data) = &mut block.kind else {
        return;
    };
    data.color_expr = inputs[0]
        .expr
        .clone()
        .unwrap_or_else(|| "vec3(1.0, 1.0, 1.0)".to_string());
    data.output_var = shared.free_variable_name(&block.name);
    data.anchor = shared.next_repeatable_anchor();
    state.push_line(format!("vec3 {} = vec3(0.0, 0.0, 0.0);", data.output_var));
    state.push_line(&data.anchor);
    block.outputs[0].associated_variable = data.output_var.clone();
}

pub(crate) fn initialize_defines(
    _mesh: &MeshInfo,
    defines: &mut MaterialDefines,
    ctx: DefineContext,
) {
    for i in 0..ctx.max_simultaneous_lights {
        defines.ensure_bool(&light_define(i));
    }
}

pub(crate) fn prepare_defines(mesh: &MeshInfo, defines: &mut MaterialDefines, ctx: DefineContext) {
    let active = mesh.num_lights.min(ctx.max_simultaneous_lights);
    for i in 0..ctx.max_simultaneous_lights {
        defines.set_bool(&light_define(i), i < active);
    }
}

pub(crate) fn replace_repeatable_content(
    data: &LightsBlock,
    _vertex_state: &mut BuildState,
    fragment_state: &mut BuildState,
    defines: &MaterialDefines,
    ctx: DefineContext,
) {
    if data.anchor.is_empty() {
        return;
    }
    let mut expanded = String::new();
    for i in 0..ctx.max_simultaneous_lights {
        if !defines.bool_value(&light_define(i)) {
            continue;
        }
        if !expanded.is_empty() {
            expanded.push('\n');
        }
        expanded.push_str(&format!(
            "{} += vLightDiffuse{i}.rgb * {};",
            data.output_var, data.color_expr
        ));
    }
    fragment_state.replace_content(&data.anchor, &expanded);
}

pub(crate) fn update_uniforms_and_samplers(
    vertex_state: &mut BuildState,
    defines: &MaterialDefines,
    uniform_buffers: &mut Vec<String>,
    ctx: DefineContext,
) {
    for i in 0..ctx.max_simultaneous_lights {
        if !defines.bool_value(&light_define(i)) {
            continue;
        }
        vertex_state.register_uniform_name(&format!("vLightData{i}"));
        vertex_state.register_uniform_name(&format!("vLightDiffuse{i}"));
        uniform_buffers.push(format!("Light{i}"));
    }
}

pub(crate) fn provide_fallbacks(
    fallbacks: &mut EffectFallbacks,
    defines: &MaterialDefines,
    ctx: DefineContext,
) {
    for i in 0..ctx.max_simultaneous_lights {
        if defines.bool_value(&light_define(i)) {
            fallbacks.add_fallback(i + 1, &light_define(i));
        }
    }
}

fn light_define(index: u32) -> String {
    format!("LIGHT{index}")
}
