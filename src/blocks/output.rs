//! Final merger blocks: vertex position and fragment color writes.

use crate::material::build_state::BuildState;
use crate::material::shared_data::SharedData;
use crate::types::{BlockTarget, ValueType};

use super::{Block, BlockKind, ResolvedInput};

/// Vertex-stage final merger; writes `gl_Position`.
pub fn vertex_output(name: &str) -> Block {
    Block::new(name, BlockTarget::Vertex, BlockKind::VertexOutput)
        .with_input("vector", ValueType::Vec4)
}

/// Fragment-stage final merger; writes `gl_FragColor`.
///
/// Either `rgba` or `rgb` must be connected; a connected `a` input marks the
/// material as needing alpha blending.
pub fn fragment_output(name: &str) -> Block {
    Block::new(name, BlockTarget::Fragment, BlockKind::FragmentOutput)
        .with_input("rgba", ValueType::Color4)
        .with_input("rgb", ValueType::Color3)
        .with_input("a", ValueType::Float)
}

pub(crate) fn build_vertex_output(
    block: &mut Block,
    inputs: &[ResolvedInput],
    state: &mut BuildState,
    shared: &mut SharedData,
) {
    if inputs[0].expr.is_none() {
        shared.push_issue(&block.name, "input 'vector' is not connected");
    }
    state.push_line(format!("gl_Position = {};", inputs[0].expr_or_zero()));
}

pub(crate) fn build_fragment_output(
    block: &mut Block,
    inputs: &[ResolvedInput],
    state: &mut BuildState,
    shared: &mut SharedData,
) {
    let rgba = &inputs[0];
    let rgb = &inputs[1];
    let alpha = &inputs[2];

    if alpha.expr.is_some() {
        shared.hints.need_alpha_blending = true;
    }

    if let Some(rgba) = &rgba.expr {
        state.push_line(format!("gl_FragColor = {rgba};"));
    } else if let Some(rgb) = &rgb.expr {
        let a = alpha
            .expr
            .clone()
            .unwrap_or_else(|| "1.0".to_string());
        state.push_line(format!("gl_FragColor = vec4({rgb}, {a});"));
    } else {
        shared.push_issue(&block.name, "neither 'rgba' nor 'rgb' is connected");
        state.push_line("gl_FragColor = vec4(0.0, 0.0, 0.0, 1.0);");
    }
}
