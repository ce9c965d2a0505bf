//! Transform block: multiplies a vector by a matrix, homogenizing with a
//! configurable complement component.

use crate::material::build_state::BuildState;
use crate::material::shared_data::SharedData;
use crate::types::{float_literal, BlockTarget, ValueType};

use super::{Block, BlockKind, ResolvedInput};

#[derive(Clone, Debug)]
pub struct TransformBlock {
    /// Value used to fill the w component when the input is not vec4.
    pub complement_w: f32,
}

/// Vector-times-matrix block. Neutral target: compiles into whichever stage
/// consumes it.
pub fn transform(name: &str) -> Block {
    Block::new(
        name,
        BlockTarget::Undefined,
        BlockKind::Transform(TransformBlock { complement_w: 1.0 }),
    )
    .with_input("vector", ValueType::AutoDetect)
    .with_input("transform", ValueType::Matrix)
    .with_output("output", ValueType::Vec4)
}

pub(crate) fn build(
    block: &mut Block,
    inputs: &[ResolvedInput],
    state: &mut BuildState,
    shared: &mut SharedData,
) {
    let BlockKind::Transform(data) = &block.kind else {
        return;
    };
    if inputs[0].expr.is_none() {
        shared.push_issue(&block.name, "input 'vector' is not connected");
    }
    if inputs[1].expr.is_none() {
        shared.push_issue(&block.name, "input 'transform' is not connected");
    }
    let vector = inputs[0].expr_or_zero();
    let matrix = inputs[1].expr_or_zero();
    let vector = match inputs[0].ty {
        ValueType::Vec4 | ValueType::Color4 => vector,
        ValueType::Vec3 | ValueType::Color3 => {
            format!("vec4({vector}, {})", float_literal(data.complement_w))
        }
        _ => format!("vec4(vec3({vector}), {})", float_literal(data.complement_w)),
    };
    let out = shared.free_variable_name(&block.name);
    state.push_line(format!("vec4 {out} = {matrix} * {vector};"));
    block.outputs[0].associated_variable = out;
}
