//! Binary math blocks.

use crate::material::build_state::BuildState;
use crate::material::shared_data::SharedData;
use crate::types::{BlockTarget, ValueType};

use super::{Block, BlockKind, ResolvedInput};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MathOperation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl MathOperation {
    fn glsl_operator(self) -> &'static str {
        match self {
            MathOperation::Add => "+",
            MathOperation::Subtract => "-",
            MathOperation::Multiply => "*",
            MathOperation::Divide => "/",
        }
    }
}

#[derive(Clone, Debug)]
pub struct MathBlock {
    pub operation: MathOperation,
}

/// Binary math block. The output type follows the left input once connected.
pub fn math(name: &str, operation: MathOperation) -> Block {
    Block::new(
        name,
        BlockTarget::Undefined,
        BlockKind::Math(MathBlock { operation }),
    )
    .with_input("left", ValueType::AutoDetect)
    .with_input("right", ValueType::AutoDetect)
    .with_output("output", ValueType::AutoDetect)
}

pub(crate) fn build(
    block: &mut Block,
    inputs: &[ResolvedInput],
    state: &mut BuildState,
    shared: &mut SharedData,
) {
    let BlockKind::Math(data) = &block.kind else {
        return;
    };
    for (point, resolved) in block.inputs.iter().zip(inputs) {
        if resolved.expr.is_none() {
            shared.push_issue(
                &block.name,
                format!("input '{}' is not connected", point.name),
            );
        }
    }
    let ty = block.outputs[0].resolved_type();
    let ty = if ty == ValueType::AutoDetect {
        inputs[0].ty
    } else {
        ty
    };
    let left = inputs[0].expr_or_zero();
    let right = inputs[1].expr_or_zero();
    let out = shared.free_variable_name(&block.name);
    let op = data.operation.glsl_operator();
    state.push_line(format!("{} {out} = {left} {op} {right};", ty.glsl_name()));
    block.outputs[0].associated_variable = out;
}
