//! Input blocks: mesh attributes, system values, uniforms and constants.

use nalgebra::Matrix4;

use crate::material::build_state::BuildState;
use crate::material::effect::Effect;
use crate::material::shared_data::SharedData;
use crate::material::submesh::SceneBindings;
use crate::types::{BlockTarget, SystemValue, Value, ValueType};

use super::{Block, BlockKind};

/// Where an input block takes its value from.
#[derive(Clone, Debug)]
pub enum InputSource {
    /// A named mesh vertex attribute, read in the vertex stage.
    Attribute(String),
    /// A well-known engine value, declared as a shared uniform.
    SystemValue(SystemValue),
    /// A user value transmitted as a uniform during the bind phase.
    Uniform(Value),
    /// A compile-time constant folded into the constant declaration block.
    Constant(Value),
}

#[derive(Clone, Debug)]
pub struct InputBlock {
    source: InputSource,
    /// Accumulated seconds for the `Time` system value.
    time: f32,
}

impl InputBlock {
    pub fn source(&self) -> &InputSource {
        &self.source
    }

    pub fn is_animated(&self) -> bool {
        matches!(self.source, InputSource::SystemValue(SystemValue::Time))
    }

    /// Seconds accumulated by the `Time` system value.
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.source {
            InputSource::Uniform(value) | InputSource::Constant(value) => Some(value),
            _ => None,
        }
    }

    pub fn set_value(&mut self, value: Value) {
        match &mut self.source {
            InputSource::Uniform(slot) | InputSource::Constant(slot) => *slot = value,
            _ => {}
        }
    }

    fn output_type(&self) -> ValueType {
        match &self.source {
            InputSource::Attribute(_) => ValueType::AutoDetect,
            InputSource::SystemValue(sv) => sv.value_type(),
            InputSource::Uniform(value) | InputSource::Constant(value) => value.value_type(),
        }
    }
}

/// Vertex-attribute input block.
pub fn attribute(name: &str, attribute_name: &str, ty: ValueType) -> Block {
    Block::new(
        name,
        BlockTarget::Vertex,
        BlockKind::Input(InputBlock {
            source: InputSource::Attribute(attribute_name.to_string()),
            time: 0.0,
        }),
    )
    .with_output("output", ty)
}

/// System-value input block (matrices, camera position, time).
pub fn system_value(name: &str, value: SystemValue) -> Block {
    let ty = value.value_type();
    Block::new(
        name,
        BlockTarget::VertexAndFragment,
        BlockKind::Input(InputBlock {
            source: InputSource::SystemValue(value),
            time: 0.0,
        }),
    )
    .with_output("output", ty)
}

/// User-value input block, transmitted as a uniform at bind time.
pub fn uniform(name: &str, value: Value) -> Block {
    let ty = value.value_type();
    Block::new(
        name,
        BlockTarget::VertexAndFragment,
        BlockKind::Input(InputBlock {
            source: InputSource::Uniform(value),
            time: 0.0,
        }),
    )
    .with_output("output", ty)
}

/// Compile-time constant input block.
pub fn constant(name: &str, value: Value) -> Block {
    let ty = value.value_type();
    Block::new(
        name,
        BlockTarget::VertexAndFragment,
        BlockKind::Input(InputBlock {
            source: InputSource::Constant(value),
            time: 0.0,
        }),
    )
    .with_output("output", ty)
}

pub(crate) fn build(block: &mut Block, state: &mut BuildState, shared: &mut SharedData) {
    let BlockKind::Input(data) = &block.kind else {
        return;
    };
    let declared = data.output_type();
    match data.source.clone() {
        InputSource::Attribute(attribute_name) => {
            let ty = match declared {
                ValueType::AutoDetect => block.outputs[0].resolved_type(),
                other => other,
            };
            state.register_attribute(&attribute_name, ty);
            block.outputs[0].associated_variable = attribute_name;
        }
        InputSource::SystemValue(sv) => {
            match sv {
                SystemValue::WorldView => shared.hints.need_world_view_matrix = true,
                SystemValue::WorldViewProjection => {
                    shared.hints.need_world_view_projection_matrix = true
                }
                _ => {}
            }
            state.emit_uniform(sv.uniform_name(), sv.value_type());
            block.outputs[0].associated_variable = sv.uniform_name().to_string();
        }
        InputSource::Uniform(value) => {
            // A dual-target input builds once per stage; the variable named
            // by the first stage is reused so the shared declaration stays
            // single (the fragment state inherits the vertex uniform list).
            let name = existing_or_free_name(block, shared);
            state.emit_uniform(&name, value.value_type());
            block.outputs[0].associated_variable = name;
        }
        InputSource::Constant(value) => {
            let name = existing_or_free_name(block, shared);
            state.emit_constant(&name, value.value_type(), &value.to_glsl());
            block.outputs[0].associated_variable = name;
        }
    }
}

fn existing_or_free_name(block: &Block, shared: &mut SharedData) -> String {
    if block.outputs[0].associated_variable.is_empty() {
        shared.free_variable_name(&block.name)
    } else {
        block.outputs[0].associated_variable.clone()
    }
}

/// Advance an animated input by one frame.
pub(crate) fn animate(block: &mut Block, delta_seconds: f32) {
    if let BlockKind::Input(data) = &mut block.kind
        && data.is_animated()
    {
        data.time += delta_seconds;
    }
}

/// Upload the world-derived matrices this input depends on.
pub(crate) fn transmit_world(
    block: &Block,
    effect: &dyn Effect,
    world: &Matrix4<f32>,
    world_view: &Matrix4<f32>,
    world_view_projection: &Matrix4<f32>,
) {
    let BlockKind::Input(data) = &block.kind else {
        return;
    };
    let name = &block.outputs[0].associated_variable;
    if name.is_empty() {
        return;
    }
    match data.source {
        InputSource::SystemValue(SystemValue::World) => effect.set_matrix(name, world),
        InputSource::SystemValue(SystemValue::WorldView) => effect.set_matrix(name, world_view),
        InputSource::SystemValue(SystemValue::WorldViewProjection) => {
            effect.set_matrix(name, world_view_projection)
        }
        _ => {}
    }
}

/// Upload scene-level values and user uniforms.
pub(crate) fn transmit(block: &Block, effect: &dyn Effect, scene: &SceneBindings) {
    let BlockKind::Input(data) = &block.kind else {
        return;
    };
    let name = &block.outputs[0].associated_variable;
    if name.is_empty() {
        return;
    }
    match &data.source {
        InputSource::SystemValue(sv) => match sv {
            SystemValue::View => effect.set_matrix(name, &scene.view),
            SystemValue::Projection => effect.set_matrix(name, &scene.projection),
            SystemValue::ViewProjection => effect.set_matrix(name, &scene.view_projection),
            SystemValue::CameraPosition => effect.set_vector3(name, &scene.camera_position),
            SystemValue::Time => effect.set_float(name, data.time),
            // World-derived matrices travel through `transmit_world`.
            SystemValue::World | SystemValue::WorldView | SystemValue::WorldViewProjection => {}
        },
        InputSource::Uniform(value) => match value {
            Value::Float(v) => effect.set_float(name, *v),
            Value::Int(v) => effect.set_int(name, *v),
            Value::Vector2(v) => effect.set_vector2(name, v),
            Value::Vector3(v) | Value::Color3(v) => effect.set_vector3(name, v),
            Value::Vector4(v) | Value::Color4(v) => effect.set_vector4(name, v),
            Value::Matrix(v) => effect.set_matrix(name, v),
        },
        InputSource::Attribute(_) | InputSource::Constant(_) => {}
    }
}
