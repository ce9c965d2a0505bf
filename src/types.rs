//! Core type definitions for the material compiler.

use nalgebra::{Matrix4, Vector2, Vector3, Vector4};

/// Shader stage a build state compiles for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Vertex,
    Fragment,
}

/// Compilation target of a block.
///
/// `Undefined` marks a neutral block that compiles into whichever stage
/// consumes it; such a block can never be registered as an output node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockTarget {
    Vertex,
    Fragment,
    VertexAndFragment,
    Undefined,
}

impl BlockTarget {
    /// Whether a block with this target emits code into the given stage.
    pub fn includes(self, stage: Stage) -> bool {
        match self {
            BlockTarget::Vertex => stage == Stage::Vertex,
            BlockTarget::Fragment => stage == Stage::Fragment,
            BlockTarget::VertexAndFragment | BlockTarget::Undefined => true,
        }
    }
}

/// GLSL value type carried by a connection point.
///
/// `AutoDetect` resolves to the upstream type when the point is connected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    Float,
    Int,
    Vec2,
    Vec3,
    Vec4,
    Color3,
    Color4,
    Matrix,
    AutoDetect,
}

impl ValueType {
    /// GLSL type name used in declarations and local variables.
    pub fn glsl_name(self) -> &'static str {
        match self {
            ValueType::Float => "float",
            ValueType::Int => "int",
            ValueType::Vec2 => "vec2",
            ValueType::Vec3 | ValueType::Color3 => "vec3",
            ValueType::Vec4 | ValueType::Color4 => "vec4",
            ValueType::Matrix => "mat4",
            ValueType::AutoDetect => "float",
        }
    }

    /// Whether a value of this type can flow into an input of `other`.
    pub fn is_compatible(self, other: ValueType) -> bool {
        if self == other || other == ValueType::AutoDetect || self == ValueType::AutoDetect {
            return true;
        }
        matches!(
            (self, other),
            (ValueType::Vec3, ValueType::Color3)
                | (ValueType::Color3, ValueType::Vec3)
                | (ValueType::Vec4, ValueType::Color4)
                | (ValueType::Color4, ValueType::Vec4)
        )
    }

    /// Zero literal used when a required input is left unconnected.
    pub fn zero_literal(self) -> &'static str {
        match self {
            ValueType::Float | ValueType::AutoDetect => "0.0",
            ValueType::Int => "0",
            ValueType::Vec2 => "vec2(0.0, 0.0)",
            ValueType::Vec3 | ValueType::Color3 => "vec3(0.0, 0.0, 0.0)",
            ValueType::Vec4 | ValueType::Color4 => "vec4(0.0, 0.0, 0.0, 0.0)",
            ValueType::Matrix => "mat4(1.0)",
        }
    }
}

/// Well-known values an input block can be bound to.
///
/// The world family is transmitted during the bind phase from the draw call's
/// world matrix; the others come from [`SceneBindings`].
///
/// [`SceneBindings`]: crate::material::submesh::SceneBindings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SystemValue {
    World,
    View,
    Projection,
    ViewProjection,
    WorldView,
    WorldViewProjection,
    CameraPosition,
    Time,
}

impl SystemValue {
    /// Canonical uniform name for this system value.
    pub fn uniform_name(self) -> &'static str {
        match self {
            SystemValue::World => "world",
            SystemValue::View => "view",
            SystemValue::Projection => "projection",
            SystemValue::ViewProjection => "viewProjection",
            SystemValue::WorldView => "worldView",
            SystemValue::WorldViewProjection => "worldViewProjection",
            SystemValue::CameraPosition => "cameraPosition",
            SystemValue::Time => "time",
        }
    }

    pub fn value_type(self) -> ValueType {
        match self {
            SystemValue::CameraPosition => ValueType::Vec3,
            SystemValue::Time => ValueType::Float,
            _ => ValueType::Matrix,
        }
    }
}

/// A concrete value carried by a uniform or constant input block.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Float(f32),
    Int(i32),
    Vector2(Vector2<f32>),
    Vector3(Vector3<f32>),
    Vector4(Vector4<f32>),
    Color3(Vector3<f32>),
    Color4(Vector4<f32>),
    Matrix(Matrix4<f32>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Float(_) => ValueType::Float,
            Value::Int(_) => ValueType::Int,
            Value::Vector2(_) => ValueType::Vec2,
            Value::Vector3(_) => ValueType::Vec3,
            Value::Vector4(_) => ValueType::Vec4,
            Value::Color3(_) => ValueType::Color3,
            Value::Color4(_) => ValueType::Color4,
            Value::Matrix(_) => ValueType::Matrix,
        }
    }

    /// GLSL literal for this value, usable in a `const` declaration.
    pub fn to_glsl(&self) -> String {
        match self {
            Value::Float(v) => float_literal(*v),
            Value::Int(v) => v.to_string(),
            Value::Vector2(v) => format!("vec2({}, {})", float_literal(v.x), float_literal(v.y)),
            Value::Vector3(v) | Value::Color3(v) => format!(
                "vec3({}, {}, {})",
                float_literal(v.x),
                float_literal(v.y),
                float_literal(v.z)
            ),
            Value::Vector4(v) | Value::Color4(v) => format!(
                "vec4({}, {}, {}, {})",
                float_literal(v.x),
                float_literal(v.y),
                float_literal(v.z),
                float_literal(v.w)
            ),
            // GLSL matrix constructors take components in column-major
            // order, which matches `Matrix4::iter`.
            Value::Matrix(m) => {
                let components: Vec<String> = m.iter().map(|c| float_literal(*c)).collect();
                format!("mat4({})", components.join(", "))
            }
        }
    }
}

/// Format a float so GLSL always sees a floating-point literal.
pub fn float_literal(value: f32) -> String {
    let mut literal = format!("{}", value);
    if !literal.contains(['.', 'e', 'E']) {
        literal.push_str(".0");
    }
    literal
}
