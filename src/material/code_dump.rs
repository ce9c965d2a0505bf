//! Dump a material graph as Rust code that rebuilds it.

use std::collections::HashMap;

use crate::blocks::{Block, BlockId, BlockKind, InputSource, TextureVariant};
use crate::material::NodeMaterial;
use crate::types::Value;

/// Emit Rust source that reconstructs the graph through the public API.
///
/// Blocks are visited depth-first from the vertex output nodes, then the
/// fragment ones, dependencies first; the same traversal twice yields the
/// same text.
pub(crate) fn generate_code(material: &NodeMaterial) -> String {
    let mut order = Vec::new();
    for id in &material.vertex_output_nodes {
        gather(material, *id, &mut order);
    }
    for id in &material.fragment_output_nodes {
        gather(material, *id, &mut order);
    }

    let mut names = HashMap::new();
    let mut taken: HashMap<String, u32> = HashMap::new();
    for id in &order {
        let base = identifier(&material.graph.block(*id).name);
        let count = taken.entry(base.clone()).or_insert(0);
        *count += 1;
        let var = if *count == 1 {
            base
        } else {
            format!("{base}_{}", *count - 1)
        };
        names.insert(*id, var);
    }

    let mut code = String::new();
    code.push_str(&format!(
        "let mut material = NodeMaterial::new({:?});\n",
        material.name
    ));
    for id in &order {
        let block = material.graph.block(*id);
        code.push_str(&format!(
            "let {} = material.add_block({});\n",
            names[id],
            constructor(block)
        ));
    }
    for id in &order {
        let block = material.graph.block(*id);
        for point in block.inputs() {
            let Some(link) = point.connected_point() else {
                continue;
            };
            let source = material.graph.block(link.block);
            code.push_str(&format!(
                "material.connect({}, {:?}, {}, {:?})?;\n",
                names[&link.block],
                source.outputs()[link.output].name,
                names[id],
                point.name
            ));
        }
    }
    for id in &material.vertex_output_nodes {
        code.push_str(&format!("material.add_output_node({})?;\n", names[id]));
    }
    for id in &material.fragment_output_nodes {
        code.push_str(&format!("material.add_output_node({})?;\n", names[id]));
    }
    code
}

fn identifier(name: &str) -> String {
    let mut ident: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if ident.is_empty() {
        ident.push_str("block");
    }
    if ident.as_bytes()[0].is_ascii_digit() {
        ident.insert(0, '_');
    }
    ident
}

fn gather(material: &NodeMaterial, id: BlockId, order: &mut Vec<BlockId>) {
    if order.contains(&id) {
        return;
    }
    let links: Vec<BlockId> = material
        .graph
        .block(id)
        .inputs()
        .iter()
        .filter_map(|point| point.connected_point())
        .map(|link| link.block)
        .filter(|owner| *owner != id)
        .collect();
    for owner in links {
        gather(material, owner, order);
    }
    if !order.contains(&id) {
        order.push(id);
    }
}

fn constructor(block: &Block) -> String {
    let name = &block.name;
    match &block.kind {
        BlockKind::Input(data) => match data.source() {
            InputSource::Attribute(attribute) => format!(
                "input::attribute({name:?}, {attribute:?}, ValueType::{:?})",
                block.outputs()[0].resolved_type()
            ),
            InputSource::SystemValue(sv) => {
                format!("input::system_value({name:?}, SystemValue::{sv:?})")
            }
            InputSource::Uniform(value) => {
                format!("input::uniform({name:?}, {})", value_code(value))
            }
            InputSource::Constant(value) => {
                format!("input::constant({name:?}, {})", value_code(value))
            }
        },
        BlockKind::Transform(_) => format!("transform::transform({name:?})"),
        BlockKind::Math(data) => {
            format!("math::math({name:?}, MathOperation::{:?})", data.operation)
        }
        BlockKind::VertexOutput => format!("output::vertex_output({name:?})"),
        BlockKind::FragmentOutput => format!("output::fragment_output({name:?})"),
        BlockKind::Texture(data) => match data.variant() {
            TextureVariant::Standard => format!("texture::texture({name:?})"),
            TextureVariant::Reflection => format!("texture::reflection_texture({name:?})"),
        },
        BlockKind::Lights(_) => format!("lights::lights({name:?})"),
    }
}

fn value_code(value: &Value) -> String {
    match value {
        Value::Float(v) => format!("Value::Float({v:?})"),
        Value::Int(v) => format!("Value::Int({v})"),
        Value::Vector2(v) => format!("Value::Vector2(Vector2::new({:?}, {:?}))", v.x, v.y),
        Value::Vector3(v) => format!(
            "Value::Vector3(Vector3::new({:?}, {:?}, {:?}))",
            v.x, v.y, v.z
        ),
        Value::Color3(v) => format!(
            "Value::Color3(Vector3::new({:?}, {:?}, {:?}))",
            v.x, v.y, v.z
        ),
        Value::Vector4(v) => format!(
            "Value::Vector4(Vector4::new({:?}, {:?}, {:?}, {:?}))",
            v.x, v.y, v.z, v.w
        ),
        Value::Color4(v) => format!(
            "Value::Color4(Vector4::new({:?}, {:?}, {:?}, {:?}))",
            v.x, v.y, v.z, v.w
        ),
        // `Matrix4::new` takes components in row-major order.
        Value::Matrix(m) => {
            let rows: Vec<String> = (0..4)
                .flat_map(|r| (0..4).map(move |c| (r, c)))
                .map(|(r, c)| format!("{:?}", m[(r, c)]))
                .collect();
            format!("Value::Matrix(Matrix4::new({}))", rows.join(", "))
        }
    }
}
