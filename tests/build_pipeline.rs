//! End-to-end compilation tests over the public material API.

use nalgebra::{Matrix4, Vector3};
use proptest::prelude::*;

use node_forge_material_compiler::blocks::{input, math, output, texture, transform, MathOperation};
use node_forge_material_compiler::material::NodeMaterial;
use node_forge_material_compiler::types::{SystemValue, Value, ValueType};
use node_forge_material_compiler::BlockId;

/// position * world * viewProjection into the vertex output, starting from
/// `vector`. Returns the position block id.
fn add_vertex_chain(material: &mut NodeMaterial) -> anyhow::Result<BlockId> {
    let position = material.add_block(input::attribute("position", "position", ValueType::Vec3));
    add_vertex_chain_from(material, position)?;
    Ok(position)
}

fn add_vertex_chain_from(material: &mut NodeMaterial, vector: BlockId) -> anyhow::Result<()> {
    let world = material.add_block(input::system_value("world", SystemValue::World));
    let world_pos = material.add_block(transform::transform("worldPos"));
    material.connect(vector, "output", world_pos, "vector")?;
    material.connect(world, "output", world_pos, "transform")?;

    let view_projection = material.add_block(input::system_value(
        "viewProjection",
        SystemValue::ViewProjection,
    ));
    let projected = material.add_block(transform::transform("projected"));
    material.connect(world_pos, "output", projected, "vector")?;
    material.connect(view_projection, "output", projected, "transform")?;

    let vertex_output = material.add_block(output::vertex_output("vertexOutput"));
    material.connect(projected, "output", vertex_output, "vector")?;
    material.add_output_node(vertex_output)?;
    Ok(())
}

#[test]
fn default_material_compiles_both_stages() -> anyhow::Result<()> {
    let mut material = NodeMaterial::new("default");
    material.set_to_default()?;
    let report = material.build(false)?;
    assert!(report.is_success());

    let vertex = material.vertex_source().unwrap();
    assert!(vertex.contains("attribute vec3 position;"));
    assert!(vertex.contains("uniform mat4 world;"));
    assert!(vertex.contains("uniform mat4 viewProjection;"));
    assert!(vertex.contains("vec4 worldPos = world * vec4(position, 1.0);"));
    assert!(vertex.contains("gl_Position = "));

    let fragment = material.fragment_source().unwrap();
    assert!(fragment.starts_with("precision highp float;"));
    assert!(fragment.contains("uniform vec4 color;"));
    assert!(fragment.contains("gl_FragColor = color;"));

    let both = material.compiled_shaders().unwrap();
    assert!(both.starts_with("// Vertex shader"));
    assert!(both.contains("// Fragment shader"));
    Ok(())
}

#[test]
fn build_without_output_nodes_fails_and_keeps_no_state() -> anyhow::Result<()> {
    let mut material = NodeMaterial::new("empty");
    assert!(material.build(false).is_err());
    assert!(material.vertex_source().is_none());
    assert!(material.compiled_shaders().is_none());

    // A missing fragment root fails the same way.
    material.set_to_default()?;
    let fragment_output = material.get_block_by_name("fragmentOutput").unwrap();
    material.remove_output_node(fragment_output);
    assert!(material.build(false).is_err());
    assert!(material.vertex_source().is_none());
    assert!(!material.build_was_successful());
    Ok(())
}

#[test]
fn rebuilding_produces_identical_sources() -> anyhow::Result<()> {
    let mut material = NodeMaterial::new("stable");
    material.set_to_default()?;
    material.build(false)?;
    let first = material.compiled_shaders().unwrap();
    material.build(true)?;
    let second = material.compiled_shaders().unwrap();
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn constant_matrix_values_survive_into_the_shader() -> anyhow::Result<()> {
    let mut material = NodeMaterial::new("scaled");

    let position = material.add_block(input::attribute("position", "position", ValueType::Vec3));
    let scale_by_two = material.add_block(input::constant(
        "scaleByTwo",
        Value::Matrix(Matrix4::new_scaling(2.0)),
    ));
    let scaled = material.add_block(transform::transform("scaled"));
    material.connect(position, "output", scaled, "vector")?;
    material.connect(scale_by_two, "output", scaled, "transform")?;
    add_vertex_chain_from(&mut material, scaled)?;

    let color = material.add_block(input::uniform(
        "color",
        Value::Vector3(Vector3::new(1.0, 1.0, 1.0)),
    ));
    let fragment_output = material.add_block(output::fragment_output("fragmentOutput"));
    material.connect(color, "output", fragment_output, "rgb")?;
    material.add_output_node(fragment_output)?;

    let report = material.build(false)?;
    assert!(report.is_success());

    let vertex = material.vertex_source().unwrap();
    assert!(vertex.contains(
        "const mat4 scaleByTwo = mat4(2.0, 0.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, \
         0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 0.0, 1.0);"
    ));
    assert!(!vertex.contains("mat4(1.0)"));

    // The construction dump keeps the same components.
    let code = material.generate_code();
    assert!(code.contains("Value::Matrix(Matrix4::new(2.0, 0.0, 0.0, 0.0,"));
    assert!(!code.contains("Matrix4::identity()"));
    Ok(())
}

#[test]
fn uniform_used_in_both_stages_is_declared_once() -> anyhow::Result<()> {
    let mut material = NodeMaterial::new("shared");

    let position = material.add_block(input::attribute("position", "position", ValueType::Vec3));
    let offset = material.add_block(input::uniform(
        "offset",
        Value::Vector3(Vector3::new(0.1, 0.2, 0.3)),
    ));
    let shifted = material.add_block(math::math("shifted", MathOperation::Add));
    material.connect(position, "output", shifted, "left")?;
    material.connect(offset, "output", shifted, "right")?;
    add_vertex_chain_from(&mut material, shifted)?;

    let tint = material.add_block(math::math("tint", MathOperation::Multiply));
    material.connect(offset, "output", tint, "left")?;
    material.connect(offset, "output", tint, "right")?;
    let fragment_output = material.add_block(output::fragment_output("fragmentOutput"));
    material.connect(tint, "output", fragment_output, "rgb")?;
    material.add_output_node(fragment_output)?;

    let report = material.build(false)?;
    assert!(report.is_success());

    let vertex = material.vertex_source().unwrap();
    let fragment = material.fragment_source().unwrap();
    assert_eq!(vertex.matches("uniform vec3 offset;").count(), 1);
    assert_eq!(fragment.matches("uniform vec3 offset;").count(), 1);
    // Both stages resolve to the same variable.
    assert!(vertex.contains("vec3 shifted = position + offset;"));
    assert!(fragment.contains("vec3 tint = offset * offset;"));
    Ok(())
}

#[test]
fn dual_texture_block_builds_once_per_stage() -> anyhow::Result<()> {
    let mut material = NodeMaterial::new("textured");
    add_vertex_chain(&mut material)?;

    let diffuse = material.add_block(texture::texture("diffuse"));
    let fragment_output = material.add_block(output::fragment_output("fragmentOutput"));
    material.connect(diffuse, "rgb", fragment_output, "rgb")?;
    material.add_output_node(fragment_output)?;

    let report = material.build(false)?;
    assert!(report.is_success());

    let vertex = material.vertex_source().unwrap();
    // The uv attribute is wired in automatically.
    assert!(vertex.contains("attribute vec2 uv;"));
    assert_eq!(vertex.matches("v_diffuseUV = uv;").count(), 1);

    let fragment = material.fragment_source().unwrap();
    assert_eq!(fragment.matches("texture2D(").count(), 1);
    assert!(fragment.contains("uniform sampler2D diffuseSampler;"));
    assert!(fragment.contains("gl_FragColor = vec4(diffuse.rgb, 1.0);"));

    assert!(vertex.contains("varying vec2 v_diffuseUV;"));
    assert!(fragment.contains("varying vec2 v_diffuseUV;"));
    Ok(())
}

#[test]
fn vertex_value_crossing_into_fragment_gets_a_varying() -> anyhow::Result<()> {
    let mut material = NodeMaterial::new("crossing");
    let position = add_vertex_chain(&mut material)?;

    let tint = material.add_block(math::math("tint", MathOperation::Multiply));
    material.connect(position, "output", tint, "left")?;
    material.connect(position, "output", tint, "right")?;
    let fragment_output = material.add_block(output::fragment_output("fragmentOutput"));
    material.connect(tint, "output", fragment_output, "rgb")?;
    material.add_output_node(fragment_output)?;

    let report = material.build(false)?;
    assert!(report.is_success());

    let vertex = material.vertex_source().unwrap();
    let fragment = material.fragment_source().unwrap();
    assert_eq!(vertex.matches("v_position = position;").count(), 1);
    assert!(fragment.contains("vec3 tint = v_position * v_position;"));
    assert!(vertex.contains("varying vec3 v_position;"));
    assert!(fragment.contains("varying vec3 v_position;"));
    Ok(())
}

#[test]
fn emitted_comments_name_the_blocks() -> anyhow::Result<()> {
    let mut material = NodeMaterial::new("commented");
    material.options_mut().emit_comments = true;
    material.set_to_default()?;
    material.build(false)?;
    let vertex = material.vertex_source().unwrap();
    assert!(vertex.contains("// worldPos"));
    assert!(vertex.contains("// vertexOutput"));
    Ok(())
}

#[test]
fn build_notifies_subscribers() -> anyhow::Result<()> {
    let mut material = NodeMaterial::new("observed");
    material.set_to_default()?;
    let built = material.on_built();
    let report = material.build(false)?;
    let notification = built.try_recv().unwrap();
    assert_eq!(notification.build_id, report.build_id);
    Ok(())
}

proptest! {
    /// A chained math graph of any depth compiles to the same text twice.
    #[test]
    fn chained_math_builds_identically(depth in 1usize..6) {
        let mut material = NodeMaterial::new("chained");
        add_vertex_chain(&mut material).unwrap();

        let base = material.add_block(input::uniform(
            "base",
            Value::Color3(Vector3::new(0.5, 0.5, 0.5)),
        ));
        let mut previous = base;
        for index in 0..depth {
            let step = material.add_block(math::math(&format!("step{index}"), MathOperation::Add));
            material.connect(previous, "output", step, "left").unwrap();
            material.connect(base, "output", step, "right").unwrap();
            previous = step;
        }
        let fragment_output = material.add_block(output::fragment_output("fragmentOutput"));
        material.connect(previous, "output", fragment_output, "rgb").unwrap();
        material.add_output_node(fragment_output).unwrap();

        material.build(false).unwrap();
        let first = material.compiled_shaders().unwrap();
        material.build(false).unwrap();
        let second = material.compiled_shaders().unwrap();
        prop_assert_eq!(first, second);
    }
}
