//! Graph-level invariants: uniqueness, output registration, connections,
//! optimizers and code dumping.

use std::cell::Cell;
use std::rc::Rc;

use node_forge_material_compiler::blocks::{
    input, lights, math, output, transform, BlockId, MathOperation,
};
use node_forge_material_compiler::graph::MaterialGraph;
use node_forge_material_compiler::material::optimizer::GraphOptimizer;
use node_forge_material_compiler::material::NodeMaterial;
use node_forge_material_compiler::types::{SystemValue, Value, ValueType};

fn add_vertex_chain(material: &mut NodeMaterial) -> anyhow::Result<()> {
    let position = material.add_block(input::attribute("position", "position", ValueType::Vec3));
    let world = material.add_block(input::system_value("world", SystemValue::World));
    let world_pos = material.add_block(transform::transform("worldPos"));
    material.connect(position, "output", world_pos, "vector")?;
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
fn two_lights_blocks_fail_the_build_by_class() -> anyhow::Result<()> {
    let mut material = NodeMaterial::new("overlit");
    add_vertex_chain(&mut material)?;

    let key = material.add_block(lights::lights("keyLight"));
    let fill = material.add_block(lights::lights("fillLight"));
    let sum = material.add_block(math::math("sum", MathOperation::Add));
    material.connect(key, "diffuse", sum, "left")?;
    material.connect(fill, "diffuse", sum, "right")?;
    let fragment_output = material.add_block(output::fragment_output("fragmentOutput"));
    material.connect(sum, "output", fragment_output, "rgb")?;
    material.add_output_node(fragment_output)?;

    let error = material.build(false).unwrap_err();
    assert!(error.to_string().contains("Lights"), "{error}");
    Ok(())
}

#[test]
fn undefined_target_blocks_cannot_be_output_nodes() -> anyhow::Result<()> {
    let mut material = NodeMaterial::new("invalid-output");
    let sum = material.add_block(math::math("sum", MathOperation::Add));
    assert!(material.add_output_node(sum).is_err());

    // A dual-target block is rejected the same way.
    let diffuse =
        material.add_block(node_forge_material_compiler::blocks::texture::texture("diffuse"));
    assert!(material.add_output_node(diffuse).is_err());

    // The failed registrations left no partial state behind.
    material.set_to_default()?;
    assert!(material.build(false)?.is_success());
    Ok(())
}

#[test]
fn connections_enforce_types_and_explicit_replacement() -> anyhow::Result<()> {
    let mut material = NodeMaterial::new("wiring");
    let shade = material.add_block(input::uniform("shade", Value::Float(0.5)));
    let world_pos = material.add_block(transform::transform("worldPos"));

    // float cannot feed a matrix input
    assert!(material
        .connect(shade, "output", world_pos, "transform")
        .is_err());

    material.set_to_default()?;
    let fragment_output = material.get_block_by_name("fragmentOutput").unwrap();
    let second = material.add_block(input::uniform(
        "accent",
        Value::Color4(nalgebra::Vector4::new(1.0, 0.0, 0.0, 1.0)),
    ));

    assert!(material
        .connect(second, "output", fragment_output, "rgba")
        .is_err());
    material.connect_force(second, "output", fragment_output, "rgba")?;
    material.build(false)?;
    let fragment = material.fragment_source().unwrap();
    assert!(fragment.contains("gl_FragColor = accent;"));

    // The replaced producer no longer reaches the program.
    assert!(!fragment.contains("uniform vec4 color;"));
    Ok(())
}

struct CountingOptimizer {
    calls: Rc<Cell<usize>>,
}

impl GraphOptimizer for CountingOptimizer {
    fn name(&self) -> &str {
        "counting"
    }

    fn optimize(
        &mut self,
        _graph: &mut MaterialGraph,
        vertex_outputs: &[BlockId],
        fragment_outputs: &[BlockId],
    ) {
        assert!(!vertex_outputs.is_empty());
        assert!(!fragment_outputs.is_empty());
        self.calls.set(self.calls.get() + 1);
    }
}

#[test]
fn optimizers_run_once_per_build_and_deduplicate_by_name() -> anyhow::Result<()> {
    let mut material = NodeMaterial::new("optimized");
    material.set_to_default()?;

    let calls = Rc::new(Cell::new(0));
    material.register_optimizer(Box::new(CountingOptimizer {
        calls: calls.clone(),
    }));
    material.register_optimizer(Box::new(CountingOptimizer {
        calls: calls.clone(),
    }));

    material.build(false)?;
    assert_eq!(calls.get(), 1);

    assert!(material.unregister_optimizer("counting"));
    assert!(!material.unregister_optimizer("counting"));
    material.build(false)?;
    assert_eq!(calls.get(), 1);
    Ok(())
}

#[test]
fn generate_code_covers_blocks_connections_and_outputs() -> anyhow::Result<()> {
    let mut material = NodeMaterial::new("dumped");
    material.set_to_default()?;
    let code = material.generate_code();

    assert!(code.contains("NodeMaterial::new(\"dumped\")"));
    assert!(code.contains("input::attribute(\"position\", \"position\", ValueType::Vec3)"));
    assert!(code.contains("input::system_value(\"world\", SystemValue::World)"));
    assert!(code.contains("transform::transform(\"worldPos\")"));
    assert!(code.contains("output::vertex_output(\"vertexOutput\")"));
    assert!(code.contains("output::fragment_output(\"fragmentOutput\")"));
    assert_eq!(code.matches("material.connect(").count(), 6);
    assert_eq!(code.matches("material.add_output_node(").count(), 2);

    // Dumping twice yields the same text.
    assert_eq!(code, material.generate_code());
    Ok(())
}

#[test]
fn removing_a_block_disconnects_its_consumers() -> anyhow::Result<()> {
    let mut material = NodeMaterial::new("detached");
    material.set_to_default()?;
    let world = material.get_block_by_name("world").unwrap();
    material.remove_block(world);

    let report = material.build(false)?;
    assert!(!report.is_success());
    assert!(report.issues.iter().any(|issue| issue.block == "worldPos"));
    assert!(!material.build_was_successful());
    Ok(())
}

#[test]
fn block_lookup_returns_the_first_match() {
    let mut material = NodeMaterial::new("ambiguous");
    let first = material.add_block(input::uniform("tint", Value::Float(0.1)));
    let _second = material.add_block(input::uniform("tint", Value::Float(0.9)));
    assert_eq!(material.get_block_by_name("tint"), Some(first));
    assert!(material
        .get_block_by_predicate(|block| block.is_input())
        .is_some());
}
