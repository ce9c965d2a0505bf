//! Block arena and connection management.

use anyhow::{bail, Result};

use crate::blocks::{Block, BlockClass, BlockId, OutputRef};
use crate::types::ValueType;

/// Insertion-ordered arena of blocks; connections are index-based.
#[derive(Default)]
pub struct MaterialGraph {
    blocks: Vec<Block>,
}

impl MaterialGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_block(&mut self, block: Block) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(block);
        id
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &Block)> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (BlockId(i as u32), b))
    }

    pub fn find_block(&self, predicate: impl Fn(&Block) -> bool) -> Option<BlockId> {
        self.iter().find(|(_, b)| predicate(b)).map(|(id, _)| id)
    }

    pub(crate) fn clear(&mut self) {
        self.blocks.clear();
    }

    /// Connect an output point to an input point.
    ///
    /// Fails when either port name is unknown, when the types cannot flow
    /// into each other, or when the input already has an upstream connection
    /// and `force` is false. On success the input adopts the upstream type
    /// if it was auto-detecting.
    pub fn connect(
        &mut self,
        source: BlockId,
        output: &str,
        target: BlockId,
        input: &str,
        force: bool,
    ) -> Result<()> {
        let Some(output_index) = self
            .block(source)
            .outputs()
            .iter()
            .position(|p| p.name == output)
        else {
            bail!(
                "block '{}' has no output named '{output}'",
                self.block(source).name
            );
        };
        let Some(input_index) = self
            .block(target)
            .inputs()
            .iter()
            .position(|p| p.name == input)
        else {
            bail!(
                "block '{}' has no input named '{input}'",
                self.block(target).name
            );
        };

        let source_type = self.block(source).outputs()[output_index].resolved_type();
        let input_point = &self.block(target).inputs()[input_index];
        if input_point.is_connected() && !force {
            bail!(
                "input '{input}' of block '{}' already has an incoming connection",
                self.block(target).name
            );
        }
        // Check against the declared type so an auto-detect input that
        // resolved through an earlier connection can still be re-targeted.
        let declared_type = input_point.declared_type();
        if !source_type.is_compatible(declared_type) {
            bail!(
                "cannot connect '{}.{output}' ({source_type:?}) to '{}.{input}' ({declared_type:?})",
                self.block(source).name,
                self.block(target).name,
            );
        }

        let target_block = self.block_mut(target);
        target_block.inputs[input_index].connected_to = Some(OutputRef {
            block: source,
            output: output_index,
        });
        if target_block.inputs[input_index].declared_type() == ValueType::AutoDetect {
            target_block.inputs[input_index].resolve_type(source_type);
        }
        // Math outputs follow their left operand.
        if target_block.class() == BlockClass::Math && input == "left" {
            target_block.outputs[0].resolve_type(source_type);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{input, math, output, MathOperation};
    use crate::types::{Value, ValueType};

    #[test]
    fn second_connection_needs_force() {
        let mut graph = MaterialGraph::new();
        let a = graph.add_block(input::uniform("a", Value::Float(1.0)));
        let b = graph.add_block(input::uniform("b", Value::Float(2.0)));
        let add = graph.add_block(math::math("add", MathOperation::Add));

        graph.connect(a, "output", add, "left", false).unwrap();
        let refused = graph.connect(b, "output", add, "left", false);
        assert!(refused.is_err());

        graph.connect(b, "output", add, "left", true).unwrap();
        let link = graph
            .block(add)
            .input_by_name("left")
            .unwrap()
            .connected_point()
            .unwrap();
        assert_eq!(link.block, b);
    }

    #[test]
    fn auto_detect_input_adopts_upstream_type() {
        let mut graph = MaterialGraph::new();
        let color = graph.add_block(input::uniform(
            "color",
            Value::Color3(nalgebra::Vector3::new(1.0, 0.0, 0.0)),
        ));
        let scale = graph.add_block(math::math("scale", MathOperation::Multiply));
        graph
            .connect(color, "output", scale, "left", false)
            .unwrap();

        let block = graph.block(scale);
        assert_eq!(
            block.input_by_name("left").unwrap().resolved_type(),
            ValueType::Color3
        );
        assert_eq!(
            block.output_by_name("output").unwrap().resolved_type(),
            ValueType::Color3
        );
    }

    #[test]
    fn forced_reconnect_re_resolves_an_auto_detect_input() {
        let mut graph = MaterialGraph::new();
        let scalar = graph.add_block(input::uniform("scalar", Value::Float(2.0)));
        let color = graph.add_block(input::uniform(
            "color",
            Value::Vector3(nalgebra::Vector3::new(1.0, 0.0, 0.0)),
        ));
        let scale = graph.add_block(math::math("scale", MathOperation::Multiply));

        graph
            .connect(scalar, "output", scale, "left", false)
            .unwrap();
        assert_eq!(
            graph.block(scale).input_by_name("left").unwrap().resolved_type(),
            ValueType::Float
        );

        // A previous Float resolution must not pin the declared auto-detect.
        graph.connect(color, "output", scale, "left", true).unwrap();
        let block = graph.block(scale);
        assert_eq!(
            block.input_by_name("left").unwrap().resolved_type(),
            ValueType::Vec3
        );
        assert_eq!(
            block.output_by_name("output").unwrap().resolved_type(),
            ValueType::Vec3
        );
    }

    #[test]
    fn incompatible_types_refuse_to_connect() {
        let mut graph = MaterialGraph::new();
        let uv = graph.add_block(input::attribute("uv", "uv", ValueType::Vec2));
        let out = graph.add_block(output::vertex_output("out"));
        assert!(graph.connect(uv, "output", out, "vector", false).is_err());
    }
}
