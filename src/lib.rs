//! Node-graph shader material compiler.
//!
//! A material is a graph of typed blocks. Building the graph walks it twice,
//! once per shader stage, and emits a GLSL vertex/fragment program pair
//! together with the attribute, uniform and sampler lists an engine needs to
//! instantiate it. Readiness checks then keep a per-submesh effect in sync
//! with the mesh's geometry and the define set, and the bind phase uploads
//! per-draw values through the [`material::effect::Effect`] trait.
//!
//! ```no_run
//! use node_forge_material_compiler::material::NodeMaterial;
//! use node_forge_material_compiler::material::effect::RecordingEngine;
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut material = NodeMaterial::new("default");
//! material.set_to_default()?;
//! let report = material.build(false)?;
//! assert!(report.is_success());
//! # Ok(())
//! # }
//! ```

pub mod blocks;
pub mod graph;
pub mod material;
pub mod types;

pub use blocks::{Block, BlockClass, BlockId, ConnectionPoint, OutputRef};
pub use graph::MaterialGraph;
pub use material::{BuildReport, MaterialOptions, NodeMaterial};
pub use types::{BlockTarget, Stage, SystemValue, Value, ValueType};
