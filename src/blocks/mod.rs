//! Block data model and the per-kind compiler dispatch.
//!
//! Blocks are plain data stored in a [`MaterialGraph`] arena; every
//! compilation-affecting behavior is dispatched over the closed [`BlockKind`]
//! sum type from the functions in this module, one compiler module per kind.

pub mod input;
pub mod lights;
pub mod math;
pub mod output;
pub mod texture;
pub mod transform;

use crate::graph::MaterialGraph;
use crate::material::build_state::BuildState;
use crate::material::defines::MaterialDefines;
use crate::material::effect::{Effect, EffectFallbacks};
use crate::material::shared_data::SharedData;
use crate::material::submesh::MeshInfo;
use crate::types::{BlockTarget, Stage, ValueType};

pub use input::{InputBlock, InputSource};
pub use lights::LightsBlock;
pub use math::{MathBlock, MathOperation};
pub use texture::{TextureBlock, TextureVariant};

/// Index of a block inside its material's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub(crate) u32);

impl BlockId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Non-owning reference to an output connection point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputRef {
    pub block: BlockId,
    pub output: usize,
}

/// A typed edge endpoint on a block.
///
/// Inputs hold at most one upstream [`OutputRef`]; outputs are referenced by
/// any number of downstream inputs. `associated_variable` is per-build
/// scratch, reset during block initialization.
#[derive(Clone, Debug)]
pub struct ConnectionPoint {
    pub name: String,
    declared_type: ValueType,
    resolved_type: Option<ValueType>,
    pub(crate) connected_to: Option<OutputRef>,
    pub(crate) associated_variable: String,
}

impl ConnectionPoint {
    pub(crate) fn new(name: impl Into<String>, ty: ValueType) -> Self {
        Self {
            name: name.into(),
            declared_type: ty,
            resolved_type: None,
            connected_to: None,
            associated_variable: String::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected_to.is_some()
    }

    pub fn connected_point(&self) -> Option<OutputRef> {
        self.connected_to
    }

    /// Propagated type, falling back to the declared one until connected.
    pub fn resolved_type(&self) -> ValueType {
        self.resolved_type.unwrap_or(self.declared_type)
    }

    pub(crate) fn declared_type(&self) -> ValueType {
        self.declared_type
    }

    pub(crate) fn resolve_type(&mut self, ty: ValueType) {
        self.resolved_type = Some(ty);
    }
}

/// Closed set of block kinds the compiler understands.
#[derive(Clone, Debug)]
pub enum BlockKind {
    Input(InputBlock),
    Transform(transform::TransformBlock),
    Math(MathBlock),
    VertexOutput,
    FragmentOutput,
    Texture(TextureBlock),
    Lights(LightsBlock),
}

/// Discriminant of [`BlockKind`], used for the uniqueness invariant and for
/// behavior branching without class-name strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockClass {
    Input,
    Transform,
    Math,
    VertexOutput,
    FragmentOutput,
    Texture,
    Lights,
}

impl std::fmt::Display for BlockClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// A named node of the shader graph.
#[derive(Clone, Debug)]
pub struct Block {
    pub name: String,
    pub(crate) target: BlockTarget,
    pub(crate) kind: BlockKind,
    pub(crate) inputs: Vec<ConnectionPoint>,
    pub(crate) outputs: Vec<ConnectionPoint>,
}

impl Block {
    pub(crate) fn new(name: impl Into<String>, target: BlockTarget, kind: BlockKind) -> Self {
        Self {
            name: name.into(),
            target,
            kind,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub(crate) fn with_input(mut self, name: &str, ty: ValueType) -> Self {
        self.inputs.push(ConnectionPoint::new(name, ty));
        self
    }

    pub(crate) fn with_output(mut self, name: &str, ty: ValueType) -> Self {
        self.outputs.push(ConnectionPoint::new(name, ty));
        self
    }

    pub fn target(&self) -> BlockTarget {
        self.target
    }

    pub fn kind(&self) -> &BlockKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut BlockKind {
        &mut self.kind
    }

    pub fn class(&self) -> BlockClass {
        match self.kind {
            BlockKind::Input(_) => BlockClass::Input,
            BlockKind::Transform(_) => BlockClass::Transform,
            BlockKind::Math(_) => BlockClass::Math,
            BlockKind::VertexOutput => BlockClass::VertexOutput,
            BlockKind::FragmentOutput => BlockClass::FragmentOutput,
            BlockKind::Texture(_) => BlockClass::Texture,
            BlockKind::Lights(_) => BlockClass::Lights,
        }
    }

    /// At most one block of a unique class may take part in a compilation.
    pub fn is_unique(&self) -> bool {
        matches!(self.kind, BlockKind::Lights(_))
    }

    /// Final mergers are the blocks that may act as output nodes.
    pub fn is_final_merger(&self) -> bool {
        matches!(self.kind, BlockKind::VertexOutput | BlockKind::FragmentOutput)
    }

    pub fn is_input(&self) -> bool {
        matches!(self.kind, BlockKind::Input(_))
    }

    pub fn inputs(&self) -> &[ConnectionPoint] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[ConnectionPoint] {
        &self.outputs
    }

    pub fn input_by_name(&self, name: &str) -> Option<&ConnectionPoint> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output_by_name(&self, name: &str) -> Option<&ConnectionPoint> {
        self.outputs.iter().find(|p| p.name == name)
    }
}

/// One block input resolved against already-built upstream producers.
pub(crate) struct ResolvedInput {
    pub expr: Option<String>,
    pub ty: ValueType,
}

impl ResolvedInput {
    /// Expression for this input, or a zero literal when unconnected; the
    /// caller decides whether the missing connection is an error.
    pub fn expr_or_zero(&self) -> String {
        self.expr
            .clone()
            .unwrap_or_else(|| self.ty.zero_literal().to_string())
    }
}

/// Reset the per-build scratch a concrete kind keeps between builds.
pub(crate) fn initialize_scratch(block: &mut Block) {
    match &mut block.kind {
        BlockKind::Texture(data) => data.reset_build_scratch(),
        BlockKind::Lights(data) => data.reset_build_scratch(),
        _ => {}
    }
}

/// Give a block the chance to wire default upstream blocks. Must be
/// idempotent; only runs for inputs that are still unconnected.
pub(crate) fn auto_configure(graph: &mut MaterialGraph, id: BlockId) {
    if matches!(graph.block(id).kind, BlockKind::Texture(_)) {
        texture::auto_configure(graph, id);
    }
}

/// Register the block into the shared data's categorized lists.
pub(crate) fn classify(shared: &mut SharedData, block: &Block, id: BlockId) {
    match &block.kind {
        BlockKind::Input(data) => {
            shared.input_blocks.push(id);
            if data.is_animated() {
                shared.animated_inputs.push(id);
            }
        }
        BlockKind::Texture(_) => {
            shared.blocking_blocks.push(id);
            shared.blocks_with_defines.push(id);
            shared.bindable_blocks.push(id);
            shared.texture_blocks.push(id);
        }
        BlockKind::Lights(_) => {
            shared.blocks_with_defines.push(id);
            shared.repeatable_content_blocks.push(id);
            shared.dynamic_uniform_blocks.push(id);
            shared.blocks_with_fallbacks.push(id);
        }
        _ => {}
    }
}

/// Depth-first code generation for one block into one stage.
///
/// The per-stage visited set short-circuits re-entry, so diamond shapes and
/// the dual-target re-visitation cycle emit each block exactly once per
/// stage. `vertex_state` is the already-built vertex stage, available while
/// building the fragment stage for cross-stage variable transfer.
pub(crate) fn build_block(
    graph: &mut MaterialGraph,
    id: BlockId,
    state: &mut BuildState,
    shared: &mut SharedData,
    mut vertex_state: Option<&mut BuildState>,
) {
    if state.is_built(id) {
        return;
    }
    state.mark_built(id);

    let links: Vec<Option<OutputRef>> = graph
        .block(id)
        .inputs
        .iter()
        .map(|p| p.connected_to)
        .collect();
    for link in links.iter().flatten() {
        if link.block == id {
            continue;
        }
        if graph.block(link.block).target.includes(state.stage()) {
            build_block(graph, link.block, state, shared, vertex_state.as_deref_mut());
        }
    }

    if shared.emit_comments {
        let name = graph.block(id).name.clone();
        state.comment(&name);
    }

    let inputs = resolve_inputs(graph, id, state, shared, vertex_state);
    let block = graph.block_mut(id);
    match &block.kind {
        BlockKind::Input(_) => input::build(block, state, shared),
        BlockKind::Transform(_) => transform::build(block, &inputs, state, shared),
        BlockKind::Math(_) => math::build(block, &inputs, state, shared),
        BlockKind::VertexOutput => output::build_vertex_output(block, &inputs, state, shared),
        BlockKind::FragmentOutput => output::build_fragment_output(block, &inputs, state, shared),
        BlockKind::Texture(_) => texture::build(block, &inputs, state, shared),
        BlockKind::Lights(_) => lights::build(block, &inputs, state, shared),
    }
}

/// Collect the expressions feeding a block's inputs.
///
/// A vertex-only value consumed from the fragment stage is routed through a
/// varying: the declaration goes to the shared varying block and the transfer
/// assignment is appended to the vertex body, which has not been finalized
/// yet at this point of the build.
fn resolve_inputs(
    graph: &MaterialGraph,
    id: BlockId,
    state: &mut BuildState,
    shared: &mut SharedData,
    mut vertex_state: Option<&mut BuildState>,
) -> Vec<ResolvedInput> {
    let block = graph.block(id);
    let mut resolved = Vec::with_capacity(block.inputs.len());
    for point in &block.inputs {
        let ty = point.resolved_type();
        let Some(link) = point.connected_to else {
            resolved.push(ResolvedInput { expr: None, ty });
            continue;
        };
        let upstream = graph.block(link.block);
        let source = &upstream.outputs[link.output];
        let var = source.associated_variable.clone();
        if var.is_empty() {
            shared.push_issue(
                &block.name,
                format!(
                    "input '{}' reads output '{}' of block '{}' which produced no value",
                    point.name, source.name, upstream.name
                ),
            );
            resolved.push(ResolvedInput { expr: None, ty });
            continue;
        }
        let ty = source.resolved_type();
        let crosses_stage =
            state.stage() == Stage::Fragment && upstream.target == BlockTarget::Vertex;
        let expr = if crosses_stage {
            let varying = format!("v_{var}");
            if shared.register_varying(&varying, ty) {
                if let Some(vs) = vertex_state.as_deref_mut() {
                    vs.push_line(format!("{varying} = {var};"));
                }
            }
            varying
        } else {
            var
        };
        resolved.push(ResolvedInput {
            expr: Some(expr),
            ty,
        });
    }
    resolved
}

/// Hard readiness gate consulted before any effect creation.
pub(crate) fn is_ready(block: &Block, _mesh: &MeshInfo, _use_instances: bool) -> bool {
    match &block.kind {
        BlockKind::Texture(data) => data.is_ready(),
        _ => true,
    }
}

/// Material-level knobs the define hooks need.
#[derive(Clone, Copy, Debug)]
pub(crate) struct DefineContext {
    pub max_simultaneous_lights: u32,
    pub use_instances: bool,
}

/// Phase one of the defines update: structural key allocation.
pub(crate) fn initialize_defines(
    block: &Block,
    mesh: &MeshInfo,
    defines: &mut MaterialDefines,
    ctx: DefineContext,
) {
    match &block.kind {
        BlockKind::Texture(data) => texture::initialize_defines(block, data, defines),
        BlockKind::Lights(_) => lights::initialize_defines(mesh, defines, ctx),
        _ => {}
    }
}

/// Phase two of the defines update: content-dependent values.
pub(crate) fn prepare_defines(
    block: &Block,
    mesh: &MeshInfo,
    defines: &mut MaterialDefines,
    ctx: DefineContext,
) {
    match &block.kind {
        BlockKind::Texture(data) => texture::prepare_defines(block, data, defines),
        BlockKind::Lights(_) => lights::prepare_defines(mesh, defines, ctx),
        _ => {}
    }
}

/// Re-expand define-dependent text into the restored stage snapshots.
pub(crate) fn replace_repeatable_content(
    block: &Block,
    vertex_state: &mut BuildState,
    fragment_state: &mut BuildState,
    defines: &MaterialDefines,
    ctx: DefineContext,
) {
    if let BlockKind::Lights(data) = &block.kind {
        lights::replace_repeatable_content(data, vertex_state, fragment_state, defines, ctx);
    }
}

/// Regenerate define-dependent uniform and uniform-buffer names.
pub(crate) fn update_uniforms_and_samplers(
    block: &Block,
    vertex_state: &mut BuildState,
    defines: &MaterialDefines,
    uniform_buffers: &mut Vec<String>,
    ctx: DefineContext,
) {
    if let BlockKind::Lights(_) = &block.kind {
        lights::update_uniforms_and_samplers(vertex_state, defines, uniform_buffers, ctx);
    }
}

/// Collect degradation ranks for defines that may be dropped under pressure.
pub(crate) fn provide_fallbacks(
    block: &Block,
    fallbacks: &mut EffectFallbacks,
    defines: &MaterialDefines,
    ctx: DefineContext,
) {
    if let BlockKind::Lights(_) = &block.kind {
        lights::provide_fallbacks(fallbacks, defines, ctx);
    }
}

/// Bind-phase resource upload for bindable blocks.
pub(crate) fn bind(block: &Block, effect: &dyn Effect) {
    if let BlockKind::Texture(data) = &block.kind {
        texture::bind(data, effect);
    }
}
