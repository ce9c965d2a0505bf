//! The node material: owns the block graph and drives compilation,
//! readiness and binding.

pub mod build_state;
pub mod code_dump;
pub mod defines;
pub mod effect;
pub mod optimizer;
pub mod shared_data;
pub mod submesh;

use std::collections::HashSet;

use anyhow::{Result, bail};
use crossbeam_channel::{Receiver, Sender, unbounded};
use nalgebra::{Matrix4, Vector4};
use tracing::{debug, error, info, warn};

use crate::blocks::{self, Block, BlockId, BlockKind, input, output, transform};
use crate::graph::MaterialGraph;
use crate::types::{BlockTarget, Stage, SystemValue, Value, ValueType};

use build_state::BuildState;
use defines::MaterialDefines;
use effect::{
    EffectCreationOptions, EffectEngine, EffectFallbacks, ShaderSources, TextureRef, same_effect,
};
use optimizer::GraphOptimizer;
use shared_data::{CompilationIssue, SharedData};
use submesh::{FrameContext, MeshInfo, SceneBindings, SubMeshState};

/// Material-level compilation knobs.
#[derive(Clone, Copy, Debug)]
pub struct MaterialOptions {
    /// Prefix every block's emitted code with a `// name` comment.
    pub emit_comments: bool,
    /// Keep the previous effect alive while a replacement is compiling.
    pub allow_shader_hot_swapping: bool,
    pub max_simultaneous_lights: u32,
    /// Never report alpha blending, whatever the graph produces.
    pub ignore_alpha: bool,
}

impl Default for MaterialOptions {
    fn default() -> Self {
        Self {
            emit_comments: false,
            allow_shader_hot_swapping: true,
            max_simultaneous_lights: 4,
            ignore_alpha: false,
        }
    }
}

/// Outcome of a completed build.
#[derive(Clone, Debug)]
pub struct BuildReport {
    pub build_id: u64,
    pub issues: Vec<CompilationIssue>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Message delivered to build subscribers after a successful build.
#[derive(Clone, Copy, Debug)]
pub struct BuildNotification {
    pub build_id: u64,
}

/// A shader-graph material.
///
/// Blocks live in an internal arena and are addressed by [`BlockId`].
/// Compilation produces one [`BuildState`] per stage; readiness and binding
/// then work against those states and the caller's per-submesh cache.
pub struct NodeMaterial {
    pub name: String,
    pub alpha: f32,
    options: MaterialOptions,
    pub(crate) graph: MaterialGraph,
    attached_blocks: Vec<BlockId>,
    pub(crate) vertex_output_nodes: Vec<BlockId>,
    pub(crate) fragment_output_nodes: Vec<BlockId>,
    optimizers: Vec<Box<dyn GraphOptimizer>>,
    vertex_state: Option<BuildState>,
    fragment_state: Option<BuildState>,
    shared: Option<SharedData>,
    build_id: u64,
    build_was_successful: bool,
    frozen: bool,
    animation_frame: Option<u64>,
    cached_world_view: Matrix4<f32>,
    cached_world_view_projection: Matrix4<f32>,
    build_subscribers: Vec<Sender<BuildNotification>>,
}

impl NodeMaterial {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_options(name, MaterialOptions::default())
    }

    pub fn with_options(name: impl Into<String>, options: MaterialOptions) -> Self {
        Self {
            name: name.into(),
            alpha: 1.0,
            options,
            graph: MaterialGraph::new(),
            attached_blocks: Vec::new(),
            vertex_output_nodes: Vec::new(),
            fragment_output_nodes: Vec::new(),
            optimizers: Vec::new(),
            vertex_state: None,
            fragment_state: None,
            shared: None,
            build_id: 0,
            build_was_successful: false,
            frozen: false,
            animation_frame: None,
            cached_world_view: Matrix4::identity(),
            cached_world_view_projection: Matrix4::identity(),
            build_subscribers: Vec::new(),
        }
    }

    pub fn options(&self) -> &MaterialOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut MaterialOptions {
        &mut self.options
    }

    pub fn build_id(&self) -> u64 {
        self.build_id
    }

    pub fn build_was_successful(&self) -> bool {
        self.build_was_successful
    }

    // ---- graph construction ------------------------------------------------

    pub fn add_block(&mut self, block: Block) -> BlockId {
        self.graph.add_block(block)
    }

    pub fn block(&self, id: BlockId) -> &Block {
        self.graph.block(id)
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        self.graph.block_mut(id)
    }

    pub fn connect(
        &mut self,
        source: BlockId,
        output: &str,
        target: BlockId,
        input: &str,
    ) -> Result<()> {
        self.graph.connect(source, output, target, input, false)
    }

    /// Connect, replacing any existing connection on the input.
    pub fn connect_force(
        &mut self,
        source: BlockId,
        output: &str,
        target: BlockId,
        input: &str,
    ) -> Result<()> {
        self.graph.connect(source, output, target, input, true)
    }

    /// Register a final merger as a compilation root.
    ///
    /// Fails without touching the output lists when the block's target does
    /// not pin it to exactly one stage.
    pub fn add_output_node(&mut self, id: BlockId) -> Result<()> {
        let block = self.graph.block(id);
        match block.target() {
            BlockTarget::Undefined => {
                bail!(
                    "block '{}' has an undefined target and cannot be an output node",
                    block.name
                );
            }
            BlockTarget::VertexAndFragment => {
                bail!(
                    "block '{}' targets both stages; an output node must belong to one",
                    block.name
                );
            }
            BlockTarget::Vertex => {
                if !self.vertex_output_nodes.contains(&id) {
                    self.vertex_output_nodes.push(id);
                }
            }
            BlockTarget::Fragment => {
                if !self.fragment_output_nodes.contains(&id) {
                    self.fragment_output_nodes.push(id);
                }
            }
        }
        Ok(())
    }

    pub fn remove_output_node(&mut self, id: BlockId) {
        self.vertex_output_nodes.retain(|n| *n != id);
        self.fragment_output_nodes.retain(|n| *n != id);
    }

    /// Detach a block: every input reading from it is disconnected and it is
    /// dropped from the output lists. The arena slot itself is retained.
    pub fn remove_block(&mut self, id: BlockId) {
        for index in 0..self.graph.len() {
            let other = self.graph.block_mut(BlockId(index as u32));
            for point in &mut other.inputs {
                if point.connected_to.is_some_and(|link| link.block == id) {
                    point.connected_to = None;
                }
            }
        }
        self.remove_output_node(id);
        self.attached_blocks.retain(|n| *n != id);
    }

    /// Drop the whole graph and every compilation artifact.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.attached_blocks.clear();
        self.vertex_output_nodes.clear();
        self.fragment_output_nodes.clear();
        self.vertex_state = None;
        self.fragment_state = None;
        self.shared = None;
        self.build_was_successful = false;
    }

    /// First block with the given name, warning when the name is ambiguous.
    pub fn get_block_by_name(&self, name: &str) -> Option<BlockId> {
        let mut found = None;
        for (id, block) in self.graph.iter() {
            if block.name == name {
                if found.is_some() {
                    warn!(material = %self.name, block = name, "more than one block carries this name, returning the first");
                    break;
                }
                found = Some(id);
            }
        }
        found
    }

    pub fn get_block_by_predicate(&self, predicate: impl Fn(&Block) -> bool) -> Option<BlockId> {
        self.graph.find_block(predicate)
    }

    pub fn get_input_blocks(&self) -> Vec<BlockId> {
        self.graph
            .iter()
            .filter(|(_, block)| block.is_input())
            .map(|(id, _)| id)
            .collect()
    }

    // ---- optimizers --------------------------------------------------------

    pub fn register_optimizer(&mut self, optimizer: Box<dyn GraphOptimizer>) {
        if self.optimizers.iter().any(|o| o.name() == optimizer.name()) {
            warn!(material = %self.name, optimizer = optimizer.name(), "optimizer already registered");
            return;
        }
        self.optimizers.push(optimizer);
    }

    pub fn unregister_optimizer(&mut self, name: &str) -> bool {
        let before = self.optimizers.len();
        self.optimizers.retain(|o| o.name() != name);
        self.optimizers.len() != before
    }

    /// Run every registered optimizer against the current graph.
    pub fn optimize(&mut self) {
        let Self {
            graph,
            optimizers,
            vertex_output_nodes,
            fragment_output_nodes,
            ..
        } = self;
        for optimizer in optimizers.iter_mut() {
            optimizer.optimize(graph, vertex_output_nodes, fragment_output_nodes);
        }
    }

    // ---- freezing and notifications ----------------------------------------

    /// Pin the material: readiness checks short-circuit to the cached answer.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn unfreeze(&mut self) {
        self.frozen = false;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Channel receiving a message after every successful build.
    pub fn on_built(&mut self) -> Receiver<BuildNotification> {
        let (sender, receiver) = unbounded();
        self.build_subscribers.push(sender);
        receiver
    }

    // ---- default graph -----------------------------------------------------

    /// Replace the graph with the canonical minimal material: position
    /// through world and view-projection into the vertex output, a color
    /// uniform into the fragment output.
    pub fn set_to_default(&mut self) -> Result<()> {
        self.clear();

        let position = self
            .graph
            .add_block(input::attribute("position", "position", ValueType::Vec3));
        let world = self
            .graph
            .add_block(input::system_value("world", SystemValue::World));
        let world_pos = self.graph.add_block(transform::transform("worldPos"));
        self.graph.connect(position, "output", world_pos, "vector", false)?;
        self.graph.connect(world, "output", world_pos, "transform", false)?;

        let view_projection = self.graph.add_block(input::system_value(
            "viewProjection",
            SystemValue::ViewProjection,
        ));
        let world_pos_multiplied = self
            .graph
            .add_block(transform::transform("worldPos * viewProjectionTransform"));
        self.graph
            .connect(world_pos, "output", world_pos_multiplied, "vector", false)?;
        self.graph.connect(
            view_projection,
            "output",
            world_pos_multiplied,
            "transform",
            false,
        )?;

        let vertex_output = self.graph.add_block(output::vertex_output("vertexOutput"));
        self.graph
            .connect(world_pos_multiplied, "output", vertex_output, "vector", false)?;

        let color = self.graph.add_block(input::uniform(
            "color",
            Value::Color4(Vector4::new(0.8, 0.8, 0.8, 1.0)),
        ));
        let fragment_output = self
            .graph
            .add_block(output::fragment_output("fragmentOutput"));
        self.graph
            .connect(color, "output", fragment_output, "rgba", false)?;

        self.add_output_node(vertex_output)?;
        self.add_output_node(fragment_output)?;
        Ok(())
    }

    // ---- build -------------------------------------------------------------

    /// Compile the graph into the two stage programs.
    ///
    /// Structural problems (no output nodes, a duplicated unique block, a
    /// cycle of mutually-dependent stages) fail the build; per-block emission
    /// problems are collected into the report instead.
    pub fn build(&mut self, verbose: bool) -> Result<BuildReport> {
        self.build_was_successful = false;
        self.vertex_state = None;
        self.fragment_state = None;
        self.shared = None;
        self.attached_blocks.clear();

        if self.vertex_output_nodes.is_empty() {
            bail!("material '{}' has no vertex output node", self.name);
        }
        if self.fragment_output_nodes.is_empty() {
            bail!("material '{}' has no fragment output node", self.name);
        }

        let mut shared = SharedData::new(self.build_id, self.options.emit_comments, verbose);
        let mut vertex_state = BuildState::new(Stage::Vertex);
        let mut fragment_state = BuildState::new(Stage::Fragment);

        // Initialization discovers the full participating set. Blocks pinned
        // to the opposite stage of the one discovering them become extra
        // compilation roots for that stage.
        let mut vertex_nodes = self.vertex_output_nodes.clone();
        let mut fragment_nodes = self.fragment_output_nodes.clone();
        let mut prepared = HashSet::new();

        let mut index = 0;
        while index < vertex_nodes.len() {
            let id = vertex_nodes[index];
            index += 1;
            self.initialize_block(id, Stage::Vertex, &mut shared, &mut fragment_nodes, &mut prepared)?;
        }
        let mut index = 0;
        while index < fragment_nodes.len() {
            let id = fragment_nodes[index];
            index += 1;
            self.initialize_block(id, Stage::Fragment, &mut shared, &mut vertex_nodes, &mut prepared)?;
        }

        self.optimize();

        for index in 0..vertex_nodes.len() {
            blocks::build_block(
                &mut self.graph,
                vertex_nodes[index],
                &mut vertex_state,
                &mut shared,
                None,
            );
        }

        // The fragment stage resolves against the vertex uniform scope so
        // dual-target inputs keep a single declaration.
        fragment_state.inherit_uniform_scope(&vertex_state);

        for index in 0..fragment_nodes.len() {
            blocks::build_block(
                &mut self.graph,
                fragment_nodes[index],
                &mut fragment_state,
                &mut shared,
                Some(&mut vertex_state),
            );
        }

        vertex_state.finalize(&shared);
        fragment_state.finalize(&shared);

        let build_id = self.build_id;
        self.build_id += 1;

        let issues = shared.take_issues();
        for issue in &issues {
            error!(material = %self.name, block = %issue.block, "{}", issue.message);
        }
        if shared.verbose {
            info!(material = %self.name, "vertex shader:\n{}", vertex_state.source());
            info!(material = %self.name, "fragment shader:\n{}", fragment_state.source());
        }

        self.vertex_state = Some(vertex_state);
        self.fragment_state = Some(fragment_state);
        self.shared = Some(shared);
        self.build_was_successful = issues.is_empty();

        if self.build_was_successful {
            debug!(material = %self.name, build_id, "build finished");
            self.build_subscribers
                .retain(|subscriber| subscriber.send(BuildNotification { build_id }).is_ok());
        }

        Ok(BuildReport { build_id, issues })
    }

    fn initialize_block(
        &mut self,
        id: BlockId,
        stage: Stage,
        shared: &mut SharedData,
        other_stage_roots: &mut Vec<BlockId>,
        prepared: &mut HashSet<BlockId>,
    ) -> Result<()> {
        if !prepared.insert(id) {
            return Ok(());
        }

        {
            let block = self.graph.block_mut(id);
            blocks::initialize_scratch(block);
            for point in &mut block.inputs {
                point.associated_variable.clear();
            }
            for point in &mut block.outputs {
                point.associated_variable.clear();
            }
        }
        blocks::auto_configure(&mut self.graph, id);

        if self.graph.block(id).is_unique() {
            let class = self.graph.block(id).class();
            for other in &self.attached_blocks {
                if self.graph.block(*other).class() == class {
                    bail!(
                        "could not attach block '{}': the material already uses a block of class {class}",
                        self.graph.block(id).name
                    );
                }
            }
        }
        self.attached_blocks.push(id);
        blocks::classify(shared, self.graph.block(id), id);

        let upstream: Vec<BlockId> = self
            .graph
            .block(id)
            .inputs
            .iter()
            .filter_map(|point| point.connected_to)
            .map(|link| link.block)
            .filter(|owner| *owner != id)
            .collect();
        for owner in upstream {
            if !prepared.contains(&owner) {
                let target = self.graph.block(owner).target();
                if target == BlockTarget::VertexAndFragment
                    || (stage == Stage::Fragment && target == BlockTarget::Vertex)
                {
                    other_stage_roots.push(owner);
                }
            }
            self.initialize_block(owner, stage, shared, other_stage_roots, prepared)?;
        }
        Ok(())
    }

    /// Both compiled shader sources, once a build has completed.
    pub fn compiled_shaders(&self) -> Option<String> {
        let vertex = self.vertex_state.as_ref()?;
        let fragment = self.fragment_state.as_ref()?;
        Some(format!(
            "// Vertex shader\r\n{}\r\n\r\n// Fragment shader\r\n{}",
            vertex.source(),
            fragment.source()
        ))
    }

    pub fn vertex_source(&self) -> Option<&str> {
        self.vertex_state.as_ref().map(|state| state.source())
    }

    pub fn fragment_source(&self) -> Option<&str> {
        self.fragment_state.as_ref().map(|state| state.source())
    }

    /// Rust source that rebuilds the current graph through the public API.
    pub fn generate_code(&self) -> String {
        code_dump::generate_code(self)
    }

    // ---- readiness ---------------------------------------------------------

    /// Check (and when needed, refresh) the effect for one submesh.
    ///
    /// Returns true once an up-to-date effect exists and reports ready.
    pub fn is_ready_for_sub_mesh(
        &mut self,
        mesh: &MeshInfo,
        submesh: &mut SubMeshState,
        frame: &FrameContext,
        engine: &mut dyn EffectEngine,
        use_instances: bool,
    ) -> bool {
        if !self.build_was_successful {
            return false;
        }

        // Animated inputs advance once per frame, not once per submesh.
        if let Some(shared) = &self.shared
            && !shared.animated_inputs.is_empty()
            && self.animation_frame != Some(frame.frame_id)
        {
            let animated = shared.animated_inputs.clone();
            for id in animated {
                input::animate(self.graph.block_mut(id), frame.delta_seconds);
            }
            self.animation_frame = Some(frame.frame_id);
        }

        if self.frozen && submesh.effect().is_some() && submesh.was_previously_ready() {
            return true;
        }

        // A rebuild invalidates any defines prepared against the old program.
        let mut defines = submesh
            .take_defines()
            .filter(|d| d.material_build_id() == self.build_id)
            .unwrap_or_else(|| MaterialDefines::new(self.build_id));

        let ready = self.update_submesh_effect(mesh, submesh, engine, use_instances, &mut defines);
        if ready {
            defines.set_render_id(frame.render_id);
            submesh.set_was_previously_ready(true);
        }
        submesh.store_defines(defines);
        ready
    }

    fn update_submesh_effect(
        &mut self,
        mesh: &MeshInfo,
        submesh: &mut SubMeshState,
        engine: &mut dyn EffectEngine,
        use_instances: bool,
        defines: &mut MaterialDefines,
    ) -> bool {
        let ctx = blocks::DefineContext {
            max_simultaneous_lights: self.options.max_simultaneous_lights,
            use_instances,
        };
        let Self {
            name,
            graph,
            vertex_state,
            fragment_state,
            shared,
            options,
            build_id,
            ..
        } = self;
        let (Some(vertex_state), Some(fragment_state), Some(shared)) = (
            vertex_state.as_mut(),
            fragment_state.as_mut(),
            shared.as_ref(),
        ) else {
            return false;
        };

        defines.set_bool("NORMAL", mesh.has_normals);
        defines.set_bool("TANGENT", mesh.has_tangents);
        defines.set_bool("UV1", mesh.has_uvs);
        defines.set_bool("INSTANCES", use_instances);
        defines.set_int("NUM_MORPH_INFLUENCERS", mesh.morph_target_count);

        for id in &shared.blocking_blocks {
            if !blocks::is_ready(graph.block(*id), mesh, use_instances) {
                return false;
            }
        }

        for id in &shared.blocks_with_defines {
            blocks::initialize_defines(graph.block(*id), mesh, defines, ctx);
        }
        for id in &shared.blocks_with_defines {
            blocks::prepare_defines(graph.block(*id), mesh, defines, ctx);
        }

        if defines.is_dirty() {
            defines.mark_as_processed();

            vertex_state.restore_built_snapshot();
            fragment_state.restore_built_snapshot();
            for id in &shared.repeatable_content_blocks {
                blocks::replace_repeatable_content(
                    graph.block(*id),
                    vertex_state,
                    fragment_state,
                    defines,
                    ctx,
                );
            }

            let mut uniform_buffers = Vec::new();
            for id in &shared.dynamic_uniform_blocks {
                blocks::update_uniforms_and_samplers(
                    graph.block(*id),
                    vertex_state,
                    defines,
                    &mut uniform_buffers,
                    ctx,
                );
            }

            // Merged resource lists, vertex first, duplicates dropped.
            let mut uniforms = vertex_state.uniforms().to_vec();
            for uniform in fragment_state.uniforms() {
                if !uniforms.contains(uniform) {
                    uniforms.push(uniform.clone());
                }
            }
            let mut samplers = vertex_state.samplers().to_vec();
            for sampler in fragment_state.samplers() {
                if !samplers.contains(sampler) {
                    samplers.push(sampler.clone());
                }
            }

            let mut fallbacks = EffectFallbacks::new();
            for id in &shared.blocks_with_fallbacks {
                blocks::provide_fallbacks(graph.block(*id), &mut fallbacks, defines, ctx);
            }

            let sources = ShaderSources {
                name: format!("nodeMaterial{build_id}"),
                vertex: vertex_state.source().to_string(),
                fragment: fragment_state.source().to_string(),
            };
            let effect = engine.create_effect(
                sources,
                EffectCreationOptions {
                    attributes: vertex_state.attributes().to_vec(),
                    uniforms,
                    uniform_buffers,
                    samplers,
                    defines: defines.to_define_string(),
                    fallbacks,
                    max_simultaneous_lights: options.max_simultaneous_lights,
                    morph_target_count: defines.int_value("NUM_MORPH_INFLUENCERS"),
                },
            );

            if options.allow_shader_hot_swapping && !effect.is_ready() && submesh.effect().is_some()
            {
                // Keep drawing with the old program; retry on the next check.
                debug!(material = %name, "replacement effect still compiling, keeping the previous one");
                defines.mark_as_unprocessed();
            } else {
                submesh.set_effect(effect);
            }
        }

        matches!(submesh.effect(), Some(effect) if effect.is_ready())
    }

    // ---- binding -----------------------------------------------------------

    /// Upload only the world-derived matrices for one submesh.
    pub fn bind_only_world_matrix(
        &mut self,
        world: &Matrix4<f32>,
        submesh: &SubMeshState,
        scene: &SceneBindings,
    ) {
        let Some(effect) = submesh.effect() else {
            return;
        };
        let Some(shared) = &self.shared else {
            return;
        };

        if shared.hints.need_world_view_matrix {
            self.cached_world_view = scene.view * world;
        }
        if shared.hints.need_world_view_projection_matrix {
            self.cached_world_view_projection = scene.view_projection * world;
        }
        for id in &shared.input_blocks {
            input::transmit_world(
                self.graph.block(*id),
                effect.as_ref(),
                world,
                &self.cached_world_view,
                &self.cached_world_view_projection,
            );
        }
    }

    /// Upload per-draw values for one submesh.
    pub fn bind_for_sub_mesh(
        &mut self,
        world: &Matrix4<f32>,
        mesh: &MeshInfo,
        submesh: &SubMeshState,
        scene: &mut SceneBindings,
    ) {
        self.bind_only_world_matrix(world, submesh, scene);
        let Some(effect) = submesh.effect() else {
            return;
        };
        let Some(shared) = &self.shared else {
            return;
        };

        let must_rebind = scene
            .cached_effect
            .as_ref()
            .is_none_or(|cached| !same_effect(cached, effect))
            || mesh.visibility < 1.0;
        if must_rebind {
            for id in &shared.bindable_blocks {
                blocks::bind(self.graph.block(*id), effect.as_ref());
            }
            for id in &shared.input_blocks {
                input::transmit(self.graph.block(*id), effect.as_ref(), scene);
            }
        }
        scene.cached_effect = Some(effect.clone());
    }

    pub fn need_alpha_blending(&self) -> bool {
        if self.options.ignore_alpha {
            return false;
        }
        self.alpha < 1.0
            || self
                .shared
                .as_ref()
                .is_some_and(|shared| shared.hints.need_alpha_blending)
    }

    pub fn need_alpha_testing(&self) -> bool {
        self.shared
            .as_ref()
            .is_some_and(|shared| shared.hints.need_alpha_testing)
    }

    // ---- textures ----------------------------------------------------------

    /// Blocks that sample a texture, as discovered by the last build.
    pub fn get_texture_blocks(&self) -> Vec<BlockId> {
        self.shared
            .as_ref()
            .map(|shared| shared.texture_blocks.clone())
            .unwrap_or_default()
    }

    pub fn get_active_textures(&self) -> Vec<TextureRef> {
        self.get_texture_blocks()
            .into_iter()
            .filter_map(|id| match &self.graph.block(id).kind {
                BlockKind::Texture(data) => data.texture().cloned(),
                _ => None,
            })
            .collect()
    }

    pub fn has_texture(&self, texture: &TextureRef) -> bool {
        self.get_active_textures()
            .iter()
            .any(|active| std::rc::Rc::ptr_eq(active, texture))
    }
}
