//! Caller-owned render-side state the material reads and updates.

use nalgebra::{Matrix4, Vector3};

use crate::material::defines::MaterialDefines;
use crate::material::effect::EffectHandle;

/// Per-submesh cache of the compiled effect and its define set.
///
/// Owned by the caller; the material fills it during readiness checks and
/// consults it at bind time.
#[derive(Default)]
pub struct SubMeshState {
    effect: Option<EffectHandle>,
    defines: Option<MaterialDefines>,
    was_previously_ready: bool,
}

impl SubMeshState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn effect(&self) -> Option<&EffectHandle> {
        self.effect.as_ref()
    }

    pub(crate) fn set_effect(&mut self, effect: EffectHandle) {
        self.effect = Some(effect);
    }

    pub fn defines(&self) -> Option<&MaterialDefines> {
        self.defines.as_ref()
    }

    pub(crate) fn take_defines(&mut self) -> Option<MaterialDefines> {
        self.defines.take()
    }

    pub(crate) fn store_defines(&mut self, defines: MaterialDefines) {
        self.defines = Some(defines);
    }

    pub fn was_previously_ready(&self) -> bool {
        self.was_previously_ready
    }

    pub(crate) fn set_was_previously_ready(&mut self, value: bool) {
        self.was_previously_ready = value;
    }
}

/// Geometry facts the readiness check needs from the mesh.
#[derive(Clone, Copy, Debug)]
pub struct MeshInfo {
    pub has_normals: bool,
    pub has_tangents: bool,
    pub has_uvs: bool,
    pub num_lights: u32,
    pub morph_target_count: i32,
    pub visibility: f32,
}

impl Default for MeshInfo {
    fn default() -> Self {
        Self {
            has_normals: false,
            has_tangents: false,
            has_uvs: false,
            num_lights: 0,
            morph_target_count: 0,
            visibility: 1.0,
        }
    }
}

/// Frame counters driving animation and the per-frame ready stamp.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameContext {
    pub frame_id: u64,
    pub render_id: u64,
    pub delta_seconds: f32,
}

/// Camera matrices and the scene-level effect cache consulted at bind time.
pub struct SceneBindings {
    pub view: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    pub view_projection: Matrix4<f32>,
    pub camera_position: Vector3<f32>,
    pub(crate) cached_effect: Option<EffectHandle>,
}

impl Default for SceneBindings {
    fn default() -> Self {
        Self {
            view: Matrix4::identity(),
            projection: Matrix4::identity(),
            view_projection: Matrix4::identity(),
            camera_position: Vector3::zeros(),
            cached_effect: None,
        }
    }
}

impl SceneBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the effect cache so the next bind runs in full.
    pub fn reset_cached_effect(&mut self) {
        self.cached_effect = None;
    }
}
