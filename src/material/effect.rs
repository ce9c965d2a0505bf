//! Effect boundary: the compiled-program abstraction the material talks to.
//!
//! The compiler never touches a GPU. It hands shader sources and resource
//! lists to an [`EffectEngine`] and gets back an opaque [`Effect`] handle it
//! can poll for readiness and push uniform values into. A recording
//! implementation is provided for tests and headless use.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use nalgebra::{Matrix4, Vector2, Vector3, Vector4};

/// Where an effect stands in its (possibly asynchronous) compile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompilationStatus {
    Pending,
    Ready,
    Failed,
}

/// A compiled shader program plus its uniform upload surface.
///
/// Setters take `&self`; implementations queue uploads internally.
pub trait Effect {
    fn compilation_status(&self) -> CompilationStatus;

    fn is_ready(&self) -> bool {
        self.compilation_status() == CompilationStatus::Ready
    }

    fn set_float(&self, name: &str, value: f32);
    fn set_int(&self, name: &str, value: i32);
    fn set_vector2(&self, name: &str, value: &Vector2<f32>);
    fn set_vector3(&self, name: &str, value: &Vector3<f32>);
    fn set_vector4(&self, name: &str, value: &Vector4<f32>);
    fn set_matrix(&self, name: &str, value: &Matrix4<f32>);
    fn set_texture(&self, name: &str, texture: &TextureRef);
}

pub type EffectHandle = Rc<dyn Effect>;

/// Identity comparison for effect handles.
pub fn same_effect(a: &EffectHandle, b: &EffectHandle) -> bool {
    Rc::ptr_eq(a, b)
}

/// Ranked defines an engine may strip when a program fails to compile or
/// link, most expendable rank first.
#[derive(Clone, Debug, Default)]
pub struct EffectFallbacks {
    ranks: Vec<(u32, String)>,
}

impl EffectFallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_fallback(&mut self, rank: u32, define: &str) {
        self.ranks.push((rank, define.to_string()));
    }

    pub fn ranks(&self) -> &[(u32, String)] {
        &self.ranks
    }
}

/// The two stage sources of one program, plus a base name for caching.
#[derive(Clone, Debug)]
pub struct ShaderSources {
    pub name: String,
    pub vertex: String,
    pub fragment: String,
}

/// Everything the engine needs besides the sources.
#[derive(Clone, Debug, Default)]
pub struct EffectCreationOptions {
    pub attributes: Vec<String>,
    pub uniforms: Vec<String>,
    pub uniform_buffers: Vec<String>,
    pub samplers: Vec<String>,
    pub defines: String,
    pub fallbacks: EffectFallbacks,
    pub max_simultaneous_lights: u32,
    pub morph_target_count: i32,
}

/// Factory for effects; the engine owns caching and actual compilation.
pub trait EffectEngine {
    fn create_effect(
        &mut self,
        sources: ShaderSources,
        options: EffectCreationOptions,
    ) -> EffectHandle;
}

/// A texture resource as seen from the compiler: a name and a loaded flag.
#[derive(Debug)]
pub struct TextureInfo {
    name: String,
    ready: Cell<bool>,
}

pub type TextureRef = Rc<TextureInfo>;

impl TextureInfo {
    pub fn new(name: impl Into<String>) -> TextureRef {
        Rc::new(Self {
            name: name.into(),
            ready: Cell::new(true),
        })
    }

    pub fn loading(name: impl Into<String>) -> TextureRef {
        Rc::new(Self {
            name: name.into(),
            ready: Cell::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_ready(&self) -> bool {
        self.ready.get()
    }

    pub fn mark_ready(&self) {
        self.ready.set(true);
    }
}

/// One recorded uniform upload, as `name = rendered value`.
fn upload(name: &str, value: impl std::fmt::Display) -> String {
    format!("{name} = {value}")
}

/// [`Effect`] that records every upload instead of talking to a GPU.
#[derive(Debug)]
pub struct RecordedEffect {
    pub sources: ShaderSources,
    pub options: EffectCreationOptions,
    status: Cell<CompilationStatus>,
    uploads: RefCell<Vec<String>>,
}

impl RecordedEffect {
    pub fn set_status(&self, status: CompilationStatus) {
        self.status.set(status);
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.borrow().clone()
    }

    fn record(&self, entry: String) {
        self.uploads.borrow_mut().push(entry);
    }
}

impl Effect for RecordedEffect {
    fn compilation_status(&self) -> CompilationStatus {
        self.status.get()
    }

    fn set_float(&self, name: &str, value: f32) {
        self.record(upload(name, value));
    }

    fn set_int(&self, name: &str, value: i32) {
        self.record(upload(name, value));
    }

    fn set_vector2(&self, name: &str, value: &Vector2<f32>) {
        self.record(upload(name, format!("vec2({}, {})", value.x, value.y)));
    }

    fn set_vector3(&self, name: &str, value: &Vector3<f32>) {
        self.record(upload(
            name,
            format!("vec3({}, {}, {})", value.x, value.y, value.z),
        ));
    }

    fn set_vector4(&self, name: &str, value: &Vector4<f32>) {
        self.record(upload(
            name,
            format!("vec4({}, {}, {}, {})", value.x, value.y, value.z, value.w),
        ));
    }

    fn set_matrix(&self, name: &str, _value: &Matrix4<f32>) {
        self.record(upload(name, "mat4"));
    }

    fn set_texture(&self, name: &str, texture: &TextureRef) {
        self.record(upload(name, texture.name()));
    }
}

/// [`EffectEngine`] that keeps every created effect around for inspection.
#[derive(Default)]
pub struct RecordingEngine {
    pub created: Vec<Rc<RecordedEffect>>,
    /// Status stamped on new effects; `Ready` models a synchronous compile.
    pub initial_status: Option<CompilationStatus>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self {
            created: Vec::new(),
            initial_status: Some(CompilationStatus::Ready),
        }
    }

    /// Engine whose effects stay pending until marked, like an async
    /// parallel-compile pipeline.
    pub fn pending() -> Self {
        Self {
            created: Vec::new(),
            initial_status: Some(CompilationStatus::Pending),
        }
    }

    pub fn last(&self) -> Option<&Rc<RecordedEffect>> {
        self.created.last()
    }
}

impl EffectEngine for RecordingEngine {
    fn create_effect(
        &mut self,
        sources: ShaderSources,
        options: EffectCreationOptions,
    ) -> EffectHandle {
        let effect = Rc::new(RecordedEffect {
            sources,
            options,
            status: Cell::new(self.initial_status.unwrap_or(CompilationStatus::Ready)),
            uploads: RefCell::new(Vec::new()),
        });
        self.created.push(effect.clone());
        effect
    }
}
