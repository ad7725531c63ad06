//! # Render Device Boundary
//!
//! Everything the frame scheduler, picker and post-process chain need from
//! the graphics backend. Shader compilation, geometry upload and image
//! decoding stay behind this trait.
//!
//! Coordinates passed to the device use a bottom-left origin, the way the
//! backbuffer is addressed. The picker flips pointer coordinates before
//! calling in.

use std::any::Any;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use thiserror::Error;
use vantage_shared::{NodeId, Ray};

/// Errors raised by render passes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// A pass failed on the device.
    #[error("{pass} pass failed: {reason}")]
    PassFailed {
        /// Pass name (`scene`, `id`, ...).
        pass: &'static str,
        /// Backend message.
        reason: String,
    },

    /// The surface is gone (context lost, window closed).
    #[error("render surface lost")]
    SurfaceLost,

    /// A post-process stage failed.
    #[error("post-process stage {stage} failed: {reason}")]
    ShaderPass {
        /// Stage index.
        stage: usize,
        /// Backend message.
        reason: String,
    },

    /// A render texture could not be allocated.
    #[error("could not allocate render texture {key} ({width}x{height})")]
    TextureAllocation {
        /// Texture key.
        key: String,
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
}

/// Reference to a full-screen shader, by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderRef(pub String);

impl ShaderRef {
    /// Creates a shader reference.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Shader name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }
}

/// An offscreen color buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BufferSlot {
    /// The scene as rendered, before post-processing.
    Original,
    /// One of the two ping-pong buffers (0 or 1).
    PingPong(u8),
    /// A render-to-texture target.
    Texture(String),
}

/// Where a pass writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// The visible surface.
    Surface,
    /// An offscreen buffer.
    Buffer(BufferSlot),
}

/// One full-screen shader pass of a post-process chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderPass {
    /// Stage index within its chain.
    pub stage: usize,
    /// Shader to run.
    pub shader: ShaderRef,
    /// Primary input: the previous stage's output.
    pub input: BufferSlot,
    /// Secondary input: always the original scene render.
    pub original: BufferSlot,
    /// Output target.
    pub output: RenderTarget,
}

/// Counts reported by the main pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DrawStats {
    /// Objects drawn.
    pub objects: u32,
    /// Triangles drawn (may be fractional for instanced estimates).
    pub triangles: f64,
}

/// One texel of the id buffer.
///
/// Holds `object index + 1` as little-endian RGBA8 so an all-zero texel
/// means "nothing here".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct PickPixel {
    /// Encoded id.
    pub rgba: [u8; 4],
}

impl PickPixel {
    /// Empty texel.
    pub const EMPTY: Self = Self { rgba: [0; 4] };

    /// Encodes a node. Returns `None` if the id does not fit in 32 bits.
    #[must_use]
    pub fn encode(node: NodeId) -> Option<Self> {
        let value = u32::try_from(node.raw().checked_add(1)?).ok()?;
        Some(Self {
            rgba: bytemuck::cast(value.to_le()),
        })
    }

    /// Decodes the node, or `None` for an empty texel.
    #[must_use]
    pub fn decode(self) -> Option<NodeId> {
        let value = u32::from_le(bytemuck::cast(self.rgba));
        value.checked_sub(1).map(|raw| NodeId::new(u64::from(raw)))
    }
}

/// The graphics backend, as seen by the core.
pub trait RenderDevice {
    /// Backbuffer size in pixels.
    fn size(&self) -> (u32, u32);

    /// Resizes the backbuffer and every size-dependent buffer.
    fn resize(&mut self, width: u32, height: u32);

    /// Renders the scene into `target`.
    ///
    /// # Errors
    ///
    /// Returns the backend failure; the frame is lost.
    fn render_scene(&mut self, target: &RenderTarget) -> Result<DrawStats, RenderError>;

    /// Re-renders the object-id buffer.
    ///
    /// # Errors
    ///
    /// Returns the backend failure; the id buffer is left stale.
    fn render_id_pass(&mut self) -> Result<(), RenderError>;

    /// Samples the id buffer at a bottom-left-origin pixel.
    fn read_object_id(&self, x: f32, y: f32) -> Option<NodeId>;

    /// World-space position of `object` under a pixel.
    fn world_position_at(&mut self, x: f32, y: f32, object: NodeId) -> Option<Vec3>;

    /// World-space normal of `object` under a pixel.
    fn world_normal_at(&mut self, x: f32, y: f32, object: NodeId) -> Option<Vec3>;

    /// Current view matrix.
    fn view_matrix(&self) -> Mat4;

    /// Current projection matrix.
    fn projection_matrix(&self) -> Mat4;

    /// World-space eye position of the active view.
    fn view_position(&self) -> Vec3;

    /// View and projection matrices looking down `ray`.
    fn matrices_for_ray(&self, ray: &Ray) -> (Mat4, Mat4);

    /// Nearest object hit by `ray`.
    fn object_by_ray(&mut self, ray: &Ray, view: &Mat4, projection: &Mat4) -> Option<NodeId>;

    /// World-space hit position of `ray` on `object`.
    fn world_position_by_ray(
        &mut self,
        ray: &Ray,
        object: NodeId,
        view: &Mat4,
        projection: &Mat4,
    ) -> Option<Vec3>;

    /// World-space hit normal of `ray` on `object`.
    fn world_normal_by_ray(
        &mut self,
        ray: &Ray,
        object: NodeId,
        view: &Mat4,
        projection: &Mat4,
    ) -> Option<Vec3>;

    /// Allocates (or reallocates) a render-to-texture target.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::TextureAllocation`] if the backend refuses.
    fn create_render_texture(&mut self, key: &str, width: u32, height: u32) -> Result<(), RenderError>;

    /// Runs one full-screen shader pass.
    ///
    /// # Errors
    ///
    /// Returns the backend failure.
    fn render_shader_pass(&mut self, pass: &ShaderPass) -> Result<(), RenderError>;

    /// Selects the view node the scene is rendered from.
    fn set_active_view(&mut self, view: Option<NodeId>);

    /// Upcast for downcasting by embedders.
    fn as_any(&self) -> &dyn Any;

    /// Mutable upcast for downcasting by embedders.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
