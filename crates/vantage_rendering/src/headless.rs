//! # Headless Device
//!
//! A CPU-only [`RenderDevice`] for tests and offline tools. Objects are
//! axis-aligned boxes with a screen footprint; the id pass rasterizes the
//! footprints and world queries intersect the boxes analytically.
//!
//! Every pass is appended to a log so callers can assert on pass order.

use std::any::Any;
use std::collections::BTreeMap;

use glam::{Mat4, Vec3};
use vantage_shared::{unproject, NodeId, Ray, Viewport};

use crate::device::{
    DrawStats, PickPixel, RenderDevice, RenderError, RenderTarget, ShaderPass,
};

/// A screen rectangle in device pixels (bottom-left origin, half-open).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScreenRect {
    /// Left edge.
    pub x0: f32,
    /// Bottom edge.
    pub y0: f32,
    /// Right edge (exclusive).
    pub x1: f32,
    /// Top edge (exclusive).
    pub y1: f32,
}

impl ScreenRect {
    /// Creates a rectangle.
    #[must_use]
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Returns true if the pixel center lies inside.
    #[must_use]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

/// A box-shaped scene object.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessObject {
    /// Scene node the object belongs to.
    pub node: NodeId,
    /// Footprint written by the id pass.
    pub footprint: ScreenRect,
    /// Box center.
    pub center: Vec3,
    /// Box half extents.
    pub half_extents: Vec3,
    /// Triangles reported by the main pass.
    pub triangles: f64,
}

impl HeadlessObject {
    /// Unit box at the origin with no footprint.
    #[must_use]
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            footprint: ScreenRect::default(),
            center: Vec3::ZERO,
            half_extents: Vec3::splat(0.5),
            triangles: 12.0,
        }
    }

    /// Sets the id-pass footprint.
    #[must_use]
    pub fn with_footprint(mut self, footprint: ScreenRect) -> Self {
        self.footprint = footprint;
        self
    }

    /// Sets the world-space box.
    #[must_use]
    pub fn with_bounds(mut self, center: Vec3, half_extents: Vec3) -> Self {
        self.center = center;
        self.half_extents = half_extents;
        self
    }

    /// Sets the triangle count.
    #[must_use]
    pub fn with_triangles(mut self, triangles: f64) -> Self {
        self.triangles = triangles;
        self
    }

    /// Slab-method intersection. Returns the entry distance and face normal.
    #[must_use]
    pub fn intersect(&self, ray: &Ray) -> Option<(f32, Vec3)> {
        if ray.is_degenerate() {
            return None;
        }
        let inv = ray.direction.recip();
        let min = self.center - self.half_extents;
        let max = self.center + self.half_extents;

        let t1 = (min - ray.origin) * inv;
        let t2 = (max - ray.origin) * inv;
        let near = t1.min(t2);
        let far = t1.max(t2);

        let t_min = near.max_element();
        let t_max = far.min_element();
        if t_max < 0.0 || t_min > t_max {
            return None;
        }

        // The entry face is on the axis with the largest near distance.
        let axis = if near.x >= near.y && near.x >= near.z {
            0
        } else if near.y >= near.z {
            1
        } else {
            2
        };
        let mut normal = Vec3::ZERO;
        normal[axis] = -ray.direction[axis].signum();
        Some((t_min.max(0.0), normal))
    }
}

/// One entry of the pass log.
#[derive(Debug, Clone, PartialEq)]
pub enum PassRecord {
    /// Main pass.
    Scene(RenderTarget),
    /// Id pass.
    Id,
    /// Post-process pass.
    Shader(ShaderPass),
    /// Render texture allocation.
    Texture {
        /// Texture key.
        key: String,
        /// Width.
        width: u32,
        /// Height.
        height: u32,
    },
}

/// CPU-only render device.
pub struct HeadlessDevice {
    width: u32,
    height: u32,
    objects: Vec<HeadlessObject>,
    id_buffer: Vec<PickPixel>,
    eye: Vec3,
    view: Mat4,
    projection: Mat4,
    active_view: Option<NodeId>,
    textures: BTreeMap<String, (u32, u32)>,
    passes: Vec<PassRecord>,
    fail_next_scene: Option<String>,
    fail_next_id_pass: bool,
    failing_shader: Option<String>,
}

impl HeadlessDevice {
    /// Creates a device with a camera at `(0, 0, 5)` looking at the origin.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let eye = Vec3::new(0.0, 0.0, 5.0);
        let mut device = Self {
            width,
            height,
            objects: Vec::new(),
            id_buffer: Vec::new(),
            eye,
            view: Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Y),
            projection: Mat4::IDENTITY,
            active_view: None,
            textures: BTreeMap::new(),
            passes: Vec::new(),
            fail_next_scene: None,
            fail_next_id_pass: false,
            failing_shader: None,
        };
        device.update_projection();
        device
    }

    #[allow(clippy::cast_precision_loss)]
    fn update_projection(&mut self) {
        let aspect = if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        };
        self.projection = Mat4::perspective_rh_gl(45f32.to_radians(), aspect, 0.1, 100.0);
    }

    /// Adds an object.
    pub fn add_object(&mut self, object: HeadlessObject) {
        self.objects.push(object);
    }

    /// Removes every object.
    pub fn clear_objects(&mut self) {
        self.objects.clear();
    }

    /// Overrides the camera.
    pub fn set_camera(&mut self, eye: Vec3, view: Mat4, projection: Mat4) {
        self.eye = eye;
        self.view = view;
        self.projection = projection;
    }

    /// Makes the next main pass fail.
    pub fn fail_next_scene_pass(&mut self, reason: impl Into<String>) {
        self.fail_next_scene = Some(reason.into());
    }

    /// Makes the next id pass fail.
    pub fn fail_next_id_pass(&mut self) {
        self.fail_next_id_pass = true;
    }

    /// Makes every pass of the named shader fail.
    pub fn fail_shader(&mut self, shader: impl Into<String>) {
        self.failing_shader = Some(shader.into());
    }

    /// Pass log, oldest first.
    #[must_use]
    pub fn passes(&self) -> &[PassRecord] {
        &self.passes
    }

    /// Takes the pass log.
    pub fn take_passes(&mut self) -> Vec<PassRecord> {
        std::mem::take(&mut self.passes)
    }

    /// Number of id passes in the log.
    #[must_use]
    pub fn id_pass_count(&self) -> usize {
        self.passes.iter().filter(|p| matches!(p, PassRecord::Id)).count()
    }

    /// Active view node.
    #[must_use]
    pub const fn active_view(&self) -> Option<NodeId> {
        self.active_view
    }

    /// Allocated render textures.
    #[must_use]
    pub fn texture_size(&self, key: &str) -> Option<(u32, u32)> {
        self.textures.get(key).copied()
    }

    /// Raw id buffer bytes, row-major from the bottom row.
    #[must_use]
    pub fn id_buffer_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.id_buffer)
    }

    fn object(&self, node: NodeId) -> Option<&HeadlessObject> {
        self.objects.iter().find(|o| o.node == node)
    }

    fn pixel_ray(&self, x: f32, y: f32) -> Option<Ray> {
        let viewport = Viewport::from_size(self.width, self.height);
        let near = unproject(Vec3::new(x, y, 0.0), &self.view, &self.projection, viewport)?;
        let far = unproject(Vec3::new(x, y, 1.0), &self.view, &self.projection, viewport)?;
        Some(Ray::new(near, far - near))
    }

    fn hit_by_pixel(&self, x: f32, y: f32, object: NodeId) -> Option<(Vec3, Vec3)> {
        let ray = self.pixel_ray(x, y)?;
        let (t, normal) = self.object(object)?.intersect(&ray)?;
        Some((ray.at(t), normal))
    }

    fn hit_by_ray(&self, ray: &Ray, object: NodeId) -> Option<(Vec3, Vec3)> {
        let (t, normal) = self.object(object)?.intersect(ray)?;
        Some((ray.at(t), normal))
    }
}

impl RenderDevice for HeadlessDevice {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.id_buffer.clear();
        self.update_projection();
    }

    fn render_scene(&mut self, target: &RenderTarget) -> Result<DrawStats, RenderError> {
        if let Some(reason) = self.fail_next_scene.take() {
            return Err(RenderError::PassFailed { pass: "scene", reason });
        }
        self.passes.push(PassRecord::Scene(target.clone()));
        Ok(DrawStats {
            objects: u32::try_from(self.objects.len()).unwrap_or(u32::MAX),
            triangles: self.objects.iter().map(|o| o.triangles).sum(),
        })
    }

    #[allow(clippy::cast_precision_loss)]
    fn render_id_pass(&mut self) -> Result<(), RenderError> {
        if std::mem::take(&mut self.fail_next_id_pass) {
            return Err(RenderError::PassFailed {
                pass: "id",
                reason: "id buffer unavailable".into(),
            });
        }
        let (width, height) = (self.width as usize, self.height as usize);
        self.id_buffer.clear();
        self.id_buffer.resize(width * height, PickPixel::EMPTY);
        for object in &self.objects {
            let Some(pixel) = PickPixel::encode(object.node) else {
                continue;
            };
            for row in 0..height {
                for col in 0..width {
                    if object.footprint.contains(col as f32 + 0.5, row as f32 + 0.5) {
                        self.id_buffer[row * width + col] = pixel;
                    }
                }
            }
        }
        self.passes.push(PassRecord::Id);
        Ok(())
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn read_object_id(&self, x: f32, y: f32) -> Option<NodeId> {
        if !(x >= 0.0 && y >= 0.0) {
            return None;
        }
        let (col, row) = (x.floor() as usize, y.floor() as usize);
        let width = self.width as usize;
        if col >= width || row >= self.height as usize {
            return None;
        }
        self.id_buffer.get(row * width + col)?.decode()
    }

    fn world_position_at(&mut self, x: f32, y: f32, object: NodeId) -> Option<Vec3> {
        self.hit_by_pixel(x, y, object).map(|(position, _)| position)
    }

    fn world_normal_at(&mut self, x: f32, y: f32, object: NodeId) -> Option<Vec3> {
        self.hit_by_pixel(x, y, object).map(|(_, normal)| normal)
    }

    fn view_matrix(&self) -> Mat4 {
        self.view
    }

    fn projection_matrix(&self) -> Mat4 {
        self.projection
    }

    fn view_position(&self) -> Vec3 {
        self.eye
    }

    fn matrices_for_ray(&self, ray: &Ray) -> (Mat4, Mat4) {
        let up = if ray.direction.cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let view = Mat4::look_at_rh(ray.origin, ray.origin + ray.direction, up);
        let projection = Mat4::perspective_rh_gl(1f32.to_radians(), 1.0, 0.1, 1000.0);
        (view, projection)
    }

    fn object_by_ray(&mut self, ray: &Ray, _view: &Mat4, _projection: &Mat4) -> Option<NodeId> {
        self.objects
            .iter()
            .filter_map(|o| o.intersect(ray).map(|(t, _)| (t, o.node)))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, node)| node)
    }

    fn world_position_by_ray(&mut self, ray: &Ray, object: NodeId, _view: &Mat4, _projection: &Mat4) -> Option<Vec3> {
        self.hit_by_ray(ray, object).map(|(position, _)| position)
    }

    fn world_normal_by_ray(&mut self, ray: &Ray, object: NodeId, _view: &Mat4, _projection: &Mat4) -> Option<Vec3> {
        self.hit_by_ray(ray, object).map(|(_, normal)| normal)
    }

    fn create_render_texture(&mut self, key: &str, width: u32, height: u32) -> Result<(), RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::TextureAllocation {
                key: key.to_owned(),
                width,
                height,
            });
        }
        self.textures.insert(key.to_owned(), (width, height));
        self.passes.push(PassRecord::Texture {
            key: key.to_owned(),
            width,
            height,
        });
        Ok(())
    }

    fn render_shader_pass(&mut self, pass: &ShaderPass) -> Result<(), RenderError> {
        if self.failing_shader.as_deref() == Some(pass.shader.name()) {
            return Err(RenderError::ShaderPass {
                stage: pass.stage,
                reason: format!("shader {} failed", pass.shader.name()),
            });
        }
        self.passes.push(PassRecord::Shader(pass.clone()));
        Ok(())
    }

    fn set_active_view(&mut self, view: Option<NodeId>) {
        self.active_view = view;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
