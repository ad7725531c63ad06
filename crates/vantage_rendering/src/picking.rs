//! # Picking
//!
//! Answers "what is under this pixel / along this ray". Point picking reads
//! the id buffer, which is only re-rendered when [`FrameFlags`] says it is
//! stale. Pointer coordinates arrive with a top-left origin and are flipped
//! before the device sees them.

use glam::Vec3;
use vantage_shared::{unproject, NodeId, Ray, Viewport, NAN_VEC3};

use crate::device::RenderDevice;
use crate::scheduler::FrameFlags;

/// Which world-space outputs a pick should compute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PickQuery {
    /// Compute the hit position.
    pub position: bool,
    /// Compute the hit normal.
    pub normal: bool,
}

impl PickQuery {
    /// Object only.
    pub const OBJECT: Self = Self {
        position: false,
        normal: false,
    };

    /// Object, position and normal.
    pub const ALL: Self = Self {
        position: true,
        normal: true,
    };
}

/// Outcome of a point or ray pick.
///
/// Requested outputs are the NaN vector on a miss; outputs that were not
/// requested are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PickResult {
    /// Picked object.
    pub object: Option<NodeId>,
    /// World-space hit position.
    pub position: Option<Vec3>,
    /// World-space hit normal.
    pub normal: Option<Vec3>,
}

impl PickResult {
    fn miss(query: PickQuery) -> Self {
        Self {
            object: None,
            position: query.position.then_some(NAN_VEC3),
            normal: query.normal.then_some(NAN_VEC3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct NormalCache {
    x: u32,
    y: u32,
    generation: u64,
    normal: Option<Vec3>,
}

/// Per-surface picker.
#[derive(Debug, Clone)]
pub struct Picker {
    enabled: bool,
    current: Option<NodeId>,
    generation: u64,
    normal_cache: Option<NormalCache>,
}

impl Picker {
    /// Creates a picker.
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled,
            current: None,
            generation: 0,
            normal_cache: None,
        }
    }

    /// Enables or disables point picking.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Returns true if point picking is enabled.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Object recorded by the last [`Picker::render_pick`].
    #[must_use]
    pub const fn current(&self) -> Option<NodeId> {
        self.current
    }

    /// Number of id passes rendered through this picker.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Marks the id buffer stale.
    pub fn invalidate(flags: &mut FrameFlags) {
        flags.need_picking_draw = true;
    }

    /// Picks the object under a top-left-origin pixel.
    ///
    /// Re-renders the id pass first if it is stale. A failed id pass is
    /// logged, leaves the buffer marked stale and picks nothing.
    #[allow(clippy::cast_precision_loss)]
    pub fn render_pick<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        flags: &mut FrameFlags,
        x: f32,
        y: f32,
    ) -> Option<NodeId> {
        if !self.enabled {
            return None;
        }
        let (_, height) = device.size();
        let device_y = height as f32 - y;

        if flags.need_picking_draw {
            if let Err(err) = device.render_id_pass() {
                tracing::warn!(error = %err, "id pass failed, pick skipped");
                self.current = None;
                return None;
            }
            self.generation += 1;
            flags.need_picking_draw = false;
        }

        self.current = device.read_object_id(x, device_y);
        tracing::trace!(x, y, picked = ?self.current, "render pick");
        self.current
    }

    /// Builds a world-space ray through a top-left-origin pixel.
    ///
    /// Returns the degenerate ray if unprojection fails.
    #[allow(clippy::cast_precision_loss)]
    pub fn generate_ray<D: RenderDevice + ?Sized>(device: &D, x: f32, y: f32) -> Ray {
        let (width, height) = device.size();
        let view = device.view_matrix();
        let projection = device.projection_matrix();
        let viewport = Viewport::from_size(width, height);
        let device_y = height as f32 - y;

        let near = unproject(Vec3::new(x, device_y, 0.0), &view, &projection, viewport);
        let far = unproject(Vec3::new(x, device_y, 1.0), &view, &projection, viewport);
        match (near, far) {
            (Some(near), Some(far)) => Ray::new(device.view_position(), far - near),
            _ => {
                tracing::warn!(x, y, "could not unproject pointer, returning degenerate ray");
                Ray::default()
            }
        }
    }

    /// Picks at a pixel and optionally computes world position and normal.
    #[allow(clippy::cast_precision_loss)]
    pub fn element_by_point<D: RenderDevice + ?Sized>(
        &mut self,
        device: &mut D,
        flags: &mut FrameFlags,
        x: f32,
        y: f32,
        query: PickQuery,
    ) -> PickResult {
        let Some(object) = self.render_pick(device, flags, x, y) else {
            return PickResult::miss(query);
        };
        let (_, height) = device.size();
        let device_y = height as f32 - y;
        PickResult {
            object: Some(object),
            position: query
                .position
                .then(|| device.world_position_at(x, device_y, object).unwrap_or(NAN_VEC3)),
            normal: query
                .normal
                .then(|| device.world_normal_at(x, device_y, object).unwrap_or(NAN_VEC3)),
        }
    }

    /// Picks along a ray and optionally computes world position and normal.
    pub fn element_by_ray<D: RenderDevice + ?Sized>(device: &mut D, ray: &Ray, query: PickQuery) -> PickResult {
        let (view, projection) = device.matrices_for_ray(ray);
        let Some(object) = device.object_by_ray(ray, &view, &projection) else {
            return PickResult::miss(query);
        };
        PickResult {
            object: Some(object),
            position: query.position.then(|| {
                device
                    .world_position_by_ray(ray, object, &view, &projection)
                    .unwrap_or(NAN_VEC3)
            }),
            normal: query.normal.then(|| {
                device
                    .world_normal_by_ray(ray, object, &view, &projection)
                    .unwrap_or(NAN_VEC3)
            }),
        }
    }

    /// Normal of the current pick at a top-left-origin pixel.
    ///
    /// Cached until the pixel changes or the id buffer is re-rendered.
    #[allow(clippy::cast_precision_loss)]
    pub fn picked_normal<D: RenderDevice + ?Sized>(&mut self, device: &mut D, x: f32, y: f32) -> Option<Vec3> {
        let object = self.current?;
        if let Some(cache) = self.normal_cache {
            if cache.x == x.to_bits() && cache.y == y.to_bits() && cache.generation == self.generation {
                return cache.normal;
            }
        }
        let (_, height) = device.size();
        let normal = device.world_normal_at(x, height as f32 - y, object);
        self.normal_cache = Some(NormalCache {
            x: x.to_bits(),
            y: y.to_bits(),
            generation: self.generation,
            normal,
        });
        normal
    }
}

impl Default for Picker {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessDevice, HeadlessObject, ScreenRect};

    fn device_with_box() -> HeadlessDevice {
        let mut device = HeadlessDevice::new(100, 100);
        device.add_object(
            HeadlessObject::new(NodeId::new(7)).with_footprint(ScreenRect::new(40.0, 40.0, 60.0, 60.0)),
        );
        device
    }

    #[test]
    fn test_render_pick_flips_y_and_caches_id_pass() {
        let mut device = HeadlessDevice::new(10, 10);
        device.add_object(HeadlessObject::new(NodeId::new(2)).with_footprint(ScreenRect::new(0.0, 0.0, 10.0, 2.0)));
        let mut picker = Picker::default();
        let mut flags = FrameFlags::default();

        // Bottom rows in device space are the last rows on screen.
        assert_eq!(picker.render_pick(&mut device, &mut flags, 5.0, 9.5), Some(NodeId::new(2)));
        assert!(!flags.need_picking_draw);
        assert_eq!(picker.render_pick(&mut device, &mut flags, 5.0, 1.0), None);
        assert_eq!(device.id_pass_count(), 1);
        assert_eq!(picker.generation(), 1);
    }

    #[test]
    fn test_disabled_picker_touches_nothing() {
        let mut device = device_with_box();
        let mut picker = Picker::new(false);
        let mut flags = FrameFlags::default();
        assert_eq!(picker.render_pick(&mut device, &mut flags, 50.0, 50.0), None);
        assert_eq!(device.id_pass_count(), 0);
        assert!(flags.need_picking_draw);
    }

    #[test]
    fn test_failed_id_pass_stays_stale() {
        let mut device = device_with_box();
        let mut picker = Picker::default();
        let mut flags = FrameFlags::default();
        device.fail_next_id_pass();

        assert_eq!(picker.render_pick(&mut device, &mut flags, 50.0, 50.0), None);
        assert!(flags.need_picking_draw);
        assert_eq!(picker.render_pick(&mut device, &mut flags, 50.0, 50.0), Some(NodeId::new(7)));
    }

    #[test]
    fn test_empty_scene_yields_nan_outputs() {
        let mut device = HeadlessDevice::new(100, 100);
        let mut picker = Picker::default();
        let mut flags = FrameFlags::default();

        let by_point = picker.element_by_point(&mut device, &mut flags, 50.0, 50.0, PickQuery::ALL);
        assert!(by_point.object.is_none());
        assert!(by_point.position.unwrap().is_nan());
        assert!(by_point.normal.unwrap().is_nan());

        let ray = Picker::generate_ray(&device, 50.0, 50.0);
        let by_ray = Picker::element_by_ray(&mut device, &ray, PickQuery::ALL);
        assert!(by_ray.object.is_none());
        assert!(by_ray.position.unwrap().is_nan());
        assert!(by_ray.normal.unwrap().is_nan());

        let bare = Picker::element_by_ray(&mut device, &ray, PickQuery::OBJECT);
        assert!(bare.position.is_none() && bare.normal.is_none());
    }

    #[test]
    fn test_generate_ray_through_center() {
        let device = HeadlessDevice::new(100, 100);
        let ray = Picker::generate_ray(&device, 50.0, 50.0);
        assert_eq!(ray.origin, Vec3::new(0.0, 0.0, 5.0));
        assert!(ray.direction.abs_diff_eq(Vec3::NEG_Z, 1e-4));
    }

    #[test]
    fn test_generate_ray_degenerate_on_empty_viewport() {
        let device = HeadlessDevice::new(0, 0);
        assert!(Picker::generate_ray(&device, 1.0, 1.0).is_degenerate());
    }

    #[test]
    fn test_ray_pick_hits_box() {
        let mut device = device_with_box();
        let ray = Picker::generate_ray(&device, 50.0, 50.0);
        let result = Picker::element_by_ray(&mut device, &ray, PickQuery::ALL);
        assert_eq!(result.object, Some(NodeId::new(7)));
        assert!(result.position.unwrap().abs_diff_eq(Vec3::new(0.0, 0.0, 0.5), 1e-3));
        assert_eq!(result.normal, Some(Vec3::Z));
    }

    #[test]
    fn test_picked_normal_cached_per_generation() {
        let mut device = device_with_box();
        let mut picker = Picker::default();
        let mut flags = FrameFlags::default();

        assert_eq!(picker.picked_normal(&mut device, 50.0, 50.0), None);
        picker.render_pick(&mut device, &mut flags, 50.0, 50.0);
        assert_eq!(picker.picked_normal(&mut device, 50.0, 50.0), Some(Vec3::Z));

        device.clear_objects();
        assert_eq!(picker.picked_normal(&mut device, 50.0, 50.0), Some(Vec3::Z));

        Picker::invalidate(&mut flags);
        picker.render_pick(&mut device, &mut flags, 50.0, 50.0);
        assert_eq!(picker.current(), None);
        assert_eq!(picker.picked_normal(&mut device, 50.0, 50.0), None);
    }
}
