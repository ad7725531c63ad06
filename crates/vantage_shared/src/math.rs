//! Ray and viewport math shared by picking and the render devices.

use glam::{Mat4, Vec3, Vec4};

/// Sentinel written to position/normal outputs when a pick misses.
pub const NAN_VEC3: Vec3 = Vec3::NAN;

/// A world-space ray.
///
/// The default ray has a zero origin and a zero direction; picking returns it
/// when unprojection fails.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Ray {
    /// Ray origin.
    pub origin: Vec3,
    /// Normalized direction, or zero for a degenerate ray.
    pub direction: Vec3,
}

impl Ray {
    /// Creates a ray, normalizing the direction.
    #[must_use]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// Returns true if the ray has no usable direction.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.direction == Vec3::ZERO
    }

    /// Point at parameter `t` along the ray.
    #[must_use]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// A viewport rectangle in window coordinates (bottom-left origin).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Viewport {
    /// Left edge.
    pub x: f32,
    /// Bottom edge.
    pub y: f32,
    /// Width in pixels.
    pub width: f32,
    /// Height in pixels.
    pub height: f32,
}

impl Viewport {
    /// Viewport covering a surface of the given size.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
        }
    }
}

/// Maps a window coordinate back into world space.
///
/// `window.z` is the depth in `[0, 1]` (0 = near plane, 1 = far plane).
/// Returns `None` if the combined matrix is singular, the viewport is empty,
/// or the homogeneous result lands at infinity.
#[must_use]
pub fn unproject(window: Vec3, view: &Mat4, projection: &Mat4, viewport: Viewport) -> Option<Vec3> {
    if viewport.width <= 0.0 || viewport.height <= 0.0 {
        return None;
    }

    let combined = *projection * *view;
    let det = combined.determinant();
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    let inverse = combined.inverse();

    let ndc = Vec4::new(
        (window.x - viewport.x) / viewport.width * 2.0 - 1.0,
        (window.y - viewport.y) / viewport.height * 2.0 - 1.0,
        window.z * 2.0 - 1.0,
        1.0,
    );
    let out = inverse * ndc;
    if out.w == 0.0 {
        return None;
    }
    Some(out.truncate() / out.w)
}
