//! Camera, viewport and the world-to-display transform.

use glam::{Mat4, Vec2, Vec3};
use isocomp_core::{IsocompError, Result};

/// Camera projection mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectionMode {
    /// Perspective projection.
    #[default]
    Perspective,
    /// Orthographic projection.
    Orthographic,
}

/// A 3D camera for viewing the scene.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// Camera position in world space.
    pub position: Vec3,
    /// Point the camera is looking at.
    pub target: Vec3,
    /// Up vector.
    pub up: Vec3,
    /// Field of view in radians.
    pub fov: f32,
    /// Aspect ratio (width / height).
    pub aspect_ratio: f32,
    /// Near clipping plane.
    pub near: f32,
    /// Far clipping plane.
    pub far: f32,
    /// Projection mode.
    pub projection_mode: ProjectionMode,
    /// Half height of the view volume when orthographic.
    pub ortho_scale: f32,
}

impl Camera {
    /// Creates a new camera with default settings.
    #[must_use]
    pub fn new(aspect_ratio: f32) -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 3.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov: std::f32::consts::FRAC_PI_4, // 45 degrees
            aspect_ratio,
            near: 0.01,
            far: 1000.0,
            projection_mode: ProjectionMode::Perspective,
            ortho_scale: 1.0,
        }
    }

    /// Creates an orthographic camera looking down -Z at `target` with the given half height.
    #[must_use]
    pub fn orthographic(target: Vec3, ortho_scale: f32, aspect_ratio: f32) -> Self {
        Self {
            position: target + Vec3::new(0.0, 0.0, 10.0),
            target,
            projection_mode: ProjectionMode::Orthographic,
            ortho_scale,
            ..Self::new(aspect_ratio)
        }
    }

    /// Sets the aspect ratio.
    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio;
    }

    /// Returns the view matrix.
    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Returns the projection matrix.
    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        match self.projection_mode {
            ProjectionMode::Perspective => {
                Mat4::perspective_rh(self.fov, self.aspect_ratio, self.near, self.far)
            }
            ProjectionMode::Orthographic => {
                let half_height = self.ortho_scale;
                let half_width = half_height * self.aspect_ratio;
                // Symmetric depth range so geometry behind the target is not clipped
                let dist = (self.position - self.target).length();
                let ortho_depth = (dist + self.far).max(self.ortho_scale * 100.0);
                Mat4::orthographic_rh(
                    -half_width,
                    half_width,
                    -half_height,
                    half_height,
                    -ortho_depth,
                    ortho_depth,
                )
            }
        }
    }

    /// Returns the combined view-projection matrix.
    #[must_use]
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Resets the camera to look at the given bounding box.
    pub fn look_at_box(&mut self, min: Vec3, max: Vec3) {
        let center = (min + max) * 0.5;
        let size = (max - min).length();
        let extents = max - min;

        self.target = center;
        self.position = center + Vec3::new(0.0, 0.0, size * 1.5);
        self.near = size * 0.001;
        self.far = size * 100.0;

        let half_height = extents.y.max(extents.x / self.aspect_ratio) * 0.6;
        self.ortho_scale = half_height.max(0.1);
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(16.0 / 9.0)
    }
}

/// Output image size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Width over height, 1.0 for a degenerate viewport.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn aspect_ratio(self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// What a redistribution call renders against.
///
/// Passed explicitly to every call; the camera is `None` until a renderer binds one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderContext {
    pub camera: Option<Camera>,
    pub viewport: Viewport,
}

impl RenderContext {
    /// Binds `camera` to `viewport`, matching the camera's aspect ratio to the viewport.
    #[must_use]
    pub fn new(mut camera: Camera, viewport: Viewport) -> Self {
        camera.set_aspect_ratio(viewport.aspect_ratio());
        Self {
            camera: Some(camera),
            viewport,
        }
    }

    /// Returns the world-to-display transform, or [`IsocompError::NoCamera`].
    pub fn display_transform(&self) -> Result<DisplayTransform> {
        let camera = self.camera.as_ref().ok_or(IsocompError::NoCamera)?;
        Ok(DisplayTransform::new(camera, self.viewport))
    }
}

/// Maps world points to display pixels, with `y = 0` at the bottom row.
#[derive(Debug, Clone, Copy)]
pub struct DisplayTransform {
    view_projection: Mat4,
    size: Vec2,
}

impl DisplayTransform {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn new(camera: &Camera, viewport: Viewport) -> Self {
        Self {
            view_projection: camera.view_projection_matrix(),
            size: Vec2::new(viewport.width as f32, viewport.height as f32),
        }
    }

    /// Projects `point` to display coordinates.
    ///
    /// Returns `None` when the homogeneous `w` is zero (or the result is not finite), so the
    /// point can be left out of bounding-box math.
    #[must_use]
    pub fn to_display(&self, point: Vec3) -> Option<Vec2> {
        let clip = self.view_projection * point.extend(1.0);
        if clip.w == 0.0 {
            return None;
        }
        let ndc = Vec2::new(clip.x, clip.y) / clip.w;
        let display = (ndc + Vec2::ONE) * 0.5 * self.size;
        display.is_finite().then_some(display)
    }
}
