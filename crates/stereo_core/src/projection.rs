//! Off-axis perspective projection from four half-angle tangents.

use crate::ConfigError;
use glam::{Mat4, Vec4};

/// Near plane used for eye projections; close enough for hand-scale
/// geometry right in front of the face.
pub const DEFAULT_ZNEAR: f32 = 0.01;

/// Far plane; spans practical scene scale for room- to landscape-sized
/// content.
pub const DEFAULT_ZFAR: f32 = 100_000.0;

/// A field of view described by four half-angle tangents, one per frustum
/// edge. HMD optics are off-axis, so the four values are independent:
/// `up_tan` is generally not equal to `down_tan`, nor `left_tan` to
/// `right_tan`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FovPort {
    pub up_tan: f32,
    pub down_tan: f32,
    pub left_tan: f32,
    pub right_tan: f32,
}

impl FovPort {
    pub fn new(up_tan: f32, down_tan: f32, left_tan: f32, right_tan: f32) -> Self {
        Self {
            up_tan,
            down_tan,
            left_tan,
            right_tan,
        }
    }

    /// A symmetric FOV, handy for tests and non-HMD mirrors.
    pub fn symmetric(fov_y_rad: f32, aspect: f32) -> Self {
        let v = (fov_y_rad * 0.5).tan();
        let h = v * aspect;
        Self::new(v, v, h, h)
    }

    /// All four tangents must be finite and strictly positive; anything
    /// else is a configuration error reported before rendering starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tans = [self.up_tan, self.down_tan, self.left_tan, self.right_tan];
        if tans.iter().any(|t| !t.is_finite() || *t <= 0.0) {
            return Err(ConfigError::DegenerateFov(*self));
        }
        Ok(())
    }

    /// Builds the right-handed off-axis frustum for this port, GL-style
    /// clip space (z in [−1, 1]), looking down −Z.
    ///
    /// In row-major notation the non-zero entries are
    /// `m00 = 2/(l+r)`, `m02 = (r−l)/(r+l)`, `m11 = 2/(u+d)`,
    /// `m12 = (u−d)/(u+d)`, `m22 = −(f+n)/(f−n)`, `m23 = −2fn/(f−n)`,
    /// `m32 = −1`, which maps the four corner rays of the port onto the
    /// corners of NDC space.
    pub fn projection(&self, znear: f32, zfar: f32) -> Mat4 {
        let (u, d) = (self.up_tan, self.down_tan);
        let (l, r) = (self.left_tan, self.right_tan);
        let (n, f) = (znear, zfar);

        Mat4::from_cols(
            Vec4::new(2.0 / (l + r), 0.0, 0.0, 0.0),
            Vec4::new(0.0, 2.0 / (u + d), 0.0, 0.0),
            Vec4::new(
                (r - l) / (r + l),
                (u - d) / (u + d),
                -(f + n) / (f - n),
                -1.0,
            ),
            Vec4::new(0.0, 0.0, -2.0 * f * n / (f - n), 0.0),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    /// Projects an eye-space point and perspective-divides to NDC.
    fn project(m: Mat4, p: Vec3) -> Vec3 {
        let clip = m * p.extend(1.0);
        Vec3::new(clip.x / clip.w, clip.y / clip.w, clip.z / clip.w)
    }

    #[test]
    fn asymmetric_corners_map_to_ndc_corners() {
        // Deliberately lopsided port.
        let fov = FovPort::new(0.96, 1.09, 0.87, 0.90);
        let m = fov.projection(DEFAULT_ZNEAR, DEFAULT_ZFAR);

        // Corner rays evaluated on the z = -1 plane.
        let cases = [
            (Vec3::new(fov.right_tan, fov.up_tan, -1.0), (1.0, 1.0)),
            (Vec3::new(-fov.left_tan, fov.up_tan, -1.0), (-1.0, 1.0)),
            (Vec3::new(fov.right_tan, -fov.down_tan, -1.0), (1.0, -1.0)),
            (Vec3::new(-fov.left_tan, -fov.down_tan, -1.0), (-1.0, -1.0)),
        ];
        for (p, (x, y)) in cases {
            let ndc = project(m, p);
            assert!((ndc.x - x).abs() < 1e-4, "x: {} vs {}", ndc.x, x);
            assert!((ndc.y - y).abs() < 1e-4, "y: {} vs {}", ndc.y, y);
        }
    }

    #[test]
    fn depth_range_is_gl_style() {
        let fov = FovPort::symmetric(1.0, 1.2);
        let m = fov.projection(0.1, 100.0);
        let near = project(m, Vec3::new(0.0, 0.0, -0.1));
        let far = project(m, Vec3::new(0.0, 0.0, -100.0));
        assert!((near.z + 1.0).abs() < 1e-4);
        assert!((far.z - 1.0).abs() < 1e-3);
    }

    #[test]
    fn entries_match_off_axis_derivation() {
        // The scenario numbers from the device this was built against.
        let fov = FovPort::new(0.96, 1.09, 0.87, 0.90);
        let (n, f) = (DEFAULT_ZNEAR, DEFAULT_ZFAR);
        let m = fov.projection(n, f);
        // Column-major storage: m.z_axis.z is row 2 / col 2, m.w_axis.z is
        // row 2 / col 3.
        let expected_m22 = -(f + n) / (f - n);
        let expected_m23 = -2.0 * f * n / (f - n);
        assert!((m.z_axis.z - expected_m22).abs() < 1e-6);
        assert!((m.w_axis.z - expected_m23).abs() < 1e-6);
        assert_eq!(m.z_axis.w, -1.0);
    }

    #[test]
    fn degenerate_fov_is_rejected() {
        assert!(FovPort::new(0.0, 1.0, 1.0, 1.0).validate().is_err());
        assert!(FovPort::new(1.0, -0.5, 1.0, 1.0).validate().is_err());
        assert!(FovPort::new(1.0, 1.0, f32::NAN, 1.0).validate().is_err());
        assert!(FovPort::new(0.96, 1.09, 0.87, 0.90).validate().is_ok());
    }
}
