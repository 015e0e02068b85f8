use crate::{projection::FovPort, ConfigError, Eye, DEFAULT_ZFAR, DEFAULT_ZNEAR};
use glam::{Mat4, UVec2, Vec3};

/// Everything needed to render one eye: the off-axis projection, the
/// half-IPD view offset in head space, and the render-target size after
/// the quality scale is applied.
///
/// Computed once when the HMD session is configured and recomputed when
/// the render scale changes; cached for the session lifetime otherwise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeRenderDescriptor {
    pub eye: Eye,
    pub fov: FovPort,
    /// Offset from head center to this eye's nodal point, head space.
    /// +X for the left eye, −X for the right (view-matrix translation
    /// convention).
    pub view_offset: Vec3,
    /// Target size in pixels, `ceil(recommended * render_scale)`.
    pub target_size: UVec2,
    pub projection: Mat4,
}

impl EyeRenderDescriptor {
    /// Validates the configuration and derives the per-eye parameters.
    ///
    /// `recommended_size` is the HMD's ideal pre-distortion resolution for
    /// this eye; `render_scale` in (0, 1] trades sharpness for fill-rate.
    pub fn compute(
        eye: Eye,
        fov: FovPort,
        recommended_size: UVec2,
        ipd: f32,
        render_scale: f32,
    ) -> Result<Self, ConfigError> {
        fov.validate()?;
        if !(0.0..=1.0).contains(&render_scale) || render_scale == 0.0 {
            return Err(ConfigError::InvalidRenderScale(render_scale));
        }
        if !ipd.is_finite() || ipd <= 0.0 {
            return Err(ConfigError::InvalidIpd(ipd));
        }
        if recommended_size.x == 0 || recommended_size.y == 0 {
            return Err(ConfigError::ZeroTargetSize(
                recommended_size.x,
                recommended_size.y,
            ));
        }

        let half_ipd = ipd * 0.5;
        let view_offset = match eye {
            Eye::Left => Vec3::X * half_ipd,
            Eye::Right => Vec3::X * -half_ipd,
        };

        let target_size = UVec2::new(
            (recommended_size.x as f32 * render_scale).ceil() as u32,
            (recommended_size.y as f32 * render_scale).ceil() as u32,
        );

        Ok(Self {
            eye,
            fov,
            view_offset,
            target_size,
            projection: fov.projection(DEFAULT_ZNEAR, DEFAULT_ZFAR),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOV: FovPort = FovPort {
        up_tan: 0.96,
        down_tan: 1.09,
        left_tan: 0.87,
        right_tan: 0.90,
    };

    #[test]
    fn view_offset_is_half_ipd_mirrored() {
        let size = UVec2::new(1182, 1461);
        let left = EyeRenderDescriptor::compute(Eye::Left, FOV, size, 0.064, 1.0).unwrap();
        let right = EyeRenderDescriptor::compute(Eye::Right, FOV, size, 0.064, 1.0).unwrap();
        assert_eq!(left.view_offset, Vec3::new(0.032, 0.0, 0.0));
        assert_eq!(right.view_offset, Vec3::new(-0.032, 0.0, 0.0));
    }

    #[test]
    fn target_size_scales_with_ceil() {
        let size = UVec2::new(1182, 1461);
        let d = EyeRenderDescriptor::compute(Eye::Left, FOV, size, 0.064, 0.7).unwrap();
        assert_eq!(d.target_size, UVec2::new(828, 1023));
        let full = EyeRenderDescriptor::compute(Eye::Left, FOV, size, 1.0, 1.0).unwrap();
        assert_eq!(full.target_size, size);
    }

    #[test]
    fn invalid_configuration_fails_fast() {
        let size = UVec2::new(1182, 1461);
        assert!(matches!(
            EyeRenderDescriptor::compute(Eye::Left, FOV, size, 0.064, 0.0),
            Err(ConfigError::InvalidRenderScale(_))
        ));
        assert!(matches!(
            EyeRenderDescriptor::compute(Eye::Left, FOV, size, 0.064, 1.5),
            Err(ConfigError::InvalidRenderScale(_))
        ));
        assert!(matches!(
            EyeRenderDescriptor::compute(Eye::Left, FOV, size, -0.06, 1.0),
            Err(ConfigError::InvalidIpd(_))
        ));
        assert!(matches!(
            EyeRenderDescriptor::compute(Eye::Left, FOV, UVec2::ZERO, 0.064, 1.0),
            Err(ConfigError::ZeroTargetSize(0, 0))
        ));
        let bad_fov = FovPort::new(0.0, 1.0, 1.0, 1.0);
        assert!(matches!(
            EyeRenderDescriptor::compute(Eye::Left, bad_fov, size, 0.064, 1.0),
            Err(ConfigError::DegenerateFov(_))
        ));
    }
}
