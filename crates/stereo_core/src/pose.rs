use glam::{Mat4, Quat, Vec3};

/// A tracked head pose: where the head is and which way it faces, in
/// tracking-origin space. Produced fresh each frame by the pose source and
/// never cached beyond the frame it was sampled for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyePose {
    pub orientation: Quat,
    pub position: Vec3,
}

impl Default for EyePose {
    fn default() -> Self {
        Self {
            orientation: Quat::IDENTITY,
            position: Vec3::ZERO,
        }
    }
}

impl EyePose {
    pub fn new(orientation: Quat, position: Vec3) -> Self {
        Self {
            orientation,
            position,
        }
    }

    /// The rigid transform taking head-local coordinates to tracking
    /// space: `translate(position) * rotate(orientation)`.
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position)
    }

    /// Inverse of [`to_matrix`](Self::to_matrix): moves the world into
    /// head space. This is the factor pre-multiplied onto the modelview
    /// for each eye.
    pub fn view_matrix(&self) -> Mat4 {
        self.to_matrix().inverse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::vec3;

    #[test]
    fn view_matrix_inverts_pose() {
        let pose = EyePose::new(
            Quat::from_rotation_y(0.7).normalize(),
            vec3(0.2, 1.6, -0.3),
        );
        let roundtrip = pose.to_matrix() * pose.view_matrix();
        assert!(roundtrip.abs_diff_eq(Mat4::IDENTITY, 1e-5));
    }

    #[test]
    fn identity_pose_is_identity_view() {
        assert!(EyePose::default()
            .view_matrix()
            .abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }
}
