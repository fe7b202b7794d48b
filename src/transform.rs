use ultraviolet::{Mat4, Rotor3, Vec3};

/// Local transform of a scene node, applied as scale, then rotation, then translation.
#[derive(Clone, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub orientation: Rotor3,
    pub scale: Vec3,
}

impl Transform {
    /// Takes the glTF layout, rotation is a quaternion in xyzw order.
    pub fn from_gltf_trs(translation: [f32; 3], rotation: [f32; 4], scale: [f32; 3]) -> Self {
        Self {
            position: translation.into(),
            orientation: Rotor3::from_quaternion_array(rotation).normalized(),
            scale: scale.into(),
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_translation(self.position)
            * self.orientation.into_matrix().into_homogeneous()
            * Mat4::from_nonuniform_scale(self.scale)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zero(),
            orientation: Rotor3::identity(),
            scale: Vec3::one(),
        }
    }
}

/// Matrices are decomposed into translation, rotation and scale. Shear is lost.
impl From<gltf::scene::Transform> for Transform {
    fn from(transform: gltf::scene::Transform) -> Self {
        let (translation, rotation, scale) = transform.decomposed();
        Self::from_gltf_trs(translation, rotation, scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ultraviolet::Vec4;

    fn assert_close(a: Vec3, b: Vec3) {
        assert!((a - b).mag() < 1e-4, "{:?} != {:?}", a, b);
    }

    #[test]
    fn matrix_is_decomposed() {
        // Column major: scale (2, 3, 4), 90 degrees around z, translation (1, 2, 3)
        let matrix = gltf::scene::Transform::Matrix {
            matrix: [
                [0.0, 2.0, 0.0, 0.0],
                [-3.0, 0.0, 0.0, 0.0],
                [0.0, 0.0, 4.0, 0.0],
                [1.0, 2.0, 3.0, 1.0],
            ],
        };
        let transform = Transform::from(matrix);

        assert_close(transform.position, Vec3::new(1.0, 2.0, 3.0));
        assert_close(transform.scale, Vec3::new(2.0, 3.0, 4.0));
        assert_close(transform.orientation * Vec3::unit_x(), Vec3::unit_y());
    }

    #[test]
    fn matrix_scales_before_rotating() {
        let quarter_turn_z = [0.0, 0.0, std::f32::consts::FRAC_1_SQRT_2, std::f32::consts::FRAC_1_SQRT_2];
        let transform = Transform::from_gltf_trs([1.0, 0.0, 0.0], quarter_turn_z, [2.0, 1.0, 1.0]);

        let point = transform.to_matrix() * Vec4::new(1.0, 0.0, 0.0, 1.0);
        assert_close(point.xyz(), Vec3::new(1.0, 2.0, 0.0));
    }
}
