#[derive(Clone, Debug, PartialEq)]
pub struct PerspectiveCamera {
    pub z_near: f32,
    /// `None` means an infinite far plane.
    pub z_far: Option<f32>,
    /// In radians.
    pub vertical_fov: f32,
    /// `None` means the aspect ratio of the viewport.
    pub aspect_ratio: Option<f32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrthographicCamera {
    pub z_near: f32,
    pub z_far: f32,
    pub x_mag: f32,
    pub y_mag: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CameraProjection {
    Perspective(PerspectiveCamera),
    Orthographic(OrthographicCamera),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SceneCamera {
    pub name: String,
    pub projection: CameraProjection,
}

impl From<gltf::Camera<'_>> for SceneCamera {
    fn from(camera: gltf::Camera<'_>) -> Self {
        let projection = match camera.projection() {
            gltf::camera::Projection::Perspective(perspective) => {
                CameraProjection::Perspective(PerspectiveCamera {
                    z_near: perspective.znear(),
                    z_far: perspective.zfar(),
                    vertical_fov: perspective.yfov(),
                    aspect_ratio: perspective.aspect_ratio(),
                })
            }
            gltf::camera::Projection::Orthographic(orthographic) => {
                CameraProjection::Orthographic(OrthographicCamera {
                    z_near: orthographic.znear(),
                    z_far: orthographic.zfar(),
                    x_mag: orthographic.xmag(),
                    y_mag: orthographic.ymag(),
                })
            }
        };

        Self {
            name: camera.name().unwrap_or_default().to_string(),
            projection,
        }
    }
}
