use ultraviolet::Vec3;

#[derive(Clone, Debug, PartialEq)]
pub enum LightKind {
    Directional {
        irradiance: f32,
    },
    Point {
        intensity: f32,
        range: Option<f32>,
    },
    Spot {
        intensity: f32,
        range: Option<f32>,
        /// Degrees
        inner_angle: f32,
        /// Degrees
        outer_angle: f32,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct SceneLight {
    pub name: String,
    pub color: Vec3,
    pub kind: LightKind,
}

impl From<gltf::khr_lights_punctual::Light<'_>> for SceneLight {
    fn from(light: gltf::khr_lights_punctual::Light<'_>) -> Self {
        use gltf::khr_lights_punctual::Kind;

        let kind = match light.kind() {
            Kind::Directional => LightKind::Directional {
                irradiance: light.intensity(),
            },
            Kind::Point => LightKind::Point {
                intensity: light.intensity(),
                range: light.range(),
            },
            Kind::Spot {
                inner_cone_angle,
                outer_cone_angle,
            } => LightKind::Spot {
                intensity: light.intensity(),
                range: light.range(),
                inner_angle: inner_cone_angle.to_degrees(),
                outer_angle: outer_cone_angle.to_degrees(),
            },
        };

        Self {
            name: light.name().unwrap_or_default().to_string(),
            color: Vec3::from(light.color()),
            kind,
        }
    }
}
