use std::sync::Arc;

use ultraviolet::{Lerp, Rotor3, Vec4};

use super::{NodeId, SceneGraph};

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Keyframe {
    pub time: f32,
    pub value: Vec4,
    pub in_tangent: Vec4,
    pub out_tangent: Vec4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum InterpolationMode {
    Step,
    #[default]
    Linear,
    /// Spherical interpolation of quaternions stored as xyzw.
    Slerp,
    /// Cubic Hermite spline using the in and out tangents of the keyframes.
    HermiteSpline,
}

/// A keyframe track. Values are always four wide, unused components are zero.
#[derive(Clone, Debug, Default)]
pub struct Sampler {
    mode: InterpolationMode,
    keyframes: Vec<Keyframe>,
}

impl Sampler {
    pub fn new(mode: InterpolationMode) -> Self {
        Self {
            mode,
            keyframes: Vec::new(),
        }
    }

    pub fn mode(&self) -> InterpolationMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: InterpolationMode) {
        self.mode = mode;
    }

    /// Keyframes are kept sorted by time.
    pub fn add_keyframe(&mut self, keyframe: Keyframe) {
        let index = self.keyframes.partition_point(|k| k.time <= keyframe.time);
        self.keyframes.insert(index, keyframe);
    }

    pub fn keyframes(&self) -> &[Keyframe] {
        &self.keyframes
    }

    pub fn start_time(&self) -> f32 {
        self.keyframes.first().map(|k| k.time).unwrap_or_default()
    }

    pub fn end_time(&self) -> f32 {
        self.keyframes.last().map(|k| k.time).unwrap_or_default()
    }

    /// Samples the track. Times outside of the keyframes clamp to the first or last value.
    pub fn evaluate(&self, time: f32) -> Option<Vec4> {
        let first = self.keyframes.first()?;
        let last = self.keyframes.last()?;
        if time <= first.time {
            return Some(first.value);
        }
        if time >= last.time {
            return Some(last.value);
        }

        let next_index = self.keyframes.partition_point(|k| k.time <= time);
        let current = &self.keyframes[next_index - 1];
        let next = &self.keyframes[next_index];

        let dt = (next.time - current.time).max(0.0001);
        let t = (time - current.time) / dt;

        let value = match self.mode {
            InterpolationMode::Step => current.value,
            InterpolationMode::Linear => current.value.lerp(next.value, t),
            InterpolationMode::Slerp => slerp(current.value, next.value, t),
            InterpolationMode::HermiteSpline => {
                let t2 = t * t;
                let t3 = t2 * t;
                let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
                let h10 = t3 - 2.0 * t2 + t;
                let h01 = -2.0 * t3 + 3.0 * t2;
                let h11 = t3 - t2;
                current.value * h00
                    + current.out_tangent * (h10 * dt)
                    + next.value * h01
                    + next.in_tangent * (h11 * dt)
            }
        };
        Some(value)
    }
}

fn slerp(from: Vec4, to: Vec4, t: f32) -> Vec4 {
    let mut to = to;
    let mut cos_theta = from.dot(to);
    if cos_theta < 0.0 {
        to = -to;
        cos_theta = -cos_theta;
    }

    if cos_theta > 0.9995 {
        return from.lerp(to, t).normalized();
    }

    let theta = cos_theta.acos();
    let sin_theta = theta.sin();
    let a = ((1.0 - t) * theta).sin() / sin_theta;
    let b = (t * theta).sin() / sin_theta;
    from * a + to * b
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnimationAttribute {
    Translation,
    Rotation,
    Scaling,
}

#[derive(Clone, Debug)]
pub struct SceneGraphAnimationChannel {
    pub sampler: Arc<Sampler>,
    pub target: NodeId,
    pub attribute: AnimationAttribute,
}

impl SceneGraphAnimationChannel {
    /// Writes the sampled value into the target node. Returns false if the sampler is empty.
    pub fn apply(&self, graph: &mut SceneGraph, time: f32) -> bool {
        let Some(value) = self.sampler.evaluate(time) else {
            return false;
        };

        let transform = &mut graph.node_mut(self.target).transform;
        match self.attribute {
            AnimationAttribute::Translation => transform.position = value.xyz(),
            AnimationAttribute::Scaling => transform.scale = value.xyz(),
            AnimationAttribute::Rotation => {
                let value = if value.mag_sq() > 0.0 {
                    value.normalized()
                } else {
                    Vec4::new(0.0, 0.0, 0.0, 1.0)
                };
                transform.orientation =
                    Rotor3::from_quaternion_array([value.x, value.y, value.z, value.w]);
            }
        }
        true
    }
}

#[derive(Clone, Debug, Default)]
pub struct SceneGraphAnimation {
    pub name: String,
    channels: Vec<SceneGraphAnimationChannel>,
}

impl SceneGraphAnimation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channels: Vec::new(),
        }
    }

    pub fn add_channel(&mut self, channel: SceneGraphAnimationChannel) {
        self.channels.push(channel);
    }

    pub fn channels(&self) -> &[SceneGraphAnimationChannel] {
        &self.channels
    }

    pub fn is_valid(&self) -> bool {
        !self.channels.is_empty()
    }

    pub fn duration(&self) -> f32 {
        self.channels
            .iter()
            .map(|channel| channel.sampler.end_time())
            .fold(0.0, f32::max)
    }

    pub fn apply(&self, graph: &mut SceneGraph, time: f32) {
        for channel in &self.channels {
            channel.apply(graph, time);
        }
    }
}
