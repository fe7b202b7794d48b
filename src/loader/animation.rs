use std::{collections::HashMap, sync::Arc};

use gltf::{
    accessor::{DataType, Dimensions},
    animation::{Interpolation, Property},
};
use ultraviolet::Vec4;

use crate::{
    error::ImportError,
    scene::{
        AnimationAttribute, InterpolationMode, Keyframe, NodeId, Sampler, SceneGraph,
        SceneGraphAnimation, SceneGraphAnimationChannel, SceneLeaf,
    },
    vfs::Blob,
};

use super::accessor::AccessorReader;

#[derive(Hash, Eq, PartialEq, Debug, Clone, Copy)]
struct SamplerKey {
    index: usize,
}

fn read_vec4(reader: &AccessorReader<'_>, element: usize) -> Option<Vec4> {
    (element < reader.count()).then(|| Vec4::from(reader.read_floats::<4>(element)))
}

fn interpolation_mode(
    animation: &gltf::Animation<'_>,
    sampler: &gltf::animation::Sampler<'_>,
) -> InterpolationMode {
    match sampler.interpolation() {
        Interpolation::Linear => {
            let drives_rotation = animation.channels().any(|channel| {
                channel.sampler().index() == sampler.index()
                    && channel.target().property() == Property::Rotation
            });
            if drives_rotation {
                InterpolationMode::Slerp
            } else {
                InterpolationMode::Linear
            }
        }
        Interpolation::Step => InterpolationMode::Step,
        Interpolation::CubicSpline => InterpolationMode::HermiteSpline,
    }
}

fn load_sampler(
    animation: &gltf::Animation<'_>,
    gltf_sampler: &gltf::animation::Sampler<'_>,
    buffers: &[Blob],
) -> Result<Option<Sampler>, ImportError> {
    let times = AccessorReader::new(&gltf_sampler.input(), buffers)?;
    if times.dimensions() != Dimensions::Scalar || times.data_type() != DataType::F32 {
        log::warn!(
            "Animation sampler {} has keyframe times of type {:?} of {:?}, ignoring it.",
            gltf_sampler.index(),
            times.dimensions(),
            times.data_type()
        );
        return Ok(None);
    }
    let values = AccessorReader::new(&gltf_sampler.output(), buffers)?;

    let mode = interpolation_mode(animation, gltf_sampler);
    let mut sampler = Sampler::new(mode);

    for i in 0..times.count() {
        let [time] = times.read_floats::<1>(i);
        let keyframe = if mode == InterpolationMode::HermiteSpline {
            match (
                read_vec4(&values, i * 3),
                read_vec4(&values, i * 3 + 1),
                read_vec4(&values, i * 3 + 2),
            ) {
                (Some(in_tangent), Some(value), Some(out_tangent)) => Some(Keyframe {
                    time,
                    value,
                    in_tangent,
                    out_tangent,
                }),
                _ => None,
            }
        } else {
            read_vec4(&values, i).map(|value| Keyframe {
                time,
                value,
                ..Default::default()
            })
        };

        if let Some(keyframe) = keyframe {
            sampler.add_keyframe(keyframe);
        }
    }

    if sampler.keyframes().is_empty() {
        log::warn!("Animation channel imported with no keyframes, ignoring.");
        return Ok(None);
    }
    Ok(Some(sampler))
}

fn load_animation(
    animation: &gltf::Animation<'_>,
    node_ids: &[Option<NodeId>],
    buffers: &[Blob],
) -> Result<SceneGraphAnimation, ImportError> {
    let mut samplers: HashMap<SamplerKey, Arc<Sampler>> = HashMap::new();
    for gltf_sampler in animation.samplers() {
        if let Some(sampler) = load_sampler(animation, &gltf_sampler, buffers)? {
            samplers.insert(
                SamplerKey {
                    index: gltf_sampler.index(),
                },
                Arc::new(sampler),
            );
        }
    }

    let mut result = SceneGraphAnimation::new(animation.name().unwrap_or_default());
    for (channel_index, channel) in animation.channels().enumerate() {
        let target = channel.target();
        let Some(node) = node_ids.get(target.node().index()).copied().flatten() else {
            log::warn!(
                "Animation channel {} targets node {}, which is not part of the scene, ignoring it.",
                channel_index,
                target.node().index()
            );
            continue;
        };

        let attribute = match target.property() {
            Property::Translation => AnimationAttribute::Translation,
            Property::Rotation => AnimationAttribute::Rotation,
            Property::Scale => AnimationAttribute::Scaling,
            Property::MorphTargetWeights => {
                log::warn!("Unsupported glTF animation target: morph target weights");
                continue;
            }
        };

        let key = SamplerKey {
            index: channel.sampler().index(),
        };
        let Some(sampler) = samplers.get(&key) else {
            log::warn!(
                "Animation channel {} uses a sampler without keyframes, ignoring it.",
                channel_index
            );
            continue;
        };

        result.add_channel(SceneGraphAnimationChannel {
            sampler: sampler.clone(),
            target: node,
            attribute,
        });
    }

    Ok(result)
}

/// Adds a node with an animation leaf for every glTF animation that has usable channels.
pub fn load_animations(
    document: &gltf::Document,
    graph: &mut SceneGraph,
    node_ids: &[Option<NodeId>],
    buffers: &[Blob],
) -> Result<Vec<Arc<SceneGraphAnimation>>, ImportError> {
    let container = if document.animations().len() > 1 {
        graph.create_child(graph.root(), "Animations")
    } else {
        graph.root()
    };

    let mut animations = Vec::new();
    for gltf_animation in document.animations() {
        let animation = load_animation(&gltf_animation, node_ids, buffers)?;
        if !animation.is_valid() {
            continue;
        }

        let animation = Arc::new(animation);
        let node = graph.create_child(container, animation.name.clone());
        graph.set_leaf(node, SceneLeaf::Animation(animation.clone()));
        log::debug!(
            "Loaded animation '{}' with {} channels",
            animation.name,
            animation.channels().len()
        );
        animations.push(animation);
    }

    Ok(animations)
}
