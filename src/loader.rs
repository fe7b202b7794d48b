mod accessor;
mod animation;
mod buffer;
mod extensions;
mod material;
mod mesh;
mod scene;
mod scene_loader;
mod tangent;
mod texture;
mod uri;

pub use extensions::*;
pub use scene_loader::*;
pub use tangent::compute_tangents;
pub use uri::{decode_data_uri, percent_decode, DataUriError};
