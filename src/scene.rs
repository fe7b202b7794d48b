mod animation;
mod camera;
mod factory;
mod graph;
mod light;
mod material;
mod mesh;
mod texture;
mod vertex;

pub use animation::*;
pub use camera::*;
pub use factory::*;
pub use graph::*;
pub use light::*;
pub use material::*;
pub use mesh::*;
pub use texture::*;
pub use vertex::*;
