mod components;
mod registry;

pub use components::{
    Controller, Health, Invincibility, Lives, RenderType, Score, Transform, Velocity,
};
pub use registry::{EntityId, INVALID_ENTITY, Registry};
