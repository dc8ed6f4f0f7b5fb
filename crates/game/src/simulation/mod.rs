mod command;
mod movement;
mod tick;

pub use command::{InputProcessor, InputQueue, PendingInput};
pub use movement::{DEFAULT_MOVE_SPEED, apply_movement, movement_delta};
pub use tick::FixedTimestep;
