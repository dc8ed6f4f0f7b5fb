mod input;

pub use input::InputScript;
