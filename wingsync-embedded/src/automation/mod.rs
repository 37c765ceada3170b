mod engine;
mod rule;

pub use engine::*;
pub use rule::*;
