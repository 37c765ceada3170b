#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod automation;
pub mod calendar;
pub mod control;
pub mod error;
pub mod sensor;
pub mod stepper;
pub mod storage;
pub mod types;

pub use automation::*;
pub use calendar::*;
pub use control::*;
pub use error::*;
pub use sensor::*;
pub use stepper::*;
pub use storage::*;
pub use types::*;
