//! Domain models for the parts inventory engine

mod batch;
mod document;
mod inventory;

pub use batch::*;
pub use document::*;
pub use inventory::*;
