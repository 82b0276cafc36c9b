pub mod base;
pub mod classic_control;
pub mod registry;
pub mod render;
pub mod wrappers;

pub use registry::{make, make_with, MakeOptions};
