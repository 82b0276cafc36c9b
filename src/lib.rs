//! Random-action CartPole: a small gym-style environment layer and a driver
//! that steps it with random actions while rendering.

pub mod common;
pub mod config;
pub mod env;
pub mod runner;
