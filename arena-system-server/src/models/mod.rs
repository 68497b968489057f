//! Built-in model implementations.

pub mod dsp;
