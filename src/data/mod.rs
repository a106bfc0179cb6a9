//! Built-in data sources.

pub mod synth;
