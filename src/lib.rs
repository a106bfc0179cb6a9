//! `brutifus` library crate.
//!
//! Post-processing of integral field spectrograph datacubes (MUSE): S/N maps,
//! broad-band and RGB images, sky subtraction, Galactic extinction
//! correction, LOWESS continuum fitting and astrometric refinement.
//!
//! The binary (`brutifus`) is a thin wrapper around this library so that
//! every step can be tested without spawning processes.

pub mod app;
pub mod cli;
pub mod config;
pub mod cube;
pub mod data;
pub mod domain;
pub mod error;
pub mod extinction;
pub mod fits;
pub mod instrument;
pub mod io;
pub mod math;
pub mod plot;
pub mod steps;
