//! Command-line parsing for the datacube pipeline.
//!
//! Argument parsing stays here; everything the commands do lives in
//! [`crate::app`] and the modules it drives.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "brutifus", version, about = "Post-processing of integral field spectrograph datacubes")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run every enabled step of a procsteps file.
    Run(RunArgs),
    /// Validate a parameter file (and optionally a procsteps file) without running anything.
    Check(CheckArgs),
    /// Write starter params.yaml and procsteps.yaml files.
    Init(InitArgs),
    /// Write a synthetic MUSE-like datacube, handy for trying the pipeline out.
    Synth(SynthArgs),
    /// Print the instrument's spectral resolving power.
    Resolution(ResolutionArgs),
}

#[derive(Debug, Parser, Clone)]
pub struct RunArgs {
    /// Processing steps file.
    #[arg(long, value_name = "YAML")]
    pub procsteps: PathBuf,

    /// Parameter file.
    #[arg(long, value_name = "YAML")]
    pub params: PathBuf,
}

#[derive(Debug, Parser, Clone)]
pub struct CheckArgs {
    /// Parameter file.
    #[arg(long, value_name = "YAML")]
    pub params: PathBuf,

    /// Processing steps file.
    #[arg(long, value_name = "YAML")]
    pub procsteps: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// Directory to write the templates into.
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Overwrite existing files.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Parser, Clone)]
pub struct SynthArgs {
    /// Output FITS file.
    #[arg(long, value_name = "FITS")]
    pub out: PathBuf,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Spaxels along x.
    #[arg(long, default_value_t = 40)]
    pub nx: usize,

    /// Spaxels along y.
    #[arg(long, default_value_t = 40)]
    pub ny: usize,

    /// Spectral planes (1.25 Å apart, from 4750 Å).
    #[arg(long, default_value_t = 3681)]
    pub nlam: usize,

    /// Redshift of the synthetic galaxy.
    #[arg(long, default_value_t = 0.0045)]
    pub z: f64,

    /// Number of foreground stars.
    #[arg(long, default_value_t = 3)]
    pub stars: usize,

    /// Per-voxel noise standard deviation.
    #[arg(long, default_value_t = 0.5)]
    pub noise: f64,
}

#[derive(Debug, Parser, Clone)]
pub struct ResolutionArgs {
    /// Wavelengths (Å) to evaluate the resolving power at.
    #[arg(long = "lam", value_name = "ANGSTROEM", num_args = 1.., required = true)]
    pub lams: Vec<f64>,

    /// CSV table (`lam_nm,r`) to refit the resolution curve from instead of the built-in one.
    #[arg(long, value_name = "CSV")]
    pub table: Option<PathBuf>,
}
