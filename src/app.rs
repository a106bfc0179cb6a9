//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - installs the log subscriber
//! - loads and checks the parameter and procsteps files
//! - runs the pipeline or one of the helper commands

use clap::Parser;
use tracing::{Level, info};

use crate::cli::{CheckArgs, Cli, Command, InitArgs, ResolutionArgs, RunArgs, SynthArgs};
use crate::config::template::write_templates;
use crate::config::{Params, Recipe};
use crate::data::synth::{SynthConfig, write_synth_cube};
use crate::domain::Instrument;
use crate::error::AppError;
use crate::instrument::fit_resolution;

pub mod pipeline;

/// Entry point for the `brutifus` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Check(args) => handle_check(args),
        Command::Init(args) => handle_init(args),
        Command::Synth(args) => handle_synth(args),
        Command::Resolution(args) => handle_resolution(args),
    }
}

/// Install the fmt subscriber; later calls are no-ops.
pub fn init_logging(verbose: bool) {
    let level = if verbose { Level::INFO } else { Level::WARN };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    for path in [&args.procsteps, &args.params] {
        if !path.is_file() {
            return Err(AppError::config(format!("File not found: {}", path.display())));
        }
    }
    let params = Params::load(&args.params)?;
    init_logging(params.verbose);
    let recipe = Recipe::load(&args.procsteps)?;
    info!(
        target_name = %params.target,
        steps = recipe.steps.len(),
        enabled = recipe.enabled().count(),
        "starting brutifus"
    );

    let summary = pipeline::execute(&params, &recipe)?;
    println!("All done in {:.1} seconds.", summary.elapsed.as_secs_f64());
    Ok(())
}

fn handle_check(args: CheckArgs) -> Result<(), AppError> {
    init_logging(true);
    let params = Params::load(&args.params)?;
    println!(
        "{}: target '{}', {} S/N range(s), {} sky region(s), continuum fitting {}",
        args.params.display(),
        params.target,
        params.snr_ranges.len(),
        params.sky_regions.len(),
        params.multiprocessing.describe()
    );
    if let Some(path) = &args.procsteps {
        let recipe = Recipe::load(path)?;
        println!("{}: {} step(s), {} enabled", path.display(), recipe.steps.len(), recipe.enabled().count());
        for step in &recipe.steps {
            println!("  [{}] {:<20} {}", if step.run { "x" } else { " " }, step.name(), step.suffix);
        }
    }
    Ok(())
}

fn handle_init(args: InitArgs) -> Result<(), AppError> {
    for path in write_templates(&args.dir, args.force)? {
        println!("wrote {}", path.display());
    }
    Ok(())
}

fn handle_synth(args: SynthArgs) -> Result<(), AppError> {
    init_logging(true);
    let cfg = SynthConfig {
        seed: args.seed,
        nx: args.nx,
        ny: args.ny,
        nlam: args.nlam,
        z: args.z,
        n_stars: args.stars,
        noise: args.noise,
        ..SynthConfig::default()
    };
    let synth = write_synth_cube(&args.out, &cfg)?;
    info!(stars = ?synth.stars, "synthetic cube generated");
    println!(
        "wrote {} ({} x {} spaxels, {} planes, {:.2}-{:.2} Å)",
        args.out.display(),
        cfg.nx,
        cfg.ny,
        cfg.nlam,
        synth.lams.first().copied().unwrap_or(f64::NAN),
        synth.lams.last().copied().unwrap_or(f64::NAN)
    );
    Ok(())
}

fn handle_resolution(args: ResolutionArgs) -> Result<(), AppError> {
    let poly = match &args.table {
        Some(path) => fit_resolution(path)?,
        None => Instrument::Muse.resolution(),
    };
    println!("{:>10}  {:>10}", "lam [Å]", "R");
    for lam in args.lams {
        println!("{lam:>10.2}  {:>10.1}", poly.eval(lam));
    }
    Ok(())
}
