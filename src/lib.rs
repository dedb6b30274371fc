//! Framelink: coordinate linking and orientation reconciliation for linked
//! astronomical image viewers.
//!
//! Independently loaded datasets each carry their own pixel grid and
//! possibly their own world coordinate system. Framelink decides how they
//! relate (pixel identity, fitted affine/offset, or full coordinate
//! composition), keeps a mutable per-viewer notion of reference orientation,
//! and keeps every dependent view consistent when that reference changes:
//! mouse-over readouts, zoom extents, markers, and regions.
//!
//! # Modules
//!
//! - [`frame`]: coordinate frame adapters (none / affine / general)
//! - [`collection`]: the labeled dataset store and subset groups
//! - [`link`]: the link model and affine approximation fitting
//! - [`orient`]: per-viewer reference resolution and orientation layers
//! - [`readout`]: mouse-over coordinate readout with reliability flags
//! - [`annotate`]: markers and their reprojection across frame changes
//! - [`session`]: the single-writer public API surface
//! - [`error`]: error types for framelink operations

pub mod annotate;
pub mod collection;
pub mod config;
pub mod error;
pub mod frame;
pub mod link;
pub mod notify;
pub mod orient;
pub mod readout;
pub mod scene;
pub mod session;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use error::FramelinkError;
pub use session::Session;

/// The framelink CLI application.
#[derive(Parser)]
#[command(name = "framelink")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Compute and print the link graph for a scene.
    Links(LinksArgs),
    /// Print the coordinate readout at a device position.
    Readout(ReadoutArgs),
}

/// Shared linking flags.
#[derive(clap::Args)]
struct LinkFlags {
    /// Linking scheme ('pixels' or 'wcs'). Defaults to the config value.
    #[arg(long)]
    link_type: Option<String>,

    /// Fallback for datasets without WCS ('none' or 'pixels').
    #[arg(long)]
    wcs_fallback: Option<String>,

    /// Disable the affine approximation of WCS relations.
    #[arg(long)]
    no_affine: bool,

    /// Surface linking failures instead of keeping previous links.
    #[arg(long)]
    error_on_fail: bool,

    /// Optional YAML config providing linking defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Arguments for the links subcommand.
#[derive(clap::Args)]
struct LinksArgs {
    /// Scene JSON describing the datasets to load.
    scene: PathBuf,

    #[command(flatten)]
    flags: LinkFlags,
}

/// Arguments for the readout subcommand.
#[derive(clap::Args)]
struct ReadoutArgs {
    /// Scene JSON describing the datasets to load.
    scene: PathBuf,

    /// Device x position, in reference-frame pixels.
    #[arg(long, allow_hyphen_values = true)]
    x: f64,

    /// Device y position, in reference-frame pixels.
    #[arg(long, allow_hyphen_values = true)]
    y: f64,

    /// Blink this many times before reading out.
    #[arg(long, default_value_t = 0)]
    blink: usize,

    #[command(flatten)]
    flags: LinkFlags,
}

/// Run the framelink CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), FramelinkError> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Links(args)) => run_links(args),
        Some(Commands::Readout(args)) => run_readout(args),
        None => {
            println!("framelink {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("Coordinate linking for linked astronomical viewers.");
            println!();
            println!("Run 'framelink --help' for usage information.");
            Ok(())
        }
    }
}

/// Build a session from a scene file and linking flags.
fn session_from_flags(scene_path: &PathBuf, flags: &LinkFlags) -> Result<Session, FramelinkError> {
    let mut options = match &flags.config {
        Some(path) => config::SessionConfig::read(path)?.link_options()?,
        None => link::LinkOptions::default(),
    };
    if let Some(link_type) = &flags.link_type {
        options.link_type = link::LinkType::parse(link_type)?;
    }
    if let Some(fallback) = &flags.wcs_fallback {
        options.wcs_fallback_scheme = link::parse_fallback(fallback)?;
    }
    if flags.no_affine {
        options.wcs_use_affine = false;
    }
    if flags.error_on_fail {
        options.error_on_fail = true;
    }

    let scene = scene::read_scene(scene_path)?;
    let mut session = Session::with_options(options);
    for dataset in scene.datasets {
        session.load_dataset(dataset.into_dataset())?;
    }
    Ok(session)
}

/// Execute the links subcommand.
fn run_links(args: LinksArgs) -> Result<(), FramelinkError> {
    let session = session_from_flags(&args.scene, &args.flags)?;
    print!("{}", session.links());
    Ok(())
}

/// Execute the readout subcommand.
fn run_readout(args: ReadoutArgs) -> Result<(), FramelinkError> {
    let mut session = session_from_flags(&args.scene, &args.flags)?;
    for _ in 0..args.blink {
        session.blink(session::DEFAULT_VIEWER_ID);
    }
    let readout = session.readout(session::DEFAULT_VIEWER_ID, args.x, args.y)?;
    let (line1, line2, line3) = readout.as_text();
    println!("{line1}");
    if !line2.is_empty() {
        println!("{line2}");
        println!("{line3}");
    }
    if readout.pixel_unreliable || readout.world_unreliable || readout.value_unreliable {
        println!("(unreliable: extrapolated outside validity region)");
    }
    Ok(())
}
