//! pyro-rootfs - guest rootfs builder for pyro microVMs.
//!
//! Two phases:
//! - compose: base distribution + untrusted identity + pyrod + JDK runtime
//! - export: flatten the composed layer into a mounted, empty rootfs image

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pyro_rootfs::commands;
use pyro_rootfs::compose::RuntimePin;
use pyro_rootfs::config::{BaseDistro, Config};

#[derive(Parser)]
#[command(name = "pyro-rootfs")]
#[command(about = "Guest rootfs builder for pyro microVMs")]
#[command(
    after_help = "QUICK START:\n  pyro-rootfs preflight       Check host tools and inputs\n  pyro-rootfs compose         Build the image layer\n  pyro-rootfs export /mnt/fs  Export into a mounted image\n  pyro-rootfs verify /mnt/fs  Check the exported rootfs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compose the image layer (identity, supervisor, runtime)
    Compose {
        /// Base distribution, NAME:RELEASE
        #[arg(long)]
        base_distro: Option<BaseDistro>,
        /// Extracted base root or minirootfs tarball
        #[arg(long)]
        base_rootfs: Option<PathBuf>,
        /// Runtime package to install
        #[arg(long)]
        runtime: Option<String>,
        /// Runtime version constraint
        #[arg(long)]
        runtime_version: Option<String>,
        /// Statically linked pyrod binary
        #[arg(long)]
        supervisor: Option<PathBuf>,
        /// Output directory for the layer and its manifest
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export the composed layer into an empty, mounted destination
    Export {
        /// Destination directory (must be empty)
        destination: PathBuf,
        /// Layer to export (default: the composed layer; use / inside the image)
        #[arg(long)]
        layer: Option<PathBuf>,
    },

    /// Verify an exported rootfs
    Verify {
        /// Root of the exported filesystem
        rootfs: PathBuf,
    },

    /// Run preflight checks (verify host tools and inputs before composing)
    Preflight {
        /// Fail if any checks fail (exit code 1)
        #[arg(long)]
        strict: bool,
    },

    /// Show information
    Show {
        #[command(subcommand)]
        what: ShowTarget,
    },

    /// Remove the composed layer, manifest and staging leftovers
    Clean,
}

#[derive(Subcommand)]
enum ShowTarget {
    /// Show current configuration
    Config,
    /// Show the composed layer manifest
    Layer,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env if present
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let base_dir = std::env::current_dir()?;
    let load = || Config::load(&base_dir);

    match cli.command {
        Commands::Compose {
            base_distro,
            base_rootfs,
            runtime,
            runtime_version,
            supervisor,
            output,
        } => {
            let mut config = load()?;
            if let Some(distro) = base_distro {
                config.base_distro = distro;
            }
            if let Some(path) = base_rootfs {
                config.base_rootfs = base_dir.join(path);
            }
            if let Some(package) = runtime {
                config.runtime = RuntimePin::new(package);
            }
            if let Some(version) = runtime_version {
                config.runtime.version = Some(version);
            }
            if let Some(path) = supervisor {
                config.supervisor_binary = base_dir.join(path);
            }
            if let Some(path) = output {
                config.output_dir = base_dir.join(path);
            }
            commands::cmd_compose(&config)?;
        }

        Commands::Export { destination, layer } => {
            let layer = commands::resolve_layer(layer, load)?;
            commands::cmd_export(&layer, &destination)?;
        }

        Commands::Verify { rootfs } => {
            commands::cmd_verify(&rootfs)?;
        }

        Commands::Preflight { strict } => {
            commands::cmd_preflight(&load()?, strict)?;
        }

        Commands::Show { what } => {
            let show_target = match what {
                ShowTarget::Config => commands::show::ShowTarget::Config,
                ShowTarget::Layer => commands::show::ShowTarget::Layer,
            };
            commands::cmd_show(show_target, &load()?)?;
        }

        Commands::Clean => {
            commands::cmd_clean(&load()?)?;
        }
    }

    Ok(())
}
