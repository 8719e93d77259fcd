//! CLI command definitions and handlers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use berth_common::{BerthPaths, ResourceId};
use berth_image::{ImageSpec, translate};
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, WrapErr, eyre};

use crate::docker::DockerCli;
use crate::manifest::Manifest;
use crate::session::{Outcome, RefreshReport, Refreshed, Session};
use crate::state::RecordStore;

/// Berth - declarative image reconciliation
#[derive(Parser)]
#[command(name = "berth")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding recorded state
    #[arg(long, global = true, env = "BERTH_STATE_DIR", default_value = ".berth")]
    pub state_dir: PathBuf,

    /// Docker CLI executable
    #[arg(long, global = true, env = "BERTH_DOCKER", default_value = "docker")]
    pub docker: PathBuf,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Text,
    /// Pretty-printed JSON
    Json,
}

/// Berth commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Check a manifest without touching the engine
    Validate {
        /// Path to the manifest (.yaml, .toml or .json)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Refresh recorded state and show what apply would do
    Plan {
        /// Path to the manifest
        #[arg(short, long)]
        file: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Reconcile the engine with a manifest
    Apply {
        /// Path to the manifest
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Re-read recorded images from the engine
    Refresh,

    /// Remove every recorded image
    Destroy,

    /// Print recorded state
    Show {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or any resource fails to apply.
    pub async fn execute(self) -> Result<()> {
        let store = RecordStore::new(BerthPaths::with_root(&self.state_dir));
        let docker = DockerCli::new(&self.docker);
        let session = Session::new(&docker, store);

        match self.command {
            Commands::Validate { file } => {
                let specs = load(&file)?;
                for (address, spec) in &specs {
                    if let Some(build) = &spec.build {
                        translate(build).wrap_err_with(|| format!("images.{address}"))?;
                    }
                    let mode = if spec.build.is_some() { "build" } else { "pull" };
                    println!("{address}\t{}\t{mode}", spec.name);
                }
                println!("{} image(s) valid", specs.len());
                Ok(())
            }

            Commands::Plan { file, format } => {
                let specs = load(&file)?;
                let report = session.refresh().await.wrap_err("Failed to refresh state")?;
                let changes = session.plan(&specs).wrap_err("Failed to plan")?;

                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&changes)?),
                    OutputFormat::Text => {
                        for change in &changes {
                            println!("{}: {}", change.address, change.plan);
                        }
                    }
                }
                refresh_failures(&report)
            }

            Commands::Apply { file } => {
                let specs = load(&file)?;
                let outcomes = session.apply(&specs).await.wrap_err("Apply failed")?;
                if outcomes.is_empty() {
                    println!("No changes");
                }
                report(&outcomes)
            }

            Commands::Refresh => {
                let report = session.refresh().await.wrap_err("Failed to refresh state")?;
                for (address, result) in &report.refreshed {
                    let label = match result {
                        Refreshed::Unchanged => "unchanged",
                        Refreshed::Updated => "updated",
                        Refreshed::Drifted => "gone, record dropped",
                    };
                    println!("{address}: {label}");
                }
                refresh_failures(&report)
            }

            Commands::Destroy => {
                let outcomes = session.destroy().await.wrap_err("Destroy failed")?;
                if outcomes.is_empty() {
                    println!("Nothing recorded");
                }
                report(&outcomes)
            }

            Commands::Show { format } => {
                let store = session.store();
                let mut resources = Vec::new();
                for address in store.list()? {
                    resources.push(store.load(&address)?);
                }

                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&resources)?);
                    }
                    OutputFormat::Text if resources.is_empty() => println!("Nothing recorded"),
                    OutputFormat::Text => {
                        println!("ADDRESS\tNAME\tIMAGE ID\tREPO DIGEST");
                        for resource in resources {
                            println!(
                                "{}\t{}\t{}\t{}",
                                resource.address,
                                resource.spec.name,
                                resource.record.image_id,
                                resource.record.repo_digest
                            );
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

fn load(file: &Path) -> Result<BTreeMap<ResourceId, ImageSpec>> {
    let manifest = Manifest::load(file)
        .wrap_err_with(|| format!("Failed to load manifest {}", file.display()))?;
    Ok(manifest.normalize()?)
}

fn refresh_failures(report: &RefreshReport) -> Result<()> {
    for (address, e) in &report.failed {
        eprintln!("{address}: refresh failed: {e}");
    }
    if report.failed.is_empty() {
        Ok(())
    } else {
        Err(eyre!("{} resource(s) failed to refresh", report.failed.len()))
    }
}

fn report(outcomes: &[Outcome]) -> Result<()> {
    let mut failed = 0;
    for outcome in outcomes {
        match &outcome.error {
            None => println!("{}: {}", outcome.address, outcome.plan),
            Some(e) => {
                failed += 1;
                eprintln!("{}: {} failed: {e}", outcome.address, outcome.plan);
            }
        }
    }

    if failed > 0 {
        return Err(eyre!("{failed} resource(s) failed"));
    }
    Ok(())
}
