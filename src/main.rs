use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use foamdeck_calc::{FluidProperties, FluidState, LayerInputs, compute_increase_rate};
use foamdeck_history::{RunHistory, write_dataset_csv};
use foamdeck_logs::SolverMonitor;

mod case;
mod config;
mod console;
mod runner;

use case::{CaseDir, detect_versions};
use config::Config;
use console::ConsoleSink;
use runner::{FoamEnv, RunOptions};

/// Foamdeck - run, monitor and review OpenFOAM simulations from the terminal
#[derive(Parser, Debug)]
#[command(name = "foamdeck")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to <config dir>/foamdeck/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a solver on a case and record it in the history
    Run {
        /// Solver executable, e.g. foamRun
        #[arg(long, short)]
        solver: String,

        /// Case directory (defaults to the configured one)
        #[arg(long)]
        case: Option<PathBuf>,

        /// MPI ranks; 1 runs serially
        #[arg(long)]
        ranks: Option<u32>,

        /// OpenFOAM installation name, e.g. openfoam12
        #[arg(long)]
        foam_version: Option<String>,

        /// Free-form note stored with the run
        #[arg(long, default_value = "")]
        notes: String,

        /// Export residuals as CSV when the run ends
        #[arg(long, value_name = "PATH")]
        csv: Option<PathBuf>,

        /// Only show profiling lines and the final summary
        #[arg(long, short)]
        quiet: bool,
    },

    /// Parse an existing solver log (`-` reads stdin)
    Monitor {
        log: PathBuf,

        #[arg(long, value_name = "PATH")]
        csv: Option<PathBuf>,

        #[arg(long, short)]
        quiet: bool,
    },

    /// Inspect recorded simulations
    History {
        #[command(subcommand)]
        action: Option<HistoryAction>,
    },

    /// Boundary layer growth rates and cell counts
    Layers {
        /// Nozzle diameter
        #[arg(long, default_value_t = 0.106)]
        d: f64,

        /// Nozzle-to-wall distance in diameters
        #[arg(long, default_value_t = 30.0)]
        n: f64,

        /// Transition layer height in diameters
        #[arg(long, default_value_t = 10.0)]
        m: f64,

        /// First cell height at the nozzle
        #[arg(long, default_value_t = 0.00142)]
        dy_in: f64,

        /// First cell height at the wall
        #[arg(long, default_value_t = 0.008)]
        dy_wall: f64,

        #[arg(long)]
        json: bool,
    },

    /// Brine density and viscosity
    Fluid {
        /// Temperature in °C
        #[arg(long)]
        temperature: f64,

        /// Pressure in MPa
        #[arg(long)]
        pressure: f64,

        /// Salinity in mg/L
        #[arg(long)]
        salinity: f64,

        #[arg(long)]
        json: bool,
    },

    /// Case directory maintenance
    Case {
        #[command(subcommand)]
        action: CaseAction,

        /// Case directory (defaults to the configured one)
        #[arg(long, global = true)]
        case: Option<PathBuf>,
    },

    /// List installed OpenFOAM versions
    Versions,

    /// Show or change the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    /// List all runs
    List,

    /// Show one run with its final cloud block
    Show { index: usize },

    /// Delete one run
    Delete { index: usize },

    /// Delete all runs
    Clear,

    /// Runs merged with cloud properties and final cloud metrics
    Dataset {
        /// Write CSV to this file (`-` for stdout)
        #[arg(long, value_name = "PATH")]
        csv: Option<PathBuf>,

        #[arg(long, conflicts_with = "csv")]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum CaseAction {
    /// Check for the 0, system and constant directories
    Check,

    /// Set numberOfSubdomains and run decomposePar
    Decompose {
        /// Subdomain count (defaults to the configured one)
        #[arg(long)]
        cores: Option<u32>,

        /// Only rewrite decomposeParDict
        #[arg(long)]
        no_run: bool,
    },

    /// Run reconstructPar
    Reconstruct,

    /// Run checkMesh (needs system/controlDict)
    CheckMesh,

    /// Import an I-DEAS UNV mesh with ideasUnvToFoam
    ConvertMesh {
        #[arg(value_name = "UNV")]
        unv: PathBuf,
    },

    /// Write profiling switches into controlDict
    Profile,

    /// Remove processor* directories
    Clean,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Remember a case directory
    SetCase { dir: PathBuf },

    /// Remember an OpenFOAM version
    SetVersion { version: String },

    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run_app(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run_app(args: Args) -> Result<()> {
    let config_path = match args.config {
        Some(path) => path,
        None => Config::default_path().context("cannot determine the config directory")?,
    };
    let mut config = Config::load(&config_path)?;

    match args.command {
        Command::Run {
            solver,
            case,
            ranks,
            foam_version,
            notes,
            csv,
            quiet,
        } => {
            let case = CaseDir::open(config.case_dir(case)?)?;
            let env = foam_env(&config, foam_version);
            let history = RunHistory::open(config.history_path());
            let options = RunOptions {
                solver,
                ranks: ranks.unwrap_or(config.mpi_ranks),
                notes,
                csv,
            };

            let mut sink = ConsoleSink::stdout(quiet);
            let outcome = runner::run_solver(&env, &case, &options, &history, &mut sink).await?;

            let mut out = io::stdout().lock();
            console::write_series_summary(&outcome.series, &mut out)?;
            console::write_process_summary(&outcome.process, &mut out)?;
        }

        Command::Monitor { log, csv, quiet } => {
            let mut monitor = SolverMonitor::new();
            let mut sink = ConsoleSink::stdout(quiet);

            let dropped = if log.as_os_str() == "-" {
                runner::replay(tokio::io::stdin(), &mut monitor, &mut sink).await
            } else {
                let file = tokio::fs::File::open(&log)
                    .await
                    .with_context(|| format!("opening {}", log.display()))?;
                runner::replay(file, &mut monitor, &mut sink).await
            };
            if dropped > 0 {
                tracing::warn!(dropped, "skipped lines that were not valid UTF-8");
            }

            let store = monitor.store().snapshot();
            console::write_series_summary(&store, io::stdout().lock())?;
            if let Some(path) = csv {
                runner::export_series(&store, &path)?;
            }
        }

        Command::History { action } => {
            let history = RunHistory::open(config.history_path());
            history_command(&history, action.unwrap_or(HistoryAction::List))?;
        }

        Command::Layers {
            d,
            n,
            m,
            dy_in,
            dy_wall,
            json,
        } => {
            let result = compute_increase_rate(LayerInputs {
                d,
                n,
                m,
                dy_in_0: dy_in,
                dy_wall_0: dy_wall,
            })
            .context("layer calculation failed")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                console::write_layer_result(&result, io::stdout().lock())?;
            }
        }

        Command::Fluid {
            temperature,
            pressure,
            salinity,
            json,
        } => {
            let props = FluidProperties::default().evaluate(FluidState {
                temperature_c: temperature,
                pressure_mpa: pressure,
                salinity_mg_l: salinity,
            });

            if json {
                println!("{}", serde_json::to_string_pretty(&props)?);
            } else {
                console::write_brine(&props, io::stdout().lock())?;
            }
        }

        Command::Case { action, case } => {
            let case = CaseDir::open(config.case_dir(case)?)?;
            case_command(&config, &case, action).await?;
        }

        Command::Versions => {
            let current = config.openfoam_version.as_deref();
            for version in detect_versions(&config.install_root) {
                let marker = if Some(version.as_str()) == current { "*" } else { " " };
                println!("{marker} {version}");
            }
        }

        Command::Config { action } => match action {
            ConfigAction::SetCase { dir } => {
                let dir = CaseDir::open(&dir)?;
                let dir = std::fs::canonicalize(dir.path())
                    .with_context(|| format!("resolving {}", dir.path().display()))?;
                println!("Case directory set to {}", dir.display());
                config.base_dir = Some(dir);
                config.save(&config_path)?;
            }
            ConfigAction::SetVersion { version } => {
                println!("OpenFOAM version set to {version}");
                config.openfoam_version = Some(version);
                config.save(&config_path)?;
            }
            ConfigAction::Show => {
                println!("# {}", config_path.display());
                print!("{}", toml::to_string_pretty(&config)?);
                println!("# history: {}", config.history_path().display());
            }
        },
    }

    Ok(())
}

fn history_command(history: &RunHistory, action: HistoryAction) -> Result<()> {
    let mut out = io::stdout().lock();
    match action {
        HistoryAction::List => console::write_history_table(&history.history()?, &mut out)?,
        HistoryAction::Show { index } => console::write_record(index, &history.get(index)?, &mut out)?,
        HistoryAction::Delete { index } => {
            let removed = history.delete_entry(index)?;
            writeln!(out, "Deleted run #{index} ({} on {})", removed.solver, removed.case_path)?;
        }
        HistoryAction::Clear => {
            history.clear_all()?;
            writeln!(out, "History cleared.")?;
        }
        HistoryAction::Dataset { csv, json } => {
            let rows = history.derive_dataset()?;
            match csv {
                Some(path) if path.as_os_str() == "-" => write_dataset_csv(&rows, &mut out)?,
                Some(path) => {
                    let file = File::create(&path)
                        .with_context(|| format!("creating {}", path.display()))?;
                    write_dataset_csv(&rows, BufWriter::new(file))?;
                    writeln!(out, "Exported {} runs to {}", rows.len(), path.display())?;
                }
                None if json => writeln!(out, "{}", serde_json::to_string_pretty(&rows)?)?,
                None => console::write_dataset_table(&rows, &mut out)?,
            }
        }
    }
    Ok(())
}

async fn run_case_utility(config: &Config, case: &CaseDir, utility: &str) -> Result<()> {
    let mut sink = ConsoleSink::stdout(false);
    let outcome = runner::run_utility(&foam_env(config, None), case, utility, &mut sink).await?;
    anyhow::ensure!(
        outcome.exit_code == Some(0),
        "{utility} failed with exit code {:?}",
        outcome.exit_code
    );
    Ok(())
}

async fn case_command(config: &Config, case: &CaseDir, action: CaseAction) -> Result<()> {
    match action {
        CaseAction::Check => println!("{} is a valid case", case.path().display()),

        CaseAction::Decompose { cores, no_run } => {
            let cores = cores.unwrap_or(config.decompose_cores);
            case.set_subdomains(cores)?;
            println!("decomposeParDict updated with {cores} subdomains");

            if !no_run {
                let removed = case.remove_processor_dirs()?;
                if !removed.is_empty() {
                    println!("Removed {}", removed.join(", "));
                }
                run_case_utility(config, case, "decomposePar").await?;
            }
        }

        CaseAction::Reconstruct => run_case_utility(config, case, "reconstructPar").await?,

        CaseAction::CheckMesh => {
            case.control_dict()?;
            run_case_utility(config, case, runner::CHECK_MESH).await?;
        }

        CaseAction::ConvertMesh { unv } => {
            // The utility runs inside the case directory
            let unv = unv
                .canonicalize()
                .with_context(|| format!("UNV file not found: {}", unv.display()))?;
            run_case_utility(config, case, &runner::convert_mesh_invocation(&unv)).await?;
        }

        CaseAction::Profile => {
            case.enable_profiling()?;
            println!("Profiling enabled in controlDict");
        }

        CaseAction::Clean => {
            let removed = case.remove_processor_dirs()?;
            if removed.is_empty() {
                println!("No processor directories found");
            } else {
                println!("Removed {}", removed.join(", "));
            }
        }
    }
    Ok(())
}

/// Version from the command line, the config, or the newest installed one
fn foam_env(config: &Config, explicit: Option<String>) -> FoamEnv {
    let version = explicit
        .or_else(|| config.openfoam_version.clone())
        .or_else(|| detect_versions(&config.install_root).pop())
        .unwrap_or_else(|| case::FALLBACK_VERSION.to_string());

    FoamEnv {
        install_root: config.install_root.clone(),
        version,
    }
}
