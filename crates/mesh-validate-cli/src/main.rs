//! Mesh Validate - bed mesh validation runner
//!
//! The `mesh-validate` command drives the validator against the simulated
//! printer described by the `[simulation]` config section.
//!
//! ## Commands
//!
//! - `at`: compare the mesh with one probe measurement
//! - `validate`: five-point validation with optional remesh
//! - `script`: run a file of `VALIDATE_BED_MESH*` command lines
//! - `commands`: list the registered commands

mod config;

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mesh_validate_core::sim::SimulatedPrinter;
use mesh_validate_core::{
    BedMeshValidator, CommandOutcome, GcodeCommand, Responder, METRICS, VALIDATE_BED_MESH,
    VALIDATE_BED_MESH_AT,
};
use tracing::{info, Level};

use crate::config::{CliConfig, CONFIG_ENV};

#[derive(Parser)]
#[command(name = "mesh-validate")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Validate a bed mesh by probing representative points", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Print each command outcome as JSON after its report
    #[arg(long, global = true)]
    report_json: bool,

    /// TOML configuration file
    #[arg(short, long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the mesh-predicted height with one probe measurement
    At {
        #[arg(long, allow_negative_numbers = true)]
        x: f64,

        #[arg(long, allow_negative_numbers = true)]
        y: f64,
    },

    /// Probe five points and remesh on a deviation breach
    Validate {
        /// Deviation threshold in mm (default: from config)
        #[arg(long)]
        max_deviation: Option<f64>,

        /// Persist the new mesh after a remesh (TRUE/FALSE)
        #[arg(long)]
        save_config: Option<String>,

        /// Remesh when the threshold is exceeded (TRUE/FALSE)
        #[arg(long)]
        remesh: Option<String>,

        /// Lower corner of the sampled area as "X,Y"
        #[arg(long, allow_hyphen_values = true)]
        mesh_min: Option<String>,

        /// Upper corner of the sampled area as "X,Y"
        #[arg(long, allow_hyphen_values = true)]
        mesh_max: Option<String>,
    },

    /// Run command lines from a file ("-" for stdin)
    Script {
        file: PathBuf,

        /// Keep going after a failed command
        #[arg(long)]
        keep_going: bool,
    },

    /// List registered commands
    Commands,
}

/// Prints command reports on stdout.
struct ConsoleResponder;

impl Responder for ConsoleResponder {
    fn respond_info(&self, msg: &str) {
        println!("{}", msg);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    mesh_validate_core::init_tracing(cli.json, level);

    if let Commands::Commands = cli.command {
        for (name, help) in BedMeshValidator::commands() {
            println!("{:<24} {}", name, help);
        }
        return Ok(());
    }

    let config = CliConfig::load(cli.config.as_deref())?;
    let printer = SimulatedPrinter::new(config.simulation.clone());
    let mut validator =
        BedMeshValidator::new(config.validate_bed_mesh).context("Failed to create validator")?;
    validator
        .bind(printer.collaborators())
        .context("Failed to bind validator to printer")?;
    info!(
        probe = %printer.config().probe_name,
        mesh_min = %printer.config().mesh_min,
        mesh_max = %printer.config().mesh_max,
        "simulated printer ready"
    );

    let result = match cli.command {
        Commands::At { x, y } => {
            let cmd = GcodeCommand::new(VALIDATE_BED_MESH_AT)
                .with_param("X", x.to_string())
                .with_param("Y", y.to_string());
            cmd_run(&validator, &cmd, cli.report_json).await
        }
        Commands::Validate {
            max_deviation,
            save_config,
            remesh,
            mesh_min,
            mesh_max,
        } => {
            let cmd =
                build_validate_command(max_deviation, save_config, remesh, mesh_min, mesh_max);
            cmd_run(&validator, &cmd, cli.report_json).await
        }
        Commands::Script { file, keep_going } => {
            cmd_script(&validator, &file, keep_going, cli.report_json).await
        }
        Commands::Commands => Ok(()),
    };

    METRICS.flush();
    result
}

fn build_validate_command(
    max_deviation: Option<f64>,
    save_config: Option<String>,
    remesh: Option<String>,
    mesh_min: Option<String>,
    mesh_max: Option<String>,
) -> GcodeCommand {
    let mut cmd = GcodeCommand::new(VALIDATE_BED_MESH);
    if let Some(value) = max_deviation {
        cmd = cmd.with_param("MAX_DEVIATION", value.to_string());
    }
    let raw = [
        ("SAVE_CONFIG", save_config),
        ("REMESH", remesh),
        ("MESH_MIN", mesh_min),
        ("MESH_MAX", mesh_max),
    ];
    for (key, value) in raw {
        if let Some(value) = value {
            cmd = cmd.with_param(key, value);
        }
    }
    cmd
}

async fn cmd_run(
    validator: &BedMeshValidator,
    cmd: &GcodeCommand,
    report_json: bool,
) -> Result<()> {
    let outcome = validator
        .handle(cmd, &ConsoleResponder)
        .await
        .with_context(|| format!("{} failed", cmd.name()))?;
    if report_json {
        print_outcome(&outcome)?;
    }
    Ok(())
}

async fn cmd_script(
    validator: &BedMeshValidator,
    file: &Path,
    keep_going: bool,
    report_json: bool,
) -> Result<()> {
    let reader: Box<dyn BufRead> = if file.as_os_str() == "-" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        let handle = std::fs::File::open(file)
            .with_context(|| format!("Failed to open script {:?}", file))?;
        Box::new(BufReader::new(handle))
    };

    let mut failures = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read script line")?;
        let lineno = index + 1;
        let cmd = match GcodeCommand::parse(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) if keep_going => {
                eprintln!("line {}: {}", lineno, e);
                failures += 1;
                continue;
            }
            Err(e) => return Err(e).context(format!("line {}", lineno)),
        };

        println!("> {}", cmd);
        match cmd_run(validator, &cmd, report_json).await {
            Ok(()) => {}
            Err(e) if keep_going => {
                eprintln!("line {}: {:#}", lineno, e);
                failures += 1;
            }
            Err(e) => return Err(e).context(format!("line {}", lineno)),
        }
    }

    if report_json {
        println!("{}", serde_json::to_string_pretty(&validator.status())?);
    }
    if failures > 0 {
        anyhow::bail!("{} command(s) failed", failures);
    }
    Ok(())
}

fn print_outcome(outcome: &CommandOutcome) -> Result<()> {
    let json = serde_json::to_string_pretty(outcome).context("Failed to serialize outcome")?;
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_validate_overrides() {
        let cli = Cli::try_parse_from([
            "mesh-validate",
            "validate",
            "--max-deviation",
            "0.1",
            "--remesh",
            "false",
            "--mesh-min",
            "10,10",
        ])
        .unwrap();
        let Commands::Validate {
            max_deviation,
            save_config,
            remesh,
            mesh_min,
            mesh_max,
        } = cli.command
        else {
            panic!("expected validate");
        };
        let cmd = build_validate_command(max_deviation, save_config, remesh, mesh_min, mesh_max);
        assert_eq!(cmd.name(), VALIDATE_BED_MESH);
        assert_eq!(cmd.get_float_opt("MAX_DEVIATION").unwrap(), Some(0.1));
        assert_eq!(cmd.get_bool_opt("REMESH").unwrap(), Some(false));
        assert_eq!(cmd.get_str_opt("MESH_MIN"), Some("10,10"));
        assert!(!cmd.has("SAVE_CONFIG"));
        assert!(!cmd.has("MESH_MAX"));
    }

    #[test]
    fn test_cli_accepts_negative_coordinates() {
        let cli = Cli::try_parse_from(["mesh-validate", "at", "--x", "-5", "--y", "12.5"]).unwrap();
        let Commands::At { x, y } = cli.command else {
            panic!("expected at");
        };
        assert_eq!((x, y), (-5.0, 12.5));
    }

    #[tokio::test]
    async fn test_script_runs_every_command() {
        use std::io::Write;

        let printer = SimulatedPrinter::new(Default::default());
        let mut validator = BedMeshValidator::new(Default::default()).unwrap();
        validator.bind(printer.collaborators()).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "; nightly check").unwrap();
        writeln!(file, "VALIDATE_BED_MESH_AT X=10 Y=10").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "validate_bed_mesh remesh=false ; no remesh").unwrap();
        let path = file.path().to_path_buf();

        cmd_script(&validator, &path, false, false).await.unwrap();
        assert!(!printer.moves().is_empty());
    }

    #[tokio::test]
    async fn test_script_stops_on_first_failure() {
        use std::io::Write;

        let printer = SimulatedPrinter::new(Default::default());
        let mut validator = BedMeshValidator::new(Default::default()).unwrap();
        validator.bind(printer.collaborators()).unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "VALIDATE_BED_MESH MESH_MIN=abc").unwrap();
        writeln!(file, "VALIDATE_BED_MESH_AT X=10 Y=10").unwrap();
        let path = file.path().to_path_buf();

        let err = cmd_script(&validator, &path, false, false)
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("line 1"));
        assert!(printer.calls().is_empty());
    }
}
