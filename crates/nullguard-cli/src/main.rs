//! nullguard command-line driver.
//!
//! Invoked once per translation unit export. Exit codes: 0 = success (with
//! possibly nonempty diagnostics), 1 = solver/fixpoint interrupted, 2 =
//! invalid configuration or input.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use nullguard_core::config::DEFAULT_CONFIG_TOML;
use nullguard_core::{check_path, infer_path, load_config};
use nullguard_diagnostics::Diagnostic;

#[derive(Parser)]
#[command(name = "nullguard")]
#[command(about = "Pointer nullability checker and inference for C++ translation units")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a translation unit export for nullability violations
    Check {
        /// Path to the frontend's JSON export
        tu: PathBuf,
        /// Output format: human, json
        #[arg(long, default_value = "human")]
        format: String,
    },
    /// Infer annotations for unannotated pointer slots
    Infer {
        /// Path to the frontend's JSON export
        tu: PathBuf,
        /// Override the configured number of inference rounds
        #[arg(long)]
        iterations: Option<u32>,
        /// Output format: human, json
        #[arg(long, default_value = "json")]
        format: String,
    },
    /// Write a default nullguard.toml in the current directory
    Init,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let cwd = std::env::current_dir()?;
    let mut config = load_config(&cwd)?;

    match cli.command {
        Commands::Check { tu, format } => {
            let output = check_path(&tu, &config)?;
            match format.as_str() {
                "json" => {
                    let doc = serde_json::json!({
                        "diagnostics": output.diagnostics,
                        "summary": output.summary,
                        "interrupted": output.interrupted,
                    });
                    println!("{}", serde_json::to_string_pretty(&doc)?);
                }
                _ => {
                    for diag in &output.diagnostics {
                        print_human(diag);
                    }
                    eprintln!(
                        "{} error(s), {} warning(s) across {} function(s)",
                        output.summary.error,
                        output.summary.warning,
                        output.summary.functions_analyzed
                    );
                    for name in &output.interrupted {
                        eprintln!("interrupted: {name}");
                    }
                }
            }
            Ok(exit_code(!output.interrupted.is_empty()))
        }
        Commands::Infer {
            tu,
            iterations,
            format,
        } => {
            if let Some(iterations) = iterations {
                config.inference.iterations = iterations;
            }
            let report = infer_path(&tu, &config)?;
            match format.as_str() {
                "human" => {
                    for (usr, slots) in &report.results {
                        for (index, inference) in slots {
                            println!(
                                "{usr}#{index}: {:?}{}",
                                inference.nullability,
                                if inference.conflict { " (conflict)" } else { "" }
                            );
                        }
                    }
                }
                _ => {
                    println!("{}", serde_json::to_string_pretty(&report.results)?);
                }
            }
            Ok(exit_code(!report.interrupted.is_empty()))
        }
        Commands::Init => {
            let path = cwd.join("nullguard.toml");
            if path.exists() {
                eprintln!("nullguard.toml already exists");
            } else {
                std::fs::write(&path, DEFAULT_CONFIG_TOML)?;
                eprintln!("wrote {}", path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn exit_code(interrupted: bool) -> ExitCode {
    if interrupted {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}

fn print_human(diag: &Diagnostic) {
    let param = diag
        .param_name
        .as_deref()
        .map(|n| format!(" (parameter `{n}`)"))
        .unwrap_or_default();
    println!(
        "{}: {}[{}]: {}{}",
        diag.location, diag.severity, diag.code, diag.explanation, param
    );
}
