mod commands;

use cfgmend_core::{install_signal_handler, RunOptions};
use cfgmend_schema::ReportFormat;
use clap::{Parser, Subcommand, ValueEnum};
use commands::{EXIT_FAILURE, EXIT_INPUT_ERROR, EXIT_ORACLE_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "cfgmend",
    version,
    about = "Layered build configuration merging with dependency-aware reconciliation"
)]
struct Cli {
    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for ReportFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Merge config fragments in order; later fragments win.
    Merge {
        /// Fragment files, lowest precedence first.
        #[arg(required = true)]
        layers: Vec<PathBuf>,
        /// Write the merged config here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show enabled features added or removed between two config files.
    Diff { before: PathBuf, after: PathBuf },
    /// Merge, normalize, restore dropped features, and write the results.
    Reconcile {
        /// Path to pipeline manifest.
        #[arg(default_value = "cfgmend.toml")]
        manifest: PathBuf,
        /// Final config path (overrides output.config).
        #[arg(long)]
        output_config: Option<PathBuf>,
        /// Report path (overrides output.report).
        #[arg(long)]
        report: Option<PathBuf>,
        /// Report file format (overrides output.report_format).
        #[arg(long, value_enum)]
        report_format: Option<FormatArg>,
        /// Exit with status 4 when any required feature stays unresolved.
        #[arg(long, default_value_t = false)]
        fail_on_unresolved: bool,
    },
    /// Query the configured metadata service for a package's dependencies.
    Deps {
        package: String,
        #[arg(default_value = "cfgmend.toml")]
        manifest: PathBuf,
    },
    /// Check that a pipeline can run.
    Doctor {
        #[arg(default_value = "cfgmend.toml")]
        manifest: PathBuf,
        /// Also normalize the merged config twice and report drift.
        #[arg(long, default_value_t = false)]
        check_idempotence: bool,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("CFGMEND_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();
    tracing::debug!("cfgmend {}", env!("CARGO_PKG_VERSION"));

    let json_output = cli.json;
    let result = match cli.command {
        Commands::Merge { layers, output } => {
            commands::merge::run(&layers, output.as_deref(), json_output)
        }
        Commands::Diff { before, after } => commands::diff::run(&before, &after, json_output),
        Commands::Reconcile {
            manifest,
            output_config,
            report,
            report_format,
            fail_on_unresolved,
        } => commands::reconcile::run(
            &manifest,
            &RunOptions {
                output_config,
                report,
                report_format: report_format.map(Into::into),
            },
            fail_on_unresolved,
            json_output,
        ),
        Commands::Deps { package, manifest } => {
            commands::deps::run(&package, &manifest, json_output)
        }
        Commands::Doctor {
            manifest,
            check_idempotence,
        } => commands::doctor::run(&manifest, check_idempotence, json_output),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}

fn exit_code_for(msg: &str) -> u8 {
    if msg.starts_with("manifest error:")
        || msg.starts_with("layer error:")
        || msg.starts_with("runtime error:")
        || msg.starts_with("build tree not found")
    {
        EXIT_INPUT_ERROR
    } else if msg.starts_with("oracle error:") {
        EXIT_ORACLE_ERROR
    } else {
        EXIT_FAILURE
    }
}
