// ErrWatch - Hardware Error Event Framework
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod system;

use clap::{Parser, Subcommand, ValueEnum};
use errwatch_core::CollectMode;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

use crate::system::{parse_injection, SimulatedSystem};

const EXIT_PASS: u8 = 0;
const EXIT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

#[derive(Parser, Debug)]
#[command(author, version, about = "ErrWatch hardware error event monitor", long_about = None)]
struct Cli {
    /// Enable debug-level logging
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Inject faults into the simulated controllers, collect and print counters.
    Run(RunArgs),

    /// Run the fault-injection self-test on every module.
    Selftest(SelftestArgs),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Interrupt,
    Polling,
    All,
}

impl From<ModeArg> for CollectMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Interrupt => CollectMode::Interrupt,
            ModeArg::Polling => CollectMode::Polling,
            ModeArg::All => CollectMode::Default,
        }
    }
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the system descriptor (YAML)
    #[arg(short, long)]
    system: PathBuf,

    /// Fault to inject before collecting, as MODULE:FIELD_ID (repeatable)
    #[arg(short, long, value_parser = parse_injection)]
    inject: Vec<(String, u32)>,

    /// Which fields to collect
    #[arg(short, long, value_enum, default_value = "all")]
    mode: ModeArg,

    /// Write the counter report (JSON) to this path
    #[arg(long)]
    json: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct SelftestArgs {
    /// Path to the system descriptor (YAML)
    #[arg(short, long)]
    system: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Selftest(args) => selftest(args),
    }
}

fn load(path: &Path) -> Result<SimulatedSystem, ExitCode> {
    SimulatedSystem::from_file(path).map_err(|e| {
        error!("{:#}", e);
        ExitCode::from(EXIT_CONFIG_ERROR)
    })
}

fn run(args: RunArgs) -> ExitCode {
    let mut sys = match load(&args.system) {
        Ok(sys) => sys,
        Err(code) => return code,
    };
    info!(system = %sys.descriptor.name, modules = sys.context.modules().len(), "System ready");

    for (module, field) in &args.inject {
        if let Err(e) = sys.inject(module, *field) {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    }

    let errors = sys.context.collect_all(args.mode.into());
    sys.context.print_all();

    if let Some(path) = &args.json {
        let doc = serde_json::json!({
            "system": sys.descriptor.name,
            "report": sys.context.report(),
            "controllers": sys.controller_snapshot(),
        });
        let written = std::fs::File::create(path)
            .map_err(anyhow::Error::from)
            .and_then(|f| serde_json::to_writer_pretty(f, &doc).map_err(anyhow::Error::from));
        if let Err(e) = written {
            error!("Failed to write report {:?}: {}", path, e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    }

    if errors.is_empty() {
        ExitCode::from(EXIT_PASS)
    } else {
        ExitCode::from(EXIT_RUNTIME_ERROR)
    }
}

fn selftest(args: SelftestArgs) -> ExitCode {
    let mut sys = match load(&args.system) {
        Ok(sys) => sys,
        Err(code) => return code,
    };

    let mut pass = true;
    let names: Vec<String> = sys
        .context
        .modules()
        .iter()
        .map(|m| m.name().to_string())
        .collect();
    for name in names {
        let ok = sys.context.self_test(&name).unwrap_or(false);
        println!("{}: {}", name, if ok { "PASS" } else { "FAIL" });
        pass &= ok;
    }

    if pass {
        println!("Self-test PASSED");
        ExitCode::from(EXIT_PASS)
    } else {
        println!("Self-test FAILED");
        ExitCode::from(EXIT_FAIL)
    }
}
