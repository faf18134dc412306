// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

use thumbulator_core::memory::{image_words, words_to_le_bytes, RAM_WORDS, ROM_WORDS};
use thumbulator_core::metrics::ExecutionMetrics;
use thumbulator_core::snapshot::ThumbSnapshot;
use thumbulator_core::{StopReason, ThumbConfig, ThumbError, Thumbulator};

const EXIT_CLEAN: u8 = 0;
const EXIT_FATAL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;

const RESULT_SCHEMA_VERSION: &str = "1.0";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Run a cartridge's Thumb coprocessor code to completion",
    long_about = None
)]
struct Cli {
    /// Path to the ROM image (little-endian half-words)
    #[arg(short, long)]
    rom: PathBuf,

    /// Optional initial RAM image (little-endian half-words)
    #[arg(long)]
    ram: Option<PathBuf>,

    /// Interpreter options (YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable instruction-level execution tracing
    #[arg(short, long)]
    trace: bool,

    /// Write the RAM contents after the run
    #[arg(long)]
    dump_ram: Option<PathBuf>,

    /// Write a state snapshot (JSON) after the run
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Print a one-line JSON summary on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct RunSummary {
    result_schema_version: &'static str,
    status: &'static str,
    stop_reason: StopReason,
    #[serde(flatten)]
    metrics: ExecutionMetrics,
}

#[derive(Debug, Serialize)]
struct SnapshotFile<'a> {
    snapshot_schema_version: &'static str,
    rom: &'a Path,
    stop_reason: StopReason,
    cpu: &'a ThumbSnapshot,
}

struct Inputs {
    rom: Vec<u16>,
    ram: Vec<u16>,
    config: ThumbConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Per-instruction events are emitted at TRACE.
    let level = if cli.trace {
        tracing::Level::TRACE
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let inputs = match load_inputs(&cli) {
        Ok(inputs) => inputs,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    run(&cli, inputs)
}

fn load_inputs(cli: &Cli) -> anyhow::Result<Inputs> {
    let rom_bytes =
        std::fs::read(&cli.rom).with_context(|| format!("Failed to read ROM {:?}", cli.rom))?;
    info!("Loaded ROM {:?} ({} bytes)", cli.rom, rom_bytes.len());
    let rom = image_words(&rom_bytes, ROM_WORDS);

    let ram = match &cli.ram {
        Some(path) => {
            let bytes =
                std::fs::read(path).with_context(|| format!("Failed to read RAM {:?}", path))?;
            info!("Loaded RAM {:?} ({} bytes)", path, bytes.len());
            image_words(&bytes, RAM_WORDS)
        }
        None => vec![0; RAM_WORDS],
    };

    let mut config = match &cli.config {
        Some(path) => ThumbConfig::from_file(path)?,
        None => ThumbConfig::default(),
    };
    if cli.trace {
        config.trace_instructions = true;
    }

    Ok(Inputs { rom, ram, config })
}

fn run(cli: &Cli, inputs: Inputs) -> ExitCode {
    let Inputs {
        rom,
        mut ram,
        config,
    } = inputs;

    let (stop_reason, snapshot) = {
        let mut cpu = Thumbulator::with_config(&rom, &mut ram, config);
        let stop_reason = match cpu.run() {
            Ok(reason) => reason,
            Err(ThumbError::Fatal { reason, snapshot }) => {
                error!("Fatal stop ({})\n{}", reason, snapshot);
                reason
            }
            Err(e) => {
                error!("{}", e);
                return ExitCode::from(EXIT_FATAL);
            }
        };
        (stop_reason, cpu.snapshot())
    };

    info!("Stopped: {} ({})", stop_reason, snapshot.metrics);

    let mut io_failed = false;

    if let Some(path) = &cli.dump_ram {
        if let Err(e) = write_file(path, &words_to_le_bytes(&ram)) {
            error!("{:#}", e);
            io_failed = true;
        }
    }

    if let Some(path) = &cli.snapshot {
        let file = SnapshotFile {
            snapshot_schema_version: RESULT_SCHEMA_VERSION,
            rom: &cli.rom,
            stop_reason,
            cpu: &snapshot,
        };
        let written = serde_json::to_vec_pretty(&file)
            .context("Failed to serialize snapshot")
            .and_then(|bytes| write_file(path, &bytes));
        if let Err(e) = written {
            error!("{:#}", e);
            io_failed = true;
        }
    }

    if cli.json {
        let summary = RunSummary {
            result_schema_version: RESULT_SCHEMA_VERSION,
            status: if stop_reason.is_fatal() { "fatal" } else { "ok" },
            stop_reason,
            metrics: snapshot.metrics,
        };
        match serde_json::to_string(&summary) {
            Ok(line) => println!("{}", line),
            Err(e) => {
                error!("Failed to serialize run summary: {}", e);
                io_failed = true;
            }
        }
    }

    if io_failed {
        ExitCode::from(EXIT_CONFIG_ERROR)
    } else if stop_reason.is_fatal() {
        ExitCode::from(EXIT_FATAL)
    } else {
        ExitCode::from(EXIT_CLEAN)
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    std::fs::write(path, bytes).with_context(|| format!("Failed to write {:?}", path))
}
