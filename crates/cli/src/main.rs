use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing::{error, info};
use wirebench_config::{CircuitDescriptor, TestAssertion, TestScript};
use wirebench_core::snapshot::CircuitSnapshot;
use wirebench_core::trace::{self, TraceEvent};
use wirebench_core::ExecutionDriver;

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a trace and check assertions from a test script
    Test(TestArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Path to the circuit description (YAML)
    #[arg(short, long)]
    circuit: Option<PathBuf>,

    /// Path to the recorded engine event trace (YAML or JSON)
    #[arg(short, long)]
    trace: Option<PathBuf>,

    /// Write the final circuit snapshot as JSON
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Enable protocol-level debug logging
    #[arg(long)]
    trace_log: bool,

    /// Do not echo UART output to stdout
    #[arg(long)]
    no_uart_stdout: bool,
}

#[derive(Args, Debug)]
struct TestArgs {
    /// Path to the test script (YAML)
    #[arg(long)]
    script: PathBuf,

    /// Directory for result.json and snapshot.json
    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[arg(long)]
    trace_log: bool,

    #[arg(long)]
    no_uart_stdout: bool,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "snake_case")]
enum Status {
    Pass,
    Fail,
    Error,
}

#[derive(Serialize, Debug)]
struct TestResult {
    status: Status,
    circuit: String,
    trace: String,
    trace_sha256: String,
    events: usize,
    cycles: u64,
    failures: Vec<String>,
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

struct LoadedTrace {
    events: Vec<TraceEvent>,
    sha256: String,
}

fn load_trace(path: &Path) -> anyhow::Result<LoadedTrace> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read trace at {:?}", path))?;
    let sha256 = format!("{:x}", Sha256::digest(&bytes));
    let events: Vec<TraceEvent> =
        serde_yaml::from_slice(&bytes).context("Failed to parse event trace")?;
    Ok(LoadedTrace { events, sha256 })
}

/// Builds the driver, replays the trace and hands back the final snapshot.
fn simulate(
    circuit: &CircuitDescriptor,
    trace: &LoadedTrace,
    echo_uart: bool,
) -> anyhow::Result<CircuitSnapshot> {
    let mut driver = ExecutionDriver::from_config(circuit)?;
    driver.attach_uart_sink(Arc::new(Mutex::new(Vec::new())), echo_uart);
    driver.start();

    let summary = trace::replay(&mut driver, &trace.events);
    info!(
        "Replayed {} events, {} NACKs, {} SPI transfers",
        summary.events,
        summary.nacks,
        summary.spi_replies.len()
    );
    Ok(driver.stop())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))
}

fn run(args: RunArgs) -> anyhow::Result<()> {
    let (Some(circuit_path), Some(trace_path)) = (args.circuit, args.trace) else {
        anyhow::bail!("Both --circuit and --trace are required (or use the 'test' subcommand)");
    };

    info!("Loading circuit description: {:?}", circuit_path);
    let circuit = CircuitDescriptor::from_file(&circuit_path)?;
    info!("Loading event trace: {:?}", trace_path);
    let trace = load_trace(&trace_path)?;
    info!("Trace sha256: {}", trace.sha256);

    let snapshot = simulate(&circuit, &trace, !args.no_uart_stdout)?;

    for led in &snapshot.leds {
        info!("LED {} (pin {}): {}", led.id, led.pin, if led.on { "on" } else { "off" });
    }
    if let Some(text) = snapshot.lcd_text() {
        info!("LCD:\n{}", text);
    }
    if let Some(frame) = &snapshot.matrix {
        info!("Matrix: {} pixels latched", frame.len());
    }
    info!("Simulated time: {} ns", snapshot.time_ns);

    if let Some(path) = args.snapshot {
        write_json(&path, &snapshot)?;
        info!("Snapshot written to {:?}", path);
    }
    Ok(())
}

/// Script inputs are relative to the script's own directory.
fn resolve(script_path: &Path, input: &str) -> PathBuf {
    let input = Path::new(input);
    if input.is_absolute() {
        return input.to_path_buf();
    }
    script_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(input)
}

fn check(assertion: &TestAssertion, snapshot: &CircuitSnapshot) -> Option<String> {
    match assertion {
        TestAssertion::UartContains(a) => (!snapshot.uart.contains(&a.uart_contains))
            .then(|| format!("UART output does not contain {:?}", a.uart_contains)),
        TestAssertion::LcdContains(a) => match snapshot.lcd_text() {
            Some(text) if text.contains(&a.lcd_contains) => None,
            Some(_) => Some(format!("LCD text does not contain {:?}", a.lcd_contains)),
            None => Some("No LCD in circuit".to_string()),
        },
        TestAssertion::LedOn(a) => match snapshot.led(&a.led_on) {
            Some(on) if on == a.expected => None,
            Some(on) => Some(format!(
                "LED '{}' is {}, expected {}",
                a.led_on,
                if on { "on" } else { "off" },
                if a.expected { "on" } else { "off" }
            )),
            None => Some(format!("Unknown LED '{}'", a.led_on)),
        },
    }
}

fn run_test(args: &TestArgs) -> anyhow::Result<u8> {
    let script = TestScript::from_file(&args.script)?;
    let circuit_path = resolve(&args.script, &script.inputs.circuit);
    let trace_path = resolve(&args.script, &script.inputs.trace);

    let circuit = CircuitDescriptor::from_file(&circuit_path)?;
    let trace = load_trace(&trace_path)?;
    let events = trace.events.len();
    let snapshot = simulate(&circuit, &trace, !args.no_uart_stdout)?;

    let failures: Vec<String> = script
        .assertions
        .iter()
        .filter_map(|a| check(a, &snapshot))
        .collect();
    for failure in &failures {
        error!("Assertion failed: {}", failure);
    }

    let result = TestResult {
        status: if failures.is_empty() {
            Status::Pass
        } else {
            Status::Fail
        },
        circuit: circuit_path.display().to_string(),
        trace: trace_path.display().to_string(),
        trace_sha256: trace.sha256,
        events,
        cycles: snapshot.cycles,
        failures,
    };

    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {:?}", dir))?;
        write_json(&dir.join("result.json"), &result)?;
        write_json(&dir.join("snapshot.json"), &snapshot)?;
    }

    info!(
        "Test {:?}: {}/{} assertions passed",
        result.status,
        script.assertions.len() - result.failures.len(),
        script.assertions.len()
    );

    Ok(if result.failures.is_empty() {
        EXIT_PASS
    } else {
        EXIT_ASSERT_FAIL
    })
}

/// Records a setup failure in result.json so CI still gets an artifact.
fn write_error_result(args: &TestArgs, err: &anyhow::Error) {
    let Some(dir) = &args.output_dir else {
        return;
    };
    let result = TestResult {
        status: Status::Error,
        circuit: String::new(),
        trace: String::new(),
        trace_sha256: String::new(),
        events: 0,
        cycles: 0,
        failures: vec![format!("{:#}", err)],
    };
    if std::fs::create_dir_all(dir).is_ok() {
        let _ = write_json(&dir.join("result.json"), &result);
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Test(args)) => {
            init_logging(args.trace_log);
            info!("Starting Wirebench test run");
            match run_test(&args) {
                Ok(code) => ExitCode::from(code),
                Err(e) => {
                    error!("{:#}", e);
                    write_error_result(&args, &e);
                    ExitCode::from(EXIT_CONFIG_ERROR)
                }
            }
        }
        None => {
            init_logging(cli.run.trace_log);
            info!("Starting Wirebench");
            match run(cli.run) {
                Ok(()) => ExitCode::from(EXIT_PASS),
                Err(e) => {
                    error!("{:#}", e);
                    ExitCode::from(EXIT_CONFIG_ERROR)
                }
            }
        }
    }
}
