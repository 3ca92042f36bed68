//! claravox engine entry point.
//!
//! ## Startup sequence
//!
//! 1. Parse command-line flags.
//! 2. Initialise tracing (env filter, default `claravox=info`).
//! 3. Load the JSON configuration (defaults when absent).
//! 4. Construct and start the [`Engine`].
//! 5. Park until Ctrl-C, then stop cleanly.
//!
//! Exit code 0 on clean shutdown, 1 on initialisation failure (with a
//! one-line cause on stderr).

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::{error, info};

use claravox::audio::device;
use claravox::config::{self, default_config_path};
use claravox::engine::Engine;

const VERSION: &str = env!("CARGO_PKG_VERSION");

struct CliArgs {
    config_path: Option<PathBuf>,
    background: bool,
    list_devices: bool,
}

fn print_usage(program: &str) {
    println!(
        "Usage: {program} [options]\n\
         \n\
         Options:\n\
         \x20 --help, -h          Show this help message\n\
         \x20 --version, -v       Show version information\n\
         \x20 --background, -b    Run without the console banner\n\
         \x20 --config <path>     Path to the configuration file\n\
         \x20 --list-devices      List available audio devices"
    );
}

fn print_banner() {
    println!("claravox {VERSION} — AI-powered virtual microphone enhancement");
}

/// Parse argv. `Ok(None)` means an informational flag already handled.
fn parse_args(args: &[String]) -> Result<Option<CliArgs>, String> {
    let mut parsed = CliArgs {
        config_path: None,
        background: false,
        list_devices: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_usage(&args[0]);
                return Ok(None);
            }
            "--version" | "-v" => {
                println!("claravox {VERSION}");
                return Ok(None);
            }
            "--background" | "-b" => parsed.background = true,
            "--list-devices" => parsed.list_devices = true,
            "--config" => {
                i += 1;
                let path = args
                    .get(i)
                    .ok_or_else(|| "--config requires a path".to_string())?;
                parsed.config_path = Some(PathBuf::from(path));
            }
            other => return Err(format!("unknown argument: {other}")),
        }
        i += 1;
    }
    Ok(Some(parsed))
}

fn list_devices() {
    println!("\n=== Input Devices (Microphones) ===");
    for (i, d) in device::list_input_devices().iter().enumerate() {
        let marker = if d.is_default { " (default)" } else { "" };
        println!("  [{i}] {}{marker}", d.name);
    }

    println!("\n=== Output Devices (Speakers/Virtual) ===");
    for (i, d) in device::list_output_devices().iter().enumerate() {
        let marker = if d.is_default { " (default)" } else { "" };
        println!("  [{i}] {}{marker}", d.name);
    }
    println!();
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let cli = match parse_args(&args) {
        Ok(Some(cli)) => cli,
        Ok(None) => return ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("claravox: {msg}");
            print_usage(&args[0]);
            return ExitCode::from(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "claravox=info".parse().expect("static filter")),
        )
        .init();

    if !cli.background {
        print_banner();
    }

    if cli.list_devices {
        list_devices();
        return ExitCode::SUCCESS;
    }

    let config_path = cli.config_path.unwrap_or_else(default_config_path);
    let config = config::load_config(&config_path);
    info!(config = %config_path.display(), preset = %config.active_preset, "configuration loaded");

    let engine = Engine::new(config);
    if let Err(e) = engine.start() {
        error!("engine failed to start: {e}");
        eprintln!("claravox: {e}");
        return ExitCode::from(1);
    }
    info!("processing audio — press Ctrl+C to stop");

    // Minimal runtime just for the signal future; the data plane runs on
    // its own OS threads.
    let wait_result = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map(|rt| rt.block_on(tokio::signal::ctrl_c()));

    match wait_result {
        Ok(Ok(())) => info!("shutdown signal received"),
        Ok(Err(e)) => error!("signal wait failed: {e}"),
        Err(e) => error!("runtime construction failed: {e}"),
    }

    if let Err(e) = engine.stop() {
        error!("engine stop: {e}");
    }
    info!("claravox shut down cleanly");
    ExitCode::SUCCESS
}
