//! Simulator Demon - boots iOS simulators, runs apps and watches them
//!
//! This is the binary entry point. Session logic lives in `simdemon-app`.

mod headless;
mod signals;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};

use simdemon_app::{load_settings, LaunchOptions, SimctlSupervisor, SupervisorConfig};
use simdemon_core::DetectionResult;
use simdemon_daemon::{AppBuilder, XcodeBuilder, XcodeDiscovery};

use headless::NdjsonEvent;

/// Simulator Demon - iOS simulator session manager
#[derive(Parser, Debug)]
#[command(name = "simdemon")]
#[command(about = "Boot iOS simulators, launch apps and follow their logs", long_about = None)]
struct Cli {
    /// Directory holding `.simdemon/config.toml` (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List installed simulators
    Detect {
        /// Print the full detection result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Boot a simulator and optionally run an app on it (NDJSON on stdout)
    Launch(LaunchArgs),

    /// Build an Xcode scheme for the simulator and print the `.app` path
    Build {
        #[arg(value_name = "SCHEME")]
        scheme: String,

        #[arg(long, value_name = "DIR")]
        project_dir: PathBuf,

        /// OS version constraint, e.g. `17.x`
        #[arg(long = "os", value_name = "CONSTRAINT")]
        os_version: Option<String>,

        /// Preprocessor definition, repeatable
        #[arg(long = "define", value_name = "D")]
        defines: Vec<String>,
    },
}

#[derive(Args, Debug)]
struct LaunchArgs {
    /// Simulator to boot; the newest matching simulator when omitted
    #[arg(value_name = "UDID")]
    udid: Option<String>,

    /// Built `.app` to install and run
    #[arg(long, value_name = "PATH")]
    app: Option<PathBuf>,

    /// Run an already installed app
    #[arg(long, value_name = "ID", conflicts_with = "app")]
    bundle_id: Option<String>,

    /// Quit the app once it goes quiet and tear the session down
    #[arg(long)]
    auto_exit: bool,

    /// Keep the Simulator window in the background
    #[arg(long)]
    hide: bool,

    /// Also run the watch app on the paired watch simulator
    #[arg(long)]
    watch: bool,

    /// Fail instead of continuing without the watch
    #[arg(long, requires = "watch")]
    watch_required: bool,

    /// Watch simulator to pair with
    #[arg(long, value_name = "UDID", requires = "watch")]
    watch_udid: Option<String>,

    /// OS version constraint for picking the simulator
    #[arg(long = "os", value_name = "VERSION")]
    os_version: Option<String>,

    /// Log file the app writes under its `Documents/` directory
    #[arg(long = "log-file", value_name = "NAME")]
    log_file: Option<String>,

    /// Shut the simulator down first if it is already booted
    #[arg(long)]
    kill_if_running: bool,

    /// Boot timeout in seconds
    #[arg(long, value_name = "SECS")]
    boot_timeout: Option<u64>,
}

impl LaunchArgs {
    fn options(&self) -> LaunchOptions {
        let mut options = LaunchOptions::new()
            .auto_exit(self.auto_exit)
            .hide(self.hide)
            .launch_watch_app(self.watch)
            .watch_required(self.watch_required)
            .kill_if_running(self.kill_if_running);
        options.app_path = self.app.clone();
        options.launch_bundle_id = self.bundle_id.clone();
        options.watch_udid = self.watch_udid.clone();
        options.os_version = self.os_version.clone();
        options.log_filename = self.log_file.clone();
        options.boot_timeout = self.boot_timeout.map(Duration::from_secs);
        options
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    simdemon_core::logging::init()?;

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };
    let config = SupervisorConfig::from(load_settings(&config_dir));

    match cli.command {
        Command::Detect { json } => detect(config, json).await,
        Command::Launch(args) => launch(config, &args).await,
        Command::Build {
            scheme,
            project_dir,
            os_version,
            defines,
        } => {
            let builder = XcodeBuilder::new(XcodeDiscovery::new(), project_dir);
            let app = builder
                .build(&scheme, os_version.as_deref(), &defines)
                .await?;
            println!("{}", app.display());
            Ok(())
        }
    }
}

async fn detect(config: SupervisorConfig, json: bool) -> Result<()> {
    let result = SimctlSupervisor::system(config).detect().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_detection(&result);
    }

    if result.is_empty() && result.has_errors() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_detection(result: &DetectionResult) {
    for (os, devices) in result.simulators.iter().chain(&result.watch_simulators) {
        println!("{}", os);
        for device in devices {
            let paired = result
                .companion_for(&device.udid)
                .map(|w| format!("  (watch: {})", w.udid))
                .unwrap_or_default();
            println!("  {:<32} {}{}", device.name, device.udid, paired);
        }
    }

    for issue in &result.issues {
        eprintln!("[{}] {}: {}", issue.severity, issue.id, issue.message);
    }
}

async fn launch(config: SupervisorConfig, args: &LaunchArgs) -> Result<()> {
    let supervisor = SimctlSupervisor::system(config);
    let mut stream = supervisor.launch(args.udid.as_deref(), args.options());
    signals::spawn_signal_handler(stream.handle().clone());

    let mut failure = None;
    while let Some(event) = stream.next().await {
        NdjsonEvent::from_lifecycle(&event).emit();
        if let simdemon_app::LifecycleEvent::Error(e) = event {
            failure = Some(e);
        }
    }

    match failure {
        Some(e) => Err(eyre!(e)),
        None => Ok(()),
    }
}
