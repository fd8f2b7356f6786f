//! appliance-sil entry point: CLI wiring and scenario execution.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use appliance_sil::config::ScenarioConfig;
use appliance_sil::io::export::{export_trace_csv, write_reports_csv};
use appliance_sil::scenario::Scenario;

#[derive(Parser, Debug)]
#[command(name = "appliance-sil")]
#[command(about = "Heater and electric meter co-simulation for MIL/SIL testing")]
struct Cli {
    /// Load the scenario from a TOML file
    #[arg(long, conflicts_with = "preset")]
    scenario: Option<PathBuf>,

    /// Use a built-in preset (baseline, integration, cold_day)
    #[arg(long)]
    preset: Option<String>,

    /// Override the simulation mode (mil, sil, hil)
    #[arg(long)]
    mode: Option<String>,

    /// Override the real-time acceleration factor
    #[arg(long)]
    acceleration: Option<f64>,

    /// Override the random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Export the variable trace to CSV
    #[arg(long)]
    trace_out: Option<PathBuf>,

    /// Export the final reports to CSV
    #[arg(long)]
    reports_out: Option<PathBuf>,

    /// Start the REST API server after the run
    #[cfg(feature = "api")]
    #[arg(long)]
    serve: bool,

    /// API server port
    #[cfg(feature = "api")]
    #[arg(long, default_value = "3000")]
    port: u16,
}

fn fail(message: impl std::fmt::Display) -> ! {
    error!("{message}");
    eprintln!("error: {message}");
    process::exit(1);
}

fn load_config(cli: &Cli) -> ScenarioConfig {
    let loaded = if let Some(ref path) = cli.scenario {
        ScenarioConfig::from_toml_file(path)
    } else {
        ScenarioConfig::from_preset(cli.preset.as_deref().unwrap_or("baseline"))
    };
    let mut config = loaded.unwrap_or_else(|e| fail(e));

    if let Some(ref mode) = cli.mode {
        config.simulation.mode = mode.clone();
    }
    if let Some(acceleration) = cli.acceleration {
        config.simulation.acceleration = acceleration;
    }
    if let Some(seed) = cli.seed {
        config.simulation.seed = seed;
    }
    config
}

fn write_reports(path: &Path, reports: &[appliance_sil::sim::FinalReport]) -> std::io::Result<()> {
    let file = File::create(path)?;
    write_reports_csv(reports, BufWriter::new(file))
}

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "appliance_sil=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli);

    let scenario = match Scenario::from_config(&config) {
        Ok(s) => s,
        Err(errors) => {
            for e in &errors {
                eprintln!("{e}");
            }
            process::exit(1);
        }
    };

    let outcome = scenario.run().unwrap_or_else(|e| fail(e));

    for report in &outcome.reports {
        println!("{report}");
    }

    if let Some(ref path) = cli.trace_out {
        if let Err(e) = export_trace_csv(&outcome.trace, path) {
            fail(format!("failed to write trace CSV: {e}"));
        }
        eprintln!("Trace written to {}", path.display());
    }
    if let Some(ref path) = cli.reports_out {
        if let Err(e) = write_reports(path, &outcome.reports) {
            fail(format!("failed to write reports CSV: {e}"));
        }
        eprintln!("Reports written to {}", path.display());
    }

    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;
        use std::sync::Arc;

        let state = Arc::new(appliance_sil::api::AppState::new(
            scenario.mode,
            scenario.architecture.clone(),
            scenario.duration_h,
            outcome,
        ));
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let rt = tokio::runtime::Runtime::new()
            .unwrap_or_else(|e| fail(format!("failed to create tokio runtime: {e}")));
        if let Err(e) = rt.block_on(appliance_sil::api::serve(state, addr)) {
            fail(format!("API server stopped: {e}"));
        }
    }
}
