use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;

use riskmon_service::config::AlertConfiguration;
use riskmon_service::db::{AlertStore, PostgresAlertStore};
use riskmon_service::engine::{EngineError, RiskEngine};
use riskmon_service::logging::{self, Component};
use riskmon_service::model::{GeoPoint, Severity};
use riskmon_service::verify;

#[derive(Parser)]
#[command(name = "riskmon_service", about = "Environmental risk scoring and alerting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forecast cyclone formation for configured regions and print JSON
    Forecast {
        /// Only this region (default: all configured regions)
        #[arg(long)]
        region: Option<String>,
        /// Forecast horizon in days, 1 to 14
        #[arg(long)]
        days: Option<u32>,
        /// Also raise and dispatch alerts for the candidates
        #[arg(long)]
        alert: bool,
    },
    /// Score every domain at one point
    Assess {
        #[arg(long, allow_negative_numbers = true)]
        lat: f64,
        #[arg(long, allow_negative_numbers = true)]
        lng: f64,
    },
    /// Probe the observation source at every region's sample points
    Verify {
        /// Print the full report as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },
    /// Run a forecast for every region, then list active alerts of one severity
    Alerts {
        /// low, moderate, high or critical
        #[arg(long, default_value = "high")]
        severity: Severity,
        #[arg(long)]
        days: Option<u32>,
    },
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(body) => println!("{body}"),
        Err(e) => logging::error(Component::System, None, &format!("cannot encode output: {e}")),
    }
}

/// Connects before the async runtime starts: the `postgres` client blocks.
fn connect_store(config: &AlertConfiguration) -> Option<Arc<dyn AlertStore>> {
    let url = config.database.url.as_deref()?;
    match PostgresAlertStore::connect(url) {
        Ok(store) => {
            logging::info(Component::Store, None, "connected to database");
            Some(Arc::new(store))
        }
        Err(e) => {
            logging::warn(Component::Store, None, &format!("database unavailable, not persisting: {e}"));
            None
        }
    }
}

async fn run(engine: &RiskEngine, command: Commands) -> Result<(), EngineError> {
    match command {
        Commands::Forecast { region, days, alert } => {
            let names: Vec<String> = match region {
                Some(name) => vec![name],
                None => engine.config().regions.iter().map(|r| r.name.clone()).collect(),
            };
            let mut forecasts = Vec::with_capacity(names.len());
            for name in &names {
                let forecast = engine.predict_region(name, days).await?;
                if alert {
                    let outcome = engine.process_formation_predictions(&forecast.candidates).await;
                    logging::info(
                        Component::Alert,
                        Some(name),
                        &format!("{} alert(s) raised, {} suppressed", outcome.appended.len(), outcome.suppressed),
                    );
                }
                forecasts.push(forecast);
            }
            print_json(&forecasts);
        }
        Commands::Assess { lat, lng } => {
            let assessment = engine.assess_point(GeoPoint::new(lat, lng)).await;
            print_json(&assessment);
        }
        Commands::Verify { json } => {
            let Some(source) = engine.source() else {
                logging::error(Component::Source, None, "no observation source configured");
                return Ok(());
            };
            let report =
                verify::run_verification(source, &engine.config().regions, engine.config().engine.fetch_timeout()).await;
            if json {
                print_json(&report);
            } else {
                verify::print_summary(&report);
            }
        }
        Commands::Alerts { severity, days } => {
            for region in &engine.config().regions {
                let forecast = engine.predict_region(&region.name, days).await?;
                engine.process_formation_predictions(&forecast.candidates).await;
            }
            print_json(&engine.get_alerts_by_severity(severity));
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AlertConfiguration::from_env() {
        Ok(config) => config,
        Err(e) => {
            logging::init_logger("info");
            logging::error(Component::System, None, &format!("refusing to start: {e}"));
            return ExitCode::FAILURE;
        }
    };
    logging::init_logger(&config.engine.log_level);

    let store = connect_store(&config);
    let mut builder = RiskEngine::builder(config);
    if let Some(store) = store {
        builder = builder.store(store);
    }
    let engine = match builder.build() {
        Ok(engine) => engine,
        Err(e) => {
            logging::error(Component::System, None, &format!("refusing to start: {e}"));
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            logging::error(Component::System, None, &format!("cannot start runtime: {e}"));
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(&engine, cli.command));
    // The engine owns the blocking database client; drop it off the runtime.
    drop(runtime);
    drop(engine);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            logging::error(Component::System, None, &e.to_string());
            ExitCode::FAILURE
        }
    }
}
