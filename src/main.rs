use std::sync::{Arc, Mutex};

use tokio::time::Duration;
use tracing::error;

use ddb_stress::cancel;
use ddb_stress::config::Config;
use ddb_stress::logging::init_tracing;
use ddb_stress::metrics::{gather_metrics_string, register_metrics, start_metrics_server};
use ddb_stress::payload::KeyValues;
use ddb_stress::provider::{DynamoDbProvider, OperationProvider, SimulatedProvider};
use ddb_stress::report::format_summary_table;
use ddb_stress::runner;

/// Exit code after an interrupt, as shells report SIGINT.
const EXIT_CANCELLED: i32 = 130;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = match Config::try_parse_with_env(std::env::args_os()) {
        Ok(c) => c,
        Err(e) => e.exit(),
    };

    init_tracing(config.verbose, config.log_json);
    register_metrics()?;

    // Fail on bad parameters before any client is built
    let run_config = config.to_run_config();
    if let Err(e) = run_config.validate() {
        error!(error = %e, "Configuration error");
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    }

    config.print_summary();

    let provider: Arc<dyn OperationProvider> = if config.dry_run {
        Arc::new(
            SimulatedProvider::new()
                .with_latency(Duration::from_millis(config.dry_run_latency_ms)),
        )
    } else {
        let key_values = match &config.key_values_file {
            Some(path) => KeyValues::from_file(path)?,
            None => KeyValues::builtin(),
        };
        Arc::new(
            DynamoDbProvider::connect(
                &config.table_region,
                config.profile.as_deref(),
                config.table_name.clone(),
                key_values,
            )
            .await,
        )
    };

    let registry_arc = Arc::new(Mutex::new(prometheus::default_registry().clone()));
    if let Some(port) = config.metrics_port {
        let registry = registry_arc.clone();
        tokio::spawn(async move {
            start_metrics_server(port, registry).await;
        });
    }

    let (cancel_handle, cancel_signal) = cancel::channel();
    cancel_handle.cancel_on_ctrl_c();

    let result = runner::run(&run_config, provider, cancel_signal).await;

    println!("{}", format_summary_table(&result));
    if config.metrics_port.is_some() {
        println!("\n--- FINAL METRICS ---\n{}", gather_metrics_string(&registry_arc));
        println!("--- END OF FINAL METRICS ---\n");
    }

    if result.cancelled && result.error.is_none() {
        std::process::exit(EXIT_CANCELLED);
    }
    if !result.success {
        std::process::exit(1);
    }

    Ok(())
}
