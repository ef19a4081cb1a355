use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Request, Response, Server};
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use std::env;
use std::sync::{Arc, Mutex};
use tracing::{error, info};

lazy_static::lazy_static! {
    pub static ref METRIC_NAMESPACE: String =
        env::var("METRIC_NAMESPACE").unwrap_or_else(|_| "ddb_stress".to_string());

    pub static ref OPERATIONS_TOTAL: IntCounterVec =
        IntCounterVec::new(
            Opts::new("operations_total", "Total number of dispatched operations")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["direction"]
        ).unwrap();

    pub static ref OPERATION_ERRORS_BY_CATEGORY: IntCounterVec =
        IntCounterVec::new(
            Opts::new("operation_errors_total", "Failed operations by error category")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["direction", "category"]
        ).unwrap();

    pub static ref CAPACITY_UNITS_CONSUMED: CounterVec =
        CounterVec::new(
            Opts::new("capacity_units_consumed_total", "Capacity units reported by the storage service")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["direction"]
        ).unwrap();

    pub static ref OPERATION_DURATION_SECONDS: HistogramVec =
        HistogramVec::new(
            HistogramOpts::new(
                "operation_duration_seconds",
                "Operation latencies in seconds."
            ).namespace(METRIC_NAMESPACE.as_str()),
            &["direction"]
        ).unwrap();

    pub static ref WINDOW_OPERATIONS: IntGaugeVec =
        IntGaugeVec::new(
            Opts::new("window_operations", "Operations completed in the last closed window")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["direction"]
        ).unwrap();

    pub static ref TARGET_RATE: GaugeVec =
        GaugeVec::new(
            Opts::new("target_rate", "Configured operations per one-second window")
                .namespace(METRIC_NAMESPACE.as_str()),
            &["direction"]
        ).unwrap();
}

/// Registers all metrics with the default Prometheus registry.
pub fn register_metrics() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    prometheus::default_registry().register(Box::new(OPERATIONS_TOTAL.clone()))?;
    prometheus::default_registry().register(Box::new(OPERATION_ERRORS_BY_CATEGORY.clone()))?;
    prometheus::default_registry().register(Box::new(CAPACITY_UNITS_CONSUMED.clone()))?;
    prometheus::default_registry().register(Box::new(OPERATION_DURATION_SECONDS.clone()))?;
    prometheus::default_registry().register(Box::new(WINDOW_OPERATIONS.clone()))?;
    prometheus::default_registry().register(Box::new(TARGET_RATE.clone()))?;

    Ok(())
}

fn encode(registry: &Mutex<Registry>) -> Result<Vec<u8>, prometheus::Error> {
    let metric_families = match registry.lock() {
        Ok(registry) => registry.gather(),
        Err(poisoned) => poisoned.into_inner().gather(),
    };
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}

/// HTTP handler for the Prometheus metrics endpoint.
pub async fn metrics_handler(
    _req: Request<Body>,
    registry: Arc<Mutex<Registry>>,
) -> Result<Response<Body>, hyper::Error> {
    let response = match encode(&registry) {
        Ok(buffer) => {
            let mut response = Response::new(Body::from(buffer));
            if let Ok(content_type) = TextEncoder::new().format_type().parse() {
                response
                    .headers_mut()
                    .insert(hyper::header::CONTENT_TYPE, content_type);
            }
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            let mut response = Response::new(Body::from("failed to encode metrics"));
            *response.status_mut() = hyper::StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    };

    Ok(response)
}

/// Starts the Prometheus metrics HTTP server.
pub async fn start_metrics_server(port: u16, registry: Arc<Mutex<Registry>>) {
    let addr = ([0, 0, 0, 0], port).into();

    let make_svc = make_service_fn(move |_conn| {
        let registry_clone = registry.clone();
        async move {
            Ok::<_, hyper::Error>(service_fn(move |req| {
                let registry_clone_inner = registry_clone.clone();
                async move { metrics_handler(req, registry_clone_inner).await }
            }))
        }
    });

    let server = Server::bind(&addr).serve(make_svc);
    info!(
        port = port,
        addr = %addr,
        "Metrics server listening"
    );

    if let Err(e) = server.await {
        error!(error = %e, "Metrics server error");
    }
}

/// Gathers and encodes metrics as a string for final output.
pub fn gather_metrics_string(registry: &Arc<Mutex<Registry>>) -> String {
    match encode(registry) {
        Ok(buffer) => String::from_utf8(buffer).unwrap_or_else(|e| {
            error!(error = %e, "Error encoding metrics to UTF-8");
            String::from("# ERROR ENCODING METRICS TO UTF-8")
        }),
        Err(e) => format!("# ERROR ENCODING METRICS: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_metrics_string_includes_registered_metric() {
        let registry = Registry::new();
        registry.register(Box::new(OPERATIONS_TOTAL.clone())).unwrap();
        OPERATIONS_TOTAL.with_label_values(&["read"]).inc();

        let output = gather_metrics_string(&Arc::new(Mutex::new(registry)));
        assert!(output.contains("operations_total"), "output was: {}", output);
        assert!(output.contains("direction=\"read\""));
    }
}
