//! Prometheus metrics for the conveyor controller.

use conveyor_spine::tags;
use prometheus::{Encoder, Gauge, IntCounter, Registry, TextEncoder};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Cycle Metrics
// ============================================================================

/// Total controller cycles executed
pub static CYCLES_EXECUTED: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new("conveyor_cycles_executed_total", "Total controller cycles executed")
        .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Device Metrics
// ============================================================================

/// Device transactions that failed at the transport level
pub static DEVICE_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "conveyor_device_failures_total",
        "Device transactions that failed to connect, timed out, or got no response",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Responses that arrived but could not be decoded
pub static FRAME_ERRORS: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "conveyor_frame_errors_total",
        "Device responses rejected by the frame decoder",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Telemetry batches the broker did not accept
pub static PUBLISH_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    let counter = IntCounter::new(
        "conveyor_publish_failures_total",
        "Telemetry batches that failed to publish",
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Process State Metrics
// ============================================================================

fn gauge(tag: tags::Tag, help: &str) -> Gauge {
    let gauge = Gauge::new(tag.metric, help).unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
}

pub static ENABLED: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::ENABLE_STATE, "Enable permissive (1=enabled)"));

pub static RUNNING: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::RUN_STATE, "Run state (1=running)"));

/// Sequence step (0=stopped,1=transitioning,2=running)
pub static STEP: LazyLock<Gauge> = LazyLock::new(|| {
    gauge(tags::STEP, "Sequence step (0=stopped,1=transitioning,2=running)")
});

pub static VOLTAGE_FAULT: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::VOLTAGE_FAULT, "Supply voltage fault input (1=fault)"));

pub static CURRENT_FAULT: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::CURRENT_FAULT, "Supply current fault input (1=fault)"));

pub static TEMPERATURE_FAULT: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::TEMPERATURE_FAULT, "Motor temperature fault input (1=fault)"));

pub static VIBRATION_FAULT: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::VIBRATION_FAULT, "Motor vibration fault input (1=fault)"));

pub static SUPPLY_VOLTAGE: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::SUPPLY_VOLTAGE, "Supply voltage in volts"));

pub static SUPPLY_CURRENT: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::SUPPLY_CURRENT, "Supply current in amps"));

pub static MOTOR_TEMPERATURE: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::MOTOR_TEMPERATURE, "Motor temperature in Celsius"));

pub static MOTOR_VIBRATION: LazyLock<Gauge> =
    LazyLock::new(|| gauge(tags::MOTOR_VIBRATION, "Motor vibration level"));

// ============================================================================
// Metrics HTTP Server
// ============================================================================

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            match request.url() {
                "/metrics" => {
                    let encoder = TextEncoder::new();
                    let mut buffer = Vec::new();

                    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        let _ = request.respond(
                            Response::from_string("Internal Server Error").with_status_code(500),
                        );
                        continue;
                    }

                    let response = Response::from_data(buffer).with_header(
                        tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/plain; version=0.0.4"[..],
                        )
                        .unwrap(),
                    );
                    let _ = request.respond(response);
                }
                "/health" => {
                    let _ = request.respond(Response::from_string("OK"));
                }
                "/ready" => {
                    // Ready once the first cycle has run
                    if CYCLES_EXECUTED.get() > 0 {
                        let _ = request.respond(Response::from_string("Ready"));
                    } else {
                        let _ = request
                            .respond(Response::from_string("Not Ready").with_status_code(503));
                    }
                }
                _ => {
                    let _ =
                        request.respond(Response::from_string("Not Found").with_status_code(404));
                }
            }
        }
    })
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = CYCLES_EXECUTED.get();
    let _ = DEVICE_FAILURES.get();
    let _ = FRAME_ERRORS.get();
    let _ = PUBLISH_FAILURES.get();
    let _ = ENABLED.get();
    let _ = RUNNING.get();
    let _ = STEP.get();
    let _ = VOLTAGE_FAULT.get();
    let _ = CURRENT_FAULT.get();
    let _ = TEMPERATURE_FAULT.get();
    let _ = VIBRATION_FAULT.get();
    let _ = SUPPLY_VOLTAGE.get();
    let _ = SUPPLY_CURRENT.get();
    let _ = MOTOR_TEMPERATURE.get();
    let _ = MOTOR_VIBRATION.get();
}
