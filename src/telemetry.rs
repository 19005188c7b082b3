//! Telemetry logic.
//! Support tracing export and Prometheus metrics.
use axum::extract::{MatchedPath, Request, State};
use axum::http::{StatusCode, Version, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::{Unit, gauge};
use metrics_exporter_prometheus::{
    BuildError, Matcher, PrometheusBuilder, PrometheusHandle,
};
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::trace::{Span, TraceError, Tracer};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::SdkTracerProvider;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, RefreshKind, System};
use tokio::time::sleep;

use std::time::{Duration, Instant};

use crate::AppState;

fn resource() -> Resource {
    Resource::builder().with_service_name("hirewise").build()
}

/// Create tracer for OTLP.
pub fn setup_tracer() -> Result<SdkTracerProvider, TraceError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource())
        .build())
}

/// Create recorder for Prometheus metrics.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    const EXPONENTIAL_SECONDS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
    ];

    metrics::describe_gauge!(
        "process_cpu_usage",
        Unit::Percent,
        "CPU usage of the process in percentage."
    );
    metrics::describe_gauge!(
        "process_memory_used_bytes",
        Unit::Bytes,
        "Total process memory in bytes."
    );
    metrics::describe_counter!(
        "notifications_expired_total",
        Unit::Count,
        "Read notifications removed by the expiry sweeper."
    );
    metrics::describe_counter!(
        "uploads_stored_total",
        Unit::Count,
        "Files written on disk, per category."
    );
    metrics::describe_counter!(
        "resumes_uploaded_total",
        Unit::Count,
        "Resumes uploaded from the resume page."
    );
    metrics::describe_counter!(
        "applications_submitted_total",
        Unit::Count,
        "Job applications saved."
    );

    let mut system = System::new_with_specifics(RefreshKind::nothing());
    let pid = Pid::from_u32(std::process::id());

    // Refresh process gauges every 10 seconds.
    tokio::spawn(async move {
        loop {
            system.refresh_processes_specifics(
                ProcessesToUpdate::Some(&[pid]),
                true,
                ProcessRefreshKind::nothing().with_memory().with_cpu(),
            );

            if let Some(process) = system.process(pid) {
                gauge!("process_memory_used_bytes").set(process.memory() as f64);
                gauge!("process_cpu_usage").set(process.cpu_usage() as f64);
            }

            sleep(Duration::from_secs(10)).await;
        }
    });

    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_requests_duration_seconds".to_string()),
            EXPONENTIAL_SECONDS,
        )?
        .install_recorder()
}

/// Render Prometheus exposition.
pub async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Track request metrics and open a span per request.
pub async fn track(req: Request, next: Next) -> impl IntoResponse {
    let tracer = global::tracer("tracing-http");
    let mut otel_span = tracer.start("http-request");

    let start = Instant::now();
    let path = if let Some(matched_path) = req.extensions().get::<MatchedPath>() {
        matched_path.as_str().to_owned()
    } else {
        req.uri().path().to_owned()
    };
    let method = req.method().clone();
    let version = match req.version() {
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2",
        Version::HTTP_3 => "HTTP/3",
        _ => "UNKNOWN",
    };

    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    otel_span.set_attribute(KeyValue::new("version", version));
    otel_span.set_attribute(KeyValue::new("path", path.clone()));
    otel_span.set_attribute(KeyValue::new("method", method.to_string()));
    otel_span.set_attribute(KeyValue::new("status", status.clone()));

    let labels = [
        ("method", method.to_string()),
        ("path", path),
        ("status", status),
    ];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels).record(latency);

    otel_span.end();

    response
}
