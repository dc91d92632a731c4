//! Request metrics via the `metrics` facade plus one tracing line per request.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

pub async fn metrics_layer(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    let elapsed = start.elapsed();
    ::metrics::counter!(
        "mcp_http_requests_total",
        "method" => method.clone(),
        "status" => status.clone()
    )
    .increment(1);
    ::metrics::histogram!("mcp_http_request_duration_seconds", "method" => method.clone())
        .record(elapsed.as_secs_f64());

    tracing::debug!(
        %method,
        %path,
        %status,
        elapsed_ms = elapsed.as_millis() as u64,
        "HTTP request"
    );
    response
}
