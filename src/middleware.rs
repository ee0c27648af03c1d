//! Request context middleware.
//!
//! Every request gets a UUID v4 and an arrival timestamp. The id lands in a
//! tracing span wrapping the whole request so all logs can be correlated; the
//! timestamp is where health evaluations start their timer.

use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};
use tracing::Instrument;
use uuid::Uuid;

/// Per-request data inserted into request extensions.
#[derive(Clone, Copy, Debug)]
pub struct RequestContext {
    pub id: Uuid,
    pub started: Instant,
}

/// Assign a request id and wrap the request in a span.
///
/// Must be the outermost layer so `started` is as close to arrival as
/// possible.
pub async fn request_id_layer(mut request: Request, next: Next) -> Response {
    let context = RequestContext {
        id: Uuid::new_v4(),
        started: Instant::now(),
    };

    let span = tracing::info_span!(
        "request",
        request_id = %context.id,
        method = %request.method(),
        path = %request.uri().path(),
        duration_ms = tracing::field::Empty,
    );

    request.extensions_mut().insert(context);

    async move {
        let response = next.run(request).await;
        let duration_ms = context.started.elapsed().as_millis() as u64;

        tracing::Span::current().record("duration_ms", duration_ms);
        tracing::info!(
            status = response.status().as_u16(),
            duration_ms,
            "Request completed"
        );

        response
    }
    .instrument(span)
    .await
}
