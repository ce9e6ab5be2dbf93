//! Reverse proxy frontend.
//!
//! Every public request is routed to the next backend in round-robin order.
//! The request body is buffered up front so that an attempt failing with a
//! network-level error (connection refused, reset, DNS) can be reissued to
//! another backend; two attempts total. Application-level errors pass
//! through untouched and are never retried.

pub mod backends;

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;

use crate::proxy::backends::BackendSet;

const MAX_ATTEMPTS: usize = 2;

#[derive(Clone)]
pub struct ProxyState {
    pub backends: Arc<BackendSet>,
    pub client: reqwest::Client,
}

/// Serve the reverse proxy on an already-bound listener until it fails.
pub async fn serve(listener: TcpListener, state: ProxyState) -> std::io::Result<()> {
    let app = Router::new().fallback(forward).with_state(state);
    axum::serve(listener, app).await
}

async fn forward(State(state): State<ProxyState>, req: Request) -> Response {
    let (parts, body) = req.into_parts();

    // Buffered so a failed attempt can be reissued.
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(error = %e, "failed to read request body");
            return (StatusCode::BAD_REQUEST, "failed to read request body\n").into_response();
        }
    };

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    // Headers that describe the inbound hop, not the forwarded request.
    let mut headers = parts.headers.clone();
    headers.remove(header::HOST);
    headers.remove(header::CONNECTION);
    headers.remove(header::CONTENT_LENGTH);
    headers.remove(header::TRANSFER_ENCODING);

    for attempt in 1..=MAX_ATTEMPTS {
        let Some(backend) = state.backends.pick().await else {
            tracing::warn!("no live backends");
            return (StatusCode::SERVICE_UNAVAILABLE, "no live backends\n").into_response();
        };

        let url = format!("{backend}{path_and_query}");
        let result = state
            .client
            .request(parts.method.clone(), &url)
            .headers(headers.clone())
            .body(body.clone())
            .send()
            .await;

        match result {
            Ok(upstream) => return into_response(upstream),
            Err(e) => {
                tracing::warn!(attempt, url = %url, error = %e, "backend request failed");
            }
        }
    }

    (StatusCode::BAD_GATEWAY, "all backends failed\n").into_response()
}

fn into_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    headers.remove(header::CONNECTION);
    headers.remove(header::TRANSFER_ENCODING);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
