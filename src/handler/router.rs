//! Request routing dispatch module
//!
//! Entry point for HTTP request processing, responsible for route matching,
//! method validation, common headers and access logging.

use crate::config::AppState;
use crate::handler::validate;
use crate::http;
use crate::logger::{self, AccessLogEntry};
use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::{Method, Request, Response, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Validation route
pub const VALIDATE_PATH: &str = "/assembly/validate/";

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    remote_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let started = Instant::now();
    let mut entry = AccessLogEntry::new(
        remote_addr.to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.http_version = format!("{:?}", req.version())
        .trim_start_matches("HTTP/")
        .to_string();
    entry.user_agent = req
        .headers()
        .get("user-agent")
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);

    let (mut response, compiled) = route_request(req, &state).await;
    http::apply_common_headers(&mut response, &state.config.http);

    if state.config.logging.access_log {
        entry.status = response.status().as_u16();
        entry.body_bytes = usize::try_from(response.body().size_hint().exact().unwrap_or(0))
            .unwrap_or(usize::MAX);
        entry.compiled = compiled;
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(response)
}

/// Route request based on path and method
async fn route_request<B>(req: Request<B>, state: &AppState) -> (Response<Full<Bytes>>, Option<bool>)
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let path = req.uri().path();
    let health = &state.config.health;

    // Health check endpoints (always fast, never touch the assembler)
    if health.enabled && path == health.liveness_path {
        return (http::build_health_response(StatusCode::OK, "ok"), None);
    }
    if health.enabled && path == health.readiness_path {
        let response = if state.assembler.is_available().await {
            http::build_health_response(StatusCode::OK, "ok")
        } else {
            logger::log_warning(&format!(
                "Readiness check failed: assembler '{}' not found",
                state.assembler.config().binary
            ));
            http::build_health_response(StatusCode::SERVICE_UNAVAILABLE, "assembler unavailable")
        };
        return (response, None);
    }

    if !is_validate_path(path) {
        return (http::build_404_response(), None);
    }

    let method = req.method().clone();
    match method {
        Method::POST => {
            let validated = validate::handle_validate(req, state).await;
            (validated.response, validated.compiled)
        }
        Method::OPTIONS => (
            http::build_options_response(state.config.http.enable_cors),
            None,
        ),
        _ => {
            logger::log_warning(&format!("Method not allowed: {method}"));
            (http::build_405_response(), None)
        }
    }
}

/// Accept the route with or without its trailing slash
fn is_validate_path(path: &str) -> bool {
    path == VALIDATE_PATH || path == VALIDATE_PATH.trim_end_matches('/')
}
