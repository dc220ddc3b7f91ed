//! Assembly validation endpoint
//!
//! Reads the JSON body, hands the source to the assembler and maps the
//! outcome to a response. Compile failures are ordinary 200 responses.

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;

use crate::assembler::AssembleError;
use crate::config::AppState;
use crate::http;
use crate::logger;

/// Request payload; `assembly` is optional here so a missing key and an
/// explicit null are both caught by the same check.
#[derive(Debug, Deserialize)]
pub struct AssemblyRequest {
    #[serde(default)]
    pub assembly: Option<String>,
}

/// Response plus the assembly outcome, when one was produced
pub struct Validated {
    pub response: Response<Full<Bytes>>,
    pub compiled: Option<bool>,
}

impl Validated {
    const fn rejected(response: Response<Full<Bytes>>) -> Self {
        Self {
            response,
            compiled: None,
        }
    }
}

pub async fn handle_validate<B>(req: Request<B>, state: &AppState) -> Validated
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let max_body_size = state.config.http.max_body_size;

    // 1. Reject declared oversized bodies before reading anything
    if let Some(resp) = check_body_size(&req, max_body_size) {
        return Validated::rejected(resp);
    }

    // 2. Read the body, enforcing the same limit on what actually arrives
    let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
    let body = match Limited::new(req.into_body(), limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            logger::log_warning(&format!("Request body exceeded {max_body_size} bytes"));
            return Validated::rejected(http::build_413_response());
        }
        Err(e) => {
            logger::log_warning(&format!("Failed to read request body: {e}"));
            return Validated::rejected(http::build_empty_response(StatusCode::BAD_REQUEST));
        }
    };

    // 3. Extract the source text
    let Some(assembly) = parse_assembly(&body) else {
        return Validated::rejected(http::build_empty_response(StatusCode::BAD_REQUEST));
    };

    // 4. Assemble
    match state.assembler.assemble(&assembly).await {
        Ok(result) => Validated {
            compiled: Some(result.compiled),
            response: http::build_json_response(StatusCode::OK, &result),
        },
        Err(e) => {
            let status = error_status(&e);
            if status.is_server_error() {
                logger::log_error(&format!("Assembly failed: {e}"));
            } else {
                logger::log_warning(&format!("Assembly rejected: {e}"));
            }
            Validated::rejected(http::build_error_response(status, e.public_reason()))
        }
    }
}

/// `Some(text)` for `{"assembly": "<text>"}`; `None` for anything that is not
/// a JSON object with a string `assembly`.
pub fn parse_assembly(body: &[u8]) -> Option<String> {
    // A derived struct also deserializes from a sequence, so check the shape first
    let object @ serde_json::Value::Object(_) = serde_json::from_slice(body).ok()? else {
        return None;
    };
    serde_json::from_value::<AssemblyRequest>(object)
        .ok()
        .and_then(|req| req.assembly)
}

const fn error_status(err: &AssembleError) -> StatusCode {
    match err {
        AssembleError::SourceTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        AssembleError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        AssembleError::Staging(_) | AssembleError::Spawn { .. } | AssembleError::Wait(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Validate Content-Length header and return 413 if exceeded
fn check_body_size<B>(req: &Request<B>, max_body_size: u64) -> Option<Response<Full<Bytes>>> {
    let content_length = req.headers().get("content-length")?;
    content_length.to_str().map_or_else(
        |_| {
            logger::log_warning("Content-Length header contains non-ASCII characters");
            None
        },
        |size_str| match size_str.parse::<u64>() {
            Ok(size) if size > max_body_size => {
                logger::log_warning(&format!(
                    "Request body too large: {size} bytes (max: {max_body_size})"
                ));
                Some(http::build_413_response())
            }
            Err(_) => {
                logger::log_warning(&format!(
                    "Invalid Content-Length value: '{size_str}', skipping size check"
                ));
                None
            }
            _ => None,
        },
    )
}
