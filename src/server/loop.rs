// Server loop module
// Accepts connections until shutdown is requested, then drains

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use super::connection::accept_connection;
use crate::config::AppState;
use crate::logger;

/// How often the drain phase re-checks the connection counter
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Accept connections until `state.request_shutdown()` is called.
///
/// Must run inside a `LocalSet`; connections are served with `spawn_local`.
/// After shutdown the listener is closed and in-flight connections get up
/// to `performance.shutdown_timeout` seconds to finish.
pub async fn start_server_loop(listener: TcpListener, state: Arc<AppState>) {
    // Register for the notification before checking the flag so a signal
    // arriving in between is not lost
    let shutdown = Arc::clone(&state.shutdown);
    let notified = shutdown.notified();
    tokio::pin!(notified);

    if !state.is_shutting_down() {
        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => accept_connection(stream, peer_addr, &state),
                        Err(e) => logger::log_error(&format!("Failed to accept connection: {e}")),
                    }
                }

                () = &mut notified => break,
            }
        }
    }

    drop(listener);
    drain_connections(&state).await;
}

/// Wait for active connections to finish, bounded by the shutdown timeout
async fn drain_connections(state: &AppState) {
    let active = state.active_connections.load(Ordering::SeqCst);
    logger::log_shutdown_started(active);

    let deadline = tokio::time::Instant::now()
        + Duration::from_secs(state.config.performance.shutdown_timeout);

    while state.active_connections.load(Ordering::SeqCst) > 0
        && tokio::time::Instant::now() < deadline
    {
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }

    logger::log_shutdown_complete(state.active_connections.load(Ordering::SeqCst));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::test_support::{script_assembler, FAKE_AS};
    use crate::config::Config;
    use crate::server::create_listener;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    async fn raw_request(addr: std::net::SocketAddr, request: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn test_serves_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.assembler = script_assembler(FAKE_AS, dir.path()).config().clone();
        config.performance.shutdown_timeout = 2;
        let state = Arc::new(AppState::new(&config));

        let listener = create_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();

        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let server = tokio::task::spawn_local(start_server_loop(
                    listener,
                    Arc::clone(&state),
                ));

                let body = r#"{"assembly": "notarealinstruction"}"#;
                let request = format!(
                    "POST /assembly/validate/ HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let response = raw_request(addr, &request).await;
                assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
                assert!(response.contains(r#""compiled":false"#));
                assert!(response.contains("input.S"));

                let empty = "POST /assembly/validate/ HTTP/1.1\r\nHost: localhost\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}";
                let response = raw_request(addr, empty).await;
                assert!(response.starts_with("HTTP/1.1 400 Bad Request"), "{response}");

                state.request_shutdown();
                tokio::time::timeout(Duration::from_secs(5), server)
                    .await
                    .unwrap()
                    .unwrap();
            })
            .await;

        assert_eq!(state.active_connections.load(Ordering::SeqCst), 0);
        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_before_start_returns_immediately() {
        let state = Arc::new(AppState::new(&Config::default()));
        state.request_shutdown();

        let listener = create_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let local = tokio::task::LocalSet::new();
        tokio::time::timeout(
            Duration::from_secs(1),
            local.run_until(start_server_loop(listener, state)),
        )
        .await
        .unwrap();
    }
}
