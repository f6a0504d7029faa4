//! Skips wiremock-based tests where localhost sockets cannot be bound.
//!
//! Set `BGDL_REQUIRE_SOCKET_TESTS=1` to turn a skip into a failure.

use std::net::TcpListener;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "BGDL_REQUIRE_SOCKET_TESTS";

fn sockets_required() -> bool {
    std::env::var(REQUIRE_ENV)
        .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Starts a mock server, or returns `None` when the sandbox forbids binding.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    match TcpListener::bind("127.0.0.1:0") {
        Ok(_) => Some(MockServer::start().await),
        Err(error) if sockets_required() => {
            panic!("cannot bind a localhost socket ({error}) and {REQUIRE_ENV} is set")
        }
        Err(error) => {
            eprintln!("skipping socket-bound test: cannot bind localhost ({error}); set {REQUIRE_ENV}=1 to fail instead");
            None
        }
    }
}
