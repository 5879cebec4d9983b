//! Skips wiremock-based tests where localhost sockets are unavailable.

use std::net::TcpListener;

use wiremock::MockServer;

/// Set to `1` to turn a skipped socket test into a failure.
const REQUIRE_ENV: &str = "FETCHPOOL_REQUIRE_SOCKET_TESTS";

/// Starts a mock server, or returns `None` (with a note on stderr) when no
/// localhost port can be bound.
#[track_caller]
pub fn start_mock_server_or_skip() -> impl Future<Output = Option<MockServer>> {
    let can_bind = TcpListener::bind("127.0.0.1:0").is_ok();
    if !can_bind {
        let caller = std::panic::Location::caller();
        assert!(
            std::env::var(REQUIRE_ENV).as_deref() != Ok("1"),
            "{REQUIRE_ENV}=1 but localhost cannot be bound ({caller})"
        );
        eprintln!("skipping socket test at {caller}: cannot bind localhost");
    }
    async move {
        if can_bind {
            Some(MockServer::start().await)
        } else {
            None
        }
    }
}
