//! Shared helpers for the end-to-end tests.

use std::time::{Duration, Instant};
use tokio::net::TcpListener;

/// Allocate OS-assigned ports by briefly binding to port 0.
pub(crate) async fn allocate_os_ports(count: usize) -> Vec<u16> {
    let mut ports = Vec::with_capacity(count);
    for _ in 0..count {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        ports.push(listener.local_addr().unwrap().port());
        drop(listener); // Release the port immediately
    }
    ports
}

/// Poll `action` until `predicate` accepts its result or the timeout
/// elapses. Returns the accepted result, or `None` on timeout.
pub(crate) async fn wait_until<F, Fut, T, P>(
    mut action: F,
    predicate: P,
    timeout: Duration,
) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = T>,
    P: Fn(&T) -> bool,
{
    let start = Instant::now();
    let interval = Duration::from_millis(100);

    while start.elapsed() < timeout {
        let result = action().await;
        if predicate(&result) {
            return Some(result);
        }
        tokio::time::sleep(interval).await;
    }
    None
}
