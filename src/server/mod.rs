// Server module entry point
// Listener setup, connection serving and the accept loop

pub mod connection;
pub mod listener;
pub mod signal;

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::config::AppState;
use connection::accept_connection;

pub use listener::bind_listener;
pub use signal::shutdown_signal;

/// How long open connections get to finish after shutdown is requested
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept connections until `shutdown` resolves, then drain
pub async fn run<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F)
where
    F: Future<Output = ()>,
{
    let active_connections = Arc::new(AtomicUsize::new(0));
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut shutdown = std::pin::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => accept_connection(
                        stream,
                        peer_addr,
                        &state,
                        &active_connections,
                        stop_rx.clone(),
                    ),
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                }
            }
            () = &mut shutdown => break,
        }
    }

    drop(listener);
    let _ = stop_tx.send(true);

    let open = active_connections.load(Ordering::SeqCst);
    info!(open, "Listener closed, draining connections");

    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while active_connections.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;

    if drained.is_err() {
        warn!(
            open = active_connections.load(Ordering::SeqCst),
            "Drain timeout reached, exiting with open connections"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_serves_and_shuts_down() {
        let root = std::env::temp_dir().join(format!("quay-server-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("hello.txt"), b"hello").unwrap();

        let mut config = Config::load_from("does-not-exist/quay-config").unwrap();
        config.logging.access_log = false;
        config.files.root_dir = root.clone();
        let state = AppState::new(config).unwrap();

        let listener = bind_listener("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(run(listener, state, async {
            let _ = rx.await;
        }));

        let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"GET /hello.txt HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        client.read_to_string(&mut response).await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"), "{response}");
        assert!(response.ends_with("hello"));

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        std::fs::remove_dir_all(&root).unwrap();
    }
}
