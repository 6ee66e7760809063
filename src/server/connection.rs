// Connection handling module
// Serves a single accepted TCP connection

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::config::AppState;
use crate::handler;
use crate::trust::Transport;

/// Accept a connection if the limit allows it and serve it in its own task.
///
/// The counter is incremented before the limit check so concurrent accepts
/// cannot both slip under the limit.
pub fn accept_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: &Arc<AppState>,
    conn_counter: &Arc<AtomicUsize>,
    shutdown: watch::Receiver<bool>,
) {
    let prev_count = conn_counter.fetch_add(1, Ordering::SeqCst);

    if let Some(max_conn) = state.config.performance.max_connections {
        if prev_count >= usize::try_from(max_conn).unwrap_or(usize::MAX) {
            conn_counter.fetch_sub(1, Ordering::SeqCst);
            warn!(
                peer = %peer_addr,
                active = prev_count,
                max = max_conn,
                "Max connections reached, connection rejected"
            );
            drop(stream);
            return;
        }
    }

    debug!(peer = %peer_addr, "Connection accepted");

    let transport = Transport {
        peer: peer_addr.ip().to_canonical(),
        encrypted: state.config.server.encrypted,
    };
    handle_connection(
        stream,
        transport,
        Arc::clone(state),
        Arc::clone(conn_counter),
        shutdown,
    );
}

/// Serve HTTP/1.1 on the stream until the client closes, the header read
/// times out or shutdown is requested.
fn handle_connection(
    stream: TcpStream,
    transport: Transport,
    state: Arc<AppState>,
    conn_counter: Arc<AtomicUsize>,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        let io = TokioIo::new(stream);
        let performance = &state.config.performance;

        let mut builder = http1::Builder::new();
        builder.timer(TokioTimer::new());
        builder.keep_alive(performance.keep_alive_timeout > 0);
        if performance.read_timeout > 0 {
            builder.header_read_timeout(Duration::from_secs(performance.read_timeout));
        }

        let service_state = Arc::clone(&state);
        let conn = builder.serve_connection(
            io,
            service_fn(move |req| handler::handle_request(req, transport, Arc::clone(&service_state))),
        );
        let mut conn = std::pin::pin!(conn);

        let result = tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown_requested(&mut shutdown) => {
                conn.as_mut().graceful_shutdown();
                conn.as_mut().await
            }
        };

        if let Err(err) = result {
            if err.is_timeout() {
                debug!(peer = %transport.peer, "Connection timed out reading headers");
            } else if !err.is_incomplete_message() {
                debug!(peer = %transport.peer, error = %err, "Connection error");
            }
        }

        conn_counter.fetch_sub(1, Ordering::SeqCst);
    });
}

/// Resolve once `true` is published on the shutdown channel
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    // the borrow guard must not live across the drain
    let _ = shutdown.wait_for(|stop| *stop).await;
}
