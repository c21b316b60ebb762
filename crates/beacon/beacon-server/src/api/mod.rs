//! The presentation layer: two read-only views of the address resolved at
//! startup, plus a liveness probe. Handlers never touch the chain or the
//! record store.

pub mod accept;

use std::net::SocketAddr;

use alloy::primitives::Address;
use anyhow::Result;
use hyper_util::rt::TokioIo;
use tokio::net::{
    TcpListener,
    TcpStream,
};
use tokio_util::sync::CancellationToken;

/// Serve the HTTP surface until the cancellation token fires. `resolved` is
/// the address computed by the bootstrap procedure; it never changes while
/// serving, so every connection task gets its own copy.
pub async fn serve(
    listener: TcpListener,
    resolved: Option<Address>,
    cancel_token: CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                tracing::info!(target: "api", "Api received cancellation signal, shutting down...");
                break;
            }
            res = listener.accept() => {
                match res {
                    Ok((stream, client_addr)) => serve_connection(stream, client_addr, resolved),
                    Err(err) => {
                        tracing::error!(target: "api", ?err, "Error accepting connection");
                    }
                }
            }
        }
    }

    Ok(())
}

fn serve_connection(stream: TcpStream, client_addr: SocketAddr, resolved: Option<Address>) {
    tracing::debug!(target: "api", %client_addr, "Connection accepted");

    let io = TokioIo::new(stream);
    tokio::task::spawn(async move {
        if let Err(err) = hyper::server::conn::http1::Builder::new()
            .serve_connection(
                io,
                hyper::service::service_fn(move |req| async move {
                    accept::accept_request(req, resolved)
                }),
            )
            .await
        {
            tracing::error!(target: "api", ?err, "Error serving connection");
        }
    });
}
