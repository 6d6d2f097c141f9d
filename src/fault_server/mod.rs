//! A deliberately unreliable stand-in for Apple's verifyReceipt endpoint.
//!
//! Every POST to `/verifyReceipt` is numbered (starting at 1) and answered
//! by the first [`FaultRule`] whose trigger matches that number, or with a
//! well-formed status 0 echo when none does. Point a client at it to
//! exercise its error handling deterministically.
//!
//! Only startup can fail. Everything that goes wrong afterwards, on purpose
//! or not, stays inside the connection it happened on.

mod echo;
mod http;
mod policy;

use std::{
    future::Future,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    sync::watch,
    task::JoinSet,
};
use tracing::{debug, info, warn};

pub use self::{
    echo::EXAMPLE_RECEIPT,
    policy::{FaultAction, FaultPolicy, FaultRule, Trigger},
};
use self::{
    echo::echo_body,
    http::{read_request, write_response, RequestError},
};
use crate::{constants::VERIFY_RECEIPT_PATH, errors::ServeError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Bound and waiting; no request in flight.
    Listening,
    /// At least one request in flight.
    Serving,
    /// Shutdown requested; in-flight requests are finishing.
    ShuttingDown,
}

struct Shared {
    policy: FaultPolicy,
    request_count: AtomicU64,
    in_flight: AtomicUsize,
    /// Flips to `true` once, when shutdown begins.
    shutdown: watch::Sender<bool>,
}

/// Observes a running [`FaultServer`] from other tasks.
#[derive(Clone)]
pub struct FaultServerHandle {
    shared: Arc<Shared>,
}

impl FaultServerHandle {
    pub fn state(&self) -> ServerState {
        if *self.shared.shutdown.borrow() {
            ServerState::ShuttingDown
        } else if self.shared.in_flight.load(Ordering::SeqCst) > 0 {
            ServerState::Serving
        } else {
            ServerState::Listening
        }
    }

    /// Number of verification requests received so far.
    pub fn request_count(&self) -> u64 {
        self.shared.request_count.load(Ordering::SeqCst)
    }
}

pub struct FaultServer {
    listener: TcpListener,
    shared: Arc<Shared>,
}

impl FaultServer {
    pub async fn bind(addr: SocketAddr, policy: FaultPolicy) -> Result<Self, ServeError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServeError::PortUnavailable { addr, source })?;
        Ok(Self {
            listener,
            shared: Arc::new(Shared {
                policy,
                request_count: AtomicU64::new(0),
                in_flight: AtomicUsize::new(0),
                shutdown: watch::channel(false).0,
            }),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServeError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn handle(&self) -> FaultServerHandle {
        FaultServerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Accepts connections until `shutdown` resolves, then waits for the
    /// requests already in flight. Connections that have not delivered a
    /// complete request by then are closed without a response.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send) -> Result<(), ServeError> {
        info!(
            addr = ?self.listener.local_addr().ok(),
            rules = self.shared.policy.rules().len(),
            "fault server listening"
        );
        tokio::pin!(shutdown);
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let shared = Arc::clone(&self.shared);
                        connections.spawn(async move {
                            handle_connection(stream, peer, shared).await;
                        });
                    }
                    Err(e) => warn!(error = %e, "failed to accept connection"),
                },
            }
        }

        self.shared.shutdown.send_replace(true);
        info!(in_flight = connections.len(), "fault server shutting down");
        while connections.join_next().await.is_some() {}
        Ok(())
    }
}

/// Counts a connection as in flight for as long as it lives.
struct InFlight(Arc<Shared>);

impl InFlight {
    fn enter(shared: Arc<Shared>) -> Self {
        shared.in_flight.fetch_add(1, Ordering::SeqCst);
        Self(shared)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Resolves once shutdown has begun.
async fn shutdown_started(mut shutdown: watch::Receiver<bool>) {
    if shutdown.wait_for(|stopping| *stopping).await.is_err() {
        std::future::pending::<()>().await;
    }
}

async fn handle_connection(mut stream: TcpStream, peer: SocketAddr, shared: Arc<Shared>) {
    let read = tokio::select! {
        read = read_request(&mut stream) => read,
        () = shutdown_started(shared.shutdown.subscribe()) => {
            debug!(%peer, "closing connection without a request for shutdown");
            return;
        }
    };
    let request = match read {
        Ok(request) => request,
        Err(RequestError::Closed) => return,
        Err(e) => {
            debug!(%peer, error = %e, "unreadable request");
            let status = match e {
                RequestError::TooLarge => 413,
                _ => 400,
            };
            let _ = write_response(&mut stream, status, None, b"", None).await;
            return;
        }
    };
    let guard = InFlight::enter(Arc::clone(&shared));

    if request.path != VERIFY_RECEIPT_PATH {
        let _ = write_response(&mut stream, 404, None, b"", None).await;
        return;
    }
    if request.method != "POST" {
        let _ = write_response(&mut stream, 405, None, b"", None).await;
        return;
    }

    let request_number = shared.request_count.fetch_add(1, Ordering::SeqCst) + 1;
    let mut action = shared.policy.action_for(request_number);
    debug!(%peer, request_number, ?action, "verifyReceipt request");

    let written = loop {
        match action {
            None => {
                let body = echo_body(&request.body);
                break write_response(&mut stream, 200, Some("application/json"), &body, None)
                    .await;
            }
            Some(FaultAction::Delay { delay_ms, then }) => {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                action = then.as_deref();
            }
            Some(FaultAction::Respond {
                status,
                body,
                content_type,
            }) => {
                break write_response(
                    &mut stream,
                    *status,
                    content_type.as_deref(),
                    body.as_bytes(),
                    None,
                )
                .await;
            }
            Some(FaultAction::DropConnection) => {
                debug!(%peer, request_number, "dropping connection");
                break Ok(());
            }
            Some(FaultAction::LengthMismatch {
                status,
                body,
                declared_length,
            }) => {
                break write_response(
                    &mut stream,
                    *status,
                    Some("application/json"),
                    body.as_bytes(),
                    Some(*declared_length),
                )
                .await;
            }
        }
    };
    if let Err(e) = written {
        warn!(%peer, request_number, error = %e, "failed to write response");
    }
    drop(guard);
    let _ = stream.shutdown().await;
}
