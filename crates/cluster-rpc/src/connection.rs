//! # Connection Task
//!
//! One task per established connection owns the transport and multiplexes
//! calls over it: outbound requests are assigned correlation ids and matched
//! to responses; inbound requests are dispatched through the connection's
//! responder table. The protocol is symmetric — either end can call the
//! other once the handshake is complete.
//!
//! A dedicated reader task forwards decoded frames over a channel so the
//! main loop never holds a partially read frame across a cancellation point.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_types::EventLoopId;

use crate::commands::{Request, Response};
use crate::error::RpcError;
use crate::responder::ResponderTable;
use crate::roster::PeerAddr;
use crate::wire::{self, Envelope, Payload};

enum Call {
    Request {
        request: Request,
        reply: oneshot::Sender<Result<Response, RpcError>>,
    },
    Shutdown,
}

struct ClientInner {
    ident: EventLoopId,
    address: PeerAddr,
    registration: Uuid,
    calls: mpsc::Sender<Call>,
}

/// Handle to one established, authenticated connection.
///
/// Cheap to clone; all clones speak to the same connection task. The handle
/// stays valid after the transport dies — calls then fail with
/// `ConnectionClosed`.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// The remote event-loop identity this connection was admitted under.
    #[must_use]
    pub fn ident(&self) -> &EventLoopId {
        &self.inner.ident
    }

    /// The advertised `(host, port)` this connection was made to (or the
    /// observed peer address, for inbound connections).
    #[must_use]
    pub fn address(&self) -> &PeerAddr {
        &self.inner.address
    }

    /// Registration id distinguishing this connection from any replacement
    /// under the same identity.
    #[must_use]
    pub fn registration(&self) -> Uuid {
        self.inner.registration
    }

    /// Invoke a command on the peer and wait for its typed response.
    pub async fn call(&self, request: Request) -> Result<Response, RpcError> {
        let (reply, response) = oneshot::channel();
        self.inner
            .calls
            .send(Call::Request { request, reply })
            .await
            .map_err(|_| RpcError::ConnectionClosed {
                ident: self.inner.ident.clone(),
            })?;
        response.await.map_err(|_| RpcError::ConnectionClosed {
            ident: self.inner.ident.clone(),
        })?
    }

    /// Ask the connection task to close the transport. Pending calls are
    /// failed with `ConnectionClosed`.
    pub async fn close(&self) {
        let _ = self.inner.calls.send(Call::Shutdown).await;
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("ident", &self.inner.ident)
            .field("address", &self.inner.address)
            .field("registration", &self.inner.registration)
            .finish()
    }
}

/// Spawn the task owning `stream` and return the call handle.
///
/// `on_close` runs exactly once, after the transport is gone and every
/// pending call has been failed; directories use it for exact removal.
pub(crate) fn spawn_connection<S>(
    stream: S,
    ident: EventLoopId,
    address: PeerAddr,
    registration: Uuid,
    responders: Arc<ResponderTable>,
    on_close: impl FnOnce() + Send + 'static,
) -> Client
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (calls_tx, calls_rx) = mpsc::channel(32);
    let client = Client {
        inner: Arc::new(ClientInner {
            ident: ident.clone(),
            address,
            registration,
            calls: calls_tx,
        }),
    };
    tokio::spawn(run_connection(stream, ident, calls_rx, responders, on_close));
    client
}

async fn run_connection<S>(
    stream: S,
    ident: EventLoopId,
    mut calls: mpsc::Receiver<Call>,
    responders: Arc<ResponderTable>,
    on_close: impl FnOnce() + Send + 'static,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (read_half, mut write_half) = tokio::io::split(stream);

    let (inbound_tx, mut inbound) = mpsc::channel::<Envelope>(32);
    let reader = tokio::spawn(async move {
        let mut read_half = read_half;
        loop {
            match wire::read_frame(&mut read_half).await {
                Ok(envelope) => {
                    if inbound_tx.send(envelope).await.is_err() {
                        break;
                    }
                }
                Err(err) => {
                    debug!(error = %err, "transport read ended");
                    break;
                }
            }
        }
    });

    let mut pending: HashMap<u64, oneshot::Sender<Result<Response, RpcError>>> = HashMap::new();
    let mut next_id: u64 = 0;

    loop {
        tokio::select! {
            call = calls.recv() => match call {
                None | Some(Call::Shutdown) => break,
                Some(Call::Request { request, reply }) => {
                    next_id += 1;
                    let envelope = Envelope::new(next_id, Payload::Request(request));
                    match wire::write_frame(&mut write_half, &envelope).await {
                        Ok(()) => {
                            pending.insert(next_id, reply);
                        }
                        Err(err) => {
                            let _ = reply.send(Err(err));
                            break;
                        }
                    }
                }
            },
            frame = inbound.recv() => match frame {
                None => break,
                Some(envelope) => match envelope.payload {
                    Payload::Response(response) => {
                        if let Some(reply) = pending.remove(&envelope.id) {
                            let _ = reply.send(Ok(response));
                        } else {
                            debug!(id = envelope.id, "response with no pending call");
                        }
                    }
                    Payload::Failure { message } => {
                        if let Some(reply) = pending.remove(&envelope.id) {
                            let _ = reply.send(Err(RpcError::Remote { message }));
                        }
                    }
                    Payload::Request(request) => {
                        let kind = request.kind();
                        let payload = match responders.dispatch(request).await {
                            Ok(response) => Payload::Response(response),
                            Err(err) => {
                                warn!(command = %kind, error = %err, "responder failed");
                                Payload::Failure {
                                    message: err.to_string(),
                                }
                            }
                        };
                        let envelope = Envelope::new(envelope.id, payload);
                        if wire::write_frame(&mut write_half, &envelope).await.is_err() {
                            break;
                        }
                    }
                    Payload::StartTls | Payload::StartTlsAck => {
                        warn!(%ident, "handshake frame on established connection");
                        break;
                    }
                },
            }
        }
    }

    reader.abort();
    for (_, reply) in pending.drain() {
        let _ = reply.send(Err(RpcError::ConnectionClosed {
            ident: ident.clone(),
        }));
    }
    debug!(%ident, "connection task finished");
    on_close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandKind;
    use crate::responder::IdentifyResponder;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn table(ident: &str) -> Arc<ResponderTable> {
        Arc::new(ResponderTable::new().with(
            CommandKind::Identify,
            Arc::new(IdentifyResponder::new(EventLoopId::from(ident))),
        ))
    }

    fn pair() -> (Client, Client, Arc<AtomicBool>, Arc<AtomicBool>) {
        let (a, b) = tokio::io::duplex(4096);
        let a_closed = Arc::new(AtomicBool::new(false));
        let b_closed = Arc::new(AtomicBool::new(false));
        let a_flag = Arc::clone(&a_closed);
        let b_flag = Arc::clone(&b_closed);
        let client_a = spawn_connection(
            a,
            EventLoopId::from("peer-b"),
            ("127.0.0.1".to_string(), 1),
            Uuid::new_v4(),
            table("peer-a"),
            move || a_flag.store(true, Ordering::SeqCst),
        );
        let client_b = spawn_connection(
            b,
            EventLoopId::from("peer-a"),
            ("127.0.0.1".to_string(), 2),
            Uuid::new_v4(),
            table("peer-b"),
            move || b_flag.store(true, Ordering::SeqCst),
        );
        (client_a, client_b, a_closed, b_closed)
    }

    #[tokio::test]
    async fn test_symmetric_calls_both_directions() {
        let (client_a, client_b, _, _) = pair();

        // a's handle calls towards b; b answers as "peer-b".
        match client_a.call(Request::Identify).await.unwrap() {
            Response::Identify { ident } => assert_eq!(ident.as_str(), "peer-b"),
            other => panic!("unexpected response: {other:?}"),
        }
        match client_b.call(Request::Identify).await.unwrap() {
            Response::Identify { ident } => assert_eq!(ident.as_str(), "peer-a"),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unhandled_command_surfaces_remote_error() {
        let (client_a, _client_b, _, _) = pair();
        let err = client_a.call(Request::ListBootImages).await.unwrap_err();
        assert!(matches!(err, RpcError::Remote { .. }));
    }

    #[tokio::test]
    async fn test_close_runs_on_close_and_fails_later_calls() {
        let (client_a, client_b, a_closed, b_closed) = pair();
        client_a.close().await;

        // Both tasks observe the closed transport eventually.
        for _ in 0..100 {
            if a_closed.load(Ordering::SeqCst) && b_closed.load(Ordering::SeqCst) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(a_closed.load(Ordering::SeqCst));
        assert!(b_closed.load(Ordering::SeqCst));

        let err = client_a.call(Request::Identify).await.unwrap_err();
        assert!(matches!(err, RpcError::ConnectionClosed { .. }));
        let err = client_b.call(Request::Identify).await.unwrap_err();
        assert!(matches!(err, RpcError::ConnectionClosed { .. }));
    }
}
