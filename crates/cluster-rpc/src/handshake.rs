//! # Secure Handshake
//!
//! Connection establishment runs two phases before a connection task exists:
//!
//! 1. **Channel security**: the initiator sends `StartTls` as the very first
//!    frame, the acceptor acknowledges, and both sides negotiate TLS.
//! 2. **Identify exchange**: over the secured channel, each side asks the
//!    other for its event-loop identity. The initiator compares the answer
//!    against the identity it meant to connect to and aborts on mismatch; a
//!    mismatched connection is never admitted to a directory.
//!
//! Both phases run on the raw stream, so the sequencing is deterministic;
//! the multiplexing connection task takes over afterwards.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::{client, server};
use tracing::debug;

use shared_types::EventLoopId;

use crate::commands::{Request, Response};
use crate::error::RpcError;
use crate::responder::ResponderTable;
use crate::tls::TlsContext;
use crate::wire::{read_frame, write_frame, Envelope, Payload};

/// Correlation id used for the identify exchange; the first id the
/// connection task will assign afterwards is greater.
const HANDSHAKE_CALL_ID: u64 = 0;

/// Initiator half of the channel-security upgrade.
pub async fn initiate_secure(
    mut stream: TcpStream,
    tls: &TlsContext,
) -> Result<client::TlsStream<TcpStream>, RpcError> {
    write_frame(&mut stream, &Envelope::new(0, Payload::StartTls)).await?;
    let ack = read_frame(&mut stream).await?;
    match ack.payload {
        Payload::StartTlsAck => {}
        other => {
            return Err(RpcError::Handshake(format!(
                "expected STARTTLS acknowledgement, got {other:?}"
            )))
        }
    }
    tls.connect(stream).await
}

/// Acceptor half of the channel-security upgrade.
pub async fn accept_secure(
    mut stream: TcpStream,
    tls: &TlsContext,
) -> Result<server::TlsStream<TcpStream>, RpcError> {
    let first = read_frame(&mut stream).await?;
    match first.payload {
        Payload::StartTls => {}
        other => {
            return Err(RpcError::Handshake(format!(
                "expected STARTTLS, got {other:?}"
            )))
        }
    }
    write_frame(&mut stream, &Envelope::new(first.id, Payload::StartTlsAck)).await?;
    tls.accept(stream).await
}

/// Ask the peer for its identity over the secured stream.
///
/// Both ends run this concurrently, so while waiting for our answer we must
/// also answer the peer's own `Identify` (through `responders`). Any other
/// traffic at this point is a protocol violation.
pub async fn identify_exchange<S>(
    stream: &mut S,
    responders: &ResponderTable,
) -> Result<EventLoopId, RpcError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_frame(
        stream,
        &Envelope::new(HANDSHAKE_CALL_ID, Payload::Request(Request::Identify)),
    )
    .await?;

    loop {
        let envelope = read_frame(stream).await?;
        match envelope.payload {
            Payload::Response(Response::Identify { ident })
                if envelope.id == HANDSHAKE_CALL_ID =>
            {
                debug!(%ident, "peer identified");
                return Ok(ident);
            }
            Payload::Request(request) => {
                let payload = match responders.dispatch(request).await {
                    Ok(response) => Payload::Response(response),
                    Err(err) => Payload::Failure {
                        message: err.to_string(),
                    },
                };
                write_frame(stream, &Envelope::new(envelope.id, payload)).await?;
            }
            Payload::Failure { message } if envelope.id == HANDSHAKE_CALL_ID => {
                return Err(RpcError::Handshake(format!(
                    "peer refused to identify: {message}"
                )));
            }
            other => {
                return Err(RpcError::Handshake(format!(
                    "unexpected frame during identify exchange: {other:?}"
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandKind;
    use crate::responder::IdentifyResponder;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    fn table(ident: &str) -> ResponderTable {
        ResponderTable::new().with(
            CommandKind::Identify,
            Arc::new(IdentifyResponder::new(EventLoopId::from(ident))),
        )
    }

    #[tokio::test]
    async fn test_full_handshake_identifies_both_ends() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let acceptor = tokio::spawn(async move {
            let tls = TlsContext::self_signed().unwrap();
            let (stream, _) = listener.accept().await.unwrap();
            let mut secured = accept_secure(stream, &tls).await.unwrap();
            identify_exchange(&mut secured, &table("region-a:pid=1")).await
        });

        let tls = TlsContext::self_signed().unwrap();
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut secured = initiate_secure(stream, &tls).await.unwrap();
        let region_ident = identify_exchange(&mut secured, &table("rack-1:pid=2"))
            .await
            .unwrap();

        assert_eq!(region_ident.as_str(), "region-a:pid=1");
        let rack_ident = acceptor.await.unwrap().unwrap();
        assert_eq!(rack_ident.as_str(), "rack-1:pid=2");
    }

    #[tokio::test]
    async fn test_acceptor_rejects_missing_starttls() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let acceptor = tokio::spawn(async move {
            let tls = TlsContext::self_signed().unwrap();
            let (stream, _) = listener.accept().await.unwrap();
            accept_secure(stream, &tls).await.map(|_| ())
        });

        let mut stream = TcpStream::connect(addr).await.unwrap();
        write_frame(
            &mut stream,
            &Envelope::new(0, Payload::Request(Request::Identify)),
        )
        .await
        .unwrap();

        let err = acceptor.await.unwrap().unwrap_err();
        assert!(matches!(err, RpcError::Handshake(_)));
    }
}
