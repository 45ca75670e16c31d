//! # Channel Security
//!
//! Every cluster connection upgrades to TLS before anything else happens.
//! Certificates are self-signed and generated per process; peer identity is
//! NOT derived from the certificate chain but verified at the protocol layer
//! by the identify exchange, so the client side accepts any server
//! certificate and there is no CA infrastructure to configure.

use std::sync::Arc;

use rcgen::{generate_simple_self_signed, CertifiedKey};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use tokio::net::TcpStream;
use tokio_rustls::{client, server, TlsAcceptor, TlsConnector};

use crate::error::RpcError;

/// TLS server name presented by connecting clients. Verification is skipped,
/// but rustls requires a syntactically valid name.
const PEER_TLS_NAME: &str = "cluster.invalid";

/// Per-process TLS material: an acceptor with a fresh self-signed
/// certificate, and a connector that defers identity checks to the protocol.
pub struct TlsContext {
    acceptor: TlsAcceptor,
    connector: TlsConnector,
}

impl TlsContext {
    /// Generate a fresh self-signed certificate and build both sides.
    pub fn self_signed() -> Result<Self, RpcError> {
        let CertifiedKey { cert, key_pair } =
            generate_simple_self_signed(vec!["localhost".to_string()])
                .map_err(|e| RpcError::Tls(e.to_string()))?;

        let cert_chain = vec![CertificateDer::from(cert.der().to_vec())];
        let private_key = PrivateKeyDer::try_from(key_pair.serialize_der())
            .map_err(|e| RpcError::Tls(format!("invalid private key: {e:?}")))?;

        let server_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(cert_chain, private_key)
            .map_err(|e| RpcError::Tls(e.to_string()))?;

        let client_config = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
            .with_no_client_auth();

        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(server_config)),
            connector: TlsConnector::from(Arc::new(client_config)),
        })
    }

    /// Server half of the upgrade.
    pub async fn accept(&self, stream: TcpStream) -> Result<server::TlsStream<TcpStream>, RpcError> {
        self.acceptor
            .accept(stream)
            .await
            .map_err(|e| RpcError::Tls(e.to_string()))
    }

    /// Client half of the upgrade.
    pub async fn connect(&self, stream: TcpStream) -> Result<client::TlsStream<TcpStream>, RpcError> {
        let name = ServerName::try_from(PEER_TLS_NAME)
            .map_err(|e| RpcError::Tls(e.to_string()))?;
        self.connector
            .connect(name, stream)
            .await
            .map_err(|e| RpcError::Tls(e.to_string()))
    }
}

/// Accept any server certificate.
///
/// Peer identity is verified by the identify exchange after the channel is
/// secured; the certificate only provides channel encryption, so there is no
/// CA infrastructure to verify against.
#[derive(Debug)]
struct AcceptAnyServerCert;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
        ]
    }
}
