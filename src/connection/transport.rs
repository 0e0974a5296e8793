//! Dialing the server: TCP with a timeout, optionally upgraded to TLS.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig as TlsClientConfig, RootCertStore};
use tracing::{debug, warn};

use super::ClientConfig;
use crate::error::{ConnectionError, ConnectionResult};

/// An established byte stream to the server.
pub(crate) enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

/// Connect to the configured server within `timeout`.
pub(crate) async fn dial(client: &ClientConfig, timeout: Duration) -> ConnectionResult<Transport> {
    let address = client.dial_address();
    match tokio::time::timeout(timeout, connect(client, &address)).await {
        Ok(result) => result,
        Err(_) => Err(ConnectionError::DialTimeout(address)),
    }
}

async fn connect(client: &ClientConfig, address: &str) -> ConnectionResult<Transport> {
    let tcp = TcpStream::connect(address).await?;
    tcp.set_nodelay(true)?;
    if client.tls {
        let tls = upgrade_to_tls(tcp, client.server_name()).await?;
        Ok(Transport::Tls(Box::new(tls)))
    } else {
        Ok(Transport::Plain(tcp))
    }
}

/// Upgrades a TCP stream to TLS, verifying against the system roots.
pub(crate) async fn upgrade_to_tls(
    tcp_stream: TcpStream,
    hostname: &str,
) -> ConnectionResult<TlsStream<TcpStream>> {
    let mut roots = RootCertStore::empty();
    let certs = rustls_native_certs::load_native_certs();
    for cert in certs.certs {
        if let Err(e) = roots.add(cert) {
            warn!("Failed to add root cert: {}", e);
        }
    }
    for e in &certs.errors {
        warn!("Error loading native certs: {}", e);
    }

    let config = TlsClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(hostname.to_string())
        .map_err(|_| ConnectionError::InvalidServerName(hostname.to_string()))?;

    let tls_stream = connector.connect(server_name, tcp_stream).await?;
    debug!(host = hostname, "TLS handshake complete");
    Ok(tls_stream)
}
