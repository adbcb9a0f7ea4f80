//! Byte-stream transport: plain TCP or TLS.
//!
//! The protocol engine treats the transport as an opaque, ordered byte
//! stream; this module only knows how to open one and hand back something
//! that is `AsyncRead + AsyncWrite`.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::config::{SessionConfig, TlsOptions};
use crate::error::{Result, StompError};

/// A connected transport stream.
#[derive(Debug)]
pub enum Transport {
    /// Plain TCP.
    Plain(TcpStream),
    /// TLS over TCP.
    Tls(Box<TlsStream<TcpStream>>),
}

/// Open a transport to the configured broker.
///
/// Dials TCP, then layers TLS on top when the configuration asks for it.
pub async fn connect(config: &SessionConfig) -> Result<Transport> {
    let tcp = TcpStream::connect((config.address.as_str(), config.port)).await?;

    match &config.tls {
        None => Ok(Transport::Plain(tcp)),
        Some(options) => {
            let stream = tls_connect(tcp, &config.address, options).await?;
            Ok(Transport::Tls(Box::new(stream)))
        }
    }
}

async fn tls_connect(
    tcp: TcpStream,
    address: &str,
    options: &TlsOptions,
) -> Result<TlsStream<TcpStream>> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(config));

    let name = options
        .server_name
        .clone()
        .unwrap_or_else(|| address.to_string());
    let server_name =
        ServerName::try_from(name).map_err(|e| StompError::Tls(e.to_string()))?;

    Ok(connector.connect(server_name, tcp).await?)
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match self.get_mut() {
            Transport::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Transport::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
        }
    }
}
