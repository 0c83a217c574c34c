//! Upstream socket: plain TCP or client TLS.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use anyhow::{Context as _, Result};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::{debug, warn};

#[allow(clippy::large_enum_variant)]
pub enum Transport {
    Tcp(TcpStream),
    Tls(TlsStream<TcpStream>),
}

impl Transport {
    /// Open a connection to `host:port`, upgrading to TLS when asked.
    pub async fn connect(host: &str, port: u16, tls: bool) -> Result<Self> {
        let stream = TcpStream::connect((host, port))
            .await
            .with_context(|| format!("tcp connect to {}:{}", host, port))?;
        if let Err(e) = Self::enable_keepalive(&stream) {
            warn!("failed to enable TCP keepalive: {}", e);
        }
        if let Err(e) = stream.set_nodelay(true) {
            debug!("failed to set TCP_NODELAY: {}", e);
        }

        if !tls {
            return Ok(Self::Tcp(stream));
        }
        let connector = TlsConnector::from(Arc::new(client_config()));
        let server_name = ServerName::try_from(host.to_string())
            .with_context(|| format!("invalid TLS server name {:?}", host))?;
        let stream = connector
            .connect(server_name, stream)
            .await
            .with_context(|| format!("TLS handshake with {}", host))?;
        Ok(Self::Tls(stream))
    }

    fn enable_keepalive(stream: &TcpStream) -> Result<()> {
        use socket2::{SockRef, TcpKeepalive};

        let sock = SockRef::from(stream);
        let keepalive = TcpKeepalive::new()
            .with_time(Duration::from_secs(120))
            .with_interval(Duration::from_secs(30));

        sock.set_tcp_keepalive(&keepalive)?;
        Ok(())
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

fn client_config() -> ClientConfig {
    let mut roots = RootCertStore::empty();
    let certs = rustls_native_certs::load_native_certs();
    for e in &certs.errors {
        warn!("error loading native certs: {}", e);
    }
    let (added, ignored) = roots.add_parsable_certificates(certs.certs);
    debug!(added, ignored, "loaded native root certificates");

    ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth()
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}
