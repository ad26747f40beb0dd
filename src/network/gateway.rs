//! Gateway - TCP listener that accepts incoming WebSocket connections.
//!
//! Authentication happens inside the WebSocket upgrade callback: a missing
//! or invalid bearer credential rejects the handshake with 401 before the
//! connection ever touches the session registry (fail-closed).

use crate::auth;
use crate::config::{ServerConfig, TlsConfig};
use crate::engine::Engine;
use crate::error::EngineError;
use crate::metrics;
use crate::network::Connection;
use rustls_pemfile::{certs, pkcs8_private_keys};
use std::io::{BufReader, Cursor};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig as RustlsServerConfig;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::accept_hdr_async;
use tracing::{error, info, warn};

/// The Gateway accepts incoming TCP (optionally TLS) connections and runs
/// the WebSocket upgrade with handshake authentication.
pub struct Gateway {
    listener: TcpListener,
    tls_acceptor: Option<TlsAcceptor>,
    engine: Arc<Engine>,
    jwt_secret: Arc<str>,
}

impl Gateway {
    /// Bind the gateway to the configured address.
    pub async fn bind(
        config: &ServerConfig,
        jwt_secret: String,
        engine: Arc<Engine>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.listen).await?;
        info!(addr = %config.listen, "listener bound");

        let tls_acceptor = match &config.tls {
            Some(tls) => {
                let acceptor = Self::load_tls(tls)?;
                info!(cert = %tls.cert_path, "TLS enabled");
                Some(acceptor)
            }
            None => None,
        };

        Ok(Self {
            listener,
            tls_acceptor,
            engine,
            jwt_secret: jwt_secret.into(),
        })
    }

    /// The address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Load TLS certificates and create a TlsAcceptor.
    fn load_tls(config: &TlsConfig) -> anyhow::Result<TlsAcceptor> {
        let cert_file = std::fs::read(&config.cert_path)?;
        let cert_reader = &mut BufReader::new(Cursor::new(cert_file));
        let certs: Vec<CertificateDer> = certs(cert_reader).collect::<Result<Vec<_>, _>>()?;
        if certs.is_empty() {
            anyhow::bail!("no certificates found in {}", config.cert_path);
        }

        let key_file = std::fs::read(&config.key_path)?;
        let key_reader = &mut BufReader::new(Cursor::new(key_file));
        let mut keys: Vec<PrivateKeyDer> = pkcs8_private_keys(key_reader)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(PrivateKeyDer::from)
            .collect();
        if keys.is_empty() {
            anyhow::bail!("no private keys found in {}", config.key_path);
        }
        let key = keys.remove(0);

        let tls_config = RustlsServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
        Ok(TlsAcceptor::from(Arc::new(tls_config)))
    }

    /// Run the gateway, accepting connections forever.
    pub async fn run(self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let engine = Arc::clone(&self.engine);
                    let secret = Arc::clone(&self.jwt_secret);
                    let acceptor = self.tls_acceptor.clone();

                    tokio::spawn(async move {
                        match acceptor {
                            Some(acceptor) => match acceptor.accept(stream).await {
                                Ok(tls_stream) => {
                                    serve_socket(tls_stream, addr, engine, secret).await;
                                }
                                Err(e) => {
                                    warn!(%addr, error = %e, "TLS handshake failed");
                                }
                            },
                            None => serve_socket(stream, addr, engine, secret).await,
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                }
            }
        }
    }
}

/// Upgrade a raw stream to a WebSocket, authenticating during the handshake,
/// and run the connection to completion.
async fn serve_socket<S>(stream: S, addr: SocketAddr, engine: Arc<Engine>, secret: Arc<str>)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let mut identity: Option<String> = None;
    let callback = |req: &http::Request<()>, response: http::Response<()>| {
        match authenticate(req, &secret) {
            Ok(email) => {
                identity = Some(email);
                Ok(response)
            }
            Err(e) => {
                metrics::auth_rejected();
                warn!(%addr, error = %e, "handshake authentication failed");
                Err(http::Response::builder()
                    .status(http::StatusCode::UNAUTHORIZED)
                    .body(Some("authentication failed".to_string()))
                    .expect("static response"))
            }
        }
    };

    match accept_hdr_async(stream, callback).await {
        Ok(ws_stream) => {
            // The callback only lets authenticated upgrades through.
            let Some(identity) = identity else {
                return;
            };
            info!(%addr, identity, "connection authenticated");
            let connection = Connection::new(identity.clone(), ws_stream, addr, engine);
            if let Err(e) = connection.run().await {
                warn!(%addr, identity, error = %e, "connection error");
            }
            info!(%addr, identity, "connection closed");
        }
        Err(e) => {
            warn!(%addr, error = %e, "WebSocket handshake failed");
        }
    }
}

/// Pull the bearer token from the upgrade request and verify it.
///
/// The `Authorization` header is preferred; a `token` query parameter is
/// accepted for browser clients that cannot set upgrade headers.
fn authenticate(req: &http::Request<()>, secret: &str) -> Result<String, EngineError> {
    let header_token = req
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    let token = header_token.or_else(|| {
        req.uri().query().and_then(|query| {
            query
                .split('&')
                .find_map(|pair| pair.strip_prefix("token="))
                .map(str::to_string)
        })
    });

    let token = token.ok_or_else(|| EngineError::Authentication("missing bearer token".into()))?;
    auth::verify_token(secret, &token)
}
