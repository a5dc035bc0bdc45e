//! MySQL reachability prober.
//!
//! A probe logs in to the endpoint's `mysql` database with the master
//! credentials and asks for the server version. Through a SOCKS5 proxy the
//! connection goes over a one-shot local tunnel. Any transport or
//! authentication failure is reported with the driver's own text.

use sari_core::collab::{Endpoint, ProbeOutcome, ProbeTarget, Prober};
use sari_core::{Result, SariError};
use sqlx::mysql::{MySqlConnectOptions, MySqlSslMode};
use sqlx::{ConnectOptions, Connection};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const PROBE_DATABASE: &str = "mysql";

/// How probe connections reach the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Direct,
    /// `host:port` of a SOCKS5 proxy. Names are resolved by the proxy.
    Socks5 { proxy: String },
}

impl Transport {
    /// Parse an optional `socks5://host:port` URL.
    pub fn from_proxy_url(url: Option<&str>) -> Result<Self> {
        let Some(url) = url else {
            return Ok(Transport::Direct);
        };
        let rest = url
            .strip_prefix("socks5h://")
            .or_else(|| url.strip_prefix("socks5://"))
            .ok_or_else(|| SariError::InvalidSetting {
                name: "PROXY".to_string(),
                reason: format!("only socks5:// proxies are supported, got '{url}'"),
            })?;
        let proxy = rest.trim_end_matches('/');
        match proxy.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                Ok(Transport::Socks5 {
                    proxy: proxy.to_string(),
                })
            }
            _ => Err(SariError::InvalidSetting {
                name: "PROXY".to_string(),
                reason: format!("expected socks5://host:port, got '{url}'"),
            }),
        }
    }
}

pub struct MysqlProber {
    transport: Transport,
    timeout: Duration,
}

impl MysqlProber {
    pub fn new(transport: Transport, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Server version on a successful login.
    async fn check(&self, target: &ProbeTarget) -> std::result::Result<String, String> {
        let (Some(username), Some(password)) = (&target.username, &target.password) else {
            return Err("missing master credentials".to_string());
        };

        // Held until the login completes.
        let tunnel = match &self.transport {
            Transport::Direct => None,
            Transport::Socks5 { proxy } => Some(
                Tunnel::open(proxy, &target.endpoint)
                    .await
                    .map_err(|e| e.to_string())?,
            ),
        };
        let (host, port) = match &tunnel {
            Some(tunnel) => ("127.0.0.1", tunnel.port),
            None => (target.endpoint.address.as_str(), target.endpoint.port),
        };

        let options = MySqlConnectOptions::new()
            .host(host)
            .port(port)
            .username(username)
            .password(password)
            .database(PROBE_DATABASE)
            .ssl_mode(MySqlSslMode::Disabled)
            .disable_statement_logging();

        let login = async {
            let mut conn = options.connect().await?;
            let version: String = sqlx::query_scalar::<_, String>("SELECT VERSION()")
                .fetch_one(&mut conn)
                .await?;
            conn.close().await?;
            Ok::<_, sqlx::Error>(version)
        };
        match tokio::time::timeout(self.timeout, login).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", self.timeout)),
        }
    }
}

impl Prober for MysqlProber {
    fn probe(&self, target: &ProbeTarget) -> ProbeOutcome {
        // Pool workers run inside the pool's runtime; anything else gets a
        // runtime of its own.
        let result = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle.block_on(self.check(target)),
            Err(_) => tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| e.to_string())
                .and_then(|runtime| runtime.block_on(self.check(target))),
        };
        match result {
            Ok(version) => ProbeOutcome::ok(format!("OK (\"MySQL Server version {version}\")")),
            Err(e) => ProbeOutcome::failed(format!("ERROR: {e}")),
        }
    }
}

/// A local listener whose single connection is relayed to the endpoint
/// through a SOCKS5 proxy.
struct Tunnel {
    port: u16,
    relay: JoinHandle<()>,
}

impl Tunnel {
    async fn open(proxy: &str, endpoint: &Endpoint) -> io::Result<Self> {
        let mut upstream = TcpStream::connect(proxy).await?;
        socks5_connect(&mut upstream, &endpoint.address, endpoint.port).await?;

        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        let relay = tokio::spawn(async move {
            if let Ok((mut local, _)) = listener.accept().await {
                if let Err(e) = tokio::io::copy_bidirectional(&mut local, &mut upstream).await {
                    tracing::debug!("tunnel closed: {e}");
                }
            }
        });
        Ok(Self { port, relay })
    }
}

impl Drop for Tunnel {
    fn drop(&mut self) {
        self.relay.abort();
    }
}

/// CONNECT through an already open SOCKS5 session (no authentication).
async fn socks5_connect<S>(stream: &mut S, host: &str, port: u16) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&[5, 1, 0]).await?;
    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await?;
    if choice != [5, 0] {
        return Err(io::Error::other("SOCKS5 proxy refused anonymous access"));
    }

    let name = host.as_bytes();
    let len = u8::try_from(name.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "host name too long"))?;
    let mut request = vec![5, 1, 0, 3, len];
    request.extend_from_slice(name);
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await?;

    let mut head = [0u8; 4];
    stream.read_exact(&mut head).await?;
    if head[1] != 0 {
        return Err(io::Error::other(format!(
            "SOCKS5 proxy: {}",
            socks5_reply(head[1])
        )));
    }
    let skip = match head[3] {
        1 => 4,
        4 => 16,
        3 => usize::from(stream.read_u8().await?),
        other => {
            return Err(io::Error::other(format!(
                "SOCKS5 proxy: unknown address type {other}"
            )))
        }
    };
    let mut bound = vec![0u8; skip + 2];
    stream.read_exact(&mut bound).await?;
    Ok(())
}

fn socks5_reply(code: u8) -> &'static str {
    match code {
        1 => "general failure",
        2 => "connection not allowed by ruleset",
        3 => "network unreachable",
        4 => "host unreachable",
        5 => "connection refused",
        6 => "TTL expired",
        7 => "command not supported",
        8 => "address type not supported",
        _ => "unknown error",
    }
}
