use crate::base::neterror::NetError;
use std::time::Duration;
use tokio::net::TcpStream;

/// Manages the connection process: DNS -> TCP.
/// Roughly equivalent to net::ConnectJob, without TLS or proxies.
pub struct ConnectJob;

impl ConnectJob {
    /// Resolve `host` and connect to the first address that accepts.
    ///
    /// With a timeout, the whole DNS + TCP sequence is bounded by it.
    pub async fn connect(
        host: &str,
        port: u16,
        timeout: Option<Duration>,
    ) -> Result<TcpStream, NetError> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, Self::connect_direct(host, port))
                .await
                .map_err(|_| NetError::ConnectionTimedOut)?,
            None => Self::connect_direct(host, port).await,
        }
    }

    async fn connect_direct(host: &str, port: u16) -> Result<TcpStream, NetError> {
        // 1. DNS Resolution
        let addr_str = format!("{}:{}", host, port);
        let addrs =
            tokio::net::lookup_host(&addr_str).await.map_err(|_| NetError::NameNotResolved)?;

        // 2. TCP Connect
        let mut last_error = NetError::NameNotResolved;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    tracing::trace!(%addr, "tcp connected");
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "tcp connect failed");
                    last_error = match e.kind() {
                        std::io::ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
                        _ => NetError::ConnectionFailed,
                    };
                }
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let stream = ConnectJob::connect("127.0.0.1", port, None).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to obtain a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = ConnectJob::connect("127.0.0.1", port, Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::ConnectionRefused | NetError::ConnectionFailed));
    }
}
