use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::config::Configuration;
use crate::error::{GatewayError, Result};

/// One XCI request/response round trip.
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn exchange(&self, command: &str, cid: &str) -> Result<Vec<u8>>;
}

/// Talks to snf-server over plain TCP, one fresh connection per command.
#[derive(Debug, Clone)]
pub struct XciClient {
    addr: String,
    dial_timeout: Duration,
    io_timeout: Duration,
    max_reply_bytes: usize,
}

impl XciClient {
    pub fn new(config: &Configuration) -> Self {
        Self {
            addr: config.scanner_addr(),
            dial_timeout: config.dial_timeout(),
            io_timeout: config.io_timeout(),
            max_reply_bytes: config.max_reply_bytes,
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl Exchange for XciClient {
    async fn exchange(&self, command: &str, cid: &str) -> Result<Vec<u8>> {
        let stream = time::timeout(self.dial_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| GatewayError::Connect {
                addr: self.addr.clone(),
                reason: format!("timed out after {}ms", self.dial_timeout.as_millis()),
            })?
            .map_err(|e| GatewayError::Connect {
                addr: self.addr.clone(),
                reason: e.to_string(),
            })?;
        debug!(cid, addr = %self.addr, "connected to snf-server");

        round_trip(stream, command, self.io_timeout, self.max_reply_bytes, cid).await
    }
}

/// Write `command` to `stream` and collect everything the peer sends until it closes.
///
/// There is no length prefix or terminator on the reply, so end-of-stream is the only frame
/// boundary. A read error, an elapsed `io_timeout` or a reply longer than `max_reply_bytes`
/// ends the read early and whatever arrived so far (at most `max_reply_bytes`) is returned.
/// The stream is consumed and therefore closed on every path.
pub async fn round_trip<S>(
    mut stream: S,
    command: &str,
    io_timeout: Duration,
    max_reply_bytes: usize,
    cid: &str,
) -> Result<Vec<u8>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    debug!(cid, command, "sending xci command");
    match time::timeout(io_timeout, stream.write_all(command.as_bytes())).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(GatewayError::Write(e.to_string())),
        Err(_) => {
            return Err(GatewayError::Write(format!(
                "timed out after {}ms",
                io_timeout.as_millis()
            )))
        }
    }

    let deadline = Instant::now() + io_timeout;
    let mut response = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match time::timeout_at(deadline, stream.read(&mut chunk)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                let room = max_reply_bytes - response.len();
                if n > room {
                    response.extend_from_slice(&chunk[..room]);
                    warn!(
                        cid,
                        max_reply_bytes,
                        "snf-server reply exceeds the size limit, keeping partial reply"
                    );
                    break;
                }
                response.extend_from_slice(&chunk[..n]);
            }
            Ok(Err(e)) => {
                warn!(cid, error = %e, received = response.len(), "read from snf-server failed, keeping partial reply");
                break;
            }
            Err(_) => {
                warn!(
                    cid,
                    received = response.len(),
                    "snf-server did not close the connection within {}ms, keeping partial reply",
                    io_timeout.as_millis()
                );
                break;
            }
        }
    }

    if let Err(e) = stream.shutdown().await {
        debug!(cid, error = %e, "shutdown after read failed");
    }
    debug!(cid, reply = %String::from_utf8_lossy(&response), "received xci reply");
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use tokio::io::ReadBuf;
    use tokio::net::TcpListener;

    #[derive(Clone, Copy)]
    enum WriteMode {
        Accept,
        Fail,
        Stall,
    }

    /// Stream double replaying scripted reads; counts how often it is closed (dropped).
    struct ScriptedStream {
        writes: WriteMode,
        reads: VecDeque<io::Result<Vec<u8>>>,
        closes: Arc<AtomicUsize>,
    }

    impl ScriptedStream {
        fn new(writes: WriteMode, reads: Vec<io::Result<Vec<u8>>>) -> (Self, Arc<AtomicUsize>) {
            let closes = Arc::new(AtomicUsize::new(0));
            let stream = Self {
                writes,
                reads: reads.into(),
                closes: closes.clone(),
            };
            (stream, closes)
        }
    }

    impl Drop for ScriptedStream {
        fn drop(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl AsyncRead for ScriptedStream {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            match self.reads.pop_front() {
                Some(Ok(bytes)) => {
                    buf.put_slice(&bytes);
                    Poll::Ready(Ok(()))
                }
                Some(Err(e)) => Poll::Ready(Err(e)),
                None => Poll::Ready(Ok(())),
            }
        }
    }

    impl AsyncWrite for ScriptedStream {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            match self.writes {
                WriteMode::Accept => Poll::Ready(Ok(buf.len())),
                WriteMode::Fail => {
                    Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe")))
                }
                // never woken: only the io timeout can end the write
                WriteMode::Stall => Poll::Pending,
            }
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(5);
    const LIMIT: usize = 16 << 20;

    #[tokio::test]
    async fn clean_close_returns_everything_and_closes_once() {
        let (stream, closes) = ScriptedStream::new(
            WriteMode::Accept,
            vec![Ok(b"<snf><xci>".to_vec()), Ok(b"</xci></snf>".to_vec())],
        );
        let reply = round_trip(stream, "<snf/>", TIMEOUT, LIMIT, "c-1").await.unwrap();
        assert_eq!(reply, b"<snf><xci></xci></snf>");
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn write_failure_is_fatal_and_closes_once() {
        let (stream, closes) = ScriptedStream::new(WriteMode::Fail, vec![Ok(b"unused".to_vec())]);
        let err = round_trip(stream, "<snf/>", TIMEOUT, LIMIT, "c-2").await.unwrap_err();
        assert!(matches!(err, GatewayError::Write(_)), "got {err:?}");
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stalled_write_times_out_and_closes_once() {
        let (stream, closes) = ScriptedStream::new(WriteMode::Stall, vec![Ok(b"unused".to_vec())]);
        let started = std::time::Instant::now();
        let err = round_trip(stream, "<snf/>", Duration::from_millis(100), LIMIT, "c-7")
            .await
            .unwrap_err();
        match err {
            GatewayError::Write(reason) => assert!(reason.contains("timed out"), "{reason}"),
            other => panic!("expected write error, got {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn oversized_reply_is_cut_at_limit_and_closes_once() {
        let (stream, closes) = ScriptedStream::new(
            WriteMode::Accept,
            vec![
                Ok(b"<snf><xci>".to_vec()),
                Ok(b"<scanner><result code=\"0\"/>".to_vec()),
                Ok(b"never read".to_vec()),
            ],
        );
        let reply = round_trip(stream, "<snf/>", TIMEOUT, 16, "c-8").await.unwrap();
        assert_eq!(reply, b"<snf><xci><scann");
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn read_failure_keeps_partial_reply_and_closes_once() {
        let (stream, closes) = ScriptedStream::new(
            WriteMode::Accept,
            vec![
                Ok(b"<snf><xci><gbudb>".to_vec()),
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
                Ok(b"never read".to_vec()),
            ],
        );
        let reply = round_trip(stream, "<snf/>", TIMEOUT, LIMIT, "c-3").await.unwrap();
        assert_eq!(reply, b"<snf><xci><gbudb>");
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn silent_peer_is_cut_off_at_io_timeout() {
        let (client, mut server) = tokio::io::duplex(1024);
        let peer = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let _ = server.read(&mut buf).await;
            server.write_all(b"<snf>").await.unwrap();
            // hold the connection open without finishing the reply
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let started = std::time::Instant::now();
        let reply = round_trip(client, "<snf/>", Duration::from_millis(100), LIMIT, "c-4")
            .await
            .unwrap();
        assert_eq!(reply, b"<snf>");
        assert!(started.elapsed() < Duration::from_secs(2));
        peer.abort();
    }

    #[tokio::test]
    async fn exchange_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = sock.read(&mut buf).await.unwrap();
            sock.write_all(b"<snf><xci/></snf>").await.unwrap();
        });

        let client = XciClient::new(&Configuration {
            scanner_host: "127.0.0.1".into(),
            scanner_port: port,
            ..Configuration::default()
        });
        let reply = client.exchange("<snf/>", "c-5").await.unwrap();
        assert_eq!(reply, b"<snf><xci/></snf>");
    }

    #[tokio::test]
    async fn refused_connection_is_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = XciClient::new(&Configuration {
            scanner_host: "127.0.0.1".into(),
            scanner_port: port,
            ..Configuration::default()
        });
        let err = client.exchange("<snf/>", "c-6").await.unwrap_err();
        match err {
            GatewayError::Connect { addr, .. } => assert_eq!(addr, format!("127.0.0.1:{port}")),
            other => panic!("expected connect error, got {other:?}"),
        }
    }
}
