//! Outbound socket endpoints for push and pub connectors
//!
//! Both kinds speak the same framing: a 4-byte big-endian length followed by
//! the payload. Addresses are one of:
//! - `tcp://host:port`
//! - `ipc:///absolute/path` or `unix:///absolute/path`

use crate::error::{ConnectorError, Result};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Subscriber backlog of a pub socket before slow readers start losing frames
const PUB_CHANNEL_CAPACITY: usize = 4096;

/// Default upper bound on writing one frame to a push peer
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Parsed socket address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// host:port
    Tcp(String),
    /// Unix domain socket path
    Ipc(PathBuf),
}

impl Endpoint {
    pub fn parse(address: &str) -> Result<Self> {
        if let Some(host_port) = address.strip_prefix("tcp://") {
            match host_port.rsplit_once(':') {
                Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
                    Ok(Endpoint::Tcp(host_port.to_string()))
                }
                _ => Err(ConnectorError::invalid_address(
                    address,
                    "expected tcp://host:port",
                )),
            }
        } else if let Some(path) = address
            .strip_prefix("ipc://")
            .or_else(|| address.strip_prefix("unix://"))
        {
            if path.is_empty() {
                return Err(ConnectorError::invalid_address(
                    address,
                    "socket path cannot be empty",
                ));
            }
            Ok(Endpoint::Ipc(PathBuf::from(path)))
        } else {
            Err(ConnectorError::invalid_address(
                address,
                "unsupported scheme, use tcp://, ipc:// or unix://",
            ))
        }
    }
}

/// An outbound socket owned by exactly one sender worker
#[async_trait]
pub trait SocketEndpoint: Send + Debug {
    /// Address this endpoint was created for
    fn endpoint(&self) -> &str;

    /// Transmit one frame, waiting on transport backpressure
    async fn send(&mut self, frame: Bytes) -> Result<()>;

    /// Flush and release the socket
    async fn close(&mut self) -> Result<()>;
}

fn frame_len(endpoint: &str, len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        ConnectorError::send_failed(endpoint, format!("payload of {} bytes exceeds frame limit", len))
    })
}

fn encode_frame(endpoint: &str, payload: &[u8]) -> Result<Bytes> {
    let len = frame_len(endpoint, payload.len())?;
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(len);
    buf.put_slice(payload);
    Ok(buf.freeze())
}

#[derive(Debug)]
enum Stream {
    Tcp(TcpStream),
    Unix(UnixStream),
}

impl Stream {
    async fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        match self {
            Stream::Tcp(stream) => stream.write_all(data).await,
            Stream::Unix(stream) => stream.write_all(data).await,
        }
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Stream::Tcp(stream) => stream.flush().await,
            Stream::Unix(stream) => stream.flush().await,
        }
    }

    async fn shutdown(&mut self) -> std::io::Result<()> {
        match self {
            Stream::Tcp(stream) => stream.shutdown().await,
            Stream::Unix(stream) => stream.shutdown().await,
        }
    }
}

/// Connects to a single peer and streams frames to it
#[derive(Debug)]
pub struct PushSocket {
    address: String,
    stream: Option<Stream>,
    send_timeout: Duration,
}

impl PushSocket {
    pub async fn connect(address: &str) -> Result<Self> {
        let stream = match Endpoint::parse(address)? {
            Endpoint::Tcp(host_port) => {
                let stream = TcpStream::connect(&host_port).await.map_err(|e| {
                    ConnectorError::connection_failed(format!(
                        "TCP connection to {} failed: {}",
                        host_port, e
                    ))
                })?;
                stream.set_nodelay(true)?;
                Stream::Tcp(stream)
            }
            Endpoint::Ipc(path) => {
                let stream = UnixStream::connect(&path).await.map_err(|e| {
                    ConnectorError::connection_failed(format!(
                        "Unix socket connection to {} failed: {}",
                        path.display(),
                        e
                    ))
                })?;
                Stream::Unix(stream)
            }
        };

        debug!("Push socket connected to {}", address);
        Ok(Self {
            address: address.to_string(),
            stream: Some(stream),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        })
    }

    /// Bound each frame write; a peer that stops reading fails the send instead of stalling it
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }
}

#[async_trait]
impl SocketEndpoint for PushSocket {
    fn endpoint(&self) -> &str {
        &self.address
    }

    async fn send(&mut self, frame: Bytes) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| ConnectorError::WorkerClosed(self.address.clone()))?;

        let encoded = encode_frame(&self.address, &frame)?;
        let write = async {
            stream.write_all(&encoded).await?;
            stream.flush().await
        };

        let written = tokio::time::timeout(self.send_timeout, write).await;
        match written {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ConnectorError::send_failed(&self.address, e.to_string())),
            Err(_) => {
                // A partial frame may be on the wire, the stream can't be reused
                self.stream = None;
                Err(ConnectorError::timeout(self.send_timeout.as_millis() as u64))
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.flush().await?;
            stream.shutdown().await?;
            debug!("Push socket to {} closed", self.address);
        }
        Ok(())
    }
}

/// Binds a listener and broadcasts every frame to connected subscribers
///
/// Frames sent while no subscriber is connected are dropped.
#[derive(Debug)]
pub struct PubSocket {
    address: String,
    frames: Option<broadcast::Sender<Bytes>>,
    acceptor: Option<JoinHandle<()>>,
    ipc_path: Option<PathBuf>,
}

impl PubSocket {
    pub async fn bind(address: &str) -> Result<Self> {
        let (frames, _) = broadcast::channel::<Bytes>(PUB_CHANNEL_CAPACITY);

        let (acceptor, ipc_path) = match Endpoint::parse(address)? {
            Endpoint::Tcp(host_port) => {
                let listener = TcpListener::bind(&host_port).await.map_err(|e| {
                    ConnectorError::connection_failed(format!(
                        "Cannot bind {}: {}",
                        host_port, e
                    ))
                })?;
                (spawn_tcp_acceptor(listener, frames.clone()), None)
            }
            Endpoint::Ipc(path) => {
                remove_stale_socket(&path)?;
                let listener = UnixListener::bind(&path).map_err(|e| {
                    ConnectorError::connection_failed(format!(
                        "Cannot bind {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                (spawn_unix_acceptor(listener, frames.clone()), Some(path))
            }
        };

        info!("Pub socket listening on {}", address);
        Ok(Self {
            address: address.to_string(),
            frames: Some(frames),
            acceptor: Some(acceptor),
            ipc_path,
        })
    }

    /// Number of currently connected subscribers
    pub fn subscriber_count(&self) -> usize {
        self.frames
            .as_ref()
            .map(|frames| frames.receiver_count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl SocketEndpoint for PubSocket {
    fn endpoint(&self) -> &str {
        &self.address
    }

    async fn send(&mut self, frame: Bytes) -> Result<()> {
        let frames = self
            .frames
            .as_ref()
            .ok_or_else(|| ConnectorError::WorkerClosed(self.address.clone()))?;

        if frames.send(encode_frame(&self.address, &frame)?).is_err() {
            debug!("No subscribers on {}, frame dropped", self.address);
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
        }
        // Subscriber tasks drain what they already have, then see the channel closed
        self.frames.take();

        if let Some(path) = self.ipc_path.take() {
            remove_stale_socket(&path)?;
        }
        debug!("Pub socket on {} closed", self.address);
        Ok(())
    }
}

impl Drop for PubSocket {
    fn drop(&mut self) {
        if let Some(acceptor) = self.acceptor.take() {
            acceptor.abort();
        }
    }
}

fn remove_stale_socket(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    Ok(())
}

fn spawn_tcp_acceptor(listener: TcpListener, frames: broadcast::Sender<Bytes>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!("Subscriber {} connected", peer);
                    let _ = stream.set_nodelay(true);
                    spawn_subscriber(Stream::Tcp(stream), frames.subscribe());
                }
                Err(e) => warn!("Failed to accept subscriber: {}", e),
            }
        }
    })
}

fn spawn_unix_acceptor(
    listener: UnixListener,
    frames: broadcast::Sender<Bytes>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    debug!("Subscriber connected on unix socket");
                    spawn_subscriber(Stream::Unix(stream), frames.subscribe());
                }
                Err(e) => warn!("Failed to accept subscriber: {}", e),
            }
        }
    })
}

fn spawn_subscriber(mut stream: Stream, mut frames: broadcast::Receiver<Bytes>) {
    tokio::spawn(async move {
        loop {
            match frames.recv().await {
                Ok(frame) => {
                    if let Err(e) = stream.write_all(&frame).await {
                        debug!("Subscriber went away: {}", e);
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Slow subscriber lost {} frames", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    let _ = stream.flush().await;
                    let _ = stream.shutdown().await;
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Vec<u8> {
        let len = reader.read_u32().await.unwrap() as usize;
        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await.unwrap();
        payload
    }

    #[test]
    fn test_endpoint_parse() {
        assert_eq!(
            Endpoint::parse("tcp://127.0.0.1:5555").unwrap(),
            Endpoint::Tcp("127.0.0.1:5555".to_string())
        );
        assert_eq!(
            Endpoint::parse("ipc:///tmp/out.sock").unwrap(),
            Endpoint::Ipc(PathBuf::from("/tmp/out.sock"))
        );
        assert_eq!(
            Endpoint::parse("unix:///tmp/out.sock").unwrap(),
            Endpoint::Ipc(PathBuf::from("/tmp/out.sock"))
        );

        for bad in ["tcp://nohost", "tcp://:80", "tcp://host:notaport", "ipc://", "udp://x:1", ""] {
            assert!(
                matches!(Endpoint::parse(bad), Err(ConnectorError::InvalidAddress { .. })),
                "{}",
                bad
            );
        }
    }

    #[test]
    fn test_frame_encoding() {
        let frame = encode_frame("tcp://127.0.0.1:1", b"abc").unwrap();
        assert_eq!(&frame[..], &[0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_oversized_payload_rejected() {
        assert_eq!(frame_len("tcp://127.0.0.1:1", u32::MAX as usize).unwrap(), u32::MAX);

        let err = frame_len("tcp://127.0.0.1:1", u32::MAX as usize + 1).unwrap_err();
        assert!(matches!(err, ConnectorError::SendFailed { .. }));
    }

    #[tokio::test]
    async fn test_push_send_times_out_on_stalled_peer() {
        let (client, _peer) = UnixStream::pair().unwrap();
        let mut push = PushSocket {
            address: "ipc:///stalled".to_string(),
            stream: Some(Stream::Unix(client)),
            send_timeout: Duration::from_millis(100),
        };

        // The peer never reads, so the socket buffer eventually fills
        let frame = Bytes::from(vec![0u8; 1 << 20]);
        let mut result = Ok(());
        for _ in 0..64 {
            result = push.send(frame.clone()).await;
            if result.is_err() {
                break;
            }
        }

        assert!(matches!(result, Err(ConnectorError::Timeout(100))));
        let err = push.send(Bytes::from_static(b"after")).await.unwrap_err();
        assert!(matches!(err, ConnectorError::WorkerClosed(_)));
    }

    #[tokio::test]
    async fn test_push_socket_streams_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("tcp://{}", listener.local_addr().unwrap());

        let mut push = PushSocket::connect(&address).await.unwrap();
        let (mut peer, _) = listener.accept().await.unwrap();

        push.send(Bytes::from_static(b"first")).await.unwrap();
        push.send(Bytes::from_static(b"second")).await.unwrap();
        push.close().await.unwrap();

        assert_eq!(read_frame(&mut peer).await, b"first");
        assert_eq!(read_frame(&mut peer).await, b"second");

        let err = push.send(Bytes::from_static(b"late")).await.unwrap_err();
        assert!(matches!(err, ConnectorError::WorkerClosed(_)));
    }

    #[tokio::test]
    async fn test_push_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("tcp://{}", listener.local_addr().unwrap());
        drop(listener);

        let err = PushSocket::connect(&address).await.unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_pub_socket_broadcasts_over_ipc() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pub.sock");
        let address = format!("ipc://{}", path.display());

        let mut publisher = PubSocket::bind(&address).await.unwrap();

        // Dropped: nobody is listening yet
        publisher.send(Bytes::from_static(b"early")).await.unwrap();

        let mut subscriber = UnixStream::connect(&path).await.unwrap();
        for _ in 0..50 {
            if publisher.subscriber_count() > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(publisher.subscriber_count(), 1);

        publisher.send(Bytes::from_static(b"tick")).await.unwrap();
        assert_eq!(read_frame(&mut subscriber).await, b"tick");

        publisher.close().await.unwrap();
        assert!(!path.exists());
    }
}
