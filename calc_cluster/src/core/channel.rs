use crate::core::{ClusterError, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// A message-oriented, bidirectional byte channel. Anything wrapping the transport (encryption,
/// integrity tags) implements this trait by holding the channel it wraps.
#[async_trait]
pub trait Channel: Send {
  async fn send(&mut self, bytes: &[u8]) -> Result<()>;

  /// The next message, or `None` once the other side has closed the channel.
  async fn receive(&mut self) -> Result<Option<Vec<u8>>>;

  async fn send_line(&mut self, line: &str) -> Result<()> {
    self.send(line.as_bytes()).await
  }

  /// Like [`Channel::receive`], but the message must be UTF-8.
  async fn receive_line(&mut self) -> Result<Option<String>> {
    match self.receive().await? {
      Some(bytes) => String::from_utf8(bytes)
        .map(Some)
        .map_err(|_| ClusterError::Channel("message is not valid UTF-8".to_string())),
      None => Ok(None),
    }
  }
}

/// Newline framed messages over any byte stream, usually a [`TcpStream`].
pub struct LineChannel<S = TcpStream> {
  stream: BufReader<S>,
}
impl<S: AsyncRead + AsyncWrite + Unpin + Send> LineChannel<S> {
  pub fn new(stream: S) -> LineChannel<S> {
    LineChannel {
      stream: BufReader::new(stream),
    }
  }

  pub fn into_inner(self) -> S {
    self.stream.into_inner()
  }
}
#[async_trait]
impl<S: AsyncRead + AsyncWrite + Unpin + Send> Channel for LineChannel<S> {
  async fn send(&mut self, bytes: &[u8]) -> Result<()> {
    if bytes.contains(&b'\n') {
      return Err(ClusterError::Channel("message contains a line break".to_string()));
    }
    self.stream.write_all(bytes).await?;
    self.stream.write_all(b"\n").await?;
    self.stream.flush().await?;
    Ok(())
  }

  async fn receive(&mut self) -> Result<Option<Vec<u8>>> {
    let mut buf = Vec::new();
    if self.stream.read_until(b'\n', &mut buf).await? == 0 {
      return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
      buf.pop();
      if buf.last() == Some(&b'\r') {
        buf.pop();
      }
    }
    Ok(Some(buf))
  }
}

/// Counts the bytes passing through the channel it wraps.
pub struct MeteredChannel<C> {
  inner: C,
  sent: u64,
  recvd: u64,
}
impl<C: Channel> MeteredChannel<C> {
  pub fn new(inner: C) -> MeteredChannel<C> {
    MeteredChannel {
      inner: inner,
      sent: 0,
      recvd: 0,
    }
  }

  pub fn bytes_sent(&self) -> u64 {
    self.sent
  }

  pub fn bytes_received(&self) -> u64 {
    self.recvd
  }

  pub fn into_inner(self) -> C {
    self.inner
  }
}
#[async_trait]
impl<C: Channel> Channel for MeteredChannel<C> {
  async fn send(&mut self, bytes: &[u8]) -> Result<()> {
    self.inner.send(bytes).await?;
    self.sent += bytes.len() as u64;
    Ok(())
  }

  async fn receive(&mut self) -> Result<Option<Vec<u8>>> {
    let msg = self.inner.receive().await?;
    if let Some(bytes) = &msg {
      self.recvd += bytes.len() as u64;
    }
    Ok(msg)
  }
}

#[test]
fn line_channel_frames_and_meters() {
  tokio_test::block_on(async {
    let (a, b) = tokio::io::duplex(1024);
    let mut left = MeteredChannel::new(LineChannel::new(a));
    let mut right = LineChannel::new(b);
    left.send_line("!credits").await.unwrap();
    left.send_line("!compute 2 + 3").await.unwrap();
    assert_eq!(right.receive_line().await.unwrap().as_deref(), Some("!credits"));
    assert_eq!(right.receive_line().await.unwrap().as_deref(), Some("!compute 2 + 3"));
    right.send(b"You have 100 credits left.\r").await.unwrap();
    assert_eq!(
      left.receive_line().await.unwrap().as_deref(),
      Some("You have 100 credits left.")
    );
    assert_eq!(left.bytes_sent(), 22);
    assert_eq!(left.bytes_received(), 26);
    assert!(left.send_line("two\nlines").await.is_err());
    drop(right);
    assert_eq!(left.receive().await.unwrap(), None);
  });
}

#[test]
fn invalid_utf8_is_a_channel_error() {
  tokio_test::block_on(async {
    let (a, b) = tokio::io::duplex(64);
    let mut left = LineChannel::new(a);
    let mut right = LineChannel::new(b);
    left.send(&[0xff, 0xfe]).await.unwrap();
    match right.receive_line().await {
      Err(ClusterError::Channel(_)) => {}
      other => panic!("expected a channel error, got {:?}", other),
    }
  });
}
