use std::path::Path;

use async_trait::async_trait;
use md_core::RawRecord;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;

use super::{Broker, BrokerConfig, BrokerError, Credentials, Offset};

/// One record on the wire:
/// `{"key":"order","offset":12,"partition":0,"value":{"type":2,"data":{...}}}`.
///
/// `value` may also be a JSON string holding the envelope text.
#[derive(Deserialize)]
struct Frame<'a> {
    #[serde(default)]
    key: String,
    #[serde(default)]
    offset: i64,
    #[serde(default)]
    partition: i32,
    #[serde(borrow)]
    value: &'a RawValue,
}

#[derive(Serialize)]
struct Subscribe<'a> {
    topic: &'a str,
    partition: i32,
    offset: i64,
    #[serde(flatten)]
    credentials: Option<&'a Credentials>,
}

#[derive(Deserialize)]
struct AuthReply {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Newline-delimited JSON frame reader.
///
/// Frames from other partitions, and frames below an explicit start
/// offset, are skipped. Blank lines are ignored.
pub struct LineBroker<R> {
    reader: Option<R>,
    writer: Option<Box<dyn AsyncWrite + Send + Unpin>>,
    partition: i32,
    start: Offset,
    line_no: u64,
    buf: String,
}

impl<R> LineBroker<R>
where
    R: AsyncBufRead + Send + Unpin,
{
    pub fn new(reader: R, partition: i32, start: Offset) -> Self {
        Self {
            reader: Some(reader),
            writer: None,
            partition,
            start,
            line_no: 0,
            buf: String::new(),
        }
    }

    fn decode_frame(&self, line: &str) -> Result<Option<RawRecord>, BrokerError> {
        let frame: Frame<'_> = serde_json::from_str(line).map_err(|source| BrokerError::Frame {
            line: self.line_no,
            source,
        })?;

        if frame.partition != self.partition || !self.start.admits(frame.offset) {
            tracing::trace!(
                offset = frame.offset,
                partition = frame.partition,
                "skipping frame"
            );
            return Ok(None);
        }

        let raw = frame.value.get();
        let value = if raw.starts_with('"') {
            serde_json::from_str::<String>(raw)
                .map_err(|source| BrokerError::Frame {
                    line: self.line_no,
                    source,
                })?
                .into_bytes()
        } else {
            raw.as_bytes().to_vec()
        };

        Ok(Some(RawRecord {
            key: frame.key,
            value,
            offset: frame.offset,
            partition: frame.partition,
        }))
    }
}

impl LineBroker<BufReader<File>> {
    /// Replay frames from a file. `Latest` behaves like `Earliest` here.
    pub async fn open<P: AsRef<Path>>(path: P, config: &BrokerConfig) -> Result<Self, BrokerError> {
        let path = path.as_ref();
        let file = File::open(path).await?;
        tracing::info!(path = %path.display(), partition = config.partition, "replaying frames from file");
        Ok(Self::new(BufReader::new(file), config.partition, config.offset))
    }
}

impl LineBroker<BufReader<OwnedReadHalf>> {
    /// Dial `config.address` and subscribe to `config.topic`.
    ///
    /// When credentials are set the feed must answer the subscription with
    /// `{"ok":true}` before any frame.
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let stream = TcpStream::connect(&config.address).await?;
        stream.set_nodelay(true)?;
        let (read_half, mut write_half) = stream.into_split();

        let subscribe = Subscribe {
            topic: &config.topic,
            partition: config.partition,
            offset: config.offset.as_wire(),
            credentials: config.credentials.as_ref(),
        };
        let mut line = serde_json::to_vec(&subscribe).map_err(|source| BrokerError::Frame {
            line: 0,
            source,
        })?;
        line.push(b'\n');
        write_half.write_all(&line).await?;
        write_half.flush().await?;

        let mut reader = BufReader::new(read_half);
        if config.credentials.is_some() {
            let mut reply = String::new();
            if reader.read_line(&mut reply).await? == 0 {
                return Err(BrokerError::Auth("connection closed during handshake".to_string()));
            }
            let reply: AuthReply = serde_json::from_str(reply.trim())
                .map_err(|source| BrokerError::Frame { line: 0, source })?;
            if !reply.ok {
                return Err(BrokerError::Auth(
                    reply.error.unwrap_or_else(|| "rejected".to_string()),
                ));
            }
        }

        tracing::info!(
            address = %config.address,
            topic = %config.topic,
            partition = config.partition,
            offset = config.offset.as_wire(),
            "subscribed to feed"
        );

        let mut broker = Self::new(reader, config.partition, config.offset);
        broker.writer = Some(Box::new(write_half));
        Ok(broker)
    }
}

#[async_trait]
impl<R> Broker for LineBroker<R>
where
    R: AsyncBufRead + Send + Unpin,
{
    async fn read_next(&mut self) -> Result<RawRecord, BrokerError> {
        loop {
            let reader = self.reader.as_mut().ok_or(BrokerError::Closed)?;
            self.buf.clear();
            match reader.read_line(&mut self.buf).await {
                Ok(0) => return Err(BrokerError::Closed),
                Ok(_) => self.line_no += 1,
                Err(e) => {
                    // the bad line is consumed all the same
                    self.line_no += 1;
                    return Err(e.into());
                }
            }

            let line = self.buf.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(record) = self.decode_frame(line)? {
                return Ok(record);
            }
        }
    }

    async fn close(&mut self) -> Result<(), BrokerError> {
        self.reader = None;
        if let Some(mut writer) = self.writer.take() {
            writer.shutdown().await?;
        }
        Ok(())
    }
}
