use std::fmt::Display;

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channel::ChannelError;

/// Every per-path read topic starts with this.
pub const READ_TOPIC_PREFIX: &str = "serialport-read-";

/// The topic a backend emits a port's inbound data on.
///
/// Deterministic, so that sessions and backends derive the same
/// name from the same path without coordination.
pub fn read_topic(path: &str) -> String {
    format!("{READ_TOPIC_PREFIX}{path}")
}

/// One inbound buffer from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadChunk {
    /// Number of valid bytes in `data`.
    pub size: usize,

    /// The bytes read from the port.
    pub data: Vec<u8>,
}

impl ReadChunk {
    /// A chunk whose size matches its data.
    pub fn new<B: Into<Vec<u8>>>(data: B) -> Self {
        let data = data.into();

        Self {
            size: data.len(),
            data,
        }
    }

    /// The bytes the size field vouches for.
    ///
    /// A malformed chunk may claim more bytes than it carries;
    /// the claim is clamped rather than trusted.
    pub fn valid_bytes(&self) -> &[u8] {
        &self.data[..self.size.min(self.data.len())]
    }
}

impl Display for ReadChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} byte(s)", self.size)
    }
}

/// The stream of chunks behind a subscription.
pub type ChunkStream = BoxStream<'static, ReadChunk>;

/// An active registration on the event channel.
///
/// Exclusively owned by whoever subscribed. Dropping it is the
/// revocation; there is no separate unregister call to forget.
pub struct Subscription {
    id: Uuid,
    topic: String,
    chunks: ChunkStream,
}

impl Subscription {
    /// Wrap a chunk stream into a subscription on `topic`.
    pub fn new<S: AsRef<str>>(topic: S, chunks: ChunkStream) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.as_ref().into(),
            chunks,
        }
    }

    /// Unique id of this registration.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The topic this subscription delivers.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Await the next chunk. `None` means the emitting side is gone.
    pub async fn next_chunk(&mut self) -> Option<ReadChunk> {
        self.chunks.next().await
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}

/// Push-based delivery of byte buffers tagged by topic.
#[async_trait]
pub trait EventChannel: Send + Sync {
    /// Register for chunks emitted on `topic`.
    ///
    /// The returned [`Subscription`] is the ownership handle;
    /// dropping it revokes the registration.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, ChannelError>;
}
