//! A mock backend, useful to exercise sessions without actual serial ports.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, trace, warn};

use crate::{
    channel::{ChannelError, CommandChannel, OpenOptions},
    events::{read_topic, EventChannel, ReadChunk, Subscription},
};

/// A recorded backend invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// An `open` command, with the values the session sent.
    Open {
        /// Requested port.
        path: String,

        /// Requested link speed.
        baud_rate: u32,
    },

    /// A `close` command.
    Close {
        /// Which port.
        path: String,
    },

    /// A text `write` command.
    Write {
        /// Which port.
        path: String,

        /// The text the session sent.
        value: String,
    },

    /// A binary `write` command.
    WriteBytes {
        /// Which port.
        path: String,

        /// The bytes the session sent.
        bytes: Vec<u8>,
    },

    /// Recorded when a write finishes, so tests can check
    /// that nothing interleaved with it.
    WriteDone {
        /// Which port.
        path: String,
    },

    /// A `read` command.
    Read {
        /// Which port.
        path: String,

        /// Requested chunk size.
        size: usize,
    },

    /// A `cancel_read` command.
    CancelRead {
        /// Which port.
        path: String,
    },

    /// An `available_ports` query.
    AvailablePorts,

    /// A `force_close` command.
    ForceClose {
        /// Which port.
        path: String,
    },

    /// A `close_all` command.
    CloseAll,
}

/// Failures to inject into the next matching command.
#[derive(Debug, Default)]
struct PlannedFailures {
    open: Option<ChannelError>,
    close: Option<ChannelError>,
    write: Option<ChannelError>,
    read: Option<ChannelError>,
}

#[derive(Default)]
struct MockState {
    open_ports: HashSet<String>,
    calls: Vec<Call>,
    scripted_reads: HashMap<String, VecDeque<Vec<u8>>>,
    topics: HashMap<String, broadcast::Sender<ReadChunk>>,
    failures: PlannedFailures,
    port_names: Vec<String>,
    write_delay: Option<Duration>,
}

/// An in-memory backend implementing both collaborator channels.
///
/// Records every command, emits chunks on the same topics a real
/// backend would, and can be scripted to fail or to stall writes.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    /// A backend with no ports open and nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("Mock state lock should not be poisoned")
    }

    /// Every command recorded so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Ports the backend currently believes are open.
    pub fn open_ports(&self) -> Vec<String> {
        let mut ports: Vec<_> = self.lock().open_ports.iter().cloned().collect();
        ports.sort();
        ports
    }

    /// Set which port names an `available_ports` query reports.
    pub fn set_port_names<S: AsRef<str>>(&self, names: &[S]) {
        self.lock().port_names = names.iter().map(|n| n.as_ref().into()).collect();
    }

    /// Make every write stall for `delay` before completing.
    pub fn set_write_delay(&self, delay: Duration) {
        self.lock().write_delay = Some(delay);
    }

    /// Fail the next `open` command with `error`.
    pub fn fail_next_open(&self, error: ChannelError) {
        self.lock().failures.open = Some(error);
    }

    /// Fail the next `close` command with `error`.
    pub fn fail_next_close(&self, error: ChannelError) {
        self.lock().failures.close = Some(error);
    }

    /// Fail the next write command with `error`.
    pub fn fail_next_write(&self, error: ChannelError) {
        self.lock().failures.write = Some(error);
    }

    /// Fail the next `read` command with `error`.
    pub fn fail_next_read(&self, error: ChannelError) {
        self.lock().failures.read = Some(error);
    }

    /// Queue bytes which the next `read` command on `path` will emit.
    pub fn script_read<B: Into<Vec<u8>>>(&self, path: &str, data: B) {
        self.lock()
            .scripted_reads
            .entry(path.into())
            .or_default()
            .push_back(data.into());
    }

    /// Emit a chunk directly on `topic`, bypassing the read loop.
    pub fn emit<B: Into<Vec<u8>>>(&self, topic: &str, data: B) {
        let chunk = ReadChunk::new(data);
        let mut state = self.lock();

        match state.topics.get_mut(topic) {
            Some(sender) => match sender.send(chunk) {
                Ok(receivers) => trace!("Emitted to {receivers} receiver(s) on `{topic}`"),
                Err(e) => warn!(?e, "No live receivers on `{topic}`"),
            },
            None => debug!("Nothing has ever subscribed to `{topic}`"),
        }
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<ReadChunk> {
        self.lock()
            .topics
            .entry(topic.into())
            .or_insert_with(|| broadcast::channel(1024).0)
            .clone()
    }

    fn ensure_port(state: &MockState, path: &str) -> Result<(), ChannelError> {
        if state.open_ports.contains(path) {
            Ok(())
        } else {
            Err(ChannelError::PortNotFound(path.into()))
        }
    }
}

#[async_trait]
impl CommandChannel for MockBackend {
    async fn open(&self, options: OpenOptions) -> Result<(), ChannelError> {
        let mut state = self.lock();
        state.calls.push(Call::Open {
            path: options.path.clone(),
            baud_rate: options.baud_rate,
        });

        if let Some(error) = state.failures.open.take() {
            return Err(error);
        }

        state.open_ports.insert(options.path);
        Ok(())
    }

    async fn close(&self, path: &str) -> Result<(), ChannelError> {
        let mut state = self.lock();
        state.calls.push(Call::Close { path: path.into() });

        if let Some(error) = state.failures.close.take() {
            return Err(error);
        }

        Self::ensure_port(&state, path)?;
        state.open_ports.remove(path);
        Ok(())
    }

    async fn write(&self, path: &str, value: &str) -> Result<usize, ChannelError> {
        let delay = {
            let mut state = self.lock();
            state.calls.push(Call::Write {
                path: path.into(),
                value: value.into(),
            });

            if let Some(error) = state.failures.write.take() {
                return Err(error);
            }

            Self::ensure_port(&state, path)?;
            state.write_delay
        };

        // The stall happens outside the lock so reads could, in
        // principle, interleave. A correct session never lets them.
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.lock().calls.push(Call::WriteDone { path: path.into() });
        Ok(value.len())
    }

    async fn write_bytes(&self, path: &str, bytes: &[u8]) -> Result<usize, ChannelError> {
        let delay = {
            let mut state = self.lock();
            state.calls.push(Call::WriteBytes {
                path: path.into(),
                bytes: bytes.to_vec(),
            });

            if let Some(error) = state.failures.write.take() {
                return Err(error);
            }

            Self::ensure_port(&state, path)?;
            state.write_delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.lock().calls.push(Call::WriteDone { path: path.into() });
        Ok(bytes.len())
    }

    async fn read(&self, path: &str, _timeout: Duration, size: usize) -> Result<(), ChannelError> {
        let emission = {
            let mut state = self.lock();
            state.calls.push(Call::Read {
                path: path.into(),
                size,
            });

            if let Some(error) = state.failures.read.take() {
                return Err(error);
            }

            Self::ensure_port(&state, path)?;

            state
                .scripted_reads
                .get_mut(path)
                .and_then(|queue| queue.pop_front())
        };

        if let Some(data) = emission {
            self.emit(&read_topic(path), data);
        }

        Ok(())
    }

    async fn cancel_read(&self, path: &str) -> Result<(), ChannelError> {
        self.lock().calls.push(Call::CancelRead { path: path.into() });
        Ok(())
    }

    async fn available_ports(&self) -> Result<Vec<String>, ChannelError> {
        let mut state = self.lock();
        state.calls.push(Call::AvailablePorts);
        Ok(state.port_names.clone())
    }

    async fn force_close(&self, path: &str) -> Result<(), ChannelError> {
        let mut state = self.lock();
        state.calls.push(Call::ForceClose { path: path.into() });
        state.open_ports.remove(path);
        Ok(())
    }

    async fn close_all(&self) -> Result<(), ChannelError> {
        let mut state = self.lock();
        state.calls.push(Call::CloseAll);
        state.open_ports.clear();
        Ok(())
    }
}

#[async_trait]
impl EventChannel for MockBackend {
    async fn subscribe(&self, topic: &str) -> Result<Subscription, ChannelError> {
        let receiver = self.sender_for(topic).subscribe();

        let chunks = BroadcastStream::new(receiver)
            .filter_map(|chunk| async move { chunk.ok() })
            .boxed();

        debug!("Mock subscription on `{topic}`");
        Ok(Subscription::new(topic, chunks))
    }
}
