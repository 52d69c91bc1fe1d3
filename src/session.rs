use std::fmt::Display;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

use crate::{
    channel::{ChannelError, CommandChannel, OpenOptions},
    config::{ConfigDelta, SessionConfig},
    decode::decode,
    error::Error,
    events::{EventChannel, ReadChunk},
};

/// Whether a session currently holds its port.
///
/// There is no intermediate state; `open` and `close` look atomic
/// from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No port held.
    Closed,

    /// Port held; writing and reading are possible.
    Open,
}

impl Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Closed => write!(f, "closed"),
            SessionState::Open => write!(f, "open"),
        }
    }
}

/// Flags shared between session methods and the polling task.
///
/// The polling loop gates each iteration on `write_in_flight`,
/// never on `open`; checking open-ness there would race with
/// teardown.
#[derive(Debug, Default)]
struct Guards {
    open: AtomicBool,
    read_active: AtomicBool,
    write_in_flight: AtomicBool,
}

/// Clears `write_in_flight` on every exit path out of a write.
struct WriteGuard(Arc<Guards>);

impl WriteGuard {
    fn engage(guards: &Arc<Guards>) -> Self {
        guards.write_in_flight.store(true, Ordering::SeqCst);
        Self(Arc::clone(guards))
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.0.write_in_flight.store(false, Ordering::SeqCst);
    }
}

/// The forwarding task owning the active subscription.
struct Listener {
    topic: String,
    task: JoinHandle<()>,
}

/// One logical client-side handle to a named serial port.
///
/// Composes a [`CommandChannel`] for request/response operations and
/// an [`EventChannel`] for inbound data, and owns the state which
/// makes open/close/listen/read/write idempotent and race-free from
/// the caller's side.
///
/// Concurrent sessions on distinct paths share nothing. Within one
/// session, `write_in_flight` is the only fence between a write and
/// the polling loop; it does not sequence write against write, nor
/// close against write. Callers should let outstanding writes
/// resolve before closing.
pub struct SerialSession {
    config: SessionConfig,
    commands: Arc<dyn CommandChannel>,
    events: Arc<dyn EventChannel>,
    guards: Arc<Guards>,
    listener: Option<Listener>,
    poll_task: Option<JoinHandle<()>>,
}

impl SerialSession {
    /// A closed session over the given collaborators.
    ///
    /// Opening is separate; constructing performs no backend calls.
    pub fn new(
        config: SessionConfig,
        commands: Arc<dyn CommandChannel>,
        events: Arc<dyn EventChannel>,
    ) -> Self {
        Self {
            config,
            commands,
            events,
            guards: Arc::new(Guards::default()),
            listener: None,
            poll_task: None,
        }
    }

    /// The current configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Whether the session holds its port.
    pub fn state(&self) -> SessionState {
        if self.guards.open.load(Ordering::SeqCst) {
            SessionState::Open
        } else {
            SessionState::Closed
        }
    }

    /// Whether the polling loop is running.
    pub fn is_reading(&self) -> bool {
        self.guards.read_active.load(Ordering::SeqCst)
    }

    /// Whether a listener is registered.
    pub fn is_listening(&self) -> bool {
        self.listener.is_some()
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.guards.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::NotOpen(self.config.path.clone()))
        }
    }

    /// Propagate a backend result, correcting local state on failure.
    ///
    /// A backend error means the backend's view of the port can no
    /// longer be trusted to match ours, typically because something
    /// closed it behind our back. Claiming `Open` past that point
    /// would wedge the caller; `Closed` lets them reopen.
    fn backend<T>(&self, result: Result<T, ChannelError>) -> Result<T, Error> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                self.guards.open.store(false, Ordering::SeqCst);
                Err(Error::Backend(e))
            }
        }
    }

    /// Open the port with the full link configuration.
    ///
    /// Fails with [`Error::InvalidConfiguration`] before any backend
    /// call if `path` or `baud_rate` is missing, and with
    /// [`Error::AlreadyOpen`] on a session which already holds its
    /// port. Does not start reading or listening; those are separate
    /// opt-ins.
    pub async fn open(&mut self) -> Result<(), Error> {
        self.config.validate()?;

        if self.guards.open.load(Ordering::SeqCst) {
            return Err(Error::AlreadyOpen(self.config.path.clone()));
        }

        self.backend(self.commands.open(OpenOptions::from(&self.config)).await)?;

        self.guards.open.store(true, Ordering::SeqCst);
        info!(%self.config, "Session open");
        Ok(())
    }

    /// Release the port.
    ///
    /// A no-op on a closed session, so teardown is idempotent. The
    /// polling loop is halted before the backend `close` goes out,
    /// and the listener is revoked in every branch afterwards; even
    /// a failing backend `close` leaves the session locally closed.
    pub async fn close(&mut self) -> Result<(), Error> {
        if !self.guards.open.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.halt_polling().await;

        let result = self.commands.close(&self.config.path).await;

        self.cancel_listen();
        self.guards.open.store(false, Ordering::SeqCst);

        debug!(%self.config.path, "Session closed");
        result.map_err(Error::Backend)
    }

    /// Put text on the wire. Returns the backend's byte count.
    pub async fn write(&mut self, value: &str) -> Result<usize, Error> {
        self.ensure_open()?;

        let guard = WriteGuard::engage(&self.guards);
        let result = self.commands.write(&self.config.path, value).await;
        drop(guard);

        self.backend(result)
    }

    /// Put raw bytes on the wire. Returns the backend's byte count.
    pub async fn write_bytes(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        self.ensure_open()?;

        let guard = WriteGuard::engage(&self.guards);
        let result = self.commands.write_bytes(&self.config.path, bytes).await;
        drop(guard);

        self.backend(result)
    }

    /// Start the polling read loop.
    ///
    /// A no-op if the loop is already running. Each iteration either
    /// defers to an in-flight write or issues one backend `read`,
    /// then sleeps for the configured interval. The first backend
    /// failure stops the loop for good; call `read` again to resume.
    pub async fn read(&mut self) -> Result<(), Error> {
        self.ensure_open()?;

        if self.guards.read_active.swap(true, Ordering::SeqCst) {
            trace!("Polling already active");
            return Ok(());
        }

        let guards = Arc::clone(&self.guards);
        let commands = Arc::clone(&self.commands);
        let path = self.config.path.clone();
        let interval = self.config.timeout;
        let size = self.config.read_size;

        let poll_span = info_span!("poll", %self.config.path);

        let task = tokio::spawn(
            async move {
                debug!("Polling started");

                while guards.read_active.load(Ordering::SeqCst) {
                    if guards.write_in_flight.load(Ordering::SeqCst) {
                        trace!("Write in flight, deferring");
                        tokio::time::sleep(interval).await;
                        continue;
                    }

                    match commands.read(&path, interval, size).await {
                        Ok(()) => tokio::time::sleep(interval).await,
                        Err(e) => {
                            error!(?e, "Backend read failed, polling stops");
                            guards.read_active.store(false, Ordering::SeqCst);
                            guards.open.store(false, Ordering::SeqCst);
                            break;
                        }
                    }
                }

                debug!("Polling stopped");
            }
            .instrument(poll_span),
        );

        self.poll_task = Some(task);
        Ok(())
    }

    /// Ask the polling loop to stop.
    ///
    /// Takes effect at the next iteration boundary, so up to one
    /// interval may pass before the last `read` goes out.
    pub fn cancel_read(&self) {
        if self.guards.read_active.swap(false, Ordering::SeqCst) {
            debug!("Polling cancellation requested");
        }
    }

    async fn halt_polling(&mut self) {
        self.guards.read_active.store(false, Ordering::SeqCst);

        if let Some(task) = self.poll_task.take() {
            if let Err(e) = task.await {
                warn!(?e, "Polling task did not stop cleanly");
            }
        }
    }

    /// Subscribe to inbound data, decoded to text.
    ///
    /// Replaces any existing listener; at most one callback is ever
    /// registered, so chunks are never delivered twice. Undecodable
    /// chunks are logged and skipped; they do not tear down the
    /// subscription.
    pub async fn listen<F>(&mut self, callback: F) -> Result<(), Error>
    where
        F: Fn(String) + Send + 'static,
    {
        let encoding = self.config.encoding;

        self.listen_with(move |chunk: ReadChunk| {
            match decode(chunk.valid_bytes(), encoding) {
                Ok(text) => callback(text),
                Err(e) => warn!(?e, %chunk, "Discarding undecodable chunk"),
            }
        })
        .await
    }

    /// Subscribe to inbound data as raw bytes.
    pub async fn listen_bytes<F>(&mut self, callback: F) -> Result<(), Error>
    where
        F: Fn(Vec<u8>) + Send + 'static,
    {
        self.listen_with(move |chunk: ReadChunk| callback(chunk.data)).await
    }

    async fn listen_with<F>(&mut self, handle_chunk: F) -> Result<(), Error>
    where
        F: Fn(ReadChunk) + Send + 'static,
    {
        self.cancel_listen();

        let topic = self.config.read_topic();
        let mut subscription = self.events.subscribe(&topic).await?;

        let listen_span = info_span!("listen", %topic);

        let task = tokio::spawn(
            async move {
                while let Some(chunk) = subscription.next_chunk().await {
                    trace!(%chunk, "Chunk arrived");
                    handle_chunk(chunk);
                }

                debug!("Subscription drained");
            }
            .instrument(listen_span),
        );

        info!(%topic, "Listening");
        self.listener = Some(Listener { topic, task });
        Ok(())
    }

    /// Revoke the active listener, if any. Idempotent.
    pub fn cancel_listen(&mut self) {
        if let Some(listener) = self.listener.take() {
            // Aborting the task drops the subscription, which is
            // the revocation.
            listener.task.abort();
            debug!(topic = %listener.topic, "Listener revoked");
        }
    }

    /// Move the session to another port.
    ///
    /// See [`change`](Self::change).
    pub async fn set_path<S: AsRef<str>>(&mut self, path: S) -> Result<(), Error> {
        self.change(ConfigDelta::path(path)).await
    }

    /// Change the link speed.
    ///
    /// See [`change`](Self::change).
    pub async fn set_baud_rate(&mut self, baud_rate: u32) -> Result<(), Error> {
        self.change(ConfigDelta::baud_rate(baud_rate)).await
    }

    /// Apply a partial reconfiguration.
    ///
    /// An open session is closed, reconfigured and reopened, so the
    /// caller observes the same open/closed state before and after.
    /// A failure in the intermediate close or reopen leaves the
    /// session wherever that sub-step ended; there is no rollback,
    /// and the new configuration values stay applied.
    pub async fn change(&mut self, delta: ConfigDelta) -> Result<(), Error> {
        let was_open = self.state() == SessionState::Open;

        if was_open {
            self.close().await?;
        }

        delta.apply(&mut self.config);
        debug!(%self.config, "Reconfigured");

        if was_open {
            self.open().await?;
        }

        Ok(())
    }
}

impl Drop for SerialSession {
    fn drop(&mut self) {
        self.guards.read_active.store(false, Ordering::SeqCst);

        if let Some(task) = self.poll_task.take() {
            task.abort();
        }

        if let Some(listener) = self.listener.take() {
            listener.task.abort();
        }
    }
}

impl Display for SerialSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.config, self.state())
    }
}
