//! Audit loggers.
//!
//! [`FileAuditLogger`] writes JSON lines either synchronously or through a
//! bounded queue drained by a background thread.
//!
//! ```text
//! sync:   log() -> lock sink -> write + flush -> return
//! async:  log() -> try_send ──ok──> queue -> consumer -> write (flush every interval)
//!                           └─full─> lock sink -> write + flush -> return
//! ```
//!
//! A full queue never drops an event; the producer writes it itself. Such an
//! overflow write can land before earlier events still sitting in the queue,
//! so in async mode file order may differ from call order under load.

use std::collections::HashSet;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use super::event::AuditEvent;
use super::writer::AuditWriter;
use crate::error::{SecurityError, SecurityResult};

/// Default async queue capacity.
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Default period between background flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Trait for audit log backends.
pub trait AuditLogger: Send + Sync {
    /// Log an audit event. Never fails; write errors are reported via tracing.
    fn log(&self, event: AuditEvent);

    /// Flush any buffered events.
    fn flush(&self) -> SecurityResult<()>;

    /// Drain, flush, and release the backend. Events logged afterwards are dropped.
    fn close(&self) -> SecurityResult<()> {
        self.flush()
    }
}

/// Lifecycle of a [`FileAuditLogger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditState {
    /// Synchronous mode, ready.
    Idle,
    /// Async mode, consumer running.
    Running,
    /// Close requested, consumer draining the queue.
    Draining,
    /// Sink flushed and released.
    Closed,
}

/// Settings for [`FileAuditLogger`].
#[derive(Debug, Clone)]
pub struct AuditLoggerConfig {
    /// Deliver through the background queue.
    pub async_mode: bool,
    /// Queue capacity in events.
    pub buffer_size: usize,
    /// Client addresses whose events are discarded.
    pub exclude_ips: Vec<String>,
    /// Background flush period.
    pub flush_interval: Duration,
}

impl Default for AuditLoggerConfig {
    fn default() -> Self {
        Self {
            async_mode: false,
            buffer_size: DEFAULT_BUFFER_SIZE,
            exclude_ips: Vec::new(),
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl AuditLoggerConfig {
    /// Enable async delivery with the given queue capacity.
    pub fn with_async(mut self, buffer_size: usize) -> Self {
        self.async_mode = true;
        self.buffer_size = buffer_size;
        self
    }

    /// Discard events from these client addresses.
    pub fn with_exclude_ips<I, S>(mut self, ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_ips.extend(ips.into_iter().map(Into::into));
        self
    }

    /// Set the background flush period.
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }
}

enum Message {
    Event(AuditEvent),
    Shutdown,
}

/// State shared between producers and the consumer thread.
struct Shared {
    writer: Mutex<Option<AuditWriter>>,
    exclude_ips: HashSet<String>,
    state: Mutex<AuditState>,
    overflow_writes: AtomicU64,
}

impl Shared {
    fn is_excluded(&self, client_ip: &str) -> bool {
        self.exclude_ips.contains(client_ip)
    }

    fn write(&self, event: &AuditEvent, flush: bool) {
        let mut guard = self.writer.lock();
        let Some(writer) = guard.as_mut() else {
            tracing::warn!(
                event_type = %event.event_type,
                username = %event.username,
                "audit event dropped, logger is closed"
            );
            return;
        };
        if let Err(e) = writer.write_event(event) {
            tracing::error!(error = %e, event_type = %event.event_type, "failed to write audit event");
            return;
        }
        if flush {
            if let Err(e) = writer.flush() {
                tracing::error!(error = %e, "failed to flush audit log");
            }
        }
    }

    fn flush(&self) -> SecurityResult<()> {
        if let Some(writer) = self.writer.lock().as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn set_state(&self, state: AuditState) {
        *self.state.lock() = state;
    }
}

/// JSON-lines audit logger over stdout, a file, or a custom writer.
pub struct FileAuditLogger {
    shared: Arc<Shared>,
    sender: RwLock<Option<SyncSender<Message>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl FileAuditLogger {
    /// Open a logger on `path` (empty or `"stdout"` for standard output).
    pub fn open(path: &str, config: AuditLoggerConfig) -> SecurityResult<Self> {
        Self::with_writer(AuditWriter::open(path)?, config)
    }

    /// Create a logger over an already opened sink.
    pub fn with_writer(writer: AuditWriter, config: AuditLoggerConfig) -> SecurityResult<Self> {
        let initial = if config.async_mode {
            AuditState::Running
        } else {
            AuditState::Idle
        };
        let shared = Arc::new(Shared {
            writer: Mutex::new(Some(writer)),
            exclude_ips: config.exclude_ips.iter().cloned().collect(),
            state: Mutex::new(initial),
            overflow_writes: AtomicU64::new(0),
        });

        if !config.async_mode {
            return Ok(Self {
                shared,
                sender: RwLock::new(None),
                worker: Mutex::new(None),
            });
        }

        let (tx, rx) = mpsc::sync_channel(config.buffer_size.max(1));
        let consumer_shared = Arc::clone(&shared);
        let flush_interval = config.flush_interval;
        let handle = thread::Builder::new()
            .name("sqlguard-audit".to_string())
            .spawn(move || Self::consumer_loop(consumer_shared, rx, flush_interval))?;

        tracing::debug!(buffer_size = config.buffer_size, "async audit consumer started");
        Ok(Self {
            shared,
            sender: RwLock::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> AuditState {
        *self.shared.state.lock()
    }

    /// Events written by the producer because the queue was full.
    pub fn overflow_writes(&self) -> u64 {
        self.shared.overflow_writes.load(Ordering::Relaxed)
    }

    /// Whether events go through the background queue.
    pub fn is_async(&self) -> bool {
        self.sender.read().is_some()
    }

    fn consumer_loop(shared: Arc<Shared>, rx: Receiver<Message>, flush_interval: Duration) {
        let mut last_flush = Instant::now();
        loop {
            let wait = flush_interval.saturating_sub(last_flush.elapsed());
            match rx.recv_timeout(wait) {
                Ok(Message::Event(event)) => shared.write(&event, false),
                Ok(Message::Shutdown) => {
                    shared.set_state(AuditState::Draining);
                    while let Ok(message) = rx.try_recv() {
                        if let Message::Event(event) = message {
                            shared.write(&event, false);
                        }
                    }
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if last_flush.elapsed() >= flush_interval {
                if let Err(e) = shared.flush() {
                    tracing::error!(error = %e, "periodic audit flush failed");
                }
                last_flush = Instant::now();
            }
        }

        if let Err(e) = shared.flush() {
            tracing::error!(error = %e, "final audit flush failed");
        }
    }
}

impl AuditLogger for FileAuditLogger {
    fn log(&self, event: AuditEvent) {
        if self.shared.is_excluded(&event.client_ip) {
            return;
        }

        let sender = self.sender.read();
        let Some(tx) = sender.as_ref() else {
            self.shared.write(&event, true);
            return;
        };

        match tx.try_send(Message::Event(event)) {
            Ok(()) => {}
            Err(TrySendError::Full(Message::Event(event))) => {
                tracing::debug!("audit queue full, writing synchronously");
                self.shared.overflow_writes.fetch_add(1, Ordering::Relaxed);
                self.shared.write(&event, true);
            }
            Err(TrySendError::Disconnected(Message::Event(event))) => {
                tracing::warn!("audit consumer gone, writing synchronously");
                self.shared.write(&event, true);
            }
            Err(_) => {}
        }
    }

    fn flush(&self) -> SecurityResult<()> {
        self.shared.flush()
    }

    fn close(&self) -> SecurityResult<()> {
        // Taking the sender under the write lock waits out in-flight producers.
        let sender = self.sender.write().take();
        if let Some(tx) = sender {
            self.shared.set_state(AuditState::Draining);
            if tx.send(Message::Shutdown).is_err() {
                tracing::warn!("audit consumer exited before shutdown");
            }
            drop(tx);
            if let Some(handle) = self.worker.lock().take() {
                if handle.join().is_err() {
                    tracing::error!("audit consumer panicked");
                }
            }
        }

        let writer = self.shared.writer.lock().take();
        self.shared.set_state(AuditState::Closed);
        match writer {
            Some(writer) => writer.close().map_err(SecurityError::from),
            None => Ok(()),
        }
    }
}

impl Drop for FileAuditLogger {
    fn drop(&mut self) {
        if self.state() != AuditState::Closed {
            if let Err(e) = self.close() {
                tracing::error!(error = %e, "failed to close audit log on drop");
            }
        }
    }
}

/// In-memory audit logger for testing.
#[derive(Debug, Default)]
pub struct MemoryAuditLogger {
    events: Mutex<Vec<AuditEvent>>,
    exclude_ips: HashSet<String>,
}

impl MemoryAuditLogger {
    /// Create a new memory logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a memory logger that discards events from these addresses.
    pub fn with_exclude_ips<I, S>(ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            events: Mutex::new(Vec::new()),
            exclude_ips: ips.into_iter().map(Into::into).collect(),
        }
    }

    /// Get all logged events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Clear all events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Get event count.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl AuditLogger for MemoryAuditLogger {
    fn log(&self, event: AuditEvent) {
        if !self.exclude_ips.contains(&event.client_ip) {
            self.events.lock().push(event);
        }
    }

    fn flush(&self) -> SecurityResult<()> {
        Ok(())
    }
}

/// No-op audit logger that discards all events.
#[derive(Debug, Default)]
pub struct NullAuditLogger;

impl AuditLogger for NullAuditLogger {
    fn log(&self, _event: AuditEvent) {}

    fn flush(&self) -> SecurityResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::event::AuditEventType;
    use std::io::{self, Write};

    /// Writer whose contents stay inspectable after being boxed into a sink.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.lock().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn logger(buffer: &SharedBuffer, config: AuditLoggerConfig) -> FileAuditLogger {
        FileAuditLogger::with_writer(AuditWriter::from_writer(buffer.clone()), config).unwrap()
    }

    #[test]
    fn test_sync_write_is_flushed_immediately() {
        let buffer = SharedBuffer::default();
        let log = logger(&buffer, AuditLoggerConfig::default());
        assert_eq!(log.state(), AuditState::Idle);

        log.log(AuditEvent::authentication("alice", "10.0.0.2", true));
        let lines = buffer.lines();
        assert_eq!(lines.len(), 1);
        let event: AuditEvent = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(event.username, "alice");
        assert_eq!(event.event_type, AuditEventType::Authentication);

        log.close().unwrap();
        assert_eq!(log.state(), AuditState::Closed);
    }

    #[test]
    fn test_excluded_ips_are_dropped() {
        let buffer = SharedBuffer::default();
        let log = logger(
            &buffer,
            AuditLoggerConfig::default().with_exclude_ips(["10.0.0.1"]),
        );

        log.log(AuditEvent::authentication("alice", "10.0.0.1", true));
        log.log(AuditEvent::authentication("alice", "10.0.0.2", true));
        log.close().unwrap();

        let lines = buffer.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("10.0.0.2"));
    }

    #[test]
    fn test_async_close_drains_queue() {
        let buffer = SharedBuffer::default();
        let log = logger(&buffer, AuditLoggerConfig::default().with_async(64));
        assert_eq!(log.state(), AuditState::Running);
        assert!(log.is_async());

        for i in 0..50 {
            log.log(AuditEvent::authentication(format!("user{}", i), "10.0.0.2", true));
        }
        log.close().unwrap();

        assert_eq!(log.state(), AuditState::Closed);
        assert_eq!(buffer.lines().len(), 50);
    }

    /// Sink that blocks its first write until released.
    struct GatedWriter {
        inner: SharedBuffer,
        entered: Option<mpsc::Sender<()>>,
        release: mpsc::Receiver<()>,
    }

    impl Write for GatedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Some(entered) = self.entered.take() {
                let _ = entered.send(());
                let _ = self.release.recv();
            }
            self.inner.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_full_queue_falls_back_to_sync_write() {
        let buffer = SharedBuffer::default();
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let writer = GatedWriter {
            inner: buffer.clone(),
            entered: Some(entered_tx),
            release: release_rx,
        };
        let log = Arc::new(
            FileAuditLogger::with_writer(
                AuditWriter::from_writer(writer),
                AuditLoggerConfig::default()
                    .with_async(1)
                    .with_flush_interval(Duration::from_millis(1)),
            )
            .unwrap(),
        );

        // The consumer takes the first event and blocks inside the sink.
        log.log(AuditEvent::authentication("first", "10.0.0.2", true));
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // The second event fills the queue, the third overflows.
        log.log(AuditEvent::authentication("queued", "10.0.0.2", true));
        assert_eq!(log.overflow_writes(), 0);
        let producer = {
            let log = Arc::clone(&log);
            thread::spawn(move || log.log(AuditEvent::authentication("overflow", "10.0.0.2", true)))
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while log.overflow_writes() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(log.overflow_writes(), 1);
        assert!(buffer.lines().is_empty());

        release_tx.send(()).unwrap();
        producer.join().unwrap();
        log.close().unwrap();

        let mut names: Vec<String> = buffer
            .lines()
            .iter()
            .map(|l| serde_json::from_str::<AuditEvent>(l).unwrap().username)
            .collect();
        names.sort();
        assert_eq!(names, vec!["first", "overflow", "queued"]);
        assert_eq!(log.overflow_writes(), 1);
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let buffer = SharedBuffer::default();
        let log = Arc::new(logger(&buffer, AuditLoggerConfig::default().with_async(1)));

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for i in 0..100 {
                        log.log(AuditEvent::authentication(
                            format!("user{}-{}", t, i),
                            "10.0.0.2",
                            false,
                        ));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        log.close().unwrap();

        assert_eq!(buffer.lines().len(), 400);
    }

    #[test]
    fn test_periodic_flush() {
        let buffer = SharedBuffer::default();
        let log = logger(
            &buffer,
            AuditLoggerConfig::default()
                .with_async(16)
                .with_flush_interval(Duration::from_millis(20)),
        );

        log.log(AuditEvent::authentication("alice", "10.0.0.2", true));
        let deadline = Instant::now() + Duration::from_secs(5);
        while buffer.lines().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(buffer.lines().len(), 1);
        log.close().unwrap();
    }

    #[test]
    fn test_log_after_close_is_dropped() {
        let buffer = SharedBuffer::default();
        let log = logger(&buffer, AuditLoggerConfig::default().with_async(4));
        log.close().unwrap();
        log.log(AuditEvent::authentication("late", "10.0.0.2", true));
        assert!(buffer.lines().is_empty());
    }

    #[test]
    fn test_memory_logger() {
        let logger = MemoryAuditLogger::with_exclude_ips(["127.0.0.1"]);
        logger.log(AuditEvent::authentication("a", "127.0.0.1", true));
        logger.log(AuditEvent::authentication("b", "10.0.0.9", true));

        assert_eq!(logger.len(), 1);
        assert_eq!(logger.events()[0].username, "b");
        logger.clear();
        assert!(logger.is_empty());
    }

    #[test]
    fn test_null_logger() {
        let logger = NullAuditLogger;
        logger.log(AuditEvent::authentication("a", "10.0.0.1", true));
        logger.flush().unwrap();
        logger.close().unwrap();
    }
}
