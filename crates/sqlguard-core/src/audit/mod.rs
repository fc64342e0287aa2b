//! Audit pipeline.
//!
//! Security events become [`AuditEvent`] values, which an [`AuditLogger`]
//! persists as newline-delimited JSON. [`get_events`] scans such a log back.
//!
//! Audit failures never abort the audited operation; they are reported
//! through `tracing` instead.

pub mod event;
pub mod logger;
pub mod reader;
pub mod statement;
pub mod writer;

pub use event::{AuditEvent, AuditEventType, AuditResult};
pub use logger::{
    AuditLogger, AuditLoggerConfig, AuditState, FileAuditLogger, MemoryAuditLogger,
    NullAuditLogger, DEFAULT_BUFFER_SIZE, DEFAULT_FLUSH_INTERVAL,
};
pub use reader::{get_events, get_events_filtered, read_events, AuditFilter};
pub use statement::{normalize_statement, DEFAULT_MAX_STATEMENT_LENGTH, TRUNCATION_MARKER};
pub use writer::{AuditWriter, STDOUT_PATH};
