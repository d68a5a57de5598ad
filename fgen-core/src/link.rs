//! Instrument link: the transport seam between the command channel and an
//! instrument bus.
//!
//! `InstrumentLink` captures what the channel *means* to do (open a session,
//! move bytes, bound a read) independently of how it's done (a VISA shared
//! library, or the in-memory simulator). This enables unit testing of the
//! whole command stack without attached hardware.

use std::fmt;

/// Result type for link operations.
pub type LinkResult<T = ()> = Result<T, LinkError>;

/// Error from a link operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The read window elapsed with no response. Callers treat this as
    /// benign for error-status polls the device chooses not to answer.
    Timeout,
    /// The transport capability is missing: library not found or required
    /// entry points unresolved.
    Unavailable(String),
    /// Any other transport failure, carrying the underlying status text.
    Io(String),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::Timeout => write!(f, "read timed out"),
            LinkError::Unavailable(msg) => write!(f, "link unavailable: {}", msg),
            LinkError::Io(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for LinkError {}

/// An open session to one instrument.
///
/// Sessions are owned exclusively by the command channel and closed on drop.
pub trait LinkSession: Send {
    /// Send raw bytes down the bus.
    fn write(&mut self, bytes: &[u8]) -> LinkResult;

    /// Read up to `max_len` bytes of response.
    fn read(&mut self, max_len: usize) -> LinkResult<Vec<u8>>;

    /// Set the I/O timeout applied to subsequent reads, in milliseconds.
    fn set_timeout_ms(&mut self, timeout_ms: u32) -> LinkResult;

    /// Flush buffered output to the device.
    fn flush(&mut self) -> LinkResult;
}

/// A loaded transport capability that can open sessions by resource string
/// (e.g. `GPIB0::10::INSTR`).
pub trait InstrumentLink: Send + Sync {
    fn open(&self, resource: &str) -> LinkResult<Box<dyn LinkSession>>;
}
