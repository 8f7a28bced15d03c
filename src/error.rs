use thiserror::Error;

/// Errors surfaced by the streaming engine.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The session was opened against a direction the device does not provide.
    #[error("no {0} device available")]
    DeviceNotFound(&'static str),

    /// A receive stream is already open on this device.
    #[error("a receive stream is already open on this device")]
    ReceiverBusy,

    /// The hardware refused to allocate a sample buffer. Fatal for the
    /// operation that triggered it.
    #[error("unable to create buffer: {0}")]
    BufferAllocation(String),

    /// No samples became available within the caller's deadline, or the
    /// stream has terminated.
    #[error("timed out waiting for samples")]
    Timeout,

    /// A hardware transfer failed mid-stream.
    #[error("transfer failed: {0}")]
    Transfer(String),

    /// Unknown wire-format identifier, or caller buffers of the wrong
    /// sample type for this stream.
    #[error("unsupported stream format: {0}")]
    UnsupportedFormat(String),

    /// Caller supplied too few channel buffers, or buffers too short for
    /// the requested element count.
    #[error("buffer mismatch: {0}")]
    BufferMismatch(String),

    /// Read on a transmit-only stream, or write on a receive-only stream.
    #[error("stream has no {0} side")]
    WrongDirection(&'static str),
}

pub type Result<T> = std::result::Result<T, StreamError>;
