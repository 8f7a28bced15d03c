pub mod convert;
pub mod device;
pub mod error;
pub mod format;
pub mod stream;

pub use error::{Result, StreamError};
pub use format::{ArgType, Direction, StreamFormat, DEFAULT_BUFFER_SIZE};
pub use stream::{RxBuffers, SessionManager, Stream, TxBuffers};
