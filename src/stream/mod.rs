//! The streaming engines and the session layer that manages them.

pub mod rx;
pub mod session;
pub mod tx;

pub use rx::RxStreamer;
pub use session::{SessionManager, Stream};
pub use tx::TxStreamer;

use crate::format::StreamFormat;

/// Caller-owned output buffers for a receive stream: one complex
/// interleaved slice per channel pair.
pub enum RxBuffers<'a> {
    Cs8(Vec<&'a mut [i8]>),
    Cs16(Vec<&'a mut [i16]>),
    Cf32(Vec<&'a mut [f32]>),
}

impl<'a> RxBuffers<'a> {
    pub fn format(&self) -> StreamFormat {
        match self {
            RxBuffers::Cs8(_) => StreamFormat::Cs8,
            RxBuffers::Cs16(_) => StreamFormat::Cs16,
            RxBuffers::Cf32(_) => StreamFormat::Cf32,
        }
    }

    /// Number of channel-pair buffers supplied.
    pub fn channel_pairs(&self) -> usize {
        match self {
            RxBuffers::Cs8(b) => b.len(),
            RxBuffers::Cs16(b) => b.len(),
            RxBuffers::Cf32(b) => b.len(),
        }
    }

    /// Complex samples the smallest supplied buffer can hold.
    pub fn capacity(&self) -> usize {
        match self {
            RxBuffers::Cs8(b) => b.iter().map(|c| c.len() / 2).min().unwrap_or(0),
            RxBuffers::Cs16(b) => b.iter().map(|c| c.len() / 2).min().unwrap_or(0),
            RxBuffers::Cf32(b) => b.iter().map(|c| c.len() / 2).min().unwrap_or(0),
        }
    }
}

/// Caller-owned input buffers for a transmit stream: one complex
/// interleaved slice per channel pair.
pub enum TxBuffers<'a> {
    Cs8(Vec<&'a [i8]>),
    Cs16(Vec<&'a [i16]>),
    Cf32(Vec<&'a [f32]>),
}

impl<'a> TxBuffers<'a> {
    pub fn format(&self) -> StreamFormat {
        match self {
            TxBuffers::Cs8(_) => StreamFormat::Cs8,
            TxBuffers::Cs16(_) => StreamFormat::Cs16,
            TxBuffers::Cf32(_) => StreamFormat::Cf32,
        }
    }

    /// Number of channel-pair buffers supplied.
    pub fn channel_pairs(&self) -> usize {
        match self {
            TxBuffers::Cs8(b) => b.len(),
            TxBuffers::Cs16(b) => b.len(),
            TxBuffers::Cf32(b) => b.len(),
        }
    }

    /// Complex samples held by the smallest supplied buffer.
    pub fn capacity(&self) -> usize {
        match self {
            TxBuffers::Cs8(b) => b.iter().map(|c| c.len() / 2).min().unwrap_or(0),
            TxBuffers::Cs16(b) => b.iter().map(|c| c.len() / 2).min().unwrap_or(0),
            TxBuffers::Cf32(b) => b.iter().map(|c| c.len() / 2).min().unwrap_or(0),
        }
    }
}
