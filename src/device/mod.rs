//! Boundary to the hardware channel library. The streaming engines drive
//! these traits; `mock` provides the simulated implementation used by tests
//! and the demo binary.

use anyhow::Result;

pub mod mock;

/// A streaming-capable device front end for one direction (receive or
/// transmit). Channel indices are hardware channel slots; one complex
/// stream occupies two consecutive slots (I then Q).
pub trait ChannelDevice: Send + Sync {
    /// Number of hardware channels this device exposes.
    fn channel_count(&self) -> usize;

    /// Mark a channel as participating in subsequent buffers.
    fn enable_channel(&self, channel: usize);

    /// Remove a channel from subsequent buffers.
    fn disable_channel(&self, channel: usize);

    /// Allocate a sample buffer spanning the currently enabled channels.
    /// `frames` is the capacity in samples per channel.
    fn create_buffer(&self, frames: usize) -> Result<Box<dyn HwBuffer>>;
}

/// One allocated hardware sample buffer. Released by dropping it.
pub trait HwBuffer: Send {
    /// Capacity in samples per enabled channel.
    fn frames(&self) -> usize;

    /// Bytes per frame across all enabled channels.
    fn step(&self) -> usize;

    /// Blocking capture into this buffer. Returns the number of bytes
    /// transferred; fails on hardware error or cancellation.
    fn refill(&mut self) -> Result<usize>;

    /// Blocking transmit of this buffer's contents. Returns the number of
    /// bytes transferred.
    fn push(&mut self) -> Result<usize>;

    /// Handle for aborting an in-flight `refill` or `push` from another
    /// thread. Must remain safe to invoke after the buffer is released.
    fn cancel_handle(&self) -> Box<dyn BufferCancel>;

    /// Copy captured native samples of one channel out of the buffer,
    /// skipping the first `offset` frames.
    fn read_channel(&self, channel: usize, dst: &mut [i16], offset: usize) -> Result<()>;

    /// Copy native samples of one channel into the buffer.
    fn write_channel(&mut self, channel: usize, src: &[i16]) -> Result<()>;
}

/// Cross-thread cancellation for a blocking transfer.
pub trait BufferCancel: Send + Sync {
    fn cancel(&self);
}
