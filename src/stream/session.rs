//! Session layer: constructs and destroys the engines under a device-wide
//! lock, enforces the single-receiver policy, and relays data calls
//! straight to the engines.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use log::debug;
use serde_json::Value;

use crate::device::ChannelDevice;
use crate::error::{Result, StreamError};
use crate::format::{Direction, StreamFormat, DEFAULT_BUFFER_SIZE};
use crate::stream::rx::RxStreamer;
use crate::stream::tx::TxStreamer;
use crate::stream::{RxBuffers, TxBuffers};

/// One open stream: at most one receive and one transmit engine, destroyed
/// together when the stream is closed or dropped.
pub struct Stream {
    rx: Option<Arc<Mutex<RxStreamer>>>,
    tx: Option<Arc<Mutex<TxStreamer>>>,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("rx", &self.rx.is_some())
            .field("tx", &self.tx.is_some())
            .finish()
    }
}

struct SessionState {
    /// The single receiver permitted on the device. Weak, so a stream
    /// dropped without `close_stream` frees the slot by itself. Written
    /// only by `setup_stream`/`close_stream` under the device lock.
    active_rx: Option<Weak<Mutex<RxStreamer>>>,
}

pub struct SessionManager {
    rx_dev: Option<Arc<dyn ChannelDevice>>,
    tx_dev: Option<Arc<dyn ChannelDevice>>,
    /// Device-wide lock serializing the configuration path. `read_stream`
    /// and `write_stream` never take it.
    state: Mutex<SessionState>,
}

impl SessionManager {
    /// A manager with no devices attached; add directions with the
    /// `with_*` builders.
    pub fn new() -> Self {
        Self {
            rx_dev: None,
            tx_dev: None,
            state: Mutex::new(SessionState { active_rx: None }),
        }
    }

    pub fn with_rx_device(mut self, dev: Arc<dyn ChannelDevice>) -> Self {
        self.rx_dev = Some(dev);
        self
    }

    pub fn with_tx_device(mut self, dev: Arc<dyn ChannelDevice>) -> Self {
        self.tx_dev = Some(dev);
        self
    }

    /// Open a stream. A second receive stream while one is alive is
    /// rejected with `ReceiverBusy`.
    pub fn setup_stream(
        &self,
        direction: Direction,
        format: StreamFormat,
        channels: &[usize],
        args: &Value,
    ) -> Result<Stream> {
        let mut state = self.lock_state();
        match direction {
            Direction::Rx => {
                if let Some(active) = &state.active_rx {
                    if active.upgrade().is_some() {
                        return Err(StreamError::ReceiverBusy);
                    }
                }
                let dev = self
                    .rx_dev
                    .clone()
                    .ok_or(StreamError::DeviceNotFound("receive"))?;
                let rx = Arc::new(Mutex::new(RxStreamer::new(dev, format, channels, args)));
                state.active_rx = Some(Arc::downgrade(&rx));
                debug!("opened receive stream ({})", format);
                Ok(Stream {
                    rx: Some(rx),
                    tx: None,
                })
            }
            Direction::Tx => {
                let dev = self
                    .tx_dev
                    .clone()
                    .ok_or(StreamError::DeviceNotFound("transmit"))?;
                let tx = Arc::new(Mutex::new(TxStreamer::new(dev, format, channels, args)));
                debug!("opened transmit stream ({})", format);
                Ok(Stream {
                    rx: None,
                    tx: Some(tx),
                })
            }
        }
    }

    /// Tear down a stream. The receive slot clears first; the engines shut
    /// down and release their channels while the device lock is still
    /// held, so a follow-up `setup_stream` never races their teardown.
    pub fn close_stream(&self, stream: Stream) {
        let mut state = self.lock_state();
        if stream.rx.is_some() {
            state.active_rx = None;
            debug!("closed receive stream");
        }
        drop(stream);
    }

    /// Start the receive side. Succeeds without one: transmit streams need
    /// no activation.
    pub fn activate_stream(&self, stream: &Stream) -> Result<()> {
        let _state = self.lock_state();
        match &stream.rx {
            Some(rx) => lock_engine(rx).start(),
            None => Ok(()),
        }
    }

    /// Stop the receive side; idempotent, and a no-op without one.
    pub fn deactivate_stream(&self, stream: &Stream) -> Result<()> {
        let _state = self.lock_state();
        if let Some(rx) = &stream.rx {
            lock_engine(rx).stop();
        }
        Ok(())
    }

    /// Bounded read, relayed to the receive engine. Never touches the
    /// device lock.
    pub fn read_stream(
        &self,
        stream: &Stream,
        buffs: &mut RxBuffers<'_>,
        num_elems: usize,
        timeout: Duration,
    ) -> Result<usize> {
        let rx = stream
            .rx
            .as_ref()
            .ok_or(StreamError::WrongDirection("receive"))?;
        lock_engine(rx).recv(buffs, num_elems, timeout)
    }

    /// Synchronous write, relayed to the transmit engine. Never touches
    /// the device lock.
    pub fn write_stream(
        &self,
        stream: &Stream,
        buffs: &TxBuffers<'_>,
        num_elems: usize,
        timeout: Duration,
    ) -> Result<usize> {
        let tx = stream
            .tx
            .as_ref()
            .ok_or(StreamError::WrongDirection("transmit"))?;
        lock_engine(tx).send(buffs, num_elems, timeout)
    }

    /// Largest read one `recv` can serve: the receive buffer depth, or the
    /// default for streams without a receive side.
    pub fn stream_mtu(&self, stream: &Stream) -> usize {
        match &stream.rx {
            Some(rx) => lock_engine(rx).buffer_size(),
            None => DEFAULT_BUFFER_SIZE,
        }
    }

    /// Change the receive buffer depth mid-stream. No-op for streams
    /// without a receive side.
    pub fn set_buffer_size(&self, stream: &Stream, num_samples: usize) -> Result<()> {
        let _state = self.lock_state();
        match &stream.rx {
            Some(rx) => lock_engine(rx).set_buffer_size(num_samples),
            None => Ok(()),
        }
    }

    /// Rebuild the receive capture buffer, discarding any pending samples.
    pub fn reset_buffer(&self, stream: &Stream) -> Result<()> {
        let _state = self.lock_state();
        match &stream.rx {
            Some(rx) => lock_engine(rx).reset_buffer(),
            None => Ok(()),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_engine<T>(engine: &Mutex<T>) -> MutexGuard<'_, T> {
    engine
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
