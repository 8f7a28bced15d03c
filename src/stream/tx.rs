//! Transmit engine. Writes are synchronous: convert into staging, load the
//! raw buffer, push. The push itself is bounded only by the hardware
//! transport, so no background thread is involved.

use std::sync::Arc;
use std::time::Duration;

use log::error;
use serde_json::Value;

use crate::convert;
use crate::device::{ChannelDevice, HwBuffer};
use crate::error::{Result, StreamError};
use crate::format::StreamFormat;
use crate::stream::TxBuffers;

pub struct TxStreamer {
    dev: Arc<dyn ChannelDevice>,
    format: StreamFormat,
    /// Enabled hardware channels in buffer order; two per complex pair.
    channel_list: Vec<usize>,
    /// Native conversion scratch, kept at the current element count.
    staging: Vec<i16>,
    /// Raw buffer, sized to the element count of the most recent `send`.
    buf: Option<Box<dyn HwBuffer>>,
}

impl TxStreamer {
    /// Set up a transmit engine on `dev`. Channel selection works as on
    /// the receive side; no options are recognized.
    pub fn new(
        dev: Arc<dyn ChannelDevice>,
        format: StreamFormat,
        channels: &[usize],
        _args: &Value,
    ) -> Self {
        let count = dev.channel_count();
        for i in 0..count {
            dev.disable_channel(i);
        }

        let enable = if channels.is_empty() {
            count
        } else {
            channels.len() * 2
        };
        let mut channel_list = Vec::with_capacity(enable);
        for i in 0..enable {
            dev.enable_channel(i);
            channel_list.push(i);
        }

        Self {
            dev,
            format,
            channel_list,
            staging: Vec::new(),
            buf: None,
        }
    }

    /// Convert and push `num_elems` complex samples per channel pair from
    /// `buffs`. The staging and raw buffers are reallocated whenever the
    /// element count changes. Returns the number of samples the hardware
    /// accepted; the timeout is advisory, the push is bounded by the
    /// transport itself.
    pub fn send(
        &mut self,
        buffs: &TxBuffers<'_>,
        num_elems: usize,
        _timeout: Duration,
    ) -> Result<usize> {
        self.check_buffers(buffs, num_elems)?;
        if num_elems == 0 {
            return Ok(0);
        }

        if self.staging.len() != num_elems || self.buf.is_none() {
            self.buf = None;
            self.staging.resize(num_elems, 0);
            match self.dev.create_buffer(num_elems) {
                Ok(buf) => self.buf = Some(buf),
                Err(e) => {
                    error!("Unable to create buffer: {}", e);
                    return Err(StreamError::BufferAllocation(e.to_string()));
                }
            }
        }

        let buf = match self.buf.as_mut() {
            Some(buf) => buf,
            None => {
                return Err(StreamError::BufferAllocation(
                    "transmit buffer missing".to_string(),
                ))
            }
        };

        for (pos, &channel) in self.channel_list.iter().enumerate() {
            let pair = pos / 2;
            let iq = pos % 2;

            match buffs {
                TxBuffers::Cs16(input) => {
                    convert::cs16_to_native(input[pair], &mut self.staging, iq);
                }
                TxBuffers::Cf32(input) => {
                    convert::cf32_to_native(input[pair], &mut self.staging, iq);
                }
                TxBuffers::Cs8(input) => {
                    convert::cs8_to_native(input[pair], &mut self.staging, iq);
                }
            }

            buf.write_channel(channel, &self.staging)
                .map_err(|e| StreamError::Transfer(e.to_string()))?;
        }

        let bytes = buf.push().map_err(|e| StreamError::Transfer(e.to_string()))?;
        Ok(bytes / buf.step().max(1))
    }

    fn check_buffers(&self, buffs: &TxBuffers<'_>, num_elems: usize) -> Result<()> {
        if buffs.format() != self.format {
            return Err(StreamError::UnsupportedFormat(format!(
                "stream is {}, buffers are {}",
                self.format,
                buffs.format()
            )));
        }
        let pairs = (self.channel_list.len() + 1) / 2;
        if buffs.channel_pairs() != pairs {
            return Err(StreamError::BufferMismatch(format!(
                "expected {} channel buffers, got {}",
                pairs,
                buffs.channel_pairs()
            )));
        }
        if buffs.capacity() < num_elems {
            return Err(StreamError::BufferMismatch(format!(
                "buffers hold {} samples, {} requested",
                buffs.capacity(),
                num_elems
            )));
        }
        Ok(())
    }
}

impl Drop for TxStreamer {
    fn drop(&mut self) {
        for &channel in &self.channel_list {
            self.dev.disable_channel(channel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::SimulatedDevice;
    use serde_json::json;

    #[test]
    fn test_zero_elements_is_a_no_op() {
        let dev = Arc::new(SimulatedDevice::new(2));
        let mut tx = TxStreamer::new(dev.clone(), StreamFormat::Cs16, &[0], &json!({}));
        let input = [0i16; 8];
        let sent = tx
            .send(
                &TxBuffers::Cs16(vec![&input[..]]),
                0,
                Duration::from_millis(10),
            )
            .unwrap();
        assert_eq!(sent, 0);
        assert_eq!(dev.buffers_created(), 0);
        assert!(dev.pushed().is_empty());
    }

    #[test]
    fn test_drop_disables_channels() {
        let dev = Arc::new(SimulatedDevice::new(2));
        let tx = TxStreamer::new(dev.clone(), StreamFormat::Cs8, &[0], &json!({}));
        assert_eq!(dev.enabled_channels(), vec![0, 1]);
        drop(tx);
        assert!(dev.enabled_channels().is_empty());
    }
}
