//! Receive engine: a dedicated refill loop drives the blocking hardware
//! capture while `recv` stays bounded by the caller's timeout.
//!
//! The raw hardware buffer is a single-slot pipeline. Exactly one side owns
//! it at any time: the engine while samples are being consumed, the refill
//! loop while a capture is in flight. Possession moves over a pair of
//! rendezvous channels, so "the buffer is out" doubles as the refill
//! request flag.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};
use serde_json::Value;

use crate::convert;
use crate::device::{BufferCancel, ChannelDevice, HwBuffer};
use crate::error::{Result, StreamError};
use crate::format::{StreamFormat, DEFAULT_BUFFER_SIZE};
use crate::stream::RxBuffers;

/// One completed capture: the buffer comes home together with the number
/// of samples in it.
struct Refilled {
    buf: Box<dyn HwBuffer>,
    items: usize,
}

pub struct RxStreamer {
    dev: Arc<dyn ChannelDevice>,
    format: StreamFormat,
    /// Enabled hardware channels in buffer order; two per complex pair.
    channel_list: Vec<usize>,
    buffer_size: usize,
    /// Conversion scratch space, resized to the extraction length per call.
    staging: Vec<i16>,
    /// Precomputed float table; present only for the CF32 wire format.
    lut: Option<Vec<f32>>,
    /// The raw hardware buffer while the engine holds it. `None` while a
    /// refill is outstanding or the stream is inactive.
    buf: Option<Box<dyn HwBuffer>>,
    /// Unconsumed samples in the current capture.
    items_in_buffer: usize,
    /// Read cursor into the current capture, in hardware bytes.
    byte_offset: usize,
    job_tx: Option<Sender<Box<dyn HwBuffer>>>,
    done_rx: Option<Receiver<Refilled>>,
    refill_thread: Option<JoinHandle<()>>,
    /// Cancel handle for the buffer currently out for refill.
    cancel: Option<Box<dyn BufferCancel>>,
    /// Terminal flag: set before the first `start`, after `stop`, when the
    /// refill loop is observed dead, and when a replacement buffer cannot
    /// be allocated.
    stopped: bool,
}

impl RxStreamer {
    /// Set up a receive engine on `dev`. Enables two hardware channels per
    /// requested complex pair, in buffer order, or every channel when no
    /// subset is given. Recognized option: `bufflen` (samples per buffer).
    pub fn new(
        dev: Arc<dyn ChannelDevice>,
        format: StreamFormat,
        channels: &[usize],
        args: &Value,
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

        let buffer_size = parse_buffer_size(args);

        let lut = if format == StreamFormat::Cf32 {
            Some(convert::build_cf32_lut())
        } else {
            None
        };

        Self {
            dev,
            format,
            channel_list,
            buffer_size,
            staging: vec![0; buffer_size],
            lut,
            buf: None,
            items_in_buffer: 0,
            byte_offset: 0,
            job_tx: None,
            done_rx: None,
            refill_thread: None,
            cancel: None,
            stopped: true,
        }
    }

    /// Current hardware buffer depth in samples.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Allocate the raw buffer and spawn the refill loop. No-op if already
    /// active; a previous terminated loop is reaped first.
    pub fn start(&mut self) -> Result<()> {
        if self.refill_thread.is_some() && !self.stopped {
            return Ok(());
        }
        self.stop();

        let buf = self.create_buffer()?;
        self.buf = Some(buf);
        self.stopped = false;
        self.spawn_loop();

        debug!("receive stream active, {} samples per buffer", self.buffer_size);
        Ok(())
    }

    /// Cancel any in-flight capture, shut down the refill loop, and release
    /// the raw buffer. Idempotent.
    pub fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        let active = self.refill_thread.is_some();
        self.join_loop();
        if active {
            debug!("receive stream stopped");
        }
        self.buf = None;
        self.items_in_buffer = 0;
        self.byte_offset = 0;
        self.stopped = true;
    }

    /// Read up to `num_elems` complex samples per channel pair into
    /// `buffs`, waiting at most `timeout` for the hardware. Returns the
    /// number of samples written per pair; short reads are normal whenever
    /// the current capture holds fewer samples than requested.
    ///
    /// Once the engine has terminated, every call reports `Timeout`
    /// immediately.
    pub fn recv(
        &mut self,
        buffs: &mut RxBuffers<'_>,
        num_elems: usize,
        timeout: Duration,
    ) -> Result<usize> {
        if self.stopped {
            return Err(StreamError::Timeout);
        }
        self.check_buffers(buffs, num_elems)?;

        // Hand the exhausted buffer to the refill loop.
        if self.items_in_buffer == 0 {
            if let Some(buf) = self.buf.take() {
                self.request_refill(buf)?;
            }
        }

        // A refill is outstanding; wait for the buffer to come home.
        if self.buf.is_none() {
            let outcome = {
                let done_rx = self.done_rx.as_ref().ok_or(StreamError::Timeout)?;
                done_rx.recv_timeout(timeout)
            };
            match outcome {
                Ok(refilled) => self.accept_refill(refilled)?,
                Err(RecvTimeoutError::Timeout) => return Err(StreamError::Timeout),
                Err(RecvTimeoutError::Disconnected) => {
                    self.stopped = true;
                    return Err(StreamError::Timeout);
                }
            }
        }

        let items = self.items_in_buffer.min(num_elems);
        if items == 0 {
            return Ok(0);
        }

        let buf = self.buf.as_ref().ok_or(StreamError::Timeout)?;
        let step = buf.step().max(1);
        let offset_frames = self.byte_offset / step;
        self.staging.resize(items, 0);

        for (pos, &channel) in self.channel_list.iter().enumerate() {
            let pair = pos / 2;
            let iq = pos % 2;

            buf.read_channel(channel, &mut self.staging, offset_frames)
                .map_err(|e| StreamError::Transfer(e.to_string()))?;

            match buffs {
                RxBuffers::Cs16(out) => {
                    convert::native_to_cs16(&self.staging, &mut out[pair][..], iq);
                }
                RxBuffers::Cf32(out) => {
                    let lut = match &self.lut {
                        Some(lut) => lut,
                        None => {
                            return Err(StreamError::UnsupportedFormat(
                                "float conversion table missing".to_string(),
                            ))
                        }
                    };
                    convert::native_to_cf32(&self.staging, &mut out[pair][..], iq, lut);
                }
                RxBuffers::Cs8(out) => {
                    convert::native_to_cs8(&self.staging, &mut out[pair][..], iq);
                }
            }
        }

        self.items_in_buffer -= items;
        self.byte_offset += items * step;
        Ok(items)
    }

    /// Change the hardware buffer depth. A buffer held by the engine is
    /// released, then recreated at the new depth, discarding its unconsumed
    /// samples; a buffer out for refill is replaced when it comes home. The
    /// old buffer is always dropped before the new allocation, for hardware
    /// that permits only one live buffer.
    pub fn set_buffer_size(&mut self, num_samples: usize) -> Result<()> {
        if self.buf.is_some() && self.buffer_size != num_samples {
            self.buffer_size = num_samples;
            self.buf = None;
            self.replace_buffer()?;
        } else {
            self.buffer_size = num_samples;
        }
        Ok(())
    }

    /// Discard the current capture state and start over with a fresh
    /// buffer. An in-flight refill is cancelled before it is reclaimed, so
    /// the wait is bounded by the transport's cancellation latency, not by
    /// a stalled capture. No-op while the stream is inactive.
    pub fn reset_buffer(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }

        if self.buf.is_none() {
            if let Some(cancel) = self.cancel.take() {
                cancel.cancel();
            }
            let outcome = {
                let done_rx = self.done_rx.as_ref().ok_or(StreamError::Timeout)?;
                done_rx.recv()
            };
            match outcome {
                Ok(refilled) => drop(refilled),
                Err(_) => {
                    // The cancellation took the loop down with the
                    // capture; bring up a fresh one.
                    self.join_loop();
                    self.spawn_loop();
                    debug!("refill loop replaced after cancelled capture");
                }
            }
        } else {
            self.buf = None;
        }

        self.replace_buffer()
    }

    fn create_buffer(&mut self) -> Result<Box<dyn HwBuffer>> {
        match self.dev.create_buffer(self.buffer_size) {
            Ok(buf) => Ok(buf),
            Err(e) => {
                error!("Unable to create buffer: {}", e);
                Err(StreamError::BufferAllocation(e.to_string()))
            }
        }
    }

    fn request_refill(&mut self, buf: Box<dyn HwBuffer>) -> Result<()> {
        let cancel = buf.cancel_handle();
        let job_tx = self.job_tx.as_ref().ok_or(StreamError::Timeout)?;
        // Never blocks: the engine held the buffer, so the slot is free.
        if job_tx.send(buf).is_err() {
            self.stopped = true;
            return Err(StreamError::Timeout);
        }
        self.cancel = Some(cancel);
        Ok(())
    }

    fn accept_refill(&mut self, refilled: Refilled) -> Result<()> {
        self.cancel = None;
        if refilled.buf.frames() != self.buffer_size {
            // The depth changed while this capture was in flight; its
            // contents are for the old depth. Replace and report empty.
            drop(refilled);
            return self.replace_buffer();
        }
        self.buf = Some(refilled.buf);
        self.items_in_buffer = refilled.items;
        self.byte_offset = 0;
        Ok(())
    }

    /// Install a fresh raw buffer at the current depth, clearing any
    /// consumption state first. On allocation failure the engine goes
    /// terminal; a later `start` allocates anew.
    fn replace_buffer(&mut self) -> Result<()> {
        self.items_in_buffer = 0;
        self.byte_offset = 0;
        match self.create_buffer() {
            Ok(buf) => {
                self.buf = Some(buf);
                Ok(())
            }
            Err(e) => {
                self.stopped = true;
                Err(e)
            }
        }
    }

    fn spawn_loop(&mut self) {
        let (job_tx, job_rx) = bounded::<Box<dyn HwBuffer>>(1);
        let (done_tx, done_rx) = bounded::<Refilled>(1);
        self.job_tx = Some(job_tx);
        self.done_rx = Some(done_rx);
        self.refill_thread = Some(thread::spawn(move || refill_loop(job_rx, done_tx)));
    }

    fn join_loop(&mut self) {
        // Closing the request channel wakes an idle loop.
        self.job_tx = None;
        if let Some(handle) = self.refill_thread.take() {
            if handle.join().is_err() {
                warn!("refill loop panicked during shutdown");
            }
        }
        self.done_rx = None;
    }

    fn check_buffers(&self, buffs: &RxBuffers<'_>, num_elems: usize) -> Result<()> {
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

impl Drop for RxStreamer {
    fn drop(&mut self) {
        self.stop();
        for &channel in &self.channel_list {
            self.dev.disable_channel(channel);
        }
    }
}

/// Body of the background thread. Each received buffer is refilled and
/// sent home with its item count. Exits when the request channel closes or
/// a refill fails (cancellation included); the dropped endpoints are the
/// termination signal waiters observe.
fn refill_loop(job_rx: Receiver<Box<dyn HwBuffer>>, done_tx: Sender<Refilled>) {
    while let Ok(mut buf) = job_rx.recv() {
        match buf.refill() {
            Ok(bytes) => {
                let items = bytes / buf.step().max(1);
                if done_tx.send(Refilled { buf, items }).is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!("refill loop exiting: {}", e);
                return;
            }
        }
    }
}

/// Read the optional `bufflen` option. Absent input selects the default
/// depth; invalid input is tolerated and falls back silently.
fn parse_buffer_size(args: &Value) -> usize {
    let requested = &args["bufflen"];
    if requested.is_null() {
        info!("Set default buffer size: {}", DEFAULT_BUFFER_SIZE);
        return DEFAULT_BUFFER_SIZE;
    }
    let parsed = requested
        .as_u64()
        .or_else(|| requested.as_str().and_then(|s| s.parse().ok()));
    match parsed {
        Some(n) if n > 0 => {
            info!("Set buffer size: {}", n);
            n as usize
        }
        _ => DEFAULT_BUFFER_SIZE,
    }
}
