//! Simulated hardware for tests and demos. `SimulatedDevice` produces a
//! deterministic 12-bit ramp on refill and captures pushed buffers so
//! transmit paths can be asserted against.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use super::{BufferCancel, ChannelDevice, HwBuffer};

/// How the simulated hardware answers refill requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefillBehavior {
    /// Complete each refill immediately (after the configured delay, if any).
    Responsive,
    /// Block until the buffer is cancelled.
    Stalled,
    /// Fail every refill.
    Failing,
}

/// Deterministic sample for a given absolute frame index and channel slot:
/// a per-slot ramp over the full 12-bit range, centered like the hardware's
/// two's-complement codes.
pub fn ramp_value(frame: u64, slot: usize) -> i16 {
    let code = (frame as usize + slot * 1000) % 4096;
    (code as i64 - 2048) as i16
}

pub struct SimulatedDevice {
    num_channels: usize,
    enabled: Mutex<Vec<bool>>,
    behavior: RefillBehavior,
    refill_frames: Option<usize>,
    refill_delay: Option<Duration>,
    fail_pushes: bool,
    fail_buffer_creation: AtomicBool,
    buffers_created: AtomicUsize,
    /// Currently allocated buffers; shared with them so dropping one
    /// decrements the gauge.
    buffers_live: Arc<AtomicUsize>,
    /// High-water mark of concurrently allocated buffers.
    buffers_peak: AtomicUsize,
    /// Absolute frame counter; shared with buffers so the ramp continues
    /// across refills and buffer recreation.
    frame_counter: Arc<AtomicU64>,
    /// Frame-major snapshots of every pushed buffer.
    pushed: Arc<Mutex<Vec<Vec<i16>>>>,
}

impl SimulatedDevice {
    pub fn new(num_channels: usize) -> Self {
        Self {
            num_channels,
            enabled: Mutex::new(vec![false; num_channels]),
            behavior: RefillBehavior::Responsive,
            refill_frames: None,
            refill_delay: None,
            fail_pushes: false,
            fail_buffer_creation: AtomicBool::new(false),
            buffers_created: AtomicUsize::new(0),
            buffers_live: Arc::new(AtomicUsize::new(0)),
            buffers_peak: AtomicUsize::new(0),
            frame_counter: Arc::new(AtomicU64::new(0)),
            pushed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A device whose refills never complete until cancelled.
    pub fn stalled(num_channels: usize) -> Self {
        let mut dev = Self::new(num_channels);
        dev.behavior = RefillBehavior::Stalled;
        dev
    }

    /// A device whose refills always fail.
    pub fn failing(num_channels: usize) -> Self {
        let mut dev = Self::new(num_channels);
        dev.behavior = RefillBehavior::Failing;
        dev
    }

    /// Limit each refill to `frames` samples instead of filling the buffer.
    pub fn with_refill_frames(mut self, frames: usize) -> Self {
        self.refill_frames = Some(frames);
        self
    }

    /// Delay each refill, honoring cancellation during the wait.
    pub fn with_refill_delay(mut self, delay: Duration) -> Self {
        self.refill_delay = Some(delay);
        self
    }

    /// Make every push fail.
    pub fn with_push_failure(mut self) -> Self {
        self.fail_pushes = true;
        self
    }

    /// Toggle allocation failures for subsequent `create_buffer` calls.
    pub fn set_buffer_creation_failure(&self, fail: bool) {
        self.fail_buffer_creation.store(fail, Ordering::SeqCst);
    }

    /// Channel slots currently enabled, in index order.
    pub fn enabled_channels(&self) -> Vec<usize> {
        let enabled = self.enabled.lock().unwrap();
        enabled
            .iter()
            .enumerate()
            .filter_map(|(i, &on)| on.then_some(i))
            .collect()
    }

    /// Total buffers allocated so far.
    pub fn buffers_created(&self) -> usize {
        self.buffers_created.load(Ordering::SeqCst)
    }

    /// Buffers allocated and not yet dropped.
    pub fn live_buffers(&self) -> usize {
        self.buffers_live.load(Ordering::SeqCst)
    }

    /// Most buffers ever alive at once.
    pub fn peak_live_buffers(&self) -> usize {
        self.buffers_peak.load(Ordering::SeqCst)
    }

    /// Snapshots of every pushed buffer, frame-major interleaved across the
    /// channels that were enabled when the buffer was created.
    pub fn pushed(&self) -> Vec<Vec<i16>> {
        self.pushed.lock().unwrap().clone()
    }
}

impl ChannelDevice for SimulatedDevice {
    fn channel_count(&self) -> usize {
        self.num_channels
    }

    fn enable_channel(&self, channel: usize) {
        if let Some(slot) = self.enabled.lock().unwrap().get_mut(channel) {
            *slot = true;
        }
    }

    fn disable_channel(&self, channel: usize) {
        if let Some(slot) = self.enabled.lock().unwrap().get_mut(channel) {
            *slot = false;
        }
    }

    fn create_buffer(&self, frames: usize) -> Result<Box<dyn HwBuffer>> {
        if self.fail_buffer_creation.load(Ordering::SeqCst) {
            bail!("simulated allocation failure");
        }
        if frames == 0 {
            bail!("zero-length buffer");
        }
        let enabled = self.enabled_channels();
        if enabled.is_empty() {
            bail!("no channels enabled");
        }

        self.buffers_created.fetch_add(1, Ordering::SeqCst);
        let alive = self.buffers_live.fetch_add(1, Ordering::SeqCst) + 1;
        self.buffers_peak.fetch_max(alive, Ordering::SeqCst);
        let (cancel_tx, cancel_rx) = bounded(1);
        let slots = enabled.len();
        Ok(Box::new(SimulatedBuffer {
            frames,
            enabled,
            data: vec![0i16; frames * slots],
            behavior: self.behavior,
            refill_frames: self.refill_frames.unwrap_or(frames).min(frames),
            refill_delay: self.refill_delay,
            fail_pushes: self.fail_pushes,
            cancel_tx,
            cancel_rx,
            frame_counter: Arc::clone(&self.frame_counter),
            live: Arc::clone(&self.buffers_live),
            pushed: Arc::clone(&self.pushed),
        }))
    }
}

pub struct SimulatedBuffer {
    frames: usize,
    /// Device channel indices captured at creation, in index order.
    enabled: Vec<usize>,
    /// Frame-major sample storage: frame f, slot s at `f * slots + s`.
    data: Vec<i16>,
    behavior: RefillBehavior,
    refill_frames: usize,
    refill_delay: Option<Duration>,
    fail_pushes: bool,
    /// Kept so cancel handles never observe a disconnected channel while
    /// the buffer is alive.
    cancel_tx: Sender<()>,
    cancel_rx: Receiver<()>,
    frame_counter: Arc<AtomicU64>,
    /// Device-wide live-buffer gauge, decremented on drop.
    live: Arc<AtomicUsize>,
    pushed: Arc<Mutex<Vec<Vec<i16>>>>,
}

impl Drop for SimulatedBuffer {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SimulatedBuffer {
    fn slot_of(&self, channel: usize) -> Result<usize> {
        match self.enabled.iter().position(|&c| c == channel) {
            Some(slot) => Ok(slot),
            None => bail!("channel {} not part of this buffer", channel),
        }
    }

    fn fill_ramp(&mut self) -> usize {
        let frames = self.refill_frames;
        let slots = self.enabled.len();
        let base = self.frame_counter.fetch_add(frames as u64, Ordering::SeqCst);
        for f in 0..frames {
            for s in 0..slots {
                self.data[f * slots + s] = ramp_value(base + f as u64, s);
            }
        }
        frames
    }
}

impl HwBuffer for SimulatedBuffer {
    fn frames(&self) -> usize {
        self.frames
    }

    fn step(&self) -> usize {
        self.enabled.len() * std::mem::size_of::<i16>()
    }

    fn refill(&mut self) -> Result<usize> {
        match self.behavior {
            RefillBehavior::Responsive => {
                if let Some(delay) = self.refill_delay {
                    match self.cancel_rx.recv_timeout(delay) {
                        Err(RecvTimeoutError::Timeout) => {}
                        _ => bail!("buffer cancelled"),
                    }
                } else if self.cancel_rx.try_recv().is_ok() {
                    bail!("buffer cancelled");
                }
                let frames = self.fill_ramp();
                Ok(frames * self.step())
            }
            RefillBehavior::Stalled => {
                let _ = self.cancel_rx.recv();
                bail!("buffer cancelled")
            }
            RefillBehavior::Failing => bail!("simulated refill failure"),
        }
    }

    fn push(&mut self) -> Result<usize> {
        if self.fail_pushes {
            bail!("simulated push failure");
        }
        self.pushed.lock().unwrap().push(self.data.clone());
        Ok(self.frames * self.step())
    }

    fn cancel_handle(&self) -> Box<dyn BufferCancel> {
        Box::new(SimulatedCancel {
            tx: self.cancel_tx.clone(),
        })
    }

    fn read_channel(&self, channel: usize, dst: &mut [i16], offset: usize) -> Result<()> {
        let slot = self.slot_of(channel)?;
        let slots = self.enabled.len();
        if offset + dst.len() > self.frames {
            bail!(
                "read of {} frames at offset {} exceeds buffer of {}",
                dst.len(),
                offset,
                self.frames
            );
        }
        for (j, d) in dst.iter_mut().enumerate() {
            *d = self.data[(offset + j) * slots + slot];
        }
        Ok(())
    }

    fn write_channel(&mut self, channel: usize, src: &[i16]) -> Result<()> {
        let slot = self.slot_of(channel)?;
        let slots = self.enabled.len();
        if src.len() > self.frames {
            bail!("write of {} frames exceeds buffer of {}", src.len(), self.frames);
        }
        for (j, &s) in src.iter().enumerate() {
            self.data[j * slots + slot] = s;
        }
        Ok(())
    }
}

struct SimulatedCancel {
    tx: Sender<()>,
}

impl BufferCancel for SimulatedCancel {
    fn cancel(&self) {
        // A full or disconnected channel means the buffer is already
        // cancelled or gone.
        let _ = self.tx.try_send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_ramp_continues_across_refills() {
        let dev = SimulatedDevice::new(2);
        dev.enable_channel(0);
        dev.enable_channel(1);
        let mut buf = dev.create_buffer(8).unwrap();

        let bytes = buf.refill().unwrap();
        assert_eq!(bytes, 8 * buf.step());
        let mut first = vec![0i16; 8];
        buf.read_channel(0, &mut first, 0).unwrap();

        buf.refill().unwrap();
        let mut second = vec![0i16; 8];
        buf.read_channel(0, &mut second, 0).unwrap();

        for j in 0..8 {
            assert_eq!(first[j], ramp_value(j as u64, 0));
            assert_eq!(second[j], ramp_value(8 + j as u64, 0));
        }
    }

    #[test]
    fn test_partial_refill_reports_fewer_bytes() {
        let dev = SimulatedDevice::new(2).with_refill_frames(3);
        dev.enable_channel(0);
        dev.enable_channel(1);
        let mut buf = dev.create_buffer(16).unwrap();
        let bytes = buf.refill().unwrap();
        assert_eq!(bytes, 3 * buf.step());
    }

    #[test]
    fn test_cancel_wakes_stalled_refill() {
        let dev = SimulatedDevice::stalled(2);
        dev.enable_channel(0);
        dev.enable_channel(1);
        let mut buf = dev.create_buffer(16).unwrap();
        let cancel = buf.cancel_handle();

        let worker = thread::spawn(move || buf.refill().is_err());
        cancel.cancel();
        assert!(worker.join().unwrap(), "cancelled refill should fail");
    }

    #[test]
    fn test_push_captures_written_frames() {
        let dev = SimulatedDevice::new(2);
        dev.enable_channel(0);
        dev.enable_channel(1);
        let mut buf = dev.create_buffer(2).unwrap();
        buf.write_channel(0, &[10, 30]).unwrap();
        buf.write_channel(1, &[20, 40]).unwrap();
        let bytes = buf.push().unwrap();
        assert_eq!(bytes, 2 * buf.step());

        let pushed = dev.pushed();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0], vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_buffer_requires_enabled_channels() {
        let dev = SimulatedDevice::new(2);
        assert!(dev.create_buffer(16).is_err());
    }

    #[test]
    fn test_live_buffer_gauge_tracks_create_and_drop() {
        let dev = SimulatedDevice::new(1);
        dev.enable_channel(0);

        let first = dev.create_buffer(8).unwrap();
        let second = dev.create_buffer(8).unwrap();
        assert_eq!(dev.live_buffers(), 2);
        assert_eq!(dev.peak_live_buffers(), 2);

        drop(first);
        assert_eq!(dev.live_buffers(), 1);
        drop(second);
        assert_eq!(dev.live_buffers(), 0);
        assert_eq!(dev.peak_live_buffers(), 2);
    }
}
