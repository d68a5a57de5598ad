//! Command dispatch queue: decouples latency-sensitive callers from device
//! round-trip time.
//!
//! Every controllable parameter has one pending slot (value + dirty flag).
//! Queueing overwrites the slot and signals the worker, so a burst of updates
//! to the same parameter collapses into a single device write of the latest
//! value: device traffic is bounded by worker wake frequency, not caller
//! call frequency. The worker also wakes on a bounded timeout to run the
//! out-of-band error poll that covers unchecked fast writes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use fgen_types::{BurstSource, ModShape, ModSource, TriggerSource, WaveShape};

use crate::channel::CommandChannel;
use crate::config::Config;

/// One pending update: last write wins, cleared when drained.
#[derive(Default)]
struct Slot<T> {
    value: T,
    dirty: bool,
}

impl<T: Copy> Slot<T> {
    fn set(&mut self, value: T) {
        self.value = value;
        self.dirty = true;
    }

    fn take(&mut self) -> Option<T> {
        if self.dirty {
            self.dirty = false;
            Some(self.value)
        } else {
            None
        }
    }
}

#[derive(Default)]
struct Pending {
    // basic
    shape: Slot<WaveShape>,
    frequency: Slot<f64>,
    amplitude: Slot<f64>,
    offset: Slot<f64>,
    phase: Slot<f64>,
    duty_cycle: Slot<f64>,
    output: Slot<bool>,
    // AM
    am_enabled: Slot<bool>,
    am_depth: Slot<f64>,
    am_source: Slot<ModSource>,
    am_shape: Slot<ModShape>,
    am_frequency: Slot<f64>,
    // FM
    fm_enabled: Slot<bool>,
    fm_deviation: Slot<f64>,
    fm_source: Slot<ModSource>,
    fm_shape: Slot<ModShape>,
    fm_frequency: Slot<f64>,
    // FSK
    fsk_enabled: Slot<bool>,
    fsk_frequency: Slot<f64>,
    fsk_source: Slot<ModSource>,
    fsk_rate: Slot<f64>,
    // sweep
    sweep_enabled: Slot<bool>,
    sweep_start: Slot<f64>,
    sweep_stop: Slot<f64>,
    sweep_time: Slot<f64>,
    // burst
    burst_enabled: Slot<bool>,
    burst_cycles: Slot<u32>,
    burst_phase: Slot<f64>,
    burst_period: Slot<f64>,
    burst_source: Slot<BurstSource>,
    // sync / trigger
    sync_enabled: Slot<bool>,
    trigger_source: Slot<TriggerSource>,
}

/// Background worker that drains coalesced parameter updates onto the
/// command channel.
pub struct CommandQueue {
    pending: Arc<Mutex<Pending>>,
    wake_tx: Sender<()>,
    exit: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl CommandQueue {
    pub fn new(channel: Arc<CommandChannel>, config: &Config) -> Self {
        let pending = Arc::new(Mutex::new(Pending::default()));
        let exit = Arc::new(AtomicBool::new(false));
        let (wake_tx, wake_rx) = bounded::<()>(1);

        let worker = {
            let pending = pending.clone();
            let exit = exit.clone();
            let poll_interval = Duration::from_millis(config.error_poll_ms());
            thread::Builder::new()
                .name("device-dispatch".into())
                .spawn(move || {
                    worker_loop(channel, pending, wake_rx, exit, poll_interval);
                })
                .expect("failed to spawn device-dispatch thread")
        };

        CommandQueue {
            pending,
            wake_tx,
            exit,
            worker: Some(worker),
        }
    }

    fn queue(&self, update: impl FnOnce(&mut Pending)) {
        if let Ok(mut pending) = self.pending.lock() {
            update(&mut pending);
        }
        // A full wake channel means the worker is already signaled.
        let _ = self.wake_tx.try_send(());
    }

    // basic
    pub fn queue_waveform_update(&self, shape: WaveShape) {
        self.queue(|p| p.shape.set(shape));
    }
    pub fn queue_frequency_update(&self, freq_hz: f64) {
        self.queue(|p| p.frequency.set(freq_hz));
    }
    pub fn queue_amplitude_update(&self, amp_vpp: f64) {
        self.queue(|p| p.amplitude.set(amp_vpp));
    }
    pub fn queue_offset_update(&self, offset_v: f64) {
        self.queue(|p| p.offset.set(offset_v));
    }
    pub fn queue_phase_update(&self, phase_deg: f64) {
        self.queue(|p| p.phase.set(phase_deg));
    }
    pub fn queue_duty_cycle_update(&self, duty_pct: f64) {
        self.queue(|p| p.duty_cycle.set(duty_pct));
    }
    pub fn queue_output_update(&self, enabled: bool) {
        self.queue(|p| p.output.set(enabled));
    }

    // AM
    pub fn queue_am_enabled_update(&self, enabled: bool) {
        self.queue(|p| p.am_enabled.set(enabled));
    }
    pub fn queue_am_depth_update(&self, depth_pct: f64) {
        self.queue(|p| p.am_depth.set(depth_pct));
    }
    pub fn queue_am_source_update(&self, source: ModSource) {
        self.queue(|p| p.am_source.set(source));
    }
    pub fn queue_am_shape_update(&self, shape: ModShape) {
        self.queue(|p| p.am_shape.set(shape));
    }
    pub fn queue_am_frequency_update(&self, freq_hz: f64) {
        self.queue(|p| p.am_frequency.set(freq_hz));
    }

    // FM
    pub fn queue_fm_enabled_update(&self, enabled: bool) {
        self.queue(|p| p.fm_enabled.set(enabled));
    }
    pub fn queue_fm_deviation_update(&self, dev_hz: f64) {
        self.queue(|p| p.fm_deviation.set(dev_hz));
    }
    pub fn queue_fm_source_update(&self, source: ModSource) {
        self.queue(|p| p.fm_source.set(source));
    }
    pub fn queue_fm_shape_update(&self, shape: ModShape) {
        self.queue(|p| p.fm_shape.set(shape));
    }
    pub fn queue_fm_frequency_update(&self, freq_hz: f64) {
        self.queue(|p| p.fm_frequency.set(freq_hz));
    }

    // FSK
    pub fn queue_fsk_enabled_update(&self, enabled: bool) {
        self.queue(|p| p.fsk_enabled.set(enabled));
    }
    pub fn queue_fsk_frequency_update(&self, freq_hz: f64) {
        self.queue(|p| p.fsk_frequency.set(freq_hz));
    }
    pub fn queue_fsk_source_update(&self, source: ModSource) {
        self.queue(|p| p.fsk_source.set(source));
    }
    pub fn queue_fsk_rate_update(&self, rate_hz: f64) {
        self.queue(|p| p.fsk_rate.set(rate_hz));
    }

    // sweep
    pub fn queue_sweep_enabled_update(&self, enabled: bool) {
        self.queue(|p| p.sweep_enabled.set(enabled));
    }
    pub fn queue_sweep_start_update(&self, freq_hz: f64) {
        self.queue(|p| p.sweep_start.set(freq_hz));
    }
    pub fn queue_sweep_stop_update(&self, freq_hz: f64) {
        self.queue(|p| p.sweep_stop.set(freq_hz));
    }
    pub fn queue_sweep_time_update(&self, time_s: f64) {
        self.queue(|p| p.sweep_time.set(time_s));
    }

    // burst
    pub fn queue_burst_enabled_update(&self, enabled: bool) {
        self.queue(|p| p.burst_enabled.set(enabled));
    }
    pub fn queue_burst_cycles_update(&self, cycles: u32) {
        self.queue(|p| p.burst_cycles.set(cycles));
    }
    pub fn queue_burst_phase_update(&self, phase_deg: f64) {
        self.queue(|p| p.burst_phase.set(phase_deg));
    }
    pub fn queue_burst_period_update(&self, period_s: f64) {
        self.queue(|p| p.burst_period.set(period_s));
    }
    pub fn queue_burst_source_update(&self, source: BurstSource) {
        self.queue(|p| p.burst_source.set(source));
    }

    // sync / trigger
    pub fn queue_sync_enabled_update(&self, enabled: bool) {
        self.queue(|p| p.sync_enabled.set(enabled));
    }
    pub fn queue_trigger_source_update(&self, source: TriggerSource) {
        self.queue(|p| p.trigger_source.set(source));
    }

    /// Signal the worker to exit and wait for it. Safe to call from teardown;
    /// also runs on drop.
    pub fn shutdown(&mut self) {
        self.exit.store(true, Ordering::SeqCst);
        let _ = self.wake_tx.try_send(());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    channel: Arc<CommandChannel>,
    pending: Arc<Mutex<Pending>>,
    wake_rx: Receiver<()>,
    exit: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    let mut last_poll = Instant::now();
    loop {
        match wake_rx.recv_timeout(poll_interval) {
            Ok(()) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        if exit.load(Ordering::SeqCst) {
            break;
        }

        drain_once(&channel, &pending);

        if last_poll.elapsed() >= poll_interval {
            if channel.is_connected() {
                channel.poll_errors();
            }
            last_poll = Instant::now();
        }
    }
}

/// Drain every dirty slot exactly once, in fixed enumeration order. The
/// pending lock is released before any device I/O, so updates queued while
/// the drain is on the wire land in the next wake cycle instead of being
/// lost.
fn drain_once(channel: &CommandChannel, pending: &Mutex<Pending>) {
    let Ok(mut guard) = pending.lock() else {
        return;
    };
    let shape = guard.shape.take();
    let frequency = guard.frequency.take();
    let amplitude = guard.amplitude.take();
    let offset = guard.offset.take();
    let phase = guard.phase.take();
    let duty_cycle = guard.duty_cycle.take();
    let output = guard.output.take();
    let am_enabled = guard.am_enabled.take();
    let am_depth = guard.am_depth.take();
    let am_source = guard.am_source.take();
    let am_shape = guard.am_shape.take();
    let am_frequency = guard.am_frequency.take();
    let fm_enabled = guard.fm_enabled.take();
    let fm_deviation = guard.fm_deviation.take();
    let fm_source = guard.fm_source.take();
    let fm_shape = guard.fm_shape.take();
    let fm_frequency = guard.fm_frequency.take();
    let fsk_enabled = guard.fsk_enabled.take();
    let fsk_frequency = guard.fsk_frequency.take();
    let fsk_source = guard.fsk_source.take();
    let fsk_rate = guard.fsk_rate.take();
    let sweep_enabled = guard.sweep_enabled.take();
    let sweep_start = guard.sweep_start.take();
    let sweep_stop = guard.sweep_stop.take();
    let sweep_time = guard.sweep_time.take();
    let burst_enabled = guard.burst_enabled.take();
    let burst_cycles = guard.burst_cycles.take();
    let burst_phase = guard.burst_phase.take();
    let burst_period = guard.burst_period.take();
    let burst_source = guard.burst_source.take();
    let sync_enabled = guard.sync_enabled.take();
    let trigger_source = guard.trigger_source.take();
    drop(guard);

    if !channel.is_connected() {
        return;
    }

    // basic: continuous parameters go out on the fast path, discrete ones
    // take the checked setter.
    if let Some(shape) = shape {
        channel.set_waveform(shape);
    }
    if let Some(freq) = frequency {
        channel.set_frequency_fast(freq);
    }
    if let Some(amp) = amplitude {
        channel.set_amplitude_fast(amp);
    }
    if let Some(offset) = offset {
        channel.set_offset_fast(offset);
    }
    if let Some(phase) = phase {
        channel.set_phase_fast(phase);
    }
    if let Some(duty) = duty_cycle {
        channel.set_duty_cycle_fast(duty);
    }
    if let Some(output) = output {
        channel.set_output_enabled(output);
    }
    // AM
    if let Some(enabled) = am_enabled {
        channel.set_am_enabled(enabled);
    }
    if let Some(depth) = am_depth {
        channel.set_am_depth_fast(depth);
    }
    if let Some(source) = am_source {
        channel.set_am_source(source);
    }
    if let Some(shape) = am_shape {
        channel.set_am_internal_shape(shape);
    }
    if let Some(freq) = am_frequency {
        channel.set_am_internal_frequency(freq);
    }
    // FM
    if let Some(enabled) = fm_enabled {
        channel.set_fm_enabled(enabled);
    }
    if let Some(dev) = fm_deviation {
        channel.set_fm_deviation_fast(dev);
    }
    if let Some(source) = fm_source {
        channel.set_fm_source(source);
    }
    if let Some(shape) = fm_shape {
        channel.set_fm_internal_shape(shape);
    }
    if let Some(freq) = fm_frequency {
        channel.set_fm_internal_frequency(freq);
    }
    // FSK
    if let Some(enabled) = fsk_enabled {
        channel.set_fsk_enabled(enabled);
    }
    if let Some(freq) = fsk_frequency {
        channel.set_fsk_frequency(freq);
    }
    if let Some(source) = fsk_source {
        channel.set_fsk_source(source);
    }
    if let Some(rate) = fsk_rate {
        channel.set_fsk_internal_rate(rate);
    }
    // sweep
    if let Some(enabled) = sweep_enabled {
        channel.set_sweep_enabled(enabled);
    }
    if let Some(start) = sweep_start {
        channel.set_sweep_start(start);
    }
    if let Some(stop) = sweep_stop {
        channel.set_sweep_stop(stop);
    }
    if let Some(time) = sweep_time {
        channel.set_sweep_time(time);
    }
    // burst
    if let Some(enabled) = burst_enabled {
        channel.set_burst_enabled(enabled);
    }
    if let Some(cycles) = burst_cycles {
        channel.set_burst_cycles(cycles);
    }
    if let Some(phase) = burst_phase {
        channel.set_burst_phase(phase);
    }
    if let Some(period) = burst_period {
        channel.set_burst_internal_period(period);
    }
    if let Some(source) = burst_source {
        channel.set_burst_source(source);
    }
    // sync / trigger
    if let Some(enabled) = sync_enabled {
        channel.set_sync_enabled(enabled);
    }
    if let Some(source) = trigger_source {
        channel.set_trigger_source(source);
    }
}
