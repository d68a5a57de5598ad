//! Software LFOs: periodic modulation of one device parameter around its
//! cached base value.
//!
//! Each instance owns a timer thread that ticks at a fixed interval,
//! advances a phase accumulator, evaluates the configured shape, and pushes
//! the modulated absolute value through the channel's live-update (fast)
//! entry points. A tick never blocks on an error round trip and a transient
//! write failure never stops the timer.

use std::f64::consts::PI;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

use fgen_types::{LfoConfig, LfoShape, LfoTarget};

use crate::channel::CommandChannel;
use crate::config::Config;

const TWO_PI: f64 = 2.0 * PI;

/// Additive modulation spans for the non-multiplicative targets: full depth
/// swings duty by ±20 %, AM depth by ±30 %, FM deviation by ±500 Hz.
const DUTY_MOD_SPAN: f64 = 20.0;
const AM_DEPTH_MOD_SPAN: f64 = 30.0;
const FM_DEV_MOD_SPAN: f64 = 500.0;

/// One running software LFO. Dropping it stops the timer thread.
pub struct Lfo {
    config: Arc<Mutex<LfoConfig>>,
    exit_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Lfo {
    pub(crate) fn spawn(channel: Arc<CommandChannel>, tick: Duration) -> Lfo {
        let config = Arc::new(Mutex::new(LfoConfig::default()));
        let (exit_tx, exit_rx) = bounded::<()>(1);
        let worker = {
            let config = config.clone();
            thread::Builder::new()
                .name("device-lfo".into())
                .spawn(move || {
                    run_timer(channel, config, exit_rx, tick);
                })
                .expect("failed to spawn device-lfo thread")
        };
        Lfo {
            config,
            exit_tx: Some(exit_tx),
            worker: Some(worker),
        }
    }

    pub fn config(&self) -> LfoConfig {
        self.config
            .lock()
            .map(|cfg| *cfg)
            .unwrap_or_default()
    }

    fn update(&self, apply: impl FnOnce(&mut LfoConfig)) {
        if let Ok(mut cfg) = self.config.lock() {
            apply(&mut cfg);
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.update(|cfg| cfg.enabled = enabled);
    }

    pub fn set_shape(&self, shape: LfoShape) {
        self.update(|cfg| cfg.shape = shape);
    }

    pub fn set_rate(&self, rate_hz: f64) {
        self.update(|cfg| cfg.rate = rate_hz);
    }

    pub fn set_depth(&self, depth: f64) {
        self.update(|cfg| cfg.depth = depth);
    }

    pub fn set_target(&self, target: LfoTarget) {
        self.update(|cfg| cfg.target = target);
    }

    pub fn is_enabled(&self) -> bool {
        self.config().enabled
    }
}

impl Drop for Lfo {
    fn drop(&mut self) {
        // dropping the sender disconnects the timer's wait
        self.exit_tx = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_timer(
    channel: Arc<CommandChannel>,
    config: Arc<Mutex<LfoConfig>>,
    exit_rx: Receiver<()>,
    tick: Duration,
) {
    let mut phase = 0.0f64;
    let dt = tick.as_secs_f64();
    loop {
        match exit_rx.recv_timeout(tick) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        let cfg = match config.lock() {
            Ok(cfg) => *cfg,
            Err(_) => continue,
        };
        if !cfg.enabled || !channel.is_connected() {
            continue;
        }
        phase = advance_phase(phase, cfg.rate, dt);
        let offset = shape_value(cfg.shape, phase) * cfg.depth;
        push_live(&channel, cfg.target, offset);
    }
}

/// Advance and wrap the phase accumulator into `[0, 2π)`.
fn advance_phase(phase: f64, rate_hz: f64, dt: f64) -> f64 {
    let mut next = phase + TWO_PI * rate_hz * dt;
    if next >= TWO_PI {
        next -= TWO_PI;
    }
    next
}

/// Evaluate the shape at `phase`, result in `[-1, 1]`.
fn shape_value(shape: LfoShape, phase: f64) -> f64 {
    match shape {
        LfoShape::Sine => phase.sin(),
        LfoShape::Triangle => {
            let frac = (phase / TWO_PI).rem_euclid(1.0);
            if frac < 0.25 {
                frac * 4.0
            } else if frac < 0.75 {
                2.0 - frac * 4.0
            } else {
                frac * 4.0 - 4.0
            }
        }
        LfoShape::Square => {
            if phase.sin() >= 0.0 {
                1.0
            } else {
                -1.0
            }
        }
        LfoShape::Ramp => {
            let frac = (phase / TWO_PI).rem_euclid(1.0);
            frac * 2.0 - 1.0
        }
    }
}

/// Compute the modulated absolute value from the cached base and push it on
/// the fast path. Frequency and amplitude modulate multiplicatively, the
/// rest additively with their own spans.
fn push_live(channel: &CommandChannel, target: LfoTarget, offset: f64) {
    let base = channel.base();
    match target {
        LfoTarget::Frequency => {
            channel.update_frequency_live(base.frequency * (1.0 + offset));
        }
        LfoTarget::Amplitude => {
            channel.update_amplitude_live(base.amplitude * (1.0 + offset));
        }
        LfoTarget::DutyCycle => {
            channel.update_duty_cycle_live(base.duty_cycle + offset * DUTY_MOD_SPAN);
        }
        LfoTarget::AmDepth => {
            channel.update_am_depth_live(base.am_depth + offset * AM_DEPTH_MOD_SPAN);
        }
        LfoTarget::FmDeviation => {
            channel.update_fm_dev_live(base.fm_deviation + offset * FM_DEV_MOD_SPAN);
        }
    }
}

/// Owns any number of concurrent LFO instances against one channel.
/// Instances may target overlapping parameters; the later tick wins.
pub struct LfoBank {
    channel: Arc<CommandChannel>,
    tick: Duration,
    lfos: Vec<Lfo>,
}

impl LfoBank {
    pub fn new(channel: Arc<CommandChannel>, config: &Config) -> Self {
        LfoBank {
            channel,
            tick: Duration::from_millis(config.lfo_tick_ms()),
            lfos: Vec::new(),
        }
    }

    /// Create a new (disabled) LFO and return its index.
    pub fn create(&mut self) -> usize {
        self.lfos.push(Lfo::spawn(self.channel.clone(), self.tick));
        self.lfos.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Lfo> {
        self.lfos.get(index)
    }

    /// Stop and remove an LFO. Later indices shift down.
    pub fn remove(&mut self, index: usize) -> bool {
        if index < self.lfos.len() {
            self.lfos.remove(index);
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.lfos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lfos.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimInstrument;

    #[test]
    fn phase_wraps_into_range() {
        let mut phase = 0.0;
        for _ in 0..1000 {
            phase = advance_phase(phase, 7.3, 0.05);
            assert!((0.0..TWO_PI).contains(&phase));
        }
    }

    #[test]
    fn shape_values_stay_in_unit_range() {
        for shape in LfoShape::all() {
            let mut phase = 0.0;
            for _ in 0..200 {
                phase = advance_phase(phase, 1.0, 0.013);
                let value = shape_value(shape, phase);
                assert!((-1.0..=1.0).contains(&value), "{:?} at {}", shape, phase);
            }
        }
    }

    #[test]
    fn triangle_hits_extremes() {
        assert!((shape_value(LfoShape::Triangle, TWO_PI * 0.25) - 1.0).abs() < 1e-9);
        assert!((shape_value(LfoShape::Triangle, TWO_PI * 0.75) + 1.0).abs() < 1e-9);
        assert!(shape_value(LfoShape::Triangle, 0.0).abs() < 1e-9);
    }

    #[test]
    fn ramp_is_linear_in_phase() {
        assert!((shape_value(LfoShape::Ramp, 0.0) + 1.0).abs() < 1e-9);
        assert!((shape_value(LfoShape::Ramp, PI) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn sine_trace_follows_base_times_modulation() {
        // Scenario: sine LFO, rate 1 Hz, depth 0.1, base frequency 1000 Hz,
        // sampled at 50 ms. The transmitted values must trace
        // 1000 * (1 + 0.1 * sin(phase)) and return to ~1000 at phase wrap.
        let sim = SimInstrument::new();
        let channel = CommandChannel::new(Box::new(sim.link()), &Config::default());
        assert!(channel.connect("GPIB0::10::INSTR"));
        channel.set_frequency(1000.0);
        sim.clear_transcript();

        let (rate, depth, dt) = (1.0, 0.1, 0.05);
        let mut phase = 0.0;
        let mut expected = Vec::new();
        for _ in 0..20 {
            phase = advance_phase(phase, rate, dt);
            let offset = shape_value(LfoShape::Sine, phase) * depth;
            expected.push(1000.0 * (1.0 + offset));
            push_live(&channel, LfoTarget::Frequency, offset);
        }

        let sent: Vec<f64> = sim
            .commands_with_prefix("FREQ ")
            .iter()
            .map(|cmd| cmd["FREQ ".len()..].parse().unwrap())
            .collect();
        assert_eq!(sent.len(), 20);
        for (sent, expected) in sent.iter().zip(&expected) {
            assert!((sent - expected).abs() < 1e-3);
        }
        // one full period later the trace is back at the base value
        assert!((sent[19] - 1000.0).abs() < 1e-3);
        // and the base itself never moved
        assert_eq!(channel.base().frequency, 1000.0);
    }

    #[test]
    fn additive_targets_use_their_spans() {
        let sim = SimInstrument::new();
        let channel = CommandChannel::new(Box::new(sim.link()), &Config::default());
        assert!(channel.connect("GPIB0::10::INSTR"));
        sim.clear_transcript();

        push_live(&channel, LfoTarget::DutyCycle, 1.0);
        push_live(&channel, LfoTarget::AmDepth, -1.0);
        push_live(&channel, LfoTarget::FmDeviation, 0.5);

        assert_eq!(
            sim.commands_with_prefix("FUNC:SQU:DCYC"),
            vec!["FUNC:SQU:DCYC 70.000000"]
        );
        assert_eq!(sim.commands_with_prefix("AM:DEPT"), vec!["AM:DEPT 20.000000"]);
        assert_eq!(sim.commands_with_prefix("FM:DEV"), vec!["FM:DEV 350.000000"]);
    }

    #[test]
    fn disabled_lfo_never_writes() {
        let sim = SimInstrument::new();
        let channel = Arc::new(CommandChannel::new(
            Box::new(sim.link()),
            &Config::default(),
        ));
        assert!(channel.connect("GPIB0::10::INSTR"));
        sim.clear_transcript();

        let lfo = Lfo::spawn(channel, Duration::from_millis(5));
        thread::sleep(Duration::from_millis(50));
        drop(lfo);
        assert!(sim.transcript().is_empty());
    }

    #[test]
    fn running_lfo_emits_live_updates_within_band() {
        let sim = SimInstrument::new();
        let channel = Arc::new(CommandChannel::new(
            Box::new(sim.link()),
            &Config::default(),
        ));
        assert!(channel.connect("GPIB0::10::INSTR"));
        channel.set_frequency(1000.0);
        sim.clear_transcript();

        let lfo = Lfo::spawn(channel.clone(), Duration::from_millis(5));
        lfo.set_rate(2.0);
        lfo.set_depth(0.1);
        lfo.set_target(LfoTarget::Frequency);
        lfo.set_enabled(true);
        thread::sleep(Duration::from_millis(100));
        lfo.set_enabled(false);
        drop(lfo);

        let sent = sim.commands_with_prefix("FREQ ");
        assert!(!sent.is_empty(), "no live updates emitted");
        for cmd in sent {
            let value: f64 = cmd["FREQ ".len()..].parse().unwrap();
            assert!((900.0..=1100.0).contains(&value), "{} out of band", value);
        }
    }

    #[test]
    fn bank_creates_and_removes_instances() {
        let sim = SimInstrument::new();
        let channel = Arc::new(CommandChannel::new(
            Box::new(sim.link()),
            &Config::default(),
        ));
        let mut bank = LfoBank::new(channel, &Config::default());
        let a = bank.create();
        let b = bank.create();
        assert_eq!((a, b), (0, 1));
        assert_eq!(bank.len(), 2);
        assert!(bank.get(0).is_some());
        assert!(bank.remove(0));
        assert_eq!(bank.len(), 1);
        assert!(!bank.remove(5));
    }
}
