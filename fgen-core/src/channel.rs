//! Command channel: the single owner of the instrument session.
//!
//! Every byte that reaches the device goes through this type. One inner lock
//! serializes the three caller roles (direct UI writes, the dispatch worker,
//! the arb upload worker) because the instrument processes one command at a
//! time. Public methods lock once and delegate to helpers that take the
//! locked state, so compound operations (bulk staging, error drains) never
//! re-lock.
//!
//! The public surface never panics and never propagates transport errors:
//! failures become `last_error` text plus a log-sink entry, and the device is
//! treated as a best-effort peripheral.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use fgen_types::{BurstSource, ModShape, ModSource, TriggerSource, WaveShape};

use crate::config::Config;
use crate::link::{InstrumentLink, LinkError, LinkSession};
use crate::scpi::{self, DeviceError};

/// Text sink for raw `command -> response` traffic and recovery narration.
/// Must be callable from any worker thread; UI marshaling is the caller's
/// concern.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Last known absolute values of the base quantities, updated by the checked
/// setters and by `apply_waveform`. Software LFOs read these as the center
/// value to modulate around; the live-update entry points leave them alone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaseParams {
    pub frequency: f64,
    pub amplitude: f64,
    pub offset: f64,
    pub duty_cycle: f64,
    pub am_depth: f64,
    pub fm_deviation: f64,
}

impl Default for BaseParams {
    fn default() -> Self {
        Self {
            frequency: 1000.0,
            amplitude: 1.0,
            offset: 0.0,
            duty_cycle: 50.0,
            am_depth: 50.0,
            fm_deviation: 100.0,
        }
    }
}

const READ_BUFFER_LEN: usize = 1024;
/// Pause between a command and its error-status readback; the device needs a
/// moment before it will answer.
const COMMAND_SETTLE: Duration = Duration::from_millis(1);
/// Pause before reading a data query response.
const QUERY_SETTLE: Duration = Duration::from_millis(20);
/// Yield cadence while assembling bulk point lists.
const BULK_YIELD_INTERVAL: usize = 1000;
/// Maximum queue entries drained per out-of-band error poll.
const ERROR_POLL_LIMIT: usize = 8;

struct ChannelInner {
    session: Option<Box<dyn LinkSession>>,
    resource: String,
    last_error: String,
    base: BaseParams,
}

pub struct CommandChannel {
    link: Box<dyn InstrumentLink>,
    inner: Mutex<ChannelInner>,
    connected: AtomicBool,
    log_sink: Mutex<Option<LogSink>>,
    io_timeout_ms: u32,
    upload_timeout_ms: u32,
    settle_ms: u64,
}

impl CommandChannel {
    pub fn new(link: Box<dyn InstrumentLink>, config: &Config) -> Self {
        CommandChannel {
            link,
            inner: Mutex::new(ChannelInner {
                session: None,
                resource: String::new(),
                last_error: String::new(),
                base: BaseParams::default(),
            }),
            connected: AtomicBool::new(false),
            log_sink: Mutex::new(None),
            io_timeout_ms: config.io_timeout_ms(),
            upload_timeout_ms: config.upload_timeout_ms(),
            settle_ms: config.settle_ms(),
        }
    }

    pub fn set_log_sink(&self, sink: LogSink) {
        if let Ok(mut slot) = self.log_sink.lock() {
            *slot = Some(sink);
        }
    }

    fn emit(&self, message: &str) {
        log::debug!(target: "device::channel", "{}", message);
        if let Ok(slot) = self.log_sink.lock() {
            if let Some(sink) = slot.as_ref() {
                sink(message);
            }
        }
    }

    fn inner(&self) -> MutexGuard<'_, ChannelInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- connection ---

    /// Open a session on `resource`, dropping any existing session first.
    /// Puts the instrument into remote mode and clears its status registers.
    /// Returns `false` (with `last_error` set) if the link is unavailable or
    /// the open fails.
    pub fn connect(&self, resource: &str) -> bool {
        let mut inner = self.inner();
        inner.last_error.clear();
        if inner.session.is_some() {
            self.disconnect_locked(&mut inner);
        }
        let mut session = match self.link.open(resource) {
            Ok(session) => session,
            Err(e) => {
                inner.last_error = e.to_string();
                log::warn!(target: "device::channel", "connect to {} failed: {}", resource, e);
                return false;
            }
        };
        if let Err(e) = session.set_timeout_ms(self.io_timeout_ms) {
            inner.last_error = e.to_string();
            return false;
        }
        inner.session = Some(session);
        inner.resource = resource.to_string();
        self.connected.store(true, Ordering::SeqCst);

        self.write_checked(&mut inner, "SYST:REM");
        self.write_checked(&mut inner, "*CLS");
        thread::sleep(Duration::from_millis(self.settle_ms));
        self.emit(&format!("connected to {}", resource));
        true
    }

    /// Return the instrument to local control and close the session.
    /// Idempotent.
    pub fn disconnect(&self) {
        let mut inner = self.inner();
        self.disconnect_locked(&mut inner);
    }

    fn disconnect_locked(&self, inner: &mut ChannelInner) {
        if inner.session.is_some() {
            self.write_checked(inner, "SYST:LOC");
            inner.session = None;
            self.emit("disconnected");
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn last_error(&self) -> String {
        self.inner().last_error.clone()
    }

    pub fn resource(&self) -> String {
        self.inner().resource.clone()
    }

    /// Snapshot of the cached base parameters.
    pub fn base(&self) -> BaseParams {
        self.inner().base
    }

    // --- raw command surface ---

    /// Checked write: send, then round-trip the error-status query. Device
    /// errors are logged and captured as `last_error`; nothing propagates.
    pub fn write(&self, command: &str) {
        let mut inner = self.inner();
        self.write_checked(&mut inner, command);
    }

    /// Unchecked write: same send path, no error round trip. For
    /// high-frequency low-criticality updates; failures are dropped and
    /// recovered later by the periodic error poll.
    pub fn write_fast(&self, command: &str) {
        let mut inner = self.inner();
        self.write_unchecked(&mut inner, command);
    }

    /// Send a query and return the trimmed response, or an empty string on
    /// any failure.
    pub fn query(&self, command: &str) -> String {
        let mut inner = self.inner();
        self.query_locked(&mut inner, command)
    }

    pub fn query_idn(&self) -> String {
        self.query("*IDN?")
    }

    pub fn query_error(&self) -> String {
        self.query("SYST:ERR?")
    }

    /// One explicit error-status round trip, parsed. Used by the upload
    /// protocol after unchecked bulk writes.
    pub fn check_error(&self) -> Option<DeviceError> {
        let mut inner = self.inner();
        let response = self.query_locked(&mut inner, "SYST:ERR?");
        match scpi::parse_error_response(&response) {
            Some(err) => {
                inner.last_error = err.to_string();
                Some(err)
            }
            None => None,
        }
    }

    /// Drain the device error queue, surfacing errors accumulated from
    /// unchecked writes. Returns the number of real errors drained.
    pub fn poll_errors(&self) -> usize {
        let mut inner = self.inner();
        if inner.session.is_none() {
            return 0;
        }
        let mut drained = 0;
        for _ in 0..ERROR_POLL_LIMIT {
            let response = self.query_locked(&mut inner, "SYST:ERR?");
            match scpi::parse_error_response(&response) {
                Some(err) => {
                    drained += 1;
                    inner.last_error = err.to_string();
                    log::warn!(target: "device::channel", "deferred device error: {}", err);
                    self.emit(&format!("deferred error: {}", err));
                }
                None => break,
            }
        }
        drained
    }

    // --- typed setters (checked path) ---

    pub fn set_waveform(&self, shape: WaveShape) {
        self.write(&format!("FUNC {}", shape.scpi_name()));
    }

    /// Select the named arb as the active user waveform and switch the
    /// output shape to USER.
    pub fn set_user_waveform(&self, name: &str) {
        let mut inner = self.inner();
        self.write_checked(&mut inner, &format!("FUNC:USER {}", name));
        self.write_checked(&mut inner, "FUNC USER");
    }

    /// Select which arb is active without changing the output shape.
    pub fn select_user_waveform(&self, name: &str) {
        self.write(&format!("FUNC:USER {}", name));
    }

    pub fn set_frequency(&self, freq_hz: f64) {
        let mut inner = self.inner();
        inner.base.frequency = freq_hz;
        let cmd = format!("FREQ {}", scpi::format_value(freq_hz));
        self.write_checked(&mut inner, &cmd);
    }

    pub fn set_amplitude(&self, amp_vpp: f64) {
        let mut inner = self.inner();
        inner.base.amplitude = amp_vpp;
        let cmd = format!("VOLT {}", scpi::format_value(amp_vpp));
        self.write_checked(&mut inner, &cmd);
    }

    pub fn set_offset(&self, offset_v: f64) {
        let mut inner = self.inner();
        inner.base.offset = offset_v;
        let cmd = format!("VOLT:OFFS {}", scpi::format_value(offset_v));
        self.write_checked(&mut inner, &cmd);
    }

    pub fn set_phase(&self, phase_deg: f64) {
        self.write(&format!("PHAS {}", scpi::format_phase(clamp_phase(phase_deg))));
    }

    pub fn set_duty_cycle(&self, duty_pct: f64) {
        let mut inner = self.inner();
        inner.base.duty_cycle = duty_pct;
        let cmd = format!("FUNC:SQU:DCYC {}", scpi::format_value(duty_pct));
        self.write_checked(&mut inner, &cmd);
    }

    pub fn set_output_enabled(&self, enabled: bool) {
        self.write(if enabled { "OUTP ON" } else { "OUTP OFF" });
    }

    /// Atomic multi-value apply: shape, frequency, amplitude and offset in
    /// one command, avoiding the glitch of sequential single-parameter
    /// writes. Updates all three cached bases.
    pub fn apply_waveform(&self, shape: WaveShape, freq_hz: f64, amp_vpp: f64, offset_v: f64) {
        let mut inner = self.inner();
        inner.base.frequency = freq_hz;
        inner.base.amplitude = amp_vpp;
        inner.base.offset = offset_v;
        let cmd = format!(
            "APPL:{} {}, {}, {}",
            shape.scpi_name(),
            scpi::format_value(freq_hz),
            scpi::format_value(amp_vpp),
            scpi::format_value(offset_v)
        );
        self.write_checked(&mut inner, &cmd);
    }

    // AM
    pub fn set_am_enabled(&self, enabled: bool) {
        self.write(if enabled { "AM:STAT ON" } else { "AM:STAT OFF" });
    }

    pub fn set_am_depth(&self, depth_pct: f64) {
        let mut inner = self.inner();
        inner.base.am_depth = depth_pct;
        let cmd = format!("AM:DEPT {}", scpi::format_value(depth_pct));
        self.write_checked(&mut inner, &cmd);
    }

    pub fn set_am_source(&self, source: ModSource) {
        self.write(&format!("AM:SOUR {}", source.scpi_name()));
    }

    pub fn set_am_internal_shape(&self, shape: ModShape) {
        self.write(&format!("AM:INT:FUNC {}", shape.scpi_name()));
    }

    pub fn set_am_internal_frequency(&self, freq_hz: f64) {
        self.write(&format!("AM:INT:FREQ {}", scpi::format_value(freq_hz)));
    }

    // FM
    pub fn set_fm_enabled(&self, enabled: bool) {
        self.write(if enabled { "FM:STAT ON" } else { "FM:STAT OFF" });
    }

    pub fn set_fm_deviation(&self, dev_hz: f64) {
        let mut inner = self.inner();
        inner.base.fm_deviation = dev_hz;
        let cmd = format!("FM:DEV {}", scpi::format_value(dev_hz));
        self.write_checked(&mut inner, &cmd);
    }

    pub fn set_fm_source(&self, source: ModSource) {
        self.write(&format!("FM:SOUR {}", source.scpi_name()));
    }

    pub fn set_fm_internal_shape(&self, shape: ModShape) {
        self.write(&format!("FM:INT:FUNC {}", shape.scpi_name()));
    }

    pub fn set_fm_internal_frequency(&self, freq_hz: f64) {
        self.write(&format!("FM:INT:FREQ {}", scpi::format_value(freq_hz)));
    }

    // FSK
    pub fn set_fsk_enabled(&self, enabled: bool) {
        self.write(if enabled { "FSK:STAT ON" } else { "FSK:STAT OFF" });
    }

    pub fn set_fsk_frequency(&self, freq_hz: f64) {
        self.write(&format!("FSK:FREQ {}", scpi::format_value(freq_hz)));
    }

    pub fn set_fsk_source(&self, source: ModSource) {
        self.write(&format!("FSK:SOUR {}", source.scpi_name()));
    }

    pub fn set_fsk_internal_rate(&self, rate_hz: f64) {
        self.write(&format!("FSK:INT:RATE {}", scpi::format_value(rate_hz)));
    }

    // Sweep
    pub fn set_sweep_enabled(&self, enabled: bool) {
        self.write(if enabled { "SWE:STAT ON" } else { "SWE:STAT OFF" });
    }

    pub fn set_sweep_start(&self, freq_hz: f64) {
        self.write(&format!("FREQ:STAR {}", scpi::format_value(freq_hz)));
    }

    pub fn set_sweep_stop(&self, freq_hz: f64) {
        self.write(&format!("FREQ:STOP {}", scpi::format_value(freq_hz)));
    }

    pub fn set_sweep_time(&self, time_s: f64) {
        self.write(&format!("SWE:TIME {}", scpi::format_value(time_s)));
    }

    // Burst
    pub fn set_burst_enabled(&self, enabled: bool) {
        self.write(if enabled { "BM:STAT ON" } else { "BM:STAT OFF" });
    }

    pub fn set_burst_cycles(&self, cycles: u32) {
        self.write(&format!("BM:NCYC {}", cycles));
    }

    pub fn set_burst_phase(&self, phase_deg: f64) {
        self.write(&format!("BM:PHAS {}", scpi::format_value(phase_deg)));
    }

    /// The device takes an internal burst *rate*, so the period inverts here.
    pub fn set_burst_internal_period(&self, period_s: f64) {
        if period_s <= 0.0 {
            return;
        }
        self.write(&format!("BM:INT:RATE {}", scpi::format_value(1.0 / period_s)));
    }

    pub fn set_burst_source(&self, source: BurstSource) {
        self.write(&format!("BM:SOUR {}", source.scpi_name()));
    }

    // Sync / trigger
    pub fn set_sync_enabled(&self, enabled: bool) {
        self.write(if enabled { "OUTP:SYNC ON" } else { "OUTP:SYNC OFF" });
    }

    pub fn set_trigger_source(&self, source: TriggerSource) {
        self.write(&format!("TRIG:SOUR {}", source.scpi_name()));
    }

    // --- fast setters (unchecked path, base still tracked) ---
    //
    // The dispatch worker drains coalesced continuous parameters through
    // these: the transmission skips the error round trip, but the cached
    // base stays current so LFOs keep modulating around the latest set value.

    pub fn set_frequency_fast(&self, freq_hz: f64) {
        let mut inner = self.inner();
        inner.base.frequency = freq_hz;
        let cmd = format!("FREQ {}", scpi::format_value(freq_hz));
        self.write_unchecked(&mut inner, &cmd);
    }

    pub fn set_amplitude_fast(&self, amp_vpp: f64) {
        let mut inner = self.inner();
        inner.base.amplitude = amp_vpp;
        let cmd = format!("VOLT {}", scpi::format_value(amp_vpp));
        self.write_unchecked(&mut inner, &cmd);
    }

    pub fn set_offset_fast(&self, offset_v: f64) {
        let mut inner = self.inner();
        inner.base.offset = offset_v;
        let cmd = format!("VOLT:OFFS {}", scpi::format_value(offset_v));
        self.write_unchecked(&mut inner, &cmd);
    }

    pub fn set_phase_fast(&self, phase_deg: f64) {
        let mut inner = self.inner();
        let cmd = format!("PHAS {}", scpi::format_phase(clamp_phase(phase_deg)));
        self.write_unchecked(&mut inner, &cmd);
    }

    pub fn set_duty_cycle_fast(&self, duty_pct: f64) {
        let mut inner = self.inner();
        inner.base.duty_cycle = duty_pct;
        let cmd = format!("FUNC:SQU:DCYC {}", scpi::format_value(duty_pct));
        self.write_unchecked(&mut inner, &cmd);
    }

    pub fn set_am_depth_fast(&self, depth_pct: f64) {
        let mut inner = self.inner();
        inner.base.am_depth = depth_pct;
        let cmd = format!("AM:DEPT {}", scpi::format_value(depth_pct));
        self.write_unchecked(&mut inner, &cmd);
    }

    pub fn set_fm_deviation_fast(&self, dev_hz: f64) {
        let mut inner = self.inner();
        inner.base.fm_deviation = dev_hz;
        let cmd = format!("FM:DEV {}", scpi::format_value(dev_hz));
        self.write_unchecked(&mut inner, &cmd);
    }

    // --- live updates (unchecked path, base untouched) ---
    //
    // LFO ticks land here: the cached base is the modulation center, so a
    // live value must never overwrite it.

    pub fn update_frequency_live(&self, freq_hz: f64) {
        let mut inner = self.inner();
        let cmd = format!("FREQ {}", scpi::format_value(freq_hz));
        self.write_unchecked(&mut inner, &cmd);
    }

    pub fn update_amplitude_live(&self, amp_vpp: f64) {
        let mut inner = self.inner();
        let cmd = format!("VOLT {}", scpi::format_value(amp_vpp));
        self.write_unchecked(&mut inner, &cmd);
    }

    pub fn update_duty_cycle_live(&self, duty_pct: f64) {
        let mut inner = self.inner();
        let cmd = format!("FUNC:SQU:DCYC {}", scpi::format_value(duty_pct));
        self.write_unchecked(&mut inner, &cmd);
    }

    pub fn update_am_depth_live(&self, depth_pct: f64) {
        let mut inner = self.inner();
        let cmd = format!("AM:DEPT {}", scpi::format_value(depth_pct));
        self.write_unchecked(&mut inner, &cmd);
    }

    pub fn update_fm_dev_live(&self, dev_hz: f64) {
        let mut inner = self.inner();
        let cmd = format!("FM:DEV {}", scpi::format_value(dev_hz));
        self.write_unchecked(&mut inner, &cmd);
    }

    // --- arb memory primitives ---

    /// Send the full point list into the volatile staging area as one bulk
    /// command. Runs on the unchecked path (the per-command error round trip
    /// is far too slow for thousands of points); callers verify with
    /// [`check_error`](Self::check_error) afterwards. The I/O timeout is
    /// extended for the transfer and restored before returning.
    pub fn stage_volatile(&self, points: &[f32]) -> Result<usize, String> {
        let mut inner = self.inner();
        if inner.session.is_none() {
            return Err("not connected".to_string());
        }

        let mut cmd = String::with_capacity(16 + points.len() * 11);
        cmd.push_str("DATA VOLATILE");
        for (i, point) in points.iter().enumerate() {
            if i > 0 && i % BULK_YIELD_INTERVAL == 0 {
                thread::yield_now();
            }
            cmd.push_str(", ");
            cmd.push_str(&scpi::format_value(*point as f64));
        }

        if let Some(session) = inner.session.as_mut() {
            let _ = session.set_timeout_ms(self.upload_timeout_ms);
        }
        let result = send_line(&mut inner, &cmd);
        if let Some(session) = inner.session.as_mut() {
            let _ = session.set_timeout_ms(self.io_timeout_ms);
        }

        match result {
            Ok(()) => {
                self.emit(&format!("staged {} points to VOLATILE", points.len()));
                Ok(points.len())
            }
            Err(e) => {
                inner.last_error = e.to_string();
                self.emit(&format!("DATA VOLATILE ({} points) -> [link error: {}]", points.len(), e));
                Err(e.to_string())
            }
        }
    }

    /// Copy the staged volatile data into the named non-volatile slot.
    /// Returns the device error, if any, from the explicit post-copy check.
    pub fn copy_volatile_to(&self, name: &str) -> Option<DeviceError> {
        let mut inner = self.inner();
        if inner.session.is_none() {
            return None;
        }
        let cmd = format!("DATA:COPY {},VOLATILE", name.to_ascii_uppercase());
        self.write_checked(&mut inner, &cmd)
    }

    /// Delete a named waveform from non-volatile memory. Returns whether the
    /// device accepted the delete.
    pub fn delete_waveform(&self, name: &str) -> bool {
        let mut inner = self.inner();
        if inner.session.is_none() {
            return false;
        }
        let cmd = format!("DATA:DEL {}", name.to_ascii_uppercase());
        self.write_checked(&mut inner, &cmd).is_none()
    }

    /// All waveforms the device currently knows (built-ins, VOLATILE if
    /// staged, user slots). Re-queried on demand; never cached.
    pub fn query_catalog(&self) -> Vec<String> {
        scpi::parse_catalog(&self.query("DATA:CAT?"))
    }

    /// The user non-volatile slots only.
    pub fn query_nonvolatile_catalog(&self) -> Vec<String> {
        scpi::parse_catalog(&self.query("DATA:NVOL:CAT?"))
    }

    pub fn query_nonvolatile_free(&self) -> Option<u32> {
        self.query("DATA:NVOL:FREE?")
            .trim_start_matches('+')
            .trim()
            .parse()
            .ok()
    }

    // --- locked helpers ---

    fn write_checked(&self, inner: &mut ChannelInner, command: &str) -> Option<DeviceError> {
        if inner.session.is_none() {
            return None;
        }
        if let Err(e) = send_line(inner, command) {
            self.record_link_failure(inner, command, &e);
            return None;
        }
        thread::sleep(COMMAND_SETTLE);
        if let Err(e) = send_line(inner, "SYST:ERR?") {
            self.record_link_failure(inner, command, &e);
            return None;
        }
        thread::sleep(COMMAND_SETTLE);
        match read_line(inner) {
            Ok(response) => {
                if !response.is_empty() {
                    self.emit(&format!("{} -> {}", command, response));
                }
                match scpi::parse_error_response(&response) {
                    Some(err) => {
                        inner.last_error = err.to_string();
                        log::warn!(
                            target: "device::channel",
                            "device error after {:?}: {}", command, err
                        );
                        Some(err)
                    }
                    None => None,
                }
            }
            // The device answers the error query only when it feels like it;
            // a timeout means no error reported yet.
            Err(LinkError::Timeout) => None,
            Err(e) => {
                self.record_link_failure(inner, command, &e);
                None
            }
        }
    }

    fn write_unchecked(&self, inner: &mut ChannelInner, command: &str) {
        if inner.session.is_none() {
            return;
        }
        if let Err(e) = send_line(inner, command) {
            log::trace!(target: "device::channel", "fast write {:?} dropped: {}", command, e);
        }
    }

    fn query_locked(&self, inner: &mut ChannelInner, command: &str) -> String {
        if inner.session.is_none() {
            return String::new();
        }
        if let Err(e) = send_line(inner, command) {
            self.record_link_failure(inner, command, &e);
            return String::new();
        }
        thread::sleep(QUERY_SETTLE);
        match read_line(inner) {
            Ok(response) => response,
            Err(e) => {
                self.emit(&format!("{} -> [read error: {}]", command, e));
                String::new()
            }
        }
    }

    fn record_link_failure(&self, inner: &mut ChannelInner, command: &str, err: &LinkError) {
        inner.last_error = err.to_string();
        self.emit(&format!("{} -> [link error: {}]", command, err));
    }
}

fn clamp_phase(phase_deg: f64) -> f64 {
    if phase_deg >= 360.0 {
        359.999
    } else if phase_deg < 0.0 {
        0.0
    } else {
        phase_deg
    }
}

fn send_line(inner: &mut ChannelInner, command: &str) -> Result<(), LinkError> {
    let session = inner
        .session
        .as_mut()
        .ok_or_else(|| LinkError::Io("not connected".to_string()))?;
    session.write(format!("{}\n", command).as_bytes())?;
    session.flush()
}

fn read_line(inner: &mut ChannelInner) -> Result<String, LinkError> {
    let session = inner
        .session
        .as_mut()
        .ok_or_else(|| LinkError::Io("not connected".to_string()))?;
    let bytes = session.read(READ_BUFFER_LEN)?;
    Ok(String::from_utf8_lossy(&bytes)
        .trim_end_matches(['\n', '\r', ' '])
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimInstrument;

    fn connected_channel() -> (SimInstrument, CommandChannel) {
        let sim = SimInstrument::new();
        let channel = CommandChannel::new(Box::new(sim.link()), &Config::default());
        assert!(channel.connect("GPIB0::10::INSTR"));
        sim.clear_transcript();
        (sim, channel)
    }

    #[test]
    fn connect_enters_remote_and_clears_status() {
        let sim = SimInstrument::new();
        let channel = CommandChannel::new(Box::new(sim.link()), &Config::default());
        assert!(channel.connect("GPIB0::10::INSTR"));
        assert!(channel.is_connected());
        assert!(sim.remote());
        let transcript = sim.transcript();
        assert_eq!(transcript[0], "SYST:REM");
        assert!(transcript.contains(&"*CLS".to_string()));
        assert_eq!(sim.timeout_ms(), Config::default().io_timeout_ms());
    }

    #[test]
    fn connect_failure_reports_last_error() {
        let sim = SimInstrument::new();
        sim.refuse_opens(true);
        let channel = CommandChannel::new(Box::new(sim.link()), &Config::default());
        assert!(!channel.connect("GPIB0::10::INSTR"));
        assert!(!channel.is_connected());
        assert!(!channel.last_error().is_empty());
    }

    #[test]
    fn disconnect_returns_to_local_and_is_idempotent() {
        let (sim, channel) = connected_channel();
        channel.disconnect();
        assert!(!channel.is_connected());
        assert!(!sim.remote());
        assert!(sim.transcript().contains(&"SYST:LOC".to_string()));
        channel.disconnect(); // second call is a no-op
    }

    #[test]
    fn set_frequency_formats_and_caches_base() {
        let (sim, channel) = connected_channel();
        channel.set_frequency(1000.0);
        assert_eq!(sim.commands_with_prefix("FREQ "), vec!["FREQ 1000.000000"]);
        assert_eq!(channel.base().frequency, 1000.0);
    }

    #[test]
    fn numeric_formatting_never_uses_comma() {
        let (sim, channel) = connected_channel();
        channel.set_frequency(1234.5678);
        channel.set_amplitude(0.25);
        channel.set_offset(-1.5);
        for cmd in sim.transcript() {
            if cmd.starts_with("FREQ") || cmd.starts_with("VOLT") {
                assert!(!cmd.contains(','), "decimal comma leaked into {:?}", cmd);
            }
        }
    }

    #[test]
    fn phase_clamps_at_360() {
        let (sim, channel) = connected_channel();
        channel.set_phase(360.0);
        assert_eq!(sim.commands_with_prefix("PHAS"), vec!["PHAS 359.999"]);
    }

    #[test]
    fn apply_waveform_is_one_command_and_updates_bases() {
        let (sim, channel) = connected_channel();
        channel.apply_waveform(WaveShape::Sine, 440.0, 2.0, 0.5);
        assert_eq!(
            sim.commands_with_prefix("APPL:"),
            vec!["APPL:SIN 440.000000, 2.000000, 0.500000"]
        );
        let base = channel.base();
        assert_eq!(base.frequency, 440.0);
        assert_eq!(base.amplitude, 2.0);
        assert_eq!(base.offset, 0.5);
    }

    #[test]
    fn live_updates_leave_base_untouched() {
        let (sim, channel) = connected_channel();
        channel.set_frequency(1000.0);
        channel.update_frequency_live(1100.0);
        assert_eq!(channel.base().frequency, 1000.0);
        assert_eq!(
            sim.commands_with_prefix("FREQ "),
            vec!["FREQ 1000.000000", "FREQ 1100.000000"]
        );
    }

    #[test]
    fn device_error_is_captured_not_thrown() {
        let (sim, channel) = connected_channel();
        sim.inject_error(-222, "Data out of range");
        channel.set_frequency(99e6);
        assert!(channel.last_error().contains("Data out of range"));
    }

    #[test]
    fn poll_errors_drains_deferred_errors() {
        let (sim, channel) = connected_channel();
        sim.inject_error(-410, "Query INTERRUPTED");
        sim.inject_error(-222, "Data out of range");
        assert_eq!(channel.poll_errors(), 2);
        assert_eq!(channel.poll_errors(), 0);
    }

    #[test]
    fn query_returns_empty_on_silence() {
        let (_sim, channel) = connected_channel();
        assert_eq!(channel.query("FAKE:QUERY:NOREPLY"), "");
    }

    #[test]
    fn idn_query() {
        let (_sim, channel) = connected_channel();
        assert!(channel.query_idn().starts_with("HEWLETT-PACKARD,33120A"));
    }

    #[test]
    fn stage_volatile_extends_and_restores_timeout() {
        let (sim, channel) = connected_channel();
        let points = vec![0.5f32; 64];
        assert_eq!(channel.stage_volatile(&points), Ok(64));
        // restored after the bulk write
        assert_eq!(sim.timeout_ms(), Config::default().io_timeout_ms());
        assert_eq!(sim.volatile_points().len(), 64);
        assert_eq!(channel.check_error(), None);
    }

    #[test]
    fn setters_are_noops_when_disconnected() {
        let sim = SimInstrument::new();
        let channel = CommandChannel::new(Box::new(sim.link()), &Config::default());
        channel.set_frequency(500.0);
        channel.write("FREQ 1.0");
        assert_eq!(channel.query("*IDN?"), "");
        assert!(sim.transcript().is_empty());
        // base still tracks the requested value for a later connect
        assert_eq!(channel.base().frequency, 500.0);
    }
}
