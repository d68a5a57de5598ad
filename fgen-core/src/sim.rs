//! In-memory instrument model.
//!
//! `SimInstrument` implements enough of the 33120A command dialect to exercise
//! the whole control stack without attached hardware: the error queue, the
//! volatile staging area, the 4-deep non-volatile catalog with memory-full
//! responses, and user-waveform selection. Tests script failures (error
//! injection, copy rejection, connection refusal) and inspect the full
//! command transcript.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::link::{InstrumentLink, LinkError, LinkResult, LinkSession};
use crate::scpi;

/// Non-volatile user slots available on this device family.
const NONVOLATILE_CAPACITY: usize = 4;

/// Error code the simulator reports for a full non-volatile memory.
pub const SIM_ERR_MEMORY_FULL: i32 = 781;
/// Error code the simulator reports when VOLATILE has no staged data.
pub const SIM_ERR_VOLATILE_EMPTY: i32 = 787;

#[derive(Default)]
struct SimState {
    remote: bool,
    output_on: bool,
    active_shape: String,
    selected_user: String,
    volatile: Option<Vec<f64>>,
    catalog: Vec<String>,
    error_queue: VecDeque<(i32, String)>,
    pending_reply: VecDeque<String>,
    transcript: Vec<String>,
    copy_failures_remaining: u32,
    refuse_opens: bool,
    response_delay: Option<Duration>,
    timeout_ms: u32,
}

/// Handle to a simulated instrument. Clone freely; all clones and all open
/// sessions share the same device state.
#[derive(Clone, Default)]
pub struct SimInstrument {
    state: Arc<Mutex<SimState>>,
}

impl SimInstrument {
    pub fn new() -> Self {
        let sim = SimInstrument::default();
        {
            let mut st = sim.lock();
            st.active_shape = "SIN".to_string();
            st.selected_user = "EXP_RISE".to_string();
        }
        sim
    }

    /// An [`InstrumentLink`] that opens sessions onto this instrument.
    pub fn link(&self) -> SimLink {
        SimLink { state: self.state.clone() }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    // --- test scripting surface ---

    /// Every command line received so far, in order.
    pub fn transcript(&self) -> Vec<String> {
        self.lock().transcript.clone()
    }

    /// Transcript entries starting with `prefix`.
    pub fn commands_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.lock()
            .transcript
            .iter()
            .filter(|cmd| cmd.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn clear_transcript(&self) {
        self.lock().transcript.clear();
    }

    /// Push an error onto the device error queue, as if a command had failed.
    pub fn inject_error(&self, code: i32, message: &str) {
        self.lock().error_queue.push_back((code, message.to_string()));
    }

    /// Make the next `n` `DATA:COPY` commands fail with memory-full.
    pub fn fail_next_copies(&self, n: u32) {
        self.lock().copy_failures_remaining = n;
    }

    /// Refuse (or stop refusing) new session opens.
    pub fn refuse_opens(&self, refuse: bool) {
        self.lock().refuse_opens = refuse;
    }

    /// Delay every command by `delay` (simulates a slow bus).
    pub fn set_response_delay(&self, delay: Duration) {
        self.lock().response_delay = Some(delay);
    }

    pub fn set_nonvolatile_catalog(&self, names: &[&str]) {
        self.lock().catalog = names.iter().map(|n| n.to_ascii_uppercase()).collect();
    }

    pub fn nonvolatile_catalog(&self) -> Vec<String> {
        self.lock().catalog.clone()
    }

    pub fn volatile_points(&self) -> Vec<f64> {
        self.lock().volatile.clone().unwrap_or_default()
    }

    pub fn selected_user(&self) -> String {
        self.lock().selected_user.clone()
    }

    pub fn active_shape(&self) -> String {
        self.lock().active_shape.clone()
    }

    pub fn output_enabled(&self) -> bool {
        self.lock().output_on
    }

    pub fn remote(&self) -> bool {
        self.lock().remote
    }

    /// Last I/O timeout a session configured, in milliseconds.
    pub fn timeout_ms(&self) -> u32 {
        self.lock().timeout_ms
    }
}

/// Link factory for [`SimInstrument`].
pub struct SimLink {
    state: Arc<Mutex<SimState>>,
}

impl InstrumentLink for SimLink {
    fn open(&self, resource: &str) -> LinkResult<Box<dyn LinkSession>> {
        let refuse = self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .refuse_opens;
        if refuse {
            return Err(LinkError::Io(format!("failed to open {}", resource)));
        }
        Ok(Box::new(SimSession { state: self.state.clone() }))
    }
}

struct SimSession {
    state: Arc<Mutex<SimState>>,
}

impl SimSession {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LinkSession for SimSession {
    fn write(&mut self, bytes: &[u8]) -> LinkResult {
        let text = String::from_utf8_lossy(bytes).to_string();
        let delay = self.lock().response_delay;
        for line in text.split('\n') {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(delay) = delay {
                std::thread::sleep(delay);
            }
            let mut st = self.lock();
            st.transcript.push(line.to_string());
            handle_command(&mut st, line);
        }
        Ok(())
    }

    fn read(&mut self, max_len: usize) -> LinkResult<Vec<u8>> {
        let mut st = self.lock();
        match st.pending_reply.pop_front() {
            Some(reply) => {
                let mut bytes = reply.into_bytes();
                bytes.push(b'\n');
                bytes.truncate(max_len);
                Ok(bytes)
            }
            None => Err(LinkError::Timeout),
        }
    }

    fn set_timeout_ms(&mut self, timeout_ms: u32) -> LinkResult {
        self.lock().timeout_ms = timeout_ms;
        Ok(())
    }

    fn flush(&mut self) -> LinkResult {
        Ok(())
    }
}

fn push_error(st: &mut SimState, code: i32, message: &str) {
    st.error_queue.push_back((code, message.to_string()));
}

fn reply(st: &mut SimState, text: String) {
    st.pending_reply.push_back(text);
}

fn known_waveform(st: &SimState, name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    upper == "VOLATILE" && st.volatile.is_some()
        || scpi::BUILTIN_ARBS.iter().any(|a| *a == upper)
        || st.catalog.iter().any(|c| c.eq_ignore_ascii_case(name))
}

/// Check that a numeric argument parses; SCPI wants `.` as decimal separator,
/// so a `,` in a single-value command splits into garbage and is rejected.
fn expect_number(st: &mut SimState, arg: &str) {
    if arg.trim().parse::<f64>().is_err() {
        push_error(st, -102, "Syntax error");
    }
}

fn handle_command(st: &mut SimState, line: &str) {
    // Queries first.
    if let Some(query) = line.strip_suffix('?') {
        match query.to_ascii_uppercase().as_str() {
            "*IDN" => reply(st, "HEWLETT-PACKARD,33120A,0,8.0-5.0-1.0".to_string()),
            "SYST:ERR" => {
                let text = match st.error_queue.pop_front() {
                    Some((code, msg)) => format!("{:+},\"{}\"", code, msg),
                    None => "+0,\"No error\"".to_string(),
                };
                reply(st, text);
            }
            "DATA:CAT" => {
                let mut names: Vec<String> =
                    scpi::BUILTIN_ARBS.iter().map(|s| s.to_string()).collect();
                if st.volatile.is_some() {
                    names.push("VOLATILE".to_string());
                }
                names.extend(st.catalog.iter().cloned());
                reply(st, quote_list(&names));
            }
            "DATA:NVOL:CAT" => {
                let names = st.catalog.clone();
                reply(st, quote_list(&names));
            }
            "DATA:NVOL:FREE" => {
                let free = NONVOLATILE_CAPACITY.saturating_sub(st.catalog.len());
                reply(st, format!("+{}", free));
            }
            _ => push_error(st, -113, "Undefined header"),
        }
        return;
    }

    let upper = line.to_ascii_uppercase();
    let (head, arg) = match line.find(' ') {
        Some(pos) => (upper[..pos].to_string(), line[pos + 1..].trim().to_string()),
        None => (upper.clone(), String::new()),
    };

    match head.as_str() {
        "*CLS" => st.error_queue.clear(),
        "SYST:REM" => st.remote = true,
        "SYST:LOC" => st.remote = false,
        "FREQ" | "VOLT" | "VOLT:OFFS" | "PHAS" | "FUNC:SQU:DCYC" | "AM:DEPT" | "AM:INT:FREQ"
        | "FM:DEV" | "FM:INT:FREQ" | "FSK:FREQ" | "FSK:INT:RATE" | "FREQ:STAR" | "FREQ:STOP"
        | "SWE:TIME" | "BM:PHAS" | "BM:INT:RATE" => expect_number(st, &arg),
        "BM:NCYC" => {
            if arg.trim().parse::<u32>().is_err() {
                push_error(st, -102, "Syntax error");
            }
        }
        "OUTP" => st.output_on = arg.eq_ignore_ascii_case("ON"),
        "OUTP:SYNC" | "AM:STAT" | "FM:STAT" | "FSK:STAT" | "SWE:STAT" | "BM:STAT" => {
            if !arg.eq_ignore_ascii_case("ON") && !arg.eq_ignore_ascii_case("OFF") {
                push_error(st, -102, "Syntax error");
            }
        }
        "AM:SOUR" | "FM:SOUR" | "FSK:SOUR" | "BM:SOUR" | "TRIG:SOUR" | "AM:INT:FUNC"
        | "FM:INT:FUNC" => {
            if arg.is_empty() {
                push_error(st, -102, "Syntax error");
            }
        }
        "FUNC" | "FUNC:SHAP" => {
            let shape = arg.to_ascii_uppercase();
            let known = shape == "USER" || scpi::BUILTIN_SHAPES.iter().any(|s| *s == shape);
            if known {
                st.active_shape = shape;
            } else {
                push_error(st, -224, "Illegal parameter value");
            }
        }
        "FUNC:USER" => {
            if known_waveform(st, &arg) {
                st.selected_user = arg.to_ascii_uppercase();
            } else {
                push_error(st, -224, "Illegal parameter value");
            }
        }
        "DATA" => handle_data_download(st, &arg),
        "DATA:COPY" => handle_data_copy(st, &arg),
        "DATA:DEL" => handle_data_delete(st, &arg),
        _ => {
            if line.starts_with("APPL:") {
                handle_apply(st, line);
            } else {
                push_error(st, -113, "Undefined header");
            }
        }
    }
}

fn handle_apply(st: &mut SimState, line: &str) {
    // APPL:<shape> <freq>, <amp>, <offset>
    let rest = &line["APPL:".len()..];
    let (shape, values) = match rest.find(' ') {
        Some(pos) => (&rest[..pos], &rest[pos + 1..]),
        None => (rest, ""),
    };
    let shape = shape.to_ascii_uppercase();
    if !scpi::BUILTIN_SHAPES.contains(&shape.as_str()) && shape != "USER" {
        push_error(st, -224, "Illegal parameter value");
        return;
    }
    let parsed: Vec<Option<f64>> = values
        .split(',')
        .map(|v| v.trim().parse::<f64>().ok())
        .collect();
    if parsed.len() != 3 || parsed.iter().any(|v| v.is_none()) {
        push_error(st, -102, "Syntax error");
        return;
    }
    st.active_shape = shape;
}

fn handle_data_download(st: &mut SimState, arg: &str) {
    // DATA VOLATILE, v1, v2, ...
    let Some(values) = arg
        .strip_prefix("VOLATILE,")
        .or_else(|| arg.strip_prefix("volatile,"))
    else {
        push_error(st, -113, "Undefined header");
        return;
    };
    let mut points = Vec::new();
    for value in values.split(',') {
        match value.trim().parse::<f64>() {
            Ok(v) => points.push(v),
            Err(_) => {
                push_error(st, -102, "Syntax error");
                return;
            }
        }
    }
    if !(8..=16000).contains(&points.len()) {
        push_error(st, 780, "Arb waveform point count out of range");
        return;
    }
    st.volatile = Some(points);
}

fn handle_data_copy(st: &mut SimState, arg: &str) {
    // DATA:COPY <name>,VOLATILE
    let name = arg.split(',').next().unwrap_or("").trim().to_ascii_uppercase();
    if name.is_empty() {
        push_error(st, -102, "Syntax error");
        return;
    }
    if st.volatile.is_none() {
        push_error(st, SIM_ERR_VOLATILE_EMPTY, "VOLATILE memory is empty");
        return;
    }
    if st.copy_failures_remaining > 0 {
        st.copy_failures_remaining -= 1;
        push_error(st, SIM_ERR_MEMORY_FULL, "Not enough memory");
        return;
    }
    if scpi::is_builtin_waveform(&name) {
        push_error(st, 782, "Cannot overwrite a built-in waveform");
        return;
    }
    if st.catalog.iter().any(|c| c.eq_ignore_ascii_case(&name)) {
        return; // overwrite in place
    }
    if st.catalog.len() >= NONVOLATILE_CAPACITY {
        push_error(st, SIM_ERR_MEMORY_FULL, "Not enough memory");
        return;
    }
    st.catalog.push(name);
}

fn handle_data_delete(st: &mut SimState, arg: &str) {
    let name = arg.trim().to_ascii_uppercase();
    if scpi::is_builtin_waveform(&name) {
        push_error(st, 783, "Cannot delete a built-in waveform");
        return;
    }
    if st.active_shape == "USER" && st.selected_user == name {
        push_error(st, 785, "Cannot delete the active arb waveform");
        return;
    }
    let before = st.catalog.len();
    st.catalog.retain(|c| !c.eq_ignore_ascii_case(&name));
    if st.catalog.len() == before {
        push_error(st, -224, "Illegal parameter value");
    }
}

fn quote_list(names: &[String]) -> String {
    if names.is_empty() {
        return "\"\"".to_string();
    }
    names
        .iter()
        .map(|n| format!("\"{}\"", n))
        .collect::<Vec<_>>()
        .join(",")
}
