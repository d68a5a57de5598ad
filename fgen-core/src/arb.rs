//! Arb waveform memory manager.
//!
//! Turns arbitrary-length sampled audio into a device-compatible arbitrary
//! waveform and lands it in one of the 4 named non-volatile memory slots:
//! load (WAV, folded to mono), anti-aliased resample to the slot's point
//! count, bulk-stage into VOLATILE, explicit error check, `DATA:COPY` with
//! eviction-and-retry when memory is full, catalog-membership verification,
//! then user-waveform selection.
//!
//! Uploads run on their own worker thread so a multi-second transfer never
//! blocks parameter dispatch. Completion for async uploads is delivered
//! exactly once per accepted request on the outcome channel supplied at
//! construction; the consumer decides which thread handles it.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use fgen_types::WaveShape;

use crate::channel::CommandChannel;
use crate::config::Config;
use crate::resample::{self, MAX_POINTS, MIN_POINTS};
use crate::scpi;

/// Non-volatile arb slots on this device family.
pub const SLOT_COUNT: usize = 4;

/// Default slot names, chosen to avoid device-reserved names.
const DEFAULT_NAMES: [&str; SLOT_COUNT] = ["MYARB", "ARB_2", "ARB_3", "CUSTOM"];

/// Completion report for an accepted async upload, delivered exactly once.
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub slot: usize,
    pub success: bool,
    pub message: String,
}

struct ArbSlot {
    name: String,
    /// Original sample data, kept for re-resampling at new point counts.
    original: Vec<f32>,
    target_points: usize,
    has_data: bool,
    uploaded: bool,
    uploading: bool,
}

impl ArbSlot {
    fn new(name: &str) -> Self {
        ArbSlot {
            name: name.to_string(),
            original: Vec::new(),
            target_points: 1024,
            has_data: false,
            uploaded: false,
            uploading: false,
        }
    }
}

struct UploadTask {
    slot: usize,
}

#[derive(Clone)]
struct RecoverySettings {
    copy_retries: u32,
    volatile_lost_code: i32,
}

pub struct ArbManager {
    channel: Arc<CommandChannel>,
    slots: Arc<[Mutex<ArbSlot>; SLOT_COUNT]>,
    settings: RecoverySettings,
    task_tx: Option<Sender<UploadTask>>,
    worker: Option<JoinHandle<()>>,
}

impl ArbManager {
    pub fn new(
        channel: Arc<CommandChannel>,
        outcome_tx: Sender<UploadOutcome>,
        config: &Config,
    ) -> Self {
        let slots: Arc<[Mutex<ArbSlot>; SLOT_COUNT]> =
            Arc::new(std::array::from_fn(|i| Mutex::new(ArbSlot::new(DEFAULT_NAMES[i]))));
        let settings = RecoverySettings {
            copy_retries: config.copy_retries(),
            volatile_lost_code: config.volatile_lost_code(),
        };

        let (task_tx, task_rx) = unbounded::<UploadTask>();
        let worker = {
            let channel = channel.clone();
            let slots = slots.clone();
            let settings = settings.clone();
            thread::Builder::new()
                .name("arb-upload".into())
                .spawn(move || {
                    upload_worker(channel, slots, settings, task_rx, outcome_tx);
                })
                .expect("failed to spawn arb-upload thread")
        };

        ArbManager {
            channel,
            slots,
            settings,
            task_tx: Some(task_tx),
            worker: Some(worker),
        }
    }

    fn slot(&self, index: usize) -> Option<MutexGuard<'_, ArbSlot>> {
        self.slots
            .get(index)
            .map(|slot| slot.lock().unwrap_or_else(|e| e.into_inner()))
    }

    // --- slot metadata ---

    pub fn slot_name(&self, index: usize) -> Option<String> {
        self.slot(index).map(|slot| slot.name.clone())
    }

    pub fn set_slot_name(&self, index: usize, name: &str) -> bool {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return false;
        }
        match self.slot(index) {
            Some(mut slot) => {
                slot.name = trimmed.to_ascii_uppercase();
                // the device copy (if any) now carries a stale name
                slot.uploaded = false;
                true
            }
            None => false,
        }
    }

    pub fn point_count(&self, index: usize) -> Option<usize> {
        self.slot(index).map(|slot| slot.target_points)
    }

    pub fn has_data(&self, index: usize) -> bool {
        self.slot(index).map(|slot| slot.has_data).unwrap_or(false)
    }

    pub fn is_uploaded(&self, index: usize) -> bool {
        self.slot(index).map(|slot| slot.uploaded).unwrap_or(false)
    }

    pub fn is_uploading(&self, index: usize) -> bool {
        self.slot(index).map(|slot| slot.uploading).unwrap_or(false)
    }

    // --- loading ---

    /// Load a WAV file into a slot's original buffer. Stereo content is
    /// folded to mono by averaging the first two channels; integer sample
    /// formats are scaled to `[-1, 1]`. Clears the uploaded flag.
    pub fn load_audio_file(&self, index: usize, path: &Path) -> Result<usize, String> {
        let samples = read_wav_mono(path)?;
        self.load_samples(index, samples)
    }

    /// Load an already-decoded mono buffer into a slot.
    pub fn load_samples(&self, index: usize, samples: Vec<f32>) -> Result<usize, String> {
        if samples.is_empty() {
            return Err("no samples in source".to_string());
        }
        let mut slot = self
            .slot(index)
            .ok_or_else(|| format!("invalid slot index {}", index))?;
        let count = samples.len();
        slot.original = samples;
        slot.has_data = true;
        slot.uploaded = false;
        log::info!(target: "device::arb", "slot {} loaded {} samples", index, count);
        Ok(count)
    }

    /// Change a slot's target point count (device limits 8–16000). If the
    /// slot was already uploaded, re-uploads synchronously so the device copy
    /// never diverges from the declared count.
    pub fn set_slot_point_count(&self, index: usize, points: usize) -> Result<(), String> {
        if !(MIN_POINTS..=MAX_POINTS).contains(&points) {
            return Err(format!(
                "point count {} outside {}..={}",
                points, MIN_POINTS, MAX_POINTS
            ));
        }
        let was_uploaded;
        {
            let mut slot = self
                .slot(index)
                .ok_or_else(|| format!("invalid slot index {}", index))?;
            was_uploaded = slot.uploaded && slot.has_data;
            slot.target_points = points;
        }
        if was_uploaded {
            let (success, message) = self.upload_slot_blocking(index);
            if !success {
                return Err(message);
            }
        }
        Ok(())
    }

    // --- uploading ---

    /// Queue an async upload of a slot. Rejected immediately (without
    /// touching the device) if the index is invalid, the slot is empty, or an
    /// upload of the same slot is already in flight. An accepted request
    /// reports exactly one [`UploadOutcome`] on the outcome channel.
    pub fn upload_slot_async(&self, index: usize) -> Result<(), String> {
        {
            let mut slot = self
                .slot(index)
                .ok_or_else(|| format!("invalid slot index {}", index))?;
            if !slot.has_data {
                return Err("no data in slot".to_string());
            }
            if slot.uploading {
                return Err("upload already in progress".to_string());
            }
            // claimed here so a second request races against nothing
            slot.uploading = true;
        }
        match &self.task_tx {
            Some(tx) => match tx.send(UploadTask { slot: index }) {
                Ok(()) => Ok(()),
                Err(_) => {
                    if let Some(mut slot) = self.slot(index) {
                        slot.uploading = false;
                    }
                    Err("upload worker unavailable".to_string())
                }
            },
            None => Err("upload worker unavailable".to_string()),
        }
    }

    /// Run the full upload protocol on the calling thread. Same per-slot
    /// exclusion as the async path.
    pub fn upload_slot_blocking(&self, index: usize) -> (bool, String) {
        if index >= SLOT_COUNT {
            return (false, format!("invalid slot index {}", index));
        }
        {
            let Some(mut slot) = self.slot(index) else {
                return (false, format!("invalid slot index {}", index));
            };
            if !slot.has_data {
                return (false, "no data in slot".to_string());
            }
            if slot.uploading {
                return (false, "upload already in progress".to_string());
            }
            slot.uploading = true;
        }
        run_upload(&self.channel, &self.slots, &self.settings, index)
    }

    // --- device housekeeping ---

    /// Delete a named waveform from the device's non-volatile memory.
    pub fn delete_from_device(&self, name: &str) -> bool {
        if !self.channel.is_connected() {
            return false;
        }
        self.channel.delete_waveform(name)
    }

    /// The device cannot report the *contents* of an arb slot, only the name
    /// catalog, so reconnecting cannot reconcile local state against the
    /// device. All uploaded flags reset; the user re-uploads as needed.
    pub fn sync_from_device(&self) {
        for index in 0..SLOT_COUNT {
            if let Some(mut slot) = self.slot(index) {
                slot.uploaded = false;
            }
        }
    }
}

impl Drop for ArbManager {
    fn drop(&mut self) {
        // closing the task channel lets the worker drain and exit
        self.task_tx = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn upload_worker(
    channel: Arc<CommandChannel>,
    slots: Arc<[Mutex<ArbSlot>; SLOT_COUNT]>,
    settings: RecoverySettings,
    task_rx: Receiver<UploadTask>,
    outcome_tx: Sender<UploadOutcome>,
) {
    while let Ok(task) = task_rx.recv() {
        let (success, message) = run_upload(&channel, &slots, &settings, task.slot);
        let _ = outcome_tx.send(UploadOutcome {
            slot: task.slot,
            success,
            message,
        });
    }
}

/// The upload protocol. Expects the slot's `uploading` flag to be already
/// claimed; always clears it before returning.
fn run_upload(
    channel: &CommandChannel,
    slots: &[Mutex<ArbSlot>; SLOT_COUNT],
    settings: &RecoverySettings,
    index: usize,
) -> (bool, String) {
    let result = run_upload_inner(channel, slots, settings, index);
    let mut slot = slots[index].lock().unwrap_or_else(|e| e.into_inner());
    slot.uploading = false;
    if result.0 {
        slot.uploaded = true;
    }
    result
}

fn run_upload_inner(
    channel: &CommandChannel,
    slots: &[Mutex<ArbSlot>; SLOT_COUNT],
    settings: &RecoverySettings,
    index: usize,
) -> (bool, String) {
    if !channel.is_connected() {
        return (false, "device not connected".to_string());
    }

    // Copy the metadata out; device I/O must not run under the slot lock so
    // other slots stay inspectable during a long transfer.
    let (name, original, target_points) = {
        let slot = slots[index].lock().unwrap_or_else(|e| e.into_inner());
        (slot.name.clone(), slot.original.clone(), slot.target_points)
    };

    let resampled = resample::resample_with_anti_aliasing(&original, target_points);
    if resampled.is_empty() {
        return (false, "resampling failed".to_string());
    }
    thread::yield_now();

    if !stage_and_verify(channel, &resampled) {
        return (
            false,
            format!("staging rejected: {}", channel.last_error()),
        );
    }

    let mut copied = false;
    let mut evictions = 0u32;
    for attempt in 0..settings.copy_retries.max(1) {
        match channel.copy_volatile_to(&name) {
            None => {
                // Catalog membership is the authoritative check; the
                // overwrite-vs-full error semantics are too ambiguous to
                // trust the bare code.
                if catalog_contains(channel, &name) {
                    copied = true;
                    break;
                }
                log::warn!(
                    target: "device::arb",
                    "copy of {} reported no error but catalog does not list it", name
                );
                if !evict_for(channel, &name) {
                    break;
                }
                evictions += 1;
            }
            Some(err) if err.code.abs() == settings.volatile_lost_code => {
                log::warn!(
                    target: "device::arb",
                    "volatile staging lost before copy (attempt {}), re-staging", attempt + 1
                );
                if !stage_and_verify(channel, &resampled) {
                    return (
                        false,
                        format!("re-staging rejected: {}", channel.last_error()),
                    );
                }
            }
            Some(err) if err.is_memory_error() => {
                log::warn!(
                    target: "device::arb",
                    "non-volatile memory full copying {} (attempt {}): {}", name, attempt + 1, err
                );
                if !evict_for(channel, &name) {
                    break;
                }
                evictions += 1;
            }
            Some(err) => {
                return (false, format!("copy to {} failed: {}", name, err));
            }
        }
    }

    if copied {
        channel.select_user_waveform(&name);
        let mut message = format!("uploaded {} points to {}", resampled.len(), name);
        if evictions > 0 {
            message.push_str(&format!(" after evicting {} waveform(s)", evictions));
        }
        (true, message)
    } else {
        // Last resort: leave the data selected in the staging area. It works
        // until the next power cycle.
        channel.select_user_waveform("VOLATILE");
        log::warn!(
            target: "device::arb",
            "could not copy {} to non-volatile memory; falling back to VOLATILE \
             (data will not survive a power cycle)", name
        );
        (
            true,
            format!(
                "uploaded {} points to VOLATILE only (non-volatile copy failed)",
                resampled.len()
            ),
        )
    }
}

/// Bulk-stage the points and verify via the explicit error check. The bulk
/// write bypasses the checked path, so this is where staging errors surface.
fn stage_and_verify(channel: &CommandChannel, points: &[f32]) -> bool {
    if channel.stage_volatile(points).is_err() {
        return false;
    }
    match channel.check_error() {
        None => true,
        Some(err) => {
            log::warn!(target: "device::arb", "staging failed: {}", err);
            false
        }
    }
}

fn catalog_contains(channel: &CommandChannel, name: &str) -> bool {
    channel
        .query_nonvolatile_catalog()
        .iter()
        .any(|entry| entry.eq_ignore_ascii_case(name))
}

/// Free a non-volatile slot so a copy of `name` can succeed: delete the
/// target's own stale copy if the catalog lists it, otherwise evict the
/// first non-built-in user waveform. The active function switches to a
/// built-in shape first, since the device refuses to delete the active arb.
fn evict_for(channel: &CommandChannel, name: &str) -> bool {
    let catalog = channel.query_nonvolatile_catalog();
    let victim = if catalog.iter().any(|c| c.eq_ignore_ascii_case(name)) {
        Some(name.to_string())
    } else {
        catalog
            .iter()
            .find(|c| !scpi::is_builtin_waveform(c))
            .cloned()
    };
    let Some(victim) = victim else {
        log::warn!(target: "device::arb", "memory full but nothing evictable in catalog");
        return false;
    };
    channel.set_waveform(WaveShape::Sine);
    let deleted = channel.delete_waveform(&victim);
    log::info!(
        target: "device::arb",
        "evicted {} to make room for {} (accepted: {})", victim, name, deleted
    );
    deleted
}

fn read_wav_mono(path: &Path) -> Result<Vec<f32>, String> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| format!("could not open {}: {}", path.display(), e))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| format!("bad sample in {}: {}", path.display(), e))?,
        hound::SampleFormat::Int => {
            let full_scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<Result<_, _>>()
                .map_err(|e| format!("bad sample in {}: {}", path.display(), e))?
        }
    };

    let frames = interleaved.len() / channels;
    let mut mono = Vec::with_capacity(frames);
    for frame in 0..frames {
        let base = frame * channels;
        let sample = if channels >= 2 {
            (interleaved[base] + interleaved[base + 1]) * 0.5
        } else {
            interleaved[base]
        };
        mono.push(sample);
    }
    Ok(mono)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimInstrument;

    fn setup() -> (SimInstrument, Arc<CommandChannel>, ArbManager, Receiver<UploadOutcome>) {
        let sim = SimInstrument::new();
        let channel = Arc::new(CommandChannel::new(
            Box::new(sim.link()),
            &Config::default(),
        ));
        assert!(channel.connect("GPIB0::10::INSTR"));
        sim.clear_transcript();
        let (outcome_tx, outcome_rx) = unbounded();
        let manager = ArbManager::new(channel.clone(), outcome_tx, &Config::default());
        (sim, channel, manager, outcome_rx)
    }

    fn triangle(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / len as f32;
                if t < 0.5 {
                    t * 4.0 - 1.0
                } else {
                    3.0 - t * 4.0
                }
            })
            .collect()
    }

    #[test]
    fn default_slot_names_avoid_reserved_names() {
        let (_sim, _channel, manager, _rx) = setup();
        for i in 0..SLOT_COUNT {
            let name = manager.slot_name(i).unwrap();
            assert!(!scpi::is_builtin_waveform(&name), "{} is reserved", name);
        }
    }

    #[test]
    fn index_validation_everywhere() {
        let (_sim, _channel, manager, _rx) = setup();
        assert!(manager.slot_name(SLOT_COUNT).is_none());
        assert!(manager.load_samples(SLOT_COUNT, vec![0.0; 16]).is_err());
        assert!(manager.set_slot_point_count(SLOT_COUNT, 1024).is_err());
        assert!(manager.upload_slot_async(SLOT_COUNT).is_err());
        assert!(!manager.upload_slot_blocking(SLOT_COUNT).0);
    }

    #[test]
    fn point_count_limits() {
        let (_sim, _channel, manager, _rx) = setup();
        assert!(manager.set_slot_point_count(0, 7).is_err());
        assert!(manager.set_slot_point_count(0, 16001).is_err());
        assert!(manager.set_slot_point_count(0, 8).is_ok());
        assert!(manager.set_slot_point_count(0, 16000).is_ok());
    }

    #[test]
    fn load_clears_uploaded_flag() {
        let (_sim, _channel, manager, _rx) = setup();
        manager.load_samples(0, triangle(100)).unwrap();
        manager.set_slot_point_count(0, 64).unwrap();
        let (ok, _msg) = manager.upload_slot_blocking(0);
        assert!(ok);
        assert!(manager.is_uploaded(0));
        manager.load_samples(0, triangle(50)).unwrap();
        assert!(!manager.is_uploaded(0));
    }

    #[test]
    fn blocking_upload_stages_copies_and_selects() {
        let (sim, _channel, manager, _rx) = setup();
        manager.load_samples(0, triangle(48000)).unwrap();
        let (ok, message) = manager.upload_slot_blocking(0);
        assert!(ok, "{}", message);
        assert_eq!(sim.volatile_points().len(), 1024);
        assert!(sim
            .volatile_points()
            .iter()
            .all(|v| (-1.0..=1.0).contains(v)));
        assert_eq!(sim.nonvolatile_catalog(), vec!["MYARB"]);
        assert_eq!(sim.selected_user(), "MYARB");
    }

    #[test]
    fn upload_without_data_is_rejected() {
        let (_sim, _channel, manager, _rx) = setup();
        assert_eq!(
            manager.upload_slot_async(0),
            Err("no data in slot".to_string())
        );
    }

    #[test]
    fn async_upload_reports_exactly_one_outcome() {
        let (_sim, _channel, manager, rx) = setup();
        manager.load_samples(1, triangle(2000)).unwrap();
        manager.upload_slot_async(1).unwrap();
        let outcome = rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("no outcome delivered");
        assert_eq!(outcome.slot, 1);
        assert!(outcome.success, "{}", outcome.message);
        assert!(rx
            .recv_timeout(std::time::Duration::from_millis(100))
            .is_err());
        assert!(manager.is_uploaded(1));
        assert!(!manager.is_uploading(1));
    }

    #[test]
    fn memory_full_recovery_evicts_exactly_once() {
        let (sim, _channel, manager, _rx) = setup();
        sim.set_nonvolatile_catalog(&["OLD_A", "OLD_B", "OLD_C", "OLD_D"]);
        manager.load_samples(0, triangle(512)).unwrap();
        manager.set_slot_point_count(0, 256).unwrap();
        sim.clear_transcript();

        let (ok, message) = manager.upload_slot_blocking(0);
        assert!(ok, "{}", message);
        assert!(message.contains("evicting 1"), "{}", message);

        // recovery sequence: switch to a built-in shape, delete, retry copy
        let deletes = sim.commands_with_prefix("DATA:DEL");
        assert_eq!(deletes, vec!["DATA:DEL OLD_A"]);
        let copies = sim.commands_with_prefix("DATA:COPY");
        assert_eq!(copies.len(), 2);
        assert!(sim.transcript().contains(&"FUNC SIN".to_string()));
        assert!(sim.nonvolatile_catalog().contains(&"MYARB".to_string()));
    }

    #[test]
    fn own_stale_name_is_deleted_before_retry() {
        let (sim, _channel, manager, _rx) = setup();
        manager.load_samples(0, triangle(512)).unwrap();
        manager.set_slot_point_count(0, 128).unwrap();
        // a stale copy under the same name plus injected memory-full on the
        // first copy attempt
        sim.set_nonvolatile_catalog(&["MYARB", "OTHER"]);
        sim.fail_next_copies(1);
        sim.clear_transcript();

        let (ok, message) = manager.upload_slot_blocking(0);
        assert!(ok, "{}", message);
        assert_eq!(sim.commands_with_prefix("DATA:DEL"), vec!["DATA:DEL MYARB"]);
        assert!(sim.nonvolatile_catalog().contains(&"MYARB".to_string()));
        assert!(sim.nonvolatile_catalog().contains(&"OTHER".to_string()));
    }

    #[test]
    fn second_upload_to_same_slot_rejected_while_in_flight() {
        let (sim, _channel, manager, rx) = setup();
        sim.set_response_delay(std::time::Duration::from_millis(2));
        manager.load_samples(0, triangle(8000)).unwrap();
        manager.set_slot_point_count(0, 4000).unwrap();
        manager.upload_slot_async(0).unwrap();
        assert_eq!(
            manager.upload_slot_async(0),
            Err("upload already in progress".to_string())
        );
        let outcome = rx
            .recv_timeout(std::time::Duration::from_secs(10))
            .expect("no outcome delivered");
        assert!(outcome.success, "{}", outcome.message);
        // slot is free again afterwards
        manager.upload_slot_async(0).unwrap();
        assert!(rx.recv_timeout(std::time::Duration::from_secs(10)).is_ok());
    }

    #[test]
    fn point_count_change_triggers_reupload() {
        let (sim, _channel, manager, _rx) = setup();
        manager.load_samples(0, triangle(1000)).unwrap();
        let (ok, _) = manager.upload_slot_blocking(0);
        assert!(ok);
        assert_eq!(sim.volatile_points().len(), 1024);

        manager.set_slot_point_count(0, 500).unwrap();
        assert_eq!(sim.volatile_points().len(), 500);
        assert!(manager.is_uploaded(0));
    }

    #[test]
    fn sync_from_device_resets_uploaded_flags_only() {
        let (_sim, _channel, manager, _rx) = setup();
        manager.load_samples(2, triangle(100)).unwrap();
        let (ok, _) = manager.upload_slot_blocking(2);
        assert!(ok);
        manager.sync_from_device();
        assert!(!manager.is_uploaded(2));
        assert!(manager.has_data(2));
    }

    #[test]
    fn upload_fails_cleanly_when_disconnected() {
        let (_sim, channel, manager, _rx) = setup();
        manager.load_samples(0, triangle(100)).unwrap();
        channel.disconnect();
        let (ok, message) = manager.upload_slot_blocking(0);
        assert!(!ok);
        assert_eq!(message, "device not connected");
        assert!(!manager.is_uploading(0));
    }

    #[test]
    fn wav_file_loads_and_folds_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(16384i16).unwrap(); // left  ~0.5
            writer.write_sample(0i16).unwrap(); // right  0.0
        }
        writer.finalize().unwrap();

        let (_sim, _channel, manager, _rx) = setup();
        let count = manager.load_audio_file(0, &path).unwrap();
        assert_eq!(count, 100);
        assert!(manager.has_data(0));
    }
}
