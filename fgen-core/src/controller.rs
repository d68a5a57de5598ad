//! Controller facade: wires the channel, dispatch queue, arb manager and LFO
//! bank together for a front end.
//!
//! The split of duties callers should respect: direct setters on the channel
//! for explicit one-shot user actions (checked path, latency acceptable),
//! `queue_*` on the dispatch queue for drags and automation streams, the arb
//! manager for uploads, the LFO bank for periodic modulation. A control
//! surface should drive a given parameter through one path at a time; there
//! is no ordering guarantee between a direct write and a queued write.

use std::sync::Arc;

use crossbeam_channel::Sender;

use fgen_types::note_to_frequency;

use crate::arb::{ArbManager, UploadOutcome};
use crate::channel::CommandChannel;
use crate::config::Config;
use crate::dispatch::CommandQueue;
use crate::lfo::LfoBank;
use crate::link::InstrumentLink;

pub struct Controller {
    channel: Arc<CommandChannel>,
    queue: CommandQueue,
    arb: ArbManager,
    lfos: LfoBank,
    default_resource: String,
}

impl Controller {
    /// Build the full stack over `link`. Upload completions are delivered on
    /// `outcomes`; the consumer owns the receiving side and the thread it
    /// drains on.
    pub fn new(
        link: Box<dyn InstrumentLink>,
        config: &Config,
        outcomes: Sender<UploadOutcome>,
    ) -> Self {
        let channel = Arc::new(CommandChannel::new(link, config));
        let queue = CommandQueue::new(channel.clone(), config);
        let arb = ArbManager::new(channel.clone(), outcomes, config);
        let lfos = LfoBank::new(channel.clone(), config);
        Controller {
            channel,
            queue,
            arb,
            lfos,
            default_resource: config.resource(),
        }
    }

    /// Connect using the configured default resource.
    pub fn connect_default(&self) -> bool {
        let resource = self.default_resource.clone();
        self.channel.connect(&resource)
    }

    pub fn connect(&self, resource: &str) -> bool {
        self.channel.connect(resource)
    }

    pub fn disconnect(&self) {
        self.channel.disconnect()
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn device_idn(&self) -> String {
        self.channel.query_idn()
    }

    pub fn channel(&self) -> &Arc<CommandChannel> {
        &self.channel
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn arb(&self) -> &ArbManager {
        &self.arb
    }

    pub fn lfos(&self) -> &LfoBank {
        &self.lfos
    }

    pub fn lfos_mut(&mut self) -> &mut LfoBank {
        &mut self.lfos
    }

    /// Map a MIDI note onto the generator frequency and queue the update
    /// (non-blocking; safe from an audio or MIDI thread). Returns the
    /// frequency so the caller can reflect it in its own state.
    pub fn note_on(&self, note: u8) -> f64 {
        let freq = note_to_frequency(note);
        self.queue.queue_frequency_update(freq);
        freq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimInstrument;
    use std::time::{Duration, Instant};

    fn controller() -> (SimInstrument, Controller) {
        let sim = SimInstrument::new();
        let (outcome_tx, _outcome_rx) = crossbeam_channel::unbounded();
        let controller = Controller::new(Box::new(sim.link()), &Config::default(), outcome_tx);
        (sim, controller)
    }

    #[test]
    fn connect_default_uses_configured_resource() {
        let (sim, controller) = controller();
        assert!(controller.connect_default());
        assert!(controller.is_connected());
        assert!(controller.device_idn().contains("33120A"));
        controller.disconnect();
        assert!(!controller.is_connected());
        assert!(sim.transcript().contains(&"SYST:LOC".to_string()));
    }

    #[test]
    fn note_on_queues_rounded_frequency() {
        let (sim, controller) = controller();
        assert!(controller.connect_default());
        sim.clear_transcript();

        let freq = controller.note_on(69);
        assert_eq!(freq, 440.0);

        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let writes = sim.commands_with_prefix("FREQ ");
            if !writes.is_empty() {
                assert_eq!(writes.last().map(String::as_str), Some("FREQ 440.000000"));
                break;
            }
            assert!(Instant::now() < deadline, "queued frequency never drained");
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}
