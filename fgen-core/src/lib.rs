//! # fgen-core
//!
//! Device-communication core for a programmable function generator driven
//! over an instrument-control bus with the SCPI dialect.
//!
//! The stack, bottom up: [`link`] is the transport seam (VISA via [`visa`],
//! or the in-memory [`sim`] instrument); [`channel`] owns the single session
//! and serializes every command; [`dispatch`] coalesces bursty parameter
//! updates onto a background worker; [`arb`] runs the multi-step arbitrary-
//! waveform upload protocol on its own worker; [`lfo`] modulates live
//! parameters around the channel's cached base values. [`controller`] wires
//! it all together for a front end.

pub mod arb;
pub mod channel;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod lfo;
pub mod link;
pub mod resample;
pub mod scpi;
pub mod sim;
pub mod visa;

pub use arb::{ArbManager, UploadOutcome, SLOT_COUNT};
pub use channel::{BaseParams, CommandChannel, LogSink};
pub use config::Config;
pub use controller::Controller;
pub use dispatch::CommandQueue;
pub use lfo::{Lfo, LfoBank};
pub use link::{InstrumentLink, LinkError, LinkResult, LinkSession};
pub use scpi::DeviceError;
pub use sim::SimInstrument;
pub use visa::VisaLink;
