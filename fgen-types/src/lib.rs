//! # fgen-types
//!
//! Shared type definitions for the fgen function-generator control stack.
//! This crate contains the plain data types used across fgen-core and any
//! front end driving it: waveform shapes, modulation routing, LFO
//! configuration, and MIDI pitch helpers.

mod lfo;
mod midi;
mod shape;
mod source;

pub use lfo::{LfoConfig, LfoShape, LfoTarget};
pub use midi::{note_to_frequency, velocity_to_amplitude};
pub use shape::{ModShape, WaveShape};
pub use source::{BurstSource, ModSource, TriggerSource};
