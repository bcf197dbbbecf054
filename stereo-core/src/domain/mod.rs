//! Domain types: instruments, spacecraft and the per-instrument selectors.

pub mod instrument;

pub use instrument::{Instrument, MagCoord, Spacecraft, Species, Viewing};
