//! Audio buffers and the signal processing around them.
//!
//! Everything here is offline and deterministic: the same input buffer
//! always yields the same output samples.

pub mod buffer;
pub mod filter;
pub mod loudness;
pub mod mixer;
pub mod tone;
pub mod wav;
