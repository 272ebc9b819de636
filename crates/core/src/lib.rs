//! Vocalis core: an immutable audio engine
//!
//! Raw PCM is decoded into a per-channel sample matrix, run through chains of
//! filters and dynamics processors whose state carries across buffer splices,
//! and measured or re-encoded. Every operation returns a new value.

pub mod domain;

pub use domain::*;
