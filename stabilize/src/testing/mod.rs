//! Test-only helpers: synthetic drifting sequences and exact registration doubles.

pub mod synthetic;

pub use synthetic::{ExactRegistrar, blob_field, drift_sequence, roll, translated};
