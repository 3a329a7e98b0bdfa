//! Nota Common - shared types and deterministic scoring for the notation
//! engine.
//!
//! Everything in this crate is pure data and pure functions: the network and
//! filesystem live in `notad`.

pub mod config;
pub mod error;
pub mod rubric;
pub mod scoring;
pub mod state;
pub mod transcript;

pub use error::NotaError;
pub use rubric::*;
pub use scoring::*;
pub use transcript::*;
