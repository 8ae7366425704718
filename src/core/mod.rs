// src/core/mod.rs

// The `core` module holds the whole engine: the data model, the probes and
// the batcher they run through, the enumeration strategies, storage and the
// orchestrator tying them together.

/// Scans, findings, per-category details and request/target types.
pub mod models;

/// Error taxonomy: validation, probe, storage and scan errors.
pub mod error;

/// Static read-only knowledge: port table, banners, built-in signatures.
pub mod knowledge_base;

pub mod wordlists;

/// Signature catalog (configuration data) and its compiled form.
pub mod signatures;

/// Single-target network checks behind traits.
pub mod probe;

pub mod batcher;

/// The six enumeration strategies.
pub mod scanner;

/// Storage gateway trait and its adapters.
pub mod storage;

pub mod orchestrator;
