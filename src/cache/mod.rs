//! AI response cache
//!
//! Identical requests within a TTL window are served from storage instead
//! of hitting the model again. Keys are SHA-256 fingerprints over the
//! request inputs; tests live for 7 days, reviews for 30.

pub mod fingerprint;
pub mod store;

pub use fingerprint::{fingerprint, review_fingerprint, test_fingerprint};
pub use store::{
    spawn_sweep_task, MemoryResponseStore, MongoResponseStore, ResponseCache, ResponseStore,
    REVIEW_TTL, TEST_TTL,
};
