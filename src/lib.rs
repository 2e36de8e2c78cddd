//! UltimaLearning backend
//!
//! Gamified skill-tracking REST API: hierarchical learning nodes with
//! XP-based progression, AI-generated knowledge tests, and AI project
//! reviews, backed by MongoDB.
//!
//! ## Services
//!
//! - **Auth**: JWT access/refresh tokens with argon2 password hashing
//! - **Nodes**: container/learning node tree with per-node progression
//! - **Tests**: difficulty-staged multiple-choice test generation and scoring
//! - **Projects**: rubric-driven project review with strictness scaling
//! - **Cache**: fingerprinted AI response cache with TTL expiry
//! - **Quota**: rolling 24-hour project submission limits

pub mod ai;
pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod progression;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::UltimaError;
