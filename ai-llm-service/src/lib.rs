//! Upstream LLM clients for the textbook assistant.
//!
//! - [`service_profiles::LlmServiceProfiles`] is the entry point: one
//!   generation profile and one embedding profile, both env-driven
//!   (see [`config::default_config`]).
//! - Concrete clients live in [`services`].
//! - [`telemetry`] provides the shared `tracing` fmt layer for the workspace.

pub mod config;
pub mod error_handler;
pub mod health_service;
pub mod service_profiles;
pub mod services;
pub mod telemetry;
pub mod types;
