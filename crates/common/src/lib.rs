//! Ad mediation and display gating.
//!
//! This crate turns "show an ad for surface X" into a provider-agnostic
//! acquisition: candidate providers are ordered by a configurable strategy,
//! raced one by one against a timeout, and the first fill is bound to the
//! surface until it is shown. A facade on top rate-limits shows, grants
//! rewards and reports outcomes.
//!
//! # Modules
//!
//! - [`advertising`]: Application-facing facade, show gate and collaborator contracts
//! - [`config_store`]: Persistent key/value store used for ordering state
//! - [`constants`]: Default timings, reward amounts and store keys
//! - [`error`]: Error types and error handling utilities
//! - [`integrations`]: AdMob, AppLovin and scripted mock providers
//! - [`logging`]: Process logger setup
//! - [`mediation`]: Provider contract, ordering strategies and the dispatcher
//! - [`settings`]: Configuration management and validation
//! - [`test_support`]: Testing utilities and mocks

pub mod advertising;
pub mod config_store;
pub mod constants;
pub mod error;
pub mod integrations;
pub mod logging;
pub mod mediation;
pub mod settings;
pub mod test_support;
