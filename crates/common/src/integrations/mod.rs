//! Ad network integrations.
//!
//! Each module exposes `register_providers(&Settings)`, listed in
//! [`crate::mediation`]'s builder list.

pub mod admob;
pub mod applovin;
pub mod mock;
pub mod network;

pub use network::{
    AdNetworkBackend, BackendFill, NetworkAdapter, NetworkProfile, Presentation,
    SimulatedBackend, SimulatedOutcome, SimulationConfig,
};
