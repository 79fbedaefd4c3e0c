//! shellray - Monte Carlo photon-packet transport
//!
//! Core modules:
//! - `transport`: Deterministic packet transport (distances, line search, macro-atom, events)
//! - `medium`: Read-only shell/line/macro-atom tables shared by all packets
//! - `driver`: Parallel batch runner and estimator reduction
//! - `config`: Run configuration

pub mod config;
pub mod driver;
pub mod error;
pub mod medium;
pub mod transport;

pub use config::{LineInteractionType, TransportConfig};
pub use driver::{BatchReport, PacketFailure, PacketOutcome, run_batch};
pub use error::{ErrorKind, TransportError, TransportResult};
pub use medium::{MacroAtomTable, Medium};

/// Physical and numerical constants (cgs)
pub mod consts {
    /// Speed of light (cm/s)
    pub const C: f64 = 2.99792458e10;
    /// Inverse speed of light (s/cm)
    pub const INVERSE_C: f64 = 1.0 / C;
    /// Thomson cross-section (cm²)
    pub const SIGMA_THOMSON: f64 = 6.652_458_732_1e-25;

    /// Distance returned when an event cannot happen on the current ray
    pub const MISS_DISTANCE: f64 = f64::MAX;
    /// Relative frequency difference below which a packet counts as resonant
    pub const CLOSE_LINE_THRESHOLD: f64 = 1e-7;

    /// Transition type code marking a radiative (emitting) macro-atom transition
    pub const EMISSION_TRANSITION: i64 = -1;
    /// Default cap on internal macro-atom jumps before a cascade is declared runaway
    pub const MAX_MACRO_ATOM_STEPS: u32 = 10_000;
    /// Default cap on interactions for a single packet
    pub const MAX_INTERACTIONS: u32 = 1_000_000;
}

/// First-order Doppler factor `1 - mu * r / (c * t_exp)` for homologous expansion
#[inline]
pub fn doppler_factor(r: f64, mu: f64, time_explosion: f64) -> f64 {
    1.0 - mu * r / time_explosion * consts::INVERSE_C
}

/// Lab-frame over comoving-frame factor, the reciprocal of [`doppler_factor`]
#[inline]
pub fn inverse_doppler_factor(r: f64, mu: f64, time_explosion: f64) -> f64 {
    1.0 / doppler_factor(r, mu, time_explosion)
}
