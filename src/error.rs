//! Error types for packet transport

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Broad classes of transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Query outside a table's covered range
    Domain,
    /// Geometry or frequency bookkeeping violated a physical invariant
    PhysicalConsistency,
    /// Malformed or non-normalised tables
    DataIntegrity,
    /// Bad configuration or medium input
    Input,
}

/// Errors raised while tracing a packet
///
/// None of these are retried: each one aborts the packet that raised it.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("binary search called outside its domain: {value} not in [{lower}, {upper}]")]
    OutOfDomain { value: f64, lower: f64, upper: f64 },

    #[error("invalid search index range [{imin}, {imax}] for a table of {len} entries")]
    InvalidSearchRange { imin: usize, imax: usize, len: usize },

    #[error(
        "comoving nu {comov_nu} below line nu {nu_line} (relative {relative:e}) at r = {r}, mu = {mu}, nu = {nu}"
    )]
    ComovingFrequencyBelowLine {
        comov_nu: f64,
        nu_line: f64,
        relative: f64,
        r: f64,
        mu: f64,
        nu: f64,
    },

    #[error("packet {index} has no reachable event at r = {r}, mu = {mu} in shell {shell}")]
    NoReachableEvent {
        index: usize,
        r: f64,
        mu: f64,
        shell: usize,
    },

    #[error("packet {index} asked to move a non-finite distance {distance}")]
    NonFiniteDistance { index: usize, distance: f64 },

    #[error("macro-atom level {level} in shell {shell} exhausted its transitions (sum {total} <= draw {draw})")]
    MacroAtomExhausted {
        level: usize,
        shell: usize,
        total: f64,
        draw: f64,
    },

    #[error("macro-atom cascade from level {level} in shell {shell} exceeded {steps} steps")]
    MacroAtomStepLimit { level: usize, shell: usize, steps: u32 },

    #[error("macro-atom table has no transitions for level {level} in shell {shell}")]
    MalformedMacroAtom { level: usize, shell: usize },

    #[error("packet {index} exceeded {limit} interactions")]
    InteractionLimit { index: usize, limit: u32 },

    #[error("invalid medium: {0}")]
    InvalidMedium(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransportError::OutOfDomain { .. } | TransportError::InvalidSearchRange { .. } => ErrorKind::Domain,
            TransportError::ComovingFrequencyBelowLine { .. }
            | TransportError::NoReachableEvent { .. }
            | TransportError::NonFiniteDistance { .. } => ErrorKind::PhysicalConsistency,
            TransportError::MacroAtomExhausted { .. }
            | TransportError::MacroAtomStepLimit { .. }
            | TransportError::MalformedMacroAtom { .. }
            | TransportError::InteractionLimit { .. } => ErrorKind::DataIntegrity,
            TransportError::InvalidMedium(_)
            | TransportError::InvalidConfig(_)
            | TransportError::Io(_)
            | TransportError::Json(_)
            | TransportError::ThreadPool(_) => ErrorKind::Input,
        }
    }
}
