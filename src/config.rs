//! Run configuration
//!
//! Read from a JSON file; every field has a default so partial files work.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::{MAX_INTERACTIONS, MAX_MACRO_ATOM_STEPS};
use crate::error::{TransportError, TransportResult};

/// How a line absorption is turned back into an emitted packet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LineInteractionType {
    /// Resonant scattering: re-emit in the absorbing line
    Scatter,
    /// Cascade restricted to downward branches of the upper level
    Downbranch,
    /// Full macro-atom cascade
    #[default]
    Macroatom,
}

impl LineInteractionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineInteractionType::Scatter => "scatter",
            LineInteractionType::Downbranch => "downbranch",
            LineInteractionType::Macroatom => "macroatom",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "scatter" => Some(LineInteractionType::Scatter),
            "downbranch" => Some(LineInteractionType::Downbranch),
            "macroatom" | "macro-atom" | "macro_atom" => Some(LineInteractionType::Macroatom),
            _ => None,
        }
    }

    /// Whether line events go through the macro-atom resolver
    pub fn uses_macro_atom(&self) -> bool {
        match self {
            LineInteractionType::Scatter => false,
            LineInteractionType::Downbranch => true,
            LineInteractionType::Macroatom => true,
        }
    }
}

/// Transport settings for one batch of packets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Run seed; packet `i` draws from stream `i` of this seed
    pub seed: u64,
    /// Number of packets in the batch
    pub no_of_packets: usize,
    /// Source frequency range (Hz), sampled uniformly
    pub nu_range: (f64, f64),
    /// Initial packet energy (normalised)
    pub packet_energy: f64,

    // === Physics ===
    pub line_interaction_type: LineInteractionType,
    /// Skip line interactions entirely (packets still pass lines)
    pub disable_line_scattering: bool,

    // === Guards ===
    /// Internal macro-atom jumps allowed in one cascade
    pub max_macro_atom_steps: u32,
    /// Events allowed per packet
    pub max_interactions: u32,

    // === Driver ===
    /// Record every interaction of every packet
    pub track_packets: bool,
    /// Fail the batch on the first packet error instead of skipping the packet
    pub abort_on_packet_error: bool,
    /// Worker threads (0 = one per core)
    pub threads: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            seed: 23111963,
            no_of_packets: 10_000,
            // Roughly 2000 - 12000 Angstrom
            nu_range: (2.5e14, 1.5e15),
            packet_energy: 1.0,

            line_interaction_type: LineInteractionType::Macroatom,
            disable_line_scattering: false,

            max_macro_atom_steps: MAX_MACRO_ATOM_STEPS,
            max_interactions: MAX_INTERACTIONS,

            track_packets: false,
            abort_on_packet_error: false,
            threads: 0,
        }
    }
}

impl TransportConfig {
    /// Load a configuration from a JSON file
    pub fn load(path: &Path) -> TransportResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        log::info!("Loaded transport config from {}", path.display());
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save(&self, path: &Path) -> TransportResult<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        log::info!("Transport config saved to {}", path.display());
        Ok(())
    }

    /// Line interactions are evaluated at all
    pub fn line_interactions_enabled(&self) -> bool {
        !self.disable_line_scattering
    }

    /// Reject settings no packet could be run with
    pub fn validate(&self) -> TransportResult<()> {
        let (nu_min, nu_max) = self.nu_range;
        if !(nu_min > 0.0 && nu_max > nu_min && nu_max.is_finite()) {
            return Err(TransportError::InvalidConfig(format!(
                "nu_range must satisfy 0 < min < max, got ({nu_min}, {nu_max})"
            )));
        }
        if !(self.packet_energy > 0.0 && self.packet_energy.is_finite()) {
            return Err(TransportError::InvalidConfig(format!(
                "packet_energy must be positive, got {}",
                self.packet_energy
            )));
        }
        if self.max_macro_atom_steps == 0 || self.max_interactions == 0 {
            return Err(TransportError::InvalidConfig(
                "max_macro_atom_steps and max_interactions must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
