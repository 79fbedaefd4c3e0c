//! Packet state and per-packet random streams

use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::event::EventKind;
use super::search::line_search;
use crate::doppler_factor;
use crate::error::TransportResult;
use crate::medium::Medium;

/// Where a packet is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PacketStatus {
    /// Still being transported
    InProcess,
    /// Left through the outer boundary
    Emitted,
    /// Fell back through the photosphere
    Reabsorbed,
}

/// A Monte Carlo energy packet on a radial ray
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Packet {
    pub index: usize,
    /// Radius (cm)
    pub r: f64,
    /// Direction cosine relative to the radial direction
    pub mu: f64,
    /// Lab-frame frequency (Hz)
    pub nu: f64,
    /// Lab-frame energy
    pub energy: f64,
    pub shell: usize,
    /// Next line the packet can come into resonance with
    pub next_line_id: usize,
    pub status: PacketStatus,
    pub last_interaction_type: Option<EventKind>,
    pub last_interaction_in_nu: f64,
    pub last_line_interaction_in_id: Option<usize>,
    pub last_line_interaction_out_id: Option<usize>,
}

impl Packet {
    pub fn new(index: usize, r: f64, mu: f64, nu: f64, energy: f64) -> Self {
        Self {
            index,
            r,
            mu,
            nu,
            energy,
            shell: 0,
            next_line_id: 0,
            status: PacketStatus::InProcess,
            last_interaction_type: None,
            last_interaction_in_nu: 0.0,
            last_line_interaction_in_id: None,
            last_line_interaction_out_id: None,
        }
    }

    /// Frequency in the local rest frame of the medium
    #[inline]
    pub fn comoving_nu(&self, time_explosion: f64) -> f64 {
        self.nu * doppler_factor(self.r, self.mu, time_explosion)
    }

    /// Point `next_line_id` at the first line redward of the comoving frequency
    pub fn initialize_line_id(&mut self, medium: &Medium) -> TransportResult<()> {
        let comov_nu = self.comoving_nu(medium.time_explosion);
        self.next_line_id = line_search(&medium.line_list_nu, comov_nu)?;
        Ok(())
    }

    #[inline]
    pub fn in_flight(&self) -> bool {
        self.status == PacketStatus::InProcess
    }

    /// Energy as reported in outputs: negative for reabsorbed packets
    pub fn signed_energy(&self) -> f64 {
        match self.status {
            PacketStatus::Reabsorbed => -self.energy,
            _ => self.energy,
        }
    }
}

/// RNG stream assignment for one packet
///
/// Packet `i` of a run always draws from stream `i` of the run seed, so a
/// batch reproduces regardless of how packets are spread over workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngState {
    pub seed: u64,
    pub stream: u64,
}

impl RngState {
    pub fn for_packet(seed: u64, index: usize) -> Self {
        Self {
            seed,
            stream: index as u64,
        }
    }

    pub fn to_rng(&self) -> Pcg32 {
        Pcg32::new(self.seed, self.stream)
    }
}
