//! Radiation-field estimators
//!
//! A packet collects its contributions in a private [`PacketEstimators`]
//! buffer. Only packets that finish their journey get committed to an
//! [`Estimators`] accumulator, so a failed packet leaves no trace in the
//! shared totals. Workers own one accumulator each and the accumulators are
//! merged once the batch is done.

use serde::{Deserialize, Serialize};

use super::packet::Packet;
use crate::consts::INVERSE_C;

/// Contribution of one packet passing one line in one shell
#[derive(Debug, Clone, Copy, PartialEq)]
struct LineContribution {
    index: usize,
    j_blue: f64,
    edotlu: f64,
}

/// Per-packet buffer of estimator contributions
#[derive(Debug, Clone)]
pub struct PacketEstimators {
    n_shells: usize,
    j: Vec<f64>,
    nu_bar: Vec<f64>,
    lines: Vec<LineContribution>,
}

impl PacketEstimators {
    pub fn new(n_shells: usize) -> Self {
        Self {
            n_shells,
            j: vec![0.0; n_shells],
            nu_bar: vec![0.0; n_shells],
            lines: Vec::new(),
        }
    }

    /// Reset for the next packet, keeping allocations
    pub fn clear(&mut self) {
        self.j.iter_mut().for_each(|v| *v = 0.0);
        self.nu_bar.iter_mut().for_each(|v| *v = 0.0);
        self.lines.clear();
    }

    /// Track-length contribution of a flight of `distance` in the packet's shell
    ///
    /// Must be called with the packet state from before the move.
    pub fn add_flight(&mut self, packet: &Packet, distance: f64, doppler_factor: f64) {
        let comov_energy = packet.energy * doppler_factor;
        let comov_nu = packet.nu * doppler_factor;
        self.j[packet.shell] += comov_energy * distance;
        self.nu_bar[packet.shell] += comov_energy * distance * comov_nu;
    }

    /// Contribution of the packet passing through `line_id` after `distance`
    pub fn add_line_passage(&mut self, packet: &Packet, line_id: usize, distance: f64, time_explosion: f64) {
        let doppler = 1.0 - (distance + packet.mu * packet.r) / time_explosion * INVERSE_C;
        let comov_energy = packet.energy * doppler;
        self.lines.push(LineContribution {
            index: line_id * self.n_shells + packet.shell,
            j_blue: comov_energy / packet.nu,
            edotlu: comov_energy,
        });
    }
}

/// Accumulated estimators for a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Estimators {
    pub n_shells: usize,
    pub n_lines: usize,
    /// Mean intensity estimator per shell
    pub j: Vec<f64>,
    /// Frequency-weighted mean intensity per shell
    pub nu_bar: Vec<f64>,
    /// Blue-wing intensity, `[line * n_shells + shell]`
    pub j_blue: Vec<f64>,
    /// Energy deposited in each line, `[line * n_shells + shell]`
    pub edotlu: Vec<f64>,
}

impl Estimators {
    pub fn new(n_shells: usize, n_lines: usize) -> Self {
        Self {
            n_shells,
            n_lines,
            j: vec![0.0; n_shells],
            nu_bar: vec![0.0; n_shells],
            j_blue: vec![0.0; n_lines * n_shells],
            edotlu: vec![0.0; n_lines * n_shells],
        }
    }

    /// Add a finished packet's contributions
    pub fn commit(&mut self, packet: &PacketEstimators) {
        for (total, v) in self.j.iter_mut().zip(&packet.j) {
            *total += v;
        }
        for (total, v) in self.nu_bar.iter_mut().zip(&packet.nu_bar) {
            *total += v;
        }
        for line in &packet.lines {
            self.j_blue[line.index] += line.j_blue;
            self.edotlu[line.index] += line.edotlu;
        }
    }

    /// Combine two accumulators of the same shape
    pub fn merge(mut self, other: &Estimators) -> Self {
        for (a, b) in [
            (&mut self.j, &other.j),
            (&mut self.nu_bar, &other.nu_bar),
            (&mut self.j_blue, &other.j_blue),
            (&mut self.edotlu, &other.edotlu),
        ] {
            for (total, v) in a.iter_mut().zip(b) {
                *total += v;
            }
        }
        self
    }

    #[inline]
    pub fn j_blue(&self, line: usize, shell: usize) -> f64 {
        self.j_blue[line * self.n_shells + shell]
    }

    /// Mean comoving frequency seen in each shell
    pub fn mean_frequency(&self) -> Vec<f64> {
        self.j
            .iter()
            .zip(&self.nu_bar)
            .map(|(&j, &nu_bar)| if j > 0.0 { nu_bar / j } else { 0.0 })
            .collect()
    }
}
