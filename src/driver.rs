//! Batch driver
//!
//! Runs a batch of packets over a rayon pool. Each worker owns its estimator
//! accumulator and a reusable per-packet buffer; a packet's buffer is
//! committed only when the packet finishes without error. Worker states are
//! merged once every packet has been processed, and outcomes are reported in
//! packet-index order so a batch is reproducible for a given seed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::TransportConfig;
use crate::error::{ErrorKind, TransportError, TransportResult};
use crate::medium::Medium;
use crate::transport::{
    Continuum, Estimators, EventKind, Packet, PacketEstimators, PacketStatus, RngState, TrackedInteraction,
    single_packet_loop,
};

/// Launches packets from the photosphere
#[derive(Debug, Clone, Copy)]
pub struct PacketSource {
    radius: f64,
    nu_min: f64,
    nu_max: f64,
    energy: f64,
}

impl PacketSource {
    pub fn new(medium: &Medium, config: &TransportConfig) -> Self {
        Self {
            radius: medium.photosphere(),
            nu_min: config.nu_range.0,
            nu_max: config.nu_range.1,
            energy: config.packet_energy,
        }
    }

    /// Fresh packet with a uniform frequency and an outward `mu = sqrt(u)`
    pub fn create<R: Rng>(&self, index: usize, rng: &mut R) -> Packet {
        let nu = self.nu_min + rng.random::<f64>() * (self.nu_max - self.nu_min);
        let mu = rng.random::<f64>().sqrt();
        Packet::new(index, self.radius, mu, nu, self.energy)
    }
}

/// Final state of one successfully transported packet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketOutcome {
    pub index: usize,
    pub status: PacketStatus,
    /// Lab-frame frequency on leaving the medium
    pub nu: f64,
    /// Lab-frame energy, negative for reabsorbed packets
    pub energy: f64,
    pub last_interaction_type: Option<EventKind>,
    pub last_interaction_in_nu: f64,
    pub last_line_interaction_in_id: Option<usize>,
    pub last_line_interaction_out_id: Option<usize>,
    pub interactions: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track: Option<Vec<TrackedInteraction>>,
}

impl PacketOutcome {
    fn from_packet(packet: &Packet, interactions: u32, track: Option<Vec<TrackedInteraction>>) -> Self {
        Self {
            index: packet.index,
            status: packet.status,
            nu: packet.nu,
            energy: packet.signed_energy(),
            last_interaction_type: packet.last_interaction_type,
            last_interaction_in_nu: packet.last_interaction_in_nu,
            last_line_interaction_in_id: packet.last_line_interaction_in_id,
            last_line_interaction_out_id: packet.last_line_interaction_out_id,
            interactions,
            track,
        }
    }
}

/// A packet that was dropped from the batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketFailure {
    pub index: usize,
    pub kind: ErrorKind,
    pub message: String,
}

/// Result of a batch run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Successful packets, sorted by index
    pub outcomes: Vec<PacketOutcome>,
    /// Failed packets, sorted by index
    pub failures: Vec<PacketFailure>,
    /// Estimators of the successful packets only
    pub estimators: Estimators,
}

impl BatchReport {
    pub fn emitted(&self) -> usize {
        self.count(PacketStatus::Emitted)
    }

    pub fn reabsorbed(&self) -> usize {
        self.count(PacketStatus::Reabsorbed)
    }

    fn count(&self, status: PacketStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Total energy carried out through the outer boundary
    pub fn escaped_energy(&self) -> f64 {
        self.outcomes
            .iter()
            .filter(|o| o.status == PacketStatus::Emitted)
            .map(|o| o.energy)
            .sum()
    }

    /// One-line human readable summary
    pub fn summary(&self) -> String {
        format!(
            "{} packets: {} emitted, {} reabsorbed, {} failed, escaped energy {:.6e}",
            self.outcomes.len() + self.failures.len(),
            self.emitted(),
            self.reabsorbed(),
            self.failures.len(),
            self.escaped_energy()
        )
    }
}

/// Transport packet `index` from creation to completion
///
/// `scratch` is cleared first and holds the packet's estimator contributions
/// afterwards; it is left in an unspecified state on error.
pub fn propagate_packet(
    index: usize,
    medium: &Medium,
    continuum: &dyn Continuum,
    config: &TransportConfig,
    source: &PacketSource,
    scratch: &mut PacketEstimators,
) -> TransportResult<PacketOutcome> {
    scratch.clear();
    let mut rng = RngState::for_packet(config.seed, index).to_rng();
    let mut packet = source.create(index, &mut rng);
    packet.initialize_line_id(medium)?;

    let mut track = config.track_packets.then(Vec::new);
    let interactions = single_packet_loop(
        &mut packet,
        medium,
        continuum,
        config,
        &mut rng,
        scratch,
        track.as_mut(),
    )?;
    Ok(PacketOutcome::from_packet(&packet, interactions, track))
}

/// Per-worker accumulator
struct WorkerState {
    estimators: Estimators,
    scratch: PacketEstimators,
    outcomes: Vec<PacketOutcome>,
    errors: Vec<(usize, TransportError)>,
}

impl WorkerState {
    fn new(medium: &Medium) -> Self {
        Self {
            estimators: Estimators::new(medium.n_shells(), medium.n_lines()),
            scratch: PacketEstimators::new(medium.n_shells()),
            outcomes: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn merge(mut self, other: WorkerState) -> Self {
        self.estimators = self.estimators.merge(&other.estimators);
        self.outcomes.extend(other.outcomes);
        self.errors.extend(other.errors);
        self
    }
}

/// Run `config.no_of_packets` packets through `medium`
///
/// Failed packets are logged and reported without touching the estimators.
/// With `abort_on_packet_error` set, no further packets are started after the
/// first failure and the lowest-index error is returned instead of a report.
pub fn run_batch(
    medium: &Medium,
    config: &TransportConfig,
    continuum: &dyn Continuum,
) -> TransportResult<BatchReport> {
    config.validate()?;
    medium.validate_for(config)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()?;
    let source = PacketSource::new(medium, config);
    let abort = AtomicBool::new(false);
    let start = Instant::now();

    log::info!(
        "Running {} packets on {} threads ({} lines, {} shells, {} interactions)",
        config.no_of_packets,
        pool.current_num_threads(),
        medium.n_lines(),
        medium.n_shells(),
        config.line_interaction_type.as_str()
    );

    let state = pool.install(|| {
        (0..config.no_of_packets)
            .into_par_iter()
            .fold(
                || WorkerState::new(medium),
                |mut state, index| {
                    if abort.load(Ordering::Relaxed) {
                        return state;
                    }
                    match propagate_packet(index, medium, continuum, config, &source, &mut state.scratch) {
                        Ok(outcome) => {
                            state.estimators.commit(&state.scratch);
                            state.outcomes.push(outcome);
                        }
                        Err(err) => {
                            log::warn!("Packet {index} dropped: {err}");
                            if config.abort_on_packet_error {
                                abort.store(true, Ordering::Relaxed);
                            }
                            state.errors.push((index, err));
                        }
                    }
                    state
                },
            )
            .reduce(|| WorkerState::new(medium), WorkerState::merge)
    });

    let WorkerState {
        estimators,
        mut outcomes,
        mut errors,
        ..
    } = state;
    errors.sort_by_key(|(index, _)| *index);

    if config.abort_on_packet_error && !errors.is_empty() {
        let (index, err) = errors.swap_remove(0);
        log::error!("Batch aborted by packet {index}: {err}");
        return Err(err);
    }

    outcomes.sort_by_key(|o| o.index);
    let failures = errors
        .into_iter()
        .map(|(index, err)| PacketFailure {
            index,
            kind: err.kind(),
            message: err.to_string(),
        })
        .collect();
    let report = BatchReport {
        outcomes,
        failures,
        estimators,
    };
    log::info!("{} in {:.2?}", report.summary(), start.elapsed());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::SyntheticMedium;
    use crate::transport::ElectronScattering;

    fn small_medium() -> Medium {
        Medium::synthetic(&SyntheticMedium {
            n_shells: 5,
            n_lines: 60,
            ..Default::default()
        })
    }

    fn small_config(no_of_packets: usize) -> TransportConfig {
        TransportConfig {
            no_of_packets,
            threads: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_packet_source_draws_in_range() {
        let medium = small_medium();
        let config = small_config(1);
        let source = PacketSource::new(&medium, &config);
        for index in 0..200 {
            let mut rng = RngState::for_packet(1, index).to_rng();
            let packet = source.create(index, &mut rng);
            assert!(packet.nu >= config.nu_range.0 && packet.nu <= config.nu_range.1);
            assert!((0.0..=1.0).contains(&packet.mu));
            assert_eq!(packet.r, medium.photosphere());
            assert_eq!(packet.shell, 0);
        }
    }

    #[test]
    fn test_propagate_packet_is_deterministic() {
        let medium = small_medium();
        let config = small_config(1);
        let source = PacketSource::new(&medium, &config);
        let mut scratch = PacketEstimators::new(medium.n_shells());
        let a = propagate_packet(5, &medium, &ElectronScattering, &config, &source, &mut scratch).unwrap();
        let b = propagate_packet(5, &medium, &ElectronScattering, &config, &source, &mut scratch).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.status, PacketStatus::InProcess);
    }

    #[test]
    fn test_tracking_records_every_interaction() {
        let medium = small_medium();
        let config = TransportConfig {
            track_packets: true,
            ..small_config(1)
        };
        let source = PacketSource::new(&medium, &config);
        let mut scratch = PacketEstimators::new(medium.n_shells());
        let outcome = propagate_packet(0, &medium, &ElectronScattering, &config, &source, &mut scratch).unwrap();
        let track = outcome.track.unwrap();
        assert_eq!(track.len(), outcome.interactions as usize);
        assert_eq!(track.last().map(|t| t.status), Some(outcome.status));
    }

    #[test]
    fn test_run_batch_accounts_for_every_packet() {
        let medium = small_medium();
        let config = small_config(64);
        let report = run_batch(&medium, &config, &ElectronScattering).unwrap();
        assert_eq!(report.outcomes.len() + report.failures.len(), 64);
        assert_eq!(report.emitted() + report.reabsorbed(), report.outcomes.len());
        assert!(report.outcomes.windows(2).all(|w| w[0].index < w[1].index));
        assert!(report.summary().contains("64 packets"));
        assert!(report.estimators.j.iter().all(|&j| j >= 0.0));
    }

    #[test]
    fn test_run_batch_rejects_bad_config() {
        let medium = small_medium();
        let config = TransportConfig {
            nu_range: (0.0, 1e15),
            ..small_config(4)
        };
        let err = run_batch(&medium, &config, &ElectronScattering).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
    }
}
