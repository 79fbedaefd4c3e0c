//! Single-packet transport loop
//!
//! Samples an optical depth, finds the next event, applies it, and repeats
//! until the packet leaves the medium.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::continuum::Continuum;
use super::estimators::PacketEstimators;
use super::event::{EventKind, trace_packet};
use super::interaction::{cross_shell_boundary, line_scatter, move_packet, thomson_scatter};
use super::packet::{Packet, PacketStatus};
use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::medium::Medium;

/// Packet state right after one event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedInteraction {
    pub status: PacketStatus,
    pub r: f64,
    pub nu: f64,
    pub mu: f64,
    pub energy: f64,
    pub shell: usize,
    pub interaction: EventKind,
}

impl TrackedInteraction {
    fn capture(packet: &Packet, interaction: EventKind) -> Self {
        Self {
            status: packet.status,
            r: packet.r,
            nu: packet.nu,
            mu: packet.mu,
            energy: packet.energy,
            shell: packet.shell,
            interaction,
        }
    }
}

/// Sample an optical depth to the next interaction
#[inline]
pub fn sample_tau_event<R: Rng>(rng: &mut R) -> f64 {
    // 1 - u lies in (0, 1], so the log is finite
    -(1.0 - rng.random::<f64>()).ln()
}

/// Transport `packet` until it is emitted or reabsorbed
///
/// Returns the number of events the packet went through. Estimator
/// contributions land in `estimators`; the caller decides whether to keep
/// them. With `tracker` set, every event is recorded.
pub fn single_packet_loop<R: Rng>(
    packet: &mut Packet,
    medium: &Medium,
    continuum: &dyn Continuum,
    config: &TransportConfig,
    rng: &mut R,
    estimators: &mut PacketEstimators,
    mut tracker: Option<&mut Vec<TrackedInteraction>>,
) -> TransportResult<u32> {
    let t_exp = medium.time_explosion;
    let mut events = 0u32;

    while packet.in_flight() {
        if events >= config.max_interactions {
            return Err(TransportError::InteractionLimit {
                index: packet.index,
                limit: config.max_interactions,
            });
        }
        events += 1;

        let tau_event = sample_tau_event(rng);
        let event = trace_packet(packet, medium, continuum, tau_event, config, estimators)?;
        move_packet(packet, event.distance, t_exp, estimators)?;

        match event.kind {
            EventKind::Boundary => {
                if let Some(crossing) = event.crossing {
                    cross_shell_boundary(packet, crossing, medium);
                }
            }
            EventKind::Line => line_scatter(packet, medium, config, rng)?,
            EventKind::Continuum => thomson_scatter(packet, t_exp, rng),
        }

        if let Some(track) = tracker.as_deref_mut() {
            track.push(TrackedInteraction::capture(packet, event.kind));
        }
    }

    log::trace!(
        "packet {} finished as {:?} after {events} events",
        packet.index,
        packet.status
    );
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::{MacroAtomTable, SyntheticMedium};
    use crate::transport::continuum::ElectronScattering;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn empty_medium() -> Medium {
        Medium {
            r_inner: vec![1e14, 2e14],
            r_outer: vec![2e14, 3e14],
            electron_densities: vec![0.0, 0.0],
            time_explosion: 1e6,
            line_list_nu: Vec::new(),
            tau_sobolev: Vec::new(),
            line_to_upper_level: Vec::new(),
            macro_atom: MacroAtomTable::default(),
        }
    }

    #[test]
    fn test_free_streaming_packet_escapes() {
        let medium = empty_medium();
        let config = TransportConfig::default();
        let mut rng = Pcg32::seed_from_u64(1);
        let mut packet = Packet::new(0, 1e14, 1.0, 1e15, 1.0);
        let mut buffer = PacketEstimators::new(2);
        let mut track = Vec::new();
        let events = single_packet_loop(
            &mut packet,
            &medium,
            &ElectronScattering,
            &config,
            &mut rng,
            &mut buffer,
            Some(&mut track),
        )
        .unwrap();
        assert_eq!(events, 2);
        assert_eq!(packet.status, PacketStatus::Emitted);
        assert!((packet.r - 3e14).abs() / 3e14 < 1e-12);
        assert_eq!(track.len(), 2);
        assert!(track.iter().all(|t| t.interaction == EventKind::Boundary));
        assert_eq!(track[0].shell, 1);
    }

    #[test]
    fn test_inward_packet_is_reabsorbed() {
        let medium = empty_medium();
        let config = TransportConfig::default();
        let mut rng = Pcg32::seed_from_u64(1);
        let mut packet = Packet::new(0, 1.5e14, -1.0, 1e15, 1.0);
        let mut buffer = PacketEstimators::new(2);
        single_packet_loop(&mut packet, &medium, &ElectronScattering, &config, &mut rng, &mut buffer, None)
            .unwrap();
        assert_eq!(packet.status, PacketStatus::Reabsorbed);
        assert!(packet.signed_energy() < 0.0);
    }

    #[test]
    fn test_interaction_limit() {
        let medium = empty_medium();
        let config = TransportConfig {
            max_interactions: 1,
            ..Default::default()
        };
        let mut rng = Pcg32::seed_from_u64(1);
        let mut packet = Packet::new(7, 1e14, 1.0, 1e15, 1.0);
        let mut buffer = PacketEstimators::new(2);
        let err = single_packet_loop(&mut packet, &medium, &ElectronScattering, &config, &mut rng, &mut buffer, None)
            .unwrap_err();
        assert!(matches!(err, TransportError::InteractionLimit { index: 7, limit: 1 }));
    }

    #[test]
    fn test_packet_past_boundary_fails_at_once() {
        let medium = empty_medium();
        let config = TransportConfig::default();
        let mut rng = Pcg32::seed_from_u64(1);
        let mut packet = Packet::new(2, 3e14 * (1.0 + 4e-16), -1e-9, 1e15, 1.0);
        packet.shell = 1;
        let mut buffer = PacketEstimators::new(2);
        let err = single_packet_loop(&mut packet, &medium, &ElectronScattering, &config, &mut rng, &mut buffer, None)
            .unwrap_err();
        assert!(matches!(err, TransportError::NoReachableEvent { index: 2, shell: 1, .. }));
        assert!(packet.r.is_finite() && packet.mu.is_finite());
    }

    #[test]
    fn test_synthetic_packets_finish() {
        let medium = Medium::synthetic(&SyntheticMedium::default());
        let config = TransportConfig::default();
        for index in 0..50 {
            let mut rng = Pcg32::new(99, index as u64);
            let mu = rng.random::<f64>().sqrt();
            let nu = 3e14 + rng.random::<f64>() * 1e15;
            let mut packet = Packet::new(index, medium.photosphere(), mu, nu, 1.0);
            packet.initialize_line_id(&medium).unwrap();
            let mut buffer = PacketEstimators::new(medium.n_shells());
            single_packet_loop(&mut packet, &medium, &ElectronScattering, &config, &mut rng, &mut buffer, None)
                .unwrap();
            assert!(!packet.in_flight());
            assert!(packet.energy > 0.0);
        }
    }

    #[test]
    fn test_tau_event_positive() {
        let mut rng = Pcg32::seed_from_u64(4);
        for _ in 0..1000 {
            let tau = sample_tau_event(&mut rng);
            assert!(tau >= 0.0 && tau.is_finite());
        }
    }
}
