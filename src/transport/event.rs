//! Next-event selection
//!
//! Every candidate event gets a distance along the ray; the nearest one
//! happens. Lines are walked in order from the packet's next line until one
//! of them is optically thick enough, or until the boundary or a continuum
//! event comes first.

use serde::{Deserialize, Serialize};

use super::continuum::Continuum;
use super::distance::{ShellCrossing, distance_to_boundary, distance_to_electron, distance_to_line};
use super::estimators::PacketEstimators;
use super::packet::Packet;
use crate::config::TransportConfig;
use crate::consts::MISS_DISTANCE;
use crate::error::{TransportError, TransportResult};
use crate::medium::Medium;

/// Kinds of event, in tie-break priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Crossing into a neighbouring shell
    Boundary,
    /// Interaction with a spectral line
    Line,
    /// Electron or other continuum interaction
    Continuum,
}

/// A candidate event and the distance to it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub kind: EventKind,
    pub distance: f64,
}

impl Candidate {
    pub fn new(kind: EventKind, distance: f64) -> Self {
        Self { kind, distance }
    }

    /// Reachable on the current ray
    #[inline]
    fn reachable(&self) -> bool {
        self.distance >= 0.0 && self.distance < MISS_DISTANCE && self.distance.is_finite()
    }
}

/// Nearest reachable candidate
///
/// Equal distances go to the kind listed first in [`EventKind`], so a shell
/// crossing is always resolved before a line at the same point.
pub fn select_event(candidates: &[Candidate]) -> Option<Candidate> {
    candidates
        .iter()
        .filter(|c| c.reachable())
        .min_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.kind.cmp(&b.kind))
        })
        .copied()
}

/// The event a packet undergoes next
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub distance: f64,
    /// Set for boundary events
    pub crossing: Option<ShellCrossing>,
}

/// Find the next event for `packet` given a sampled optical depth `tau_event`
///
/// Updates `next_line_id` to the first line not yet passed and, for line
/// events, records the absorbing line. Lines passed on the way contribute to
/// the packet's line estimators.
pub fn trace_packet(
    packet: &mut Packet,
    medium: &Medium,
    continuum: &dyn Continuum,
    tau_event: f64,
    config: &TransportConfig,
    estimators: &mut PacketEstimators,
) -> TransportResult<Event> {
    let shell = packet.shell;
    let t_exp = medium.time_explosion;
    let boundary = distance_to_boundary(
        packet.r,
        packet.mu,
        medium.r_inner[shell],
        medium.r_outer[shell],
    );
    let boundary_event = Event {
        kind: EventKind::Boundary,
        distance: boundary.distance,
        crossing: Some(boundary.crossing),
    };

    let comov_nu = packet.comoving_nu(t_exp);
    let chi_continuum = continuum.opacity(medium, shell, comov_nu);
    let mut distance_continuum = distance_to_electron(tau_event, chi_continuum);
    let mut tau_trace_line_combined = 0.0;
    let lines_active = config.line_interactions_enabled();

    for line_id in packet.next_line_id..medium.n_lines() {
        let nu_line = medium.line_list_nu[line_id];
        let distance_line = distance_to_line(packet.r, packet.mu, packet.nu, nu_line, t_exp)?;

        let nearest = select_event(&[
            Candidate::new(EventKind::Boundary, boundary.distance),
            Candidate::new(EventKind::Line, distance_line),
            Candidate::new(EventKind::Continuum, distance_continuum),
        ]);
        match nearest.map(|c| c.kind) {
            Some(EventKind::Line) => {}
            Some(EventKind::Continuum) => {
                packet.next_line_id = line_id;
                return Ok(Event {
                    kind: EventKind::Continuum,
                    distance: distance_continuum,
                    crossing: None,
                });
            }
            Some(EventKind::Boundary) => {
                packet.next_line_id = line_id;
                return Ok(boundary_event);
            }
            None => return Err(no_reachable_event(packet)),
        }

        estimators.add_line_passage(packet, line_id, distance_line, t_exp);
        if !lines_active {
            continue;
        }

        tau_trace_line_combined += medium.tau_sobolev(line_id, shell);
        let tau_trace_continuum = chi_continuum * distance_line;
        if tau_trace_line_combined + tau_trace_continuum > tau_event {
            packet.next_line_id = line_id;
            packet.last_interaction_in_nu = packet.nu;
            packet.last_line_interaction_in_id = Some(line_id);
            log::trace!(
                "packet {}: line {line_id} interaction after {distance_line:e} cm in shell {shell}",
                packet.index
            );
            return Ok(Event {
                kind: EventKind::Line,
                distance: distance_line,
                crossing: None,
            });
        }

        // What is left of the optical depth budget goes to the continuum
        distance_continuum = distance_to_electron(tau_event - tau_trace_line_combined, chi_continuum);
    }

    packet.next_line_id = medium.n_lines();
    match select_event(&[
        Candidate::new(EventKind::Boundary, boundary.distance),
        Candidate::new(EventKind::Continuum, distance_continuum),
    ])
    .map(|c| c.kind)
    {
        Some(EventKind::Continuum) => Ok(Event {
            kind: EventKind::Continuum,
            distance: distance_continuum,
            crossing: None,
        }),
        Some(_) => Ok(boundary_event),
        None => Err(no_reachable_event(packet)),
    }
}

fn no_reachable_event(packet: &Packet) -> TransportError {
    TransportError::NoReachableEvent {
        index: packet.index,
        r: packet.r,
        mu: packet.mu,
        shell: packet.shell,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::{MacroAtomTable, SyntheticMedium};
    use crate::transport::continuum::ElectronScattering;

    fn one_shell_medium(lines: Vec<f64>, tau: f64, n_e: f64) -> Medium {
        let n_lines = lines.len();
        Medium {
            r_inner: vec![1e14],
            r_outer: vec![2e15],
            electron_densities: vec![n_e],
            time_explosion: 1e6,
            line_list_nu: lines,
            tau_sobolev: vec![tau; n_lines],
            line_to_upper_level: Vec::new(),
            macro_atom: MacroAtomTable::default(),
        }
    }

    #[test]
    fn test_select_event_minimum() {
        let best = select_event(&[
            Candidate::new(EventKind::Boundary, 5.0),
            Candidate::new(EventKind::Line, 2.0),
            Candidate::new(EventKind::Continuum, 3.0),
        ])
        .unwrap();
        assert_eq!(best.kind, EventKind::Line);
        assert_eq!(best.distance, 2.0);
    }

    #[test]
    fn test_select_event_ties_prefer_boundary_then_line() {
        let best = select_event(&[
            Candidate::new(EventKind::Continuum, 1.0),
            Candidate::new(EventKind::Line, 1.0),
            Candidate::new(EventKind::Boundary, 1.0),
        ])
        .unwrap();
        assert_eq!(best.kind, EventKind::Boundary);

        let best = select_event(&[
            Candidate::new(EventKind::Continuum, 1.0),
            Candidate::new(EventKind::Line, 1.0),
        ])
        .unwrap();
        assert_eq!(best.kind, EventKind::Line);
    }

    #[test]
    fn test_select_event_skips_misses() {
        let best = select_event(&[
            Candidate::new(EventKind::Boundary, MISS_DISTANCE),
            Candidate::new(EventKind::Line, f64::NAN),
            Candidate::new(EventKind::Continuum, f64::INFINITY),
        ]);
        assert!(best.is_none());
    }

    #[test]
    fn test_trace_thick_line_wins() {
        let medium = one_shell_medium(vec![1.0e15, 0.99e15], 100.0, 0.0);
        let config = TransportConfig::default();
        let mut packet = Packet::new(0, 1e15, 0.0, 1.001e15, 1.0);
        let mut buffer = PacketEstimators::new(1);
        let event = trace_packet(&mut packet, &medium, &ElectronScattering, 1.0, &config, &mut buffer).unwrap();
        assert_eq!(event.kind, EventKind::Line);
        assert_eq!(packet.next_line_id, 0);
        assert_eq!(packet.last_line_interaction_in_id, Some(0));
        let expected = 0.001e15 / 1.001e15 * crate::consts::C * 1e6;
        assert!((event.distance - expected).abs() / expected < 1e-9);
    }

    #[test]
    fn test_trace_thin_lines_are_passed() {
        // Both lines far too thin: packet streams to the boundary
        let medium = one_shell_medium(vec![1.0e15, 0.9999e15], 1e-6, 0.0);
        let config = TransportConfig::default();
        let mut packet = Packet::new(0, 1e15, 0.0, 1.001e15, 1.0);
        let mut buffer = PacketEstimators::new(1);
        let event = trace_packet(&mut packet, &medium, &ElectronScattering, 1.0, &config, &mut buffer).unwrap();
        assert_eq!(event.kind, EventKind::Boundary);
        assert_eq!(event.crossing, Some(ShellCrossing::Outward));
        assert_eq!(packet.next_line_id, 2);
    }

    #[test]
    fn test_trace_disabled_lines_are_transparent() {
        let medium = one_shell_medium(vec![1.0e15], 100.0, 0.0);
        let config = TransportConfig {
            disable_line_scattering: true,
            ..Default::default()
        };
        let mut packet = Packet::new(0, 1e15, 0.0, 1.001e15, 1.0);
        let mut buffer = PacketEstimators::new(1);
        let event = trace_packet(&mut packet, &medium, &ElectronScattering, 1.0, &config, &mut buffer).unwrap();
        assert_eq!(event.kind, EventKind::Boundary);
        assert_eq!(packet.last_line_interaction_in_id, None);
    }

    #[test]
    fn test_trace_electron_scatter_before_line() {
        // Dense electrons: continuum distance is tiny
        let medium = one_shell_medium(vec![0.5e15], 100.0, 1e15);
        let config = TransportConfig::default();
        let mut packet = Packet::new(0, 1e15, 0.0, 1.0e15, 1.0);
        let mut buffer = PacketEstimators::new(1);
        let event = trace_packet(&mut packet, &medium, &ElectronScattering, 1.0, &config, &mut buffer).unwrap();
        assert_eq!(event.kind, EventKind::Continuum);
        assert_eq!(packet.next_line_id, 0);
        let chi = 1e15 * crate::consts::SIGMA_THOMSON;
        assert!((event.distance - 1.0 / chi).abs() / event.distance < 1e-12);
    }

    #[test]
    fn test_trace_rejects_stale_line_index() {
        let medium = one_shell_medium(vec![2.0e15], 1.0, 0.0);
        let config = TransportConfig::default();
        // Line is blueward of the packet but still marked as next
        let mut packet = Packet::new(0, 1e15, 0.0, 1.0e15, 1.0);
        let mut buffer = PacketEstimators::new(1);
        let err = trace_packet(&mut packet, &medium, &ElectronScattering, 1.0, &config, &mut buffer).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PhysicalConsistency);
    }

    #[test]
    fn test_trace_without_reachable_event_is_error() {
        // A hair outside the outer sphere on a grazing ray: the boundary
        // distance has no real root and nothing else can happen
        let mut medium = one_shell_medium(Vec::new(), 0.0, 0.0);
        medium.r_outer[0] = 2e14;
        let config = TransportConfig::default();
        let mut packet = Packet::new(4, 2e14 * (1.0 + 4e-16), -1e-9, 1e15, 1.0);
        let mut buffer = PacketEstimators::new(1);
        let err = trace_packet(&mut packet, &medium, &ElectronScattering, 1.0, &config, &mut buffer).unwrap_err();
        assert!(matches!(err, TransportError::NoReachableEvent { index: 4, shell: 0, .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::PhysicalConsistency);
    }

    #[test]
    fn test_trace_synthetic_medium_from_photosphere() {
        let medium = Medium::synthetic(&SyntheticMedium::default());
        let config = TransportConfig::default();
        let mut packet = Packet::new(0, medium.photosphere(), 0.8, 6e14, 1.0);
        packet.initialize_line_id(&medium).unwrap();
        let mut buffer = PacketEstimators::new(medium.n_shells());
        let event = trace_packet(&mut packet, &medium, &ElectronScattering, 0.7, &config, &mut buffer).unwrap();
        assert!(event.distance >= 0.0);
        assert!(packet.next_line_id <= medium.n_lines());
        if event.kind == EventKind::Boundary {
            assert_eq!(event.crossing, Some(ShellCrossing::Outward));
        }
    }
}
