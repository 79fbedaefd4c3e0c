//! Event handlers: moving packets, crossing shells and scattering
//!
//! Scattering is isotropic in the comoving frame, so every handler goes
//! lab -> comoving with the old direction and back with the new one.

use rand::Rng;

use super::distance::ShellCrossing;
use super::estimators::PacketEstimators;
use super::event::EventKind;
use super::macro_atom::macro_atom;
use super::packet::{Packet, PacketStatus};
use crate::config::TransportConfig;
use crate::error::{TransportError, TransportResult};
use crate::medium::Medium;
use crate::{doppler_factor, inverse_doppler_factor};

/// Isotropic direction cosine
#[inline]
pub fn random_mu<R: Rng>(rng: &mut R) -> f64 {
    2.0 * rng.random::<f64>() - 1.0
}

/// Advance the packet `distance` along its ray
///
/// Scores the flight in the packet's current shell before moving. A
/// non-finite distance leaves the packet and the estimators untouched.
pub fn move_packet(
    packet: &mut Packet,
    distance: f64,
    time_explosion: f64,
    estimators: &mut PacketEstimators,
) -> TransportResult<()> {
    if !distance.is_finite() {
        return Err(TransportError::NonFiniteDistance {
            index: packet.index,
            distance,
        });
    }
    if distance <= 0.0 {
        return Ok(());
    }
    let doppler = doppler_factor(packet.r, packet.mu, time_explosion);
    estimators.add_flight(packet, distance, doppler);

    let r = packet.r;
    let new_r = (r * r + distance * distance + 2.0 * r * distance * packet.mu).sqrt();
    packet.mu = (packet.mu * r + distance) / new_r;
    packet.r = new_r;
    Ok(())
}

/// Step into the neighbouring shell, or leave the medium
///
/// The packet is put exactly on the sphere it crossed, so rounding in the
/// move never leaves it outside its new shell.
pub fn cross_shell_boundary(packet: &mut Packet, crossing: ShellCrossing, medium: &Medium) {
    packet.r = match crossing {
        ShellCrossing::Outward => medium.r_outer[packet.shell],
        ShellCrossing::Inward => medium.r_inner[packet.shell],
    };
    let next = packet.shell as isize + crossing.delta();
    if next < 0 {
        packet.status = PacketStatus::Reabsorbed;
    } else if next as usize >= medium.n_shells() {
        packet.status = PacketStatus::Emitted;
    } else {
        packet.shell = next as usize;
    }
}

/// Electron (or other grey continuum) scattering
///
/// Comoving frequency and energy are unchanged, so the next line stays the same.
pub fn thomson_scatter<R: Rng>(packet: &mut Packet, time_explosion: f64, rng: &mut R) {
    let old_doppler = doppler_factor(packet.r, packet.mu, time_explosion);
    let comov_nu = packet.nu * old_doppler;
    let comov_energy = packet.energy * old_doppler;

    packet.mu = random_mu(rng);
    let inverse_new_doppler = inverse_doppler_factor(packet.r, packet.mu, time_explosion);
    packet.nu = comov_nu * inverse_new_doppler;
    packet.energy = comov_energy * inverse_new_doppler;
    packet.last_interaction_type = Some(EventKind::Continuum);
}

/// Absorb the packet in its recorded line and re-emit it
///
/// With [`LineInteractionType::Scatter`](crate::config::LineInteractionType::Scatter)
/// the packet comes out in the same line; otherwise the line's upper level is
/// activated and the macro-atom decides.
pub fn line_scatter<R: Rng>(
    packet: &mut Packet,
    medium: &Medium,
    config: &TransportConfig,
    rng: &mut R,
) -> TransportResult<()> {
    let t_exp = medium.time_explosion;
    let old_doppler = doppler_factor(packet.r, packet.mu, t_exp);
    packet.mu = random_mu(rng);
    let inverse_new_doppler = inverse_doppler_factor(packet.r, packet.mu, t_exp);
    packet.energy = packet.energy * old_doppler * inverse_new_doppler;
    packet.last_interaction_type = Some(EventKind::Line);

    let in_line = packet.next_line_id;
    let emission_line_id = if config.line_interaction_type.uses_macro_atom() {
        let level = *medium.line_to_upper_level.get(in_line).ok_or_else(|| {
            TransportError::InvalidMedium(format!("line {in_line} has no macro-atom upper level"))
        })?;
        macro_atom(level, packet.shell, &medium.macro_atom, rng, config.max_macro_atom_steps)?
    } else {
        in_line
    };
    line_emission(packet, emission_line_id, inverse_new_doppler, medium);
    Ok(())
}

/// Emit the packet at the rest frequency of `emission_line_id`
pub fn line_emission(packet: &mut Packet, emission_line_id: usize, inverse_doppler: f64, medium: &Medium) {
    packet.last_line_interaction_out_id = Some(emission_line_id);
    packet.nu = medium.line_list_nu[emission_line_id] * inverse_doppler;
    packet.next_line_id = emission_line_id + 1;
}
