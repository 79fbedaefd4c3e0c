//! Distances along a packet's ray to each candidate event
//!
//! All of these are pure. Geometric events that cannot happen on the current
//! ray return [`MISS_DISTANCE`].

use crate::consts::{C, CLOSE_LINE_THRESHOLD, MISS_DISTANCE};
use crate::doppler_factor;
use crate::error::{TransportError, TransportResult};

/// Which way a boundary crossing moves the packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellCrossing {
    /// Through the inner boundary, into shell - 1
    Inward,
    /// Through the outer boundary, into shell + 1
    Outward,
}

impl ShellCrossing {
    #[inline]
    pub fn delta(self) -> isize {
        match self {
            ShellCrossing::Inward => -1,
            ShellCrossing::Outward => 1,
        }
    }
}

/// Distance to the nearest shell boundary and the side it lies on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryDistance {
    pub distance: f64,
    pub crossing: ShellCrossing,
}

/// Distance to the outer sphere of radius `r_outer`
///
/// Requires `r <= r_outer`, which keeps the root real.
#[inline]
pub fn distance_to_outer(r: f64, mu: f64, r_outer: f64) -> f64 {
    (r_outer * r_outer + (mu * mu - 1.0) * r * r).sqrt() - r * mu
}

/// Distance to the inner sphere of radius `r_inner`
///
/// Only inward rays (`mu < 0`) whose impact parameter is below `r_inner`
/// can hit it.
#[inline]
pub fn distance_to_inner(r: f64, mu: f64, r_inner: f64) -> f64 {
    if mu >= 0.0 {
        return MISS_DISTANCE;
    }
    let discriminant = r_inner * r_inner + r * r * (mu * mu - 1.0);
    if discriminant < 0.0 {
        MISS_DISTANCE
    } else {
        -r * mu - discriminant.sqrt()
    }
}

/// Nearest boundary of the shell `[r_inner, r_outer]`
pub fn distance_to_boundary(r: f64, mu: f64, r_inner: f64, r_outer: f64) -> BoundaryDistance {
    let inner = distance_to_inner(r, mu, r_inner);
    if inner != MISS_DISTANCE {
        BoundaryDistance {
            distance: inner,
            crossing: ShellCrossing::Inward,
        }
    } else {
        BoundaryDistance {
            distance: distance_to_outer(r, mu, r_outer),
            crossing: ShellCrossing::Outward,
        }
    }
}

/// Distance until the packet redshifts into resonance with `nu_line`
///
/// The comoving frequency only decreases along a free flight, so a line
/// already redward of the packet is an error rather than a miss. Relative
/// differences below [`CLOSE_LINE_THRESHOLD`] count as exact resonance.
pub fn distance_to_line(
    r: f64,
    mu: f64,
    nu: f64,
    nu_line: f64,
    time_explosion: f64,
) -> TransportResult<f64> {
    let comov_nu = nu * doppler_factor(r, mu, time_explosion);
    let mut nu_diff = comov_nu - nu_line;
    if (nu_diff / nu).abs() < CLOSE_LINE_THRESHOLD {
        nu_diff = 0.0;
    }
    if nu_diff < 0.0 {
        return Err(TransportError::ComovingFrequencyBelowLine {
            comov_nu,
            nu_line,
            relative: nu_diff / nu_line,
            r,
            mu,
            nu,
        });
    }
    Ok(nu_diff / nu * C * time_explosion)
}

/// Distance to an electron-scattering event for a sampled optical depth
///
/// `electron_density` is the scattering coefficient along the ray; transport
/// passes `n_e * sigma_T`.
#[inline]
pub fn distance_to_electron(tau_event: f64, electron_density: f64) -> f64 {
    if electron_density <= 0.0 {
        MISS_DISTANCE
    } else {
        tau_event / electron_density
    }
}
