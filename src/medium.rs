//! Read-only medium tables shared by every packet
//!
//! A medium is a stack of contiguous spherical shells expanding homologously,
//! a global line list sorted by descending frequency, per-line Sobolev depths
//! and the macro-atom transition tables. It is built once per run and only
//! ever borrowed immutably during transport.

use std::fs::File;
use std::io::BufReader;
use std::ops::Range;
use std::path::Path;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::config::TransportConfig;
use crate::consts::EMISSION_TRANSITION;
use crate::error::{TransportError, TransportResult};

/// Tolerance on the per-level probability sum
const PROBABILITY_SUM_TOLERANCE: f64 = 1e-6;

/// Flattened macro-atom transition tables
///
/// Transitions of one level occupy a contiguous segment starting at
/// `unroll_reference[level]` and ending at the next level's offset (or at
/// `n_transitions` for the last level). Probabilities are stored shell-major:
/// `transition_probabilities[shell * n_transitions + i]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MacroAtomTable {
    pub n_transitions: usize,
    pub transition_probabilities: Vec<f64>,
    /// Transition type per transition (`-1` = emission)
    pub transition_type: Vec<i64>,
    /// Level activated by an internal transition
    pub target_level_id: Vec<usize>,
    /// Line emitted by an emission transition
    pub target_line_id: Vec<usize>,
    /// Start offset of each level's segment
    pub unroll_reference: Vec<usize>,
}

impl MacroAtomTable {
    pub fn n_levels(&self) -> usize {
        self.unroll_reference.len()
    }

    /// Index range of the transitions belonging to `level`
    ///
    /// `None` when the level is unknown or its segment runs past the table.
    pub fn segment(&self, level: usize) -> Option<Range<usize>> {
        let start = *self.unroll_reference.get(level)?;
        let end = self
            .unroll_reference
            .get(level + 1)
            .copied()
            .unwrap_or(self.n_transitions);
        (start <= end && end <= self.n_transitions).then_some(start..end)
    }

    /// Probability of transition `i` in `shell`
    #[inline]
    pub fn probability(&self, shell: usize, i: usize) -> Option<f64> {
        if i >= self.n_transitions {
            return None;
        }
        self.transition_probabilities
            .get(shell * self.n_transitions + i)
            .copied()
    }

    #[inline]
    pub fn is_emission(&self, i: usize) -> bool {
        self.transition_type.get(i) == Some(&EMISSION_TRANSITION)
    }

    /// What transition `i` does when chosen
    pub fn transition(&self, i: usize) -> Option<Transition> {
        if self.is_emission(i) {
            self.target_line_id.get(i).copied().map(Transition::Emit)
        } else {
            self.target_level_id.get(i).copied().map(Transition::Jump)
        }
    }

    /// Check shapes, references and row-stochastic normalisation
    pub fn validate(&self, n_shells: usize, n_lines: usize) -> TransportResult<()> {
        let n = self.n_transitions;
        for (name, len) in [
            ("transition_type", self.transition_type.len()),
            ("target_level_id", self.target_level_id.len()),
            ("target_line_id", self.target_line_id.len()),
        ] {
            if len != n {
                return Err(invalid(format!("{name} has {len} entries, expected {n}")));
            }
        }
        if self.transition_probabilities.len() != n * n_shells {
            return Err(invalid(format!(
                "transition_probabilities has {} entries, expected {} ({} shells x {} transitions)",
                self.transition_probabilities.len(),
                n * n_shells,
                n_shells,
                n
            )));
        }
        if self.unroll_reference.first().is_some_and(|&first| first != 0) {
            return Err(invalid("unroll_reference must start at 0".into()));
        }
        if self.unroll_reference.windows(2).any(|w| w[0] > w[1])
            || self.unroll_reference.last().is_some_and(|&last| last > n)
        {
            return Err(invalid("unroll_reference must be non-decreasing and within the table".into()));
        }

        let n_levels = self.n_levels();
        for i in 0..n {
            if self.is_emission(i) {
                if self.target_line_id[i] >= n_lines {
                    return Err(invalid(format!(
                        "transition {i} emits line {} of {n_lines}",
                        self.target_line_id[i]
                    )));
                }
            } else if self.target_level_id[i] >= n_levels {
                return Err(invalid(format!(
                    "transition {i} targets level {} of {n_levels}",
                    self.target_level_id[i]
                )));
            }
        }

        for level in 0..n_levels {
            let Some(segment) = self.segment(level) else {
                return Err(invalid(format!("level {level} has a segment outside the table")));
            };
            if segment.is_empty() {
                continue;
            }
            for shell in 0..n_shells {
                let mut total = 0.0;
                for i in segment.clone() {
                    // Shapes were checked above
                    let p = self.probability(shell, i).unwrap_or(f64::NAN);
                    if !(p >= 0.0 && p.is_finite()) {
                        return Err(invalid(format!(
                            "negative or non-finite probability {p} at level {level}, shell {shell}"
                        )));
                    }
                    total += p;
                }
                if (total - 1.0).abs() > PROBABILITY_SUM_TOLERANCE {
                    return Err(invalid(format!(
                        "probabilities of level {level} in shell {shell} sum to {total}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Outcome of a chosen macro-atom transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Emit a packet in this line
    Emit(usize),
    /// Activate this level
    Jump(usize),
}

/// Shell-stratified, homologously expanding medium
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medium {
    /// Inner radius per shell (cm), strictly increasing
    pub r_inner: Vec<f64>,
    /// Outer radius per shell (cm)
    pub r_outer: Vec<f64>,
    /// Electron number density per shell (cm^-3)
    pub electron_densities: Vec<f64>,
    /// Time since explosion (s)
    pub time_explosion: f64,
    /// Line rest frequencies (Hz), strictly descending
    pub line_list_nu: Vec<f64>,
    /// Sobolev optical depth, `[line * n_shells + shell]`
    pub tau_sobolev: Vec<f64>,
    /// Upper macro-atom level of each line
    #[serde(default)]
    pub line_to_upper_level: Vec<usize>,
    #[serde(default)]
    pub macro_atom: MacroAtomTable,
}

impl Medium {
    #[inline]
    pub fn n_shells(&self) -> usize {
        self.r_inner.len()
    }

    #[inline]
    pub fn n_lines(&self) -> usize {
        self.line_list_nu.len()
    }

    #[inline]
    pub fn tau_sobolev(&self, line: usize, shell: usize) -> f64 {
        self.tau_sobolev[line * self.n_shells() + shell]
    }

    /// Innermost radius (photosphere)
    pub fn photosphere(&self) -> f64 {
        self.r_inner[0]
    }

    /// Load and validate a medium from JSON
    pub fn load(path: &Path) -> TransportResult<Self> {
        let reader = BufReader::new(File::open(path)?);
        let medium: Self = serde_json::from_reader(reader)?;
        medium.validate()?;
        log::info!(
            "Loaded medium from {}: {} shells, {} lines, {} macro-atom levels",
            path.display(),
            medium.n_shells(),
            medium.n_lines(),
            medium.macro_atom.n_levels()
        );
        Ok(medium)
    }

    /// Check every structural invariant transport relies on
    pub fn validate(&self) -> TransportResult<()> {
        let n_shells = self.n_shells();
        if n_shells == 0 {
            return Err(invalid("medium has no shells".into()));
        }
        if self.r_outer.len() != n_shells || self.electron_densities.len() != n_shells {
            return Err(invalid("per-shell arrays differ in length".into()));
        }
        if !(self.time_explosion > 0.0 && self.time_explosion.is_finite()) {
            return Err(invalid(format!("time_explosion must be positive, got {}", self.time_explosion)));
        }
        for shell in 0..n_shells {
            if !(self.r_inner[shell] > 0.0 && self.r_inner[shell] < self.r_outer[shell]) {
                return Err(invalid(format!(
                    "shell {shell} has radii [{}, {}]",
                    self.r_inner[shell], self.r_outer[shell]
                )));
            }
            if shell + 1 < n_shells {
                let gap = (self.r_inner[shell + 1] - self.r_outer[shell]).abs();
                if gap > 1e-12 * self.r_outer[shell] {
                    return Err(invalid(format!("shells {shell} and {} are not contiguous", shell + 1)));
                }
            }
            let n_e = self.electron_densities[shell];
            if !(n_e >= 0.0 && n_e.is_finite()) {
                return Err(invalid(format!("shell {shell} has electron density {n_e}")));
            }
        }

        if self.line_list_nu.iter().any(|&nu| !(nu > 0.0 && nu.is_finite())) {
            return Err(invalid("line frequencies must be positive".into()));
        }
        if self.line_list_nu.windows(2).any(|w| w[0] <= w[1]) {
            return Err(invalid("line list must be strictly descending".into()));
        }
        let n_lines = self.n_lines();
        if self.tau_sobolev.len() != n_lines * n_shells {
            return Err(invalid(format!(
                "tau_sobolev has {} entries, expected {}",
                self.tau_sobolev.len(),
                n_lines * n_shells
            )));
        }

        self.macro_atom.validate(n_shells, n_lines)?;
        let n_levels = self.macro_atom.n_levels();
        if n_levels > 0 {
            if self.line_to_upper_level.len() != n_lines {
                return Err(invalid("line_to_upper_level must map every line".into()));
            }
            if let Some(level) = self.line_to_upper_level.iter().find(|&&l| l >= n_levels) {
                return Err(invalid(format!("line upper level {level} of {n_levels}")));
            }
        }
        Ok(())
    }

    /// [`validate`](Self::validate) plus what `config` needs from the medium
    ///
    /// Macro-atom line interactions need every line mapped to an upper level
    /// of a non-empty macro-atom table.
    pub fn validate_for(&self, config: &TransportConfig) -> TransportResult<()> {
        self.validate()?;
        let needs_macro_atom = config.line_interactions_enabled()
            && config.line_interaction_type.uses_macro_atom()
            && self.n_lines() > 0;
        if needs_macro_atom
            && (self.macro_atom.n_levels() == 0 || self.line_to_upper_level.len() != self.n_lines())
        {
            return Err(invalid(format!(
                "{} line interactions need a macro-atom table and an upper level for each of the {} lines",
                config.line_interaction_type.as_str(),
                self.n_lines()
            )));
        }
        Ok(())
    }

    /// Build a small self-consistent medium for demos and tests
    ///
    /// Shells are equally spaced in velocity between `v_inner` and `v_outer`,
    /// lines are log-spaced over `nu_range`, and every line's upper level
    /// either emits in its own line or hands over to the next redder line.
    pub fn synthetic(params: &SyntheticMedium) -> Self {
        let mut rng = Pcg32::seed_from_u64(params.seed);
        let n_shells = params.n_shells.max(1);
        let n_lines = params.n_lines;
        let t = params.time_explosion;

        let dv = (params.v_outer - params.v_inner) / n_shells as f64;
        let r_inner: Vec<f64> = (0..n_shells).map(|i| (params.v_inner + dv * i as f64) * t).collect();
        let mut r_outer: Vec<f64> = r_inner.iter().skip(1).copied().collect();
        r_outer.push(params.v_outer * t);

        // n_e falls off as r^-3 from the photosphere
        let electron_densities = r_inner
            .iter()
            .map(|&r| params.electron_density * (r_inner[0] / r).powi(3))
            .collect();

        let (nu_lo, nu_hi) = params.nu_range;
        let line_list_nu: Vec<f64> = (0..n_lines)
            .map(|j| {
                let frac = (j as f64 + 0.5) / n_lines as f64;
                nu_hi * (nu_lo / nu_hi).powf(frac)
            })
            .collect();

        let tau_sobolev = (0..n_lines * n_shells)
            .map(|_| -params.tau_scale * (1.0 - rng.random::<f64>()).ln())
            .collect();

        // Level j is the upper level of line j
        let mut macro_atom = MacroAtomTable::default();
        for j in 0..n_lines {
            macro_atom.unroll_reference.push(macro_atom.transition_type.len());
            macro_atom.transition_type.push(EMISSION_TRANSITION);
            macro_atom.target_level_id.push(j);
            macro_atom.target_line_id.push(j);
            if j + 1 < n_lines {
                macro_atom.transition_type.push(0);
                macro_atom.target_level_id.push(j + 1);
                macro_atom.target_line_id.push(j);
            }
        }
        macro_atom.n_transitions = macro_atom.transition_type.len();
        for shell in 0..n_shells {
            let p_emit = 0.6 + 0.3 * shell as f64 / n_shells as f64;
            for j in 0..n_lines {
                if j + 1 < n_lines {
                    macro_atom.transition_probabilities.push(p_emit);
                    macro_atom.transition_probabilities.push(1.0 - p_emit);
                } else {
                    macro_atom.transition_probabilities.push(1.0);
                }
            }
        }

        Self {
            r_inner,
            r_outer,
            electron_densities,
            time_explosion: t,
            line_list_nu,
            tau_sobolev,
            line_to_upper_level: (0..n_lines).collect(),
            macro_atom,
        }
    }
}

/// Parameters for [`Medium::synthetic`]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticMedium {
    pub n_shells: usize,
    pub n_lines: usize,
    /// Inner velocity (cm/s)
    pub v_inner: f64,
    /// Outer velocity (cm/s)
    pub v_outer: f64,
    pub time_explosion: f64,
    /// Electron density at the photosphere (cm^-3)
    pub electron_density: f64,
    pub nu_range: (f64, f64),
    /// Mean Sobolev depth
    pub tau_scale: f64,
    pub seed: u64,
}

impl Default for SyntheticMedium {
    fn default() -> Self {
        Self {
            n_shells: 20,
            n_lines: 500,
            v_inner: 1.1e9,
            v_outer: 2.0e9,
            // 13 days
            time_explosion: 13.0 * 86400.0,
            electron_density: 1e9,
            nu_range: (2.5e14, 1.5e15),
            tau_scale: 0.5,
            seed: 1,
        }
    }
}

fn invalid(msg: String) -> TransportError {
    TransportError::InvalidMedium(msg)
}
