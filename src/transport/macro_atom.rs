//! Macro-atom cascade resolution
//!
//! An activated level repeatedly samples one of its transitions until a
//! radiative one is drawn; the line bound to that transition is where the
//! packet is re-emitted.

use rand::Rng;

use crate::error::{TransportError, TransportResult};
use crate::medium::{MacroAtomTable, Transition};

/// Result of one cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cascade {
    /// Line the packet is emitted in
    pub line_id: usize,
    /// Internal jumps taken before emission
    pub jumps: u32,
}

/// Run a cascade from `activate_level` in `shell` and return the emitted line
pub fn macro_atom<R: Rng>(
    activate_level: usize,
    shell: usize,
    table: &MacroAtomTable,
    rng: &mut R,
    max_steps: u32,
) -> TransportResult<usize> {
    macro_atom_cascade(activate_level, shell, table, rng, max_steps).map(|c| c.line_id)
}

/// Run a cascade and report how many internal jumps it took
///
/// Each step consumes exactly one uniform draw. A segment whose cumulative
/// probability never exceeds the draw, or a cascade longer than `max_steps`,
/// means the table is broken and is reported as such.
pub fn macro_atom_cascade<R: Rng>(
    activate_level: usize,
    shell: usize,
    table: &MacroAtomTable,
    rng: &mut R,
    max_steps: u32,
) -> TransportResult<Cascade> {
    let mut level = activate_level;

    for jumps in 0..max_steps {
        let segment = table
            .segment(level)
            .ok_or(TransportError::MalformedMacroAtom { level, shell })?;
        let draw: f64 = rng.random();
        let mut total = 0.0;
        let mut chosen = None;
        for i in segment {
            total += table
                .probability(shell, i)
                .ok_or(TransportError::MalformedMacroAtom { level, shell })?;
            if total > draw {
                chosen = Some(i);
                break;
            }
        }

        let Some(i) = chosen else {
            return Err(TransportError::MacroAtomExhausted {
                level,
                shell,
                total,
                draw,
            });
        };

        match table.transition(i) {
            Some(Transition::Emit(line_id)) => {
                log::trace!(
                    "macro-atom: level {activate_level} -> line {line_id} after {jumps} jumps (shell {shell})"
                );
                return Ok(Cascade { line_id, jumps });
            }
            Some(Transition::Jump(target)) => level = target,
            None => return Err(TransportError::MalformedMacroAtom { level, shell }),
        }
    }

    log::debug!("macro-atom cascade from level {activate_level} hit the {max_steps} step guard");
    Err(TransportError::MacroAtomStepLimit {
        level: activate_level,
        shell,
        steps: max_steps,
    })
}
