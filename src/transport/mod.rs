//! Deterministic packet transport
//!
//! Everything a single packet goes through lives here. This module must stay
//! pure and deterministic:
//! - Read-only medium shared by every packet
//! - One seeded RNG stream per packet
//! - Estimator contributions buffered per packet until it finishes
//! - No threading or IO

pub mod continuum;
pub mod distance;
pub mod estimators;
pub mod event;
pub mod interaction;
pub mod macro_atom;
pub mod packet;
pub mod search;
pub mod step;

pub use continuum::{CombinedContinuum, Continuum, ElectronScattering};
pub use distance::{
    BoundaryDistance, ShellCrossing, distance_to_boundary, distance_to_electron, distance_to_inner,
    distance_to_line, distance_to_outer,
};
pub use estimators::{Estimators, PacketEstimators};
pub use event::{Candidate, Event, EventKind, select_event, trace_packet};
pub use interaction::{cross_shell_boundary, line_emission, line_scatter, move_packet, thomson_scatter};
pub use macro_atom::{Cascade, macro_atom, macro_atom_cascade};
pub use packet::{Packet, PacketStatus, RngState};
pub use search::{SortOrder, binary_search, line_search};
pub use step::{TrackedInteraction, single_packet_loop};
