//! Topology construction core module.
//!
//! This module builds the layout and the link table of a mote network before
//! a simulation run. It integrates:
//! - Mote registry and the undirected link store
//! - Pister-hack signal strength estimation
//! - RSSI to PDR calibration
//! - Constrained random placement around a pinned root
//!
//! ## Module Organization
//!
//! - `types`: Core data structures (motes, links, registry)
//! - `geometry`: Distances and deployment square helpers
//! - `signal_calculations`: Free-space loss and the Pister-hack RSSI model
//! - `rssi_pdr_table`: Calibration table mapping RSSI to delivery ratio
//! - `placement`: Placement loop with bounded retries
//! - `topology`: Assembler tying placement, persistence and PDR filling together
//!
//! ## Public API
//!
//! The main entry point is `topology::build_topology`, which lays out every
//! mote of a registry and fills its link table in place.

pub mod geometry;
pub mod placement;
pub mod rssi_pdr_table;
pub mod signal_calculations;
pub mod topology;
pub mod types;

pub use topology::{TopologySummary, build_topology, rng_from_settings};
pub use types::{LinkKey, LinkState, LinkTable, Mote, MoteId, MoteRegistry, MoteRole, Point, RadioParameters};
