//! Topology construction for mote network simulations.
//!
//! Places motes in a square deployment area around a root, estimates link
//! quality with the Pister-hack model and maps RSSI to packet delivery ratio
//! through a calibration table. Layouts can be persisted and replayed.

pub mod common;
pub mod error;
pub mod simulation;

pub use common::config::{PersistenceMode, TopologyFileFormat, TopologySettings};
pub use common::summary::format_topology_report;
pub use error::{Result, TopologyError};
pub use simulation::{MoteId, MoteRegistry, MoteRole, TopologySummary, build_topology, rng_from_settings};
