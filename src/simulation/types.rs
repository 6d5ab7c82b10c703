//! Type definitions for the topology layer.
//!
//! Contains the data structures shared across placement, propagation and
//! persistence:
//! - Mote identity, role and radio parameters
//! - The mote registry consumed and mutated by a topology build
//! - The undirected link store holding RSSI and PDR per mote pair

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, TopologyError};

/// Default transmit power of a mote (dBm).
pub const DEFAULT_TX_POWER_DBM: f64 = 0.0;
/// Default antenna gain of a mote (dBi).
pub const DEFAULT_ANTENNA_GAIN_DBI: f64 = 0.0;

/// Unique identifier of a mote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MoteId(pub u32);

impl fmt::Display for MoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Role of a mote in the topology. Exactly one root per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoteRole {
    Root,
    Ordinary,
}

impl fmt::Display for MoteRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoteRole::Root => write!(f, "root"),
            MoteRole::Ordinary => write!(f, "ordinary"),
        }
    }
}

/// Simple 2D point in grid units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Fixed per-mote radio parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadioParameters {
    /// Transmit power at the antenna port (dBm).
    pub tx_power_dbm: f64,
    /// Antenna gain (dBi).
    pub antenna_gain_dbi: f64,
}

impl Default for RadioParameters {
    fn default() -> Self {
        Self {
            tx_power_dbm: DEFAULT_TX_POWER_DBM,
            antenna_gain_dbi: DEFAULT_ANTENNA_GAIN_DBI,
        }
    }
}

/// A mote as seen by the topology layer.
///
/// Only `position` is written by a build; identity, role and radio are read.
#[derive(Debug, Clone)]
pub struct Mote {
    pub id: MoteId,
    pub role: MoteRole,
    pub position: Option<Point>,
    pub radio: RadioParameters,
}

impl Mote {
    pub fn new(id: MoteId, role: MoteRole) -> Self {
        Self {
            id,
            role,
            position: None,
            radio: RadioParameters::default(),
        }
    }

    pub fn with_radio(mut self, radio: RadioParameters) -> Self {
        self.radio = radio;
        self
    }

    pub fn is_root(&self) -> bool {
        self.role == MoteRole::Root
    }
}

/// Unordered mote pair. The smaller id is always stored first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkKey(MoteId, MoteId);

impl LinkKey {
    pub fn new(a: MoteId, b: MoteId) -> Self {
        if a <= b { LinkKey(a, b) } else { LinkKey(b, a) }
    }

    pub fn low(&self) -> MoteId {
        self.0
    }

    pub fn high(&self) -> MoteId {
        self.1
    }

    /// The endpoint opposite to `id`, if `id` is part of this link.
    pub fn other(&self, id: MoteId) -> Option<MoteId> {
        if self.0 == id {
            Some(self.1)
        } else if self.1 == id {
            Some(self.0)
        } else {
            None
        }
    }
}

/// Link metrics shared by both directions of a mote pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkState {
    /// Received signal strength (dBm).
    pub rssi: f64,
    /// Packet delivery ratio in [0, 1]. `None` until the assembler fills it.
    pub pdr: Option<f64>,
}

/// Single authoritative store of undirected links.
///
/// One random draw per pair is stored and reported for both directions.
#[derive(Debug, Clone, Default)]
pub struct LinkTable {
    links: HashMap<LinkKey, LinkState>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn clear(&mut self) {
        self.links.clear();
    }

    pub fn get(&self, a: MoteId, b: MoteId) -> Option<&LinkState> {
        self.links.get(&LinkKey::new(a, b))
    }

    pub fn contains(&self, a: MoteId, b: MoteId) -> bool {
        self.links.contains_key(&LinkKey::new(a, b))
    }

    pub fn rssi(&self, a: MoteId, b: MoteId) -> Option<f64> {
        self.get(a, b).map(|l| l.rssi)
    }

    pub fn pdr(&self, a: MoteId, b: MoteId) -> Option<f64> {
        self.get(a, b).and_then(|l| l.pdr)
    }

    /// Store a fresh RSSI sample; any previously derived PDR is invalidated.
    pub fn set_rssi(&mut self, a: MoteId, b: MoteId, rssi: f64) {
        self.links.insert(LinkKey::new(a, b), LinkState { rssi, pdr: None });
    }

    /// Set the PDR of an existing link. Returns false if the link is unknown.
    pub fn set_pdr(&mut self, a: MoteId, b: MoteId, pdr: f64) -> bool {
        match self.links.get_mut(&LinkKey::new(a, b)) {
            Some(link) => {
                link.pdr = Some(pdr);
                true
            }
            None => false,
        }
    }

    pub fn insert(&mut self, a: MoteId, b: MoteId, state: LinkState) {
        self.links.insert(LinkKey::new(a, b), state);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LinkKey, &LinkState)> {
        self.links.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (&LinkKey, &mut LinkState)> {
        self.links.iter_mut()
    }

    /// Motes reachable from `id` with a non-zero delivery ratio, sorted by id.
    pub fn neighbors(&self, id: MoteId) -> Vec<MoteId> {
        let mut out: Vec<MoteId> = self
            .links
            .iter()
            .filter(|(_, state)| state.pdr.is_some_and(|pdr| pdr > 0.0))
            .filter_map(|(key, _)| key.other(id))
            .collect();
        out.sort();
        out
    }

    /// Motes linked to `id` with an RSSI at or above `threshold`, sorted by id.
    pub fn stable_neighbors(&self, id: MoteId, threshold: f64) -> Vec<MoteId> {
        let mut out: Vec<MoteId> = self
            .links
            .iter()
            .filter(|(_, state)| state.rssi >= threshold)
            .filter_map(|(key, _)| key.other(id))
            .collect();
        out.sort();
        out
    }
}

/// Ordered collection of motes plus their link table.
#[derive(Debug, Clone, Default)]
pub struct MoteRegistry {
    motes: Vec<Mote>,
    index: HashMap<MoteId, usize>,
    links: LinkTable,
}

impl MoteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry of `count` motes with ids `0..count`, mote 0 as root.
    pub fn with_motes(count: u32, radio: RadioParameters) -> Self {
        let mut registry = Self::new();
        for i in 0..count {
            let role = if i == 0 { MoteRole::Root } else { MoteRole::Ordinary };
            // ids are unique by construction
            let _ = registry.push(Mote::new(MoteId(i), role).with_radio(radio));
        }
        registry
    }

    /// Register a mote. Duplicate ids are rejected.
    pub fn push(&mut self, mote: Mote) -> Result<()> {
        if self.index.contains_key(&mote.id) {
            return Err(TopologyError::InvalidSettings(format!("duplicate mote id {}", mote.id)));
        }
        self.index.insert(mote.id, self.motes.len());
        self.motes.push(mote);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.motes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.motes.is_empty()
    }

    pub fn motes(&self) -> &[Mote] {
        &self.motes
    }

    pub fn get(&self, id: MoteId) -> Option<&Mote> {
        self.index.get(&id).map(|&i| &self.motes[i])
    }

    pub fn get_mut(&mut self, id: MoteId) -> Option<&mut Mote> {
        match self.index.get(&id) {
            Some(&i) => Some(&mut self.motes[i]),
            None => None,
        }
    }

    /// The single root mote.
    pub fn root(&self) -> Result<&Mote> {
        let roots: Vec<&Mote> = self.motes.iter().filter(|m| m.is_root()).collect();
        match roots.as_slice() {
            [] => Err(TopologyError::MissingRoot),
            [root] => Ok(*root),
            many => Err(TopologyError::MultipleRoots(many.iter().map(|m| m.id).collect())),
        }
    }

    pub fn position(&self, id: MoteId) -> Option<Point> {
        self.get(id).and_then(|m| m.position)
    }

    pub fn set_position(&mut self, id: MoteId, position: Point) -> Result<()> {
        let mote = self.get_mut(id).ok_or(TopologyError::UnknownMote(id))?;
        mote.position = Some(position);
        Ok(())
    }

    /// Mote ids in processing order: the root first, then the remaining motes
    /// in registration order.
    pub fn processing_order(&self) -> Result<Vec<MoteId>> {
        let root = self.root()?.id;
        let mut order = Vec::with_capacity(self.motes.len());
        order.push(root);
        order.extend(self.motes.iter().filter(|m| m.id != root).map(|m| m.id));
        Ok(order)
    }

    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    pub fn links_mut(&mut self) -> &mut LinkTable {
        &mut self.links
    }

    /// Discard all positions and links ahead of a rebuild.
    pub fn clear_layout(&mut self) {
        for mote in &mut self.motes {
            mote.position = None;
        }
        self.links.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_key_is_unordered() {
        assert_eq!(LinkKey::new(MoteId(3), MoteId(1)), LinkKey::new(MoteId(1), MoteId(3)));
        let key = LinkKey::new(MoteId(7), MoteId(2));
        assert_eq!(key.low(), MoteId(2));
        assert_eq!(key.high(), MoteId(7));
        assert_eq!(key.other(MoteId(2)), Some(MoteId(7)));
        assert_eq!(key.other(MoteId(5)), None);
    }

    #[test]
    fn link_table_reports_same_value_for_both_directions() {
        let mut links = LinkTable::new();
        links.set_rssi(MoteId(1), MoteId(2), -80.5);
        assert_eq!(links.rssi(MoteId(2), MoteId(1)), Some(-80.5));
        assert_eq!(links.pdr(MoteId(1), MoteId(2)), None);

        assert!(links.set_pdr(MoteId(2), MoteId(1), 0.75));
        assert_eq!(links.pdr(MoteId(1), MoteId(2)), Some(0.75));
        assert!(!links.set_pdr(MoteId(1), MoteId(9), 0.5));

        // a new RSSI sample overwrites the previous attempt
        links.set_rssi(MoteId(1), MoteId(2), -90.0);
        assert_eq!(links.rssi(MoteId(1), MoteId(2)), Some(-90.0));
        assert_eq!(links.pdr(MoteId(1), MoteId(2)), None);
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn neighbor_queries() {
        let mut links = LinkTable::new();
        links.insert(MoteId(0), MoteId(1), LinkState { rssi: -80.0, pdr: Some(0.99) });
        links.insert(MoteId(0), MoteId(2), LinkState { rssi: -99.0, pdr: Some(0.0) });
        links.insert(MoteId(3), MoteId(0), LinkState { rssi: -93.0, pdr: Some(0.63) });
        links.insert(MoteId(1), MoteId(2), LinkState { rssi: -70.0, pdr: Some(1.0) });

        assert_eq!(links.neighbors(MoteId(0)), vec![MoteId(1), MoteId(3)]);
        assert_eq!(links.stable_neighbors(MoteId(0), -93.6), vec![MoteId(1), MoteId(3)]);
        assert_eq!(links.stable_neighbors(MoteId(0), -85.0), vec![MoteId(1)]);
        assert_eq!(links.stable_neighbors(MoteId(2), -70.0), vec![MoteId(1)]);
    }

    #[test]
    fn registry_root_checks() {
        let mut registry = MoteRegistry::new();
        assert!(matches!(registry.root(), Err(TopologyError::MissingRoot)));

        registry.push(Mote::new(MoteId(4), MoteRole::Ordinary)).unwrap();
        registry.push(Mote::new(MoteId(9), MoteRole::Root)).unwrap();
        registry.push(Mote::new(MoteId(1), MoteRole::Ordinary)).unwrap();
        assert_eq!(registry.root().unwrap().id, MoteId(9));
        assert_eq!(registry.processing_order().unwrap(), vec![MoteId(9), MoteId(4), MoteId(1)]);

        registry.push(Mote::new(MoteId(2), MoteRole::Root)).unwrap();
        match registry.root() {
            Err(TopologyError::MultipleRoots(ids)) => assert_eq!(ids, vec![MoteId(9), MoteId(2)]),
            other => panic!("unexpected {:?}", other.map(|m| m.id)),
        }
    }

    #[test]
    fn radio_parameters_carry_power_and_gain() {
        let radio = RadioParameters::default();
        assert_eq!(radio.tx_power_dbm, DEFAULT_TX_POWER_DBM);
        assert_eq!(radio.antenna_gain_dbi, DEFAULT_ANTENNA_GAIN_DBI);
        let value = serde_json::to_value(radio).unwrap();
        assert_eq!(value, serde_json::json!({"tx_power_dbm": 0.0, "antenna_gain_dbi": 0.0}));
    }

    #[test]
    fn registry_rejects_duplicate_ids() {
        let mut registry = MoteRegistry::with_motes(3, RadioParameters::default());
        assert!(registry.push(Mote::new(MoteId(1), MoteRole::Ordinary)).is_err());
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn clear_layout_discards_positions_and_links() {
        let mut registry = MoteRegistry::with_motes(2, RadioParameters::default());
        registry.set_position(MoteId(1), Point::new(0.5, 0.5)).unwrap();
        registry.links_mut().set_rssi(MoteId(0), MoteId(1), -60.0);
        registry.clear_layout();
        assert!(registry.position(MoteId(1)).is_none());
        assert!(registry.links().is_empty());
        assert!(matches!(registry.set_position(MoteId(5), Point::new(0.0, 0.0)), Err(TopologyError::UnknownMote(MoteId(5)))));
    }
}
