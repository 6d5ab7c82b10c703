//! Placement engine.
//!
//! Motes are placed one at a time in processing order (root first). Each
//! non-root mote draws candidate positions until it hears enough of the motes
//! placed before it:
//! 1) take a candidate from the `PositionSource`
//! 2) sample the RSSI to every accepted mote and store it in the link table
//! 3) accept once `min(K, |accepted|)` of those links reach the stable RSSI
//! 4) otherwise retry; links of the rejected attempt are overwritten
//!
//! Random sources retry within a bounded budget. Recorded sources replay a
//! stored layout and never retry.

use rand::Rng;
use std::collections::HashMap;

use super::geometry::{distance2, point_in_square, random_point_in_square, square_center};
use super::signal_calculations::PropagationModel;
use super::types::{MoteId, MoteRegistry, Point};
use crate::common::config::TopologySettings;
use crate::error::{Result, TopologyError};

/// Warn once a mote has used this share of its attempt budget.
const ATTEMPT_BUDGET_WARNING_THRESHOLD: f64 = 0.8;

/// Supplier of candidate positions for the placement engine.
pub trait PositionSource {
    /// Candidate position for `mote` inside `[0, side] × [0, side]`.
    fn next_position<R: Rng + ?Sized>(&mut self, mote: MoteId, side: f64, rng: &mut R) -> Result<Point>;

    /// Whether rejected candidates may be replaced by new ones.
    fn retry_allowed(&self) -> bool;

    /// Called once with the pinned root position before placement starts.
    fn claim_root(&mut self, _root: MoteId, _center: Point) {}
}

/// Uniformly random candidates (generation mode).
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPositions;

impl PositionSource for RandomPositions {
    fn next_position<R: Rng + ?Sized>(&mut self, _mote: MoteId, side: f64, rng: &mut R) -> Result<Point> {
        Ok(random_point_in_square(side, rng))
    }

    fn retry_allowed(&self) -> bool {
        true
    }
}

/// Positions recorded by an earlier build (replay mode). Each record is
/// claimed exactly once.
#[derive(Debug, Default, Clone)]
pub struct RecordedPositions {
    positions: HashMap<MoteId, Point>,
}

impl RecordedPositions {
    pub fn new(positions: impl IntoIterator<Item = (MoteId, Point)>) -> Self {
        Self {
            positions: positions.into_iter().collect(),
        }
    }

    /// Records not yet claimed by a mote.
    pub fn remaining(&self) -> usize {
        self.positions.len()
    }
}

impl PositionSource for RecordedPositions {
    fn next_position<R: Rng + ?Sized>(&mut self, mote: MoteId, _side: f64, _rng: &mut R) -> Result<Point> {
        self.positions.remove(&mote).ok_or(TopologyError::UnknownMote(mote))
    }

    fn retry_allowed(&self) -> bool {
        false
    }

    fn claim_root(&mut self, root: MoteId, center: Point) {
        if let Some(recorded) = self.positions.remove(&root) {
            if recorded != center {
                log::warn!(
                    "Recorded root {} position ({}, {}) differs from the square center ({}, {}); keeping the center",
                    root,
                    recorded.x,
                    recorded.y,
                    center.x,
                    center.y
                );
            }
        }
    }
}

/// Outcome of placing a single mote.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotePlacement {
    pub mote: MoteId,
    /// Candidates drawn, including the accepted one. Zero for the root.
    pub attempts: u32,
    /// Stable neighbors among previously accepted motes at acceptance.
    pub stable_neighbors: usize,
    /// Stable neighbors that were required at acceptance.
    pub required: usize,
}

/// Per-mote placement outcomes in processing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlacementReport {
    pub placements: Vec<MotePlacement>,
}

impl PlacementReport {
    pub fn total_attempts(&self) -> u64 {
        self.placements.iter().map(|p| p.attempts as u64).sum()
    }

    /// Motes accepted with fewer stable neighbors than required (replay only).
    pub fn under_connected(&self) -> Vec<MoteId> {
        self.placements.iter().filter(|p| p.stable_neighbors < p.required).map(|p| p.mote).collect()
    }
}

/// Place every mote of `registry`.
///
/// # Parameters
///
/// * `registry` - motes to place; positions and links are written
/// * `settings` - square side, K, T and the attempt budget
/// * `model` - propagation model used to sample RSSI
/// * `source` - candidate positions
/// * `rng` - random source for candidates and RSSI samples
///
/// # Returns
///
/// A report of attempts and stable-neighbor counts, `MissingRoot` /
/// `MultipleRoots` if the root precondition fails, `OutOfBounds` for a candidate
/// outside the square, or `Infeasible` once a mote exhausts its budget.
pub fn place_motes<S: PositionSource, R: Rng + ?Sized>(
    registry: &mut MoteRegistry,
    settings: &TopologySettings,
    model: &PropagationModel,
    source: &mut S,
    rng: &mut R,
) -> Result<PlacementReport> {
    let order = registry.processing_order()?;
    let side = settings.square_side;
    let root = order[0];
    let center = square_center(side);
    registry.set_position(root, center)?;
    source.claim_root(root, center);

    let mut report = PlacementReport::default();
    report.placements.push(MotePlacement {
        mote: root,
        attempts: 0,
        stable_neighbors: 0,
        required: 0,
    });

    let warn_after = (settings.max_placement_attempts as f64 * ATTEMPT_BUDGET_WARNING_THRESHOLD) as u32;
    let mut accepted: Vec<MoteId> = vec![root];

    for &mote in &order[1..] {
        let required = (settings.stable_neighbors as usize).min(accepted.len());
        let mut attempts: u32 = 0;
        loop {
            let candidate = source.next_position(mote, side, rng)?;
            attempts += 1;
            if !point_in_square(&candidate, side) {
                return Err(TopologyError::OutOfBounds {
                    mote,
                    x: candidate.x,
                    y: candidate.y,
                    side,
                });
            }
            let coincident = accepted
                .iter()
                .copied()
                .find(|&other| registry.position(other).is_some_and(|p| distance2(&p, &candidate) == 0.0));
            if let Some(other) = coincident {
                if !source.retry_allowed() {
                    return Err(TopologyError::CoincidentMotes { mote, other });
                }
                log::trace!("Candidate ({:.5}, {:.5}) for mote {} coincides with mote {}", candidate.x, candidate.y, mote, other);
            }
            registry.set_position(mote, candidate)?;

            // a shared position has no finite RSSI, so the candidate is never sampled
            let stable = match coincident {
                Some(_) => None,
                None => Some(sample_links(registry, model, mote, &accepted, settings.stable_rssi, !source.retry_allowed(), rng)?),
            };

            if let Some(stable) = stable.filter(|&stable| stable >= required || !source.retry_allowed()) {
                if stable < required {
                    log::warn!("Replayed mote {} has {} stable neighbors, {} required", mote, stable, required);
                }
                log::debug!(
                    "Placed mote {} at ({:.5}, {:.5}) after {} attempt(s), {} stable neighbor(s)",
                    mote,
                    candidate.x,
                    candidate.y,
                    attempts,
                    stable
                );
                report.placements.push(MotePlacement {
                    mote,
                    attempts,
                    stable_neighbors: stable,
                    required,
                });
                break;
            }

            if let Some(stable) = stable {
                log::trace!("Rejected candidate ({:.5}, {:.5}) for mote {}: {}/{} stable", candidate.x, candidate.y, mote, stable, required);
            }
            if attempts == warn_after {
                log::warn!(
                    "Mote {} used {} of {} placement attempts; the square may be too sparse for {} stable neighbors",
                    mote,
                    attempts,
                    settings.max_placement_attempts,
                    settings.stable_neighbors
                );
            }
            if attempts >= settings.max_placement_attempts {
                if let Some(m) = registry.get_mut(mote) {
                    m.position = None;
                }
                return Err(TopologyError::Infeasible { mote, attempts });
            }
        }
        accepted.push(mote);
    }

    log::info!("Placed {} motes using {} candidate positions", report.placements.len(), report.total_attempts());
    Ok(report)
}

/// Sample RSSI from `mote` to every accepted mote, store it reciprocally and
/// return the number of links at or above `stable_rssi`.
///
/// With `keep_existing` set, links already present in the table are reused
/// instead of being sampled again.
fn sample_links<R: Rng + ?Sized>(
    registry: &mut MoteRegistry,
    model: &PropagationModel,
    mote: MoteId,
    accepted: &[MoteId],
    stable_rssi: f64,
    keep_existing: bool,
    rng: &mut R,
) -> Result<usize> {
    let candidate = registry.get(mote).cloned().ok_or(TopologyError::UnknownMote(mote))?;
    let mut stable = 0;
    for &other_id in accepted {
        let existing = if keep_existing { registry.links().rssi(mote, other_id) } else { None };
        let rssi = match existing {
            Some(rssi) => rssi,
            None => {
                let other = registry.get(other_id).ok_or(TopologyError::UnknownMote(other_id))?;
                let rssi = model.estimate_signal_strength(&candidate, other, rng).ok_or(TopologyError::UnknownMote(other_id))?;
                registry.links_mut().set_rssi(mote, other_id, rssi);
                rssi
            }
        };
        if rssi >= stable_rssi {
            stable += 1;
        }
    }
    Ok(stable)
}
