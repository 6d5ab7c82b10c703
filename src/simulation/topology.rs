//! Topology assembly.
//!
//! High-level flow of a build:
//! 1) Validate settings and the single-root precondition.
//! 2) Discard the previous layout and pick the position source: random for
//!    `generate`/`write`, the stored file for `read`.
//! 3) Run the placement engine.
//! 4) Derive the PDR of every link found during placement.
//! 5) Complete the dense pairwise matrix for pairs placement did not sample.
//! 6) Persist the result in `write` mode.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::placement::{PlacementReport, RandomPositions, RecordedPositions, place_motes};
use super::signal_calculations::PropagationModel;
use super::types::{LinkState, MoteId, MoteRegistry};
use crate::common::config::{PersistenceMode, TopologySettings};
use crate::common::topology_file::{read_topology, write_topology};
use crate::error::{Result, TopologyError};

/// Statistics of a completed build.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologySummary {
    pub motes: usize,
    pub links: usize,
    /// Links taken verbatim from a stored topology.
    pub restored_links: usize,
    /// Links sampled after placement to make the matrix dense.
    pub completed_links: usize,
    /// Fewest stable neighbors of any mote over the final link table.
    pub min_stable_neighbors: usize,
    pub mean_stable_neighbors: f64,
    pub placement: PlacementReport,
}

/// Build RNG for `settings`: seeded when a seed is configured, entropy otherwise.
pub fn rng_from_settings(settings: &TopologySettings) -> StdRng {
    match settings.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Build the topology of `registry` according to `settings`.
///
/// On success every mote is placed inside the square, the root sits at its
/// center and every pair of motes has an RSSI and a PDR.
pub fn build_topology<R: Rng + ?Sized>(registry: &mut MoteRegistry, settings: &TopologySettings, rng: &mut R) -> Result<TopologySummary> {
    settings.validate()?;
    let root = registry.root()?.id;
    log::info!(
        "Building topology: {} motes, root {}, square side {}, {} stable neighbors at >= {} dBm, mode {:?}",
        registry.len(),
        root,
        settings.square_side,
        settings.stable_neighbors,
        settings.stable_rssi,
        settings.persistence
    );

    let model = PropagationModel::new(settings.propagation.clone(), settings.calibration_table());
    registry.clear_layout();

    let mut restored_links = 0;
    let placement = match settings.persistence {
        PersistenceMode::Generate | PersistenceMode::Write => place_motes(registry, settings, &model, &mut RandomPositions, rng)?,
        PersistenceMode::Read => {
            let path = topology_path(settings)?;
            let stored = read_topology(path, settings.file_format, registry)?;
            if let Some(side) = stored.square_side {
                if side != settings.square_side {
                    return Err(TopologyError::Deserialize {
                        record: 0,
                        reason: format!("topology was built in a square of side {}, settings use {}", side, settings.square_side),
                    });
                }
            }
            for (a, b, state) in stored.links {
                registry.links_mut().insert(a, b, state);
                restored_links += 1;
            }
            let mut source = RecordedPositions::new(stored.positions);
            let report = place_motes(registry, settings, &model, &mut source, rng)?;
            if source.remaining() > 0 {
                log::warn!("{} stored positions were not claimed by any mote", source.remaining());
            }
            report
        }
    };

    let filled = fill_delivery_ratios(registry, &model);
    let completed_links = complete_link_matrix(registry, &model, rng)?;
    log::debug!("Derived {} delivery ratios, sampled {} additional links", filled, completed_links);

    if settings.persistence == PersistenceMode::Write {
        write_topology(topology_path(settings)?, settings.file_format, registry, settings.square_side)?;
    }

    let summary = summarize(registry, settings, placement, restored_links, completed_links);
    log::info!(
        "Topology ready: {} motes, {} links, stable neighbors min {} mean {:.2}",
        summary.motes,
        summary.links,
        summary.min_stable_neighbors,
        summary.mean_stable_neighbors
    );
    Ok(summary)
}

fn topology_path(settings: &TopologySettings) -> Result<&std::path::Path> {
    settings
        .topology_file
        .as_deref()
        .ok_or_else(|| TopologyError::InvalidSettings("topology-file is required for read and write modes".to_string()))
}

/// Set the PDR of every link that has an RSSI but no PDR yet. Returns the
/// number of links updated.
pub fn fill_delivery_ratios(registry: &mut MoteRegistry, model: &PropagationModel) -> usize {
    let mut filled = 0;
    for (_, link) in registry.links_mut().iter_mut() {
        if link.pdr.is_none() {
            link.pdr = Some(model.estimate_delivery_ratio(link.rssi));
            filled += 1;
        }
    }
    filled
}

/// Sample RSSI and PDR for every pair of motes without a link. Returns the
/// number of links added.
pub fn complete_link_matrix<R: Rng + ?Sized>(registry: &mut MoteRegistry, model: &PropagationModel, rng: &mut R) -> Result<usize> {
    let order = registry.processing_order()?;
    let mut added = 0;
    for (i, &a) in order.iter().enumerate() {
        for &b in &order[i + 1..] {
            if registry.links().contains(a, b) {
                continue;
            }
            let rssi = sample_pair(registry, model, a, b, rng)?;
            let pdr = model.estimate_delivery_ratio(rssi);
            registry.links_mut().insert(a, b, LinkState { rssi, pdr: Some(pdr) });
            added += 1;
        }
    }
    Ok(added)
}

fn sample_pair<R: Rng + ?Sized>(registry: &MoteRegistry, model: &PropagationModel, a: MoteId, b: MoteId, rng: &mut R) -> Result<f64> {
    let ma = registry.get(a).ok_or(TopologyError::UnknownMote(a))?;
    let mb = registry.get(b).ok_or(TopologyError::UnknownMote(b))?;
    model.estimate_signal_strength(ma, mb, rng).ok_or(TopologyError::UnknownMote(if ma.position.is_none() { a } else { b }))
}

fn summarize(
    registry: &MoteRegistry,
    settings: &TopologySettings,
    placement: PlacementReport,
    restored_links: usize,
    completed_links: usize,
) -> TopologySummary {
    let counts: Vec<usize> = registry
        .motes()
        .iter()
        .map(|m| registry.links().stable_neighbors(m.id, settings.stable_rssi).len())
        .collect();
    let min_stable_neighbors = counts.iter().copied().min().unwrap_or(0);
    let mean_stable_neighbors = if counts.is_empty() {
        0.0
    } else {
        counts.iter().sum::<usize>() as f64 / counts.len() as f64
    };
    TopologySummary {
        motes: registry.len(),
        links: registry.links().len(),
        restored_links,
        completed_links,
        min_stable_neighbors,
        mean_stable_neighbors,
        placement,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::TopologyFileFormat;
    use crate::simulation::geometry::point_in_square;
    use crate::simulation::types::{Mote, MoteRole, Point, RadioParameters};

    fn settings(side: f64, k: u32) -> TopologySettings {
        TopologySettings {
            square_side: side,
            stable_neighbors: k,
            ..TopologySettings::default()
        }
    }

    fn assert_dense(registry: &MoteRegistry) {
        let n = registry.len();
        assert_eq!(registry.links().len(), n * (n - 1) / 2);
        for (_, link) in registry.links().iter() {
            let pdr = link.pdr.unwrap();
            assert!((0.0..=1.0).contains(&pdr));
            assert!(link.rssi.is_finite());
        }
    }

    #[test]
    fn generated_topology_is_dense_and_rooted() {
        let mut registry = MoteRegistry::with_motes(15, RadioParameters::default());
        let cfg = settings(0.8, 2);
        let mut rng = StdRng::seed_from_u64(31);
        let summary = build_topology(&mut registry, &cfg, &mut rng).unwrap();

        assert_eq!(registry.position(MoteId(0)), Some(Point::new(0.4, 0.4)));
        assert_eq!(registry.motes().iter().filter(|m| m.is_root()).count(), 1);
        for mote in registry.motes() {
            assert!(point_in_square(&mote.position.unwrap(), 0.8));
        }
        assert_dense(&registry);
        assert_eq!(summary.motes, 15);
        assert_eq!(summary.links, 105);
        assert_eq!(summary.restored_links, 0);
        // placement already samples every pair against earlier motes
        assert_eq!(summary.completed_links, 0);
        assert!(summary.min_stable_neighbors >= 1);
    }

    #[test]
    fn pdr_matches_rssi_through_the_table() {
        let mut registry = MoteRegistry::with_motes(6, RadioParameters::default());
        let cfg = settings(0.5, 2);
        build_topology(&mut registry, &cfg, &mut StdRng::seed_from_u64(8)).unwrap();
        let model = PropagationModel::default();
        for (_, link) in registry.links().iter() {
            assert_eq!(link.pdr, Some(model.estimate_delivery_ratio(link.rssi)));
        }
    }

    #[test]
    fn missing_root_fails_before_any_mutation() {
        let mut registry = MoteRegistry::new();
        registry.push(Mote::new(MoteId(1), MoteRole::Ordinary)).unwrap();
        registry.push(Mote::new(MoteId(2), MoteRole::Ordinary)).unwrap();
        registry.set_position(MoteId(1), Point::new(0.3, 0.3)).unwrap();
        let err = build_topology(&mut registry, &settings(1.0, 1), &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert!(matches!(err, TopologyError::MissingRoot));
        assert_eq!(registry.position(MoteId(1)), Some(Point::new(0.3, 0.3)));
    }

    #[test]
    fn rebuild_discards_previous_layout() {
        let mut registry = MoteRegistry::with_motes(5, RadioParameters::default());
        let cfg = settings(0.5, 2);
        build_topology(&mut registry, &cfg, &mut StdRng::seed_from_u64(1)).unwrap();
        let first: Vec<_> = registry.motes().iter().map(|m| m.position).collect();
        build_topology(&mut registry, &cfg, &mut StdRng::seed_from_u64(2)).unwrap();
        let second: Vec<_> = registry.motes().iter().map(|m| m.position).collect();
        assert_eq!(first[0], second[0]);
        assert_ne!(&first[1..], &second[1..]);
        assert_dense(&registry);
    }

    #[test]
    fn complete_link_matrix_fills_missing_pairs() {
        let mut registry = MoteRegistry::with_motes(4, RadioParameters::default());
        for (i, (x, y)) in [(1.0, 1.0), (1.1, 1.0), (1.0, 1.1), (0.9, 0.9)].into_iter().enumerate() {
            registry.set_position(MoteId(i as u32), Point::new(x, y)).unwrap();
        }
        registry.links_mut().set_rssi(MoteId(0), MoteId(1), -85.0);
        let model = PropagationModel::default();
        assert_eq!(fill_delivery_ratios(&mut registry, &model), 1);
        let added = complete_link_matrix(&mut registry, &model, &mut StdRng::seed_from_u64(4)).unwrap();
        assert_eq!(added, 5);
        assert_eq!(registry.links().rssi(MoteId(0), MoteId(1)), Some(-85.0));
        assert_dense(&registry);
    }

    #[test]
    fn json_write_then_read_reproduces_topology() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.json");
        let write_cfg = TopologySettings {
            persistence: PersistenceMode::Write,
            topology_file: Some(path.clone()),
            ..settings(0.6, 2)
        };
        let mut written = MoteRegistry::with_motes(10, RadioParameters::default());
        build_topology(&mut written, &write_cfg, &mut StdRng::seed_from_u64(12)).unwrap();

        let read_cfg = TopologySettings {
            persistence: PersistenceMode::Read,
            ..write_cfg.clone()
        };
        let mut replayed = MoteRegistry::with_motes(10, RadioParameters::default());
        let summary = build_topology(&mut replayed, &read_cfg, &mut StdRng::seed_from_u64(99)).unwrap();

        assert_eq!(summary.restored_links, 45);
        assert_eq!(summary.completed_links, 0);
        for mote in written.motes() {
            assert_eq!(replayed.position(mote.id), mote.position);
        }
        for (key, link) in written.links().iter() {
            assert_eq!(replayed.links().get(key.low(), key.high()), Some(link));
        }
    }

    #[test]
    fn legacy_write_then_read_keeps_coordinates_and_recomputes_links() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.txt");
        let write_cfg = TopologySettings {
            persistence: PersistenceMode::Write,
            topology_file: Some(path.clone()),
            file_format: TopologyFileFormat::Legacy,
            ..settings(0.6, 2)
        };
        let mut written = MoteRegistry::with_motes(8, RadioParameters::default());
        build_topology(&mut written, &write_cfg, &mut StdRng::seed_from_u64(5)).unwrap();

        let read_cfg = TopologySettings {
            persistence: PersistenceMode::Read,
            ..write_cfg.clone()
        };
        let mut replayed = MoteRegistry::with_motes(8, RadioParameters::default());
        let summary = build_topology(&mut replayed, &read_cfg, &mut StdRng::seed_from_u64(6)).unwrap();

        assert_eq!(summary.restored_links, 0);
        assert!(summary.placement.placements.iter().all(|p| p.attempts <= 1));
        for mote in written.motes() {
            assert_eq!(replayed.position(mote.id), mote.position);
        }
        assert_dense(&replayed);
        let model = PropagationModel::default();
        for (_, link) in replayed.links().iter() {
            assert_eq!(link.pdr, Some(model.estimate_delivery_ratio(link.rssi)));
        }
    }

    #[test]
    fn truncated_legacy_file_fails_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.txt");
        std::fs::write(&path, "0.3 0.3 0.5 0.5\n").unwrap();
        let cfg = TopologySettings {
            persistence: PersistenceMode::Read,
            topology_file: Some(path),
            file_format: TopologyFileFormat::Legacy,
            ..settings(0.6, 1)
        };
        let mut registry = MoteRegistry::with_motes(3, RadioParameters::default());
        let err = build_topology(&mut registry, &cfg, &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert!(matches!(err, TopologyError::Deserialize { record: 2, .. }));
    }

    #[test]
    fn legacy_file_with_shared_coordinates_fails_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stacked.txt");
        std::fs::write(&path, "0.3 0.3 1.0 1.0\n0.3 0.3 1.0 1.0\n0.3 0.3 1.0 1.0\n").unwrap();
        let cfg = TopologySettings {
            persistence: PersistenceMode::Read,
            topology_file: Some(path),
            file_format: TopologyFileFormat::Legacy,
            ..settings(0.6, 1)
        };
        let mut registry = MoteRegistry::with_motes(3, RadioParameters::default());
        let err = build_topology(&mut registry, &cfg, &mut StdRng::seed_from_u64(1)).unwrap_err();
        assert!(matches!(err, TopologyError::CoincidentMotes { mote: MoteId(1), other: MoteId(0) }));
        assert!(registry.links().iter().all(|(_, link)| link.rssi.is_finite()));
    }

    #[test]
    fn json_built_in_another_square_fails_the_build() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.json");
        let write_cfg = TopologySettings {
            persistence: PersistenceMode::Write,
            topology_file: Some(path.clone()),
            ..settings(0.6, 2)
        };
        let mut written = MoteRegistry::with_motes(4, RadioParameters::default());
        build_topology(&mut written, &write_cfg, &mut StdRng::seed_from_u64(3)).unwrap();

        let read_cfg = TopologySettings {
            persistence: PersistenceMode::Read,
            topology_file: Some(path),
            ..settings(0.8, 2)
        };
        let mut replayed = MoteRegistry::with_motes(4, RadioParameters::default());
        let err = build_topology(&mut replayed, &read_cfg, &mut StdRng::seed_from_u64(4)).unwrap_err();
        assert!(matches!(err, TopologyError::Deserialize { record: 0, .. }));
    }

    #[test]
    fn seeded_settings_are_reproducible() {
        let cfg = TopologySettings {
            seed: Some(2718),
            ..settings(0.5, 2)
        };
        let mut first = MoteRegistry::with_motes(6, RadioParameters::default());
        let mut second = MoteRegistry::with_motes(6, RadioParameters::default());
        build_topology(&mut first, &cfg, &mut rng_from_settings(&cfg)).unwrap();
        build_topology(&mut second, &cfg, &mut rng_from_settings(&cfg)).unwrap();
        for (a, b) in first.motes().iter().zip(second.motes()) {
            assert_eq!(a.position, b.position);
            assert_eq!(first.links().get(MoteId(0), a.id), second.links().get(MoteId(0), b.id));
        }
    }
}
