//! Reading and writing stored topologies.
//!
//! Two formats are supported:
//! - `Json`: a self-describing document keyed by mote id, carrying positions
//!   and the full link table. Reader and writer do not depend on ordering.
//! - `Legacy`: one whitespace-separated record per mote in processing order,
//!   `x y pdr_1 .. pdr_{n-1}`, with PDRs to every other mote in the same order.
//!   Records are matched to motes by position only.
//!
//! Every read or write is a single session: the file is fully consumed or
//! fully produced in one call.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::common::config::TopologyFileFormat;
use crate::error::{Result, TopologyError};
use crate::simulation::types::{LinkState, MoteId, MoteRegistry, MoteRole, Point};

/// Version written into, and required from, JSON documents.
pub const TOPOLOGY_DOCUMENT_VERSION: u32 = 1;

/// Positions and links recovered from storage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredTopology {
    pub positions: Vec<(MoteId, Point)>,
    /// Links restored verbatim. Empty for legacy files, whose links are
    /// re-sampled on replay.
    pub links: Vec<(MoteId, MoteId, LinkState)>,
    /// Side of the square the layout was built in. Not recorded by legacy files.
    pub square_side: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TopologyDocument {
    version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    generated_at: Option<String>,
    square_side: f64,
    motes: Vec<MoteRecord>,
    links: Vec<LinkRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MoteRecord {
    id: MoteId,
    role: MoteRole,
    x: f64,
    y: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct LinkRecord {
    a: MoteId,
    b: MoteId,
    rssi: f64,
    pdr: f64,
}

/// Write the placed topology of `registry` to `path`.
pub fn write_topology(path: &Path, format: TopologyFileFormat, registry: &MoteRegistry, square_side: f64) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    match format {
        TopologyFileFormat::Json => write_json(&mut writer, registry, square_side)?,
        TopologyFileFormat::Legacy => write_legacy(&mut writer, registry)?,
    }
    writer.flush()?;
    log::info!("Wrote {} motes to {} ({:?} format)", registry.len(), path.display(), format);
    Ok(())
}

/// Read a stored topology for the motes of `registry`.
pub fn read_topology(path: &Path, format: TopologyFileFormat, registry: &MoteRegistry) -> Result<StoredTopology> {
    let reader = BufReader::new(File::open(path)?);
    let stored = match format {
        TopologyFileFormat::Json => read_json(reader, registry)?,
        TopologyFileFormat::Legacy => read_legacy(reader, &registry.processing_order()?)?,
    };
    log::info!(
        "Read {} positions and {} links from {} ({:?} format)",
        stored.positions.len(),
        stored.links.len(),
        path.display(),
        format
    );
    Ok(stored)
}

fn placed(registry: &MoteRegistry, id: MoteId) -> Result<Point> {
    registry.position(id).ok_or(TopologyError::UnknownMote(id))
}

/// Serialize `registry` as positional text records.
pub fn write_legacy<W: Write>(writer: &mut W, registry: &MoteRegistry) -> Result<()> {
    let order = registry.processing_order()?;
    for &id in &order {
        let position = placed(registry, id)?;
        let mut fields = vec![position.x.to_string(), position.y.to_string()];
        for &other in order.iter().filter(|&&other| other != id) {
            fields.push(registry.links().pdr(id, other).unwrap_or(0.0).to_string());
        }
        writeln!(writer, "{}", fields.join(" "))?;
    }
    Ok(())
}

/// Parse positional text records for `order`, returning one position per mote.
///
/// Each record must hold exactly `2 + (n - 1)` numeric fields. Record numbers
/// in errors are 1-based.
pub fn read_legacy<R: BufRead>(reader: R, order: &[MoteId]) -> Result<StoredTopology> {
    let mut lines = Vec::with_capacity(order.len());
    for (i, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| TopologyError::Deserialize {
            record: i + 1,
            reason: e.to_string(),
        })?;
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }

    if lines.len() < order.len() {
        return Err(TopologyError::Deserialize {
            record: lines.len() + 1,
            reason: format!("truncated topology: expected {} records, found {}", order.len(), lines.len()),
        });
    }
    if lines.len() > order.len() {
        return Err(TopologyError::Deserialize {
            record: order.len() + 1,
            reason: format!("unexpected record: only {} motes are registered", order.len()),
        });
    }

    let expected_fields = order.len() + 1;
    let mut positions = Vec::with_capacity(order.len());
    for (i, (line, &id)) in lines.iter().zip(order).enumerate() {
        let record = i + 1;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != expected_fields {
            return Err(TopologyError::Deserialize {
                record,
                reason: format!("expected {} fields, found {}", expected_fields, fields.len()),
            });
        }
        let mut values = Vec::with_capacity(fields.len());
        for field in &fields {
            let value: f64 = field.parse().map_err(|e| TopologyError::Deserialize {
                record,
                reason: format!("invalid number '{}': {}", field, e),
            })?;
            if !value.is_finite() {
                return Err(TopologyError::Deserialize {
                    record,
                    reason: format!("non-finite value '{}'", field),
                });
            }
            values.push(value);
        }
        if let Some(pdr) = values[2..].iter().find(|pdr| !(0.0..=1.0).contains(*pdr)) {
            return Err(TopologyError::Deserialize {
                record,
                reason: format!("delivery ratio {} outside [0, 1]", pdr),
            });
        }
        positions.push((id, Point::new(values[0], values[1])));
    }

    Ok(StoredTopology {
        positions,
        links: Vec::new(),
        square_side: None,
    })
}

/// Serialize `registry` as a self-describing JSON document.
pub fn write_json<W: Write>(writer: &mut W, registry: &MoteRegistry, square_side: f64) -> Result<()> {
    let order = registry.processing_order()?;
    let mut motes = Vec::with_capacity(order.len());
    for &id in &order {
        let mote = registry.get(id).ok_or(TopologyError::UnknownMote(id))?;
        let position = placed(registry, id)?;
        motes.push(MoteRecord {
            id,
            role: mote.role,
            x: position.x,
            y: position.y,
        });
    }

    let mut links: Vec<LinkRecord> = registry
        .links()
        .iter()
        .filter_map(|(key, state)| {
            state.pdr.map(|pdr| LinkRecord {
                a: key.low(),
                b: key.high(),
                rssi: state.rssi,
                pdr,
            })
        })
        .collect();
    links.sort_by_key(|l| (l.a, l.b));

    let document = TopologyDocument {
        version: TOPOLOGY_DOCUMENT_VERSION,
        generated_at: Some(chrono::Utc::now().to_rfc3339()),
        square_side,
        motes,
        links,
    };
    serde_json::to_writer_pretty(&mut *writer, &document)?;
    writeln!(writer)?;
    Ok(())
}

/// Parse a JSON document and check it against the motes of `registry`.
///
/// Every registered mote must appear exactly once with its registered role.
/// Record numbers in errors are 1-based within the `motes` or `links` list;
/// document-level problems use record 0.
pub fn read_json<R: BufRead>(reader: R, registry: &MoteRegistry) -> Result<StoredTopology> {
    let document: TopologyDocument = serde_json::from_reader(reader).map_err(|e| TopologyError::Deserialize {
        record: 0,
        reason: e.to_string(),
    })?;
    if document.version != TOPOLOGY_DOCUMENT_VERSION {
        return Err(TopologyError::Deserialize {
            record: 0,
            reason: format!("unsupported document version {}", document.version),
        });
    }
    if !(document.square_side.is_finite() && document.square_side > 0.0) {
        return Err(TopologyError::Deserialize {
            record: 0,
            reason: format!("square side {} must be positive", document.square_side),
        });
    }

    let mut seen = HashSet::new();
    let mut positions = Vec::with_capacity(document.motes.len());
    for (i, entry) in document.motes.iter().enumerate() {
        let record = i + 1;
        let mote = registry.get(entry.id).ok_or_else(|| TopologyError::Deserialize {
            record,
            reason: format!("mote entry {} is not registered", entry.id),
        })?;
        if !seen.insert(entry.id) {
            return Err(TopologyError::Deserialize {
                record,
                reason: format!("duplicate mote entry {}", entry.id),
            });
        }
        if mote.role != entry.role {
            return Err(TopologyError::Deserialize {
                record,
                reason: format!("mote {} stored as {} but registered as {}", entry.id, entry.role, mote.role),
            });
        }
        if !(entry.x.is_finite() && entry.y.is_finite()) {
            return Err(TopologyError::Deserialize {
                record,
                reason: format!("mote {} has non-finite coordinates", entry.id),
            });
        }
        positions.push((entry.id, Point::new(entry.x, entry.y)));
    }
    if let Some(missing) = registry.motes().iter().find(|m| !seen.contains(&m.id)) {
        return Err(TopologyError::Deserialize {
            record: document.motes.len() + 1,
            reason: format!("no position stored for mote {}", missing.id),
        });
    }

    let mut links = Vec::with_capacity(document.links.len());
    let mut seen_links: HashMap<(MoteId, MoteId), usize> = HashMap::new();
    for (i, entry) in document.links.iter().enumerate() {
        let record = i + 1;
        let fail = |reason: String| TopologyError::Deserialize { record, reason };
        if entry.a == entry.b || !seen.contains(&entry.a) || !seen.contains(&entry.b) {
            return Err(fail(format!("link entry {}-{} does not join two registered motes", entry.a, entry.b)));
        }
        let key = if entry.a < entry.b { (entry.a, entry.b) } else { (entry.b, entry.a) };
        if let Some(first) = seen_links.insert(key, record) {
            return Err(fail(format!("link {}-{} already stored in link entry {}", entry.a, entry.b, first)));
        }
        if !entry.rssi.is_finite() {
            return Err(fail(format!("link {}-{} has non-finite RSSI", entry.a, entry.b)));
        }
        if !(0.0..=1.0).contains(&entry.pdr) {
            return Err(fail(format!("link {}-{} delivery ratio {} outside [0, 1]", entry.a, entry.b, entry.pdr)));
        }
        links.push((
            entry.a,
            entry.b,
            LinkState {
                rssi: entry.rssi,
                pdr: Some(entry.pdr),
            },
        ));
    }

    Ok(StoredTopology {
        positions,
        links,
        square_side: Some(document.square_side),
    })
}
