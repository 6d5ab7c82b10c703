//! Per-run topology report lines.
//!
//! The report carries the layout and the link table in two lines:
//!
//! ```text
//! #pos runNum=0 0@(1.00000,1.00000)@root 1@(0.81234,1.20050)@ordinary
//! #links runNum=0 0-1@-78dBm@1.000
//! ```

use crate::simulation::types::MoteRegistry;

/// Format the `#pos` and `#links` lines of run `run`.
///
/// Motes are listed in registration order, links sorted by mote pair. Links
/// without a delivery ratio are skipped.
pub fn format_topology_report(run: u32, registry: &MoteRegistry) -> String {
    let positions: Vec<String> = registry
        .motes()
        .iter()
        .filter_map(|mote| mote.position.map(|p| format!("{}@({:.5},{:.5})@{}", mote.id, p.x, p.y, mote.role)))
        .collect();

    let mut links: Vec<_> = registry.links().iter().filter_map(|(key, state)| state.pdr.map(|pdr| (*key, state.rssi, pdr))).collect();
    links.sort_by_key(|(key, _, _)| *key);
    let links: Vec<String> = links
        .into_iter()
        .map(|(key, rssi, pdr)| format!("{}-{}@{:.0}dBm@{:.3}", key.low(), key.high(), rssi, pdr))
        .collect();

    format!("#pos runNum={} {}\n#links runNum={} {}", run, positions.join(" "), run, links.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::types::{LinkState, MoteId, Point, RadioParameters};

    #[test]
    fn report_lists_positions_and_links() {
        let mut registry = MoteRegistry::with_motes(3, RadioParameters::default());
        registry.set_position(MoteId(0), Point::new(1.0, 1.0)).unwrap();
        registry.set_position(MoteId(1), Point::new(0.812344, 1.2005)).unwrap();
        registry.set_position(MoteId(2), Point::new(1.5, 0.25)).unwrap();
        let links = registry.links_mut();
        links.insert(MoteId(2), MoteId(1), LinkState { rssi: -95.6, pdr: Some(0.18) });
        links.insert(MoteId(0), MoteId(1), LinkState { rssi: -78.2, pdr: Some(1.0) });
        links.set_rssi(MoteId(0), MoteId(2), -99.0);

        let report = format_topology_report(4, &registry);
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(
            lines[0],
            "#pos runNum=4 0@(1.00000,1.00000)@root 1@(0.81234,1.20050)@ordinary 2@(1.50000,0.25000)@ordinary"
        );
        assert_eq!(lines[1], "#links runNum=4 0-1@-78dBm@1.000 1-2@-96dBm@0.180");
    }
}
