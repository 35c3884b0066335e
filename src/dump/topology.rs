//! Topology lookup derived from the `NODES` and `LINKS` sub-tables
//! (spec.md §3 "Topology maps", §4.3).

use std::collections::HashMap;
use std::path::Path;

use crate::dump::cell::Frame;
use crate::dump::guid::{normalize_guid, parse_port_number};
use crate::dump::reader::{build_index, read_table, DumpIndex};
use crate::utils::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Unknown,
    Hca,
    Switch,
    Router,
}

impl NodeType {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => NodeType::Hca,
            2 => NodeType::Switch,
            3 => NodeType::Router,
            _ => NodeType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Unknown => "Unknown",
            NodeType::Hca => "HCA",
            NodeType::Switch => "Switch",
            NodeType::Router => "Router",
        }
    }
}

/// `(NodeGUID, PortNumber)` universal port key (spec.md §3).
pub type PortKey = (String, u32);

#[derive(Debug, Clone, Default)]
pub struct TopologyLookup {
    node_name: HashMap<String, String>,
    node_type: HashMap<String, NodeType>,
    neighbor: HashMap<PortKey, (String, Option<u32>)>,
}

impl TopologyLookup {
    /// Build from an already-loaded dataset index (used by the inventory,
    /// which caches the index independently of the topology).
    pub fn build(path: &Path, index: &DumpIndex) -> Result<Self, ApiError> {
        let mut lookup = TopologyLookup::default();

        if index.table_exists("NODES") {
            let nodes = read_table(path, index, "NODES")?;
            lookup.ingest_nodes(&nodes);
        }
        if index.table_exists("LINKS") {
            let links = read_table(path, index, "LINKS")?;
            lookup.ingest_links(&links);
        }

        Ok(lookup)
    }

    pub fn from_path(path: &Path) -> Result<Self, ApiError> {
        let index = build_index(path)?;
        Self::build(path, &index)
    }

    fn ingest_nodes(&mut self, nodes: &Frame) {
        for row in &nodes.rows {
            let guid_raw = row.get("NodeGUID").map(|c| c.to_string()).unwrap_or_default();
            let guid = normalize_guid(&guid_raw);
            if guid.is_empty() {
                continue;
            }
            if let Some(desc) = row.get("NodeDesc") {
                let desc = desc.to_string();
                let trimmed = desc.trim_matches('"').to_string();
                self.node_name.insert(guid.clone(), trimmed);
            }
            let ty = row.get("NodeType").map(|c| c.as_i64_or_zero()).unwrap_or(0);
            self.node_type.insert(guid, NodeType::from_code(ty));
        }
    }

    fn ingest_links(&mut self, links: &Frame) {
        for row in &links.rows {
            let g1 = row.get("NodeGuid1").map(|c| normalize_guid(&c.to_string()));
            let g2 = row.get("NodeGuid2").map(|c| normalize_guid(&c.to_string()));
            let p1 = row.get("PortNum1").and_then(|c| parse_port_number(&c.to_string()));
            let p2 = row.get("PortNum2").and_then(|c| parse_port_number(&c.to_string()));

            let (g1, g2) = match (g1, g2) {
                (Some(a), Some(b)) if !a.is_empty() && !b.is_empty() => (a, b),
                _ => continue,
            };
            if p1.is_none() && p2.is_none() {
                continue;
            }

            if let Some(p1) = p1 {
                self.neighbor.insert((g1.clone(), p1), (g2.clone(), p2));
            }
            if let Some(p2) = p2 {
                self.neighbor.insert((g2, p2), (g1, p1));
            }
        }
    }

    pub fn node_label(&self, guid: &str) -> Option<&str> {
        self.node_name.get(&normalize_guid(guid)).map(|s| s.as_str())
    }

    pub fn node_type(&self, guid: &str) -> Option<NodeType> {
        self.node_type.get(&normalize_guid(guid)).copied()
    }

    pub fn attached_guid(&self, guid: &str, port: u32) -> Option<&str> {
        self.neighbor.get(&(normalize_guid(guid), port)).map(|(g, _)| g.as_str())
    }

    pub fn attached_port(&self, guid: &str, port: u32) -> Option<u32> {
        self.neighbor.get(&(normalize_guid(guid), port)).and_then(|(_, p)| *p)
    }

    /// Enrich a single row's attachment info. Returns
    /// `(node_name, node_type, attached_guid, attached_port, attached_to, attached_to_type)`.
    pub fn annotate(
        &self,
        guid: &str,
        port: Option<u32>,
    ) -> (Option<&str>, Option<NodeType>, Option<&str>, Option<u32>, Option<&str>, Option<NodeType>)
    {
        let name = self.node_label(guid);
        let ty = self.node_type(guid);
        let (attached_guid, attached_port) = match port {
            Some(p) => (self.attached_guid(guid, p), self.attached_port(guid, p)),
            None => (None, None),
        };
        let attached_name = attached_guid.and_then(|g| self.node_label(g));
        let attached_type = attached_guid.and_then(|g| self.node_type(g));
        (name, ty, attached_guid, attached_port, attached_name, attached_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn sample_dump() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            concat!(
                "START_NODES\n",
                "NodeGUID,NodeDesc,NodeType\n",
                "0x1,\"host-a\",1\n",
                "0x2,\"switch-a\",2\n",
                "END_NODES\n",
                "START_LINKS\n",
                "NodeGuid1,PortNum1,NodeGuid2,PortNum2\n",
                "0x1,1,0x2,3\n",
                "END_LINKS\n",
            )
        )
        .unwrap();
        file
    }

    #[test]
    fn node_label_and_type() {
        let file = sample_dump();
        let topo = TopologyLookup::from_path(file.path()).unwrap();
        assert_eq!(topo.node_label("0x1"), Some("host-a"));
        assert_eq!(topo.node_type("0x2"), Some(NodeType::Switch));
    }

    #[test]
    fn neighbor_map_is_bidirectional() {
        // P2: every LINKS row with both endpoints present appears both directions
        let file = sample_dump();
        let topo = TopologyLookup::from_path(file.path()).unwrap();
        assert_eq!(topo.attached_guid("0x1", 1), Some("0x2"));
        assert_eq!(topo.attached_port("0x1", 1), Some(3));
        assert_eq!(topo.attached_guid("0x2", 3), Some("0x1"));
        assert_eq!(topo.attached_port("0x2", 3), Some(1));
    }

    #[test]
    fn missing_tables_yield_empty_topology() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "START_OTHER\nA\nb\nEND_OTHER\n").unwrap();
        let topo = TopologyLookup::from_path(file.path()).unwrap();
        assert_eq!(topo.node_label("0x1"), None);
    }
}
