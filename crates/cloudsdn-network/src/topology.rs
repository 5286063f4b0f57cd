//! Physical network topology: nodes, weighted links and shortest paths.
//!
//! The topology is consumed once at datacenter construction to populate the
//! physical adjacency used by routing-table construction and by shortest-path
//! queries during virtual-link deployment.

use std::collections::HashSet;
use std::path::Path;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use thiserror::Error;

/// Index of a node within the topology.
pub type NodeId = usize;

/// Errors of topology construction and parsing.
///
/// These are setup-time errors: construction is aborted immediately since
/// subsequent behavior would be undefined.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// Reading the topology file failed.
    #[error("cannot read topology file: {0}")]
    Io(#[from] std::io::Error),
    /// A line of the topology file could not be parsed.
    #[error("malformed topology file at line {line}: {reason}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// What went wrong.
        reason: String,
    },
    /// A node id is absent from the topology but required.
    #[error("unknown topology node: {0}")]
    UnknownNode(String),
}

/// Bandwidth and latency of a topology link.
#[derive(Clone, Copy, Debug)]
pub struct TopologyLink {
    /// Link bandwidth in Mb/s.
    pub bandwidth: f64,
    /// Link latency in seconds.
    pub latency: f64,
}

impl TopologyLink {
    /// Creates a link description.
    pub fn new(bandwidth: f64, latency: f64) -> Self {
        assert!(bandwidth > 0.0, "Link bandwidth must be > 0");
        Self { bandwidth, latency }
    }
}

/// An undirected graph of named nodes and weighted links.
///
/// Adjacency of each node preserves the order in which the links were added,
/// so "the first upward neighbor in topology edge order" is well defined.
#[derive(Debug, Default)]
pub struct PhysicalTopology {
    names: Vec<String>,
    name_to_node: FxHashMap<String, NodeId>,
    links: Vec<TopologyLink>,
    node_links_map: Vec<IndexMap<NodeId, usize>>,
}

impl PhysicalTopology {
    /// Creates an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node with the given name. Returns the existing id if a node
    /// with this name was already added.
    pub fn add_node(&mut self, name: &str) -> NodeId {
        if let Some(&id) = self.name_to_node.get(name) {
            return id;
        }
        let id = self.names.len();
        self.names.push(name.to_owned());
        self.name_to_node.insert(name.to_owned(), id);
        self.node_links_map.push(IndexMap::new());
        id
    }

    /// Adds an undirected link between two nodes.
    pub fn add_link(&mut self, node1: NodeId, node2: NodeId, link: TopologyLink) -> Result<(), TopologyError> {
        self.check_node_exists(node1)?;
        self.check_node_exists(node2)?;
        let link_id = self.links.len();
        self.links.push(link);
        self.node_links_map[node1].insert(node2, link_id);
        self.node_links_map[node2].insert(node1, link_id);
        Ok(())
    }

    /// Returns the id of the node with the given name.
    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.name_to_node.get(name).copied()
    }

    /// Returns the name of the given node.
    pub fn node_name(&self, node: NodeId) -> &str {
        &self.names[node]
    }

    /// Returns the number of nodes.
    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    /// Iterates over the neighbors of a node with the connecting links,
    /// in topology edge order.
    pub fn neighbors(&self, node: NodeId) -> impl Iterator<Item = (NodeId, &TopologyLink)> {
        self.node_links_map[node].iter().map(|(&n, &l)| (n, &self.links[l]))
    }

    /// Returns the link between two nodes, if any.
    pub fn link_between(&self, node1: NodeId, node2: NodeId) -> Option<&TopologyLink> {
        self.node_links_map
            .get(node1)?
            .get(&node2)
            .map(|&link_id| &self.links[link_id])
    }

    /// Returns the shortest path (by latency) between two nodes computed with
    /// the Dijkstra's algorithm, including both endpoints.
    pub fn shortest_path(&self, src: NodeId, dst: NodeId) -> Option<Vec<NodeId>> {
        if src >= self.node_count() || dst >= self.node_count() {
            return None;
        }
        if src == dst {
            return Some(vec![src]);
        }

        let node_count = self.node_count();
        let mut latency = vec![f64::INFINITY; node_count];
        let mut parent = vec![usize::MAX; node_count];
        let mut visited: HashSet<NodeId> = HashSet::new();
        latency[src] = 0.0;

        for _ in 0..node_count {
            let mut relax_node = usize::MAX;
            for next_node in 0..node_count {
                if !visited.contains(&next_node)
                    && (relax_node == usize::MAX || latency[next_node] < latency[relax_node])
                {
                    relax_node = next_node;
                }
            }
            if latency[relax_node] == f64::INFINITY {
                break;
            }
            for (node_to, link_id) in self.node_links_map[relax_node].iter() {
                let link = &self.links[*link_id];
                if latency[relax_node] + link.latency < latency[*node_to] {
                    latency[*node_to] = latency[relax_node] + link.latency;
                    parent[*node_to] = relax_node;
                }
            }
            visited.insert(relax_node);
        }

        let mut path = vec![dst];
        let mut cur_node = dst;
        while cur_node != src {
            if parent[cur_node] == usize::MAX {
                return None;
            }
            cur_node = parent[cur_node];
            path.push(cur_node);
        }
        path.reverse();
        Some(path)
    }

    /// Parses a topology from a BRITE-style description.
    ///
    /// Only the `Nodes:` and `Edges:` sections are consumed. Node lines start
    /// with the node id, edge lines carry `id from to length delay bandwidth`.
    /// Nodes are named by their id token, so [`Self::node_id`] accepts the
    /// stringified BRITE id.
    pub fn from_brite(text: &str) -> Result<Self, TopologyError> {
        enum Section {
            None,
            Nodes,
            Edges,
        }

        let mut topology = Self::new();
        let mut section = Section::None;
        for (idx, raw_line) in text.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with("Nodes:") {
                section = Section::Nodes;
                continue;
            }
            if line.starts_with("Edges:") {
                section = Section::Edges;
                continue;
            }
            match section {
                Section::None => {}
                Section::Nodes => {
                    let node_id = line.split_whitespace().next().ok_or(TopologyError::Parse {
                        line: idx + 1,
                        reason: "empty node line".to_owned(),
                    })?;
                    topology.add_node(node_id);
                }
                Section::Edges => {
                    let fields: Vec<&str> = line.split_whitespace().collect();
                    if fields.len() < 6 {
                        return Err(TopologyError::Parse {
                            line: idx + 1,
                            reason: format!("expected at least 6 edge fields, got {}", fields.len()),
                        });
                    }
                    let from = topology
                        .node_id(fields[1])
                        .ok_or_else(|| TopologyError::UnknownNode(fields[1].to_owned()))?;
                    let to = topology
                        .node_id(fields[2])
                        .ok_or_else(|| TopologyError::UnknownNode(fields[2].to_owned()))?;
                    let delay: f64 = fields[4].parse().map_err(|_| TopologyError::Parse {
                        line: idx + 1,
                        reason: format!("bad delay value '{}'", fields[4]),
                    })?;
                    let bandwidth: f64 = fields[5].parse().map_err(|_| TopologyError::Parse {
                        line: idx + 1,
                        reason: format!("bad bandwidth value '{}'", fields[5]),
                    })?;
                    topology.add_link(from, to, TopologyLink::new(bandwidth, delay))?;
                }
            }
        }
        Ok(topology)
    }

    /// Reads and parses a BRITE-style topology file.
    pub fn from_brite_file<P: AsRef<Path>>(path: P) -> Result<Self, TopologyError> {
        Self::from_brite(&std::fs::read_to_string(path)?)
    }

    fn check_node_exists(&self, node: NodeId) -> Result<(), TopologyError> {
        if node >= self.node_count() {
            return Err(TopologyError::UnknownNode(node.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BRITE: &str = r#"Topology: ( 4 Nodes, 3 Edges )
Model (1 - RTWaxman)

Nodes: ( 4 )
0	1.0	2.0	3	3	-1	RT_NODE
1	2.0	3.0	2	2	-1	RT_NODE
2	3.0	4.0	2	2	-1	RT_NODE
3	4.0	5.0	2	2	-1	RT_NODE

Edges: ( 3 )
0	0	1	1.0	0.001	1000.0	-1	-1	E_RT
1	1	2	1.0	0.001	1000.0	-1	-1	E_RT
2	1	3	1.0	0.002	500.0	-1	-1	E_RT
"#;

    #[test]
    fn parses_brite_description() {
        let topology = PhysicalTopology::from_brite(BRITE).unwrap();
        assert_eq!(topology.node_count(), 4);
        let n0 = topology.node_id("0").unwrap();
        let n1 = topology.node_id("1").unwrap();
        let link = topology.link_between(n0, n1).unwrap();
        assert_eq!(link.bandwidth, 1000.0);
        assert_eq!(link.latency, 0.001);
    }

    #[test]
    fn rejects_edge_with_unknown_node() {
        let broken = BRITE.replace("2\t1\t3", "2\t1\t9");
        let err = PhysicalTopology::from_brite(&broken).unwrap_err();
        assert!(matches!(err, TopologyError::UnknownNode(_)));
    }

    #[test]
    fn shortest_path_follows_lowest_latency() {
        let mut topology = PhysicalTopology::new();
        let a = topology.add_node("a");
        let b = topology.add_node("b");
        let c = topology.add_node("c");
        let d = topology.add_node("d");
        topology.add_link(a, b, TopologyLink::new(100., 1.)).unwrap();
        topology.add_link(b, d, TopologyLink::new(100., 1.)).unwrap();
        topology.add_link(a, c, TopologyLink::new(100., 3.)).unwrap();
        topology.add_link(c, d, TopologyLink::new(100., 3.)).unwrap();
        assert_eq!(topology.shortest_path(a, d).unwrap(), vec![a, b, d]);
        assert_eq!(topology.shortest_path(a, a).unwrap(), vec![a]);
    }

    #[test]
    fn shortest_path_is_none_for_disconnected_nodes() {
        let mut topology = PhysicalTopology::new();
        let a = topology.add_node("a");
        let b = topology.add_node("b");
        let c = topology.add_node("c");
        topology.add_link(a, b, TopologyLink::new(100., 1.)).unwrap();
        assert!(topology.shortest_path(a, c).is_none());
    }
}
