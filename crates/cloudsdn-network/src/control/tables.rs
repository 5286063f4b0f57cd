//! Flow control tables owned by network elements.

use std::fmt;

use indexmap::IndexMap;

use crate::element::ElementId;
use crate::physical::LinkId;

/// Key of a forwarding table row: one row is installed per virtual link per
/// traversed element. Equality and hashing are structural on the triple.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize)]
pub struct FlowKey {
    /// Source VM id.
    pub src_vm: u32,
    /// Destination VM id.
    pub dst_vm: u32,
    /// Flow (virtual link) id.
    pub flow_id: u64,
}

impl FlowKey {
    /// Creates a flow key.
    pub fn new(src_vm: u32, dst_vm: u32, flow_id: u64) -> Self {
        Self { src_vm, dst_vm, flow_id }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(src: {}, dst: {}, flow: {})", self.src_vm, self.dst_vm, self.flow_id)
    }
}

/// Maps a destination element to an ordered list of physical links.
///
/// Multiple links may exist per destination (parallel paths), lookup returns
/// the first one for simplicity. The `None` destination encodes the default
/// route: "send upward when no specific route is known".
///
/// The table performs no validation of inserted values, the caller
/// (the controller) is responsible for correctness.
#[derive(Default)]
pub struct RoutingTable {
    table: IndexMap<Option<ElementId>, Vec<LinkId>>,
}

impl RoutingTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or appends a link for the given destination.
    /// `None` destination stands for the default route.
    pub fn add_rule(&mut self, dst: Option<ElementId>, link: LinkId) {
        self.table.entry(dst).or_default().push(link);
    }

    /// Returns the first link for the given destination, if any.
    pub fn resolve(&self, dst: Option<ElementId>) -> Option<LinkId> {
        self.table.get(&dst).and_then(|links| links.first().copied())
    }

    /// Returns all links for the given destination.
    pub fn resolve_all(&self, dst: Option<ElementId>) -> &[LinkId] {
        self.table.get(&dst).map(|links| links.as_slice()).unwrap_or(&[])
    }

    /// Returns the already known explicit destinations, in insertion order.
    pub fn known_destinations(&self) -> Vec<ElementId> {
        self.table.keys().flatten().copied().collect()
    }

    /// Removes all links for the given destination.
    pub fn remove_rule(&mut self, dst: Option<ElementId>) {
        self.table.shift_remove(&dst);
    }

    /// Removes all rules.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Returns the number of destinations in the table.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Renders a human-readable dump of the table, one line per rule.
    /// Diagnostic only, not used by simulation logic.
    pub fn dump(&self, name_of: impl Fn(ElementId) -> String) -> String {
        let mut out = String::new();
        for (dst, links) in &self.table {
            let dst_name = match dst {
                Some(id) => name_of(*id),
                None => "default".to_owned(),
            };
            for link in links {
                out.push_str(&format!("-> {}: link #{}\n", dst_name, link));
            }
        }
        out
    }
}

/// Maps a flow key to the next hop element.
#[derive(Default)]
pub struct ForwardingTable {
    table: IndexMap<FlowKey, ElementId>,
}

impl ForwardingTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a rule for the given flow key.
    pub fn add_rule(&mut self, key: FlowKey, next_hop: ElementId) {
        self.table.insert(key, next_hop);
    }

    /// Returns the next hop for the given flow key, if any.
    pub fn resolve(&self, key: &FlowKey) -> Option<ElementId> {
        self.table.get(key).copied()
    }

    /// Removes the rule for the given flow key.
    pub fn remove_rule(&mut self, key: &FlowKey) {
        self.table.shift_remove(key);
    }

    /// Removes all rules installed for the given flow id.
    pub fn remove_flow(&mut self, flow_id: u64) {
        self.table.retain(|key, _| key.flow_id != flow_id);
    }

    /// Removes all rules.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Returns the number of rules in the table.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Iterates over the table rows.
    pub fn iter(&self) -> impl Iterator<Item = (&FlowKey, &ElementId)> {
        self.table.iter()
    }

    /// Renders a human-readable dump of the table, one line per rule.
    /// Diagnostic only, not used by simulation logic.
    pub fn dump(&self, name_of: impl Fn(ElementId) -> String) -> String {
        let mut out = String::new();
        for (key, next_hop) in &self.table {
            out.push_str(&format!("{} ---> {}\n", key, name_of(*next_hop)));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_table_returns_first_link() {
        let mut table = RoutingTable::new();
        table.add_rule(Some(1), 10);
        table.add_rule(Some(1), 11);
        table.add_rule(None, 20);
        assert_eq!(table.resolve(Some(1)), Some(10));
        assert_eq!(table.resolve_all(Some(1)), &[10, 11]);
        assert_eq!(table.resolve(None), Some(20));
        assert_eq!(table.resolve(Some(2)), None);
        assert_eq!(table.known_destinations(), vec![1]);
    }

    #[test]
    fn forwarding_table_is_keyed_by_flow_triple() {
        let mut table = ForwardingTable::new();
        table.add_rule(FlowKey::new(1, 2, 100), 5);
        assert_eq!(table.resolve(&FlowKey::new(1, 2, 100)), Some(5));
        assert_eq!(table.resolve(&FlowKey::new(2, 1, 100)), None);
        table.remove_flow(100);
        assert!(table.is_empty());
    }
}
