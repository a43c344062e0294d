use std::collections::BTreeMap;

/// Metadata of one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    /// The name of this topic.
    pub name: String,

    /// True for broker-internal topics such as `__consumer_offsets`.
    pub is_internal: bool,

    /// Partition information
    pub partitions: BTreeMap<i32, Partition>,
}

impl Topic {
    /// Replication factor as seen on the lowest partition, 0 without partitions.
    pub fn replication_factor(&self) -> usize {
        self.partitions
            .values()
            .next()
            .map(|p| p.replica_nodes.len())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Partition {
    /// The ID of the leader broker.
    pub leader_id: i32,

    /// The set of all nodes that host this partition.
    pub replica_nodes: Vec<i32>,

    /// The set of all nodes that are in sync with the leader for this partition.
    pub isr_nodes: Vec<i32>,
}
