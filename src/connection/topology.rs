use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use parking_lot::RwLock;
use tracing::info;

use crate::protocol::messages::MetadataResponseBroker;

/// Brokers known from the most recent metadata responses.
#[derive(Debug, Default)]
pub struct BrokerTopology {
    /// Brokers keyed by broker ID
    topology: RwLock<HashMap<i32, Broker>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broker {
    /// broker ID from the topology metadata
    pub id: i32,
    pub host: String,
    pub port: i32,
    pub rack: Option<String>,
}

impl Display for Broker {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl<'a> From<&'a MetadataResponseBroker> for Broker {
    fn from(b: &'a MetadataResponseBroker) -> Self {
        Self {
            id: b.node_id,
            host: b.host.clone(),
            port: b.port,
            rack: b.rack.clone(),
        }
    }
}

impl BrokerTopology {
    pub fn is_empty(&self) -> bool {
        self.topology.read().is_empty()
    }

    /// Returns the broker for the provided broker ID
    pub fn get_broker(&self, broker_id: i32) -> Option<Broker> {
        self.topology.read().get(&broker_id).cloned()
    }

    /// Returns all brokers ordered by ID
    pub fn get_brokers(&self) -> Vec<Broker> {
        let mut brokers: Vec<_> = self.topology.read().values().cloned().collect();
        brokers.sort_by_key(|b| b.id);
        brokers
    }

    /// Replaces the known brokers with the provided broker metadata.
    ///
    /// Brokers missing from `brokers` have left the cluster and are dropped.
    pub fn update(&self, brokers: &[MetadataResponseBroker]) {
        let mut topology = self.topology.write();
        topology.retain(|id, current| {
            let keep = brokers.iter().any(|b| b.node_id == *id);
            if !keep {
                info!(broker = id, current = %current, "Broker removed");
            }
            keep
        });

        for broker in brokers {
            match topology.entry(broker.node_id) {
                Entry::Occupied(mut o) => {
                    let current = o.get_mut();
                    let new = Broker::from(broker);
                    if *current != new {
                        info!(
                            broker=broker.node_id,
                            current=%current,
                            new=%new,
                            "Broker update",
                        );
                        *current = new;
                    }
                }
                Entry::Vacant(v) => {
                    let new = Broker::from(broker);
                    info!(
                        broker=broker.node_id,
                        new=%new,
                        "New broker",
                    );
                    v.insert(new);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broker(node_id: i32, host: &str) -> MetadataResponseBroker {
        MetadataResponseBroker {
            node_id,
            host: host.to_string(),
            port: 9092,
            rack: None,
        }
    }

    #[test]
    fn update_tracks_membership() {
        let topology = BrokerTopology::default();
        assert!(topology.is_empty());

        topology.update(&[broker(2, "b"), broker(1, "a")]);
        let ids: Vec<_> = topology.get_brokers().iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 2]);

        topology.update(&[broker(2, "moved")]);
        assert_eq!(topology.get_broker(1), None);
        assert_eq!(topology.get_broker(2).unwrap().to_string(), "moved:9092");
    }
}
