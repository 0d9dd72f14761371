//! Run statistics, collected as a network listener.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use opportune_core::event::{NetworkEvent, NetworkListener};

/// Counters over one run's event stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimStats {
    pub messages_created: u64,
    pub transfers_started: u64,
    pub transfers_completed: u64,
    pub transfers_aborted: u64,
    /// Transfers that reached a final recipient for the first time.
    pub first_deliveries: u64,
    /// Deletions by drop policy or buffer rejection.
    pub messages_dropped: u64,
    /// Deletions by TTL expiry or acknowledgment purge.
    pub messages_purged: u64,
    pub connections_up: u64,
    pub connections_down: u64,
    pub emergencies_started: u64,
    /// Summed creation-to-first-delivery times.
    pub total_delivery_latency: f64,
    #[serde(skip)]
    creation_times: BTreeMap<String, f64>,
}

impl SimStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fraction of created messages delivered at least once.
    pub fn delivery_ratio(&self) -> f64 {
        if self.messages_created == 0 {
            return 0.0;
        }
        self.first_deliveries as f64 / self.messages_created as f64
    }

    /// Mean creation-to-first-delivery time; 0 before the first delivery.
    pub fn average_delivery_latency(&self) -> f64 {
        if self.first_deliveries == 0 {
            return 0.0;
        }
        self.total_delivery_latency / self.first_deliveries as f64
    }
}

impl NetworkListener for SimStats {
    fn on_event(&mut self, event: &NetworkEvent) {
        match event {
            NetworkEvent::MessageCreated { id, time, .. } => {
                self.messages_created += 1;
                self.creation_times.entry(id.clone()).or_insert(*time);
            }
            NetworkEvent::TransferStarted { .. } => self.transfers_started += 1,
            NetworkEvent::Transferred { id, time, first_delivery, .. } => {
                self.transfers_completed += 1;
                if *first_delivery {
                    self.first_deliveries += 1;
                    if let Some(created) = self.creation_times.get(id) {
                        self.total_delivery_latency += time - created;
                    }
                }
            }
            NetworkEvent::TransferAborted { .. } => self.transfers_aborted += 1,
            NetworkEvent::MessageDeleted { dropped, .. } => {
                if *dropped {
                    self.messages_dropped += 1;
                } else {
                    self.messages_purged += 1;
                }
            }
            NetworkEvent::ConnectionUp { .. } => self.connections_up += 1,
            NetworkEvent::ConnectionDown { .. } => self.connections_down += 1,
            NetworkEvent::EmergencyStarted { .. } => self.emergencies_started += 1,
            NetworkEvent::EmergencyEnded { .. } => {}
        }
    }
}
