use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes after a commit. Delivery problems never undo the write, so
    /// they are only logged.
    pub async fn publish(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("Dropping domain event: {}", e);
        }
    }
}

/// Facts emitted after the corresponding database transaction commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    // Catalog events
    PartCreated { part_id: i32, code: String },
    PartUpdated { part_id: i32, code: String },
    PartArchived(i32),
    PartDeleted(i32),

    // Ledger events
    StockUpdated {
        part_id: i32,
        warehouse_id: i32,
        transaction_id: i32,
        transaction_type: String,
        requested_change: i32,
        applied_change: i32,
        quantity_on_hand: i32,
    },

    // Stock count events
    StockCountCreated { count_id: i32, count_number: String },
    StockCountStarted(i32),
    StockCountCompleted {
        count_id: i32,
        variance_items: i32,
        adjustments_posted: usize,
    },
    StockCountCancelled(i32),
    StockCountDeleted(i32),
}

/// Drains the channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::StockUpdated {
                part_id,
                warehouse_id,
                requested_change,
                applied_change,
                ..
            } if requested_change != applied_change => {
                warn!(
                    part_id,
                    warehouse_id,
                    requested_change,
                    applied_change,
                    "Stock movement clamped at zero"
                );
            }
            _ => info!("Received event: {:?}", event),
        }
    }

    info!("Event channel closed; stopping event processing loop");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_survives_a_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        assert!(sender.send(Event::PartDeleted(1)).await.is_err());
        sender.publish(Event::PartDeleted(1)).await;
    }

    #[tokio::test]
    async fn events_arrive_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        sender.publish(Event::StockCountStarted(7)).await;
        sender.publish(Event::StockCountCancelled(7)).await;
        assert_eq!(rx.recv().await, Some(Event::StockCountStarted(7)));
        assert_eq!(rx.recv().await, Some(Event::StockCountCancelled(7)));
    }

    #[tokio::test]
    async fn processor_stops_when_senders_drop() {
        let (tx, rx) = mpsc::channel(4);
        let handle = tokio::spawn(process_events(rx));
        let sender = EventSender::new(tx);
        sender
            .publish(Event::PartCreated {
                part_id: 1,
                code: "P-1".into(),
            })
            .await;
        drop(sender);
        handle.await.unwrap();
    }
}
