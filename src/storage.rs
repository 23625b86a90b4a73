use crate::constants::STATUS_DELIVERED_PREFIX;
use crate::error::Result;
use crate::types::{Delivery, DeliveryEvent, DeliveryMetrics};
use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Storage trait for deliveries and their status timelines.
#[async_trait]
pub trait DeliveryStore: Send + Sync {
    /// Persists a new delivery, assigning and returning its id.
    async fn create_delivery(&self, delivery: &mut Delivery) -> Result<Uuid>;
    async fn get_delivery_by_key(&self, invoice_key: &str) -> Result<Option<Delivery>>;
    /// Newest deliveries first.
    async fn list_deliveries(&self, limit: u32, offset: u32) -> Result<Vec<Delivery>>;

    /// Appends a timeline event, assigning its id.
    async fn create_event(&self, event: &mut DeliveryEvent) -> Result<()>;
    /// Newest events first.
    async fn list_events(&self, delivery_id: Uuid) -> Result<Vec<DeliveryEvent>>;

    async fn metrics(&self) -> Result<DeliveryMetrics>;
}

/// In-memory storage implementation for development/testing
#[derive(Default)]
pub struct InMemoryStore {
    deliveries: Arc<Mutex<HashMap<Uuid, Delivery>>>,
    events: Arc<Mutex<HashMap<Uuid, DeliveryEvent>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeliveryStore for InMemoryStore {
    async fn create_delivery(&self, delivery: &mut Delivery) -> Result<Uuid> {
        let id = Uuid::new_v4();
        delivery.id = Some(id);

        let mut deliveries = self.deliveries.lock().unwrap();
        deliveries.insert(id, delivery.clone());

        debug!("created delivery {} with id {}", delivery.invoice_key, id);
        Ok(id)
    }

    async fn get_delivery_by_key(&self, invoice_key: &str) -> Result<Option<Delivery>> {
        let deliveries = self.deliveries.lock().unwrap();
        Ok(deliveries
            .values()
            .find(|delivery| delivery.invoice_key == invoice_key)
            .cloned())
    }

    async fn list_deliveries(&self, limit: u32, offset: u32) -> Result<Vec<Delivery>> {
        let deliveries = self.deliveries.lock().unwrap();
        let mut all: Vec<Delivery> = deliveries.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn create_event(&self, event: &mut DeliveryEvent) -> Result<()> {
        let id = Uuid::new_v4();
        event.id = Some(id);

        let mut events = self.events.lock().unwrap();
        events.insert(id, event.clone());

        debug!("created event for delivery {}", event.delivery_id);
        Ok(())
    }

    async fn list_events(&self, delivery_id: Uuid) -> Result<Vec<DeliveryEvent>> {
        let events = self.events.lock().unwrap();
        let mut matching: Vec<DeliveryEvent> = events
            .values()
            .filter(|event| event.delivery_id == delivery_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.event_date.cmp(&a.event_date));
        Ok(matching)
    }

    async fn metrics(&self) -> Result<DeliveryMetrics> {
        let total = self.deliveries.lock().unwrap().len() as u64;

        let events = self.events.lock().unwrap();
        let finalized = events
            .values()
            .filter(|event| event.status.starts_with(STATUS_DELIVERED_PREFIX))
            .map(|event| event.delivery_id)
            .collect::<HashSet<Uuid>>()
            .len() as u64;

        Ok(DeliveryMetrics {
            total,
            finalized,
            in_progress: total - finalized,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GeoCoordinate, RawAddress};
    use chrono::Utc;

    fn delivery(invoice_key: &str) -> Delivery {
        Delivery {
            id: None,
            invoice_key: invoice_key.to_string(),
            recipient_name: "Maria Oliveira".to_string(),
            address: RawAddress {
                street: "Avenida Paulista".to_string(),
                number: "".to_string(),
                neighborhood: "Bela Vista".to_string(),
                city: "Sao Paulo".to_string(),
                state: "SP".to_string(),
                postal_code: "01310100".to_string(),
            },
            coordinates: Some(GeoCoordinate {
                lat: -23.561414,
                lng: -46.655881,
            }),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_and_fetch_by_invoice_key() {
        let store = InMemoryStore::new();
        let mut d = delivery("1".repeat(44).as_str());
        let id = store.create_delivery(&mut d).await.unwrap();
        assert_eq!(d.id, Some(id));

        let found = store
            .get_delivery_by_key(&d.invoice_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, Some(id));
        assert!(store.get_delivery_by_key("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn events_are_listed_newest_first() {
        let store = InMemoryStore::new();
        let mut d = delivery("2".repeat(44).as_str());
        let id = store.create_delivery(&mut d).await.unwrap();

        for (status, date) in [
            ("Pedido recebido e em processamento.", "2026-08-01 08:00:00"),
            ("Saiu para entrega.", "2026-08-02 09:30:00"),
            ("Entrega realizada com sucesso.", "2026-08-02 14:10:00"),
        ] {
            let mut event = DeliveryEvent {
                id: None,
                delivery_id: id,
                status: status.to_string(),
                event_date: chrono::NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S")
                    .unwrap(),
            };
            store.create_event(&mut event).await.unwrap();
        }

        let events = store.list_events(id).await.unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].status, "Entrega realizada com sucesso.");
        assert_eq!(events[2].status, "Pedido recebido e em processamento.");
    }

    #[tokio::test]
    async fn metrics_count_finalized_deliveries_once() {
        let store = InMemoryStore::new();
        let mut first = delivery("3".repeat(44).as_str());
        let first_id = store.create_delivery(&mut first).await.unwrap();
        let mut second = delivery("4".repeat(44).as_str());
        store.create_delivery(&mut second).await.unwrap();

        // Two delivered events for the same delivery count once.
        for date in ["2026-08-02 14:10:00", "2026-08-02 15:00:00"] {
            let mut event = DeliveryEvent {
                id: None,
                delivery_id: first_id,
                status: "Entrega realizada com sucesso.".to_string(),
                event_date: chrono::NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S")
                    .unwrap(),
            };
            store.create_event(&mut event).await.unwrap();
        }

        let metrics = store.metrics().await.unwrap();
        assert_eq!(metrics.total, 2);
        assert_eq!(metrics.finalized, 1);
        assert_eq!(metrics.in_progress, 1);
    }

    #[tokio::test]
    async fn list_deliveries_paginates_newest_first() {
        let store = InMemoryStore::new();
        for digit in ["5", "6", "7"] {
            let mut d = delivery(digit.repeat(44).as_str());
            store.create_delivery(&mut d).await.unwrap();
        }

        let page = store.list_deliveries(2, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        let rest = store.list_deliveries(2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
    }
}
