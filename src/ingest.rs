use crate::constants::STATUS_RECEIVED;
use crate::error::{Result, TrackerError};
use crate::geocoding::client::GeocodeProvider;
use crate::geocoding::normalize::normalize;
use crate::geocoding::resolver::AddressResolver;
use crate::nfe;
use crate::observability;
use crate::storage::DeliveryStore;
use crate::types::{Delivery, DeliveryEvent, GeoCoordinate};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of ingesting one NF-e document.
#[derive(Debug)]
pub struct IngestOutcome {
    pub delivery: Delivery,
    pub coordinates: Option<GeoCoordinate>,
}

/// Use case for turning an uploaded NF-e document into a stored delivery:
/// parse, dedupe, normalize, geocode, persist, and open the status timeline.
pub struct IngestUseCase {
    resolver: AddressResolver,
    provider: Arc<dyn GeocodeProvider>,
    store: Arc<dyn DeliveryStore>,
}

impl IngestUseCase {
    pub fn new(
        resolver: AddressResolver,
        provider: Arc<dyn GeocodeProvider>,
        store: Arc<dyn DeliveryStore>,
    ) -> Self {
        Self {
            resolver,
            provider,
            store,
        }
    }

    pub async fn ingest_document(&self, xml: &str) -> Result<IngestOutcome> {
        let document = match nfe::parse_nfe_xml(xml) {
            Ok(document) => document,
            Err(err) => {
                observability::ingest::rejected();
                return Err(err);
            }
        };

        if self
            .store
            .get_delivery_by_key(&document.invoice_key)
            .await?
            .is_some()
        {
            observability::ingest::duplicate();
            return Err(TrackerError::DuplicateDelivery(document.invoice_key));
        }

        let normalized = normalize(&document.address);
        let mut coordinates = self.resolver.resolve(&normalized).await;

        // Last resort: the postal-code chain (structured lookup, then
        // free-text search with the structured fields).
        if coordinates.is_none() && !normalized.postal_code.is_empty() {
            observability::geocode::postal_fallback();
            coordinates = self
                .provider
                .lookup_postal_code(&normalized.postal_code)
                .await;
        }

        if coordinates.is_none() {
            warn!(
                invoice_key = %document.invoice_key,
                "address could not be geocoded, storing delivery without coordinates"
            );
        }

        let mut delivery = Delivery {
            id: None,
            invoice_key: document.invoice_key,
            recipient_name: document.recipient_name,
            address: normalized.as_raw(),
            coordinates,
            created_at: Utc::now(),
        };
        let delivery_id = self.store.create_delivery(&mut delivery).await?;

        let mut event = DeliveryEvent {
            id: None,
            delivery_id,
            status: STATUS_RECEIVED.to_string(),
            event_date: Utc::now().naive_utc(),
        };
        self.store.create_event(&mut event).await?;

        observability::ingest::accepted();
        info!(
            invoice_key = %delivery.invoice_key,
            geocoded = coordinates.is_some(),
            "delivery registered"
        );

        Ok(IngestOutcome {
            delivery,
            coordinates,
        })
    }
}
