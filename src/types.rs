use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Recipient address exactly as extracted from an NF-e document.
///
/// Every field is untrusted free text and may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAddress {
    pub street: String,
    pub number: String,
    pub neighborhood: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
}

/// A latitude/longitude pair as returned by the geocoding providers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    pub lat: f64,
    pub lng: f64,
}

/// A parcel delivery derived from one NF-e document.
///
/// The address holds the normalized field values; coordinates stay `None`
/// when geocoding could not resolve the address, which is a valid, storable
/// state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: Option<Uuid>,
    pub invoice_key: String,
    pub recipient_name: String,
    pub address: RawAddress,
    pub coordinates: Option<GeoCoordinate>,
    pub created_at: DateTime<Utc>,
}

/// One entry in a delivery's status timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub id: Option<Uuid>,
    pub delivery_id: Uuid,
    pub status: String,
    pub event_date: NaiveDateTime,
}

/// Aggregate counters exposed by the metrics endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryMetrics {
    #[serde(rename = "total_entregas")]
    pub total: u64,
    #[serde(rename = "entregas_finalizadas")]
    pub finalized: u64,
    #[serde(rename = "entregas_em_andamento")]
    pub in_progress: u64,
}
