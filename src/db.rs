use crate::constants::STATUS_DELIVERED_PREFIX;
use crate::error::Result;
use crate::storage::DeliveryStore;
use crate::types::{Delivery, DeliveryEvent, DeliveryMetrics, GeoCoordinate, RawAddress};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

const EVENT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// SQLite-backed delivery store. One connection behind a mutex; the access
/// pattern is short single statements, not long transactions.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS deliveries (
                id             TEXT PRIMARY KEY,
                invoice_key    TEXT NOT NULL UNIQUE,
                recipient_name TEXT NOT NULL,
                street         TEXT NOT NULL,
                number         TEXT NOT NULL,
                neighborhood   TEXT NOT NULL,
                city           TEXT NOT NULL,
                state          TEXT NOT NULL,
                postal_code    TEXT NOT NULL,
                lat            REAL,
                lng            REAL,
                created_at     TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS delivery_events (
                id          TEXT PRIMARY KEY,
                delivery_id TEXT NOT NULL REFERENCES deliveries(id),
                status      TEXT NOT NULL,
                event_date  TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_delivery_events_delivery
                ON delivery_events(delivery_id);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_delivery(row: &Row<'_>) -> rusqlite::Result<Delivery> {
        let id: String = row.get(0)?;
        let created_at: String = row.get(11)?;
        let lat: Option<f64> = row.get(9)?;
        let lng: Option<f64> = row.get(10)?;
        Ok(Delivery {
            id: Some(parse_uuid(0, &id)?),
            invoice_key: row.get(1)?,
            recipient_name: row.get(2)?,
            address: RawAddress {
                street: row.get(3)?,
                number: row.get(4)?,
                neighborhood: row.get(5)?,
                city: row.get(6)?,
                state: row.get(7)?,
                postal_code: row.get(8)?,
            },
            coordinates: match (lat, lng) {
                (Some(lat), Some(lng)) => Some(GeoCoordinate { lat, lng }),
                _ => None,
            },
            created_at: parse_created_at(11, &created_at)?,
        })
    }

    fn row_to_event(row: &Row<'_>) -> rusqlite::Result<DeliveryEvent> {
        let id: String = row.get(0)?;
        let delivery_id: String = row.get(1)?;
        let event_date: String = row.get(3)?;
        Ok(DeliveryEvent {
            id: Some(parse_uuid(0, &id)?),
            delivery_id: parse_uuid(1, &delivery_id)?,
            status: row.get(2)?,
            event_date: NaiveDateTime::parse_from_str(&event_date, EVENT_DATE_FORMAT)
                .map_err(|err| conversion_error(3, err))?,
        })
    }
}

fn parse_uuid(column: usize, value: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(value).map_err(|err| conversion_error(column, err))
}

fn parse_created_at(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| conversion_error(column, err))
}

fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

const SELECT_DELIVERY: &str = "SELECT id, invoice_key, recipient_name, street, number, \
     neighborhood, city, state, postal_code, lat, lng, created_at FROM deliveries";

#[async_trait]
impl DeliveryStore for SqliteStore {
    async fn create_delivery(&self, delivery: &mut Delivery) -> Result<Uuid> {
        let id = Uuid::new_v4();
        delivery.id = Some(id);

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO deliveries (id, invoice_key, recipient_name, street, number, \
             neighborhood, city, state, postal_code, lat, lng, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                id.to_string(),
                delivery.invoice_key,
                delivery.recipient_name,
                delivery.address.street,
                delivery.address.number,
                delivery.address.neighborhood,
                delivery.address.city,
                delivery.address.state,
                delivery.address.postal_code,
                delivery.coordinates.map(|c| c.lat),
                delivery.coordinates.map(|c| c.lng),
                delivery.created_at.to_rfc3339(),
            ],
        )?;
        Ok(id)
    }

    async fn get_delivery_by_key(&self, invoice_key: &str) -> Result<Option<Delivery>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!("{SELECT_DELIVERY} WHERE invoice_key = ?1"))?;
        let mut rows = stmt.query_map(params![invoice_key], Self::row_to_delivery)?;
        match rows.next() {
            Some(delivery) => Ok(Some(delivery?)),
            None => Ok(None),
        }
    }

    async fn list_deliveries(&self, limit: u32, offset: u32) -> Result<Vec<Delivery>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "{SELECT_DELIVERY} ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt.query_map(params![limit, offset], Self::row_to_delivery)?;
        let mut deliveries = Vec::new();
        for delivery in rows {
            deliveries.push(delivery?);
        }
        Ok(deliveries)
    }

    async fn create_event(&self, event: &mut DeliveryEvent) -> Result<()> {
        let id = Uuid::new_v4();
        event.id = Some(id);

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO delivery_events (id, delivery_id, status, event_date) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                id.to_string(),
                event.delivery_id.to_string(),
                event.status,
                event.event_date.format(EVENT_DATE_FORMAT).to_string(),
            ],
        )?;
        Ok(())
    }

    async fn list_events(&self, delivery_id: Uuid) -> Result<Vec<DeliveryEvent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, delivery_id, status, event_date FROM delivery_events \
             WHERE delivery_id = ?1 ORDER BY event_date DESC",
        )?;
        let rows = stmt.query_map(params![delivery_id.to_string()], Self::row_to_event)?;
        let mut events = Vec::new();
        for event in rows {
            events.push(event?);
        }
        Ok(events)
    }

    async fn metrics(&self) -> Result<DeliveryMetrics> {
        let conn = self.conn.lock().unwrap();
        let total: u64 =
            conn.query_row("SELECT COUNT(*) FROM deliveries", [], |row| row.get(0))?;
        let finalized: u64 = conn.query_row(
            "SELECT COUNT(DISTINCT delivery_id) FROM delivery_events WHERE status LIKE ?1",
            params![format!("{STATUS_DELIVERED_PREFIX}%")],
            |row| row.get(0),
        )?;
        Ok(DeliveryMetrics {
            total,
            finalized,
            in_progress: total - finalized,
        })
    }
}
