//! Metrics catalog for the delivery tracker.
//!
//! Counter names follow Prometheus conventions and are listed in one enum so
//! there are no magic strings at the call sites.

use once_cell::sync::OnceCell;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    IngestAccepted,
    IngestRejected,
    IngestDuplicate,
    GeocodeCacheHit,
    GeocodeCacheMiss,
    GeocodeResolved,
    GeocodeUnresolved,
    GeocodePostalFallback,
    WebhookAccepted,
    WebhookUnknownKey,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::IngestAccepted => "nfe_ingest_accepted_total",
            MetricName::IngestRejected => "nfe_ingest_rejected_total",
            MetricName::IngestDuplicate => "nfe_ingest_duplicate_total",
            MetricName::GeocodeCacheHit => "nfe_geocode_cache_hit_total",
            MetricName::GeocodeCacheMiss => "nfe_geocode_cache_miss_total",
            MetricName::GeocodeResolved => "nfe_geocode_resolved_total",
            MetricName::GeocodeUnresolved => "nfe_geocode_unresolved_total",
            MetricName::GeocodePostalFallback => "nfe_geocode_postal_fallback_total",
            MetricName::WebhookAccepted => "nfe_webhook_accepted_total",
            MetricName::WebhookUnknownKey => "nfe_webhook_unknown_key_total",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static HANDLE: OnceCell<metrics_exporter_prometheus::PrometheusHandle> = OnceCell::new();

/// Installs the Prometheus recorder. Call once at startup, before serving.
pub fn init() -> Result<(), metrics_exporter_prometheus::BuildError> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;
    HANDLE.set(handle).ok();
    Ok(())
}

/// Renders the current metrics in Prometheus exposition format.
pub fn render() -> Option<String> {
    HANDLE.get().map(|handle| handle.render())
}

pub mod ingest {
    use super::MetricName;

    pub fn accepted() {
        ::metrics::counter!(MetricName::IngestAccepted.as_str()).increment(1);
    }

    pub fn rejected() {
        ::metrics::counter!(MetricName::IngestRejected.as_str()).increment(1);
    }

    pub fn duplicate() {
        ::metrics::counter!(MetricName::IngestDuplicate.as_str()).increment(1);
    }
}

pub mod geocode {
    use super::MetricName;
    use crate::geocoding::resolver::CandidateLevel;

    pub fn cache_hit() {
        ::metrics::counter!(MetricName::GeocodeCacheHit.as_str()).increment(1);
    }

    pub fn cache_miss() {
        ::metrics::counter!(MetricName::GeocodeCacheMiss.as_str()).increment(1);
    }

    /// Records a successful resolution, labeled with the candidate level that
    /// produced it.
    pub fn resolved(level: CandidateLevel) {
        ::metrics::counter!(MetricName::GeocodeResolved.as_str(), "level" => level.label())
            .increment(1);
    }

    pub fn unresolved() {
        ::metrics::counter!(MetricName::GeocodeUnresolved.as_str()).increment(1);
    }

    pub fn postal_fallback() {
        ::metrics::counter!(MetricName::GeocodePostalFallback.as_str()).increment(1);
    }
}

pub mod webhook {
    use super::MetricName;

    pub fn accepted() {
        ::metrics::counter!(MetricName::WebhookAccepted.as_str()).increment(1);
    }

    pub fn unknown_key() {
        ::metrics::counter!(MetricName::WebhookUnknownKey.as_str()).increment(1);
    }
}
