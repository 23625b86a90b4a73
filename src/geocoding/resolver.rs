use crate::geocoding::cache::{cache_key, GeocodeCache};
use crate::geocoding::client::GeocodeProvider;
use crate::geocoding::normalize::NormalizedAddress;
use crate::observability;
use crate::types::GeoCoordinate;
use std::sync::Arc;
use tracing::debug;

/// Address specificity levels, tried from most to least specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateLevel {
    StreetAndNumber,
    Street,
    Neighborhood,
    PostalCode,
}

impl CandidateLevel {
    pub fn label(&self) -> &'static str {
        match self {
            CandidateLevel::StreetAndNumber => "street_number",
            CandidateLevel::Street => "street",
            CandidateLevel::Neighborhood => "neighborhood",
            CandidateLevel::PostalCode => "postal_code",
        }
    }
}

/// One geocoding attempt: a query string at a given specificity level.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub level: CandidateLevel,
    pub query: String,
}

/// Builds the candidate queries in fixed priority order, skipping levels
/// whose required address parts are empty.
pub fn build_candidates(address: &NormalizedAddress) -> Vec<Candidate> {
    let NormalizedAddress {
        street,
        number,
        neighborhood,
        city,
        state,
        postal_code,
    } = address;

    let mut candidates = Vec::new();

    if !street.is_empty() && !number.is_empty() {
        candidates.push(Candidate {
            level: CandidateLevel::StreetAndNumber,
            query: format!("{street} {number}, {neighborhood}, {city} - {state}, Brasil"),
        });
    }

    if !street.is_empty() {
        candidates.push(Candidate {
            level: CandidateLevel::Street,
            query: format!("{street}, {neighborhood}, {city} - {state}, Brasil"),
        });
    }

    if !neighborhood.is_empty() && !city.is_empty() {
        candidates.push(Candidate {
            level: CandidateLevel::Neighborhood,
            query: format!("{neighborhood}, {city} - {state}, Brasil"),
        });
    }

    if !postal_code.is_empty() {
        candidates.push(Candidate {
            level: CandidateLevel::PostalCode,
            query: format!("{postal_code}, {city} - {state}, Brasil"),
        });
    }

    candidates
}

/// Orchestrates the fallback cascade over the cache and the free-text
/// provider.
pub struct AddressResolver {
    cache: Arc<dyn GeocodeCache>,
    provider: Arc<dyn GeocodeProvider>,
}

impl AddressResolver {
    pub fn new(cache: Arc<dyn GeocodeCache>, provider: Arc<dyn GeocodeProvider>) -> Self {
        Self { cache, provider }
    }

    /// Tries each candidate strictly in order: cache first (a hit
    /// short-circuits with no network call), then the free-text provider with
    /// write-through on success. A failed candidate is skipped, never fatal.
    /// Exhaustion returns `None`; an empty candidate list returns `None`
    /// without any I/O.
    pub async fn resolve(&self, address: &NormalizedAddress) -> Option<GeoCoordinate> {
        for candidate in build_candidates(address) {
            let key = cache_key(&candidate.query);

            if let Some(coordinate) = self.cache.get(&key) {
                observability::geocode::cache_hit();
                debug!(level = candidate.level.label(), "geocode cache hit");
                return Some(coordinate);
            }
            observability::geocode::cache_miss();

            match self.provider.lookup_free_text(&candidate.query).await {
                Some(coordinate) => {
                    self.cache.put(&key, &coordinate);
                    observability::geocode::resolved(candidate.level);
                    debug!(
                        level = candidate.level.label(),
                        lat = coordinate.lat,
                        lng = coordinate.lng,
                        "address resolved"
                    );
                    return Some(coordinate);
                }
                None => {
                    debug!(
                        level = candidate.level.label(),
                        query = %candidate.query,
                        "candidate did not resolve, falling back"
                    );
                }
            }
        }

        observability::geocode::unresolved();
        None
    }
}
