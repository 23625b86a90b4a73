//! Address-to-coordinate resolution: normalization, a persistent geocode
//! cache, the external provider client, and the fallback-cascade resolver.

pub mod cache;
pub mod client;
pub mod normalize;
pub mod resolver;

pub use cache::{cache_key, FsGeocodeCache, GeocodeCache, MemoryGeocodeCache};
pub use client::{GeocodeProvider, NominatimClient};
pub use normalize::{normalize, NormalizedAddress};
pub use resolver::{build_candidates, AddressResolver, Candidate, CandidateLevel};
