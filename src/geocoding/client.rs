use crate::config::GeocodingConfig;
use crate::error::Result;
use crate::types::GeoCoordinate;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Outbound port for the external geocoding providers.
///
/// Both lookups collapse every ordinary failure mode (timeout, non-2xx,
/// malformed JSON, empty result) into `None`; they never error.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    async fn lookup_free_text(&self, query: &str) -> Option<GeoCoordinate>;
    async fn lookup_postal_code(&self, postal_code: &str) -> Option<GeoCoordinate>;
}

/// One element of a Nominatim search response. Coordinates arrive as numeric
/// strings.
#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

/// ViaCEP postal-code record. A truthy `erro` field means "not found"; the
/// service has emitted both boolean and string forms over time.
#[derive(Debug, Deserialize)]
struct ViaCepAddress {
    #[serde(default)]
    logradouro: String,
    #[serde(default)]
    localidade: String,
    #[serde(default)]
    uf: String,
    #[serde(default)]
    cep: String,
    #[serde(default)]
    erro: Option<serde_json::Value>,
}

impl ViaCepAddress {
    fn not_found(&self) -> bool {
        match &self.erro {
            None => false,
            Some(serde_json::Value::Bool(flag)) => *flag,
            Some(serde_json::Value::String(text)) => text == "true",
            Some(serde_json::Value::Null) => false,
            Some(_) => true,
        }
    }
}

/// Client for the free-text geocoding endpoint (Nominatim) and the
/// postal-code lookup service (ViaCEP).
pub struct NominatimClient {
    client: reqwest::Client,
    config: GeocodingConfig,
}

impl NominatimClient {
    /// Builds the HTTP client up front; an invalid configuration fails fast
    /// here rather than during request handling.
    pub fn new(config: GeocodingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self { client, config })
    }

    async fn search(&self, params: &[(&str, &str)]) -> Option<GeoCoordinate> {
        let url = format!(
            "{}/search",
            self.config.nominatim_endpoint.trim_end_matches('/')
        );
        let response = match self.client.get(&url).query(params).send().await {
            Ok(response) => response,
            Err(err) => {
                debug!("geocoding request failed: {err}");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(status = %response.status(), "geocoding endpoint returned non-success");
            return None;
        }
        let places: Vec<NominatimPlace> = match response.json().await {
            Ok(places) => places,
            Err(err) => {
                debug!("geocoding response was not valid JSON: {err}");
                return None;
            }
        };
        let place = places.into_iter().next()?;
        Some(GeoCoordinate {
            lat: place.lat.parse().ok()?,
            lng: place.lon.parse().ok()?,
        })
    }

    async fn fetch_postal_address(&self, cep: &str) -> Option<ViaCepAddress> {
        let url = format!(
            "{}/ws/{}/json/",
            self.config.viacep_endpoint.trim_end_matches('/'),
            cep
        );
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                debug!("postal-code lookup failed: {err}");
                return None;
            }
        };
        if !response.status().is_success() {
            debug!(status = %response.status(), "postal-code endpoint returned non-success");
            return None;
        }
        let address: ViaCepAddress = match response.json().await {
            Ok(address) => address,
            Err(err) => {
                debug!("postal-code response was not valid JSON: {err}");
                return None;
            }
        };
        if address.not_found() {
            debug!(cep, "postal code unknown to lookup service");
            return None;
        }
        Some(address)
    }
}

#[async_trait]
impl GeocodeProvider for NominatimClient {
    async fn lookup_free_text(&self, query: &str) -> Option<GeoCoordinate> {
        self.search(&[("q", query), ("format", "json"), ("limit", "1")])
            .await
    }

    /// Resolves the postal code to a structured address first, then re-queries
    /// the free-text endpoint with the structured fields.
    async fn lookup_postal_code(&self, postal_code: &str) -> Option<GeoCoordinate> {
        let digits: String = postal_code.chars().filter(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return None;
        }
        let address = self.fetch_postal_address(&digits).await?;
        self.search(&[
            ("street", address.logradouro.as_str()),
            ("city", address.localidade.as_str()),
            ("state", address.uf.as_str()),
            ("postalcode", address.cep.as_str()),
            ("country", "Brasil"),
            ("format", "json"),
            ("limit", "1"),
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viacep_erro_field_is_truthy_in_both_forms() {
        let boolean: ViaCepAddress = serde_json::from_str(r#"{"erro": true}"#).unwrap();
        assert!(boolean.not_found());

        let string: ViaCepAddress = serde_json::from_str(r#"{"erro": "true"}"#).unwrap();
        assert!(string.not_found());

        let found: ViaCepAddress = serde_json::from_str(
            r#"{"logradouro": "Avenida Paulista", "localidade": "São Paulo", "uf": "SP", "cep": "01310-100"}"#,
        )
        .unwrap();
        assert!(!found.not_found());
    }

    #[test]
    fn nominatim_place_parses_string_coordinates() {
        let places: Vec<NominatimPlace> = serde_json::from_str(
            r#"[{"lat": "-23.561414", "lon": "-46.655881", "display_name": "Avenida Paulista"}]"#,
        )
        .unwrap();
        let place = &places[0];
        assert_eq!(place.lat.parse::<f64>().unwrap(), -23.561414);
        assert_eq!(place.lon.parse::<f64>().unwrap(), -46.655881);
    }
}
