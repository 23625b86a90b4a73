use async_trait::async_trait;
use nfe_tracker::constants::STATUS_RECEIVED;
use nfe_tracker::error::TrackerError;
use nfe_tracker::geocoding::{
    build_candidates, cache_key, AddressResolver, FsGeocodeCache, GeocodeCache, GeocodeProvider,
};
use nfe_tracker::ingest::IngestUseCase;
use nfe_tracker::storage::{DeliveryStore, InMemoryStore};
use nfe_tracker::types::GeoCoordinate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

const KEY: &str = "35200714200166000187550010000000046550000046";

const PAULISTA: GeoCoordinate = GeoCoordinate {
    lat: -23.561414,
    lng: -46.655881,
};

fn sample_xml(key: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<nfeProc xmlns="http://www.portalfiscal.inf.br/nfe">
  <NFe>
    <infNFe Id="NFe{key}" versao="4.00">
      <emit>
        <xNome>Distribuidora Alfa LTDA</xNome>
      </emit>
      <dest>
        <xNome>Maria Oliveira</xNome>
        <enderDest>
          <xLgr>AV PAULISTA</xLgr>
          <nro>0</nro>
          <xBairro>BELA VISTA</xBairro>
          <xMun>sao paulo</xMun>
          <UF>sp</UF>
          <CEP>01310-100</CEP>
        </enderDest>
      </dest>
    </infNFe>
  </NFe>
</nfeProc>"#
    )
}

/// Provider stub answering from a fixed table, with call counters.
struct StubProvider {
    free_text: HashMap<String, GeoCoordinate>,
    postal: HashMap<String, GeoCoordinate>,
    free_text_calls: AtomicUsize,
    postal_calls: AtomicUsize,
}

impl StubProvider {
    fn new(
        free_text: Vec<(&str, GeoCoordinate)>,
        postal: Vec<(&str, GeoCoordinate)>,
    ) -> Arc<Self> {
        Arc::new(Self {
            free_text: free_text
                .into_iter()
                .map(|(query, coordinate)| (query.to_string(), coordinate))
                .collect(),
            postal: postal
                .into_iter()
                .map(|(cep, coordinate)| (cep.to_string(), coordinate))
                .collect(),
            free_text_calls: AtomicUsize::new(0),
            postal_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl GeocodeProvider for StubProvider {
    async fn lookup_free_text(&self, query: &str) -> Option<GeoCoordinate> {
        self.free_text_calls.fetch_add(1, Ordering::SeqCst);
        self.free_text.get(query).copied()
    }

    async fn lookup_postal_code(&self, postal_code: &str) -> Option<GeoCoordinate> {
        self.postal_calls.fetch_add(1, Ordering::SeqCst);
        self.postal.get(postal_code).copied()
    }
}

fn use_case(
    cache: Arc<dyn GeocodeCache>,
    provider: Arc<StubProvider>,
    store: Arc<dyn DeliveryStore>,
) -> IngestUseCase {
    let resolver = AddressResolver::new(cache, provider.clone());
    IngestUseCase::new(resolver, provider, store)
}

#[tokio::test]
async fn ingest_geocodes_stores_and_opens_timeline() {
    let cache_dir = tempdir().unwrap();
    let cache = Arc::new(FsGeocodeCache::new(cache_dir.path()));
    // The document's number is the "0" sentinel, so the first candidate is
    // the street-level query.
    let provider = StubProvider::new(
        vec![(
            "Avenida Paulista, Bela Vista, Sao Paulo - SP, Brasil",
            PAULISTA,
        )],
        vec![],
    );
    let store: Arc<dyn DeliveryStore> = Arc::new(InMemoryStore::new());

    let outcome = use_case(cache.clone(), provider.clone(), store.clone())
        .ingest_document(&sample_xml(KEY))
        .await
        .unwrap();

    assert_eq!(outcome.delivery.invoice_key, KEY);
    assert_eq!(outcome.delivery.recipient_name, "Maria Oliveira");
    assert_eq!(outcome.delivery.address.street, "Avenida Paulista");
    assert_eq!(outcome.delivery.address.number, "");
    assert_eq!(outcome.delivery.address.postal_code, "01310100");
    assert_eq!(outcome.coordinates, Some(PAULISTA));

    // Stored with coordinates and an opening timeline event.
    let stored = store.get_delivery_by_key(KEY).await.unwrap().unwrap();
    assert_eq!(stored.coordinates, Some(PAULISTA));
    let events = store.list_events(stored.id.unwrap()).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].status, STATUS_RECEIVED);

    // The successful candidate was written through to the durable cache.
    let candidates = build_candidates(&nfe_tracker::geocoding::normalize(
        &stored.address,
    ));
    assert_eq!(candidates.len(), 3);
    assert_eq!(
        cache.get(&cache_key(&candidates[0].query)),
        Some(PAULISTA)
    );
}

#[tokio::test]
async fn second_ingest_of_same_key_is_a_conflict() {
    let cache_dir = tempdir().unwrap();
    let cache = Arc::new(FsGeocodeCache::new(cache_dir.path()));
    let provider = StubProvider::new(vec![], vec![]);
    let store: Arc<dyn DeliveryStore> = Arc::new(InMemoryStore::new());
    let ingest = use_case(cache, provider, store);

    ingest.ingest_document(&sample_xml(KEY)).await.unwrap();
    let err = ingest.ingest_document(&sample_xml(KEY)).await.unwrap_err();
    assert!(matches!(err, TrackerError::DuplicateDelivery(key) if key == KEY));
}

#[tokio::test]
async fn unresolvable_address_still_stores_the_delivery() {
    let cache_dir = tempdir().unwrap();
    let cache = Arc::new(FsGeocodeCache::new(cache_dir.path()));
    let provider = StubProvider::new(vec![], vec![]);
    let store: Arc<dyn DeliveryStore> = Arc::new(InMemoryStore::new());

    let outcome = use_case(cache, provider.clone(), store.clone())
        .ingest_document(&sample_xml(KEY))
        .await
        .unwrap();

    assert!(outcome.coordinates.is_none());
    let stored = store.get_delivery_by_key(KEY).await.unwrap().unwrap();
    assert!(stored.coordinates.is_none());

    // Cascade exhausted all three candidates, then tried the postal chain.
    assert_eq!(provider.free_text_calls.load(Ordering::SeqCst), 3);
    assert_eq!(provider.postal_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn postal_chain_is_the_last_resort() {
    let cache_dir = tempdir().unwrap();
    let cache = Arc::new(FsGeocodeCache::new(cache_dir.path()));
    let provider = StubProvider::new(vec![], vec![("01310100", PAULISTA)]);
    let store: Arc<dyn DeliveryStore> = Arc::new(InMemoryStore::new());

    let outcome = use_case(cache, provider.clone(), store.clone())
        .ingest_document(&sample_xml(KEY))
        .await
        .unwrap();

    assert_eq!(outcome.coordinates, Some(PAULISTA));
    assert_eq!(provider.postal_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn repeated_queries_hit_the_durable_cache_across_instances() {
    let cache_dir = tempdir().unwrap();
    let provider = StubProvider::new(
        vec![(
            "Avenida Paulista, Bela Vista, Sao Paulo - SP, Brasil",
            PAULISTA,
        )],
        vec![],
    );

    {
        let cache = Arc::new(FsGeocodeCache::new(cache_dir.path()));
        let store: Arc<dyn DeliveryStore> = Arc::new(InMemoryStore::new());
        use_case(cache, provider.clone(), store)
            .ingest_document(&sample_xml(KEY))
            .await
            .unwrap();
    }
    assert_eq!(provider.free_text_calls.load(Ordering::SeqCst), 1);

    // A fresh resolver over the same cache directory resolves the same
    // address without another provider call.
    {
        let cache = Arc::new(FsGeocodeCache::new(cache_dir.path()));
        let store: Arc<dyn DeliveryStore> = Arc::new(InMemoryStore::new());
        let other_key = format!("{}0", &KEY[..43]);
        use_case(cache, provider.clone(), store)
            .ingest_document(&sample_xml(&other_key))
            .await
            .unwrap();
    }
    assert_eq!(provider.free_text_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_document_is_rejected_before_any_lookup() {
    let cache_dir = tempdir().unwrap();
    let cache = Arc::new(FsGeocodeCache::new(cache_dir.path()));
    let provider = StubProvider::new(vec![], vec![]);
    let store: Arc<dyn DeliveryStore> = Arc::new(InMemoryStore::new());

    let err = use_case(cache, provider.clone(), store)
        .ingest_document(&sample_xml("not-a-key"))
        .await
        .unwrap_err();

    assert!(matches!(err, TrackerError::InvalidDocument(_)));
    assert_eq!(provider.free_text_calls.load(Ordering::SeqCst), 0);
    assert_eq!(provider.postal_calls.load(Ordering::SeqCst), 0);
}
