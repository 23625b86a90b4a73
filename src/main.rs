use clap::{Parser, Subcommand};
use nfe_tracker::config::Config;
use nfe_tracker::db::SqliteStore;
use nfe_tracker::geocoding::{
    normalize, AddressResolver, FsGeocodeCache, GeocodeProvider, NominatimClient,
};
use nfe_tracker::ingest::IngestUseCase;
use nfe_tracker::logging;
use nfe_tracker::observability;
use nfe_tracker::server::{self, AppState};
use nfe_tracker::storage::DeliveryStore;
use nfe_tracker::types::RawAddress;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "nfe_tracker")]
#[command(about = "NF-e parcel delivery tracker")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    Serve {
        /// Listen address (overrides the config file), e.g. 0.0.0.0:3001
        #[arg(long)]
        addr: Option<String>,
    },
    /// Ingest a single NF-e XML document from disk
    Ingest {
        /// Path to the XML file
        file: PathBuf,
    },
    /// Resolve an address to coordinates from the command line
    Geocode {
        #[arg(long, default_value = "")]
        street: String,
        #[arg(long, default_value = "")]
        number: String,
        #[arg(long, default_value = "")]
        neighborhood: String,
        #[arg(long, default_value = "")]
        city: String,
        #[arg(long, default_value = "")]
        state: String,
        #[arg(long, default_value = "")]
        cep: String,
    },
}

struct Services {
    resolver: AddressResolver,
    provider: Arc<dyn GeocodeProvider>,
}

fn build_services(config: &Config) -> anyhow::Result<Services> {
    let cache = Arc::new(FsGeocodeCache::new(&config.cache.dir));
    let provider: Arc<dyn GeocodeProvider> =
        Arc::new(NominatimClient::new(config.geocoding.clone())?);
    let resolver = AddressResolver::new(cache, provider.clone());
    Ok(Services { resolver, provider })
}

fn build_state(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let services = build_services(config)?;
    let store: Arc<dyn DeliveryStore> = Arc::new(SqliteStore::open_at(&config.storage.db_path)?);
    let ingest = IngestUseCase::new(services.resolver, services.provider, store.clone());
    Ok(Arc::new(AppState { ingest, store }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load_from(&cli.config)?;

    match cli.command {
        Commands::Serve { addr } => {
            observability::init()?;
            let state = build_state(&config)?;
            let addr: SocketAddr = addr
                .unwrap_or_else(|| config.server.listen_addr.clone())
                .parse()?;
            info!("starting server");
            server::start_server(state, addr).await?;
        }
        Commands::Ingest { file } => {
            let state = build_state(&config)?;
            let xml = std::fs::read_to_string(&file)?;
            let outcome = state.ingest.ingest_document(&xml).await?;
            println!("📦 Delivery registered: {}", outcome.delivery.invoice_key);
            match outcome.coordinates {
                Some(coordinate) => {
                    println!("   Coordinates: {}, {}", coordinate.lat, coordinate.lng)
                }
                None => println!("   Coordinates: unresolved"),
            }
        }
        Commands::Geocode {
            street,
            number,
            neighborhood,
            city,
            state,
            cep,
        } => {
            let services = build_services(&config)?;
            let normalized = normalize(&RawAddress {
                street,
                number,
                neighborhood,
                city,
                state,
                postal_code: cep,
            });

            let mut coordinates = services.resolver.resolve(&normalized).await;
            if coordinates.is_none() && !normalized.postal_code.is_empty() {
                coordinates = services
                    .provider
                    .lookup_postal_code(&normalized.postal_code)
                    .await;
            }

            match coordinates {
                Some(coordinate) => println!("📍 {}, {}", coordinate.lat, coordinate.lng),
                None => println!("⚠️  Address could not be resolved"),
            }
        }
    }

    Ok(())
}
