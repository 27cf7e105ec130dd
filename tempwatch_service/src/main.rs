use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use tempwatch_service::alert::engine::AlertEngine;
use tempwatch_service::bot::Bot;
use tempwatch_service::commands::CommandHandler;
use tempwatch_service::config::{self, Config, Provider, StoreBackend};
use tempwatch_service::health;
use tempwatch_service::ingest::iem::IemSource;
use tempwatch_service::ingest::open_meteo::OpenMeteoSource;
use tempwatch_service::ingest::{self, Geocoder, TemperatureSource};
use tempwatch_service::logging::{self, Component};
use tempwatch_service::monitor::{MonitorContext, MonitorRegistry};
use tempwatch_service::notify::telegram::TelegramClient;
use tempwatch_service::store::{JsonFileStore, NullStore, PostgresStore, SnapshotStore};

fn main() -> Result<(), Box<dyn Error>> {
    dotenv::dotenv().ok();

    let config_path = config::config_path();
    let mut config = Config::load(&config_path)?;
    config.apply_env_overrides()?;

    let _log_guard = logging::init_logger(
        config.logging.level,
        config.logging.file.as_deref(),
        config.logging.timestamps,
    )?;
    logging::info(
        Component::System,
        None,
        &format!("Configuration: {}", config_path.display()),
    );

    // Weather provider
    let http = ingest::build_http_client(config.source_timeout())?;
    let (source, geocoder): (Arc<dyn TemperatureSource>, Option<Arc<dyn Geocoder>>) =
        match config.source.provider {
            Provider::OpenMeteo => {
                let open_meteo = Arc::new(OpenMeteoSource::new(http));
                let geocoder: Arc<dyn Geocoder> = open_meteo.clone();
                (open_meteo, Some(geocoder))
            }
            Provider::Iem => {
                let iem: Arc<dyn TemperatureSource> = Arc::new(IemSource::new(http));
                (iem, None)
            }
        };

    // Chat transport
    let token = config::bot_token()?;
    let telegram = Arc::new(match &config.telegram.api_base {
        Some(base) => TelegramClient::with_base_url(base, &token, config.telegram_poll_timeout())?,
        None => TelegramClient::new(&token, config.telegram_poll_timeout())?,
    });

    // Persistence
    let store: Arc<dyn SnapshotStore> = match config.store.backend {
        StoreBackend::Json => Arc::new(JsonFileStore::open(&config.store.path)?),
        StoreBackend::Postgres => Arc::new(PostgresStore::connect(&config::database_url()?)?),
        StoreBackend::None => Arc::new(NullStore),
    };

    let engine = Arc::new(AlertEngine::new(
        source,
        telegram.clone(),
        config.engine_settings(),
    ));
    let mut registry = MonitorRegistry::new(MonitorContext {
        engine,
        store: Arc::clone(&store),
        default_location: config.default_location(),
        interval: config.tick_interval(),
    });

    let snapshots = store.load_all()?;
    let total = snapshots.len();
    let restored = registry.restore(snapshots);
    logging::log_restore_summary(total, restored, total - restored);
    logging::info(
        Component::Engine,
        None,
        &format!(
            "{} chat(s) ticking every {}s, default location {}",
            registry.ticking_chats(),
            config.engine.interval_secs,
            config.default_location()
        ),
    );

    if config.health.enabled {
        health::spawn_health_server(SocketAddr::from(([0, 0, 0, 0], config.health.port)))?;
    }

    let handler = CommandHandler::new(registry, geocoder);
    Bot::new(&telegram, handler).run()
}
