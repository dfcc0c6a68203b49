use std::{net::SocketAddr, sync::Arc};

use color_eyre::eyre::WrapErr;
use lutruwita_server::{
    api::{self, AppState},
    auth::Authenticator,
    clients::init_reqwest_client,
    cloudinary::{CloudinaryClient, ImageHost},
    config::Config,
    ingest::surface::RoadIndex,
    rate_limit::RateLimits,
    route_service::RouteService,
    store::{
        MemoryProfileStore, MemoryRouteStore, PgProfileStore, PgRouteStore, ProfileStore,
        RouteStore,
    },
    user_service::UserService,
};
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lutruwita_server=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let http = init_reqwest_client()?;

    let (store, profiles) = init_store(&config).await?;
    let images: Option<Arc<dyn ImageHost>> = match &config.cloudinary {
        Some(cloudinary) => Some(Arc::new(CloudinaryClient::new(
            cloudinary.clone(),
            http.clone(),
        ))),
        None => {
            warn!("CLOUDINARY_CLOUD_NAME not set, photo uploads are disabled");
            None
        }
    };
    let roads = match &config.road_network_path {
        Some(path) => Some(Arc::new(RoadIndex::load(path).await?)),
        None => {
            warn!("ROAD_NETWORK_PATH not set, surface detection is disabled");
            None
        }
    };
    let authenticator = Arc::new(Authenticator::from_config(&config.auth).await?);

    let state = AppState {
        routes: RouteService::new(store, images.clone()),
        users: UserService::new(profiles),
        authenticator,
        images,
        roads,
        limits: RateLimits::new(config.public_rate_limit, config.authenticated_rate_limit),
    };

    let addr = config.bind_address()?;
    info!("Running on {addr}");
    axum::Server::bind(&addr)
        .serve(api::app(state).into_make_service_with_connect_info::<SocketAddr>())
        .await?;

    Ok(())
}

async fn init_store(
    config: &Config,
) -> color_eyre::Result<(Arc<dyn RouteStore>, Arc<dyn ProfileStore>)> {
    let Some(database_url) = &config.database_url else {
        warn!("DATABASE_URL not set, routes and profiles are kept in memory only");
        return Ok((
            Arc::new(MemoryRouteStore::new()),
            Arc::new(MemoryProfileStore::new()),
        ));
    };
    info!("Connecting to db");
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(database_url)
        .await
        .wrap_err("Failed to connect to the database")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .wrap_err("Failed to run migrations")?;
    info!("Connected");
    Ok((
        Arc::new(PgRouteStore::new(pool.clone())),
        Arc::new(PgProfileStore::new(pool)),
    ))
}
