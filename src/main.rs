use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use schoolboard::openapi::ApiDoc;
use schoolboard::rate_limit::RateLimiterFacade;
use schoolboard::repo::Repo;
use schoolboard::storage::build_image_store;
use schoolboard::{config, AppConfig, AppState, SecurityHeaders};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env automatically only in debug builds; production sets the environment externally.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    validate_env_vars()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let cfg = AppConfig::from_env();
    info!("Bootstrapping school board server");
    info!("Frontend URL: {}", cfg.frontend_url);
    info!("School domains: {}", cfg.school_domains.join(", "));
    info!("Blind threshold: {} dislikes", cfg.blind_threshold);

    let repo = build_repo().await?;
    let image_store = build_image_store().await?;
    let rate_limiter = RateLimiterFacade::from_env();
    if !rate_limiter.limiter.enabled {
        info!("Rate limiting disabled");
    }
    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let state = AppState { repo, image_store, rate_limiter: Some(rate_limiter), config: cfg.clone() };
    let frontend = cfg.frontend_url.clone();

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend)
            // local dev servers
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://127.0.0.1:3000")
            .allow_any_header()
            .allowed_methods(["GET", "POST", "PATCH", "DELETE", "OPTIONS"])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(SecurityHeaders::from_env())
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind((cfg.bind_addr.as_str(), cfg.port))
    .with_context(|| format!("binding {}:{}", cfg.bind_addr, cfg.port))?;

    info!("Listening on http://{}:{}", cfg.bind_addr, cfg.port);
    server.run().await?;
    Ok(())
}

#[cfg(not(any(feature = "inmem-store", feature = "postgres-store")))]
compile_error!("enable a repository backend: `inmem-store` or `postgres-store`");

#[cfg(feature = "postgres-store")]
async fn build_repo() -> anyhow::Result<Arc<dyn Repo>> {
    use schoolboard::repo::pg::PgRepo;
    use sqlx::postgres::PgPoolOptions;

    let db_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set for postgres-store")?;
    let pool = PgPoolOptions::new().max_connections(5).connect(&db_url).await.context("connecting to Postgres")?;
    let repo = PgRepo::new(pool);
    repo.migrate().await.context("running migrations")?;
    info!("Using Postgres repository backend");
    Ok(Arc::new(repo))
}

#[cfg(all(feature = "inmem-store", not(feature = "postgres-store")))]
async fn build_repo() -> anyhow::Result<Arc<dyn Repo>> {
    use schoolboard::repo::inmem::InMemRepo;

    info!("Using in-memory repository backend");
    Ok(Arc::new(InMemRepo::new()))
}

/// Validate that required environment variables are set.
fn validate_env_vars() -> anyhow::Result<()> {
    let secret = std::env::var("JWT_SECRET")
        .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?;
    if secret.len() < 32 {
        anyhow::bail!("JWT_SECRET must be at least 32 characters long");
    }
    Ok(())
}
