use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use parlor_api::{
    config::{image_models_from_env, Config},
    handlers::stream,
    routes::{health, images, messages, threads},
    state::AppState,
};
use parlor_chat::{
    AzureClientFactory, ChatOrchestrator, CompletionRunner, ContextAssembler, ImageToolExecutor,
    LexicalClassifier, RunnerConfig, TokenCounter,
};
use parlor_llm::{AzureImageClient, ImageModelCatalog};
use parlor_persist::{InsecureBase64Cipher, PersistClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let config = Config::load()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    init_logging(&config);

    tracing::info!("Starting Parlor API server");
    tracing::info!("Config loaded: {}:{}", config.server.host, config.server.port);

    // Cipher seam: the KMS-backed implementation lives outside this
    // service; the dev fallback only obfuscates
    let cipher = Arc::new(InsecureBase64Cipher);

    tracing::info!("Connecting to MongoDB");
    let persist = Arc::new(
        PersistClient::new(&config.mongodb_uri, &config.mongodb.database, cipher).await?,
    );
    tracing::info!("MongoDB connected");

    let image_models = Arc::new(ImageModelCatalog::new(image_models_from_env()));
    if image_models.is_empty() {
        tracing::warn!("no image generation models configured; create_img will report this");
    } else {
        tracing::info!("image models configured: {}", image_models.describe());
    }

    let assembler = ContextAssembler::new(
        Arc::new(persist.messages().clone()),
        Arc::new(persist.documents().clone()),
        Arc::new(parlor_chat::NullSearch),
        Arc::new(parlor_chat::NullExtensions),
        image_models.clone(),
    );

    let image_tool = Arc::new(ImageToolExecutor::new(
        Arc::new(AzureImageClient::new()),
        Arc::new(persist.images().clone()),
        image_models.clone(),
        Arc::new(LexicalClassifier::new()),
    ));

    let factory = Arc::new(AzureClientFactory);
    let runner = Arc::new(CompletionRunner::new(
        factory.clone(),
        image_tool,
        RunnerConfig::default(),
    ));

    let orchestrator = ChatOrchestrator::new(
        assembler,
        runner,
        persist.clone(),
        persist.clone(),
        factory,
        TokenCounter::new()?,
        parlor_chat::risk_threshold_from_env(),
    );

    let state = AppState::new(config.clone(), persist, orchestrator, image_models);

    let app = build_router(state.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health
        .route("/health", get(health::health_check))
        // Threads
        .route(
            "/threads",
            post(threads::create_thread).get(threads::list_threads),
        )
        .route(
            "/threads/:thread_id",
            get(threads::get_thread).delete(threads::delete_thread),
        )
        .route("/threads/:thread_id/model", put(threads::update_thread_model))
        .route(
            "/threads/:thread_id/image-model",
            put(threads::update_thread_image_model),
        )
        .route("/threads/:thread_id/bookmark", put(threads::set_bookmarked))
        .route(
            "/threads/:thread_id/extensions/:extension_id",
            post(threads::add_extension).delete(threads::remove_extension),
        )
        .route("/threads/:thread_id/title", post(threads::generate_title))
        // Messages
        .route(
            "/threads/:thread_id/messages",
            get(messages::list_messages).post(stream::send_message_stream),
        )
        // Generated images
        .route(
            "/threads/:thread_id/images/:filename",
            get(images::get_image),
        );

    Router::new()
        .merge(api_routes)
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(300))) // 5 min for streaming
        .layer(CompressionLayer::new())
        .layer(build_cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors_layer(config: &Config) -> CorsLayer {
    if config.cors.enabled {
        let mut cors = CorsLayer::new()
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers(Any);

        if config.cors.origins.iter().any(|o| o == "*") {
            cors = cors.allow_origin(Any);
        } else {
            for origin in &config.cors.origins {
                if let Ok(parsed_origin) = origin.parse::<axum::http::HeaderValue>() {
                    cors = cors.allow_origin(parsed_origin);
                }
            }
        }

        cors
    } else {
        CorsLayer::permissive()
    }
}

fn init_logging(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.logging.format.as_str() {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }
}
