use std::sync::Arc;

use redirx::crawlers::http::HttpPageFetcher;
use redirx::db::establish_connection_pool;
use redirx::embedder::build_embedder;
use redirx::models::config::ServerConfig;
use redirx::processing::ZMQMessage;
use redirx::processing::migration::{process_migration_message, process_review_message};
use redirx::processing::pipeline::Pipeline;
use redirx::repository::DieselRepository;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let pool = match establish_connection_pool(&config.database_url) {
        Ok(pool) => pool,
        Err(e) => {
            log::error!("Failed to establish database connection: {e}");
            std::process::exit(1);
        }
    };
    let repo = DieselRepository::new(pool);

    let fetcher = match HttpPageFetcher::new(&config.pipeline.fetch) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            log::error!("Failed to build HTTP client: {e}");
            std::process::exit(1);
        }
    };

    let embedder = match build_embedder(&config.pipeline.embedding) {
        Ok(embedder) => embedder,
        Err(e) => {
            log::error!("Failed to initialise embedder: {e}");
            std::process::exit(1);
        }
    };

    let pipeline = match Pipeline::new(config.pipeline.clone(), fetcher, embedder, repo) {
        Ok(pipeline) => Arc::new(pipeline),
        Err(e) => {
            log::error!("Invalid pipeline configuration: {e}");
            std::process::exit(1);
        }
    };

    let context = zmq::Context::new();
    let responder = match context.socket(zmq::PULL) {
        Ok(socket) => socket,
        Err(e) => {
            log::error!("Cannot create zmq socket: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = responder.bind(&config.zmq_address) {
        log::error!("Cannot bind to {}: {e}", config.zmq_address);
        std::process::exit(1);
    }
    log::info!("Listening on {}", config.zmq_address);

    loop {
        let msg = match responder.recv_bytes(0) {
            Ok(msg) => msg,
            Err(e) => {
                log::error!("Failed to receive message: {e}");
                continue;
            }
        };
        match serde_json::from_slice::<ZMQMessage>(&msg) {
            Ok(parsed) => {
                let pipeline = Arc::clone(&pipeline);
                tokio::spawn(async move {
                    match parsed {
                        ZMQMessage::Migration(request) => {
                            process_migration_message(request, &pipeline).await
                        }
                        ZMQMessage::Review(review) => {
                            process_review_message(review, pipeline.repository()).await
                        }
                    }
                });
            }
            Err(e) => log::error!("Failed to parse JSON: {e}"),
        }
    }
}
