use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ai_client::Claude;
use orgmind_api::{router, AppState};
use orgmind_common::Config;
use orgmind_engine::{Engine, EngineDeps, JsonlSource};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("orgmind=info".parse()?))
        .init();

    let config = Config::from_env();
    config.log_redacted();

    let claude = Claude::new(&config.anthropic_api_key, &config.model);
    let engine = Engine::new(
        EngineDeps::builder()
            .config(config.engine.clone())
            .source(Arc::new(JsonlSource))
            .capability(Arc::new(claude))
            .build(),
    );

    let app = router(Arc::new(AppState { engine }));

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("OrgMind API starting on {addr}");
    info!("Start a run with: curl -X POST http://{addr}/api/run");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
