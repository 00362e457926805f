use anyhow::Context;

use backoffice_infra::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    backoffice_observability::init(config.log_format);
    for warning in config.warnings() {
        tracing::warn!("{warning}");
    }

    let app = backoffice_api::app::build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        storage = ?config.storage,
        "listening"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
