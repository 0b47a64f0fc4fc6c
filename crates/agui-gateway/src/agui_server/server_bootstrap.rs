//! Gateway server bootstrap and router wiring.

use super::*;

/// Binds `config.bind` and serves until Ctrl-C.
pub async fn run_agui_server(config: AguiServerConfig) -> Result<()> {
    config.validate()?;
    let bind_addr = config
        .bind
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid --bind '{}'", config.bind))?;

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind AG-UI server on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound AG-UI server address")?;

    for (provider, adapter) in &config.adapters {
        tracing::info!(
            %provider,
            model = adapter.model(),
            endpoint = %provider_agent_endpoint(*provider),
            default = *provider == config.default_provider,
            "mounted provider route"
        );
    }
    tracing::info!(
        addr = %local_addr,
        endpoint = AGENT_ENDPOINT,
        health = HEALTH_ENDPOINT,
        "AG-UI server listening"
    );

    let app = build_agui_router(Arc::new(AguiServerState::new(config, local_addr)));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("AG-UI server exited unexpectedly")?;
    Ok(())
}

pub(super) fn build_agui_router(state: Arc<AguiServerState>) -> Router {
    Router::new()
        .route(ROOT_ENDPOINT, get(handle_root))
        .route(HEALTH_ENDPOINT, get(handle_health))
        .route(AGENT_ENDPOINT, post(handle_agent))
        .route(AGENT_PROVIDER_ENDPOINT, post(handle_agent_for_provider))
        .with_state(state)
}
