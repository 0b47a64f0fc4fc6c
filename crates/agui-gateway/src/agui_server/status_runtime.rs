//! Health and service descriptor endpoints.

use super::*;

pub(super) async fn handle_health(State(state): State<Arc<AguiServerState>>) -> Response {
    let providers = state
        .config
        .adapters
        .iter()
        .map(|(provider, adapter)| {
            json!({
                "provider": provider,
                "framework": provider.framework(),
                "model": adapter.model(),
                "agui_endpoint": provider_agent_endpoint(*provider),
            })
        })
        .collect::<Vec<_>>();

    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": state.config.service_name,
            "framework": state.config.default_provider.framework(),
            "port": state.port,
            "default_provider": state.config.default_provider,
            "providers": providers,
            "agui_endpoint": AGENT_ENDPOINT,
            "native_agui": false,
            "uptime_seconds": seconds_since(state.started_unix),
        })),
    )
        .into_response()
}

pub(super) async fn handle_root(State(state): State<Arc<AguiServerState>>) -> Response {
    let provider_endpoints = state
        .config
        .adapters
        .keys()
        .map(|provider| format!("POST {}", provider_agent_endpoint(*provider)))
        .collect::<Vec<_>>();

    (
        StatusCode::OK,
        Json(json!({
            "name": state.config.service_name,
            "framework": state.config.default_provider.framework(),
            "agui_endpoint": format!("POST {AGENT_ENDPOINT}"),
            "provider_endpoints": provider_endpoints,
            "health_endpoint": format!("GET {HEALTH_ENDPOINT}"),
        })),
    )
        .into_response()
}
