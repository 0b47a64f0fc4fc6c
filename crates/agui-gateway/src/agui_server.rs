use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use agui_agent_core::ProviderAdapter;
use agui_ai::Provider;
use agui_core::{current_unix_timestamp, seconds_since};
use agui_protocol::{drive_run, ProtocolEvent, RunEventSequencer};
use anyhow::{bail, Context, Result};
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::StreamExt;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

mod endpoints;
mod request_translation;
mod server_bootstrap;
mod status_runtime;
mod stream_response_handler;
#[cfg(test)]
mod tests;
mod types;

use endpoints::{
    provider_agent_endpoint, AGENT_ENDPOINT, AGENT_PROVIDER_ENDPOINT, HEALTH_ENDPOINT,
    ROOT_ENDPOINT,
};
use request_translation::{read_run_agent_input, translate_run_agent_input, AgentRunRequest};
use status_runtime::{handle_health, handle_root};
use stream_response_handler::stream_agent_run;
use types::ApiError;

pub use server_bootstrap::run_agui_server;

pub const DEFAULT_SERVICE_NAME: &str = "agui-bridge";
pub const DEFAULT_MAX_BODY_BYTES: usize = 1_048_576;

#[derive(Clone)]
/// Everything a gateway process needs, built once at startup.
pub struct AguiServerConfig {
    pub service_name: String,
    pub bind: String,
    /// Provider served by the bare `POST /agent` route.
    pub default_provider: Provider,
    /// Mounted providers; each is also reachable at `POST /agent/{provider}`.
    pub adapters: BTreeMap<Provider, ProviderAdapter>,
    /// `0` disables the per-run timeout.
    pub run_timeout_ms: u64,
    pub max_body_bytes: usize,
}

impl AguiServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.adapters.is_empty() {
            bail!("no provider is configured; set at least one provider API key");
        }
        if !self.adapters.contains_key(&self.default_provider) {
            bail!(
                "default provider '{}' is not configured; set its API key or choose one of: {}",
                self.default_provider,
                self.adapters
                    .keys()
                    .map(|provider| provider.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        if self.max_body_bytes == 0 {
            bail!("max body bytes must be greater than 0");
        }
        Ok(())
    }

    fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout_ms > 0).then(|| Duration::from_millis(self.run_timeout_ms))
    }
}

impl std::fmt::Debug for AguiServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AguiServerConfig")
            .field("service_name", &self.service_name)
            .field("bind", &self.bind)
            .field("default_provider", &self.default_provider)
            .field("providers", &self.adapters.keys().collect::<Vec<_>>())
            .field("run_timeout_ms", &self.run_timeout_ms)
            .field("max_body_bytes", &self.max_body_bytes)
            .finish()
    }
}

struct AguiServerState {
    config: AguiServerConfig,
    /// Port the listener actually bound, which differs from `config.bind` for `:0`.
    port: u16,
    started_unix: u64,
}

impl AguiServerState {
    fn new(config: AguiServerConfig, local_addr: SocketAddr) -> Self {
        Self {
            config,
            port: local_addr.port(),
            started_unix: current_unix_timestamp(),
        }
    }

    fn adapter(&self, provider: Provider) -> Result<&ProviderAdapter, ApiError> {
        self.config.adapters.get(&provider).ok_or_else(|| {
            ApiError::not_found(
                "provider_not_configured",
                format!("provider '{provider}' is not configured on this server"),
            )
        })
    }
}

async fn handle_agent(State(state): State<Arc<AguiServerState>>, body: Body) -> Response {
    let provider = state.config.default_provider;
    dispatch_agent_run(state, provider, body).await
}

async fn handle_agent_for_provider(
    State(state): State<Arc<AguiServerState>>,
    Path(provider): Path<String>,
    body: Body,
) -> Response {
    let provider = match provider.parse::<Provider>() {
        Ok(provider) => provider,
        Err(error) => {
            return ApiError::not_found("unknown_provider", error.to_string()).into_response()
        }
    };
    dispatch_agent_run(state, provider, body).await
}

async fn dispatch_agent_run(state: Arc<AguiServerState>, provider: Provider, body: Body) -> Response {
    let prepared = async {
        let adapter = state.adapter(provider)?.clone();
        let input = read_run_agent_input(body, state.config.max_body_bytes).await?;
        let request = translate_run_agent_input(input)?;
        Ok::<_, ApiError>((adapter, request))
    }
    .await;

    match prepared {
        Ok((adapter, request)) => stream_agent_run(&state, provider, adapter, request),
        Err(error) => {
            tracing::debug!(%provider, code = error.code, message = %error.message, "rejected agent request");
            error.into_response()
        }
    }
}
