//! Route paths served by the AG-UI gateway.

pub(super) const ROOT_ENDPOINT: &str = "/";
pub(super) const HEALTH_ENDPOINT: &str = "/health";
pub(super) const AGENT_ENDPOINT: &str = "/agent";
pub(super) const AGENT_PROVIDER_ENDPOINT: &str = "/agent/{provider}";

pub(super) fn provider_agent_endpoint(provider: agui_ai::Provider) -> String {
    format!("{AGENT_ENDPOINT}/{}", provider.as_str())
}
