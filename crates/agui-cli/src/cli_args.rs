use agui_agent_core::DEFAULT_SYSTEM_PROMPT;
use agui_ai::Provider;
use clap::{ArgAction, Parser};

use crate::{default_provider_port, CliProvider};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u32(value: &str) -> Result<u32, String> {
    let parsed = value
        .parse::<u32>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "agui-server",
    about = "Streams Anthropic, OpenAI and Gemini chat runs as AG-UI events over SSE",
    version
)]
pub struct Cli {
    #[arg(
        long,
        env = "AGUI_BIND",
        help = "Socket address to listen on; defaults to 0.0.0.0 on the default provider's port (anthropic 7776, openai 7775, google 7777)"
    )]
    pub bind: Option<String>,

    #[arg(
        long = "default-provider",
        env = "AGUI_DEFAULT_PROVIDER",
        value_enum,
        default_value = "anthropic",
        help = "Provider served by the bare POST /agent route"
    )]
    pub default_provider: CliProvider,

    #[arg(
        long = "service-name",
        env = "AGUI_SERVICE_NAME",
        default_value = "agui-bridge",
        help = "Name reported by GET / and GET /health"
    )]
    pub service_name: String,

    #[arg(
        long,
        env = "ANTHROPIC_API_KEY",
        hide_env_values = true,
        help = "API key for Anthropic; the provider is mounted only when set"
    )]
    pub anthropic_api_key: Option<String>,

    #[arg(
        long,
        env = "OPENAI_API_KEY",
        hide_env_values = true,
        help = "API key for OpenAI; the provider is mounted only when set"
    )]
    pub openai_api_key: Option<String>,

    #[arg(
        long,
        env = "GEMINI_API_KEY",
        hide_env_values = true,
        help = "API key for Google Gemini; the provider is mounted only when set"
    )]
    pub google_api_key: Option<String>,

    #[arg(
        long = "openai-organization",
        env = "OPENAI_ORG_ID",
        help = "Optional OpenAI organization header"
    )]
    pub openai_organization: Option<String>,

    #[arg(
        long,
        env = "AGUI_ANTHROPIC_MODEL",
        default_value = "claude-haiku-4-5-20251001",
        help = "Anthropic model identifier"
    )]
    pub anthropic_model: String,

    #[arg(
        long,
        env = "AGUI_OPENAI_MODEL",
        default_value = "gpt-5.2",
        help = "OpenAI model identifier"
    )]
    pub openai_model: String,

    #[arg(
        long,
        env = "AGUI_GOOGLE_MODEL",
        default_value = "gemini-3-flash",
        help = "Google Gemini model identifier"
    )]
    pub google_model: String,

    #[arg(
        long,
        env = "AGUI_ANTHROPIC_API_BASE",
        default_value = "https://api.anthropic.com/v1",
        help = "Base URL for Anthropic Messages API"
    )]
    pub anthropic_api_base: String,

    #[arg(
        long,
        env = "AGUI_OPENAI_API_BASE",
        default_value = "https://api.openai.com/v1",
        help = "Base URL for OpenAI Chat Completions API"
    )]
    pub openai_api_base: String,

    #[arg(
        long,
        env = "AGUI_GOOGLE_API_BASE",
        default_value = "https://generativelanguage.googleapis.com/v1beta",
        help = "Base URL for Google Gemini API"
    )]
    pub google_api_base: String,

    #[arg(
        long = "system-prompt",
        env = "AGUI_SYSTEM_PROMPT",
        default_value = DEFAULT_SYSTEM_PROMPT,
        help = "System prompt sent with every run"
    )]
    pub system_prompt: String,

    #[arg(
        long = "max-steps",
        env = "AGUI_MAX_STEPS",
        default_value_t = 5,
        value_parser = parse_positive_usize,
        help = "Maximum model requests per run, including tool-use rounds"
    )]
    pub max_steps: usize,

    #[arg(
        long = "max-tokens",
        env = "AGUI_MAX_TOKENS",
        default_value_t = 1024,
        value_parser = parse_positive_u32,
        help = "Maximum output tokens per model request"
    )]
    pub max_tokens: u32,

    #[arg(
        long = "run-timeout-ms",
        env = "AGUI_RUN_TIMEOUT_MS",
        default_value_t = 120_000,
        help = "Per-run timeout in milliseconds; 0 disables"
    )]
    pub run_timeout_ms: u64,

    #[arg(
        long = "tool-timeout-ms",
        env = "AGUI_TOOL_TIMEOUT_MS",
        default_value_t = 30_000,
        help = "Per-tool execution timeout in milliseconds; 0 disables"
    )]
    pub tool_timeout_ms: u64,

    #[arg(
        long = "request-timeout-ms",
        env = "AGUI_REQUEST_TIMEOUT_MS",
        default_value_t = 120_000,
        value_parser = parse_positive_u64,
        help = "HTTP timeout for a single provider request in milliseconds"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "provider-max-retries",
        env = "AGUI_PROVIDER_MAX_RETRIES",
        default_value_t = 2,
        help = "Retries for transient provider failures (429, 5xx, connect/timeout)"
    )]
    pub provider_max_retries: usize,

    #[arg(
        long = "provider-retry-budget-ms",
        env = "AGUI_PROVIDER_RETRY_BUDGET_MS",
        default_value_t = 0,
        help = "Upper bound on total retry backoff per request in milliseconds; 0 means unbounded"
    )]
    pub provider_retry_budget_ms: u64,

    #[arg(
        long = "provider-retry-jitter",
        env = "AGUI_PROVIDER_RETRY_JITTER",
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Randomize retry backoff delays"
    )]
    pub provider_retry_jitter: bool,

    #[arg(
        long = "max-body-bytes",
        env = "AGUI_MAX_BODY_BYTES",
        default_value_t = 1_048_576,
        value_parser = parse_positive_usize,
        help = "Maximum accepted request body size in bytes"
    )]
    pub max_body_bytes: usize,
}

impl Cli {
    pub fn default_provider(&self) -> Provider {
        self.default_provider.into()
    }

    /// Configured key for `provider`, ignoring blank values.
    pub fn api_key(&self, provider: Provider) -> Option<&str> {
        let key = match provider {
            Provider::Anthropic => self.anthropic_api_key.as_deref(),
            Provider::OpenAi => self.openai_api_key.as_deref(),
            Provider::Google => self.google_api_key.as_deref(),
        };
        key.map(str::trim).filter(|key| !key.is_empty())
    }

    pub fn model(&self, provider: Provider) -> &str {
        match provider {
            Provider::Anthropic => &self.anthropic_model,
            Provider::OpenAi => &self.openai_model,
            Provider::Google => &self.google_model,
        }
    }

    pub fn api_base(&self, provider: Provider) -> &str {
        match provider {
            Provider::Anthropic => &self.anthropic_api_base,
            Provider::OpenAi => &self.openai_api_base,
            Provider::Google => &self.google_api_base,
        }
    }

    /// Providers with a usable API key, in declaration order.
    pub fn configured_providers(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|provider| self.api_key(*provider).is_some())
            .collect()
    }

    pub fn resolved_bind(&self) -> String {
        match self.bind.as_deref().map(str::trim) {
            Some(bind) if !bind.is_empty() => bind.to_string(),
            _ => format!("0.0.0.0:{}", default_provider_port(self.default_provider())),
        }
    }
}
