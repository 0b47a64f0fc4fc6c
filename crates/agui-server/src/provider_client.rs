use std::collections::BTreeMap;
use std::sync::Arc;

use agui_agent_core::{AdapterConfig, ProviderAdapter, ToolRegistry};
use agui_ai::{
    AnthropicClient, AnthropicConfig, GoogleClient, GoogleConfig, LlmClient, OpenAiClient,
    OpenAiConfig, Provider,
};
use agui_cli::Cli;
use agui_gateway::AguiServerConfig;
use agui_tools::builtin_tool_registry;
use anyhow::{bail, Context, Result};

pub(crate) fn build_provider_client(cli: &Cli, provider: Provider) -> Result<Arc<dyn LlmClient>> {
    let Some(api_key) = cli.api_key(provider) else {
        bail!("missing API key for provider '{provider}'");
    };
    let api_key = api_key.to_string();
    let api_base = cli.api_base(provider).to_string();

    let client: Arc<dyn LlmClient> = match provider {
        Provider::Anthropic => Arc::new(
            AnthropicClient::new(AnthropicConfig {
                api_base,
                api_key,
                request_timeout_ms: cli.request_timeout_ms,
                max_retries: cli.provider_max_retries,
                retry_budget_ms: cli.provider_retry_budget_ms,
                retry_jitter: cli.provider_retry_jitter,
            })
            .context("failed to create Anthropic client")?,
        ),
        Provider::OpenAi => Arc::new(
            OpenAiClient::new(OpenAiConfig {
                api_base,
                api_key,
                organization: cli
                    .openai_organization
                    .as_deref()
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(str::to_string),
                request_timeout_ms: cli.request_timeout_ms,
                max_retries: cli.provider_max_retries,
                retry_budget_ms: cli.provider_retry_budget_ms,
                retry_jitter: cli.provider_retry_jitter,
            })
            .context("failed to create OpenAI client")?,
        ),
        Provider::Google => Arc::new(
            GoogleClient::new(GoogleConfig {
                api_base,
                api_key,
                request_timeout_ms: cli.request_timeout_ms,
                max_retries: cli.provider_max_retries,
                retry_budget_ms: cli.provider_retry_budget_ms,
                retry_jitter: cli.provider_retry_jitter,
            })
            .context("failed to create Google client")?,
        ),
    };
    Ok(client)
}

fn adapter_config(cli: &Cli, provider: Provider) -> AdapterConfig {
    AdapterConfig {
        model: cli.model(provider).to_string(),
        system_prompt: cli.system_prompt.clone(),
        max_steps: cli.max_steps,
        max_tokens: Some(cli.max_tokens),
        tool_timeout_ms: cli.tool_timeout_ms,
    }
}

/// Builds one adapter per provider with a key, all sharing a single tool registry.
pub(crate) fn build_server_config(cli: &Cli) -> Result<AguiServerConfig> {
    build_server_config_with_tools(cli, builtin_tool_registry())
}

fn build_server_config_with_tools(cli: &Cli, tools: ToolRegistry) -> Result<AguiServerConfig> {
    let tools = Arc::new(tools);
    for provider in Provider::ALL {
        if cli.api_key(provider).is_none() {
            tracing::info!(%provider, "provider not mounted: API key is not set");
        }
    }
    let mut adapters = BTreeMap::new();
    for provider in cli.configured_providers() {
        let client = build_provider_client(cli, provider)?;
        adapters.insert(
            provider,
            ProviderAdapter::new(client, Arc::clone(&tools), adapter_config(cli, provider)),
        );
    }

    let config = AguiServerConfig {
        service_name: cli.service_name.clone(),
        bind: cli.resolved_bind(),
        default_provider: cli.default_provider(),
        adapters,
        run_timeout_ms: cli.run_timeout_ms,
        max_body_bytes: cli.max_body_bytes,
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use agui_agent_core::ToolRegistry;
    use agui_ai::Provider;
    use agui_cli::Cli;
    use clap::Parser;

    use super::{adapter_config, build_server_config_with_tools};

    /// Parses `args`, blanking every provider key not passed explicitly so
    /// ambient environment keys cannot leak into the test.
    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["agui-server"];
        argv.extend_from_slice(args);
        for flag in ["--anthropic-api-key", "--openai-api-key", "--google-api-key"] {
            if !args.contains(&flag) {
                argv.extend_from_slice(&[flag, ""]);
            }
        }
        Cli::try_parse_from(argv).expect("parse cli")
    }

    #[test]
    fn unit_mounts_only_providers_with_keys() {
        let cli = cli(&[
            "--default-provider",
            "openai",
            "--openai-api-key",
            "sk-test",
            "--google-api-key",
            "g-test",
            "--bind",
            "127.0.0.1:0",
        ]);
        let config = build_server_config_with_tools(&cli, ToolRegistry::new()).expect("config");
        assert_eq!(
            config.adapters.keys().copied().collect::<Vec<_>>(),
            vec![Provider::OpenAi, Provider::Google]
        );
        assert_eq!(config.default_provider, Provider::OpenAi);
        assert_eq!(config.adapters[&Provider::OpenAi].model(), cli.openai_model);
        assert_eq!(config.bind, "127.0.0.1:0");
    }

    #[test]
    fn regression_startup_fails_without_any_provider_key() {
        let error = build_server_config_with_tools(&cli(&[]), ToolRegistry::new())
            .expect_err("no providers");
        assert!(error.to_string().contains("no provider is configured"));
    }

    #[test]
    fn regression_startup_fails_when_default_provider_has_no_key() {
        let cli = cli(&["--default-provider", "anthropic", "--google-api-key", "g-test"]);
        let error = build_server_config_with_tools(&cli, ToolRegistry::new())
            .expect_err("default provider missing");
        assert!(error.to_string().contains("default provider 'anthropic'"));
    }

    #[test]
    fn unit_adapter_config_carries_run_limits() {
        let cli = cli(&["--max-steps", "2", "--max-tokens", "256", "--tool-timeout-ms", "0"]);
        let config = adapter_config(&cli, Provider::Anthropic);
        assert_eq!(config.max_steps, 2);
        assert_eq!(config.max_tokens, Some(256));
        assert_eq!(config.tool_timeout_ms, 0);
        assert_eq!(config.model, cli.anthropic_model);
    }
}
