use agui_ai::Provider;
use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliProvider {
    #[value(alias = "claude")]
    Anthropic,
    #[value(name = "openai")]
    OpenAi,
    #[value(alias = "gemini")]
    Google,
}

impl From<CliProvider> for Provider {
    fn from(value: CliProvider) -> Self {
        match value {
            CliProvider::Anthropic => Provider::Anthropic,
            CliProvider::OpenAi => Provider::OpenAi,
            CliProvider::Google => Provider::Google,
        }
    }
}

/// Port a single-provider deployment listens on when `--bind` is not given.
pub fn default_provider_port(provider: Provider) -> u16 {
    match provider {
        Provider::Anthropic => 7776,
        Provider::OpenAi => 7775,
        Provider::Google => 7777,
    }
}
