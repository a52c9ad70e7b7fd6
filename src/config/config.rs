use serde::Deserialize;

pub const DEFAULT_MODEL: &str = "openrouter/anthropic/claude-sonnet-4";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful, harmless, and honest AI assistant. \
You are knowledgeable, conversational, and aim to be helpful while being concise and clear in your responses. \
You can assist with a wide variety of tasks including answering questions, helping with analysis, \
creative writing, coding, math, and general conversation.";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Remote completion provider the relay forwards to. `api_key` and
/// `customer_id` are deployment secrets and should come from the
/// environment, either directly or through `${VAR}` placeholders.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub api_key: String,
    pub customer_id: String,
    pub default_model: String,
    pub default_system_prompt: String,
    pub default_temperature: f64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://openrouter.ai/api/v1/chat/completions".to_string(),
            api_key: String::new(),
            customer_id: String::new(),
            default_model: DEFAULT_MODEL.to_string(),
            default_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            default_temperature: DEFAULT_TEMPERATURE,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClientConfig {
    pub proxy_url: String,
    pub state_dir: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            proxy_url: "http://127.0.0.1:8080".to_string(),
            state_dir: ".chatrelay".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub provider: ProviderConfig,
    pub client: ClientConfig,
}

impl AppConfig {
    pub fn load(path: &str) -> Result<Self, config::ConfigError> {
        dotenv::dotenv().ok();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("CHATRELAY").separator("__"))
            .build()?;

        let mut app_config: AppConfig = settings.try_deserialize()?;

        // Expand environment variables if present like ${CHATRELAY_API_KEY}
        app_config.server.host = expand_env(&app_config.server.host);
        app_config.provider.endpoint = expand_env(&app_config.provider.endpoint);
        app_config.provider.api_key = expand_env(&app_config.provider.api_key);
        app_config.provider.customer_id = expand_env(&app_config.provider.customer_id);
        app_config.client.proxy_url = expand_env(&app_config.client.proxy_url);
        app_config.client.state_dir = expand_env(&app_config.client.state_dir);

        Ok(app_config)
    }
}

fn expand_env(val: &str) -> String {
    match val.strip_prefix("${").and_then(|v| v.strip_suffix('}')) {
        Some(var_name) => std::env::var(var_name).unwrap_or_default(),
        None => val.to_string(),
    }
}
