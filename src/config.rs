//! Process configuration, read from the environment once at startup.
//!
//! Recognized variables:
//! - `HOST`, `PORT` - bind address (default `127.0.0.1:3000`)
//! - `LETTA_BASE_URL`, `LETTA_API_KEY` - agent service endpoint and token
//! - `SUPABASE_URL`, `SUPABASE_ANON_KEY` - ownership store endpoint and key (required)
//! - `USE_COOKIE_BASED_AUTHENTICATION` - `false` selects single-tenant mode
//! - `APP_ENV` - `production` marks identity cookies `Secure`
//! - `DEFAULT_LLM`, `DEFAULT_EMBEDDING` - template used by `POST /api/agents`

use thiserror::Error;

const DEFAULT_LETTA_BASE_URL: &str = "http://localhost:8283";
const DEFAULT_LETTA_API_KEY: &str = "DEFAULT_TOKEN";
const DEFAULT_LLM: &str = "letta/letta-free";
const DEFAULT_EMBEDDING: &str = "letta/letta-free";

const DEFAULT_PERSONA: &str = "I am a helpful, friendly assistant. \
I remember what the user tells me and keep my answers short.";
const DEFAULT_HUMAN: &str = "The user has not shared any details about themselves yet.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is not set. Please add it to your environment.")]
    Missing(&'static str),

    #[error("{name} is not a valid URL: {source}")]
    InvalidUrl {
        name: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// How callers are identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityMode {
    /// Each browser gets a `letta_uid` cookie backed by a stored user and a Letta identity.
    Cookie,
    /// One fixed `default` identity; no cookies, no ownership checks.
    SingleTenant,
}

impl IdentityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cookie => "cookie",
            Self::SingleTenant => "single_tenant",
        }
    }
}

/// A memory block seeded into newly created agents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBlockTemplate {
    pub label: String,
    pub value: String,
}

/// Fixed configuration for agents created through `POST /api/agents`.
#[derive(Debug, Clone)]
pub struct AgentTemplate {
    pub memory_blocks: Vec<MemoryBlockTemplate>,
    pub model: String,
    pub embedding: String,
}

impl AgentTemplate {
    /// Value of the memory block with the given label, if the template has one.
    pub fn block(&self, label: &str) -> Option<&str> {
        self.memory_blocks
            .iter()
            .find(|b| b.label == label)
            .map(|b| b.value.as_str())
    }
}

impl Default for AgentTemplate {
    fn default() -> Self {
        Self {
            memory_blocks: vec![
                MemoryBlockTemplate {
                    label: "persona".to_string(),
                    value: DEFAULT_PERSONA.to_string(),
                },
                MemoryBlockTemplate {
                    label: "human".to_string(),
                    value: DEFAULT_HUMAN.to_string(),
                },
            ],
            model: DEFAULT_LLM.to_string(),
            embedding: DEFAULT_EMBEDDING.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub letta_base_url: String,
    pub letta_api_key: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub identity_mode: IdentityMode,
    /// Set `Secure` on identity cookies.
    pub secure_cookies: bool,
    pub agent_template: AgentTemplate,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = get("HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value: raw,
            })?,
            None => 3000,
        };

        let letta_base_url = get("LETTA_BASE_URL").unwrap_or_else(|| {
            tracing::warn!("LETTA_BASE_URL is not set, using {}", DEFAULT_LETTA_BASE_URL);
            DEFAULT_LETTA_BASE_URL.to_string()
        });
        validate_url("LETTA_BASE_URL", &letta_base_url)?;

        let letta_api_key = get("LETTA_API_KEY").unwrap_or_else(|| {
            tracing::warn!(
                "LETTA_API_KEY is not set. You might not be able to use Letta's full functionality."
            );
            DEFAULT_LETTA_API_KEY.to_string()
        });

        let supabase_url = get("SUPABASE_URL").ok_or(ConfigError::Missing("SUPABASE_URL"))?;
        validate_url("SUPABASE_URL", &supabase_url)?;
        let supabase_anon_key =
            get("SUPABASE_ANON_KEY").ok_or(ConfigError::Missing("SUPABASE_ANON_KEY"))?;

        let identity_mode = match get("USE_COOKIE_BASED_AUTHENTICATION") {
            Some(raw) => {
                if parse_bool("USE_COOKIE_BASED_AUTHENTICATION", &raw)? {
                    IdentityMode::Cookie
                } else {
                    IdentityMode::SingleTenant
                }
            }
            None => IdentityMode::Cookie,
        };

        let secure_cookies = get("APP_ENV")
            .map(|env| env.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let mut agent_template = AgentTemplate::default();
        if let Some(model) = get("DEFAULT_LLM") {
            agent_template.model = model;
        }
        if let Some(embedding) = get("DEFAULT_EMBEDDING") {
            agent_template.embedding = embedding;
        }

        Ok(Self {
            host,
            port,
            letta_base_url,
            letta_api_key,
            supabase_url,
            supabase_anon_key,
            identity_mode,
            secure_cookies,
            agent_template,
        })
    }
}

fn validate_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|source| ConfigError::InvalidUrl { name, source })
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: raw.to_string(),
        }),
    }
}
