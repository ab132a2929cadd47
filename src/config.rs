//! Configuration — environment settings and the agents config file.
//!
//! The agents file is a JSON document with a root `agents` array. Every
//! string value in it may reference environment variables as `${VAR}`;
//! a referenced variable that is unset or empty is a fatal configuration
//! error. Configuration problems refuse startup — they are never surfaced
//! at request time.

use serde::{Deserialize, Serialize};

use crate::types::AgentSkill;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 7410;

/// Configuration failure kinds. All fatal at startup.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// The agents file could not be read.
    #[error("cannot read config file '{path}': {message}")]
    Io {
        /// The file path.
        path: String,
        /// The I/O error text.
        message: String,
    },

    /// The agents file is not valid JSON.
    #[error("config file '{path}' is not valid JSON: {message}")]
    Parse {
        /// The file path.
        path: String,
        /// The parse error text.
        message: String,
    },

    /// A `${VAR}` placeholder referenced an unset or empty variable.
    #[error("environment variable '{name}' referenced in config is unset or empty")]
    MissingVar {
        /// The variable name.
        name: String,
    },

    /// A required agent field resolved to an empty string.
    #[error("agent '{id}' has an empty '{field}' after resolution")]
    EmptyField {
        /// The agent id (or its index when the id itself is empty).
        id: String,
        /// The field name.
        field: String,
    },

    /// Two agents share an id.
    #[error("duplicate agent id '{id}'")]
    DuplicateAgent {
        /// The duplicated id.
        id: String,
    },

    /// The agents file resolved to zero agents.
    #[error("no agents configured")]
    NoAgents,

    /// An environment setting failed to parse.
    #[error("invalid value for {key}: {message}")]
    InvalidEnv {
        /// The environment key.
        key: String,
        /// Why it was rejected.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Agent descriptors
// ---------------------------------------------------------------------------

/// Which upstream strategy an agent uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportKind {
    /// Synchronous request/response over HTTP POST.
    Rest,
    /// Persistent bidirectional session over WebSocket.
    Socket,
}

/// A resolved agent record. Immutable after startup; every `${VAR}`
/// placeholder has already been substituted with a non-empty value.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentDescriptor {
    /// Unique, URL-safe identifier.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Description for the discovery card.
    pub description: String,

    /// Version string for the discovery card.
    pub version: String,

    /// Upstream transport strategy.
    pub transport: TransportKind,

    /// Endpoint base URL.
    pub endpoint_url: String,

    /// Endpoint token, appended to the URL as a path segment.
    pub endpoint_token: String,

    /// Skills advertised on the discovery card.
    pub skills: Vec<AgentSkill>,
}

// ---------------------------------------------------------------------------
// Agents file shape
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AgentsFile {
    #[serde(default)]
    agents: Vec<AgentEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentEntry {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default = "default_version")]
    version: String,
    transport: TransportKind,
    endpoint_url: String,
    endpoint_token: String,
    #[serde(default)]
    skills: Vec<SkillEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SkillEntry {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tags: Vec<String>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Substitute `${VAR}` placeholders in one string.
///
/// Unreferenced text passes through untouched; an unterminated `${` is kept
/// literally. A referenced variable that resolves to nothing (or an empty
/// string) is a [`ConfigError::MissingVar`].
pub fn resolve_placeholders(
    input: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                let value = lookup(name).filter(|v| !v.is_empty()).ok_or_else(|| {
                    ConfigError::MissingVar {
                        name: name.to_string(),
                    }
                })?;
                output.push_str(&value);
                rest = &after[end + 1..];
            }
            None => {
                output.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    output.push_str(rest);
    Ok(output)
}

/// Load and resolve the agents file from disk, using the process
/// environment for placeholder lookup.
pub fn load_agents(path: &str) -> Result<Vec<AgentDescriptor>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
        path: path.to_string(),
        message: error.to_string(),
    })?;
    parse_agents(&raw, path, &|name| std::env::var(name).ok())
}

/// Parse and resolve an agents document. Exposed with an injectable lookup
/// so tests run without touching the process environment.
pub fn parse_agents(
    raw: &str,
    path: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Vec<AgentDescriptor>, ConfigError> {
    let file: AgentsFile = serde_json::from_str(raw).map_err(|error| ConfigError::Parse {
        path: path.to_string(),
        message: error.to_string(),
    })?;

    if file.agents.is_empty() {
        return Err(ConfigError::NoAgents);
    }

    let mut descriptors = Vec::with_capacity(file.agents.len());
    for (index, entry) in file.agents.into_iter().enumerate() {
        descriptors.push(resolve_entry(entry, index, lookup)?);
    }
    Ok(descriptors)
}

fn resolve_entry(
    entry: AgentEntry,
    index: usize,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<AgentDescriptor, ConfigError> {
    let id = resolve_placeholders(&entry.id, lookup)?;
    let label = if id.is_empty() {
        format!("#{}", index)
    } else {
        id.clone()
    };

    let descriptor = AgentDescriptor {
        name: resolve_placeholders(&entry.name, lookup)?,
        description: resolve_placeholders(&entry.description, lookup)?,
        version: resolve_placeholders(&entry.version, lookup)?,
        transport: entry.transport,
        endpoint_url: resolve_placeholders(&entry.endpoint_url, lookup)?,
        endpoint_token: resolve_placeholders(&entry.endpoint_token, lookup)?,
        skills: entry
            .skills
            .into_iter()
            .map(|skill| {
                Ok(AgentSkill {
                    id: resolve_placeholders(&skill.id, lookup)?,
                    name: resolve_placeholders(&skill.name, lookup)?,
                    description: resolve_placeholders(&skill.description, lookup)?,
                    tags: skill
                        .tags
                        .iter()
                        .map(|tag| resolve_placeholders(tag, lookup))
                        .collect::<Result<_, _>>()?,
                })
            })
            .collect::<Result<_, ConfigError>>()?,
        id,
    };

    for (field, value) in [
        ("id", &descriptor.id),
        ("name", &descriptor.name),
        ("endpointUrl", &descriptor.endpoint_url),
        ("endpointToken", &descriptor.endpoint_token),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::EmptyField {
                id: label,
                field: field.to_string(),
            });
        }
    }

    Ok(descriptor)
}

// ---------------------------------------------------------------------------
// Environment settings
// ---------------------------------------------------------------------------

/// Task store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStoreKind {
    /// In-process map; contents die with the process.
    Memory,
    /// External Redis key-value store.
    Redis,
}

/// Process-level settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Listen port (`PORT`).
    pub port: u16,

    /// Log filter directive (`LOG_LEVEL`).
    pub log_level: String,

    /// Human-readable log output instead of JSON lines (`LOG_PRETTY`).
    pub log_pretty: bool,

    /// Deployment environment tag (`ENVIRONMENT`).
    pub environment: String,

    /// Public base URL used in discovery cards (`PUBLIC_URL`).
    pub public_url: String,

    /// Path to the agents file (`AGENTS_CONFIG`).
    pub config_path: String,

    /// Task store backend (`TASK_STORE`).
    pub task_store: TaskStoreKind,

    /// Redis URL (`TASK_STORE_URL`), required when the backend is redis.
    pub task_store_url: Option<String>,

    /// Redis per-task TTL in seconds (`TASK_STORE_TTL_SECONDS`).
    pub task_store_ttl: u64,

    /// Redis key prefix (`TASK_STORE_PREFIX`).
    pub task_store_prefix: String,
}

impl Settings {
    /// Resolve settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|name| std::env::var(name).ok())
    }

    /// Resolve settings through an injectable lookup (tests use a map).
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let port = match get("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|error| ConfigError::InvalidEnv {
                key: "PORT".to_string(),
                message: error.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let task_store = match get("TASK_STORE").as_deref() {
            None | Some("memory") => TaskStoreKind::Memory,
            Some("redis") => TaskStoreKind::Redis,
            Some(other) => {
                return Err(ConfigError::InvalidEnv {
                    key: "TASK_STORE".to_string(),
                    message: format!("expected 'memory' or 'redis', got '{}'", other),
                })
            }
        };

        let task_store_url = get("TASK_STORE_URL");
        if task_store == TaskStoreKind::Redis && task_store_url.is_none() {
            return Err(ConfigError::InvalidEnv {
                key: "TASK_STORE_URL".to_string(),
                message: "required when TASK_STORE=redis".to_string(),
            });
        }

        let task_store_ttl = match get("TASK_STORE_TTL_SECONDS") {
            Some(raw) => raw.parse::<u64>().map_err(|error| ConfigError::InvalidEnv {
                key: "TASK_STORE_TTL_SECONDS".to_string(),
                message: error.to_string(),
            })?,
            None => 3600,
        };

        Ok(Self {
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_pretty: matches!(
                get("LOG_PRETTY").as_deref(),
                Some("1") | Some("true") | Some("yes")
            ),
            environment: get("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            public_url: get("PUBLIC_URL").unwrap_or_else(|| format!("http://localhost:{}", port)),
            config_path: get("AGENTS_CONFIG").unwrap_or_else(|| "agents.json".to_string()),
            task_store,
            task_store_url,
            task_store_ttl,
            task_store_prefix: get("TASK_STORE_PREFIX").unwrap_or_else(|| "a2a:task:".to_string()),
            port,
        })
    }
}
