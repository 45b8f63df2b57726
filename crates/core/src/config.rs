use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub chat: ChatConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `OIKOS_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("OIKOS_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            llm: LlmConfig::from_env_profiled(p),
            chat: ChatConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:  {}:{}", self.server.host, self.server.port);
        tracing::info!("  llm:     url={}, model={}, key={}", self.llm.api_url, self.llm.model, if self.llm.is_configured() { "set" } else { "(dummy)" });
        tracing::info!("  chat:    memory_limit={}, max_iterations={}", self.chat.memory_limit, self.chat.max_iterations);
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_u16(p, "PORT", 3001),
        }
    }
}

// ── LLM (OpenAI-compatible endpoint) ──────────────────────────

/// Placeholder key used when no real key is configured; local gateways accept anything.
pub const DUMMY_API_KEY: &str = "dummy-key";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL including the version segment, e.g. `http://localhost:8045/v1`.
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    /// Timeout for a whole non-streaming request, in seconds.
    pub request_timeout_secs: u64,
    /// Timeout for opening a stream and for each idle gap between reads, in seconds.
    pub stream_timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8045/v1".to_string(),
            api_key: DUMMY_API_KEY.to_string(),
            model: "gemini-2.5-flash".to_string(),
            request_timeout_secs: 60,
            stream_timeout_secs: 120,
        }
    }
}

impl LlmConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            api_url: profiled_env_or(p, "OPENAI_API_URL", &d.api_url),
            api_key: profiled_env_or(p, "OPENAI_API_KEY", &d.api_key),
            model: profiled_env_or(p, "OPENAI_MODEL", &d.model),
            request_timeout_secs: profiled_env_u64(p, "OPENAI_REQUEST_TIMEOUT", d.request_timeout_secs),
            stream_timeout_secs: profiled_env_u64(p, "OPENAI_STREAM_TIMEOUT", d.stream_timeout_secs),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key != DUMMY_API_KEY
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    /// Chat completions endpoint derived from `api_url`.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_url.trim_end_matches('/'))
    }
}

// ── Chat orchestration ────────────────────────────────────────

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are OikOS Assistant, a helpful AI that helps users manage their personal finances, nutrition and health.

Capabilities:
- Record income/expense transactions when the user asks (use the create_transaction tool)
- Answer questions about finance, nutrition and health
- Use the available tools to look up the user's data instead of guessing

Rules:
- Be concise and friendly
- Confirm when you perform an action
- Ask again if the information is insufficient";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Number of most recent history messages used as prompt context.
    pub memory_limit: usize,
    /// Hard cap on completion calls per turn.
    pub max_iterations: usize,
    /// Capacity of the bounded channels between decoder, loop and transport.
    pub stream_buffer: usize,
    pub system_prompt: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            memory_limit: 10,
            max_iterations: 5,
            stream_buffer: 64,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl ChatConfig {
    fn from_env_profiled(p: &str) -> Self {
        let d = Self::default();
        Self {
            memory_limit: profiled_env_usize(p, "OPENAI_MEMORY_LIMIT", d.memory_limit),
            max_iterations: profiled_env_usize(p, "CHAT_MAX_ITERATIONS", d.max_iterations).max(1),
            stream_buffer: profiled_env_usize(p, "CHAT_STREAM_BUFFER", d.stream_buffer).max(1),
            system_prompt: profiled_env_or(p, "CHAT_SYSTEM_PROMPT", &d.system_prompt),
        }
    }
}
