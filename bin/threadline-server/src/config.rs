//! Server configuration, loaded from environment variables at startup.

/// Runtime configuration for threadline-server.
///
/// Every field has a sensible default so the server works out-of-the-box
/// without any environment variables set. Model provider credentials are
/// the one exception: genai reads those itself (`OPENAI_API_KEY`, …).
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3000"`).
    pub bind_address: String,

    /// SQLite (or other) database URL (default: `"sqlite://threadline.db"`).
    /// Supports any sqlx-compatible connection string – swap the scheme to
    /// migrate to Postgres (`postgres://…`) or MySQL (`mysql://…`).
    pub database_url: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Model identifier passed to genai, e.g. `"gpt-4o-mini"` or
    /// `"claude-3-5-haiku-latest"`. The provider is inferred from the name.
    pub model: String,

    /// Comma-separated CORS origin allowlist. Unset means any origin,
    /// which suits local development.
    pub cors_allowed_origins: Option<String>,

    /// Serve the Swagger UI at `/swagger-ui` (default: on).
    pub enable_swagger: bool,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("THREADLINE_BIND", "0.0.0.0:3000"),
            database_url: env_or("THREADLINE_DATABASE_URL", "sqlite://threadline.db"),
            log_level: env_or("THREADLINE_LOG", "info"),
            log_json: std::env::var("THREADLINE_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            model: env_or("THREADLINE_MODEL", "gpt-4o-mini"),
            cors_allowed_origins: std::env::var("THREADLINE_CORS_ORIGINS").ok(),
            enable_swagger: std::env::var("THREADLINE_ENABLE_SWAGGER")
                .map(|v| !(v == "0" || v.eq_ignore_ascii_case("false")))
                .unwrap_or(true),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}
