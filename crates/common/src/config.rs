/// Where the signal log snapshot is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportBackend {
    Csv { path: String },
    Sqlite { database_url: String },
}

/// Process configuration loaded from environment variables at startup.
/// Tuning knobs for the decision engine live in the TOML agent config
/// (`AGENT_CONFIG_PATH`); this struct only covers deployment concerns.
#[derive(Debug, Clone)]
pub struct Config {
    // Agent config file path
    pub agent_config_path: String,

    // Export
    pub export: ExportBackend,

    // Narrative generation
    pub hf_api_key: Option<String>,
    pub narrative_endpoint: String,
    pub narrative_model: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// Loads `.env` if present. Panics on an invalid or missing required variable.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let export = match optional_env("EXPORT_BACKEND")
            .unwrap_or_else(|| "csv".to_string())
            .to_lowercase()
            .as_str()
        {
            "csv" => ExportBackend::Csv {
                path: optional_env("SIGNAL_LOG_PATH")
                    .unwrap_or_else(|| "signal_log.csv".to_string()),
            },
            "sqlite" => ExportBackend::Sqlite {
                database_url: required_env("DATABASE_URL"),
            },
            other => panic!("ERROR: EXPORT_BACKEND must be 'csv' or 'sqlite', got: '{other}'"),
        };

        Config {
            agent_config_path: optional_env("AGENT_CONFIG_PATH")
                .unwrap_or_else(|| "config/agent.toml".to_string()),
            export,
            hf_api_key: optional_env("HF_API_KEY").filter(|k| !k.trim().is_empty()),
            narrative_endpoint: optional_env("NARRATIVE_ENDPOINT").unwrap_or_else(|| {
                "https://router.huggingface.co/v1/chat/completions".to_string()
            }),
            narrative_model: optional_env("NARRATIVE_MODEL")
                .unwrap_or_else(|| "meta-llama/Llama-3.1-8B-Instruct".to_string()),
        }
    }
}

fn required_env(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| {
        panic!("Required environment variable '{key}' is not set. Check your .env file.")
    })
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
