use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_PORT: u16 = 8501;

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
    pub embedding_model: String,
    pub temperature: f32,
}

impl ProviderConfig {
    pub fn from_env(provider: &str) -> Self {
        Self::from_lookup(provider, |key| env::var(key).ok())
    }

    pub fn from_lookup<F>(provider: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = provider.to_uppercase();

        // An empty key in .env counts as missing
        let api_key = lookup(&format!("{}_API_KEY", prefix))
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let api_url = lookup(&format!("{}_API_URL", prefix))
            .unwrap_or_else(|| match provider {
                "gemini" => "https://generativelanguage.googleapis.com/v1beta".to_string(),
                _ => String::new(),
            })
            .trim_end_matches('/')
            .to_string();

        let model = lookup(&format!("{}_MODEL", prefix))
            .unwrap_or_else(|| "gemini-2.0-flash".to_string());

        let embedding_model = lookup(&format!("{}_EMBEDDING_MODEL", prefix))
            .unwrap_or_else(|| "embedding-001".to_string());

        let temperature = parse_or(lookup(&format!("{}_TEMPERATURE", prefix)), 0.7);

        Self {
            api_key,
            api_url,
            model,
            embedding_model,
            temperature,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub provider: ProviderConfig,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub hyde_enabled: bool,
    pub upload_dir: PathBuf,
    pub vector_db_path: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let provider = ProviderConfig::from_lookup("gemini", &lookup);

        let hyde_enabled = lookup("HYDE_ENABLED")
            .map(|v| !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(true);

        Self {
            provider,
            chunk_size: parse_or(lookup("CHUNK_SIZE"), 1000),
            chunk_overlap: parse_or(lookup("CHUNK_OVERLAP"), 200),
            top_k: parse_or(lookup("TOP_K"), 3),
            hyde_enabled,
            upload_dir: lookup("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("uploads")),
            vector_db_path: lookup("VECTOR_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("chroma_db/vectors.sqlite3")),
            max_upload_bytes: parse_or(lookup("MAX_UPLOAD_BYTES"), 20 * 1024 * 1024),
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
