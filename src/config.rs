use std::path::Path;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub media_dir: String,
    pub public_base: String,
    pub max_file_bytes: u64,
    pub thumbnail_max_edge: u32,
    pub thumbnail_quality: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub min_password_length: usize,
    pub require_email_confirmation: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    pub progress_interval_ms: u64,
    pub min_duration_ms: u64,
    pub max_duration_ms: u64,
    pub rng_seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityConfig {
    pub enable_hsts: Option<bool>,
    pub hsts_max_age: Option<u64>,
    pub hsts_include_subdomains: Option<bool>,
    pub csp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub analysis: AnalysisConfig,
    pub security: Option<SecurityConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        let defaults: &str = include_str!("../config/default.toml");
        match ::config::Config::builder()
            .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
            .build()
        {
            Ok(cfg) => match cfg.try_deserialize() {
                Ok(app_cfg) => app_cfg,
                Err(e) => {
                    eprintln!("FATAL: Failed to deserialize default config: {}", e);
                    panic!("Failed to deserialize default config: {}", e);
                }
            },
            Err(e) => {
                eprintln!("FATAL: Failed to parse default config: {}", e);
                panic!("Failed to parse default config: {}", e);
            }
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        // Mirror defaults from config/default.toml
        Self { progress_interval_ms: 300, min_duration_ms: 3000, max_duration_ms: 5000, rng_seed: None }
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();

    let defaults: &str = include_str!("../config/default.toml");
    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
        // Optional local file: mediscan.toml (in CWD)
        .add_source(::config::File::with_name("mediscan").required(false));

    if let Ok(custom_path) = std::env::var("MEDISCAN_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    // Environment variables last to have highest precedence
    builder = builder.add_source(::config::Environment::with_prefix("MEDISCAN").separator("__"));

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    // Server
    if cfg.server.port == 0 {
        return Err(anyhow::anyhow!("invalid server.port: {}", cfg.server.port));
    }
    // Warn for privileged ports on Unix-like systems
    #[cfg(unix)]
    if cfg.server.port < 1024 {
        tracing::warn!("Using privileged port {} - may require elevated permissions", cfg.server.port);
    }

    // Storage
    if cfg.storage.max_file_bytes == 0 {
        return Err(anyhow::anyhow!("storage.max_file_bytes must be > 0"));
    }
    if cfg.storage.thumbnail_max_edge == 0 || cfg.storage.thumbnail_max_edge > 4096 {
        return Err(anyhow::anyhow!("storage.thumbnail_max_edge must be in 1..=4096"));
    }
    if cfg.storage.thumbnail_quality == 0 || cfg.storage.thumbnail_quality > 100 {
        return Err(anyhow::anyhow!("storage.thumbnail_quality must be in 1..=100"));
    }
    if cfg.storage.public_base.is_empty() || !cfg.storage.public_base.starts_with('/') {
        return Err(anyhow::anyhow!("storage.public_base must be an absolute URL path"));
    }

    // Auth
    if cfg.auth.jwt_secret.trim().is_empty() {
        return Err(anyhow::anyhow!("auth.jwt_secret must not be blank"));
    }
    if cfg.auth.token_ttl_hours <= 0 {
        return Err(anyhow::anyhow!("auth.token_ttl_hours must be > 0"));
    }
    if cfg.auth.min_password_length == 0 {
        return Err(anyhow::anyhow!("auth.min_password_length must be > 0"));
    }
    if !cfg!(debug_assertions) && cfg.auth.jwt_secret == AppConfig::default().auth.jwt_secret {
        tracing::warn!("auth.jwt_secret is still the shipped development default");
    }

    // Analysis
    if cfg.analysis.progress_interval_ms == 0 {
        return Err(anyhow::anyhow!("analysis.progress_interval_ms must be > 0"));
    }
    if cfg.analysis.min_duration_ms == 0 {
        return Err(anyhow::anyhow!("analysis.min_duration_ms must be > 0"));
    }
    if cfg.analysis.max_duration_ms < cfg.analysis.min_duration_ms {
        return Err(anyhow::anyhow!("analysis.max_duration_ms must be >= analysis.min_duration_ms"));
    }

    Ok(())
}

pub fn ensure_sqlite_parent_dir(url: &str) -> anyhow::Result<()> {
    if let Some(path) = url.strip_prefix("sqlite://") {
        let p = Path::new(path);
        if let Some(parent) = p.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
