#[cfg(test)]
mod tests {
    use crate::config::{self, AppConfig};
    use std::env;
    use std::fs;
    use std::sync::Mutex;

    // Tests, die Umgebungsvariablen anfassen, laufen sonst parallel gegeneinander.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn env_guard() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn test_valid_config_does_not_error() {
        let _guard = env_guard();
        let result = config::load();
        assert!(result.is_ok());
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.url, "sqlite://data/mediscan.db");
        assert_eq!(config.storage.media_dir, "data/media");
        assert_eq!(config.storage.public_base, "/media");
        assert_eq!(config.storage.max_file_bytes, 52_428_800);
        assert_eq!(config.storage.thumbnail_max_edge, 200);
        assert_eq!(config.storage.thumbnail_quality, 70);
        assert_eq!(config.auth.token_ttl_hours, 24);
        assert_eq!(config.auth.min_password_length, 6);
        assert!(!config.auth.require_email_confirmation);
        assert_eq!(config.analysis.progress_interval_ms, 300);
        assert_eq!(config.analysis.min_duration_ms, 3000);
        assert_eq!(config.analysis.max_duration_ms, 5000);
        assert!(config.analysis.rng_seed.is_none());
    }

    #[test]
    fn test_default_config_passes_validation() {
        assert!(config::validate(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_server_port() {
        let _guard = env_guard();
        env::set_var("MEDISCAN__SERVER__PORT", "0");
        let result = config::load();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("invalid server.port"));
        env::remove_var("MEDISCAN__SERVER__PORT");
    }

    #[test]
    fn test_config_from_env() {
        let _guard = env_guard();
        env::set_var("MEDISCAN__SERVER__HOST", "0.0.0.0");
        env::set_var("MEDISCAN__SERVER__PORT", "3000");
        env::set_var("MEDISCAN__DATABASE__URL", "sqlite://test.db");
        env::set_var("MEDISCAN__AUTH__REQUIRE_EMAIL_CONFIRMATION", "true");
        env::set_var("MEDISCAN__ANALYSIS__RNG_SEED", "7");

        let config = crate::config::load().unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.url, "sqlite://test.db");
        assert!(config.auth.require_email_confirmation);
        assert_eq!(config.analysis.rng_seed, Some(7));

        env::remove_var("MEDISCAN__SERVER__HOST");
        env::remove_var("MEDISCAN__SERVER__PORT");
        env::remove_var("MEDISCAN__DATABASE__URL");
        env::remove_var("MEDISCAN__AUTH__REQUIRE_EMAIL_CONFIRMATION");
        env::remove_var("MEDISCAN__ANALYSIS__RNG_SEED");
    }

    #[test]
    fn test_config_from_file() {
        let _guard = env_guard();
        let config_content = r#"
[server]
host = "192.168.1.1"
port = 9000

[auth]
require_email_confirmation = true

[analysis]
min_duration_ms = 50
max_duration_ms = 100
"#;
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("override.toml");
        fs::write(&config_path, config_content).unwrap();

        env::set_var("MEDISCAN_CONFIG", config_path.to_str().unwrap());

        let config = crate::config::load().unwrap();

        assert_eq!(config.server.host, "192.168.1.1");
        assert_eq!(config.server.port, 9000);
        assert!(config.auth.require_email_confirmation);
        assert_eq!(config.analysis.min_duration_ms, 50);
        assert_eq!(config.analysis.max_duration_ms, 100);
        // Nicht überschriebene Werte kommen weiter aus den Defaults.
        assert_eq!(config.database.url, "sqlite://data/mediscan.db");

        env::remove_var("MEDISCAN_CONFIG");
    }

    #[test]
    fn test_config_priority() {
        // Environment variables override file config
        let _guard = env_guard();
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("override.toml");
        fs::write(&config_path, "[server]\nport = 7000\n").unwrap();

        env::set_var("MEDISCAN_CONFIG", config_path.to_str().unwrap());
        env::set_var("MEDISCAN__SERVER__PORT", "8888");

        let config = crate::config::load().unwrap();
        assert_eq!(config.server.port, 8888);

        env::remove_var("MEDISCAN_CONFIG");
        env::remove_var("MEDISCAN__SERVER__PORT");
    }

    #[test]
    fn test_storage_validation_rules() {
        let mut cfg = AppConfig::default();
        cfg.storage.max_file_bytes = 0;
        let err = config::validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("storage.max_file_bytes must be > 0"));

        let mut cfg = AppConfig::default();
        cfg.storage.thumbnail_max_edge = 0;
        assert!(config::validate(&cfg).unwrap_err().to_string().contains("1..=4096"));

        let mut cfg = AppConfig::default();
        cfg.storage.thumbnail_max_edge = 5000;
        assert!(config::validate(&cfg).unwrap_err().to_string().contains("1..=4096"));

        let mut cfg = AppConfig::default();
        cfg.storage.thumbnail_quality = 101;
        assert!(config::validate(&cfg).unwrap_err().to_string().contains("1..=100"));

        let mut cfg = AppConfig::default();
        cfg.storage.public_base = "media".to_string();
        assert!(config::validate(&cfg).unwrap_err().to_string().contains("absolute URL path"));
    }

    #[test]
    fn test_auth_validation_rules() {
        let mut cfg = AppConfig::default();
        cfg.auth.jwt_secret = "   ".to_string();
        assert!(config::validate(&cfg).unwrap_err().to_string().contains("jwt_secret"));

        let mut cfg = AppConfig::default();
        cfg.auth.token_ttl_hours = 0;
        assert!(config::validate(&cfg).unwrap_err().to_string().contains("token_ttl_hours"));

        let mut cfg = AppConfig::default();
        cfg.auth.min_password_length = 0;
        assert!(config::validate(&cfg).unwrap_err().to_string().contains("min_password_length"));
    }

    #[test]
    fn test_analysis_validation_rules() {
        let mut cfg = AppConfig::default();
        cfg.analysis.progress_interval_ms = 0;
        assert!(config::validate(&cfg).unwrap_err().to_string().contains("progress_interval_ms"));

        let mut cfg = AppConfig::default();
        cfg.analysis.min_duration_ms = 0;
        assert!(config::validate(&cfg).unwrap_err().to_string().contains("min_duration_ms"));

        let mut cfg = AppConfig::default();
        cfg.analysis.min_duration_ms = 5000;
        cfg.analysis.max_duration_ms = 3000;
        let err = config::validate(&cfg).unwrap_err();
        assert!(err.to_string().contains("max_duration_ms must be >= analysis.min_duration_ms"));
    }

    #[test]
    fn test_ensure_sqlite_parent_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("subdir/test.db");
        let db_url = format!("sqlite://{}", db_path.display());

        assert!(!db_path.parent().unwrap().exists());

        crate::config::ensure_sqlite_parent_dir(&db_url).unwrap();

        assert!(db_path.parent().unwrap().exists());
    }

    #[test]
    fn test_ensure_sqlite_parent_dir_non_sqlite() {
        // Non-SQLite URL should not create directories
        let result = crate::config::ensure_sqlite_parent_dir("postgres://localhost/db");
        assert!(result.is_ok());
    }
}
