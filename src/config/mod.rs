// Configuration module entry point
// Loads layered settings and holds the shared runtime state

mod state;
mod types;

use std::net::SocketAddr;

// Re-export public types
pub use state::AppState;
pub use types::{AssemblerConfig, Config, HttpConfig};

/// Default config file name (without extension)
pub const DEFAULT_CONFIG_PATH: &str = "config";

impl Config {
    /// Load configuration from specified file path (without extension)
    ///
    /// Missing files are fine; environment variables prefixed with
    /// `ASMCHECK__` override file values (e.g. `ASMCHECK__SERVER__PORT`).
    /// `ASMCHECK__ASSEMBLER__FLAGS` is split on spaces.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        Self::load_with_env(config_path, environment())
    }

    fn load_with_env(
        config_path: &str,
        env: config::Environment,
    ) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(env)
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("performance.write_timeout", 30)?
            .set_default("performance.shutdown_timeout", 10)?
            .set_default("http.server_name", "asm-validator")?
            .set_default("http.enable_cors", false)?
            .set_default("http.max_body_size", 1_048_576)? // 1MB
            .set_default("assembler.binary", "arm-linux-gnueabihf-as")?
            .set_default("assembler.flags", vec!["-mthumb"])?
            .set_default("assembler.locale", "en")?
            .set_default("assembler.timeout_ms", 10_000)?
            .set_default("assembler.max_source_bytes", 262_144)? // 256KB
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Cross-field checks the serde layer cannot express
    fn validate(&self) -> Result<(), config::ConfigError> {
        // The connection timeout must outlive the assembler, otherwise a slow
        // assembly drops the socket instead of answering 504
        let connection_ms = self
            .performance
            .read_timeout
            .max(self.performance.write_timeout)
            .saturating_mul(1000);
        if self.assembler.timeout_ms >= connection_ms {
            return Err(config::ConfigError::Message(format!(
                "assembler.timeout_ms ({}) must be below the connection timeout ({connection_ms} ms)",
                self.assembler.timeout_ms
            )));
        }
        Ok(())
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix("ASMCHECK")
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
        .list_separator(" ")
        .with_list_parse_key("assembler.flags")
}

#[cfg(test)]
use types::{HealthConfig, LoggingConfig, PerformanceConfig, ServerConfig};

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                workers: None,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                access_log: false,
                access_log_format: "combined".to_string(),
                access_log_file: None,
                error_log_file: None,
            },
            performance: PerformanceConfig {
                keep_alive_timeout: 75,
                read_timeout: 30,
                write_timeout: 30,
                max_connections: None,
                shutdown_timeout: 10,
            },
            http: HttpConfig {
                server_name: "asm-validator".to_string(),
                enable_cors: false,
                max_body_size: 1_048_576,
            },
            health: HealthConfig::default(),
            assembler: AssemblerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let cfg = Config::load_from("does-not-exist/config").unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.assembler.binary, "arm-linux-gnueabihf-as");
        assert_eq!(cfg.assembler.flags, vec!["-mthumb".to_string()]);
        assert_eq!(cfg.assembler.placeholder, "input.S");
        assert_eq!(cfg.logging.access_log_format, "combined");
        assert!(cfg.health.enabled);
        assert_eq!(cfg.health.readiness_path, "/readyz");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 9100

[assembler]
binary = "/opt/cross/bin/as"
flags = ["-mthumb", "-mcpu=cortex-m0"]
timeout_ms = 2500
"#,
        )
        .unwrap();

        let stem = path.with_extension("");
        let cfg = Config::load_from(stem.to_str().unwrap()).unwrap();
        assert_eq!(cfg.server.port, 9100);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.assembler.binary, "/opt/cross/bin/as");
        assert_eq!(cfg.assembler.flags.len(), 2);
        assert_eq!(cfg.assembler.timeout().as_millis(), 2500);
        assert_eq!(cfg.assembler.locale, "en");
    }

    fn env_with(vars: &[(&str, &str)]) -> config::Environment {
        let map = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        environment().source(Some(map))
    }

    #[test]
    fn test_env_flags_split_into_list() {
        let env = env_with(&[
            ("ASMCHECK__ASSEMBLER__FLAGS", "-mthumb -mcpu=cortex-m0"),
            ("ASMCHECK__SERVER__PORT", "9200"),
        ]);
        let cfg = Config::load_with_env("does-not-exist/config", env).unwrap();
        assert_eq!(
            cfg.assembler.flags,
            vec!["-mthumb".to_string(), "-mcpu=cortex-m0".to_string()]
        );
        assert_eq!(cfg.server.port, 9200);
        assert_eq!(cfg.assembler.binary, "arm-linux-gnueabihf-as");
    }

    #[test]
    fn test_env_single_flag() {
        let env = env_with(&[("ASMCHECK__ASSEMBLER__FLAGS", "-mthumb")]);
        let cfg = Config::load_with_env("does-not-exist/config", env).unwrap();
        assert_eq!(cfg.assembler.flags, vec!["-mthumb".to_string()]);
    }

    #[test]
    fn test_assembler_timeout_must_fit_connection_timeout() {
        let env = env_with(&[
            ("ASMCHECK__PERFORMANCE__READ_TIMEOUT", "1"),
            ("ASMCHECK__PERFORMANCE__WRITE_TIMEOUT", "1"),
            ("ASMCHECK__ASSEMBLER__TIMEOUT_MS", "2000"),
        ]);
        let err = Config::load_with_env("does-not-exist/config", env).unwrap_err();
        assert!(err.to_string().contains("assembler.timeout_ms"));

        // Equal is rejected too: both timers would race
        let env = env_with(&[
            ("ASMCHECK__PERFORMANCE__READ_TIMEOUT", "2"),
            ("ASMCHECK__PERFORMANCE__WRITE_TIMEOUT", "1"),
            ("ASMCHECK__ASSEMBLER__TIMEOUT_MS", "2000"),
        ]);
        assert!(Config::load_with_env("does-not-exist/config", env).is_err());

        let env = env_with(&[
            ("ASMCHECK__PERFORMANCE__READ_TIMEOUT", "3"),
            ("ASMCHECK__PERFORMANCE__WRITE_TIMEOUT", "1"),
            ("ASMCHECK__ASSEMBLER__TIMEOUT_MS", "2000"),
        ]);
        let cfg = Config::load_with_env("does-not-exist/config", env).unwrap();
        assert_eq!(cfg.assembler.timeout_ms, 2000);
    }

    #[test]
    fn test_default_config_passes_validation() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_socket_addr() {
        let cfg = Config::default();
        assert_eq!(cfg.get_socket_addr().unwrap().to_string(), "127.0.0.1:0");

        let mut bad = Config::default();
        bad.server.host = "not an ip".to_string();
        assert!(bad.get_socket_addr().is_err());
    }
}
