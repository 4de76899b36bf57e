//! Configuration loading and validation.
//!
//! The CLI flags form the base configuration. An optional YAML file
//! (`--config`) and `ALERTEA_`-prefixed environment variables are merged on
//! top, so deployments can keep secrets out of the process arguments.

use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::Error;

/// CLI surface. One command, flags only.
#[derive(Parser, Debug)]
#[command(
    name = "alertea",
    version,
    about = "AlerTea is a backend notification service for the exmonitor system."
)]
pub struct Args {
    /// Path to a YAML configuration file merged over the flag values
    #[arg(short = 'c', long, env = "ALERTEA_CONFIG")]
    pub config: Option<String>,

    /// Enable logging to file
    #[arg(long)]
    pub log_to_file: bool,

    /// Filepath of the log output, used only with --log-to-file
    #[arg(long, default_value = "./notification.log")]
    pub log_file: PathBuf,

    /// Filepath of the error log output, used only with --log-to-file
    #[arg(long, default_value = "./notification.error.log")]
    pub log_error_file: PathBuf,

    /// Database driver used for the store connection
    #[arg(long, value_enum, default_value = "dummydb")]
    pub db_driver: StoreDriver,

    /// Elasticsearch connection string
    #[arg(long, default_value = "http://127.0.0.1:9200")]
    pub elastic_connection: String,

    /// Maria database connection string (host or host:port)
    #[arg(long, default_value = "")]
    pub maria_connection: String,

    /// Maria database name
    #[arg(long, default_value = "")]
    pub maria_database_name: String,

    /// Maria database user
    #[arg(long, default_value = "")]
    pub maria_user: String,

    /// Maria database password
    #[arg(long, default_value = "")]
    pub maria_password: String,

    /// Enable caching of store records
    #[arg(long)]
    pub cache: bool,

    /// Cache TTL in duration format, e.g. 5m. Values below 1m make little sense
    #[arg(long, default_value = "5m")]
    pub cache_ttl: String,

    /// Use the real SMTP server. When false, emails are printed to stdout
    #[arg(
        long = "smtp",
        default_value_t = true,
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub smtp: bool,

    /// Default email used in 'From'
    #[arg(long, default_value = "alert@alertea.com")]
    pub smtp_email_from: String,

    /// Hostname of the SMTP server
    #[arg(long, default_value = "127.0.0.1")]
    pub smtp_server: String,

    /// Port of the SMTP server
    #[arg(long, default_value_t = 0)]
    pub smtp_port: u16,

    /// Username for the SMTP server
    #[arg(long, default_value = "alert@alertea.com")]
    pub smtp_user: String,

    /// Password for the SMTP server
    #[arg(long = "smtp-passwrd", default_value = "")]
    pub smtp_passwrd: String,

    /// Enable more verbose logging
    #[arg(short = 'v', long)]
    pub debug: bool,

    /// Log elapsed time of store queries and tick passes (shown at debug level)
    #[arg(long)]
    pub time_profiling: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub store: StoreConfig,
    pub smtp: SmtpConfig,
    pub gateways: GatewayConfig,
    pub time_profiling: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub debug: bool,
    pub log_to_file: bool,
    pub log_file: PathBuf,
    pub log_error_file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreDriver {
    /// Fixture-backed in-memory store, mirrors a small exmonitor installation
    Dummydb,
    /// Elasticsearch for observations plus MariaDB for service metadata
    Elasticmaria,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub driver: StoreDriver,
    pub elastic_connection: String,
    pub maria: MariaConfig,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MariaConfig {
    pub connection: String,
    pub database_name: String,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub enabled: bool,
    pub email_from: String,
    pub server: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Negotiate STARTTLS with the server. Disable only for local testing
    pub tls: bool,
    /// Accept self-signed server certificates. Deployment decision for
    /// installations running their own postfix with a self-signed cert
    pub accept_invalid_certs: bool,
    /// Close the SMTP session after this long without an outgoing email
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP endpoint of the SMS gateway. Unset means log-only delivery
    pub sms_url: Option<String>,
    /// HTTP endpoint of the voice-call gateway. Unset means log-only delivery
    pub voice_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            store: StoreConfig::default(),
            smtp: SmtpConfig::default(),
            gateways: GatewayConfig::default(),
            time_profiling: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            debug: false,
            log_to_file: false,
            log_file: PathBuf::from("./notification.log"),
            log_error_file: PathBuf::from("./notification.error.log"),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            driver: StoreDriver::Dummydb,
            elastic_connection: "http://127.0.0.1:9200".to_string(),
            maria: MariaConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Default for MariaConfig {
    fn default() -> Self {
        Self {
            connection: String::new(),
            database_name: String::new(),
            user: String::new(),
            password: String::new(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: Duration::from_secs(5 * 60),
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            email_from: "alert@alertea.com".to_string(),
            server: "127.0.0.1".to_string(),
            port: 0,
            user: "alert@alertea.com".to_string(),
            password: String::new(),
            tls: true,
            accept_invalid_certs: false,
            idle_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::from_args(args)?));
        if let Some(path) = &args.config {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Self = figment
            .merge(Env::prefixed("ALERTEA_").split("__"))
            .extract()
            .map_err(|e| Error::invalid_config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn from_args(args: &Args) -> Result<Self, Error> {
        let cache_ttl = humantime::parse_duration(&args.cache_ttl).map_err(|e| {
            Error::invalid_config(format!(
                "{} is not a valid duration for --cache-ttl: {e}",
                args.cache_ttl
            ))
        })?;

        Ok(Self {
            logging: LoggingConfig {
                debug: args.debug,
                log_to_file: args.log_to_file,
                log_file: args.log_file.clone(),
                log_error_file: args.log_error_file.clone(),
            },
            store: StoreConfig {
                driver: args.db_driver,
                elastic_connection: args.elastic_connection.clone(),
                maria: MariaConfig {
                    connection: args.maria_connection.clone(),
                    database_name: args.maria_database_name.clone(),
                    user: args.maria_user.clone(),
                    password: args.maria_password.clone(),
                },
                cache: CacheConfig {
                    enabled: args.cache,
                    ttl: cache_ttl,
                },
            },
            smtp: SmtpConfig {
                enabled: args.smtp,
                email_from: args.smtp_email_from.clone(),
                server: args.smtp_server.clone(),
                port: args.smtp_port,
                user: args.smtp_user.clone(),
                password: args.smtp_passwrd.clone(),
                ..SmtpConfig::default()
            },
            gateways: GatewayConfig::default(),
            time_profiling: args.time_profiling,
        })
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        if self.smtp.enabled {
            if self.smtp.server.is_empty() {
                return Err(Error::invalid_config("smtp.server must not be empty"));
            }
            if self.smtp.port == 0 {
                return Err(Error::invalid_config("smtp.port must not be zero"));
            }
            if self.smtp.user.is_empty() {
                return Err(Error::invalid_config("smtp.user must not be empty"));
            }
            if self.smtp.password.is_empty() {
                return Err(Error::invalid_config("smtp.password must not be empty"));
            }
            if self.smtp.email_from.is_empty() {
                return Err(Error::invalid_config("smtp.email_from must not be empty"));
            }
        }

        if self.store.driver == StoreDriver::Elasticmaria {
            if self.store.elastic_connection.is_empty() {
                return Err(Error::invalid_config("store.elastic_connection must not be empty"));
            }
            if self.store.maria.connection.is_empty() {
                return Err(Error::invalid_config("store.maria.connection must not be empty"));
            }
            if self.store.maria.database_name.is_empty() {
                return Err(Error::invalid_config("store.maria.database_name must not be empty"));
            }
            if self.store.maria.user.is_empty() {
                return Err(Error::invalid_config("store.maria.user must not be empty"));
            }
        }

        Ok(())
    }

    /// Non-fatal configuration oddities, logged once telemetry is up.
    pub fn startup_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.time_profiling && !self.logging.debug {
            warnings.push(
                "time profiling is shown via debug log, enable --debug to see its output".to_string(),
            );
        }
        if self.store.cache.enabled && self.store.cache.ttl < Duration::from_secs(60) {
            warnings.push(format!(
                "cache ttl of {:?} is below one minute and will mostly miss",
                self.store.cache.ttl
            ));
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn default_args() -> Args {
        Args::parse_from(["alertea"])
    }

    #[test]
    fn test_flag_defaults() {
        let args = default_args();
        let config = Config::from_args(&args).unwrap();

        assert_eq!(config.store.driver, StoreDriver::Dummydb);
        assert_eq!(config.store.elastic_connection, "http://127.0.0.1:9200");
        assert_eq!(config.store.cache.ttl, Duration::from_secs(300));
        assert!(config.smtp.enabled);
        assert_eq!(config.smtp.email_from, "alert@alertea.com");
        assert!(!config.time_profiling);
    }

    #[test]
    fn test_smtp_disabled_via_flag() {
        let args = Args::parse_from(["alertea", "--smtp", "false"]);
        let config = Config::from_args(&args).unwrap();
        assert!(!config.smtp.enabled);
    }

    #[test]
    fn test_invalid_cache_ttl() {
        let args = Args::parse_from(["alertea", "--cache-ttl", "not-a-duration"]);
        let result = Config::from_args(&args);
        assert!(result.is_err());
    }

    #[test]
    fn test_yaml_overrides_flags() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
smtp:
  server: mail.example.com
  port: 587
  password: hunter2
store:
  cache:
    enabled: true
    ttl: 10m
"#,
            )?;

            let args = Args::parse_from(["alertea", "--config", "test.yaml"]);
            let config = Config::load(&args).expect("config should load");

            assert_eq!(config.smtp.server, "mail.example.com");
            assert_eq!(config.smtp.port, 587);
            assert!(config.store.cache.enabled);
            assert_eq!(config.store.cache.ttl, Duration::from_secs(600));
            // untouched flag defaults survive the merge
            assert_eq!(config.smtp.email_from, "alert@alertea.com");

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.set_env("ALERTEA_SMTP__SERVER", "smtp.internal");
            jail.set_env("ALERTEA_SMTP__PORT", "2525");
            jail.set_env("ALERTEA_SMTP__PASSWORD", "secret");

            let args = Args::parse_from(["alertea"]);
            let config = Config::load(&args).expect("config should load");

            assert_eq!(config.smtp.server, "smtp.internal");
            assert_eq!(config.smtp.port, 2525);

            Ok(())
        });
    }

    #[test]
    fn test_validation_rejects_smtp_without_port() {
        let args = default_args();
        let mut config = Config::from_args(&args).unwrap();
        config.smtp.password = "secret".to_string();
        config.smtp.port = 0;

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("smtp.port"));
    }

    #[test]
    fn test_validation_skipped_when_smtp_disabled() {
        let args = Args::parse_from(["alertea", "--smtp", "false"]);
        let config = Config::from_args(&args).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_incomplete_maria() {
        let args = Args::parse_from([
            "alertea",
            "--smtp",
            "false",
            "--db-driver",
            "elasticmaria",
            "--maria-connection",
            "127.0.0.1:3306",
        ]);
        let config = Config::from_args(&args).unwrap();

        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("maria.database_name"));
    }

    #[test]
    fn test_profiling_without_debug_warns() {
        let args = Args::parse_from(["alertea", "--smtp", "false", "--time-profiling"]);
        let config = Config::from_args(&args).unwrap();
        assert_eq!(config.startup_warnings().len(), 1);
    }
}
