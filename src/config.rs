use crate::schema::Schema;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub client: ClientConfig,
    #[serde(default)]
    pub producer: ProducerConfig,
    #[serde(default)]
    pub template: TemplateConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    pub service_url: String,
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProducerConfig {
    #[serde(default)]
    pub schema: Schema,
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    #[serde(default = "default_max_pending_messages")]
    pub max_pending_messages: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct TemplateConfig {
    #[serde(default)]
    pub default_topic: Option<String>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            schema: Schema::default(),
            send_timeout_ms: default_send_timeout_ms(),
            max_pending_messages: default_max_pending_messages(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("PULSAR_TEMPLATE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.client.service_url.trim().is_empty() {
            return Err(Error::Config("client.service_url must not be empty".to_string()));
        }
        if self.producer.max_pending_messages == 0 {
            return Err(Error::Config(
                "producer.max_pending_messages must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_operation_timeout() -> u64 {
    30
}

fn default_send_timeout_ms() -> u64 {
    30_000
}

fn default_max_pending_messages() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaType;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let file = write_config(
            r#"
            [client]
            service_url = "pulsar://localhost:6650"
            "#,
        );

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.client.service_url, "pulsar://localhost:6650");
        assert_eq!(config.client.operation_timeout_secs, 30);
        assert_eq!(config.producer.schema, Schema::bytes());
        assert_eq!(config.producer.send_timeout_ms, 30_000);
        assert_eq!(config.producer.max_pending_messages, 1000);
    }

    #[test]
    fn test_full_config() {
        let file = write_config(
            r#"
            [client]
            service_url = "pulsar+ssl://broker:6651"
            operation_timeout_secs = 5

            [producer]
            send_timeout_ms = 1500
            max_pending_messages = 16

            [producer.schema]
            type = "json"

            [template]
            default_topic = "orders"
            "#,
        );

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.client.operation_timeout_secs, 5);
        assert_eq!(config.producer.schema.schema_type, SchemaType::Json);
        assert_eq!(config.producer.send_timeout_ms, 1500);
        assert_eq!(config.producer.max_pending_messages, 16);
        assert_eq!(config.template.default_topic.as_deref(), Some("orders"));
    }

    #[test]
    fn test_missing_service_url_is_an_error() {
        let file = write_config(
            r#"
            [template]
            default_topic = "orders"
            "#,
        );

        assert!(matches!(Config::from_file(file.path()), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_pending_messages_rejected() {
        let file = write_config(
            r#"
            [client]
            service_url = "pulsar://localhost:6650"

            [producer]
            max_pending_messages = 0
            "#,
        );

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("max_pending_messages"));
    }
}
