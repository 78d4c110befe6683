use serde::{Deserialize, Serialize};

/// Payload schema family understood by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    #[default]
    Bytes,
    String,
    Json,
    Avro,
    Protobuf,
}

/// Opaque schema descriptor handed to the wire client.
///
/// This crate never encodes payloads with it; the producer created for a
/// topic applies it, and a per-message override may replace it for one send.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
pub struct Schema {
    #[serde(rename = "type", default)]
    pub schema_type: SchemaType,
    /// Schema definition for structured types (e.g. an Avro or JSON schema document).
    #[serde(default)]
    pub definition: Option<String>,
}

impl Schema {
    pub fn bytes() -> Self {
        Self::of(SchemaType::Bytes)
    }

    pub fn string() -> Self {
        Self::of(SchemaType::String)
    }

    pub fn json() -> Self {
        Self::of(SchemaType::Json)
    }

    pub fn of(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            definition: None,
        }
    }

    pub fn with_definition(mut self, definition: impl Into<String>) -> Self {
        self.definition = Some(definition.into());
        self
    }
}
