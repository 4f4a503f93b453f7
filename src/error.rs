use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while building a decoder.
///
/// These are fatal at construction: a decoder with a broken field dictionary
/// would silently reject every template it ever sees.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A field definitions file could not be read
    #[error("could not read field definitions {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A field definitions file is not valid YAML
    #[error("could not parse field definitions {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// The base dictionary has no mapping to merge user definitions into
    #[error("field definitions {path} have no `{key}` mapping to merge into")]
    MissingMergeKey { path: String, key: &'static str },

    /// A definition array has an unexpected shape
    #[error("bad field definition for enterprise {enterprise} field {field}: {reason}")]
    BadDefinition {
        enterprise: u32,
        field: u16,
        reason: String,
    },
}

/// Per-datagram decode failures.
///
/// Logged at the `decode` boundary and swallowed there: one malformed packet
/// never takes down the pipeline (see [`crate::NetflowDecoder::decode`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// More bytes were needed than the datagram holds
    #[error("datagram truncated: needed {needed} more bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// The version-specific header could not be parsed
    #[error("malformed NetFlow v{version} header")]
    MalformedHeader { version: u16 },

    /// A flowset declared a length its datagram cannot satisfy
    #[error("flowset {flowset_id} declares invalid length {length}")]
    MalformedFlowset { flowset_id: u16, length: u16 },

    /// A template's fixed width does not divide the data flowset body
    #[error(
        "template {template_id} width {width} does not fit the {available} available bytes"
    )]
    LengthMismatch {
        template_id: u16,
        width: usize,
        available: usize,
    },

    /// V5 record count disagrees with the payload size
    #[error("v5 datagram holds {available} record bytes, expected {expected} for {count} flows")]
    V5CountMismatch {
        count: u16,
        expected: usize,
        available: usize,
    },

    /// A data flowset arrived before (or without) its template
    #[error("no template {template_id} for domain {domain}")]
    MissingTemplate { domain: u32, template_id: u16 },

    /// Version number not recognized as NetFlow
    #[error("unsupported NetFlow version {0}")]
    UnsupportedVersion(u16),
}
