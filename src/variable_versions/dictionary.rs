//! Field dictionaries: the `(enterprise_id, field_id) -> definition` tables
//! that turn raw template field types into named, typed layouts.
//!
//! Two dictionaries ship embedded in the crate (`definitions/netflow.yaml`
//! for v9, `definitions/ipfix.yaml` for IPFIX); each can be augmented with a
//! user-supplied YAML file at build time. Dictionaries are read-only once
//! the decoder is constructed and may be shared across threads by reference.

use crate::error::ConfigError;
use crate::variable_versions::field_spec::RawField;

use serde_yaml::Value;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

const NETFLOW_FIELDS: &str = include_str!("../definitions/netflow.yaml");
const IPFIX_FIELDS: &str = include_str!("../definitions/ipfix.yaml");

const NETFLOW_FIELDS_PATH: &str = "<built-in netflow.yaml>";
const IPFIX_FIELDS_PATH: &str = "<built-in ipfix.yaml>";

/// Semantic type of a dictionary entry, straight from the definition array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    String,
    Skip,
    OctetArray,
    Ipv4Addr,
    Ipv6Addr,
    MacAddr,
    ApplicationId,
    /// Bare-integer definition: unsigned integer whose width follows the
    /// wire length, defaulting to this many bytes when the wire length is 0.
    DefaultWidth(u16),
}

/// One dictionary entry. `name` is empty only for [`FieldKind::Skip`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub kind: FieldKind,
    pub name: String,
}

/// Immutable mapping from `(enterprise_id, field_id)` to field definitions,
/// with the separate v9 `scope` category for options-template scope fields.
#[derive(Debug, Clone)]
pub struct FieldDictionary {
    fields: HashMap<(u32, u16), FieldDef>,
    scope_fields: HashMap<u16, FieldDef>,
}

impl FieldDictionary {
    /// Builds the NetFlow v9 dictionary: the embedded defaults, optionally
    /// augmented by `extra`, a YAML map from field id to definition array
    /// merged into the `option` category.
    pub fn netflow_v9(extra: Option<&Path>) -> Result<Self, ConfigError> {
        let root = parse_yaml(NETFLOW_FIELDS, NETFLOW_FIELDS_PATH)?;

        let mut scope_fields = HashMap::new();
        if let Some(scope) = root.get("scope") {
            for ((_, field_id), def) in category_entries(scope, 0, NETFLOW_FIELDS_PATH)? {
                scope_fields.insert(field_id, def);
            }
        }

        let option = root.get("option").ok_or(ConfigError::MissingMergeKey {
            path: NETFLOW_FIELDS_PATH.to_string(),
            key: "option",
        })?;
        let mut fields: HashMap<(u32, u16), FieldDef> =
            category_entries(option, 0, NETFLOW_FIELDS_PATH)?
                .into_iter()
                .collect();

        if let Some(path) = extra {
            let user = load_user_yaml(path)?;
            for (key, def) in category_entries(&user, 0, &path.display().to_string())? {
                fields.insert(key, def);
            }
        }

        Ok(Self {
            fields,
            scope_fields,
        })
    }

    /// Builds the IPFIX dictionary: embedded defaults keyed by enterprise id
    /// (0 = IANA), optionally augmented by `extra` with the same two-level
    /// shape, merged per enterprise.
    pub fn ipfix(extra: Option<&Path>) -> Result<Self, ConfigError> {
        let mut fields = enterprise_entries(
            &parse_yaml(IPFIX_FIELDS, IPFIX_FIELDS_PATH)?,
            IPFIX_FIELDS_PATH,
        )?;

        if let Some(path) = extra {
            let user = load_user_yaml(path)?;
            for (key, def) in enterprise_entries(&user, &path.display().to_string())? {
                fields.insert(key, def);
            }
        }

        Ok(Self {
            fields,
            scope_fields: HashMap::new(),
        })
    }

    /// Looks a raw template field up, honoring the v9 scope category.
    pub(crate) fn lookup(&self, raw: &RawField) -> Option<&FieldDef> {
        if raw.scope {
            self.scope_fields.get(&raw.field_type)
        } else {
            self.fields.get(&(raw.enterprise, raw.field_type))
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len() + self.scope_fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse_yaml(text: &str, path: &str) -> Result<Value, ConfigError> {
    serde_yaml::from_str(text).map_err(|source| ConfigError::Yaml {
        path: path.to_string(),
        source,
    })
}

fn load_user_yaml(path: &Path) -> Result<Value, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_yaml(&text, &path.display().to_string())
}

/// Reads a single-level `field_id -> definition` mapping.
fn category_entries(
    value: &Value,
    enterprise: u32,
    path: &str,
) -> Result<Vec<((u32, u16), FieldDef)>, ConfigError> {
    let mapping = value.as_mapping().ok_or_else(|| bad_definition(
        enterprise,
        0,
        "expected a mapping from field id to definition array",
    ))?;
    let mut entries = Vec::with_capacity(mapping.len());
    for (key, def) in mapping {
        let field_id = key
            .as_u64()
            .and_then(|id| u16::try_from(id).ok())
            .ok_or_else(|| bad_definition(enterprise, 0, &format!("non-integer field id {key:?} in {path}")))?;
        entries.push(((enterprise, field_id), parse_definition(enterprise, field_id, def)?));
    }
    Ok(entries)
}

/// Reads the IPFIX two-level `enterprise_id -> field_id -> definition` map.
fn enterprise_entries(
    value: &Value,
    path: &str,
) -> Result<HashMap<(u32, u16), FieldDef>, ConfigError> {
    let mapping = value.as_mapping().ok_or_else(|| {
        bad_definition(0, 0, &format!("{path} is not a mapping from enterprise id"))
    })?;
    let mut fields = HashMap::new();
    for (key, submap) in mapping {
        let enterprise = key
            .as_u64()
            .and_then(|id| u32::try_from(id).ok())
            .ok_or_else(|| bad_definition(0, 0, &format!("non-integer enterprise id {key:?} in {path}")))?;
        for (key, def) in category_entries(submap, enterprise, path)? {
            fields.insert(key, def);
        }
    }
    Ok(fields)
}

/// Parses one definition array: `[<type-atom>, <name>]`, `[<default_byte_length>, <name>]`,
/// or the bare `[:skip]`.
fn parse_definition(enterprise: u32, field: u16, value: &Value) -> Result<FieldDef, ConfigError> {
    let seq = value
        .as_sequence()
        .ok_or_else(|| bad_definition(enterprise, field, "definition is not an array"))?;
    let first = seq
        .first()
        .ok_or_else(|| bad_definition(enterprise, field, "definition array is empty"))?;

    let kind = if let Some(width) = first.as_u64() {
        let width = u16::try_from(width)
            .map_err(|_| bad_definition(enterprise, field, "default length out of range"))?;
        FieldKind::DefaultWidth(width)
    } else if let Some(atom) = first.as_str() {
        match atom.trim_start_matches(':') {
            "uint8" => FieldKind::Uint8,
            "uint16" => FieldKind::Uint16,
            "uint32" => FieldKind::Uint32,
            "uint64" => FieldKind::Uint64,
            "string" => FieldKind::String,
            "skip" => FieldKind::Skip,
            "octetarray" => FieldKind::OctetArray,
            "ipv4_addr" => FieldKind::Ipv4Addr,
            "ipv6_addr" => FieldKind::Ipv6Addr,
            "mac_addr" => FieldKind::MacAddr,
            "application_id" => FieldKind::ApplicationId,
            other => {
                return Err(bad_definition(
                    enterprise,
                    field,
                    &format!("unknown type atom `{other}`"),
                ));
            }
        }
    } else {
        return Err(bad_definition(
            enterprise,
            field,
            "definition must start with a type atom or default length",
        ));
    };

    let name = match seq.get(1) {
        Some(v) => v
            .as_str()
            .map(|s| s.trim_start_matches(':').to_string())
            .ok_or_else(|| bad_definition(enterprise, field, "field name is not a string"))?,
        None if kind == FieldKind::Skip => String::new(),
        None => {
            return Err(bad_definition(enterprise, field, "definition has no field name"));
        }
    };

    Ok(FieldDef { kind, name })
}

fn bad_definition(enterprise: u32, field: u16, reason: &str) -> ConfigError {
    ConfigError::BadDefinition {
        enterprise,
        field,
        reason: reason.to_string(),
    }
}
