//! Template-driven NetFlow protocols (V9 and IPFIX).
//!
//! Both versions share one engine: template flowsets resolve their raw
//! fields through a [`dictionary::FieldDictionary`] into
//! [`field_spec::Template`]s cached in a [`registry::TemplateRegistry`];
//! data flowsets fetch the template for their id and hand their bytes to
//! [`record`], which assembles events. Only the framing and header fields
//! differ between the two, so `v9` and `ipfix` stay thin.
//!
//! # Modules
//!
//! - [`dictionary`] - YAML-backed field definitions per enterprise
//! - [`field_spec`] - resolved field layouts and the layout resolver
//! - [`registry`] - exporter-keyed template cache with TTL and persistence
//! - [`sampler`] - sampler option records that decorate later data records
//! - [`ttl`] - the time-expiring map both caches are built on
//! - [`v9`] / [`ipfix`] - PDU readers

pub mod dictionary;
pub mod field_spec;
pub mod ipfix;
pub(crate) mod record;
pub mod registry;
pub mod sampler;
pub mod ttl;
pub mod v9;

use crate::error::DecodeError;

use dictionary::FieldDictionary;
use registry::TemplateRegistry;

/// Dictionary + registry pair backing one template-driven protocol.
#[derive(Debug)]
pub struct TemplateEngine {
    pub dictionary: FieldDictionary,
    pub registry: TemplateRegistry,
}

pub(crate) fn read_u16(i: &[u8]) -> Result<(&[u8], u16), DecodeError> {
    match i {
        [a, b, rest @ ..] => Ok((rest, u16::from_be_bytes([*a, *b]))),
        _ => Err(DecodeError::Truncated {
            needed: 2 - i.len(),
            available: i.len(),
        }),
    }
}

pub(crate) fn read_u32(i: &[u8]) -> Result<(&[u8], u32), DecodeError> {
    match i {
        [a, b, c, d, rest @ ..] => Ok((rest, u32::from_be_bytes([*a, *b, *c, *d]))),
        _ => Err(DecodeError::Truncated {
            needed: 4 - i.len(),
            available: i.len(),
        }),
    }
}
