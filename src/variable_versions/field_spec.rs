//! Resolved field layouts and the rules that derive them from raw template
//! fields plus a [`FieldDictionary`].

use crate::event::{ApplicationId, FieldValue};
use crate::variable_versions::dictionary::{FieldDictionary, FieldKind};

use nom::IResult;
use nom::bytes::complete::take;
use nom::number::complete::{be_u8, be_u16, be_u32, be_u128};
use serde::{Deserialize, Serialize};

use std::net::{Ipv4Addr, Ipv6Addr};

/// Wire length meaning "variable length with an inline prefix" (RFC 7011 §7).
pub const VARIABLE_LENGTH: u16 = 0xFFFF;

/// One template field as it appears on the wire, before dictionary
/// resolution. This is also the persisted form: raw fields survive
/// dictionary updates where resolved specs would not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawField {
    pub field_type: u16,
    pub length: u16,
    #[serde(default)]
    pub enterprise: u32,
    /// Set for the scope section of v9 options templates, which resolves
    /// against the dictionary's `scope` category.
    #[serde(default)]
    pub scope: bool,
}

impl RawField {
    pub fn new(field_type: u16, length: u16) -> Self {
        Self {
            field_type,
            length,
            enterprise: 0,
            scope: false,
        }
    }

    pub fn enterprise(field_type: u16, length: u16, enterprise: u32) -> Self {
        Self {
            field_type,
            length,
            enterprise,
            scope: false,
        }
    }

    pub fn scoped(field_type: u16, length: u16) -> Self {
        Self {
            field_type,
            length,
            enterprise: 0,
            scope: true,
        }
    }
}

/// How to read one field out of a data record. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum FieldSpec {
    /// Big-endian unsigned integer of `bits / 8` bytes (reduced-size
    /// encodings included, so 24- or 48-bit counters work).
    Uint { bits: u16, name: String },
    /// Fixed-length string, right-padded with NULs on the wire
    String { length: u16, name: String },
    /// Length-prefixed string (sentinel wire length)
    VarString { name: String },
    /// Fixed bytes consumed and discarded
    Skip { length: u16 },
    /// Length-prefixed discard (sentinel wire length)
    VarSkip,
    OctetArray { length: u16, name: String },
    Ipv4Addr { name: String },
    Ipv6Addr { name: String },
    MacAddr { name: String },
    /// RFC 6759 composite: engine id byte plus selector
    ApplicationId { length: u16, name: String },
}

impl FieldSpec {
    /// Fixed byte width, or None for variable-length fields.
    pub fn width(&self) -> Option<usize> {
        match self {
            FieldSpec::Uint { bits, .. } => Some(usize::from(bits / 8)),
            FieldSpec::String { length, .. }
            | FieldSpec::OctetArray { length, .. }
            | FieldSpec::ApplicationId { length, .. } => {
                (*length != VARIABLE_LENGTH).then_some(usize::from(*length))
            }
            FieldSpec::Skip { length } => Some(usize::from(*length)),
            FieldSpec::VarString { .. } | FieldSpec::VarSkip => None,
            FieldSpec::Ipv4Addr { .. } => Some(4),
            FieldSpec::Ipv6Addr { .. } => Some(16),
            FieldSpec::MacAddr { .. } => Some(6),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            FieldSpec::Uint { name, .. }
            | FieldSpec::String { name, .. }
            | FieldSpec::VarString { name }
            | FieldSpec::OctetArray { name, .. }
            | FieldSpec::Ipv4Addr { name }
            | FieldSpec::Ipv6Addr { name }
            | FieldSpec::MacAddr { name }
            | FieldSpec::ApplicationId { name, .. } => Some(name),
            FieldSpec::Skip { .. } | FieldSpec::VarSkip => None,
        }
    }

    /// Reads one field off a record. Skip fields consume and yield None.
    pub fn read<'a>(&self, i: &'a [u8]) -> IResult<&'a [u8], Option<(&str, FieldValue)>> {
        match self {
            FieldSpec::Uint { bits, name } => {
                let (i, v) = be_uint(i, usize::from(bits / 8))?;
                Ok((i, Some((name, FieldValue::Unsigned(v)))))
            }
            FieldSpec::String { length, name } => {
                let (i, taken) = take(*length)(i)?;
                Ok((i, Some((name, string_value(taken)))))
            }
            FieldSpec::VarString { name } => {
                let (i, length) = var_length(i)?;
                let (i, taken) = take(length)(i)?;
                Ok((i, Some((name, string_value(taken)))))
            }
            FieldSpec::Skip { length } => {
                let (i, _) = take(*length)(i)?;
                Ok((i, None))
            }
            FieldSpec::VarSkip => {
                let (i, length) = var_length(i)?;
                let (i, _) = take(length)(i)?;
                Ok((i, None))
            }
            FieldSpec::OctetArray { length, name } => {
                let (i, length) = if *length == VARIABLE_LENGTH {
                    var_length(i)?
                } else {
                    (i, *length)
                };
                let (i, taken) = take(length)(i)?;
                Ok((i, Some((name, FieldValue::Bytes(taken.to_vec())))))
            }
            FieldSpec::Ipv4Addr { name } => {
                let (i, v) = be_u32(i)?;
                Ok((i, Some((name, FieldValue::Ip4Addr(Ipv4Addr::from(v))))))
            }
            FieldSpec::Ipv6Addr { name } => {
                let (i, v) = be_u128(i)?;
                Ok((i, Some((name, FieldValue::Ip6Addr(Ipv6Addr::from(v))))))
            }
            FieldSpec::MacAddr { name } => {
                let (i, taken) = take(6usize)(i)?;
                let mac = taken
                    .iter()
                    .map(|b| format!("{b:02x}"))
                    .collect::<Vec<_>>()
                    .join(":");
                Ok((i, Some((name, FieldValue::MacAddr(mac)))))
            }
            FieldSpec::ApplicationId { length, name } => {
                let (i, engine) = be_u8(i)?;
                let (i, selector) = be_uint(i, usize::from(length.saturating_sub(1)))?;
                let id = ApplicationId {
                    classification_engine_id: engine,
                    selector_id: selector,
                };
                Ok((i, Some((name, FieldValue::ApplicationId(id)))))
            }
        }
    }
}

fn string_value(taken: &[u8]) -> FieldValue {
    let s = String::from_utf8_lossy(taken)
        .trim_end_matches('\0')
        .to_string();
    FieldValue::String(s)
}

/// Big-endian unsigned read of 1..=8 bytes (RFC 7011 §6.2 reduced-size
/// encoding makes any width in that range legal for an unsigned field).
fn be_uint(i: &[u8], width: usize) -> IResult<&[u8], u64> {
    let (i, taken) = take(width)(i)?;
    let v = taken.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    Ok((i, v))
}

/// RFC 7011 §7 variable-length prefix: one byte, or 0xFF followed by a u16.
fn var_length(i: &[u8]) -> IResult<&[u8], u16> {
    let (i, first) = be_u8(i)?;
    if first == 0xFF { be_u16(i) } else { Ok((i, u16::from(first))) }
}

/// Reported when a template references a field the dictionary does not
/// know (or one that resolves to an unreadable width); the enclosing
/// template is rejected as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownField {
    pub field_type: u16,
    pub enterprise_id: u32,
    pub length: u16,
}

impl std::fmt::Display for UnknownField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "field type {} (enterprise {}, length {})",
            self.field_type, self.enterprise_id, self.length
        )
    }
}

/// An ordered field layout with its computed fixed byte width (None when
/// any field is variable-length, in which case the reader streams to EOF).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Template {
    fields: Vec<FieldSpec>,
    #[serde(skip)]
    raw: Vec<RawField>,
    fixed_width: Option<usize>,
}

impl Template {
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// The unresolved wire fields this template was built from; persisted
    /// instead of the resolved specs.
    pub fn raw_fields(&self) -> &[RawField] {
        &self.raw
    }

    pub fn fixed_width(&self) -> Option<usize> {
        self.fixed_width
    }
}

/// Resolves every raw field or rejects the whole template; a partially
/// resolved template is never produced.
pub(crate) fn resolve_template(
    raw_fields: &[RawField],
    dictionary: &FieldDictionary,
) -> Result<Template, UnknownField> {
    let mut fields = Vec::with_capacity(raw_fields.len());
    for raw in raw_fields {
        fields.push(resolve_field(raw, dictionary)?);
    }
    let fixed_width = fields.iter().map(FieldSpec::width).sum();
    Ok(Template {
        fields,
        raw: raw_fields.to_vec(),
        fixed_width,
    })
}

fn resolve_field(raw: &RawField, dictionary: &FieldDictionary) -> Result<FieldSpec, UnknownField> {
    let unknown = UnknownField {
        field_type: raw.field_type,
        enterprise_id: raw.enterprise,
        length: raw.length,
    };
    let def = dictionary.lookup(raw).ok_or(unknown)?;
    let name = def.name.clone();

    let spec = match def.kind {
        FieldKind::Skip => {
            if raw.length == VARIABLE_LENGTH {
                FieldSpec::VarSkip
            } else {
                FieldSpec::Skip { length: raw.length }
            }
        }
        FieldKind::String => {
            if raw.length == VARIABLE_LENGTH {
                FieldSpec::VarString { name }
            } else {
                FieldSpec::String {
                    length: raw.length,
                    name,
                }
            }
        }
        FieldKind::OctetArray => FieldSpec::OctetArray {
            length: raw.length,
            name,
        },
        FieldKind::Uint8 => uint_spec(raw, 1, name).ok_or(unknown)?,
        FieldKind::Uint16 => uint_spec(raw, 2, name).ok_or(unknown)?,
        FieldKind::Uint32 => uint_spec(raw, 4, name).ok_or(unknown)?,
        FieldKind::Uint64 => uint_spec(raw, 8, name).ok_or(unknown)?,
        FieldKind::DefaultWidth(default) => uint_spec(raw, default, name).ok_or(unknown)?,
        FieldKind::ApplicationId => {
            let length = effective_width(raw, 4);
            // one engine id byte plus a 1..=8 byte selector
            if !(2..=9).contains(&length) {
                return Err(unknown);
            }
            FieldSpec::ApplicationId { length, name }
        }
        FieldKind::Ipv4Addr => FieldSpec::Ipv4Addr { name },
        FieldKind::Ipv6Addr => FieldSpec::Ipv6Addr { name },
        FieldKind::MacAddr => FieldSpec::MacAddr { name },
    };
    Ok(spec)
}

fn uint_spec(raw: &RawField, default: u16, name: String) -> Option<FieldSpec> {
    let width = effective_width(raw, default);
    (1..=8).contains(&width).then_some(FieldSpec::Uint {
        bits: width * 8,
        name,
    })
}

/// Wire length wins when present; the sentinel never reaches fixed types.
fn effective_width(raw: &RawField, default: u16) -> u16 {
    if raw.length > 0 && raw.length != VARIABLE_LENGTH {
        raw.length
    } else {
        default
    }
}
