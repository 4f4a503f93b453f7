//! # IPFIX (NetFlow v10)
//!
//! References:
//! - <https://datatracker.ietf.org/doc/html/rfc7011>
//! - <https://www.iana.org/assignments/ipfix/ipfix.xhtml>

use crate::DecodeOptions;
use crate::error::DecodeError;
use crate::event::FlowEvent;
use crate::variable_versions::field_spec::RawField;
use crate::variable_versions::record::{self, RecordContext};
use crate::variable_versions::registry::{MissingTemplateLog, TemplateKey};
use crate::variable_versions::sampler::SamplerTable;
use crate::variable_versions::{TemplateEngine, read_u16, read_u32};

use chrono::{DateTime, Utc};
use log::warn;
use nom_derive::{Nom, Parse};
use serde::Serialize;

const TEMPLATE_SET_ID: u16 = 2;
const OPTIONS_TEMPLATE_SET_ID: u16 = 3;
const DATA_SET_MIN_ID: u16 = 256;

/// High bit of a field type marks an enterprise-specific field followed by
/// a 4-byte enterprise number (RFC 7011 §3.2).
const ENTERPRISE_BIT: u16 = 0x8000;

/// Message header size in octets, version word included.
const HEADER_BYTES: usize = 16;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Nom)]
pub struct Header {
    /// Version of the flow record format exported in this message; 0x000a
    /// for IPFIX
    #[nom(Value = "10")]
    pub version: u16,
    /// Total length of the IPFIX message in octets, message header and sets
    /// included
    pub length: u16,
    /// Time in seconds since the Unix epoch at which the message left the
    /// exporter
    pub export_time: u32,
    /// Incremental sequence counter modulo 2^32 of all data records sent
    /// from the current observation domain; templates do not increase it
    pub sequence_number: u32,
    /// Identifier of the observation domain, locally unique to the
    /// exporting process
    pub observation_domain_id: u32,
}

/// Decodes one IPFIX message. Template keys carry the observation domain id
/// from the header; the sender host stays out of the key because IPFIX
/// names its exporter itself (it still keys the sampler table).
pub(crate) struct Reader<'a> {
    pub engine: &'a TemplateEngine,
    pub samplers: &'a SamplerTable,
    pub options: &'a DecodeOptions,
    pub missing: &'a MissingTemplateLog,
    pub host: Option<&'a str>,
}

impl Reader<'_> {
    /// `packet` starts after the version u16 already consumed by dispatch.
    pub fn decode<F>(&self, packet: &[u8], sink: &mut F) -> Result<(), DecodeError>
    where
        F: FnMut(DateTime<Utc>, FlowEvent),
    {
        let (rest, header) =
            Header::parse(packet).map_err(|_| DecodeError::MalformedHeader { version: 10 })?;

        let declared = usize::from(header.length);
        if declared < HEADER_BYTES {
            return Err(DecodeError::MalformedHeader { version: 10 });
        }
        let sets_len = declared - HEADER_BYTES;
        if rest.len() < sets_len {
            return Err(DecodeError::Truncated {
                needed: sets_len - rest.len(),
                available: rest.len(),
            });
        }
        // Ignore anything past the declared message length.
        let mut remaining = &rest[..sets_len];

        while remaining.len() >= 4 {
            let (rest, set_id) = read_u16(remaining)?;
            let (rest, length) = read_u16(rest)?;
            if length < 4 {
                return Err(DecodeError::MalformedFlowset {
                    flowset_id: set_id,
                    length,
                });
            }
            let body_len = usize::from(length) - 4;
            if rest.len() < body_len {
                return Err(DecodeError::Truncated {
                    needed: body_len - rest.len(),
                    available: rest.len(),
                });
            }
            let (body, rest) = rest.split_at(body_len);
            remaining = rest;

            match set_id {
                TEMPLATE_SET_ID => self.read_template_set(body, &header)?,
                OPTIONS_TEMPLATE_SET_ID => self.read_options_template_set(body, &header)?,
                id if id >= DATA_SET_MIN_ID => {
                    if let Err(e) = self.read_data_set(body, id, &header, sink) {
                        warn!("dropping IPFIX set {id}: {e}");
                    }
                }
                id => warn!("IPFIX set id {id} is reserved; skipping"),
            }
        }
        Ok(())
    }

    fn read_template_set(&self, body: &[u8], header: &Header) -> Result<(), DecodeError> {
        let mut remaining = body;
        while remaining.len() >= 4 {
            let (rest, template_id) = read_u16(remaining)?;
            if template_id == 0 {
                // trailing padding
                break;
            }
            let (mut rest, field_count) = read_u16(rest)?;
            let mut raw_fields = Vec::with_capacity(usize::from(field_count));
            for _ in 0..field_count {
                let (r, raw) = read_field(rest)?;
                raw_fields.push(raw);
                rest = r;
            }
            remaining = rest;
            self.register(header, template_id, &raw_fields);
        }
        Ok(())
    }

    /// IPFIX options templates count fields instead of framing sections by
    /// byte length; scope fields are ordinary information elements here, so
    /// they resolve through the same dictionary as everything else.
    fn read_options_template_set(&self, body: &[u8], header: &Header) -> Result<(), DecodeError> {
        let mut remaining = body;
        while remaining.len() >= 6 {
            let (rest, template_id) = read_u16(remaining)?;
            if template_id == 0 {
                break;
            }
            let (rest, field_count) = read_u16(rest)?;
            let (mut rest, _scope_field_count) = read_u16(rest)?;
            let mut raw_fields = Vec::with_capacity(usize::from(field_count));
            for _ in 0..field_count {
                let (r, raw) = read_field(rest)?;
                raw_fields.push(raw);
                rest = r;
            }
            remaining = rest;
            self.register(header, template_id, &raw_fields);
        }
        Ok(())
    }

    fn register(&self, header: &Header, template_id: u16, raw_fields: &[RawField]) {
        self.engine.registry.register(
            TemplateKey::new(None, header.observation_domain_id, template_id),
            raw_fields,
            &self.engine.dictionary,
            None,
        );
    }

    fn read_data_set<F>(
        &self,
        body: &[u8],
        set_id: u16,
        header: &Header,
        sink: &mut F,
    ) -> Result<(), DecodeError>
    where
        F: FnMut(DateTime<Utc>, FlowEvent),
    {
        let key = TemplateKey::new(None, header.observation_domain_id, set_id);
        let Some(template) = self.engine.registry.fetch(&key) else {
            if self.missing.first_miss(&key) {
                warn!(
                    "{} ({key}); dropping set until a template arrives",
                    DecodeError::MissingTemplate {
                        domain: header.observation_domain_id,
                        template_id: set_id,
                    }
                );
            }
            return Ok(());
        };
        let ctx = RecordContext {
            version: 10,
            unix_secs: header.export_time,
            unix_nsecs: 0,
            sys_up_time: None,
            flow_seq_num: None,
            template_id: set_id,
            include_flowset_id: self.options.include_flowset_id,
            switched_times_from_uptime: self.options.switched_times_from_uptime,
            host: self.host,
            source_id: header.observation_domain_id,
        };
        record::decode_data_set(body, &template, &ctx, self.samplers, sink)?;
        Ok(())
    }
}

/// One field spec: type, length, and the enterprise number when the type's
/// high bit is set.
fn read_field(i: &[u8]) -> Result<(&[u8], RawField), DecodeError> {
    let (i, field_type) = read_u16(i)?;
    let (i, length) = read_u16(i)?;
    if field_type & ENTERPRISE_BIT != 0 {
        let (i, enterprise) = read_u32(i)?;
        Ok((i, RawField::enterprise(field_type & !ENTERPRISE_BIT, length, enterprise)))
    } else {
        Ok((i, RawField::new(field_type, length)))
    }
}
