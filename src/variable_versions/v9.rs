//! # NetFlow V9
//!
//! References:
//! - <https://www.ietf.org/rfc/rfc3954.txt>
//! - <https://www.cisco.com/en/US/technologies/tk648/tk362/technologies_white_paper09186a00800a3db9.html>

use crate::DecodeOptions;
use crate::error::DecodeError;
use crate::event::FlowEvent;
use crate::variable_versions::field_spec::RawField;
use crate::variable_versions::record::{self, RecordContext};
use crate::variable_versions::registry::{MissingTemplateLog, TemplateKey};
use crate::variable_versions::sampler::SamplerTable;
use crate::variable_versions::{TemplateEngine, read_u16};

use chrono::{DateTime, Utc};
use log::warn;
use nom_derive::{Nom, Parse};
use serde::Serialize;

const TEMPLATE_FLOWSET_ID: u16 = 0;
const OPTIONS_TEMPLATE_FLOWSET_ID: u16 = 1;
const DATA_FLOWSET_MIN_ID: u16 = 256;

/// Each template or options-template field spec is two u16s on the wire.
const FIELD_SPEC_BYTES: u16 = 4;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Nom)]
pub struct Header {
    /// The version of NetFlow records exported in this packet; for Version 9, this value is 9
    #[nom(Value = "9")]
    pub version: u16,
    /// Number of FlowSet records (both template and data) contained within this packet
    pub count: u16,
    /// Time in milliseconds since this device was first booted
    pub sys_up_time: u32,
    /// Seconds since 0000 Coordinated Universal Time (UTC) 1970
    pub unix_secs: u32,
    /// Incremental sequence counter of all export packets sent by this export device
    pub sequence_number: u32,
    /// 32-bit value used to guarantee uniqueness for all flows exported from a
    /// particular device; collectors should pair it with the source IP address
    pub source_id: u32,
}

/// Decodes one v9 PDU: templates and options templates update the registry,
/// data flowsets fetch their template and emit events.
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
        let (mut remaining, header) =
            Header::parse(packet).map_err(|_| DecodeError::MalformedHeader { version: 9 })?;

        while remaining.len() >= 4 {
            let (rest, flowset_id) = read_u16(remaining)?;
            let (rest, length) = read_u16(rest)?;
            if length < 4 {
                return Err(DecodeError::MalformedFlowset { flowset_id, length });
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

            match flowset_id {
                TEMPLATE_FLOWSET_ID => self.read_template_set(body, &header)?,
                OPTIONS_TEMPLATE_FLOWSET_ID => self.read_options_template_set(body, &header)?,
                id if id >= DATA_FLOWSET_MIN_ID => {
                    if let Err(e) = self.read_data_set(body, id, &header, sink) {
                        warn!("dropping v9 flowset {id}: {e}");
                    }
                }
                id => warn!("v9 flowset id {id} is reserved; skipping"),
            }
        }
        // anything under 4 trailing bytes is padding
        Ok(())
    }

    /// A template flowset may carry several templates back to back.
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
                let (r, field_type) = read_u16(rest)?;
                let (r, length) = read_u16(r)?;
                raw_fields.push(RawField::new(field_type, length));
                rest = r;
            }
            remaining = rest;
            self.engine.registry.register(
                TemplateKey::new(self.host, header.source_id, template_id),
                &raw_fields,
                &self.engine.dictionary,
                None,
            );
        }
        Ok(())
    }

    /// Options templates frame their sections by byte length rather than
    /// field count; scope fields resolve against the `scope` dictionary
    /// category.
    fn read_options_template_set(&self, body: &[u8], header: &Header) -> Result<(), DecodeError> {
        let mut remaining = body;
        while remaining.len() >= 6 {
            let (rest, template_id) = read_u16(remaining)?;
            if template_id == 0 {
                break;
            }
            let (rest, scope_length) = read_u16(rest)?;
            let (mut rest, option_length) = read_u16(rest)?;
            let scope_count = scope_length / FIELD_SPEC_BYTES;
            let option_count = option_length / FIELD_SPEC_BYTES;
            let mut raw_fields = Vec::with_capacity(usize::from(scope_count + option_count));
            for n in 0..scope_count + option_count {
                let (r, field_type) = read_u16(rest)?;
                let (r, length) = read_u16(r)?;
                raw_fields.push(if n < scope_count {
                    RawField::scoped(field_type, length)
                } else {
                    RawField::new(field_type, length)
                });
                rest = r;
            }
            remaining = rest;
            self.engine.registry.register(
                TemplateKey::new(self.host, header.source_id, template_id),
                &raw_fields,
                &self.engine.dictionary,
                None,
            );
        }
        Ok(())
    }

    fn read_data_set<F>(
        &self,
        body: &[u8],
        flowset_id: u16,
        header: &Header,
        sink: &mut F,
    ) -> Result<(), DecodeError>
    where
        F: FnMut(DateTime<Utc>, FlowEvent),
    {
        let key = TemplateKey::new(self.host, header.source_id, flowset_id);
        let Some(template) = self.engine.registry.fetch(&key) else {
            if self.missing.first_miss(&key) {
                warn!(
                    "{} ({key}); dropping flowset until a template arrives",
                    DecodeError::MissingTemplate {
                        domain: header.source_id,
                        template_id: flowset_id,
                    }
                );
            }
            return Ok(());
        };
        let ctx = RecordContext {
            version: 9,
            unix_secs: header.unix_secs,
            unix_nsecs: 0,
            sys_up_time: Some(header.sys_up_time),
            flow_seq_num: Some(header.sequence_number),
            template_id: flowset_id,
            include_flowset_id: self.options.include_flowset_id,
            switched_times_from_uptime: self.options.switched_times_from_uptime,
            host: self.host,
            source_id: header.source_id,
        };
        record::decode_data_set(body, &template, &ctx, self.samplers, sink)?;
        Ok(())
    }
}
