//! Turns a data flowset's bytes plus a resolved template into canonical
//! events: `@timestamp` seeding, promoted header fields, name-driven
//! timestamp normalization, and sampler routing/decoration. Shared between
//! the v9 and IPFIX readers, which differ only in framing and header fields.

use crate::error::DecodeError;
use crate::event::{FieldValue, FlowEvent};
use crate::time;
use crate::variable_versions::field_spec::Template;
use crate::variable_versions::sampler::{Sampler, SamplerKey, SamplerTable};

use chrono::{DateTime, Utc};
use log::{debug, warn};

/// Flowset bodies may carry a few trailing pad bytes to align records.
const MAX_PADDING: usize = 3;

pub(crate) const SAMPLER_ID_FIELD: &str = "flow_sampler_id";
pub(crate) const SAMPLER_MODE_FIELD: &str = "flow_sampler_mode";
pub(crate) const SAMPLER_INTERVAL_FIELD: &str = "flow_sampler_random_interval";

/// Per-datagram context the record decoder needs to build events.
pub(crate) struct RecordContext<'a> {
    pub version: u16,
    pub unix_secs: u32,
    pub unix_nsecs: u32,
    /// Boot-relative export time; v9 only, drives switched-time conversion
    pub sys_up_time: Option<u32>,
    pub flow_seq_num: Option<u32>,
    pub template_id: u16,
    pub include_flowset_id: bool,
    pub switched_times_from_uptime: bool,
    pub host: Option<&'a str>,
    pub source_id: u32,
}

/// Decodes every record of a data flowset, emitting events through the
/// sink and routing sampler option records to the sampler table. Returns
/// the number of events emitted.
pub(crate) fn decode_data_set<F>(
    body: &[u8],
    template: &Template,
    ctx: &RecordContext,
    samplers: &SamplerTable,
    sink: &mut F,
) -> Result<usize, DecodeError>
where
    F: FnMut(DateTime<Utc>, FlowEvent),
{
    let mut emitted = 0;
    match template.fixed_width() {
        Some(width) => {
            if width == 0 || width > body.len() || body.len() % width > MAX_PADDING {
                return Err(DecodeError::LengthMismatch {
                    template_id: ctx.template_id,
                    width,
                    available: body.len(),
                });
            }
            for chunk in body.chunks_exact(width) {
                match decode_record(chunk, template, ctx, samplers) {
                    Ok((_, Some((ts, event)))) => {
                        sink(ts, event);
                        emitted += 1;
                    }
                    Ok((_, None)) => {}
                    Err(_) => {
                        return Err(DecodeError::LengthMismatch {
                            template_id: ctx.template_id,
                            width,
                            available: body.len(),
                        });
                    }
                }
            }
        }
        None => {
            // Variable-length layout: record boundaries are only known by
            // reading, so stream until the body is exhausted.
            let mut remaining = body;
            while !remaining.is_empty() {
                match decode_record(remaining, template, ctx, samplers) {
                    Ok((rest, outcome)) => {
                        if rest.len() == remaining.len() {
                            // Zero-width record; refuse to spin.
                            break;
                        }
                        remaining = rest;
                        if let Some((ts, event)) = outcome {
                            sink(ts, event);
                            emitted += 1;
                        }
                    }
                    Err(_) if remaining.len() <= MAX_PADDING => break,
                    Err(_) => {
                        warn!(
                            "truncated record in flowset {} with {} bytes left; dropping remainder",
                            ctx.template_id,
                            remaining.len()
                        );
                        break;
                    }
                }
            }
        }
    }
    Ok(emitted)
}

type DecodedRecord<'a> = (&'a [u8], Option<(DateTime<Utc>, FlowEvent)>);

fn decode_record<'a>(
    i: &'a [u8],
    template: &Template,
    ctx: &RecordContext,
    samplers: &SamplerTable,
) -> Result<DecodedRecord<'a>, nom::Err<nom::error::Error<&'a [u8]>>> {
    let mut pairs: Vec<(&str, FieldValue)> = Vec::with_capacity(template.fields().len());
    let mut remaining = i;
    for spec in template.fields() {
        let (rest, decoded) = spec.read(remaining)?;
        remaining = rest;
        if let Some(pair) = decoded {
            pairs.push(pair);
        }
    }

    if is_sampler(&pairs) {
        register_sampler(ctx, samplers, &pairs);
        return Ok((remaining, None));
    }

    let ts = time::export_time(ctx.unix_secs, ctx.unix_nsecs);
    let mut event = FlowEvent::new();
    event.insert(
        "@timestamp".to_string(),
        FieldValue::Timestamp(time::format_millis(ts)),
    );
    event.insert("version".to_string(), FieldValue::Unsigned(ctx.version.into()));
    if let Some(seq) = ctx.flow_seq_num {
        event.insert("flow_seq_num".to_string(), FieldValue::Unsigned(seq.into()));
    }
    if ctx.include_flowset_id {
        event.insert(
            "flowset_id".to_string(),
            FieldValue::Unsigned(ctx.template_id.into()),
        );
    }
    for (name, value) in pairs {
        let value = normalize(name, value, ctx);
        event.insert(name.to_string(), value);
    }
    decorate_from_sampler(ctx, samplers, &mut event);
    Ok((remaining, Some((ts, event))))
}

/// Name-driven timestamp normalization (see the module doc of
/// [`crate::time`] for the three encodings involved).
pub(crate) fn normalize(name: &str, value: FieldValue, ctx: &RecordContext) -> FieldValue {
    match name {
        "first_switched" | "last_switched" if !ctx.switched_times_from_uptime => {
            let (FieldValue::Unsigned(msec), Some(up)) = (&value, ctx.sys_up_time) else {
                return value;
            };
            match time::switched_time(ctx.unix_secs, ctx.unix_nsecs, up, *msec) {
                Some(t) => FieldValue::Timestamp(time::format_millis(t)),
                None => out_of_range(name, value),
            }
        }
        "flowStartSeconds" | "flowEndSeconds" => {
            convert(name, value, time::from_epoch_secs, time::format_secs)
        }
        "flowStartMilliseconds" | "flowEndMilliseconds" => {
            convert(name, value, time::from_epoch_millis, time::format_millis)
        }
        "flowStartMicroseconds" | "flowEndMicroseconds" => {
            convert(name, value, time::from_epoch_micros, time::format_micros)
        }
        "flowStartNanoseconds" | "flowEndNanoseconds" => {
            // IPFIX nanosecond stamps are NTP-epoch 64-bit values; v9
            // exporters ship plain nanoseconds since the Unix epoch.
            if ctx.version == 10 {
                convert(name, value, time::from_ntp_nanos, time::format_nanos)
            } else {
                convert(name, value, time::from_epoch_nanos, time::format_nanos)
            }
        }
        _ => value,
    }
}

fn convert(
    name: &str,
    value: FieldValue,
    parse: impl Fn(u64) -> Option<DateTime<Utc>>,
    render: impl Fn(DateTime<Utc>) -> String,
) -> FieldValue {
    let FieldValue::Unsigned(v) = value else {
        return value;
    };
    match parse(v) {
        Some(t) => FieldValue::Timestamp(render(t)),
        None => out_of_range(name, FieldValue::Unsigned(v)),
    }
}

/// Wire values `chrono` cannot represent are copied through raw; the v5
/// fast path reuses this for its switched-time fallback.
pub(crate) fn out_of_range(name: &str, value: FieldValue) -> FieldValue {
    debug!("{name} value {value:?} is out of timestamp range; keeping raw");
    value
}

/// An option record carrying all three sampler fields declares a sampler.
fn is_sampler(pairs: &[(&str, FieldValue)]) -> bool {
    [SAMPLER_ID_FIELD, SAMPLER_MODE_FIELD, SAMPLER_INTERVAL_FIELD]
        .iter()
        .all(|field| pairs.iter().any(|(name, _)| name == field))
}

fn register_sampler(ctx: &RecordContext, samplers: &SamplerTable, pairs: &[(&str, FieldValue)]) {
    let field = |wanted: &str| {
        pairs
            .iter()
            .find(|(name, _)| *name == wanted)
            .and_then(|(_, value)| value.as_u64())
    };
    let (Some(id), Some(mode), Some(interval)) = (
        field(SAMPLER_ID_FIELD),
        field(SAMPLER_MODE_FIELD),
        field(SAMPLER_INTERVAL_FIELD),
    ) else {
        debug!("sampler option record with non-numeric fields; ignoring");
        return;
    };
    samplers.insert(
        SamplerKey::new(ctx.host, ctx.source_id, id),
        Sampler {
            mode,
            random_interval: interval,
        },
    );
}

/// Fills `sampling_algorithm` and `sampling_interval` from a matching
/// sampler entry. Existing fields are never overwritten.
fn decorate_from_sampler(ctx: &RecordContext, samplers: &SamplerTable, event: &mut FlowEvent) {
    let Some(id) = event.get(SAMPLER_ID_FIELD).and_then(FieldValue::as_u64) else {
        return;
    };
    let Some(sampler) = samplers.fetch(&SamplerKey::new(ctx.host, ctx.source_id, id)) else {
        return;
    };
    event
        .entry("sampling_algorithm".to_string())
        .or_insert(FieldValue::Unsigned(sampler.mode));
    event
        .entry("sampling_interval".to_string())
        .or_insert(FieldValue::Unsigned(sampler.random_interval));
}
