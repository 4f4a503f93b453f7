//! # NetFlow V5
//!
//! References:
//! - <https://www.cisco.com/en/US/technologies/tk648/tk362/technologies_white_paper09186a00800a3db9.html>

use crate::DecodeOptions;
use crate::error::DecodeError;
use crate::event::{FieldValue, FlowEvent};
use crate::time;
use crate::variable_versions::record;

use chrono::{DateTime, Utc};
use nom::number::complete::be_u32;
use nom_derive::{Nom, Parse};
use serde::Serialize;

use std::net::Ipv4Addr;

/// Every v5 record is exactly this long.
const RECORD_BYTES: usize = 48;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Nom)]
pub struct Header {
    /// NetFlow export format version number
    #[nom(Value = "5")]
    pub version: u16,
    /// Number of flows exported in this packet (1-30)
    pub count: u16,
    /// Current time in milliseconds since the export device booted
    pub sys_up_time: u32,
    /// Current count of seconds since 0000 UTC 1970
    pub unix_secs: u32,
    /// Residual nanoseconds since 0000 UTC 1970
    pub unix_nsecs: u32,
    /// Sequence counter of total flows seen
    pub flow_sequence: u32,
    /// Type of flow-switching engine (high byte of the engine word on the
    /// big-endian wire)
    pub engine_type: u8,
    /// Slot number of the flow-switching engine
    pub engine_id: u8,
    /// First two bits hold the sampling mode; remaining 14 bits hold the
    /// value of the sampling interval
    pub sampling: u16,
}

impl Header {
    pub fn sampling_algorithm(&self) -> u16 {
        self.sampling >> 14
    }

    pub fn sampling_interval(&self) -> u16 {
        self.sampling & 0x3FFF
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Nom)]
pub struct Record {
    /// Source IP address
    #[nom(Map = "Ipv4Addr::from", Parse = "be_u32")]
    pub src_addr: Ipv4Addr,
    /// Destination IP address
    #[nom(Map = "Ipv4Addr::from", Parse = "be_u32")]
    pub dst_addr: Ipv4Addr,
    /// IP address of next hop router
    #[nom(Map = "Ipv4Addr::from", Parse = "be_u32")]
    pub next_hop: Ipv4Addr,
    /// SNMP index of input interface
    pub input: u16,
    /// SNMP index of output interface
    pub output: u16,
    /// Packets in the flow
    pub d_pkts: u32,
    /// Total number of Layer 3 bytes in the packets of the flow
    pub d_octets: u32,
    /// SysUptime in milliseconds at start of flow
    pub first: u32,
    /// SysUptime in milliseconds when the last packet of the flow was received
    pub last: u32,
    /// TCP/UDP source port number or equivalent
    pub src_port: u16,
    /// TCP/UDP destination port number or equivalent
    pub dst_port: u16,
    /// Unused (zero) byte
    pub pad1: u8,
    /// Cumulative OR of TCP flags
    pub tcp_flags: u8,
    /// IP protocol type (for example, TCP = 6; UDP = 17)
    pub protocol: u8,
    /// IP type of service (ToS)
    pub tos: u8,
    /// Autonomous system number of the source, either origin or peer
    pub src_as: u16,
    /// Autonomous system number of the destination, either origin or peer
    pub dst_as: u16,
    /// Source address prefix mask bits
    pub src_mask: u8,
    /// Destination address prefix mask bits
    pub dst_mask: u8,
    /// Unused (zero) bytes
    pub pad2: u16,
}

/// Decodes a v5 datagram (`packet` starts after the version u16) and emits
/// one event per record, each carrying every header-derived field plus the
/// record's decoded fields.
pub(crate) fn decode<F>(
    packet: &[u8],
    options: &DecodeOptions,
    sink: &mut F,
) -> Result<(), DecodeError>
where
    F: FnMut(DateTime<Utc>, FlowEvent),
{
    let (remaining, header) =
        Header::parse(packet).map_err(|_| DecodeError::MalformedHeader { version: 5 })?;

    let expected = usize::from(header.count) * RECORD_BYTES;
    if remaining.len() != expected {
        return Err(DecodeError::V5CountMismatch {
            count: header.count,
            expected,
            available: remaining.len(),
        });
    }

    let ts = time::export_time(header.unix_secs, header.unix_nsecs);
    for chunk in remaining.chunks_exact(RECORD_BYTES) {
        let (_, record) =
            Record::parse(chunk).map_err(|_| DecodeError::MalformedHeader { version: 5 })?;
        sink(ts, build_event(ts, &header, &record, options));
    }
    Ok(())
}

fn build_event(
    ts: DateTime<Utc>,
    header: &Header,
    record: &Record,
    options: &DecodeOptions,
) -> FlowEvent {
    let mut event = FlowEvent::new();
    event.insert(
        "@timestamp".to_string(),
        FieldValue::Timestamp(time::format_millis(ts)),
    );
    event.insert("version".to_string(), FieldValue::Unsigned(5));
    event.insert(
        "flow_seq_num".to_string(),
        FieldValue::Unsigned(header.flow_sequence.into()),
    );
    event.insert(
        "engine_type".to_string(),
        FieldValue::Unsigned(header.engine_type.into()),
    );
    event.insert(
        "engine_id".to_string(),
        FieldValue::Unsigned(header.engine_id.into()),
    );
    event.insert(
        "sampling_algorithm".to_string(),
        FieldValue::Unsigned(header.sampling_algorithm().into()),
    );
    event.insert(
        "sampling_interval".to_string(),
        FieldValue::Unsigned(header.sampling_interval().into()),
    );
    event.insert(
        "flow_records".to_string(),
        FieldValue::Unsigned(header.count.into()),
    );

    event.insert(
        "ipv4_src_addr".to_string(),
        FieldValue::Ip4Addr(record.src_addr),
    );
    event.insert(
        "ipv4_dst_addr".to_string(),
        FieldValue::Ip4Addr(record.dst_addr),
    );
    event.insert(
        "ipv4_next_hop".to_string(),
        FieldValue::Ip4Addr(record.next_hop),
    );
    event.insert("input_snmp".to_string(), FieldValue::Unsigned(record.input.into()));
    event.insert(
        "output_snmp".to_string(),
        FieldValue::Unsigned(record.output.into()),
    );
    event.insert("in_pkts".to_string(), FieldValue::Unsigned(record.d_pkts.into()));
    event.insert("in_bytes".to_string(), FieldValue::Unsigned(record.d_octets.into()));
    event.insert(
        "first_switched".to_string(),
        switched_value("first_switched", header, record.first, options),
    );
    event.insert(
        "last_switched".to_string(),
        switched_value("last_switched", header, record.last, options),
    );
    event.insert(
        "l4_src_port".to_string(),
        FieldValue::Unsigned(record.src_port.into()),
    );
    event.insert(
        "l4_dst_port".to_string(),
        FieldValue::Unsigned(record.dst_port.into()),
    );
    event.insert(
        "tcp_flags".to_string(),
        FieldValue::Unsigned(record.tcp_flags.into()),
    );
    event.insert("protocol".to_string(), FieldValue::Unsigned(record.protocol.into()));
    event.insert("src_tos".to_string(), FieldValue::Unsigned(record.tos.into()));
    event.insert("src_as".to_string(), FieldValue::Unsigned(record.src_as.into()));
    event.insert("dst_as".to_string(), FieldValue::Unsigned(record.dst_as.into()));
    event.insert("src_mask".to_string(), FieldValue::Unsigned(record.src_mask.into()));
    event.insert("dst_mask".to_string(), FieldValue::Unsigned(record.dst_mask.into()));
    event
}

fn switched_value(name: &str, header: &Header, msec: u32, options: &DecodeOptions) -> FieldValue {
    if options.switched_times_from_uptime {
        return FieldValue::Unsigned(msec.into());
    }
    match time::switched_time(header.unix_secs, header.unix_nsecs, header.sys_up_time, msec.into())
    {
        Some(t) => FieldValue::Timestamp(time::format_millis(t)),
        None => record::out_of_range(name, FieldValue::Unsigned(msec.into())),
    }
}
