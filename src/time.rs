//! Timestamp derivation and ISO-8601 rendering.
//!
//! NetFlow spreads time over three encodings: wall-clock seconds (plus
//! residual nanoseconds in v5) in the PDU header, boot-relative milliseconds
//! for v5/v9 switched times, and the `flowStart*`/`flowEnd*` absolute stamps
//! of IPFIX, whose nanosecond flavor is an NTP-era 64-bit fixed-point value.

use chrono::{DateTime, Utc};

/// Seconds between the NTP epoch (1900-01-01) and the Unix epoch (1970-01-01).
pub(crate) const NTP_TO_UNIX_SECS: u64 = 2_208_988_800;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Builds the export wall-clock time from the `unix_secs` and `unix_nsecs`
/// a NetFlow header provides. Nanoseconds are clamped into range so garbage
/// on the wire cannot push the value out of the representable window.
pub(crate) fn export_time(unix_secs: u32, unix_nsecs: u32) -> DateTime<Utc> {
    DateTime::from_timestamp(i64::from(unix_secs), unix_nsecs % 1_000_000_000)
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Converts a boot-relative `first_switched`/`last_switched` millisecond
/// stamp to wall clock: the event happened `sys_up_time - msec` milliseconds
/// before the export time.
pub(crate) fn switched_time(
    unix_secs: u32,
    unix_nsecs: u32,
    sys_up_time: u32,
    msec: u64,
) -> Option<DateTime<Utc>> {
    let export_ns =
        i128::from(unix_secs) * NANOS_PER_SEC + i128::from(unix_nsecs % 1_000_000_000);
    // msec can exceed sys_up_time when the counter wrapped between the flow
    // and the export; the signed delta keeps the arithmetic honest.
    let delta_ms = i128::from(sys_up_time) - i128::from(msec);
    from_unix_nanos(export_ns - delta_ms * 1_000_000)
}

pub(crate) fn from_epoch_secs(v: u64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(i64::try_from(v).ok()?, 0)
}

pub(crate) fn from_epoch_millis(v: u64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(i64::try_from(v / 1_000).ok()?, (v % 1_000) as u32 * 1_000_000)
}

pub(crate) fn from_epoch_micros(v: u64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(i64::try_from(v / 1_000_000).ok()?, (v % 1_000_000) as u32 * 1_000)
}

pub(crate) fn from_epoch_nanos(v: u64) -> Option<DateTime<Utc>> {
    from_unix_nanos(i128::from(v))
}

/// Interprets an IPFIX `dateTimeNanoseconds` value: seconds since 1900 in
/// the high word, 2^-32 fractions of a second in the low word (RFC 7011
/// §6.1.9). Values before the Unix epoch are unrepresentable and yield None.
pub(crate) fn from_ntp_nanos(v: u64) -> Option<DateTime<Utc>> {
    let secs = (v >> 32).checked_sub(NTP_TO_UNIX_SECS)?;
    let frac_ns = ((v & 0xFFFF_FFFF) * 1_000_000_000) >> 32;
    DateTime::from_timestamp(i64::try_from(secs).ok()?, frac_ns as u32)
}

fn from_unix_nanos(ns: i128) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(ns.div_euclid(NANOS_PER_SEC)).ok()?;
    let nanos = ns.rem_euclid(NANOS_PER_SEC) as u32;
    DateTime::from_timestamp(secs, nanos)
}

pub(crate) fn format_secs(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S").to_string()
}

pub(crate) fn format_millis(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub(crate) fn format_micros(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

pub(crate) fn format_nanos(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%S%.9fZ").to_string()
}
