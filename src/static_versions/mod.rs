//! Fixed-layout NetFlow versions. Only v5 survives in the wild in numbers
//! worth supporting; it shares the event contract of the template-driven
//! decoders.

pub mod v5;
