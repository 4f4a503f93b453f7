#![doc = include_str!("../README.md")]

pub mod error;
pub mod event;
pub mod static_versions;
mod tests;
mod time;
pub mod variable_versions;

pub use error::{ConfigError, DecodeError};
pub use event::{ApplicationId, FieldValue, FlowEvent};
pub use variable_versions::TemplateEngine;
pub use variable_versions::dictionary::{FieldDef, FieldDictionary, FieldKind};
pub use variable_versions::field_spec::{
    FieldSpec, RawField, Template, UnknownField, VARIABLE_LENGTH,
};
pub use variable_versions::registry::{
    TemplateAck, TemplateKey, TemplateRegistry, TemplateValidator,
};
pub use variable_versions::sampler::{Sampler, SamplerKey, SamplerTable};

use variable_versions::registry::MissingTemplateLog;

use chrono::{DateTime, Utc};
use log::{debug, warn};
use nom_derive::{Nom, Parse};

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Seconds before unused templates and samplers expire.
const DEFAULT_CACHE_TTL_SECS: u64 = 4000;

/// File the IPFIX registry persists into, inside the configured directory.
const IPFIX_CACHE_FILE: &str = "ipfix_templates.cache";

#[derive(Nom)]
/// Generic header used only to dispatch on the version word
struct GenericNetflowHeader {
    version: u16,
}

/// Per-event knobs shared by every version decoder.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct DecodeOptions {
    pub switched_times_from_uptime: bool,
    pub include_flowset_id: bool,
}

/// Decoder for NetFlow V5, V9 and IPFIX datagrams.
///
/// Built once via [`NetflowDecoder::builder`], then fed one datagram at a
/// time from any number of threads; the template registries and the sampler
/// table are internally synchronized. Events come back through the sink in
/// wire order within a datagram.
///
/// ```rust
/// use netflow_codec::NetflowDecoder;
///
/// let decoder = NetflowDecoder::builder()
///     .with_allowed_versions([9, 10].into())
///     .build()
///     .expect("default field dictionaries load");
///
/// decoder.decode(&[], Some("192.0.2.1"), |_ts, _event| {});
/// ```
#[derive(Debug)]
pub struct NetflowDecoder {
    v9: TemplateEngine,
    ipfix: TemplateEngine,
    samplers: SamplerTable,
    allowed_versions: HashSet<u16>,
    options: DecodeOptions,
    missing_templates: MissingTemplateLog,
}

/// Builder for configuring and constructing a [`NetflowDecoder`].
///
/// ```rust
/// use netflow_codec::NetflowDecoder;
/// use std::time::Duration;
///
/// let decoder = NetflowDecoder::builder()
///     .with_cache_ttl(Duration::from_secs(7200))
///     .with_include_flowset_id(true)
///     .build()
///     .expect("default field dictionaries load");
/// ```
#[derive(Debug, Clone, Default)]
pub struct NetflowDecoderBuilder {
    allowed_versions: Option<HashSet<u16>>,
    cache_ttl: Option<Duration>,
    definitions: Option<PathBuf>,
    ipfix_definitions: Option<PathBuf>,
    cache_save_path: Option<PathBuf>,
    switched_times_from_uptime: bool,
    include_flowset_id: bool,
}

impl NetflowDecoderBuilder {
    /// Restricts which NetFlow versions the decoder accepts (out of 5, 9
    /// and 10). Filtered datagrams are dropped with a debug log.
    #[must_use]
    pub fn with_allowed_versions(mut self, versions: HashSet<u16>) -> Self {
        self.allowed_versions = Some(versions);
        self
    }

    /// How long unused templates and samplers stay live. Default 4000 s.
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Extra NetFlow v9 field definitions (YAML, field id to definition
    /// array), merged into the `option` category of the built-in dictionary.
    #[must_use]
    pub fn with_definitions(mut self, path: impl Into<PathBuf>) -> Self {
        self.definitions = Some(path.into());
        self
    }

    /// Extra IPFIX field definitions (YAML, enterprise id to field map),
    /// merged into the built-in dictionary per enterprise.
    #[must_use]
    pub fn with_ipfix_definitions(mut self, path: impl Into<PathBuf>) -> Self {
        self.ipfix_definitions = Some(path.into());
        self
    }

    /// Directory for the IPFIX template cache file. Templates registered
    /// there survive a restart; unset disables persistence.
    #[must_use]
    pub fn with_cache_save_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_save_path = Some(dir.into());
        self
    }

    /// Keep `first_switched`/`last_switched` as raw boot-relative
    /// milliseconds instead of converting them to wall-clock ISO-8601.
    #[must_use]
    pub fn with_switched_times_from_uptime(mut self, keep_raw: bool) -> Self {
        self.switched_times_from_uptime = keep_raw;
        self
    }

    /// Add the `flowset_id` to every v9/IPFIX data event.
    #[must_use]
    pub fn with_include_flowset_id(mut self, include: bool) -> Self {
        self.include_flowset_id = include;
        self
    }

    /// Builds the decoder: loads and merges the field dictionaries and
    /// re-loads any persisted IPFIX templates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a definitions file is missing, is not
    /// valid YAML, or has no mapping to merge into. A persisted template
    /// cache that fails to load is only logged; decoding starts with an
    /// empty cache.
    pub fn build(self) -> Result<NetflowDecoder, ConfigError> {
        let cache_ttl = self
            .cache_ttl
            .unwrap_or(Duration::from_secs(DEFAULT_CACHE_TTL_SECS));

        let v9 = TemplateEngine {
            dictionary: FieldDictionary::netflow_v9(self.definitions.as_deref())?,
            registry: TemplateRegistry::new(cache_ttl, None),
        };
        let ipfix = TemplateEngine {
            dictionary: FieldDictionary::ipfix(self.ipfix_definitions.as_deref())?,
            registry: TemplateRegistry::new(
                cache_ttl,
                self.cache_save_path.map(|dir| dir.join(IPFIX_CACHE_FILE)),
            ),
        };
        ipfix.registry.load(&ipfix.dictionary);

        Ok(NetflowDecoder {
            v9,
            ipfix,
            samplers: SamplerTable::new(cache_ttl),
            allowed_versions: self
                .allowed_versions
                .unwrap_or_else(|| [5, 9, 10].into()),
            options: DecodeOptions {
                switched_times_from_uptime: self.switched_times_from_uptime,
                include_flowset_id: self.include_flowset_id,
            },
            missing_templates: MissingTemplateLog::default(),
        })
    }
}

impl NetflowDecoder {
    pub fn builder() -> NetflowDecoderBuilder {
        NetflowDecoderBuilder::default()
    }

    /// Decodes one datagram, emitting `(timestamp, event)` pairs through
    /// the sink in wire order.
    ///
    /// `host` is the sender's identity as seen by the socket layer; it keys
    /// v9 templates and samplers so exporters reusing template ids cannot
    /// clobber each other.
    ///
    /// Never fails: malformed datagrams are logged and dropped, missing
    /// templates drop only their flowset, and a decode error can never
    /// cross a datagram boundary.
    pub fn decode<F>(&self, datagram: &[u8], host: Option<&str>, mut sink: F)
    where
        F: FnMut(DateTime<Utc>, FlowEvent),
    {
        let (remaining, header) = match GenericNetflowHeader::parse(datagram) {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(
                    "datagram from {} too short for a NetFlow header ({} bytes)",
                    host.unwrap_or("<unknown>"),
                    datagram.len()
                );
                return;
            }
        };
        if !self.allowed_versions.contains(&header.version) {
            debug!("ignoring NetFlow version {} (filtered)", header.version);
            return;
        }

        let result = match header.version {
            5 => static_versions::v5::decode(remaining, &self.options, &mut sink),
            9 => variable_versions::v9::Reader {
                engine: &self.v9,
                samplers: &self.samplers,
                options: &self.options,
                missing: &self.missing_templates,
                host,
            }
            .decode(remaining, &mut sink),
            10 => variable_versions::ipfix::Reader {
                engine: &self.ipfix,
                samplers: &self.samplers,
                options: &self.options,
                missing: &self.missing_templates,
                host,
            }
            .decode(remaining, &mut sink),
            version => Err(DecodeError::UnsupportedVersion(version)),
        };

        if let Err(e) = result {
            warn!(
                "dropping NetFlow datagram from {}: {e}",
                host.unwrap_or("<unknown>")
            );
        }
    }

    /// The v9 dictionary/registry pair, mostly for introspection and tests.
    pub fn v9_engine(&self) -> &TemplateEngine {
        &self.v9
    }

    /// The IPFIX dictionary/registry pair.
    pub fn ipfix_engine(&self) -> &TemplateEngine {
        &self.ipfix
    }

    pub fn samplers(&self) -> &SamplerTable {
        &self.samplers
    }

    /// Live v9 template keys.
    pub fn v9_template_keys(&self) -> Vec<TemplateKey> {
        self.v9.registry.keys()
    }

    /// Live IPFIX template keys.
    pub fn ipfix_template_keys(&self) -> Vec<TemplateKey> {
        self.ipfix.registry.keys()
    }

    /// Rewrites the IPFIX template cache file to the current live set.
    /// No-op unless a cache save path was configured.
    pub fn persist_ipfix_templates(&self) {
        self.ipfix.registry.persist();
    }
}
