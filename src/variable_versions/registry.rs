//! The template registry: a time-expiring cache of resolved templates keyed
//! by exporter identity, with optional JSON persistence for IPFIX so
//! templates survive a collector restart.

use crate::variable_versions::dictionary::FieldDictionary;
use crate::variable_versions::field_spec::{RawField, Template, resolve_template};
use crate::variable_versions::ttl::TtlCache;

use log::{debug, warn};

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// Identifies a template within the registry.
///
/// v9 keys carry the sender host and the header `source_id`; IPFIX keys
/// carry the `observation_domain_id` (the exporter identity already lives
/// in the PDU header, so the host stays None).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateKey {
    pub host: Option<String>,
    pub domain: u32,
    pub template_id: u16,
}

impl TemplateKey {
    pub fn new(host: Option<&str>, domain: u32, template_id: u16) -> Self {
        Self {
            host: host.map(str::to_string),
            domain,
            template_id,
        }
    }

    fn cache_string(&self) -> String {
        format!(
            "{}|{}|{}",
            self.host.as_deref().unwrap_or(""),
            self.domain,
            self.template_id
        )
    }

    fn from_cache_string(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, '|');
        let host = parts.next()?;
        let domain = parts.next()?.parse().ok()?;
        let template_id = parts.next()?.parse().ok()?;
        Some(Self {
            host: (!host.is_empty()).then(|| host.to_string()),
            domain,
            template_id,
        })
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Some(host) => write!(f, "{host}/{}/{}", self.domain, self.template_id),
            None => write!(f, "{}/{}", self.domain, self.template_id),
        }
    }
}

/// Verdict returned by a template validator. [`Reject`](TemplateAck::Reject)
/// is the only legal way to refuse a template after resolution succeeded:
/// the entry is neither cached nor persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateAck {
    Accept,
    Reject,
}

pub type TemplateValidator<'a> = &'a dyn Fn(&Template) -> TemplateAck;

/// One coarse mutex guards both the in-memory map and the file: updates only
/// happen on template flowsets, so contention stays low and no reader ever
/// sees a partial update.
#[derive(Debug)]
pub struct TemplateRegistry {
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    cache: TtlCache<TemplateKey, Template>,
    save_path: Option<PathBuf>,
}

impl TemplateRegistry {
    pub fn new(ttl: Duration, save_path: Option<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                cache: TtlCache::new(ttl),
                save_path,
            }),
        }
    }

    /// Re-registers entries persisted by an earlier run, re-resolving the
    /// raw fields through the current dictionary. An unreadable or corrupt
    /// file is logged and ignored; decoding starts with an empty cache.
    pub fn load(&self, dictionary: &FieldDictionary) {
        let mut inner = self.lock();
        let Some(path) = inner.save_path.clone() else {
            return;
        };
        if !path.exists() {
            return;
        }
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) => {
                warn!("could not read template cache {}: {e}", path.display());
                return;
            }
        };
        let entries: BTreeMap<String, Vec<RawField>> = match serde_json::from_str(&text) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("could not parse template cache {}: {e}", path.display());
                return;
            }
        };
        for (key, raw_fields) in entries {
            let Some(key) = TemplateKey::from_cache_string(&key) else {
                warn!("skipping malformed template cache key `{key}`");
                continue;
            };
            match resolve_template(&raw_fields, dictionary) {
                Ok(template) => inner.cache.insert(key, template),
                Err(unknown) => {
                    warn!("dropping persisted template {key}: unknown {unknown}");
                }
            }
        }
        debug!("loaded {} templates from {}", inner.cache.len(), path.display());
    }

    /// Resolves and stores a template. Returns None when a field is unknown
    /// to the dictionary or the validator rejects; nothing is cached or
    /// persisted in either case. A successful register refreshes the TTL and
    /// rewrites the cache file when persistence is configured.
    pub fn register(
        &self,
        key: TemplateKey,
        raw_fields: &[RawField],
        dictionary: &FieldDictionary,
        validator: Option<TemplateValidator<'_>>,
    ) -> Option<Template> {
        let template = match resolve_template(raw_fields, dictionary) {
            Ok(template) => template,
            Err(unknown) => {
                warn!("rejecting template {key}: unknown {unknown}");
                return None;
            }
        };
        if let Some(validator) = validator {
            if validator(&template) == TemplateAck::Reject {
                debug!("validator rejected template {key}");
                return None;
            }
        }
        let mut inner = self.lock();
        inner.cache.insert(key, template.clone());
        inner.persist();
        Some(template)
    }

    /// Returns the live template for a key, or None when absent or expired.
    pub fn fetch(&self, key: &TemplateKey) -> Option<Template> {
        self.lock().cache.get(key).cloned()
    }

    /// Rewrites the on-disk file to the current live set (no-op without a
    /// configured path). Expired entries are swept eagerly first.
    pub fn persist(&self) {
        self.lock().persist();
    }

    /// Live keys, for introspection and tests.
    pub fn keys(&self) -> Vec<TemplateKey> {
        self.lock().cache.iter_live().map(|(k, _)| k.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Inner {
    fn persist(&mut self) {
        let Some(path) = &self.save_path else {
            return;
        };
        self.cache.sweep();
        let entries: BTreeMap<String, Vec<RawField>> = self
            .cache
            .iter_live()
            .map(|(key, template)| (key.cache_string(), template.raw_fields().to_vec()))
            .collect();
        let json = match serde_json::to_string(&entries) {
            Ok(json) => json,
            Err(e) => {
                warn!("could not serialize template cache: {e}");
                return;
            }
        };
        // Write-then-rename so readers never observe a half-written file.
        let tmp = path.with_extension("tmp");
        if let Err(e) = fs::write(&tmp, json).and_then(|()| fs::rename(&tmp, path)) {
            warn!("could not persist template cache {}: {e}", path.display());
        }
    }
}

/// Tracks which (exporter, template id) combinations already produced a
/// missing-template warning so each one is reported once.
#[derive(Debug, Default)]
pub(crate) struct MissingTemplateLog(Mutex<HashSet<TemplateKey>>);

impl MissingTemplateLog {
    /// True the first time a key is reported.
    pub fn first_miss(&self, key: &TemplateKey) -> bool {
        self.0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone())
    }
}
