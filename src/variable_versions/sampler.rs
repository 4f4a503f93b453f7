//! The sampler table: option records that describe how an exporter
//! sub-samples flows, cached so later data records can be decorated with
//! `sampling_algorithm` and `sampling_interval`.

use crate::variable_versions::ttl::TtlCache;

use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SamplerKey {
    pub host: Option<String>,
    pub source_id: u32,
    pub sampler_id: u64,
}

impl SamplerKey {
    pub fn new(host: Option<&str>, source_id: u32, sampler_id: u64) -> Self {
        Self {
            host: host.map(str::to_string),
            source_id,
            sampler_id,
        }
    }
}

/// Sampling parameters announced by an option record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sampler {
    pub mode: u64,
    pub random_interval: u64,
}

/// Same TTL mechanics as the template registry: refreshed and swept on
/// every write, filtered on read.
#[derive(Debug)]
pub struct SamplerTable {
    inner: Mutex<TtlCache<SamplerKey, Sampler>>,
}

impl SamplerTable {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(TtlCache::new(ttl)),
        }
    }

    pub fn insert(&self, key: SamplerKey, sampler: Sampler) {
        self.lock().insert(key, sampler);
    }

    pub fn fetch(&self, key: &SamplerKey) -> Option<Sampler> {
        self.lock().get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TtlCache<SamplerKey, Sampler>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
