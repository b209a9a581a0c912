// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! TTL-cached settings used by the ingestion and retrieval pipelines.
//!
//! Every tunable the pipelines read goes through [`SettingsCache::get`]: the
//! cache holds `(value, stored_at)` per key and refreshes entries older than
//! five minutes from the backing store. The backing store here is the process
//! environment; when a key is absent the caller's named default applies. The
//! cache never fails a read - a store problem degrades to the default.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::config::types::{ProviderConfig, ServiceType};

/// How long a cached settings entry stays fresh.
pub const SETTINGS_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct CachedValue {
    value: Option<String>,
    stored_at: Instant,
}

/// Process-wide settings cache.
///
/// Cheap to clone behind an `Arc`; all interior mutability is a single
/// `RwLock` over the key map.
#[derive(Debug, Default)]
pub struct SettingsCache {
    entries: RwLock<HashMap<String, CachedValue>>,
}

impl SettingsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a setting value, consulting the cache first.
    pub fn get(&self, key: &str) -> Option<String> {
        {
            let entries = self.entries.read().unwrap();
            if let Some(cached) = entries.get(key) {
                if cached.stored_at.elapsed() < SETTINGS_TTL {
                    return cached.value.clone();
                }
            }
        }

        let value = std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        let mut entries = self.entries.write().unwrap();
        entries.insert(
            key.to_string(),
            CachedValue {
                value: value.clone(),
                stored_at: Instant::now(),
            },
        );
        value
    }

    /// Get a string setting with a default.
    pub fn get_str(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Get an integer setting with a default. Unparseable values fall back to
    /// the default with a warning.
    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        match self.get(key) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid value for {}: '{}', using default {}", key, raw, default);
                default
            }),
            None => default,
        }
    }

    /// Get an integer setting clamped to a minimum of 1 (batch sizes, worker counts).
    pub fn get_clamped(&self, key: &str, default: i64) -> usize {
        let raw = self.get_i64(key, default);
        let clamped = raw.max(1);
        if clamped != raw {
            tracing::warn!("Invalid {}={}, clamped to {}", key, raw, clamped);
        }
        clamped as usize
    }

    /// Get a float setting with a default.
    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        match self.get(key) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                tracing::warn!("Invalid value for {}: '{}', using default {}", key, raw, default);
                default
            }),
            None => default,
        }
    }

    /// Get a boolean setting with a default. Matches `true` case-insensitively.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(raw) => raw.trim().eq_ignore_ascii_case("true"),
            None => default,
        }
    }

    /// Forget a cached entry so the next read hits the store.
    pub fn invalidate(&self, key: &str) {
        self.entries.write().unwrap().remove(key);
    }

    /// Seed a value directly into the cache (tests and admin overrides).
    pub fn seed(&self, key: &str, value: &str) {
        self.entries.write().unwrap().insert(
            key.to_string(),
            CachedValue {
                value: Some(value.to_string()),
                stored_at: Instant::now(),
            },
        );
    }

    /// Resolve the active provider configuration for a service slot.
    ///
    /// Provider selection comes from `LLM_PROVIDER` / `EMBEDDING_PROVIDER`
    /// (embedding falls back to the LLM provider when unset), the API key from
    /// `<PROVIDER>_API_KEY`, and model overrides from `MODEL_CHOICE` /
    /// `EMBEDDING_MODEL`.
    pub fn get_active_provider(&self, service: ServiceType) -> ProviderConfig {
        let provider = match service {
            ServiceType::Llm => self.get_str("LLM_PROVIDER", "openai"),
            ServiceType::Embedding => self
                .get("EMBEDDING_PROVIDER")
                .unwrap_or_else(|| self.get_str("LLM_PROVIDER", "openai")),
        }
        .to_lowercase();

        let key_var = format!("{}_API_KEY", provider.to_uppercase());
        let api_key = self.get(&key_var);

        let base_url = match service {
            ServiceType::Llm => self.get("LLM_BASE_URL"),
            ServiceType::Embedding => self
                .get("OLLAMA_EMBEDDING_URL")
                .or_else(|| self.get("LLM_BASE_URL")),
        };

        ProviderConfig {
            provider,
            api_key,
            base_url,
            chat_model: self.get("MODEL_CHOICE"),
            embedding_model: self.get("EMBEDDING_MODEL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_for_missing_keys() {
        let cache = SettingsCache::new();
        assert_eq!(cache.get_i64("ARCHON_TEST_MISSING_KEY", 42), 42);
        assert!(cache.get_bool("ARCHON_TEST_MISSING_BOOL", true));
        assert_eq!(cache.get_str("ARCHON_TEST_MISSING_STR", "x"), "x");
    }

    #[test]
    fn test_seeded_values_are_served_and_parsed() {
        let cache = SettingsCache::new();
        cache.seed("EMBEDDING_BATCH_SIZE", "25");
        cache.seed("USE_HYBRID_SEARCH", "TRUE");
        cache.seed("MAX_PROSE_RATIO", "0.3");
        assert_eq!(cache.get_i64("EMBEDDING_BATCH_SIZE", 100), 25);
        assert!(cache.get_bool("USE_HYBRID_SEARCH", false));
        assert!((cache.get_f64("MAX_PROSE_RATIO", 0.15) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_clamped_floor_is_one() {
        let cache = SettingsCache::new();
        cache.seed("DELETE_BATCH_SIZE", "0");
        assert_eq!(cache.get_clamped("DELETE_BATCH_SIZE", 50), 1);
        cache.seed("DELETE_BATCH_SIZE", "-5");
        cache.invalidate("DELETE_BATCH_SIZE");
        // After invalidation the env (unset) wins, so the default applies.
        assert_eq!(cache.get_clamped("DELETE_BATCH_SIZE", 50), 50);
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let cache = SettingsCache::new();
        cache.seed("CRAWL_BATCH_SIZE", "not-a-number");
        assert_eq!(cache.get_i64("CRAWL_BATCH_SIZE", 50), 50);
    }

    #[test]
    fn test_active_provider_defaults_to_openai() {
        let cache = SettingsCache::new();
        let config = cache.get_active_provider(ServiceType::Embedding);
        assert_eq!(config.provider, "openai");
    }

    #[test]
    fn test_embedding_provider_overrides_llm_provider() {
        let cache = SettingsCache::new();
        cache.seed("LLM_PROVIDER", "google");
        cache.seed("EMBEDDING_PROVIDER", "ollama");
        assert_eq!(
            cache.get_active_provider(ServiceType::Llm).provider,
            "google"
        );
        assert_eq!(
            cache.get_active_provider(ServiceType::Embedding).provider,
            "ollama"
        );
    }
}
