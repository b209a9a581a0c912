// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Ingestion orchestration.
//!
//! An orchestrator coordinates classification, crawling, chunking, source
//! creation, storage and code extraction as one cancellable operation. Live
//! orchestrations register themselves in a process-wide map so the stop
//! endpoint can find the cancellation token and task handle; a global
//! semaphore bounds how many whole orchestrations run at once.

pub mod crawl;
pub mod upload;

pub use crawl::{orchestrate_crawl, CrawlRequest};
pub use upload::{orchestrate_upload, UploadRequest};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;

use crate::config::SettingsCache;
use crate::crawling::PageFetcher;
use crate::embeddings::EmbeddingService;
use crate::llm::LlmClientFactory;
use crate::progress::{
    CancellationToken, ProgressMapper, ProgressReporter, ProgressTracker, ProgressUpdate,
};

/// Whole-orchestration concurrency bound (distinct from the per-crawl page
/// concurrency `CRAWL_MAX_CONCURRENT`).
pub static CRAWL_SEMAPHORE: Lazy<Semaphore> = Lazy::new(|| {
    let limit = std::env::var("CONCURRENT_CRAWL_LIMIT")
        .ok()
        .and_then(|raw| raw.parse::<usize>().ok())
        .filter(|&n| n >= 1)
        .unwrap_or(3);
    Semaphore::new(limit)
});

/// Handle to a live orchestration, registered for cancellation lookup.
#[derive(Clone)]
pub struct OrchestrationHandle {
    pub token: CancellationToken,
    pub abort: AbortHandle,
}

static ORCHESTRATIONS: Lazy<RwLock<HashMap<String, OrchestrationHandle>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

pub fn register_orchestration(progress_id: &str, handle: OrchestrationHandle) {
    ORCHESTRATIONS
        .write()
        .unwrap()
        .insert(progress_id.to_string(), handle);
}

pub fn get_active_orchestration(progress_id: &str) -> Option<OrchestrationHandle> {
    ORCHESTRATIONS.read().unwrap().get(progress_id).cloned()
}

pub fn unregister_orchestration(progress_id: &str) {
    ORCHESTRATIONS.write().unwrap().remove(progress_id);
}

/// Shared dependencies threaded through every orchestration.
#[derive(Clone)]
pub struct IngestContext {
    pub pool: sqlx::PgPool,
    pub settings: Arc<SettingsCache>,
    pub factory: LlmClientFactory,
    pub embeddings: Arc<EmbeddingService>,
    pub fetcher: Arc<PageFetcher>,
}

/// Reporter that maps stage-local progress onto the overall range and writes
/// it through the operation tracker.
///
/// Each pipeline stage gets its own reporter bound to a stage name; the
/// mapper enforces monotonicity across all of them. A `cancelled` status from
/// a strategy passes through with progress preserved.
pub struct StageReporter {
    tracker: ProgressTracker,
    mapper: Arc<std::sync::Mutex<ProgressMapper>>,
    stage: &'static str,
}

impl StageReporter {
    pub fn new(
        tracker: ProgressTracker,
        mapper: Arc<std::sync::Mutex<ProgressMapper>>,
        stage: &'static str,
    ) -> Self {
        Self {
            tracker,
            mapper,
            stage,
        }
    }
}

#[async_trait]
impl ProgressReporter for StageReporter {
    async fn report(&self, update: ProgressUpdate) {
        let cancelled = update.status == "cancelled";
        let overall = {
            let mut mapper = self.mapper.lock().unwrap();
            if cancelled {
                mapper.map_by_name("cancelled", update.progress)
            } else {
                mapper.map_by_name(self.stage, update.progress)
            }
        };
        let status = if cancelled { "cancelled" } else { self.stage };
        self.tracker
            .update(status, overall, &update.message, update.extras);
    }
}

/// Emits a liveness update when no state change happened for 30 seconds.
pub struct Heartbeat {
    tracker: ProgressTracker,
    mapper: Arc<std::sync::Mutex<ProgressMapper>>,
    last: std::time::Instant,
    interval: std::time::Duration,
}

impl Heartbeat {
    pub fn new(tracker: ProgressTracker, mapper: Arc<std::sync::Mutex<ProgressMapper>>) -> Self {
        Self {
            tracker,
            mapper,
            last: std::time::Instant::now(),
            interval: std::time::Duration::from_secs(30),
        }
    }

    /// Send a heartbeat if the interval elapsed since the last one.
    pub fn beat_if_due(&mut self) {
        if self.last.elapsed() < self.interval {
            return;
        }
        let (stage, progress) = {
            let mapper = self.mapper.lock().unwrap();
            (mapper.current_stage(), mapper.current_progress())
        };
        let mut extras = serde_json::Map::new();
        extras.insert("heartbeat".to_string(), serde_json::Value::Bool(true));
        self.tracker.update(
            stage.as_str(),
            progress,
            "Background task still running...",
            extras,
        );
        self.last = std::time::Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orchestration_registry_roundtrip() {
        let token = CancellationToken::new();
        let task = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .spawn(async {});
        let handle = OrchestrationHandle {
            token: token.clone(),
            abort: task.abort_handle(),
        };

        register_orchestration("test-orch", handle);
        let found = get_active_orchestration("test-orch").unwrap();
        found.token.cancel();
        assert!(token.is_cancelled());

        unregister_orchestration("test-orch");
        assert!(get_active_orchestration("test-orch").is_none());
    }
}
