// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Telemetry, tracing, and metrics infrastructure.
//!
//! - **Tracing**: structured logging with `tracing` + `EnvFilter`
//! - **Metrics**: lightweight in-process counters and latency histograms for
//!   the ingestion and retrieval pipelines, behind the `telemetry` feature
//!
//! Initialize at startup:
//!
//! ```rust,ignore
//! use archon::telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(&TelemetryConfig::default())?;
//! ```

mod init;
pub mod metrics;

pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard};
pub use metrics::{Metrics, MetricsSnapshot, OperationMetrics, GLOBAL_METRICS};
