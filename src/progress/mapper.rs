// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Stage-to-overall progress mapping.
//!
//! Each pipeline stage owns a fixed slice of the overall 0-100 range; the
//! mapper projects stage-local progress into that slice and is the sole
//! authority for monotonicity - mapped output never decreases within one
//! operation, and error/cancelled states preserve the last known value.

/// Pipeline stages with their overall progress ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressStage {
    Starting,
    Initializing,
    Analyzing,
    Crawling,
    Processing,
    SourceCreation,
    DocumentStorage,
    CodeExtraction,
    Finalization,
    Completed,
    // Upload-specific stages
    Reading,
    TextExtraction,
    Chunking,
    Summarizing,
    Storing,
    // Terminal states that preserve progress
    Error,
    Cancelled,
}

impl ProgressStage {
    /// Parse a stage name. Unknown names return `None` so callers can keep
    /// the current progress rather than guessing.
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "starting" => Self::Starting,
            "initializing" => Self::Initializing,
            "analyzing" => Self::Analyzing,
            "crawling" => Self::Crawling,
            "processing" => Self::Processing,
            "source_creation" => Self::SourceCreation,
            "document_storage" => Self::DocumentStorage,
            "code_extraction" | "code_storage" => Self::CodeExtraction,
            "finalization" => Self::Finalization,
            "completed" => Self::Completed,
            "reading" => Self::Reading,
            "text_extraction" => Self::TextExtraction,
            "chunking" => Self::Chunking,
            "summarizing" => Self::Summarizing,
            "storing" => Self::Storing,
            "error" | "failed" => Self::Error,
            "cancelled" => Self::Cancelled,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Initializing => "initializing",
            Self::Analyzing => "analyzing",
            Self::Crawling => "crawling",
            Self::Processing => "processing",
            Self::SourceCreation => "source_creation",
            Self::DocumentStorage => "document_storage",
            Self::CodeExtraction => "code_extraction",
            Self::Finalization => "finalization",
            Self::Completed => "completed",
            Self::Reading => "reading",
            Self::TextExtraction => "text_extraction",
            Self::Chunking => "chunking",
            Self::Summarizing => "summarizing",
            Self::Storing => "storing",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// The `[start, end]` slice of overall progress this stage owns.
    ///
    /// Ranges reflect where the time actually goes: embeddings and code
    /// summaries dominate, so document_storage and code_extraction get the
    /// widest slices.
    pub fn range(&self) -> (u32, u32) {
        match self {
            Self::Starting | Self::Initializing => (0, 1),
            Self::Analyzing => (1, 3),
            Self::Crawling => (3, 15),
            Self::Processing => (15, 20),
            Self::SourceCreation => (20, 25),
            Self::DocumentStorage => (25, 40),
            Self::CodeExtraction => (40, 90),
            Self::Finalization => (90, 100),
            Self::Completed => (100, 100),
            Self::Reading => (0, 5),
            Self::TextExtraction => (5, 10),
            Self::Chunking => (10, 15),
            Self::Summarizing => (25, 35),
            Self::Storing => (35, 100),
            // Preserve last known progress
            Self::Error | Self::Cancelled => (0, 0),
        }
    }

    pub fn is_terminal_preserving(&self) -> bool {
        matches!(self, Self::Error | Self::Cancelled)
    }
}

/// Maps stage-local progress to overall progress, never going backwards.
#[derive(Debug, Clone)]
pub struct ProgressMapper {
    last_overall: u32,
    current_stage: ProgressStage,
}

impl Default for ProgressMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressMapper {
    pub fn new() -> Self {
        Self {
            last_overall: 0,
            current_stage: ProgressStage::Starting,
        }
    }

    /// Map stage-local progress (0-100) into overall progress (0-100).
    pub fn map(&mut self, stage: ProgressStage, stage_progress: f64) -> u32 {
        if stage.is_terminal_preserving() {
            return self.last_overall;
        }
        if stage == ProgressStage::Completed {
            self.last_overall = 100;
            self.current_stage = stage;
            return 100;
        }

        let (start, end) = stage.range();
        let clamped = stage_progress.clamp(0.0, 100.0);
        let mapped = start as f64 + (clamped / 100.0) * (end - start) as f64;

        // Never go backwards
        let overall = (mapped.round() as u32).max(self.last_overall);

        self.last_overall = overall;
        self.current_stage = stage;
        overall
    }

    /// Map by a stage name string; unknown stages keep the current value.
    pub fn map_by_name(&mut self, stage: &str, stage_progress: f64) -> u32 {
        match ProgressStage::parse(stage) {
            Some(stage) => self.map(stage, stage_progress),
            None => self.last_overall,
        }
    }

    /// Convenience for batch loops: 1-based `current` of `total` batches.
    pub fn map_batch(&mut self, stage: ProgressStage, current: usize, total: usize) -> u32 {
        if total == 0 {
            return self.last_overall;
        }
        let stage_progress = ((current.saturating_sub(1)) as f64 / total as f64) * 100.0;
        self.map(stage, stage_progress)
    }

    pub fn current_stage(&self) -> ProgressStage {
        self.current_stage
    }

    pub fn current_progress(&self) -> u32 {
        self.last_overall
    }

    pub fn reset(&mut self) {
        self.last_overall = 0;
        self.current_stage = ProgressStage::Starting;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_endpoints_hit_stage_bounds() {
        let mut mapper = ProgressMapper::new();
        assert_eq!(mapper.map(ProgressStage::Crawling, 0.0), 3);
        assert_eq!(mapper.map(ProgressStage::Crawling, 100.0), 15);
        assert_eq!(mapper.map(ProgressStage::DocumentStorage, 100.0), 40);
        assert_eq!(mapper.map(ProgressStage::CodeExtraction, 100.0), 90);
        assert_eq!(mapper.map(ProgressStage::Completed, 0.0), 100);
    }

    #[test]
    fn test_never_decreases_across_stage_jitter() {
        let mut mapper = ProgressMapper::new();
        let sequence = [
            (ProgressStage::DocumentStorage, 0.0),
            (ProgressStage::DocumentStorage, 40.0),
            (ProgressStage::DocumentStorage, 20.0), // regression attempt
            (ProgressStage::DocumentStorage, 60.0),
            (ProgressStage::DocumentStorage, 60.0),
            (ProgressStage::DocumentStorage, 80.0),
            (ProgressStage::DocumentStorage, 100.0),
        ];
        let mut last = 0;
        for (stage, pct) in sequence {
            let mapped = mapper.map(stage, pct);
            assert!(mapped >= last, "progress went backwards: {} -> {}", last, mapped);
            last = mapped;
        }
        assert_eq!(last, 40);
    }

    #[test]
    fn test_error_and_cancelled_preserve_progress() {
        let mut mapper = ProgressMapper::new();
        mapper.map(ProgressStage::Crawling, 50.0);
        let before = mapper.current_progress();
        assert_eq!(mapper.map(ProgressStage::Error, 0.0), before);
        assert_eq!(mapper.map(ProgressStage::Cancelled, 100.0), before);
    }

    #[test]
    fn test_unknown_stage_name_keeps_progress() {
        let mut mapper = ProgressMapper::new();
        mapper.map(ProgressStage::Processing, 100.0);
        let before = mapper.current_progress();
        assert_eq!(mapper.map_by_name("mystery_stage", 90.0), before);
    }

    #[test]
    fn test_stage_progress_clamped() {
        let mut mapper = ProgressMapper::new();
        assert_eq!(mapper.map(ProgressStage::Analyzing, 150.0), 3);
        let mut mapper = ProgressMapper::new();
        assert_eq!(mapper.map(ProgressStage::Analyzing, -10.0), 1);
    }

    #[test]
    fn test_map_batch_is_zero_based_fraction() {
        let mut mapper = ProgressMapper::new();
        // Batch 1 of 4 means 0% of the stage done when it starts.
        assert_eq!(
            mapper.map_batch(ProgressStage::DocumentStorage, 1, 4),
            25
        );
        assert_eq!(
            mapper.map_batch(ProgressStage::DocumentStorage, 3, 4),
            25 + ((50.0 / 100.0) * 15.0_f64).round() as u32
        );
    }

    #[test]
    fn test_upload_stage_ranges() {
        let mut mapper = ProgressMapper::new();
        assert_eq!(mapper.map(ProgressStage::Reading, 100.0), 5);
        assert_eq!(mapper.map(ProgressStage::TextExtraction, 100.0), 10);
        assert_eq!(mapper.map(ProgressStage::Chunking, 100.0), 15);
        assert_eq!(mapper.map(ProgressStage::Summarizing, 100.0), 35);
        assert_eq!(mapper.map(ProgressStage::Storing, 100.0), 100);
    }

    #[test]
    fn test_monotone_under_retried_batches() {
        // Simulates embeddings failing on batches 3/5 and succeeding on retry:
        // the emitted sequence must be non-decreasing.
        let mut mapper = ProgressMapper::new();
        let fractions = [0.0, 20.0, 40.0, 40.0, 60.0, 80.0, 100.0];
        let mut outputs = Vec::new();
        for pct in fractions {
            outputs.push(mapper.map(ProgressStage::DocumentStorage, pct));
        }
        assert!(outputs.windows(2).all(|w| w[1] >= w[0]));
        assert_eq!(*outputs.first().unwrap(), 25);
        assert_eq!(*outputs.last().unwrap(), 40);
    }
}
