//! Typed pipeline diagnostics delivered through an injected [`EventSink`].
//!
//! Pipeline components never log directly; they emit [`HarvestEvent`]s and the
//! sink decides where they go. [`TracingSink`] forwards to `tracing` at a level
//! chosen per event, [`MemorySink`] keeps them for inspection.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::types::StrategyKind;

/// Stages of one DOM extraction run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStage {
    Launch,
    AntiDetectionSetup,
    NavigateAndSettle,
    ScrollSimulate,
    WaitForFileList,
    ExtractDescriptors,
    Teardown,
}

/// A clickable element reported when no download control could be found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickableElement {
    pub tag: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HarvestEvent {
    CrawlStarted {
        url: String,
        med_seq: Option<String>,
    },
    CatalogRequested {
        med_seq: String,
        endpoint: String,
    },
    CatalogUnavailable {
        med_seq: String,
        detail: String,
    },
    CatalogResolved {
        med_seq: String,
        assets: usize,
        images: usize,
    },
    StrategyDeferred {
        strategy: StrategyKind,
        reason: String,
    },
    StageEntered {
        stage: ExtractionStage,
    },
    FileListTimeout {
        waited_ms: u64,
    },
    DescriptorsExtracted {
        structured: usize,
        generic: usize,
    },
    BulkControlFound {
        matcher: String,
        selector: String,
    },
    ClickFailed {
        method: String,
        error: String,
    },
    ClickableElementsDumped {
        elements: Vec<ClickableElement>,
    },
    BulkDownloadSettled {
        files: Vec<String>,
        elapsed_ms: u64,
    },
    BulkDownloadFailed {
        error: String,
    },
    DownloadStarted {
        file_name: String,
        url: Option<String>,
    },
    DownloadFinished {
        file_name: String,
        size_bytes: u64,
        duration_ms: u64,
    },
    DownloadFailed {
        file_name: String,
        error: String,
    },
    DescriptorSkipped {
        file_name: String,
        reason: String,
    },
    AlternateFallback {
        reason: String,
    },
    TeardownFailed {
        error: String,
    },
    CrawlFinished {
        strategy: StrategyKind,
        descriptors: usize,
        downloads: usize,
        duration_ms: u64,
    },
    CrawlFailed {
        error_type: String,
        error: String,
    },
}

/// Receives pipeline events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: HarvestEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: HarvestEvent) {
        use HarvestEvent::*;
        match &event {
            CatalogUnavailable { .. }
            | StrategyDeferred { .. }
            | FileListTimeout { .. }
            | ClickFailed { .. }
            | ClickableElementsDumped { .. }
            | BulkDownloadFailed { .. }
            | DownloadFailed { .. }
            | AlternateFallback { .. }
            | TeardownFailed { .. } => tracing::warn!(?event, "harvest"),
            CrawlFailed { .. } => tracing::error!(?event, "harvest"),
            StageEntered { .. } | DownloadStarted { .. } | CatalogRequested { .. } => {
                tracing::debug!(?event, "harvest")
            }
            _ => tracing::info!(?event, "harvest"),
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<HarvestEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<HarvestEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Stages entered, in order.
    pub fn stages(&self) -> Vec<ExtractionStage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                HarvestEvent::StageEntered { stage } => Some(stage),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: HarvestEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
