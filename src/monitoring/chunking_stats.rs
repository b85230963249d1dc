use crate::chunker::{Chunk, ChunkParams, Language};
use chrono::Utc;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub const DEFAULT_HISTORY_SIZE: usize = 50;
pub const MIN_HISTORY_SIZE: usize = 1;
pub const MAX_HISTORY_SIZE: usize = 1000;

static HISTORY_CAPACITY: Lazy<AtomicUsize> = Lazy::new(|| AtomicUsize::new(DEFAULT_HISTORY_SIZE));
static SNAPSHOTS: Lazy<Mutex<VecDeque<ChunkingSnapshot>>> =
    Lazy::new(|| Mutex::new(VecDeque::with_capacity(DEFAULT_HISTORY_SIZE)));
static LOGGING_ENABLED: Lazy<AtomicBool> = Lazy::new(|| AtomicBool::new(true));

/// Summary of one chunking run, kept in a bounded in-memory history.
#[derive(Clone, Serialize, Debug)]
pub struct ChunkingSnapshot {
    pub recorded_at: String,
    /// Where the text came from: file, multipart_text, json, form, text or other
    pub source: String,
    pub unit: String,
    pub size: usize,
    pub overlap: usize,
    pub input_len: usize,
    pub chunks: usize,
    pub non_ascii_chunks: usize,
    pub duration_us: u64,
}

impl ChunkingSnapshot {
    pub fn new(
        source: &str,
        params: &ChunkParams,
        input_len: usize,
        chunks: &[Chunk],
        duration_us: u64,
    ) -> Self {
        Self {
            recorded_at: Utc::now().to_rfc3339(),
            source: source.to_string(),
            unit: params.unit().to_string(),
            size: params.size(),
            overlap: params.overlap(),
            input_len,
            chunks: chunks.len(),
            non_ascii_chunks: chunks
                .iter()
                .filter(|c| c.language == Language::Auto)
                .count(),
            duration_us,
        }
    }
}

fn current_capacity() -> usize {
    HISTORY_CAPACITY
        .load(Ordering::Relaxed)
        .clamp(MIN_HISTORY_SIZE, MAX_HISTORY_SIZE)
}

/// Resize the history, dropping the oldest entries if it shrinks.
/// Returns the capacity actually applied.
pub fn set_chunking_history_capacity(new_cap: usize) -> usize {
    let bounded = new_cap.clamp(MIN_HISTORY_SIZE, MAX_HISTORY_SIZE);
    HISTORY_CAPACITY.store(bounded, Ordering::Relaxed);
    if let Ok(mut guard) = SNAPSHOTS.lock() {
        while guard.len() > bounded {
            guard.pop_front();
        }
    }
    bounded
}

pub fn chunking_history_capacity() -> usize {
    current_capacity()
}

pub fn set_chunking_logging_enabled(enabled: bool) {
    LOGGING_ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn chunking_logging_enabled() -> bool {
    LOGGING_ENABLED.load(Ordering::Relaxed)
}

pub fn record_chunking_snapshot(snapshot: ChunkingSnapshot) {
    if LOGGING_ENABLED.load(Ordering::Relaxed) {
        tracing::info!(
            target: "chunking_snapshot",
            source = %snapshot.source,
            unit = %snapshot.unit,
            size = snapshot.size,
            overlap = snapshot.overlap,
            input_len = snapshot.input_len,
            chunks = snapshot.chunks,
            non_ascii_chunks = snapshot.non_ascii_chunks,
            duration_us = snapshot.duration_us,
            "chunking run"
        );
    }

    if let Ok(mut guard) = SNAPSHOTS.lock() {
        let cap = current_capacity();
        while guard.len() >= cap {
            guard.pop_front();
        }
        guard.push_back(snapshot);
    }
}

pub fn latest_chunking_snapshot() -> Option<ChunkingSnapshot> {
    SNAPSHOTS
        .lock()
        .ok()
        .and_then(|guard| guard.back().cloned())
}

/// Newest first, at most `limit` entries.
pub fn chunking_snapshot_history(limit: usize) -> Vec<ChunkingSnapshot> {
    let limit = limit
        .clamp(MIN_HISTORY_SIZE, MAX_HISTORY_SIZE)
        .min(current_capacity());
    SNAPSHOTS
        .lock()
        .map(|guard| guard.iter().rev().take(limit).cloned().collect())
        .unwrap_or_default()
}
