//! 🦉 strix: change-stream records in, bulk-index requests out.
//!
//! Decode the stream's tagged images, buffer them behind bulk control lines,
//! project counter deltas for the monitoring index, flush. See [`run`].

pub mod app_config;
pub mod buffer;
pub mod classifier;
pub mod clock;
pub mod pipeline;
pub mod stream;
pub mod transport;
pub mod wire;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::app_config::AppConfig;
use crate::clock::SystemClock;
use crate::pipeline::{BatchReport, Pipeline};
use crate::stream::StreamBatch;
use crate::transport::Transport;

/// 🚀 Process one upstream batch against the wall clock.
pub async fn run(
    app_config: &AppConfig,
    batch: StreamBatch,
    transport: &dyn Transport,
) -> Result<BatchReport> {
    Pipeline::new(app_config, transport, Arc::new(SystemClock))
        .process_stream_batch(batch)
        .await
        .context("💀 The batch could not be processed. Per-event trouble gets skipped, so this is config or a caller bug.")
}
