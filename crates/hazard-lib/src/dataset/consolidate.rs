//! Partition consolidation
//!
//! Merges partitioned delimited-text extracts into one staged corpus with a
//! single header row. Partitions are read line by line through the store's
//! buffered reader, so no partition is held in memory whole. Only the first
//! header seen is kept; later headers are dropped without comparing them to
//! it, so column drift between partitions passes through unnoticed. Blank
//! lines are neither written nor counted.

use crate::error::{HazardError, Result};
use crate::store::{ArtifactStore, ObjectReader};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

/// Summary of a consolidation run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsolidationStats {
    pub partitions: usize,
    pub data_rows: usize,
    pub header: Option<String>,
}

/// Stream `partitions` (in the given order) from the store into `out`.
///
/// Rows keep their order within each partition and partitions keep the order
/// given. Read failures are propagated without retry. `out` is flushed
/// before returning.
pub async fn consolidate<W: AsyncWrite + Unpin>(
    store: &dyn ArtifactStore,
    partitions: &[String],
    out: &mut W,
) -> Result<ConsolidationStats> {
    if partitions.is_empty() {
        return Err(HazardError::EmptyInput("no partitions to consolidate".to_string()));
    }

    let mut stats = ConsolidationStats::default();

    for key in partitions {
        debug!(key = %key, "Reading partition");
        let reader = store.open(key).await?;
        let rows = append_partition(reader, &mut stats, out).await?;
        stats.partitions += 1;
        debug!(key = %key, rows, "Partition consolidated");
    }

    out.flush().await?;

    info!(
        partitions = stats.partitions,
        rows = stats.data_rows,
        "Consolidated corpus"
    );
    Ok(stats)
}

/// Append one partition line by line; returns its data row count
async fn append_partition<W: AsyncWrite + Unpin>(
    reader: ObjectReader,
    stats: &mut ConsolidationStats,
    out: &mut W,
) -> Result<usize> {
    let mut lines = reader.lines();
    let mut rows = 0;
    let mut first_line = true;
    while let Some(line) = lines.next_line().await? {
        let line = line.strip_suffix('\r').unwrap_or(&line);
        if line.trim().is_empty() {
            continue;
        }
        if first_line {
            first_line = false;
            if stats.header.is_none() {
                out.write_all(line.as_bytes()).await?;
                out.write_all(b"\n").await?;
                stats.header = Some(line.to_string());
            }
            continue;
        }
        out.write_all(line.as_bytes()).await?;
        out.write_all(b"\n").await?;
        rows += 1;
    }
    stats.data_rows += rows;
    Ok(rows)
}
