use crate::traits::VectorIndex;
use crate::VectorRecord;
use tracing::{error, info};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub batches: usize,
    pub indexed: usize,
    pub failed_batches: usize,
}

/// Upserts sequentially in fixed-size batches. A failed batch is logged and
/// counted; later batches still run and nothing already written is undone.
pub async fn upsert_in_batches(
    index: &dyn VectorIndex,
    records: &[VectorRecord],
    batch_size: usize,
) -> BatchReport {
    let mut report = BatchReport::default();

    for (number, batch) in records.chunks(batch_size.max(1)).enumerate() {
        report.batches += 1;
        match index.upsert(batch).await {
            Ok(()) => {
                report.indexed += batch.len();
                info!(
                    backend = index.backend_name(),
                    batch = number + 1,
                    size = batch.len(),
                    "batch upserted"
                );
            }
            Err(err) => {
                report.failed_batches += 1;
                error!(
                    backend = index.backend_name(),
                    batch = number + 1,
                    size = batch.len(),
                    error = %err,
                    "batch upsert failed"
                );
            }
        }
    }

    report
}
