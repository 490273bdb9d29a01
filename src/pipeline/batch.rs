//! Batch planning for large rosters.
//!
//! The batch count is the primary quantity and grows monotonically with the
//! roster, so adding students can never produce fewer, larger cleanup
//! windows. Sizes stay between 10 and 50 once batching kicks in.

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPlan {
    pub batch_count: usize,
    pub batch_size: usize,
}

impl BatchPlan {
    /// Size-tiered plan: small rosters run as one batch, larger ones split
    /// into progressively more batches.
    pub fn dynamic(total: usize) -> Self {
        if total == 0 {
            return Self {
                batch_count: 0,
                batch_size: 0,
            };
        }
        if total <= 20 {
            return Self {
                batch_count: 1,
                batch_size: total,
            };
        }
        let batch_count = match total {
            21..=50 => (total / 10).clamp(2, 5),
            51..=100 => (total / 12).clamp(5, 8),
            101..=200 => (total / 15).clamp(8, 13),
            201..=500 => (total / 25).clamp(13, 20),
            _ => (total.div_ceil(50)).max(20),
        };
        Self {
            batch_count,
            batch_size: total.div_ceil(batch_count),
        }
    }

    /// Fixed-width plan for callers that want explicit control.
    pub fn fixed(total: usize, width: usize) -> Self {
        if total == 0 || width == 0 {
            return Self {
                batch_count: if total == 0 { 0 } else { 1 },
                batch_size: total,
            };
        }
        Self {
            batch_count: total.div_ceil(width),
            batch_size: width,
        }
    }

    /// Index ranges covering `0..total` in order, each at most `batch_size`
    /// wide.
    pub fn ranges(&self, total: usize) -> Vec<Range<usize>> {
        if self.batch_size == 0 {
            return Vec::new();
        }
        (0..total)
            .step_by(self.batch_size)
            .map(|start| start..(start + self.batch_size).min(total))
            .collect()
    }
}
