use crate::table::{ConfigKey, MeasurementTable};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalSample {
    pub key: ConfigKey,
    pub time_since_start: f64,
    pub txn_completed: f64,
    pub interval_time: f64,
    pub interval_txns: f64,
    pub throughput: f64,
}

impl IntervalSample {
    pub fn has_defined_throughput(&self) -> bool {
        self.throughput.is_finite()
    }
}

/// Converts cumulative counters into one interval sample per row.
///
/// Rows are grouped by their full configuration key without reordering. The
/// first row of a group is differenced against an implicit zero snapshot, so
/// its interval equals its own elapsed time and completed count.
pub fn derive_rates(table: &MeasurementTable) -> Vec<IntervalSample> {
    let mut previous: HashMap<ConfigKey, (f64, f64)> = HashMap::new();
    let mut samples = Vec::with_capacity(table.len());
    for row in &table.rows {
        let (prev_time, prev_txns) = previous.get(&row.key).copied().unwrap_or((0.0, 0.0));
        let interval_time = row.time_since_start - prev_time;
        let interval_txns = row.txn_completed - prev_txns;
        previous.insert(row.key, (row.time_since_start, row.txn_completed));
        samples.push(IntervalSample {
            key: row.key,
            time_since_start: row.time_since_start,
            txn_completed: row.txn_completed,
            interval_time,
            interval_txns,
            throughput: interval_txns / interval_time,
        });
    }
    samples
}

pub fn count_groups(table: &MeasurementTable) -> usize {
    table
        .rows
        .iter()
        .map(|r| r.key)
        .collect::<std::collections::HashSet<_>>()
        .len()
}
