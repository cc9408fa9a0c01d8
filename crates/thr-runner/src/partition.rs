use crate::rate::IntervalSample;
use crate::table::{
    CoarseKey, COL_BATCH_SIZE, COL_EXEC_THREADS, COL_EXP_REP, COL_SCHED_THREADS,
    COL_TIME_SINCE_START,
};
use std::collections::BTreeMap;

pub const COL_THROUGHPUT: &str = "throughput";

/// Column order of every staged plot file. Render scripts address columns by position.
pub const PLOT_COLUMNS: [&str; 6] = [
    COL_TIME_SINCE_START,
    COL_THROUGHPUT,
    COL_EXP_REP,
    COL_BATCH_SIZE,
    COL_SCHED_THREADS,
    COL_EXEC_THREADS,
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlotRow {
    pub time_since_start: f64,
    pub throughput: f64,
    pub exp_rep: u32,
    pub batch_size: u32,
    pub num_sched_threads: u32,
    pub num_exec_threads: u32,
}

impl From<&IntervalSample> for PlotRow {
    fn from(sample: &IntervalSample) -> Self {
        Self {
            time_since_start: sample.time_since_start,
            throughput: sample.throughput,
            exp_rep: sample.key.exp_rep,
            batch_size: sample.key.batch_size,
            num_sched_threads: sample.key.num_sched_threads,
            num_exec_threads: sample.key.num_exec_threads,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub key: CoarseKey,
    pub samples: Vec<IntervalSample>,
}

impl Partition {
    pub fn plot_rows(&self) -> Vec<PlotRow> {
        self.samples.iter().map(PlotRow::from).collect()
    }

    pub fn undefined_throughput(&self) -> usize {
        self.samples
            .iter()
            .filter(|s| !s.has_defined_throughput())
            .count()
    }
}

// Partitions come out in first-appearance order of their key.
pub fn split_by_coarse_key(samples: Vec<IntervalSample>) -> Vec<Partition> {
    let mut slots: BTreeMap<CoarseKey, usize> = BTreeMap::new();
    let mut partitions: Vec<Partition> = Vec::new();
    for sample in samples {
        let key = sample.key.coarse();
        let slot = *slots.entry(key).or_insert_with(|| {
            partitions.push(Partition {
                key,
                samples: Vec::new(),
            });
            partitions.len() - 1
        });
        partitions[slot].samples.push(sample);
    }
    partitions
}
