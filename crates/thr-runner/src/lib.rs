pub mod config;
pub mod partition;
pub mod rate;
pub mod render;
pub mod staging;
pub mod table;

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub use config::{PlotSettings, RenderFailurePolicy, DEFAULT_RENDER_SPEC};
pub use partition::{split_by_coarse_key, Partition, PlotRow, PLOT_COLUMNS};
pub use rate::{count_groups, derive_rates, IntervalSample};
pub use render::{GnuplotRenderer, RenderOutcome, RenderRequest, Renderer, PATH_PARAM};
pub use staging::{format_plot_rows, StagedFile, StagingArea};
pub use table::{
    read_data_in, CoarseKey, ConfigKey, MeasurementRow, MeasurementTable, ReadError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionSummary {
    pub key: CoarseKey,
    pub rows: usize,
    pub undefined_throughput: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSummary {
    pub rows: usize,
    pub groups: usize,
    pub partitions: Vec<PartitionSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionReport {
    pub index: usize,
    pub key: CoarseKey,
    pub rows: usize,
    pub undefined_throughput: usize,
    pub exit_code: Option<i32>,
}

impl PartitionReport {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub rows: usize,
    pub groups: usize,
    pub partitions: Vec<PartitionReport>,
}

impl PipelineReport {
    fn new(summary: DataSummary, outcomes: &[RenderOutcome]) -> Self {
        let partitions = summary
            .partitions
            .into_iter()
            .zip(outcomes.iter())
            .enumerate()
            .map(|(index, (p, outcome))| PartitionReport {
                index,
                key: p.key,
                rows: p.rows,
                undefined_throughput: p.undefined_throughput,
                exit_code: outcome.exit_code,
            })
            .collect();
        Self {
            rows: summary.rows,
            groups: summary.groups,
            partitions,
        }
    }
}

pub(crate) fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn summarize(table: &MeasurementTable, partitions: &[Partition]) -> DataSummary {
    DataSummary {
        rows: table.len(),
        groups: count_groups(table),
        partitions: partitions
            .iter()
            .map(|p| PartitionSummary {
                key: p.key,
                rows: p.samples.len(),
                undefined_throughput: p.undefined_throughput(),
            })
            .collect(),
    }
}

pub fn describe_data_file(data_path: &Path) -> Result<DataSummary> {
    let table = read_data_in(data_path)?;
    let partitions = split_by_coarse_key(derive_rates(&table));
    Ok(summarize(&table, &partitions))
}

pub fn render_data_file(
    data_path: &Path,
    settings: &PlotSettings,
    renderer: &mut dyn Renderer,
) -> Result<PipelineReport> {
    let table = read_data_in(data_path)?;
    run_pipeline(&table, settings, renderer)
}

/// Derives rates, stages every partition, then renders them in index order.
///
/// The staging area is acquired once and removed after the last render,
/// whether or not staging or rendering failed. A cleanup failure is returned
/// only when the pipeline itself succeeded; otherwise it is logged.
pub fn run_pipeline(
    table: &MeasurementTable,
    settings: &PlotSettings,
    renderer: &mut dyn Renderer,
) -> Result<PipelineReport> {
    let partitions = split_by_coarse_key(derive_rates(table));
    let summary = summarize(table, &partitions);
    info!(
        rows = summary.rows,
        groups = summary.groups,
        partitions = partitions.len(),
        "derived interval throughput"
    );
    for p in summary.partitions.iter().filter(|p| p.undefined_throughput > 0) {
        warn!(
            partition = %p.key,
            rows = p.undefined_throughput,
            "zero-length intervals give undefined throughput"
        );
    }

    let mut area = StagingArea::acquire(&settings.staging_root())?;
    let rendered = stage_and_render(&mut area, &partitions, settings, renderer);
    let released = area.release();
    match (rendered, released) {
        (Ok(outcomes), Ok(())) => Ok(PipelineReport::new(summary, &outcomes)),
        (Ok(_), Err(e)) => Err(anyhow!("failed to remove staging area: {}", e)),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(cleanup)) => {
            error!(error = %cleanup, "failed to remove staging area after pipeline error");
            Err(e)
        }
    }
}

fn stage_and_render(
    area: &mut StagingArea,
    partitions: &[Partition],
    settings: &PlotSettings,
    renderer: &mut dyn Renderer,
) -> Result<Vec<RenderOutcome>> {
    let mut staged = Vec::with_capacity(partitions.len());
    for partition in partitions {
        staged.push(area.stage(&partition.plot_rows())?);
    }
    info!(files = staged.len(), dir = %area.dir().display(), "staged partitions");

    let mut outcomes = Vec::with_capacity(staged.len());
    let mut failed: Vec<(usize, anyhow::Error)> = Vec::new();
    for file in &staged {
        let request = RenderRequest::for_staged(settings.render_spec.clone(), file);
        match renderer.render(&request) {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => match settings.on_render_failure {
                RenderFailurePolicy::FailFast => {
                    return Err(anyhow!("render of partition {} failed: {}", file.index, e));
                }
                RenderFailurePolicy::Continue => {
                    error!(index = file.index, error = %e, "render failed, continuing");
                    outcomes.push(RenderOutcome { exit_code: None });
                    failed.push((file.index, e));
                }
            },
        }
    }

    if let Some((_, first)) = failed.first() {
        let indices: Vec<usize> = failed.iter().map(|(i, _)| *i).collect();
        return Err(anyhow!(
            "render failed for partitions {:?} of {}: {}",
            indices,
            staged.len(),
            first
        ));
    }
    info!(renders = outcomes.len(), "rendered partitions");
    Ok(outcomes)
}
