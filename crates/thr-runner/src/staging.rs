use crate::absolutize;
use crate::partition::{PlotRow, PLOT_COLUMNS};
use anyhow::{anyhow, Result};
use chrono::Utc;
use std::fmt::Write as _;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub index: usize,
    pub path: PathBuf,
}

/// Removed by `release`, or by `Drop` if never released.
#[derive(Debug)]
pub struct StagingArea {
    dir: PathBuf,
    staged: Vec<StagedFile>,
    released: bool,
}

impl StagingArea {
    // Staged paths are always absolute.
    pub fn acquire(root: &Path) -> Result<Self> {
        let root = absolutize(root);
        fs::create_dir_all(&root)?;
        let dir = root.join(format!(
            "thr_stage_{}_{}",
            std::process::id(),
            Utc::now().timestamp_micros()
        ));
        match fs::create_dir(&dir) {
            Ok(()) => {
                debug!(dir = %dir.display(), "acquired staging area");
                Ok(Self {
                    dir,
                    staged: Vec::new(),
                    released: false,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(anyhow!(
                "staging_area_in_use: {} already exists",
                dir.display()
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn staged(&self) -> &[StagedFile] {
        &self.staged
    }

    pub fn stage(&mut self, rows: &[PlotRow]) -> Result<StagedFile> {
        let index = self.staged.len();
        let path = self.dir.join(format!("tmp{}", index));
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        file.write_all(format_plot_rows(rows).as_bytes())?;
        file.sync_all()?;
        debug!(index, rows = rows.len(), path = %path.display(), "staged partition");
        let staged = StagedFile { index, path };
        self.staged.push(staged.clone());
        Ok(staged)
    }

    pub fn release(mut self) -> Result<()> {
        self.released = true;
        fs::remove_dir_all(&self.dir)?;
        debug!(dir = %self.dir.display(), "released staging area");
        Ok(())
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = fs::remove_dir_all(&self.dir) {
                error!(dir = %self.dir.display(), error = %e, "failed to remove staging area");
            }
        }
    }
}

pub fn format_plot_rows(rows: &[PlotRow]) -> String {
    let mut out = format!("# {}\n", PLOT_COLUMNS.join(" "));
    for r in rows {
        let _ = writeln!(
            out,
            "{} {} {} {} {} {}",
            r.time_since_start,
            r.throughput,
            r.exp_rep,
            r.batch_size,
            r.num_sched_threads,
            r.num_exec_threads
        );
    }
    out
}
