use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

pub const COL_SCHED_THREADS: &str = "num_sched_threads";
pub const COL_EXEC_THREADS: &str = "num_exec_threads";
pub const COL_BATCH_SIZE: &str = "batch_size";
pub const COL_EXP_REP: &str = "exp_rep";
pub const COL_TIME_SINCE_START: &str = "time_since_start";
pub const COL_TXN_COMPLETED: &str = "txn_completed";

const REQUIRED_COLUMNS: [&str; 6] = [
    COL_SCHED_THREADS,
    COL_EXEC_THREADS,
    COL_BATCH_SIZE,
    COL_EXP_REP,
    COL_TIME_SINCE_START,
    COL_TXN_COMPLETED,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConfigKey {
    pub num_sched_threads: u32,
    pub num_exec_threads: u32,
    pub batch_size: u32,
    pub exp_rep: u32,
}

impl ConfigKey {
    pub fn coarse(&self) -> CoarseKey {
        CoarseKey {
            num_sched_threads: self.num_sched_threads,
            num_exec_threads: self.num_exec_threads,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoarseKey {
    pub num_sched_threads: u32,
    pub num_exec_threads: u32,
}

impl std::fmt::Display for CoarseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "sched={} exec={}",
            self.num_sched_threads, self.num_exec_threads
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasurementRow {
    pub key: ConfigKey,
    pub time_since_start: f64,
    pub txn_completed: f64,
}

/// Snapshots in file order. Never re-sorted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementTable {
    pub rows: Vec<MeasurementRow>,
}

impl MeasurementTable {
    pub fn new(rows: Vec<MeasurementRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("failed to read data file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("data file has no header line")]
    Empty,
    #[error("data file is missing required column '{0}'")]
    MissingColumn(&'static str),
    #[error("line {line}: expected {expected} fields, found {found}")]
    ColumnCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: invalid value '{value}' in column '{column}'")]
    InvalidValue {
        line: usize,
        column: &'static str,
        value: String,
    },
}

pub fn read_data_in(path: &Path) -> Result<MeasurementTable, ReadError> {
    let text = fs::read_to_string(path).map_err(|source| ReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let table = parse_table(&text)?;
    debug!(path = %path.display(), rows = table.len(), "read measurement table");
    Ok(table)
}

pub fn parse_table(text: &str) -> Result<MeasurementTable, ReadError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    let header = loop {
        match lines.next() {
            None => return Err(ReadError::Empty),
            Some((_, line)) => {
                let stripped = line.trim_start_matches('#').trim();
                // A commented line is the header only if it names every required column.
                if line.starts_with('#') && !names_all_required_columns(stripped) {
                    continue;
                }
                break stripped;
            }
        }
    };

    let columns: Vec<&str> = header.split_whitespace().collect();
    let mut index: BTreeMap<&'static str, usize> = BTreeMap::new();
    for name in REQUIRED_COLUMNS {
        let pos = columns
            .iter()
            .position(|c| *c == name)
            .ok_or(ReadError::MissingColumn(name))?;
        index.insert(name, pos);
    }
    for extra in columns.iter().filter(|c| !REQUIRED_COLUMNS.contains(*c)) {
        debug!(column = %extra, "dropping passthrough column");
    }

    let mut rows = Vec::new();
    for (line_no, line) in lines {
        if line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != columns.len() {
            return Err(ReadError::ColumnCount {
                line: line_no,
                expected: columns.len(),
                found: fields.len(),
            });
        }
        let field = |name: &'static str| fields[index[name]];
        let key = ConfigKey {
            num_sched_threads: parse_key(line_no, COL_SCHED_THREADS, field(COL_SCHED_THREADS))?,
            num_exec_threads: parse_key(line_no, COL_EXEC_THREADS, field(COL_EXEC_THREADS))?,
            batch_size: parse_key(line_no, COL_BATCH_SIZE, field(COL_BATCH_SIZE))?,
            exp_rep: parse_key(line_no, COL_EXP_REP, field(COL_EXP_REP))?,
        };
        rows.push(MeasurementRow {
            key,
            time_since_start: parse_measure(
                line_no,
                COL_TIME_SINCE_START,
                field(COL_TIME_SINCE_START),
            )?,
            txn_completed: parse_measure(line_no, COL_TXN_COMPLETED, field(COL_TXN_COMPLETED))?,
        });
    }
    Ok(MeasurementTable::new(rows))
}

fn names_all_required_columns(line: &str) -> bool {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    REQUIRED_COLUMNS.iter().all(|c| tokens.contains(c))
}

fn invalid(line: usize, column: &'static str, raw: &str) -> ReadError {
    ReadError::InvalidValue {
        line,
        column,
        value: raw.to_string(),
    }
}

// Integral floats such as "4.0" are accepted for key columns.
fn parse_key(line: usize, column: &'static str, raw: &str) -> Result<u32, ReadError> {
    if let Ok(v) = raw.parse::<u32>() {
        return Ok(v);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v >= 0.0 && v <= u32::MAX as f64 => Ok(v as u32),
        _ => Err(invalid(line, column, raw)),
    }
}

fn parse_measure(line: usize, column: &'static str, raw: &str) -> Result<f64, ReadError> {
    raw.parse::<f64>().map_err(|_| invalid(line, column, raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "num_sched_threads num_exec_threads batch_size exp_rep time_since_start txn_completed";

    #[test]
    fn parse_table_reads_rows_in_file_order() {
        let text = format!("{}\n1 2 10 0 1.0 100\n1 2 10 0 2.5 250\n4 8 10 1 0.5 7\n", HEADER);
        let table = parse_table(&text).expect("parse");
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows[0].key.num_exec_threads, 2);
        assert_eq!(table.rows[1].time_since_start, 2.5);
        assert_eq!(table.rows[2].key.exp_rep, 1);
        assert_eq!(table.rows[2].txn_completed, 7.0);
    }

    #[test]
    fn parse_table_accepts_reordered_and_extra_columns() {
        let text = "txn_completed extra time_since_start exp_rep batch_size num_exec_threads num_sched_threads\n\
                    42 zz 3.0 2 16 4 1\n";
        let table = parse_table(text).expect("parse");
        let row = table.rows[0];
        assert_eq!(row.txn_completed, 42.0);
        assert_eq!(row.time_since_start, 3.0);
        assert_eq!(
            row.key,
            ConfigKey {
                num_sched_threads: 1,
                num_exec_threads: 4,
                batch_size: 16,
                exp_rep: 2
            }
        );
    }

    #[test]
    fn parse_table_tolerates_comments_and_commented_header() {
        let text = format!("# produced by bench\n# {}\n\n1 1 10 0 1.0 100\n# trailer\n", HEADER);
        let table = parse_table(&text).expect("parse");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn comment_mentioning_one_column_is_not_taken_as_header() {
        let text = format!("# sweep num_sched_threads 1..8\n# exp_rep 0..3\n{}\n1 1 10 0 1.0 100\n", HEADER);
        let table = parse_table(&text).expect("parse");
        assert_eq!(table.len(), 1);
        assert_eq!(table.rows[0].txn_completed, 100.0);
    }

    #[test]
    fn parse_table_coerces_integral_float_keys() {
        let text = format!("{}\n2.0 4.0 10.0 0.0 1.0 5\n", HEADER);
        let table = parse_table(&text).expect("parse");
        assert_eq!(table.rows[0].key.num_sched_threads, 2);
        assert_eq!(table.rows[0].key.batch_size, 10);
    }

    #[test]
    fn parse_table_reports_missing_column() {
        let text = "num_sched_threads num_exec_threads batch_size exp_rep time_since_start\n1 1 1 0 1.0\n";
        let err = parse_table(text).expect_err("missing column must fail");
        assert!(matches!(err, ReadError::MissingColumn(COL_TXN_COMPLETED)));
    }

    #[test]
    fn parse_table_reports_bad_values_with_line_numbers() {
        let text = format!("{}\n1 1 10 0 1.0 100\n1 1 ten 0 2.0 200\n", HEADER);
        let err = parse_table(&text).expect_err("bad batch size must fail");
        match err {
            ReadError::InvalidValue {
                line,
                column,
                value,
            } => {
                assert_eq!(line, 3);
                assert_eq!(column, COL_BATCH_SIZE);
                assert_eq!(value, "ten");
            }
            other => panic!("unexpected error: {}", other),
        }

        let text = format!("{}\n1 1 10 0 1.0\n", HEADER);
        let err = parse_table(&text).expect_err("short row must fail");
        assert!(matches!(
            err,
            ReadError::ColumnCount {
                line: 2,
                expected: 6,
                found: 5
            }
        ));
    }

    #[test]
    fn parse_table_rejects_fractional_keys_and_empty_input() {
        let text = format!("{}\n1.5 1 10 0 1.0 100\n", HEADER);
        assert!(parse_table(&text).is_err());
        assert!(matches!(parse_table("\n  \n"), Err(ReadError::Empty)));
    }

    #[test]
    fn read_data_in_reports_missing_file() {
        let err = read_data_in(Path::new("/nonexistent/thr/data.txt"))
            .expect_err("missing file must fail");
        assert!(err.to_string().contains("/nonexistent/thr/data.txt"));
    }
}
