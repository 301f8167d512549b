//! Cumulative comparison report: one CSV row per scenario invocation, never rewritten
//! except to append.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use log::info;
use tokio::sync::Mutex;

use crate::cost::Comparison;
use crate::error::{InputDataError, ScenarioError};

pub const REPORT_COLUMNS: [&str; 4] = ["Test", "Cost_A", "Cost_B", "Difference"];

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub test: String,
    pub cost_a: f64,
    pub cost_b: f64,
    pub difference: f64,
}

impl ComparisonRow {
    pub fn new(test: impl Into<String>, comparison: Comparison) -> Self {
        Self {
            test: test.into(),
            cost_a: comparison.cost_a,
            cost_b: comparison.cost_b,
            difference: comparison.difference,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    rows: Vec<ComparisonRow>,
}

impl Report {
    pub fn rows(&self) -> &[ComparisonRow] {
        &self.rows
    }

    pub fn push(&mut self, row: ComparisonRow) {
        self.rows.push(row);
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self, InputDataError> {
        let malformed = |line: usize, reason: String| InputDataError::MalformedReport {
            path: path.to_path_buf(),
            line,
            reason,
        };

        let mut records = split_records(text).into_iter();

        let Some((number, header)) = records.next() else {
            return Ok(Self::default());
        };
        if header != REPORT_COLUMNS {
            return Err(malformed(number, format!("unexpected header `{}`", header.join(","))));
        }

        let mut rows = Vec::new();
        for (number, fields) in records {
            let [test, cost_a, cost_b, difference] = fields.as_slice() else {
                return Err(malformed(number, format!("expected 4 fields, found {}", fields.len())));
            };
            let number_field = |field: &str| {
                field
                    .trim()
                    .parse::<f64>()
                    .map_err(|e| malformed(number, format!("`{field}` is not a number: {e}")))
            };
            rows.push(ComparisonRow {
                test: test.clone(),
                cost_a: number_field(cost_a.as_str())?,
                cost_b: number_field(cost_b.as_str())?,
                difference: number_field(difference.as_str())?,
            });
        }

        Ok(Self { rows })
    }

    pub fn to_csv(&self) -> String {
        let mut out = REPORT_COLUMNS.join(",");
        out.push('\n');
        for row in &self.rows {
            let _ = writeln!(
                out,
                "{},{},{},{}",
                quote(&row.test),
                row.cost_a,
                row.cost_b,
                row.difference
            );
        }
        out
    }
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Splits CSV text into records, each tagged with the line it starts on. Quoted fields
/// may span lines; blank lines are skipped.
fn split_records(text: &str) -> Vec<(usize, Vec<String>)> {
    let mut records = Vec::new();
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut line = 1;
    let mut start = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut current)),
            '\r' if !quoted => {}
            '\n' if !quoted => {
                fields.push(std::mem::take(&mut current));
                push_record(&mut records, start, std::mem::take(&mut fields));
                line += 1;
                start = line;
            }
            '\n' => {
                current.push(c);
                line += 1;
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() || !fields.is_empty() {
        fields.push(current);
        push_record(&mut records, start, fields);
    }
    records
}

fn push_record(records: &mut Vec<(usize, Vec<String>)>, line: usize, fields: Vec<String>) {
    let blank = matches!(fields.as_slice(), [only] if only.trim().is_empty());
    if !blank {
        records.push((line, fields));
    }
}

/// Sole writer of the report file. Appends from concurrent scenarios are serialized.
#[derive(Debug)]
pub struct ReportWriter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ReportWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current rows; an absent file is an empty report.
    pub async fn load(&self) -> Result<Report, InputDataError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Report::parse(&text, &self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Report::default()),
            Err(source) => Err(InputDataError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Loads the report, appends `row` and writes the whole file back.
    /// Returns the number of rows now in the report.
    pub async fn append(&self, row: ComparisonRow) -> Result<usize, ScenarioError> {
        let _guard = self.lock.lock().await;

        let mut report = self.load().await?;
        report.push(row);

        let report_error = |source| ScenarioError::Report {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(report_error)?;
        }
        tokio::fs::write(&self.path, report.to_csv())
            .await
            .map_err(report_error)?;

        info!("Report {} now holds {} rows", self.path.display(), report.rows().len());
        Ok(report.rows().len())
    }
}
