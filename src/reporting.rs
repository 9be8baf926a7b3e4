// Result aggregation and output for UltiBust
// Fixed column schema, CSV or JSON-lines rows, one serialized writer per run

use chrono::Local;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use crate::config::{OutputFormat, RunContext};
use crate::error::SinkError;
use crate::models::ProbeResult;

pub const BASE_COLUMNS: [&str; 6] = [
    "host",
    "path",
    "method",
    "resp_status_code",
    "resp_content_length",
    "total_seconds",
];

/// Column layout resolved once before the first row is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSchema {
    pub content_hash: bool,
    pub fuzz_columns: bool,
    pub record_headers: Vec<String>,
}

impl OutputSchema {
    pub fn new(context: &RunContext, fuzzing: bool) -> Self {
        Self {
            content_hash: context.content_hash,
            fuzz_columns: fuzzing,
            record_headers: context.record_headers.clone(),
        }
    }

    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
        if self.content_hash {
            columns.push("content_hash".to_string());
        }
        if self.fuzz_columns {
            columns.push("fuzz_header".to_string());
            columns.push("fuzz_value".to_string());
        }
        columns.extend(self.record_headers.iter().map(|name| format!("rh_{}", name)));
        columns
    }

    /// Cell values in column order. `None` means an absent value.
    fn values(&self, result: &ProbeResult) -> Vec<(String, Value)> {
        let columns = self.columns();
        let mut values = vec![
            Value::from(result.host.clone()),
            Value::from(result.path.clone()),
            Value::from(result.method.as_str()),
            Value::from(result.status_code),
            Value::from(result.content_length),
            Value::from(result.elapsed_seconds),
        ];
        if self.content_hash {
            values.push(result.content_hash.clone().map_or(Value::Null, Value::from));
        }
        if self.fuzz_columns {
            values.push(result.fuzzed_header.clone().map_or(Value::Null, Value::from));
            values.push(result.fuzzed_value.clone().map_or(Value::Null, Value::from));
        }
        for name in &self.record_headers {
            let value = result.recorded_response_headers.get(name).cloned().flatten();
            values.push(value.map_or(Value::Null, Value::from));
        }
        columns.into_iter().zip(values).collect()
    }
}

/// Escape CSV text to prevent formula injection.
/// Cells starting with =, +, -, @, or tab are prefixed with a single quote.
fn defuse_formula(field: &str) -> Cow<'_, str> {
    match field.chars().next() {
        Some('=' | '+' | '-' | '@' | '\t') => Cow::Owned(format!("'{}", field)),
        _ => Cow::Borrowed(field),
    }
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => defuse_formula(s).into_owned(),
        Value::Number(n) => match n.as_f64() {
            Some(secs) if n.is_f64() => format!("{:.6}", secs),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

enum SinkWriter {
    Csv(csv::Writer<Box<dyn Write + Send>>),
    JsonLines(Box<dyn Write + Send>),
}

struct SinkState {
    completed: u64,
    writer: SinkWriter,
}

/// Fan-in point for terminal results. Counter and row are updated under one lock,
/// so counter values are unique, increasing, and rows never interleave.
pub struct ResultAggregator {
    schema: OutputSchema,
    total: usize,
    state: Mutex<SinkState>,
}

impl ResultAggregator {
    /// Wraps `sink`; for CSV the header row is written immediately.
    pub fn new(
        sink: Box<dyn Write + Send>,
        schema: OutputSchema,
        format: OutputFormat,
        total: usize,
    ) -> Result<Self, SinkError> {
        let writer = match format {
            OutputFormat::Csv => {
                let mut writer = csv::Writer::from_writer(sink);
                writer.write_record(schema.columns())?;
                writer.flush()?;
                SinkWriter::Csv(writer)
            }
            OutputFormat::JsonLines => SinkWriter::JsonLines(sink),
        };
        Ok(Self {
            schema,
            total,
            state: Mutex::new(SinkState { completed: 0, writer }),
        })
    }

    pub fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    pub fn completed(&self) -> u64 {
        self.state.lock().map(|s| s.completed).unwrap_or_default()
    }

    /// Append one row and return the new completion count.
    pub fn record(&self, result: &ProbeResult) -> Result<u64, SinkError> {
        let cells = self.schema.values(result);
        let mut state = self.state.lock().map_err(|_| SinkError::Poisoned)?;

        match &mut state.writer {
            SinkWriter::Csv(writer) => {
                writer.write_record(cells.iter().map(|(_, v)| csv_cell(v)))?;
                writer.flush()?;
            }
            SinkWriter::JsonLines(writer) => {
                let mut object: Map<String, Value> = cells.into_iter().collect();
                object.insert("attempts".to_string(), Value::from(result.attempts));
                serde_json::to_writer(&mut *writer, &Value::Object(object))?;
                writer.write_all(b"\n")?;
                writer.flush()?;
            }
        }

        state.completed += 1;
        let completed = state.completed;
        drop(state);

        if result.retries_exhausted {
            info!(
                "[{}/{}] {} {} hit max retries, {}, stopping",
                completed,
                self.total,
                result.url,
                result.method,
                result.attempts.saturating_sub(1)
            );
        } else {
            info!(
                "[{}/{}] {} {} {} {}",
                completed, self.total, result.url, result.method, result.status_code, result.content_length
            );
        }
        Ok(completed)
    }

    pub fn finish(&self) -> Result<u64, SinkError> {
        let mut state = self.state.lock().map_err(|_| SinkError::Poisoned)?;
        match &mut state.writer {
            SinkWriter::Csv(writer) => writer.flush()?,
            SinkWriter::JsonLines(writer) => writer.flush()?,
        }
        Ok(state.completed)
    }
}

/// Timestamped default name such as `ultibust_output_20250101_120000.csv`.
pub fn default_output_filename(format: OutputFormat) -> String {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let extension = match format {
        OutputFormat::Csv => "csv",
        OutputFormat::JsonLines => "jsonl",
    };
    format!("ultibust_output_{}.{}", timestamp, extension)
}

/// Create (truncate) the output file.
pub fn open_sink(path: &Path) -> Result<Box<dyn Write + Send>, SinkError> {
    let file = File::create(path)?;
    Ok(Box::new(BufWriter::new(file)))
}
