//! Append-only CSV sample log
//!
//! The log is the only channel between the sampler and the dashboard. The sampler
//! is the single writer; readers take a best-effort snapshot of whatever is on disk,
//! ignoring a trailing line that is still being written.

use crate::constants::*;
use crate::error::{LogError, LogParseError};
use crate::sample::Sample;
use chrono::NaiveDateTime;
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Everything a reader could make sense of in the log
#[derive(Debug, Default, Clone)]
pub struct LogContents {
    /// Parsed rows in file order
    pub samples: Vec<Sample>,

    /// Rows that could not be parsed and were skipped
    pub skipped: Vec<LogParseError>,

    /// Whether the header carries a Packet Loss column
    pub has_packet_loss: bool,
}

impl LogContents {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.last()
    }
}

pub struct SampleLog {
    path: PathBuf,
}

impl SampleLog {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one sample, writing the header first if the log is missing or empty.
    ///
    /// An existing log keeps its column layout: a sample with packet loss written to
    /// a log without that column drops the value, and vice versa leaves the cell empty.
    pub fn append(&self, sample: &Sample) -> Result<(), LogError> {
        let existing_header = self.read_header()?;
        let with_packet_loss = match &existing_header {
            Some(header) => header.iter().any(|c| c.trim() == COL_PACKET_LOSS),
            None => sample.packet_loss_pct.is_some(),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&self.path)?;

        // A previous writer died mid-row; start on a fresh line so only that row is lost
        if existing_header.is_some() && !ends_with_newline(&mut file)? {
            warn!("Log {:?} ends with a partial row, starting a new line", self.path);
            file.write_all(b"\n")?;
        }

        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

        if existing_header.is_none() {
            debug!("Writing log header to {:?}", self.path);
            writer.write_record(header_fields(with_packet_loss))?;
        }

        let mut record = vec![
            sample.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            sample.download_mbps.to_string(),
            sample.upload_mbps.to_string(),
            sample.ping_ms.to_string(),
            sample.jitter_ms.to_string(),
        ];
        if with_packet_loss {
            record.push(sample.packet_loss_pct.map(|v| v.to_string()).unwrap_or_default());
        }

        writer.write_record(&record)?;
        writer.flush()?;

        Ok(())
    }

    /// Read every complete row currently in the log.
    ///
    /// A missing file is an empty log. Malformed rows are skipped and reported in
    /// [`LogContents::skipped`].
    pub fn read(&self) -> Result<LogContents, LogError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LogContents::default()),
            Err(e) => return Err(e.into()),
        };

        parse_log(&bytes)
    }

    /// First line of the log, or None if the file is missing or empty
    fn read_header(&self) -> Result<Option<Vec<String>>, LogError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut first_line = String::new();
        BufReader::new(file).read_line(&mut first_line)?;

        if first_line.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(
            first_line
                .trim_end_matches(['\r', '\n'])
                .split(',')
                .map(|c| c.trim().to_string())
                .collect(),
        ))
    }
}

fn header_fields(with_packet_loss: bool) -> Vec<&'static str> {
    let mut fields = vec![COL_TIMESTAMP, COL_DOWNLOAD, COL_UPLOAD, COL_PING, COL_JITTER];
    if with_packet_loss {
        fields.push(COL_PACKET_LOSS);
    }
    fields
}

fn ends_with_newline(file: &mut File) -> Result<bool, LogError> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(true);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::Start(len - 1))?;
    file.read_exact(&mut last)?;
    file.seek(SeekFrom::End(0))?;

    Ok(last[0] == b'\n')
}

struct Columns {
    timestamp: usize,
    download: usize,
    upload: usize,
    ping: Option<usize>,
    jitter: Option<usize>,
    packet_loss: Option<usize>,
}

impl Columns {
    fn from_header(header: &StringRecord) -> Result<Self, LogError> {
        let find = |name: &str| header.iter().position(|c| c.trim() == name);

        Ok(Self {
            timestamp: find(COL_TIMESTAMP).ok_or(LogError::MissingColumn(COL_TIMESTAMP))?,
            download: find(COL_DOWNLOAD).ok_or(LogError::MissingColumn(COL_DOWNLOAD))?,
            upload: find(COL_UPLOAD).ok_or(LogError::MissingColumn(COL_UPLOAD))?,
            ping: find(COL_PING),
            jitter: find(COL_JITTER),
            packet_loss: find(COL_PACKET_LOSS),
        })
    }
}

fn parse_log(bytes: &[u8]) -> Result<LogContents, LogError> {
    // Only complete lines count; the writer may be mid-row
    let complete = match bytes.iter().rposition(|&b| b == b'\n') {
        Some(idx) => &bytes[..=idx],
        None => return Ok(LogContents::default()),
    };

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(complete);

    let columns = Columns::from_header(reader.headers()?)?;
    let mut contents = LogContents {
        has_packet_loss: columns.packet_loss.is_some(),
        ..Default::default()
    };

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                contents.skipped.push(LogParseError {
                    line,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }

        match parse_row(&record, &columns) {
            Ok(sample) => contents.samples.push(sample),
            Err(reason) => contents.skipped.push(LogParseError { line, reason }),
        }
    }

    if !contents.skipped.is_empty() {
        debug!("Skipped {} malformed log rows", contents.skipped.len());
    }

    Ok(contents)
}

fn parse_row(record: &StringRecord, columns: &Columns) -> Result<Sample, String> {
    let timestamp_str = record
        .get(columns.timestamp)
        .ok_or_else(|| format!("missing {}", COL_TIMESTAMP))?;
    let timestamp = parse_timestamp(timestamp_str)
        .ok_or_else(|| format!("invalid timestamp {:?}", timestamp_str))?;

    let download_mbps = required_rate(record, columns.download, COL_DOWNLOAD)?;
    let upload_mbps = required_rate(record, columns.upload, COL_UPLOAD)?;

    // Missing latency cells read as NaN and are skipped by the statistics
    let ping_ms = optional_value(record, columns.ping, COL_PING)?.unwrap_or(f64::NAN);
    let jitter_ms = optional_value(record, columns.jitter, COL_JITTER)?.unwrap_or(f64::NAN);
    let packet_loss_pct = optional_value(record, columns.packet_loss, COL_PACKET_LOSS)?;

    Ok(Sample {
        timestamp,
        download_mbps,
        upload_mbps,
        ping_ms,
        jitter_ms,
        packet_loss_pct,
    })
}

fn required_rate(record: &StringRecord, idx: usize, name: &str) -> Result<f64, String> {
    let raw = record.get(idx).unwrap_or("");
    if raw.is_empty() {
        return Err(format!("missing {}", name));
    }
    parse_non_negative(raw, name)
}

fn optional_value(
    record: &StringRecord,
    idx: Option<usize>,
    name: &str,
) -> Result<Option<f64>, String> {
    match idx.and_then(|i| record.get(i)) {
        None | Some("") => Ok(None),
        Some(raw) => parse_non_negative(raw, name).map(Some),
    }
}

fn parse_non_negative(raw: &str, name: &str) -> Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("invalid {} value {:?}", name, raw))?;

    if !value.is_finite() || value < 0.0 {
        return Err(format!("{} must be a non-negative number, got {}", name, raw));
    }

    Ok(value)
}

/// Parse a log timestamp; fractional seconds are accepted and kept
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}
