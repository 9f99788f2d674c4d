//! Tab-separated marker tables.
//!
//! One header line naming the columns, then one row per marker. Lines
//! starting with `#` carry the optional per-list summary and are skipped on
//! reading. Missing parent/child links are written as `-1`. Reading goes
//! through a flexible `csv` reader, so rows may stop early.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;

use csv::StringRecord;
use voxel5d_core::VolumeSet;
use voxel5d_tracking::{
    channel_calibrations, grow_volumes_for, summarize, ImportReport, MarkerLists, MarkerRow,
    TraceSummary, COLUMNS, DEFAULT_MARKER_COLOR,
};

use crate::{Error, Result};

/// Column names of the summary block.
pub const SUMMARY_COLUMNS: [&str; 10] = [
    "ListNr",
    "ListName",
    "Markers",
    "Segments",
    "PathLength",
    "NetDistance",
    "Duration",
    "EndpointSpeed",
    "AverageSpeed",
    "Directionality",
];

/// Writer for marker tables.
pub struct MarkerTableWriter<W: Write> {
    writer: W,
}

impl MarkerTableWriter<BufWriter<File>> {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> MarkerTableWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes the header and one line per row.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_rows(&mut self, rows: &[MarkerRow]) -> Result<()> {
        writeln!(self.writer, "{}", COLUMNS.join("\t"))?;
        for r in rows {
            writeln!(
                self.writer,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                r.list,
                r.marker,
                r.coords[0],
                r.coords[1],
                r.coords[2],
                r.coords[3],
                r.coords[4],
                r.integral,
                r.max,
                r.world[0],
                r.world[1],
                r.world[2],
                r.world[3],
                r.world[4],
                r.integral_calibrated,
                r.max_calibrated,
                u8::from(r.tagged),
                link(r.parent),
                link(r.children[0]),
                link(r.children[1]),
                r.color,
                r.name
            )?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Appends the per-list summary block, every line prefixed with `#`.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_summary(&mut self, summaries: &[TraceSummary]) -> Result<()> {
        writeln!(self.writer, "# {}", SUMMARY_COLUMNS.join("\t"))?;
        for s in summaries {
            writeln!(
                self.writer,
                "# {}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                s.list,
                s.name,
                s.markers,
                s.segments,
                s.path_length,
                s.net_distance,
                s.duration,
                s.endpoint_speed,
                s.average_speed,
                s.directionality
            )?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn link(index: Option<usize>) -> i64 {
    index.map_or(-1, |i| i64::try_from(i).unwrap_or(i64::MAX))
}

/// Reader for marker tables.
pub struct MarkerTableReader;

impl MarkerTableReader {
    /// Reads every marker row of a file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or a row is malformed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Vec<MarkerRow>> {
        let file = File::open(path)?;
        Self::read(file)
    }

    /// Reads every marker row from `reader`.
    ///
    /// Blank lines, `#` lines and the header are skipped. Rows need at least
    /// the list and marker index; missing trailing columns take defaults.
    ///
    /// # Errors
    /// Returns an error if reading fails or a row is malformed.
    pub fn read<R: Read>(reader: R) -> Result<Vec<MarkerRow>> {
        let mut table = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .comment(Some(b'#'))
            .from_reader(reader);
        let mut rows = Vec::new();
        for record in table.records() {
            let record = record?;
            if record.iter().all(|f| f.trim().is_empty()) || record.get(0) == Some(COLUMNS[0]) {
                continue;
            }
            let line = record.position().map_or(0, csv::Position::line);
            rows.push(parse_row(&record, line)?);
        }
        log::debug!("read {} marker row(s)", rows.len());
        Ok(rows)
    }
}

fn field<T: FromStr>(record: &StringRecord, column: usize, line: u64) -> Result<Option<T>> {
    match record.get(column).map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => text.parse().map(Some).map_err(|_| {
            Error::InvalidFormat(format!(
                "line {line}: cannot parse {} from {text:?}",
                COLUMNS[column]
            ))
        }),
    }
}

fn link_field(record: &StringRecord, column: usize, line: u64) -> Result<Option<usize>> {
    Ok(field::<i64>(record, column, line)?.and_then(|v| usize::try_from(v).ok()))
}

fn parse_row(record: &StringRecord, line: u64) -> Result<MarkerRow> {
    let (Some(list), Some(marker)) = (field(record, 0, line)?, field(record, 1, line)?) else {
        return Err(Error::InvalidFormat(format!(
            "line {line}: a marker row needs a list and a marker index"
        )));
    };
    let mut coords = [0.0; 5];
    for (d, c) in coords.iter_mut().enumerate() {
        *c = field(record, 2 + d, line)?.unwrap_or(0.0);
    }
    let mut row = MarkerRow::new(list, marker, coords);
    row.integral = field(record, 7, line)?.unwrap_or(0.0);
    row.max = field(record, 8, line)?.unwrap_or(0.0);
    for d in 0..5 {
        row.world[d] = field(record, 9 + d, line)?.unwrap_or(coords[d]);
    }
    row.integral_calibrated = field(record, 14, line)?.unwrap_or(row.integral);
    row.max_calibrated = field(record, 15, line)?.unwrap_or(row.max);
    row.tagged = field::<i64>(record, 16, line)?.is_some_and(|t| t != 0);
    row.parent = link_field(record, 17, line)?;
    row.children = [link_field(record, 18, line)?, link_field(record, 19, line)?];
    row.color = field(record, 20, line)?.unwrap_or(DEFAULT_MARKER_COLOR);
    row.name = record.get(21).map(|s| s.trim().to_string()).unwrap_or_default();
    Ok(row)
}

/// Write every marker of `lists` to `path`, followed by the per-list summary.
///
/// World columns and summary distances use the calibration of the first time
/// point; `direction` is the track axis of the summary.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn save_markers<P: AsRef<Path>>(
    path: P,
    lists: &MarkerLists,
    volumes: &VolumeSet,
    direction: usize,
) -> Result<usize> {
    let calibrations = channel_calibrations(volumes);
    let rows = lists.export_rows(&calibrations);
    let scales = calibrations.first().map_or([1.0; 5], |c| c.scales);
    let mut writer = MarkerTableWriter::create(path.as_ref())?;
    writer.write_rows(&rows)?;
    writer.write_summary(&summarize(lists, direction, scales))?;
    log::info!("wrote {} marker(s) to {}", rows.len(), path.as_ref().display());
    Ok(rows.len())
}

/// Read a marker table into `lists`, growing `volumes` so every marker's
/// channel and time point exist.
///
/// # Errors
/// Returns an error if the file is malformed or the volumes cannot grow.
pub fn load_markers<P: AsRef<Path>>(
    path: P,
    lists: &mut MarkerLists,
    volumes: &mut VolumeSet,
) -> Result<ImportReport> {
    let rows = MarkerTableReader::open(path.as_ref())?;
    grow_volumes_for(&rows, volumes)?;
    let report = lists.import_rows(&rows);
    if report.rejected > 0 {
        log::warn!(
            "{}: {} row(s) skipped past the end of their list",
            path.as_ref().display(),
            report.rejected
        );
    }
    Ok(report)
}
