//! Reads the parts of a GTFS Schedule feed needed to build a [`ScheduleIndex`].
//!
//! Accepts both a zip archive and an extracted directory. Only
//! `calendar_dates.txt`-based calendars are supported, as produced by the
//! static pipeline.
//!
//! [`ScheduleIndex`]: super::ScheduleIndex

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use csv::StringRecord;
use regex::Regex;
use tracing::{debug, info};

use super::index::{IndexConfig, LiveKeyRule};
use crate::error::ScheduleError;
use crate::time::parse_gtfs_date;

/// Validity window declared in `feed_info.txt`, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TripRecord {
    pub trip_id: String,
    pub service_id: String,
    pub schedule_id: i64,
    pub order_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopTimeRecord {
    pub trip_id: String,
    pub stop_sequence: u32,
    pub stop_id: String,
    /// Per-stop ordinal of the live system, assigned when the schedule was built.
    pub order_number: u32,
}

/// Raw rows of the static schedule, before indexing.
#[derive(Debug, Clone, Default)]
pub struct StaticSchedule {
    pub window: Option<FeedWindow>,
    /// Dates each service operates on, from `calendar_dates.txt`.
    pub services: HashMap<String, Vec<NaiveDate>>,
    pub trips: Vec<TripRecord>,
    pub stop_times: Vec<StopTimeRecord>,
}

impl StaticSchedule {
    /// Loads a GTFS zip archive or extracted directory at `path`.
    #[tracing::instrument(skip(config), fields(path = %path.display()))]
    pub fn load(path: &Path, config: &IndexConfig) -> Result<Self, ScheduleError> {
        let mut source = Source::at(path)?;

        let window = match source.open("feed_info.txt")? {
            Some(r) => load_feed_window(r)?,
            None => None,
        };
        debug!(?window, "Loaded feed_info.txt");

        let services = load_services(source.require("calendar_dates.txt")?)?;
        info!(count = services.len(), "Loaded services");

        let trips = load_trips(source.require("trips.txt")?, &config.live_key)?;
        info!(count = trips.len(), "Loaded trips");

        let stop_times = load_stop_times(source.require("stop_times.txt")?, &config.order_column)?;
        info!(count = stop_times.len(), "Loaded stop_times");

        Ok(Self {
            window,
            services,
            trips,
            stop_times,
        })
    }
}

enum Source {
    Dir(PathBuf),
    Zip(zip::ZipArchive<File>),
}

impl Source {
    fn at(path: &Path) -> Result<Self, ScheduleError> {
        if path.is_dir() {
            return Ok(Source::Dir(path.to_path_buf()));
        }

        let file = File::open(path).map_err(|source| ScheduleError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Source::Zip(zip::ZipArchive::new(file)?))
    }

    fn open(&mut self, name: &str) -> Result<Option<Box<dyn Read + '_>>, ScheduleError> {
        match self {
            Source::Dir(dir) => {
                let path = dir.join(name);
                match File::open(&path) {
                    Ok(f) => Ok(Some(Box::new(f))),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(source) => Err(ScheduleError::Io {
                        path: path.display().to_string(),
                        source,
                    }),
                }
            }
            Source::Zip(archive) => match archive.by_name(name) {
                Ok(f) => Ok(Some(Box::new(f))),
                Err(zip::result::ZipError::FileNotFound) => Ok(None),
                Err(e) => Err(e.into()),
            },
        }
    }

    fn require(&mut self, name: &str) -> Result<Box<dyn Read + '_>, ScheduleError> {
        self.open(name)?.ok_or_else(|| ScheduleError::Io {
            path: name.to_string(),
            source: std::io::ErrorKind::NotFound.into(),
        })
    }
}

/// A CSV table with its header resolved.
struct Table<R: Read> {
    file: &'static str,
    reader: csv::Reader<R>,
    headers: StringRecord,
}

impl<R: Read> Table<R> {
    fn new(file: &'static str, r: R) -> Result<Self, ScheduleError> {
        let mut reader = csv::Reader::from_reader(r);
        let headers = reader
            .headers()
            .map_err(|source| ScheduleError::Csv { file, source })?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim())
            .collect();
        Ok(Self {
            file,
            reader,
            headers,
        })
    }

    fn column(&self, name: &str) -> Result<usize, ScheduleError> {
        self.optional_column(name)
            .ok_or_else(|| ScheduleError::MissingColumn {
                file: self.file,
                column: name.to_string(),
            })
    }

    fn optional_column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Calls `f` with every data row and its 1-based line number.
    fn for_each(
        mut self,
        mut f: impl FnMut(&StringRecord, u64) -> Result<(), ScheduleError>,
    ) -> Result<(), ScheduleError> {
        let file = self.file;
        let mut record = StringRecord::new();
        loop {
            match self.reader.read_record(&mut record) {
                Ok(true) => {
                    let line = record.position().map(|p| p.line()).unwrap_or(0);
                    f(&record, line)?;
                }
                Ok(false) => return Ok(()),
                Err(source) => return Err(ScheduleError::Csv { file, source }),
            }
        }
    }
}

fn field(record: &StringRecord, idx: usize) -> &str {
    record.get(idx).unwrap_or("").trim()
}

fn invalid(
    file: &'static str,
    line: u64,
    column: &str,
    reason: impl Into<String>,
) -> ScheduleError {
    ScheduleError::InvalidValue {
        file,
        line,
        column: column.to_string(),
        reason: reason.into(),
    }
}

fn required<'r>(
    file: &'static str,
    record: &'r StringRecord,
    line: u64,
    idx: usize,
    column: &str,
) -> Result<&'r str, ScheduleError> {
    let value = field(record, idx);
    if value.is_empty() {
        return Err(invalid(file, line, column, "empty value"));
    }
    Ok(value)
}

fn parse_number<T: std::str::FromStr>(
    file: &'static str,
    line: u64,
    column: &str,
    value: &str,
) -> Result<T, ScheduleError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| invalid(file, line, column, format!("{value:?}: {e}")))
}

fn parse_date(
    file: &'static str,
    line: u64,
    column: &str,
    value: &str,
) -> Result<NaiveDate, ScheduleError> {
    parse_gtfs_date(value)
        .ok_or_else(|| invalid(file, line, column, format!("{value:?} is not YYYYMMDD")))
}

fn load_feed_window(r: impl Read) -> Result<Option<FeedWindow>, ScheduleError> {
    const FILE: &str = "feed_info.txt";
    let table = Table::new(FILE, r)?;
    let (Some(start_idx), Some(end_idx)) = (
        table.optional_column("feed_start_date"),
        table.optional_column("feed_end_date"),
    ) else {
        return Ok(None);
    };

    let mut window = None;
    table.for_each(|row, line| {
        if window.is_some() {
            return Ok(());
        }
        let (start, end) = (field(row, start_idx), field(row, end_idx));
        if start.is_empty() || end.is_empty() {
            return Ok(());
        }
        window = Some(FeedWindow {
            start: parse_date(FILE, line, "feed_start_date", start)?,
            end: parse_date(FILE, line, "feed_end_date", end)?,
        });
        Ok(())
    })?;
    Ok(window)
}

fn load_services(r: impl Read) -> Result<HashMap<String, Vec<NaiveDate>>, ScheduleError> {
    const FILE: &str = "calendar_dates.txt";
    let table = Table::new(FILE, r)?;
    let service_idx = table.column("service_id")?;
    let date_idx = table.column("date")?;
    let exception_idx = table.column("exception_type")?;

    let mut services: HashMap<String, Vec<NaiveDate>> = HashMap::new();
    table.for_each(|row, line| {
        let service_id = required(FILE, row, line, service_idx, "service_id")?;
        match field(row, exception_idx) {
            "1" => {}
            "2" => return Err(ScheduleError::CalendarRemoval(service_id.to_string())),
            other => return Err(invalid(FILE, line, "exception_type", format!("{other:?}"))),
        }
        let date = parse_date(FILE, line, "date", field(row, date_idx))?;
        services.entry(service_id.to_string()).or_default().push(date);
        Ok(())
    })?;
    Ok(services)
}

enum KeySource<'a> {
    Pattern(&'a Regex),
    Columns {
        schedule_idx: usize,
        schedule_name: &'a str,
        order_idx: usize,
        order_name: &'a str,
    },
}

fn load_trips(r: impl Read, rule: &LiveKeyRule) -> Result<Vec<TripRecord>, ScheduleError> {
    const FILE: &str = "trips.txt";
    let table = Table::new(FILE, r)?;
    let trip_idx = table.column("trip_id")?;
    let service_idx = table.column("service_id")?;
    let keys = match rule {
        LiveKeyRule::TripIdPattern(re) => KeySource::Pattern(re),
        LiveKeyRule::Columns {
            schedule_id,
            order_id,
        } => KeySource::Columns {
            schedule_idx: table.column(schedule_id)?,
            schedule_name: schedule_id,
            order_idx: table.column(order_id)?,
            order_name: order_id,
        },
    };

    let mut trips = Vec::new();
    table.for_each(|row, line| {
        let trip_id = required(FILE, row, line, trip_idx, "trip_id")?;
        let service_id = required(FILE, row, line, service_idx, "service_id")?;

        let (schedule_id, order_id) = match &keys {
            KeySource::Pattern(re) => LiveKeyRule::ids_from_trip_id(re, trip_id)
                .ok_or_else(|| ScheduleError::InvalidTripKey(trip_id.to_string()))?,
            KeySource::Columns {
                schedule_idx,
                schedule_name,
                order_idx,
                order_name,
            } => (
                parse_number(FILE, line, schedule_name, field(row, *schedule_idx))?,
                parse_number(FILE, line, order_name, field(row, *order_idx))?,
            ),
        };

        trips.push(TripRecord {
            trip_id: trip_id.to_string(),
            service_id: service_id.to_string(),
            schedule_id,
            order_id,
        });
        Ok(())
    })?;
    Ok(trips)
}

fn load_stop_times(r: impl Read, order_column: &str) -> Result<Vec<StopTimeRecord>, ScheduleError> {
    const FILE: &str = "stop_times.txt";
    let table = Table::new(FILE, r)?;
    let trip_idx = table.column("trip_id")?;
    let sequence_idx = table.column("stop_sequence")?;
    let stop_idx = table.column("stop_id")?;
    let order_idx = table.column(order_column)?;

    let mut stop_times = Vec::new();
    table.for_each(|row, line| {
        stop_times.push(StopTimeRecord {
            trip_id: required(FILE, row, line, trip_idx, "trip_id")?.to_string(),
            stop_sequence: parse_number(FILE, line, "stop_sequence", field(row, sequence_idx))?,
            stop_id: required(FILE, row, line, stop_idx, "stop_id")?.to_string(),
            order_number: parse_number(FILE, line, order_column, field(row, order_idx))?,
        });
        Ok(())
    })?;
    Ok(stop_times)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("rail_gtfs_rt_{name}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_feed(dir: &Path, trips: &str, stop_times: &str) {
        fs::write(
            dir.join("feed_info.txt"),
            "feed_publisher_name,feed_start_date,feed_end_date\nPLK,20260105,20260110\n",
        )
        .unwrap();
        fs::write(
            dir.join("calendar_dates.txt"),
            "service_id,date,exception_type\nC1,20260105,1\nC1,20260106,1\nC1-1D,20260105,1\n",
        )
        .unwrap();
        fs::write(dir.join("trips.txt"), trips).unwrap();
        fs::write(dir.join("stop_times.txt"), stop_times).unwrap();
    }

    #[test]
    fn test_load_directory() {
        let dir = temp_dir("load_directory");
        write_feed(
            &dir,
            "\u{feff}route_id,service_id,trip_id\nR1,C1,1_2_A\nR1,C1-1D,7_8\n",
            "trip_id,stop_sequence,stop_id,plk_order\n1_2_A,0,100,1\n1_2_A,1,200,3\n",
        );

        let schedule = StaticSchedule::load(&dir, &IndexConfig::default()).unwrap();

        assert_eq!(
            schedule.window,
            Some(FeedWindow {
                start: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap(),
                end: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
            })
        );
        assert_eq!(schedule.services["C1"].len(), 2);
        assert_eq!(schedule.trips.len(), 2);
        assert_eq!(schedule.trips[0].schedule_id, 1);
        assert_eq!(schedule.trips[0].order_id, 2);
        assert_eq!(schedule.trips[1].service_id, "C1-1D");
        assert_eq!(schedule.stop_times[1].order_number, 3);
        assert_eq!(schedule.stop_times[1].stop_id, "200");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_explicit_key_columns() {
        let dir = temp_dir("explicit_columns");
        write_feed(
            &dir,
            "trip_id,service_id,plk_schedule_id,plk_order_id\nIC_5400,C1,33,4501\n",
            "trip_id,stop_sequence,stop_id,plk_order\n",
        );
        let config = IndexConfig {
            live_key: LiveKeyRule::Columns {
                schedule_id: "plk_schedule_id".into(),
                order_id: "plk_order_id".into(),
            },
            ..IndexConfig::default()
        };

        let schedule = StaticSchedule::load(&dir, &config).unwrap();
        assert_eq!(schedule.trips[0].schedule_id, 33);
        assert_eq!(schedule.trips[0].order_id, 4501);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_trip_id_without_live_key_is_fatal() {
        let dir = temp_dir("bad_trip_id");
        write_feed(
            &dir,
            "trip_id,service_id\nBUS_1,C1\n",
            "trip_id,stop_sequence,stop_id,plk_order\n",
        );
        let err = StaticSchedule::load(&dir, &IndexConfig::default()).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidTripKey(id) if id == "BUS_1"));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_order_column_is_fatal() {
        let dir = temp_dir("missing_order");
        write_feed(
            &dir,
            "trip_id,service_id\n1_2,C1\n",
            "trip_id,stop_sequence,stop_id\n1_2,0,100\n",
        );
        let err = StaticSchedule::load(&dir, &IndexConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::MissingColumn { column, .. } if column == "plk_order"
        ));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_invalid_stop_sequence_reports_line() {
        let dir = temp_dir("bad_sequence");
        write_feed(
            &dir,
            "trip_id,service_id\n1_2,C1\n",
            "trip_id,stop_sequence,stop_id,plk_order\n1_2,0,100,1\n1_2,x,200,2\n",
        );
        let err = StaticSchedule::load(&dir, &IndexConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::InvalidValue { file: "stop_times.txt", line: 3, .. }
        ));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_calendar_removal_is_rejected() {
        let dir = temp_dir("calendar_removal");
        write_feed(&dir, "trip_id,service_id\n", "trip_id,stop_sequence,stop_id,plk_order\n");
        fs::write(
            dir.join("calendar_dates.txt"),
            "service_id,date,exception_type\nC1,20260105,2\n",
        )
        .unwrap();
        let err = StaticSchedule::load(&dir, &IndexConfig::default()).unwrap_err();
        assert!(matches!(err, ScheduleError::CalendarRemoval(s) if s == "C1"));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_zip_without_feed_info() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let dir = temp_dir("zip_archive");
        let path = dir.join("feed.zip");
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        for (name, content) in [
            ("calendar_dates.txt", "service_id,date,exception_type\nC1,20260105,1\n"),
            ("trips.txt", "trip_id,service_id\n1_2,C1\n"),
            ("stop_times.txt", "trip_id,stop_sequence,stop_id,plk_order\n1_2,0,100,1\n"),
        ] {
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();

        let schedule = StaticSchedule::load(&path, &IndexConfig::default()).unwrap();
        assert_eq!(schedule.window, None);
        assert_eq!(schedule.trips.len(), 1);
        assert_eq!(schedule.stop_times[0].order_number, 1);

        fs::remove_dir_all(&dir).unwrap();
    }
}
