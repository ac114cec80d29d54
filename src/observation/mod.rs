/*!
 * Ground station observations.
 *
 * Observations come as one file per station per month in one of several text formats. A month
 * of observations for every station in the catalog is loaded at once and kept in an
 * [ObservationStore] until the products move into another month.
 */

use crate::{
    error::{FluxValError, FluxValResult},
    station::{Station, StationList},
};
use chrono::NaiveDateTime;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};
use strum::{EnumCount, EnumIter, EnumString, IntoStaticStr};

mod gts;
mod kdvh;
mod native;
mod r_extract;

pub use gts::GtsExtract;
pub use kdvh::KdvhExtract;
pub use native::NativeStation;
pub use r_extract::RExtract;

/** The quantities a station can report. */
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumCount, EnumIter, IntoStaticStr)]
pub enum Parameter {
    /// Mean air temperature.
    TTM,
    TTN,
    TTX,
    /// Soil temperatures at 10, 20 and 50 cm.
    TJM10,
    TJM20,
    TJM50,
    /// Relative humidity.
    UUM,
    UUX,
    /// Precipitation.
    RR,
    /// Wind at 2 m.
    FM2,
    FG2,
    FX2,
    /// Global radiation.
    Q0,
    /// Leaf wetness.
    BT,
    /// Grass temperatures.
    TGM,
    TGN,
    TGX,
    /// Sunshine duration.
    ST,
    TT,
    /// Longwave irradiance.
    LW,
}

impl Parameter {
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// One observation time at one station.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRecord {
    /// The observation time as `YYYYMMDDhhmm` or `YYYYMMDDhhmmss`.
    pub label: String,
    values: [Option<f32>; Parameter::COUNT],
}

impl ObservationRecord {
    /// A record with every parameter missing.
    pub fn new(label: String) -> Self {
        ObservationRecord {
            label,
            values: [None; Parameter::COUNT],
        }
    }

    /// Build a record from a time, using the long label.
    pub fn at_time(time: NaiveDateTime) -> Self {
        Self::new(time.format("%Y%m%d%H%M%S").to_string())
    }

    pub fn get(&self, param: Parameter) -> Option<f32> {
        self.values[param as usize]
    }

    pub fn set(&mut self, param: Parameter, value: Option<f32>) {
        self.values[param as usize] = value;
    }

    /// Builder style [set](Self::set).
    pub fn with(mut self, param: Parameter, value: Option<f32>) -> Self {
        self.set(param, value);
        self
    }
}

/// A month of observations for one station.
#[derive(Debug, Clone, PartialEq)]
pub struct StationObservationSet {
    pub station_id: u32,
    /// Records in file order.
    pub records: Vec<ObservationRecord>,
    /// Set when the station's file could not be loaded.
    pub missing: bool,
}

impl StationObservationSet {
    /// A set for a station whose observations could not be loaded.
    pub fn missing(station_id: u32) -> Self {
        StationObservationSet {
            station_id,
            records: vec![],
            missing: true,
        }
    }
}

/// A month of observations for every station in the catalog, in catalog order.
#[derive(Debug, Clone)]
pub struct MonthlyObservations {
    pub year: i32,
    pub month: u32,
    pub sets: Vec<StationObservationSet>,
}

impl MonthlyObservations {
    pub fn is_month(&self, year: i32, month: u32) -> bool {
        self.year == year && self.month == month
    }

    /// The set at the same position as a station in the catalog.
    pub fn get(&self, index: usize) -> Option<&StationObservationSet> {
        self.sets.get(index)
    }

    /// The number of stations that have observations.
    pub fn num_available(&self) -> usize {
        self.sets.iter().filter(|s| !s.missing).count()
    }
}

/**
 * A format observations are delivered in.
 *
 * Implementations only need to know the file naming convention and how to parse a file, loading
 * and error handling are shared.
 */
pub trait ObservationSource {
    /// Short name of the format for logging.
    fn name(&self) -> &'static str;

    /// The path of the file holding a month of observations for a station.
    fn monthly_file(&self, dir: &Path, year: i32, month: u32, station: &Station) -> PathBuf;

    /// Parse a monthly file, starting with its header.
    fn parse_month(&self, reader: &mut dyn BufRead) -> FluxValResult<Vec<ObservationRecord>>;

    /// The parameters written for each matched observation, at most three.
    fn reported_parameters(&self) -> &'static [Parameter];

    /// Load a month of observations for a station.
    ///
    /// Failures are logged and the station is marked missing, they never abort the load.
    fn read_station_month(
        &self,
        dir: &Path,
        year: i32,
        month: u32,
        station: &Station,
    ) -> StationObservationSet {
        let path = self.monthly_file(dir, year, month, station);
        log::debug!("reading {} observations from {}", self.name(), path.display());

        let records = File::open(&path)
            .map_err(FluxValError::from)
            .and_then(|f| self.parse_month(&mut BufReader::new(f)));

        match records {
            Ok(records) => StationObservationSet {
                station_id: station.id,
                records,
                missing: false,
            },
            Err(err) => {
                log::warn!(
                    "no observations for {} ({}) from {}: {}",
                    station.name,
                    station.id,
                    path.display(),
                    err
                );
                StationObservationSet::missing(station.id)
            }
        }
    }
}

/// The supported observation formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, IntoStaticStr)]
#[strum(ascii_case_insensitive)]
pub enum ObservationFormat {
    /// Station native files from the agricultural network.
    #[strum(serialize = "native")]
    Native,
    /// Extracts made with the R package.
    #[strum(serialize = "r-extract")]
    RExtract,
    /// Extracts from the climate database web interface.
    #[strum(serialize = "kdvh")]
    Kdvh,
    /// Extracts from the GTS data stream.
    #[strum(serialize = "gts")]
    Gts,
}

impl ObservationFormat {
    pub fn name(&self) -> &'static str {
        self.into()
    }

    pub fn into_source(self) -> Box<dyn ObservationSource + Send> {
        match self {
            ObservationFormat::Native => Box::new(NativeStation),
            ObservationFormat::RExtract => Box::new(RExtract),
            ObservationFormat::Kdvh => Box::new(KdvhExtract),
            ObservationFormat::Gts => Box::new(GtsExtract),
        }
    }
}

impl std::fmt::Display for ObservationFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Load a month of observations for every station.
pub fn load_month(
    year: i32,
    month: u32,
    stations: &StationList,
    source: &dyn ObservationSource,
    dir: &Path,
) -> MonthlyObservations {
    let sets = stations
        .iter()
        .map(|station| source.read_station_month(dir, year, month, station))
        .collect();

    MonthlyObservations { year, month, sets }
}

/// Holds the observation month currently in use.
pub struct ObservationStore {
    dir: PathBuf,
    source: Box<dyn ObservationSource + Send>,
    current: Option<MonthlyObservations>,
}

impl ObservationStore {
    pub fn new<P: AsRef<Path>>(dir: P, source: Box<dyn ObservationSource + Send>) -> Self {
        ObservationStore {
            dir: dir.as_ref().to_path_buf(),
            source,
            current: None,
        }
    }

    pub fn source(&self) -> &dyn ObservationSource {
        self.source.as_ref()
    }

    pub fn current(&self) -> Option<&MonthlyObservations> {
        self.current.as_ref()
    }

    /// Make sure the observations for a month are loaded.
    ///
    /// Nothing is read if the month is already loaded. Otherwise the old month is released
    /// before the new one is read.
    pub fn ensure_month(
        &mut self,
        year: i32,
        month: u32,
        stations: &StationList,
    ) -> &MonthlyObservations {
        let loaded = self
            .current
            .as_ref()
            .map(|obs| obs.is_month(year, month))
            .unwrap_or(false);

        if !loaded {
            self.release();

            log::info!(
                "loading {} observations for {}-{:02}",
                self.source.name(),
                year,
                month
            );
            let obs = load_month(year, month, stations, self.source.as_ref(), &self.dir);
            log::info!(
                "observations available for {} of {} stations",
                obs.num_available(),
                obs.sets.len()
            );

            self.current = Some(obs);
        }

        self.current.get_or_insert_with(|| MonthlyObservations {
            year,
            month,
            sets: vec![],
        })
    }

    /// Drop the loaded month, if any.
    pub fn release(&mut self) {
        if let Some(obs) = self.current.take() {
            log::debug!("releasing observations for {}-{:02}", obs.year, obs.month);
        }
    }
}

/*-------------------------------------------------------------------------------------------------
 *                             Helpers shared by the format parsers.
 *-----------------------------------------------------------------------------------------------*/
/// Parse one observed value.
///
/// Quotes are stripped. `NA`, values that do not parse, very large fill values and anything at
/// or below -999 are missing.
pub(crate) fn parse_value(token: Option<&str>) -> Option<f32> {
    let token = token?.trim_matches('"');
    if token == "NA" {
        return None;
    }

    let value: f32 = token.parse().ok()?;
    if !value.is_finite() || value > 1.0e8 || value <= -999.0 {
        None
    } else {
        Some(value)
    }
}

/// Compare a header line with the expected column list, ignoring the amount of whitespace.
pub(crate) fn header_matches(line: &str, expected: &str) -> bool {
    let line: Vec<&str> = line.split_whitespace().collect();
    let expected: Vec<&str> = expected.split_whitespace().collect();

    line.windows(expected.len()).any(|w| w == expected.as_slice())
}

/// Read one line that must be there.
pub(crate) fn read_header_line(reader: &mut dyn BufRead) -> FluxValResult<String> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(FluxValError::MalformedObservations(
            "file ends inside the header".to_owned(),
        ));
    }
    Ok(line)
}

/// Parse the date and time columns of the extract formats, `YYYY-MM-DD hh:mm:ss`.
pub(crate) fn parse_date_time(date: Option<&str>, time: Option<&str>) -> Option<NaiveDateTime> {
    let date = date?.trim_matches('"');
    let time = time?.trim_matches('"');
    NaiveDateTime::parse_from_str(&format!("{} {}", date, time), "%Y-%m-%d %H:%M:%S").ok()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value(Some("12.5")), Some(12.5));
        assert_eq!(parse_value(Some("\"0\"")), Some(0.0));
        assert_eq!(parse_value(Some("-998.5")), Some(-998.5));

        assert_eq!(parse_value(None), None);
        assert_eq!(parse_value(Some("NA")), None);
        assert_eq!(parse_value(Some("\"NA\"")), None);
        assert_eq!(parse_value(Some("x")), None);
        assert_eq!(parse_value(Some("-999")), None);
        assert_eq!(parse_value(Some("-99999")), None);
        assert_eq!(parse_value(Some("1.0e9")), None);
    }

    #[test]
    fn test_header_matches() {
        assert!(header_matches(
            "#  Time   TA  QO   OT_1\n",
            "# Time TA QO OT_1"
        ));
        assert!(header_matches("x \"time\" \"mssi\"", "\"time\" \"mssi\""));
        assert!(!header_matches("# Time TA OT_1", "# Time TA QO OT_1"));
    }

    #[test]
    fn test_record_values() {
        let rec = ObservationRecord::new("202006151200".to_owned())
            .with(Parameter::Q0, Some(512.0))
            .with(Parameter::LW, None);

        assert_eq!(rec.get(Parameter::Q0), Some(512.0));
        assert_eq!(rec.get(Parameter::LW), None);
        assert_eq!(rec.get(Parameter::TT), None);
        assert_eq!(Parameter::Q0.name(), "Q0");
    }

    #[test]
    fn test_formats() {
        assert_eq!(
            "r-extract".parse::<ObservationFormat>().ok(),
            Some(ObservationFormat::RExtract)
        );
        assert_eq!(
            "KDVH".parse::<ObservationFormat>().ok(),
            Some(ObservationFormat::Kdvh)
        );
        assert!("hdf".parse::<ObservationFormat>().is_err());

        for (format, name) in [
            (ObservationFormat::Native, "native"),
            (ObservationFormat::RExtract, "r-extract"),
            (ObservationFormat::Kdvh, "kdvh"),
            (ObservationFormat::Gts, "gts"),
        ] {
            assert_eq!(format.into_source().name(), name);
        }
    }

    struct Counting;

    impl ObservationSource for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn monthly_file(&self, dir: &Path, year: i32, month: u32, station: &Station) -> PathBuf {
            dir.join(format!("{}_{}{:02}.txt", station.id, year, month))
        }

        fn parse_month(&self, reader: &mut dyn BufRead) -> FluxValResult<Vec<ObservationRecord>> {
            let mut records = vec![];
            for line in reader.lines() {
                let line = line?;
                let mut tokens = line.split_whitespace();
                if let Some(label) = tokens.next() {
                    records.push(
                        ObservationRecord::new(label.to_owned())
                            .with(Parameter::Q0, parse_value(tokens.next())),
                    );
                }
            }
            Ok(records)
        }

        fn reported_parameters(&self) -> &'static [Parameter] {
            &[Parameter::Q0]
        }
    }

    #[test]
    fn test_month_transition() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("18700_202001.txt"),
            "202001311200 100\n202001311300 110\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("18700_202002.txt"), "202002011200 200\n").unwrap();

        let stations =
            StationList::parse(Cursor::new("2\nBlindern 18700 59.94 10.72\nAs 17850 59.66 10.78\n"))
                .unwrap();
        let mut store = ObservationStore::new(dir.path(), Box::new(Counting));

        let jan = store.ensure_month(2020, 1, &stations);
        assert!(jan.is_month(2020, 1));
        assert_eq!(jan.sets.len(), 2);
        assert_eq!(jan.sets[0].records.len(), 2);
        assert!(!jan.sets[0].missing);
        assert!(jan.sets[1].missing);
        assert_eq!(jan.sets[1].station_id, 17850);

        // Same month, nothing is reread.
        std::fs::remove_file(dir.path().join("18700_202001.txt")).unwrap();
        let jan = store.ensure_month(2020, 1, &stations);
        assert_eq!(jan.sets[0].records.len(), 2);

        let feb = store.ensure_month(2020, 2, &stations);
        assert!(feb.is_month(2020, 2));
        assert_eq!(feb.sets[0].records.len(), 1);
        assert!(feb.sets[0]
            .records
            .iter()
            .all(|r| r.label.starts_with("202002")));

        store.release();
        assert!(store.current().is_none());
    }
}
