/*!
 * Collocate satellite products with station observations.
 *
 * For every product each station is projected onto the product grid, the channels are sampled
 * in a window around the station and reduced to single values, and the result is paired with
 * the station's observation for the same time bucket.
 */

use crate::{
    aggregate::{aggregate, Aggregate, AggregationPolicy},
    error::{FluxValError, FluxValResult},
    geo::{project, PixelIndex},
    observation::{ObservationStore, Parameter},
    product::{Channel, ChannelKind, SatelliteProduct},
    satellite::ProductArea,
    station::{Station, StationList},
    timematch::{bucket_id, match_observation, BucketPolicy, Granularity, HourLabel},
    window::{extract, WindowSize},
};
use chrono::{Datelike, NaiveDateTime};
use std::fmt::{self, Display};
use strum::{EnumIter, EnumString, IntoStaticStr};

/// Value written for missing observations and geometry.
pub const MISSING_VALUE: f32 = -999.0;
/// Value written when the cloud class could not be determined.
pub const UNSET_CLOUD_CLASS: f32 = 0.0;

const PASS_WINDOW: usize = 13;
const PLACEHOLDER_LABEL: &str = "000000000000";
const MAX_REPORTED: usize = 3;

/// The kinds of products that can be collocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, IntoStaticStr)]
#[strum(ascii_case_insensitive)]
pub enum ProcessingMode {
    /// Single satellite passes, matched with hourly observations.
    #[strum(serialize = "pass")]
    Pass,
    /// Daily products in the old layout, matched with daily means.
    #[strum(serialize = "daily-old")]
    DailyOld,
    /// Daily products in the new layout, matched with daily means.
    #[strum(serialize = "daily-new")]
    DailyNew,
}

impl ProcessingMode {
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Decide from its file name whether a file is a product for this mode.
    ///
    /// Passes must carry the area tag. Daily products are recognized by name and only checked
    /// against the area if one is given.
    pub fn accepts(&self, fname: &str, area: Option<ProductArea>) -> bool {
        let in_area = |required: bool| match area {
            Some(area) => ProductArea::string_contains_area(fname) == Some(area),
            None => !required,
        };

        match self {
            ProcessingMode::Pass => in_area(true),
            ProcessingMode::DailyNew => fname.contains("daily") && in_area(false),
            ProcessingMode::DailyOld => fname.contains("ssi") && in_area(false),
        }
    }

    /// The window used unless another is configured.
    pub fn default_window(&self) -> WindowSize {
        match self {
            ProcessingMode::Pass => WindowSize::square(PASS_WINDOW),
            ProcessingMode::DailyOld | ProcessingMode::DailyNew => WindowSize::single_point(),
        }
    }

    pub fn granularity(&self) -> Granularity {
        match self {
            ProcessingMode::Pass => Granularity::Hourly,
            ProcessingMode::DailyOld | ProcessingMode::DailyNew => Granularity::Daily,
        }
    }

    /// Only passes have viewing geometry and a cloud mask worth sampling.
    fn samples_geometry(&self) -> bool {
        matches!(self, ProcessingMode::Pass)
    }
}

impl Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Everything that controls a collocation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollocationSettings {
    pub mode: ProcessingMode,
    pub window: WindowSize,
    pub hour_label: HourLabel,
    /// Only sample the products, do not match observations.
    pub satellite_only: bool,
}

impl CollocationSettings {
    /// Settings with the defaults of a processing mode.
    pub fn new(mode: ProcessingMode) -> Self {
        CollocationSettings {
            mode,
            window: mode.default_window(),
            hour_label: HourLabel::TopOfHour,
            satellite_only: false,
        }
    }

    pub fn bucket_policy(&self) -> BucketPolicy {
        BucketPolicy {
            granularity: self.mode.granularity(),
            hour_label: self.hour_label,
        }
    }
}

/// The satellite side of a collocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SatelliteEstimate {
    pub flux: Aggregate,
    /// Solar zenith, satellite zenith and relative azimuth.
    pub geometry: [Option<f32>; 3],
    /// Mean cloud class, None if no sample could be classified or there is no cloud mask.
    pub cloud_class: Option<f32>,
    /// Number of cells in the sampling window.
    pub window_len: usize,
}

/// The observation side of a collocation.
#[derive(Debug, Clone, PartialEq)]
pub enum ObservationPart {
    /// Satellite only runs leave room for observations to be added later.
    Placeholder,
    /// A single hourly record.
    Hourly {
        label: String,
        station_id: u32,
        values: Vec<Option<f32>>,
    },
    /// The mean of a day of records.
    Daily {
        station_id: u32,
        mean: f32,
        sample_count: usize,
    },
}

/// One line of output, a station matched with a product.
#[derive(Debug, Clone, PartialEq)]
pub struct CollocationRecord {
    pub mode: ProcessingMode,
    /// Acquisition time of the product.
    pub acquired: NaiveDateTime,
    /// Source tag of the product.
    pub source: String,
    pub estimate: SatelliteEstimate,
    pub observation: ObservationPart,
}

impl CollocationRecord {
    fn write_pass(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let est = &self.estimate;
        let geom = |i: usize| est.geometry[i].unwrap_or(MISSING_VALUE);

        write!(
            f,
            " {} {:7.2} {:3} {:3} {} {:.2} {:.2} {:.2} {:.2}",
            self.acquired.format("%Y%m%d%H%M"),
            est.flux.value,
            est.flux.valid_count,
            est.window_len,
            self.source,
            geom(0),
            geom(1),
            geom(2),
            est.cloud_class.unwrap_or(UNSET_CLOUD_CLASS),
        )
    }
}

impl Display for CollocationRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.observation, self.mode) {
            (
                ObservationPart::Daily {
                    station_id, mean, ..
                },
                ProcessingMode::DailyOld,
            ) => write!(
                f,
                " {} {} {:7.2} {:7.2}",
                self.acquired.format("%Y%m%d"),
                station_id,
                mean,
                self.estimate.flux.value
            ),
            (
                ObservationPart::Daily {
                    station_id, mean, ..
                },
                _,
            ) => write!(
                f,
                " {} {:7.2} {:3} {} {:7.2}",
                self.acquired.format("%Y%m%d%H%M"),
                self.estimate.flux.value,
                self.estimate.window_len,
                station_id,
                mean
            ),
            (ObservationPart::Placeholder, _) => {
                self.write_pass(f)?;
                write!(
                    f,
                    " {:>12} {:5} {:7.2} {:7.2} {:7.2}",
                    PLACEHOLDER_LABEL, 0, MISSING_VALUE, MISSING_VALUE, MISSING_VALUE
                )
            }
            (
                ObservationPart::Hourly {
                    label,
                    station_id,
                    values,
                },
                _,
            ) => {
                self.write_pass(f)?;
                write!(f, " {:>12} {:5}", label, station_id)?;
                for i in 0..MAX_REPORTED {
                    let v = values.get(i).copied().flatten().unwrap_or(MISSING_VALUE);
                    write!(f, " {:7.2}", v)?;
                }
                Ok(())
            }
        }
    }
}

/// Running totals of a collocation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollocationStats {
    pub products: usize,
    pub records: usize,
    /// Station and product pairs that produced no record.
    pub skipped: usize,
}

/**
 * Drives the collocation of a sequence of products.
 *
 * Owns the observation store, so observations are loaded as the products move from one month to
 * the next. Products should be given in time order to avoid reloading months.
 */
pub struct Collocator<'a> {
    stations: &'a StationList,
    store: Option<ObservationStore>,
    settings: CollocationSettings,
    stats: CollocationStats,
}

impl<'a> Collocator<'a> {
    /// Observations are required unless the run is satellite only.
    pub fn new(
        stations: &'a StationList,
        store: Option<ObservationStore>,
        settings: CollocationSettings,
    ) -> FluxValResult<Self> {
        settings.window.validate()?;

        if store.is_none() && !settings.satellite_only {
            return Err(FluxValError::Config(
                "an observation source is required unless running satellite only".to_owned(),
            ));
        }

        Ok(Collocator {
            stations,
            store,
            settings,
            stats: CollocationStats::default(),
        })
    }

    pub fn settings(&self) -> &CollocationSettings {
        &self.settings
    }

    pub fn stats(&self) -> CollocationStats {
        self.stats
    }

    /// Release the observations and return the totals.
    pub fn finish(mut self) -> CollocationStats {
        if let Some(store) = self.store.as_mut() {
            store.release();
        }
        self.stats
    }

    /// Collocate every station with one product.
    pub fn process(&mut self, product: &SatelliteProduct) -> Vec<CollocationRecord> {
        let stations = self.stations;
        let settings = self.settings;
        let stats = &mut self.stats;

        stats.products += 1;

        let fname = product.file_name();
        let header = product.header();

        let flux = match product.channel(ChannelKind::Flux) {
            Some(flux) => flux,
            None => {
                log::warn!("{} has no flux band", fname);
                stats.skipped += stations.len();
                return vec![];
            }
        };

        let observations = match self.store.as_mut() {
            Some(store) if !settings.satellite_only => {
                let reported = store.source().reported_parameters();
                let month = store.ensure_month(
                    header.acquired.year(),
                    header.acquired.month(),
                    stations,
                );
                Some((month, reported))
            }
            _ => None,
        };

        let bucket = bucket_id(header.acquired, &settings.bucket_policy());
        let granularity = settings.mode.granularity();

        let mut records = Vec::with_capacity(stations.len());
        for (index, station) in stations.iter().enumerate() {
            log::debug!("collecting flux estimates around {}", station.name);

            let estimate = match estimate(station, product, flux, &settings) {
                Ok(estimate) => estimate,
                Err(err) => {
                    log::debug!(
                        "no valid satellite data for {} in {}: {}",
                        station.name,
                        fname,
                        err
                    );
                    stats.skipped += 1;
                    continue;
                }
            };

            let observation = match observations {
                None => ObservationPart::Placeholder,
                Some((month, reported)) => {
                    let matched = month
                        .get(index)
                        .ok_or(FluxValError::ObservationsMissing)
                        .and_then(|set| {
                            match_observation(set, station, &bucket, granularity, Parameter::Q0)
                        });

                    match matched {
                        Ok(m) => match granularity {
                            Granularity::Hourly => ObservationPart::Hourly {
                                label: m.record.label.clone(),
                                station_id: station.id,
                                values: reported.iter().map(|p| m.record.get(*p)).collect(),
                            },
                            Granularity::Daily => ObservationPart::Daily {
                                station_id: station.id,
                                mean: m.value,
                                sample_count: m.sample_count,
                            },
                        },
                        Err(err @ FluxValError::StationMismatch { .. }) => {
                            log::error!("{} in {}: {}", station.name, fname, err);
                            stats.skipped += 1;
                            continue;
                        }
                        Err(err) => {
                            log::debug!(
                                "no observation for {} at {} ({}): {}",
                                station.name,
                                bucket,
                                fname,
                                err
                            );
                            stats.skipped += 1;
                            continue;
                        }
                    }
                }
            };

            records.push(CollocationRecord {
                mode: settings.mode,
                acquired: header.acquired,
                source: header.source.clone(),
                estimate,
                observation,
            });
        }

        stats.records += records.len();
        records
    }
}

/// Sample and reduce the channels of a product around a station.
fn estimate(
    station: &Station,
    product: &SatelliteProduct,
    flux: &Channel,
    settings: &CollocationSettings,
) -> FluxValResult<SatelliteEstimate> {
    let pixel = project(station.position, &product.header().map);
    let window = settings.window;

    let flux_window = extract(pixel, flux, window)?;
    let flux = aggregate(&flux_window, AggregationPolicy::ContinuousMean)?;

    let mut geometry = [None; 3];
    let mut cloud_class = None;

    if settings.mode.samples_geometry() {
        for (value, kind) in geometry.iter_mut().zip(ChannelKind::GEOMETRY) {
            if let Some(channel) = product.channel(kind) {
                *value = sample(pixel, channel, window)
                    .map_err(|err| {
                        log::debug!(
                            "no {} for {} in {}: {}",
                            channel.description(),
                            station.name,
                            product.file_name(),
                            err
                        )
                    })
                    .ok();
            }
        }

        if let Some(cm) = product.channel(ChannelKind::CloudMask) {
            // A cloud mask that cannot be windowed disqualifies the station.
            let cm_window = extract(pixel, cm, window)?;
            cloud_class = aggregate(&cm_window, AggregationPolicy::CategoricalMean)
                .map(|agg| agg.value)
                .ok();
        }
    }

    Ok(SatelliteEstimate {
        flux,
        geometry,
        cloud_class,
        window_len: window.len(),
    })
}

fn sample(pixel: PixelIndex, channel: &Channel, window: WindowSize) -> FluxValResult<f32> {
    let policy = channel
        .kind()
        .policy()
        .unwrap_or(AggregationPolicy::ContinuousMean);
    let samples = extract(pixel, channel, window)?;
    aggregate(&samples, policy).map(|agg| agg.value)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        geo::MapReference,
        observation::{ObservationRecord, ObservationSource},
        product::{BandEncoding, BandInfo, ProductHeader},
    };
    use chrono::NaiveDate;
    use std::{
        io::{BufRead, Cursor},
        path::{Path, PathBuf},
    };

    // Lat 60 lon 0 falls in cell (col 10, row 5) of this grid.
    const MAP: MapReference = MapReference {
        ax: 1.0,
        ay: 1.0,
        bx: -10.0,
        by: -3180.0,
        width: 20,
        height: 20,
    };

    fn acquired() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 6, 15)
            .and_then(|d| d.and_hms_opt(12, 5, 0))
            .unwrap()
    }

    fn band(desc: &str, kind: ChannelKind, fill: impl Fn(usize, usize) -> f32) -> Channel {
        let mut data = Vec::with_capacity(MAP.width * MAP.height);
        for row in 0..MAP.height {
            for col in 0..MAP.width {
                data.push(fill(row, col));
            }
        }
        Channel::new(desc, kind, MAP.width, MAP.height, data).unwrap()
    }

    fn product(channels: Vec<Channel>) -> SatelliteProduct {
        let bands = channels
            .iter()
            .map(|c| BandInfo {
                description: c.description().to_owned(),
                encoding: if c.kind() == ChannelKind::CloudMask {
                    BandEncoding::U16
                } else {
                    BandEncoding::F32
                },
            })
            .collect();

        let header = ProductHeader {
            source: "NOAA-19".to_owned(),
            product: "SSI".to_owned(),
            area: "ns".to_owned(),
            acquired: acquired(),
            map: MAP,
            bands,
        };

        let fname = "ssi_noaa19_202006151205_ns.flx".to_owned();
        SatelliteProduct::from_parts(header, channels, fname).unwrap()
    }

    /// Flux of 10 with 20 at the station cell, every auxiliary band 0.
    fn pass_product(cloud: Option<f32>) -> SatelliteProduct {
        let flux = |row: usize, col: usize| if (row, col) == (5, 10) { 20.0 } else { 10.0 };
        let mut channels = vec![
            band("SSI", ChannelKind::Flux, flux),
            band("SSI_ERR", ChannelKind::Auxiliary, |_, _| 0.0),
            band("QC", ChannelKind::Auxiliary, |_, _| 0.0),
            band("SOZ", ChannelKind::SolarZenith, |_, _| 45.0),
            band("SAZ", ChannelKind::SatelliteZenith, |_, _| 30.0),
            band("RAZ", ChannelKind::RelativeAzimuth, |_, _| 120.0),
        ];
        if let Some(code) = cloud {
            channels.push(band("CM", ChannelKind::CloudMask, move |_, _| code));
        }
        product(channels)
    }

    fn stations() -> StationList {
        StationList::parse(Cursor::new(
            "2\nCenter 18700 60.0 0.0\nFaraway 90450 80.0 0.0\n",
        ))
        .unwrap()
    }

    struct Fixed;

    impl ObservationSource for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn monthly_file(&self, dir: &Path, _: i32, _: u32, station: &Station) -> PathBuf {
            dir.join(station.id.to_string())
        }

        fn parse_month(&self, _: &mut dyn BufRead) -> FluxValResult<Vec<ObservationRecord>> {
            unreachable!()
        }

        fn reported_parameters(&self) -> &'static [Parameter] {
            &[Parameter::TTM, Parameter::Q0]
        }

        fn read_station_month(
            &self,
            _: &Path,
            year: i32,
            month: u32,
            station: &Station,
        ) -> crate::observation::StationObservationSet {
            let start = NaiveDate::from_ymd_opt(year, month, 15)
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .unwrap();
            let records = (0..=48)
                .map(|h| {
                    ObservationRecord::at_time(start + chrono::Duration::hours(h))
                        .with(Parameter::TTM, Some(15.5))
                        .with(Parameter::Q0, Some(h as f32))
                })
                .collect();

            crate::observation::StationObservationSet {
                station_id: station.id,
                records,
                missing: false,
            }
        }
    }

    #[test]
    fn test_pass_with_observations() {
        let stations = stations();
        let store = ObservationStore::new("/nowhere", Box::new(Fixed));
        let mut settings = CollocationSettings::new(ProcessingMode::Pass);
        settings.window = WindowSize::square(3);

        let mut collocator = Collocator::new(&stations, Some(store), settings).unwrap();
        let records = collocator.process(&pass_product(Some(3.0)));

        // The second station is off the grid.
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert!((rec.estimate.flux.value - 11.11).abs() < 0.01);
        assert_eq!(rec.estimate.flux.valid_count, 9);
        assert_eq!(rec.estimate.window_len, 9);
        assert_eq!(rec.estimate.geometry, [Some(45.0), Some(30.0), Some(120.0)]);
        assert_eq!(rec.estimate.cloud_class, Some(1.0));

        assert_eq!(
            rec.to_string(),
            " 202006151205   11.11   9   9 NOAA-19 45.00 30.00 120.00 1.00 \
             20200615120000 18700   15.50   12.00 -999.00"
        );

        let stats = collocator.finish();
        assert_eq!(stats.products, 1);
        assert_eq!(stats.records, 1);
        assert_eq!(stats.skipped, 1);
    }

    /// Like [Fixed], but hands the first station a month belonging to another station.
    struct Mislabeled;

    impl ObservationSource for Mislabeled {
        fn name(&self) -> &'static str {
            "mislabeled"
        }

        fn monthly_file(&self, dir: &Path, year: i32, month: u32, station: &Station) -> PathBuf {
            Fixed.monthly_file(dir, year, month, station)
        }

        fn parse_month(&self, _: &mut dyn BufRead) -> FluxValResult<Vec<ObservationRecord>> {
            unreachable!()
        }

        fn reported_parameters(&self) -> &'static [Parameter] {
            Fixed.reported_parameters()
        }

        fn read_station_month(
            &self,
            dir: &Path,
            year: i32,
            month: u32,
            station: &Station,
        ) -> crate::observation::StationObservationSet {
            let mut set = Fixed.read_station_month(dir, year, month, station);
            if station.id == 18700 {
                set.station_id = 99910;
            }
            set
        }
    }

    #[test]
    fn test_station_mismatch_skipped() {
        let stations = StationList::parse(Cursor::new(
            "2\nCenter 18700 60.0 0.0\nTwin 18701 60.0 0.0\n",
        ))
        .unwrap();
        let store = ObservationStore::new("/nowhere", Box::new(Mislabeled));
        let settings = CollocationSettings {
            window: WindowSize::square(3),
            ..CollocationSettings::new(ProcessingMode::Pass)
        };

        let mut collocator = Collocator::new(&stations, Some(store), settings).unwrap();
        let records = collocator.process(&pass_product(Some(3.0)));

        assert_eq!(records.len(), 1);
        match &records[0].observation {
            ObservationPart::Hourly { station_id, .. } => assert_eq!(*station_id, 18701),
            other => panic!("unexpected observation {:?}", other),
        }

        let stats = collocator.finish();
        assert_eq!(stats.records, 1);
        assert_eq!(stats.skipped, 1);
    }

    #[test]
    fn test_satellite_only() {
        let stations = stations();
        let settings = CollocationSettings {
            satellite_only: true,
            window: WindowSize::square(3),
            ..CollocationSettings::new(ProcessingMode::Pass)
        };

        let mut collocator = Collocator::new(&stations, None, settings).unwrap();
        let records = collocator.process(&pass_product(Some(4.5)));
        assert_eq!(records.len(), 1);

        // Unclassified cloud codes leave the class unset.
        assert_eq!(records[0].estimate.cloud_class, None);
        assert_eq!(
            records[0].to_string(),
            " 202006151205   11.11   9   9 NOAA-19 45.00 30.00 120.00 0.00 \
             000000000000     0 -999.00 -999.00 -999.00"
        );
    }

    #[test]
    fn test_observations_required() {
        let stations = stations();
        let settings = CollocationSettings::new(ProcessingMode::Pass);
        assert!(matches!(
            Collocator::new(&stations, None, settings),
            Err(FluxValError::Config(_))
        ));

        let settings = CollocationSettings {
            window: WindowSize::square(4),
            satellite_only: true,
            ..settings
        };
        assert!(matches!(
            Collocator::new(&stations, None, settings),
            Err(FluxValError::InvalidWindowGeometry { .. })
        ));
    }

    #[test]
    fn test_daily_layouts() {
        let stations = stations();
        let flux = band("SSI", ChannelKind::Flux, |_, _| 150.0);
        let daily = product(vec![flux]);

        // Records start at hour 0 of the 15th, the next 24 hold 1 to 24.
        for (mode, expected) in [
            (ProcessingMode::DailyNew, " 202006151205  150.00   1 18700   12.50"),
            (ProcessingMode::DailyOld, " 20200615 18700   12.50  150.00"),
        ] {
            let store = ObservationStore::new("/nowhere", Box::new(Fixed));
            let mut collocator =
                Collocator::new(&stations, Some(store), CollocationSettings::new(mode)).unwrap();

            let records = collocator.process(&daily);
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].estimate.geometry, [None, None, None]);
            assert_eq!(records[0].to_string(), expected);
        }
    }

    #[test]
    fn test_geometry_missing() {
        let stations = stations();
        let flux = band("SSI", ChannelKind::Flux, |_, _| 150.0);
        let settings = CollocationSettings {
            satellite_only: true,
            window: WindowSize::single_point(),
            ..CollocationSettings::new(ProcessingMode::Pass)
        };

        let mut collocator = Collocator::new(&stations, None, settings).unwrap();
        let records = collocator.process(&product(vec![flux]));
        assert_eq!(records.len(), 1);
        let line = records[0].to_string();
        assert!(
            line.starts_with(" 202006151205  150.00   1   1 NOAA-19 -999.00 -999.00 -999.00 0.00"),
            "{}",
            line
        );
    }

    #[test]
    fn test_modes() {
        let pass = "ssi_noaa19_202006151205_ns.flx";
        assert!(ProcessingMode::Pass.accepts(pass, Some(ProductArea::NS)));
        assert!(!ProcessingMode::Pass.accepts(pass, Some(ProductArea::GR)));
        assert!(!ProcessingMode::Pass.accepts(pass, None));
        assert!(ProcessingMode::DailyNew.accepts("ssi_daily_20200615_ns.flx", None));
        assert!(!ProcessingMode::DailyNew.accepts(pass, None));
        assert!(ProcessingMode::DailyOld.accepts("ssi_20200615.flx", None));

        assert_eq!(ProcessingMode::Pass.default_window(), WindowSize::square(13));
        assert_eq!(ProcessingMode::DailyOld.default_window(), WindowSize::single_point());
        assert_eq!(
            "daily-new".parse::<ProcessingMode>().ok(),
            Some(ProcessingMode::DailyNew)
        );
    }
}
