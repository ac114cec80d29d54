use super::{
    parse_date_time, parse_value, read_header_line, ObservationRecord, ObservationSource, Parameter,
};
use crate::{error::FluxValResult, station::Station};
use std::{
    io::BufRead,
    path::{Path, PathBuf},
};

const HEADER_LINES: usize = 3;

/**
 * Monthly dumps of the GTS data stream.
 *
 * Same file names as the climate database extracts. The header is not checked since every dump
 * has the same layout regardless of which parameters a station reports.
 */
#[derive(Debug, Clone, Copy, Default)]
pub struct GtsExtract;

impl ObservationSource for GtsExtract {
    fn name(&self) -> &'static str {
        "gts"
    }

    fn monthly_file(&self, dir: &Path, year: i32, month: u32, station: &Station) -> PathBuf {
        dir.join(format!("radflux_{}_{:04}{:02}.txt", station.id, year, month))
    }

    fn parse_month(&self, reader: &mut dyn BufRead) -> FluxValResult<Vec<ObservationRecord>> {
        for _ in 0..HEADER_LINES {
            read_header_line(reader)?;
        }

        let mut records = vec![];
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let mut tokens = line.split_whitespace();
            let time = match parse_date_time(tokens.next(), tokens.next()) {
                Some(time) => time,
                None => {
                    log::debug!("skipping row without a valid time: {}", line.trim());
                    continue;
                }
            };

            records.push(
                ObservationRecord::at_time(time)
                    .with(Parameter::Q0, parse_value(tokens.next()))
                    .with(Parameter::LW, parse_value(tokens.next()))
                    .with(Parameter::ST, parse_value(tokens.next())),
            );
        }

        Ok(records)
    }

    fn reported_parameters(&self) -> &'static [Parameter] {
        &[Parameter::Q0, Parameter::LW, Parameter::ST]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::geo::GeoPosition;
    use std::io::Cursor;

    #[test]
    fn test_parse() {
        let text = concat!(
            "anything\n",
            "\n",
            "goes here\n",
            "2020-06-15 11:00:00 601.5 310.2 60\n",
            "2020-06-15 12:00:00 -9999 305.0\n",
        );

        let records = GtsExtract
            .parse_month(&mut Cursor::new(text.as_bytes()))
            .unwrap();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].label, "20200615110000");
        assert_eq!(records[0].get(Parameter::Q0), Some(601.5));
        assert_eq!(records[0].get(Parameter::LW), Some(310.2));
        assert_eq!(records[0].get(Parameter::ST), Some(60.0));

        assert_eq!(records[1].get(Parameter::Q0), None);
        assert_eq!(records[1].get(Parameter::LW), Some(305.0));
        assert_eq!(records[1].get(Parameter::ST), None);
    }

    #[test]
    fn test_month_file() {
        let dir = tempfile::tempdir().unwrap();
        let station = Station {
            id: 1492,
            name: "Oslo".to_owned(),
            position: GeoPosition {
                lat: 59.94,
                lon: 10.72,
            },
        };

        let path = GtsExtract.monthly_file(dir.path(), 2020, 6, &station);
        assert!(path.ends_with("radflux_1492_202006.txt"));

        let set = GtsExtract.read_station_month(dir.path(), 2020, 6, &station);
        assert!(set.missing);

        std::fs::write(&path, "\n\n\n2020-06-15 11:00:00 601.5 310.2 60\n").unwrap();
        let set = GtsExtract.read_station_month(dir.path(), 2020, 6, &station);
        assert!(!set.missing);
        assert_eq!(set.station_id, 1492);
        assert_eq!(set.records.len(), 1);
    }
}
