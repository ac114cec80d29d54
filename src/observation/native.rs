use super::{
    header_matches, parse_value, read_header_line, ObservationRecord, ObservationSource, Parameter,
};
use crate::{
    error::{FluxValError, FluxValResult},
    station::Station,
};
use std::{
    io::BufRead,
    path::{Path, PathBuf},
};

const HEADER: &str =
    "TTM TTN TTX TJM TJM20 TJM50 UUM UUX RR FM2 FG2 FX2 QO BT TGM TGN TGX ST";

/// Column order after the time label.
const COLUMNS: [Parameter; 19] = [
    Parameter::TTM,
    Parameter::TTN,
    Parameter::TTX,
    Parameter::TJM10,
    Parameter::TJM20,
    Parameter::TJM50,
    Parameter::UUM,
    Parameter::UUX,
    Parameter::RR,
    Parameter::FM2,
    Parameter::FG2,
    Parameter::FX2,
    Parameter::Q0,
    Parameter::BT,
    Parameter::TGM,
    Parameter::TGN,
    Parameter::TGX,
    Parameter::ST,
    Parameter::TT,
];

/**
 * Files in the format delivered by the agricultural station network.
 *
 * Files are named `MM0SSSSS.cYY` with the month, the five digit station number and a two digit
 * year. The time label is the first column and is used as is.
 */
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeStation;

impl NativeStation {
    fn two_digit_year(year: i32) -> i32 {
        if year < 2000 {
            year - 1900
        } else {
            year - 2000
        }
    }
}

impl ObservationSource for NativeStation {
    fn name(&self) -> &'static str {
        "native"
    }

    fn monthly_file(&self, dir: &Path, year: i32, month: u32, station: &Station) -> PathBuf {
        dir.join(format!(
            "{:02}0{:05}.c{:02}",
            month,
            station.id,
            Self::two_digit_year(year)
        ))
    }

    fn parse_month(&self, reader: &mut dyn BufRead) -> FluxValResult<Vec<ObservationRecord>> {
        let header = read_header_line(reader)?;
        if !header_matches(&header, HEADER) {
            return Err(FluxValError::MalformedObservations(format!(
                "unexpected parameter list: {}",
                header.trim()
            )));
        }

        let mut records = vec![];
        for line in reader.lines() {
            let line = line?;
            let mut tokens = line.split_whitespace();

            let label = match tokens.next() {
                Some(label) => label,
                None => continue,
            };

            let mut record = ObservationRecord::new(label.to_owned());
            for param in COLUMNS {
                record.set(param, parse_value(tokens.next()));
            }
            records.push(record);
        }

        Ok(records)
    }

    fn reported_parameters(&self) -> &'static [Parameter] {
        &[Parameter::TTM, Parameter::Q0, Parameter::ST]
    }
}
