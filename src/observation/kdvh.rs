use super::{
    header_matches, parse_value, read_header_line, ObservationRecord, ObservationSource,
    Parameter,
};
use crate::{
    error::{FluxValError, FluxValResult},
    station::Station,
};
use chrono::NaiveDateTime;
use std::{
    io::BufRead,
    path::{Path, PathBuf},
};

const HEADER: &str = "# Time TA QO OT_1";
const HEADER_LINES: usize = 3;
const TIME_FORMAT: &str = "%Y%m%dT%H%M";

/**
 * Hourly extracts from the climate database web interface.
 *
 * Files are named `radflux_<number>_<YYYY><MM>.txt`. The column list is on the third line and
 * the rows hold air temperature, global radiation and sunshine duration.
 */
#[derive(Debug, Clone, Copy, Default)]
pub struct KdvhExtract;

impl ObservationSource for KdvhExtract {
    fn name(&self) -> &'static str {
        "kdvh"
    }

    fn monthly_file(&self, dir: &Path, year: i32, month: u32, station: &Station) -> PathBuf {
        dir.join(format!("radflux_{}_{:04}{:02}.txt", station.id, year, month))
    }

    fn parse_month(&self, reader: &mut dyn BufRead) -> FluxValResult<Vec<ObservationRecord>> {
        let mut header = String::new();
        for _ in 0..HEADER_LINES {
            header = read_header_line(reader)?;
        }
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

            let time = match tokens.next() {
                Some(token) => match NaiveDateTime::parse_from_str(token, TIME_FORMAT) {
                    Ok(time) => time,
                    Err(_) => {
                        log::debug!("skipping row without a valid time: {}", line.trim());
                        continue;
                    }
                },
                None => continue,
            };

            records.push(
                ObservationRecord::at_time(time)
                    .with(Parameter::TTM, parse_value(tokens.next()))
                    .with(Parameter::Q0, parse_value(tokens.next()))
                    .with(Parameter::ST, parse_value(tokens.next())),
            );
        }

        Ok(records)
    }

    fn reported_parameters(&self) -> &'static [Parameter] {
        &[Parameter::TTM, Parameter::Q0, Parameter::ST]
    }
}
