use super::{
    header_matches, parse_date_time, parse_value, read_header_line, ObservationRecord,
    ObservationSource, Parameter,
};
use crate::{
    error::{FluxValError, FluxValResult},
    station::Station,
};
use std::{
    io::BufRead,
    path::{Path, PathBuf},
};

const HEADER: &str = "\"time\" \"mssi\" \"nssi\" \"mdli\" \"ndli\"";

/**
 * Radiation extracts written by the R tooling.
 *
 * Files are named after the station name, `radflux_<name>_<YYYY><MM>.txt`. Each row holds the
 * date and time followed by the mean shortwave flux, its sample count, the mean longwave flux
 * and its sample count.
 */
#[derive(Debug, Clone, Copy, Default)]
pub struct RExtract;

impl ObservationSource for RExtract {
    fn name(&self) -> &'static str {
        "r-extract"
    }

    fn monthly_file(&self, dir: &Path, year: i32, month: u32, station: &Station) -> PathBuf {
        dir.join(format!("radflux_{}_{:04}{:02}.txt", station.name, year, month))
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

            let q0 = parse_value(tokens.next());
            let _ssi_count = tokens.next();
            let lw = parse_value(tokens.next());

            records.push(
                ObservationRecord::at_time(time)
                    .with(Parameter::Q0, q0)
                    .with(Parameter::LW, lw),
            );
        }

        Ok(records)
    }

    fn reported_parameters(&self) -> &'static [Parameter] {
        &[Parameter::Q0, Parameter::LW]
    }
}
