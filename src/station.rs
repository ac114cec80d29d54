/*!
 * The catalog of ground stations.
 *
 * The station list is a small text file. The first line holds the number of stations and each
 * following line describes one station as `name number lat lon`.
 */

use crate::{
    error::{FluxValError, FluxValResult},
    geo::GeoPosition,
};
use rustc_hash::FxHashSet;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

/// A ground station.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    /// The station number, used to join stations with their observations.
    pub id: u32,
    pub name: String,
    pub position: GeoPosition,
}

/// The stations to collocate against, in file order.
#[derive(Debug, Clone, Default)]
pub struct StationList {
    stations: Vec<Station>,
}

impl StationList {
    /// Load the station list from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> FluxValResult<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);

        Self::parse(reader).map_err(|err| match err {
            FluxValError::MalformedStationList(msg) => {
                FluxValError::MalformedStationList(format!("{}: {}", path.display(), msg))
            }
            err => err,
        })
    }

    /// Parse a station list.
    pub fn parse<R: BufRead>(reader: R) -> FluxValResult<Self> {
        let mut lines = reader.lines();

        let count_line = lines
            .next()
            .ok_or_else(|| FluxValError::MalformedStationList("empty file".to_owned()))??;
        let count: usize = count_line.trim().parse().map_err(|_| {
            FluxValError::MalformedStationList(format!(
                "invalid station count: {}",
                count_line.trim()
            ))
        })?;

        let mut stations = Vec::with_capacity(count);
        let mut ids = FxHashSet::default();
        for (line_no, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let station = parse_station(&line).ok_or_else(|| {
                FluxValError::MalformedStationList(format!(
                    "line {}: {}",
                    line_no + 2,
                    line.trim()
                ))
            })?;

            if !ids.insert(station.id) {
                return Err(FluxValError::MalformedStationList(format!(
                    "duplicate station id {}",
                    station.id
                )));
            }

            stations.push(station);
        }

        if stations.len() != count {
            return Err(FluxValError::MalformedStationList(format!(
                "expected {} stations, found {}",
                count,
                stations.len()
            )));
        }

        Ok(StationList { stations })
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.stations.iter()
    }

    pub fn as_slice(&self) -> &[Station] {
        &self.stations
    }
}

impl<'a> IntoIterator for &'a StationList {
    type Item = &'a Station;
    type IntoIter = std::slice::Iter<'a, Station>;

    fn into_iter(self) -> Self::IntoIter {
        self.stations.iter()
    }
}

fn parse_station(line: &str) -> Option<Station> {
    let mut tokens = line.split_whitespace();

    let name = tokens.next()?.to_owned();
    let id: u32 = tokens.next()?.parse().ok()?;
    let lat: f64 = tokens.next()?.parse().ok()?;
    let lon: f64 = tokens.next()?.parse().ok()?;

    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=360.0).contains(&lon) {
        return None;
    }

    Some(Station {
        id,
        name,
        position: GeoPosition { lat, lon },
    })
}
