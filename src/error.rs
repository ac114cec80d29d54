use std::{
    error::Error,
    fmt::{Display, Formatter},
};

/// Everything that can go wrong while collocating satellite estimates with observations.
///
/// Only `Config`, `Io` on the output or station list, and `MalformedStationList` are fatal for a
/// run. The rest are reported per file or per station and the batch moves on.
#[derive(Debug)]
pub enum FluxValError {
    /// A required option is missing or has an invalid value.
    Config(String),
    /// Opening or reading a file failed.
    Io(std::io::Error),
    /// The station list header or one of its lines could not be understood.
    MalformedStationList(String),
    /// A satellite product could not be decoded.
    MalformedProduct(String),
    /// A monthly observation file had an unexpected layout.
    MalformedObservations(String),
    /// Window dimensions must both be odd, or both be 1.
    InvalidWindowGeometry { width: usize, height: usize },
    /// A window cell fell outside the product grid.
    IndexOutOfRange { row: i64, col: i64 },
    /// Every sample was a sentinel, or no sample survived the validity filter.
    NoValidData,
    /// The observation set at a station's position belongs to another station.
    StationMismatch { expected: u32, found: u32 },
    /// The station has no observations for the loaded month.
    ObservationsMissing,
    /// No observation record matched the requested time bucket.
    NotFound,
}

pub type FluxValResult<T> = Result<T, FluxValError>;

impl Display for FluxValError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), std::fmt::Error> {
        use FluxValError::*;

        match self {
            Config(msg) => write!(f, "configuration error: {}", msg),
            Io(err) => write!(f, "i/o error: {}", err),
            MalformedStationList(msg) => write!(f, "malformed station list: {}", msg),
            MalformedProduct(msg) => write!(f, "malformed product: {}", msg),
            MalformedObservations(msg) => write!(f, "malformed observations: {}", msg),
            InvalidWindowGeometry { width, height } => write!(
                f,
                "window must have odd dimensions or be a single point, got {}x{}",
                width, height
            ),
            IndexOutOfRange { row, col } => {
                write!(f, "pixel (row={}, col={}) is outside the grid", row, col)
            }
            NoValidData => write!(f, "no valid data"),
            StationMismatch { expected, found } => write!(
                f,
                "observations belong to station {} but station {} was expected",
                found, expected
            ),
            ObservationsMissing => write!(f, "no observations for this month"),
            NotFound => write!(f, "no matching observation"),
        }
    }
}

impl Error for FluxValError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            FluxValError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FluxValError {
    fn from(err: std::io::Error) -> Self {
        FluxValError::Io(err)
    }
}

impl From<zip::result::ZipError> for FluxValError {
    fn from(err: zip::result::ZipError) -> Self {
        FluxValError::MalformedProduct(format!("zip archive: {}", err))
    }
}

impl From<chrono::ParseError> for FluxValError {
    fn from(err: chrono::ParseError) -> Self {
        FluxValError::Config(format!("invalid time: {}", err))
    }
}
