/*!
 * Extract a neighborhood of samples around a pixel.
 *
 * Products store two reserved values next to the physical data, one for cells outside the area
 * the product was generated for and one for cells without data. They are compared in integer
 * centi-units to stay clear of float equality.
 */

use crate::{
    error::{FluxValError, FluxValResult},
    geo::PixelIndex,
    product::Channel,
};

/// Value stored for cells outside the grid extent of the source data.
pub const OUTSIDE_GRID: f32 = -401.0;
/// Value stored for cells where the source product had no data.
pub const NO_DATA: f32 = -999.99;

const OUTSIDE_GRID_CENTI: i64 = -40100;
const NO_DATA_CENTI: i64 = -99999;

/// Check whether a sample is one of the two reserved no-data values.
pub fn is_sentinel(value: f32) -> bool {
    let centi = (value * 100.0).floor() as i64;
    centi == OUTSIDE_GRID_CENTI || centi == NO_DATA_CENTI
}

/// The dimensions of a sampling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub width: usize,
    pub height: usize,
}

impl WindowSize {
    /// A square window.
    pub fn square(side: usize) -> Self {
        WindowSize {
            width: side,
            height: side,
        }
    }

    /// Sample only the pixel itself.
    pub fn single_point() -> Self {
        Self::square(1)
    }

    pub fn is_single_point(&self) -> bool {
        self.width == 1 && self.height == 1
    }

    /// Number of samples in the window.
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    /// Windows must be symmetric about the center, so both sides must be odd.
    pub fn validate(&self) -> FluxValResult<()> {
        if self.width % 2 == 1 && self.height % 2 == 1 {
            Ok(())
        } else {
            Err(FluxValError::InvalidWindowGeometry {
                width: self.width,
                height: self.height,
            })
        }
    }
}

/// Samples around a pixel in row major order.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleWindow {
    size: WindowSize,
    values: Vec<f32>,
}

impl SampleWindow {
    /// Build a window from raw values, the number of values must match the size.
    pub fn new(size: WindowSize, values: Vec<f32>) -> FluxValResult<Self> {
        size.validate()?;
        if values.len() != size.len() {
            return Err(FluxValError::InvalidWindowGeometry {
                width: size.width,
                height: size.height,
            });
        }

        Ok(SampleWindow { size, values })
    }

    pub fn size(&self) -> WindowSize {
        self.size
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn is_single_point(&self) -> bool {
        self.size.is_single_point()
    }
}

/**
 * Gather the samples of a channel in a window centered on a pixel.
 *
 * A 1x1 window returns the pixel as is. Larger windows fail if any cell is off the grid, or if
 * every cell holds a sentinel. Sentinel cells are otherwise kept, filtering them out is left to
 * the aggregation.
 */
pub fn extract(
    center: PixelIndex,
    channel: &Channel,
    size: WindowSize,
) -> FluxValResult<SampleWindow> {
    if size.is_single_point() {
        let value = channel.value_at(center.row, center.col).ok_or(
            FluxValError::IndexOutOfRange {
                row: center.row,
                col: center.col,
            },
        )?;

        return Ok(SampleWindow {
            size,
            values: vec![value],
        });
    }

    size.validate()?;

    let dx = (size.width / 2) as i64;
    let dy = (size.height / 2) as i64;

    let out_of_range = FluxValError::IndexOutOfRange {
        row: center.row,
        col: center.col,
    };
    let (first_row, last_row) = match (center.row.checked_sub(dy), center.row.checked_add(dy)) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(out_of_range),
    };
    let (first_col, last_col) = match (center.col.checked_sub(dx), center.col.checked_add(dx)) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(out_of_range),
    };

    let mut values = Vec::with_capacity(size.len());
    let mut no_data = true;
    for row in first_row..=last_row {
        for col in first_col..=last_col {
            let value = channel
                .value_at(row, col)
                .ok_or(FluxValError::IndexOutOfRange { row, col })?;

            if !is_sentinel(value) {
                no_data = false;
            }
            values.push(value);
        }
    }

    if no_data {
        return Err(FluxValError::NoValidData);
    }

    Ok(SampleWindow { size, values })
}
