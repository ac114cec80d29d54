/*!
 * Geographic calculations.
 *
 * The flux products are delivered on a polar stereographic grid true at 60N with the Greenwich
 * meridian pointing straight down the grid. Only the forward and inverse transforms for that
 * projection are implemented here, along with the linear scaling between map coordinates and
 * grid cells.
 */

const EARTH_RADIUS_KM: f64 = 6371.0;
const TRUE_LATITUDE_DEG: f64 = 60.0;
const CENTRAL_MERIDIAN_DEG: f64 = 0.0;

/// A geographic position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPosition {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPosition {
    /// Check whether two positions are within eps degrees of each other in both directions.
    pub fn is_close(&self, other: &GeoPosition, eps: f64) -> bool {
        (self.lat - other.lat).abs() < eps && (self.lon - other.lon).abs() < eps
    }
}

/// A position in the product map plane in kilometers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapCoord {
    pub eastings: f64,
    pub northings: f64,
}

/// A cell address in a product grid. Signed so that positions off the grid can be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelIndex {
    pub col: i64,
    pub row: i64,
}

/**
 * All the information needed to go between map coordinates and grid cells.
 *
 * The grid is anchored at its upper left corner (bx, by) and every cell is ax kilometers wide
 * and ay kilometers tall. Rows increase southward (decreasing northings).
 */
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapReference {
    /// Cell width in km.
    pub ax: f64,
    /// Cell height in km.
    pub ay: f64,
    /// Eastings of the upper left corner of the grid in km.
    pub bx: f64,
    /// Northings of the upper left corner of the grid in km.
    pub by: f64,
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
}

impl MapReference {
    /// Find the grid cell containing a map coordinate.
    pub fn map_to_pixel(&self, coord: MapCoord) -> PixelIndex {
        let col = ((coord.eastings - self.bx) / self.ax).floor() as i64;
        let row = ((self.by - coord.northings) / self.ay).floor() as i64;

        PixelIndex { col, row }
    }

    /// The map coordinate at the center of a grid cell.
    pub fn pixel_center(&self, pixel: PixelIndex) -> MapCoord {
        MapCoord {
            eastings: self.bx + (pixel.col as f64 + 0.5) * self.ax,
            northings: self.by - (pixel.row as f64 + 0.5) * self.ay,
        }
    }

    /// Whether the cell lies on the grid.
    pub fn contains(&self, pixel: PixelIndex) -> bool {
        pixel.col >= 0
            && pixel.row >= 0
            && (pixel.col as usize) < self.width
            && (pixel.row as usize) < self.height
    }
}

fn projection_scale() -> f64 {
    EARTH_RADIUS_KM * (1.0 + TRUE_LATITUDE_DEG.to_radians().sin())
}

/**
 * Forward polar stereographic transform.
 *
 * #Arguments
 * * pos - the geographic position, it should be in the northern hemisphere.
 *
 * #Returns
 * The position in the map plane in kilometers.
 */
pub fn geo_to_map(pos: GeoPosition) -> MapCoord {
    let lat = pos.lat.to_radians();
    let dlon = (pos.lon - CENTRAL_MERIDIAN_DEG).to_radians();

    let r = projection_scale() * lat.cos() / (1.0 + lat.sin());

    MapCoord {
        eastings: r * dlon.sin(),
        northings: -r * dlon.cos(),
    }
}

/// Inverse polar stereographic transform.
pub fn map_to_geo(coord: MapCoord) -> GeoPosition {
    let r = coord.eastings.hypot(coord.northings);

    let lat = 90.0 - 2.0 * (r / projection_scale()).atan().to_degrees();
    let lon = CENTRAL_MERIDIAN_DEG + coord.eastings.atan2(-coord.northings).to_degrees();

    GeoPosition { lat, lon }
}

/// Find the grid cell a geographic position falls in.
///
/// There is no range check here, positions off the grid are caught when the window around the
/// cell is extracted.
pub fn project(pos: GeoPosition, map: &MapReference) -> PixelIndex {
    map.map_to_pixel(geo_to_map(pos))
}
