//! Collocate satellite derived radiative flux estimates with ground station observations.
//!
//! The flux products are gridded on a polar stereographic map. Each station in a catalog is
//! projected onto the grid, the product is sampled in a small window around it, and the sampled
//! values are paired with the station's observation for the same hour or day.

pub use aggregate::{aggregate, Aggregate, AggregationPolicy};
pub use archive::{archive_dirs, find_products, ProductFile};
pub use collocate::{
    CollocationRecord, CollocationSettings, CollocationStats, Collocator, ObservationPart,
    ProcessingMode, SatelliteEstimate, MISSING_VALUE, UNSET_CLOUD_CLASS,
};
pub use error::{FluxValError, FluxValResult};
pub use geo::{geo_to_map, map_to_geo, project, GeoPosition, MapCoord, MapReference, PixelIndex};
pub use observation::{
    load_month, GtsExtract, KdvhExtract, MonthlyObservations, NativeStation, ObservationFormat,
    ObservationRecord, ObservationSource, ObservationStore, Parameter, RExtract,
    StationObservationSet,
};
pub use output::{CollocationFile, CollocationWriter};
pub use product::{BandEncoding, BandInfo, Channel, ChannelKind, ProductHeader, SatelliteProduct};
pub use satellite::{CloudClass, ProductArea};
pub use station::{Station, StationList};
pub use timematch::{
    bucket_id, match_observation, BucketPolicy, Granularity, HourLabel, ObservationMatch,
    HOURS_PER_DAY,
};
pub use window::{extract, is_sentinel, SampleWindow, WindowSize, NO_DATA, OUTSIDE_GRID};

/**************************************************************************************************
 * Private Implementation
 *************************************************************************************************/
mod aggregate;
mod archive;
mod collocate;
mod error;
mod geo;
mod observation;
mod output;
mod product;
mod satellite;
mod station;
mod timematch;
mod window;
