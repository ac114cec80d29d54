/*!
 * Reduce a window of samples to a single value.
 *
 * Flux and viewing geometry are continuous quantities where negative values mark invalid cells.
 * The cloud mask is categorical, its codes are first collapsed into the clear and overcast
 * classes and the classes are then averaged.
 */

use crate::{
    error::{FluxValError, FluxValResult},
    product::ChannelKind,
    satellite::CloudClass,
    window::SampleWindow,
};

/// How a window is reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationPolicy {
    /// Mean of the non-negative samples.
    ContinuousMean,
    /// Mean of the cloud classes of the classifiable samples.
    CategoricalMean,
    /// The sample itself, only valid for 1x1 windows.
    SinglePoint,
}

impl ChannelKind {
    /// The aggregation used for a channel kind, auxiliary bands are not aggregated.
    pub fn policy(self) -> Option<AggregationPolicy> {
        use ChannelKind::*;

        match self {
            Flux | SolarZenith | SatelliteZenith | RelativeAzimuth => {
                Some(AggregationPolicy::ContinuousMean)
            }
            CloudMask => Some(AggregationPolicy::CategoricalMean),
            Auxiliary => None,
        }
    }
}

/// The result of reducing a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    pub value: f32,
    /// Number of samples that contributed to the value.
    pub valid_count: usize,
}

/**
 * Reduce a window to a single value.
 *
 * A window where no sample passes the validity test of the policy gives `NoValidData` rather
 * than a mean over nothing.
 */
pub fn aggregate(window: &SampleWindow, policy: AggregationPolicy) -> FluxValResult<Aggregate> {
    match policy {
        AggregationPolicy::SinglePoint => single_point(window),
        AggregationPolicy::ContinuousMean if window.is_single_point() => single_point(window),
        AggregationPolicy::ContinuousMean => continuous_mean(window.values()),
        AggregationPolicy::CategoricalMean => categorical_mean(window.values()),
    }
}

fn single_point(window: &SampleWindow) -> FluxValResult<Aggregate> {
    match window.values() {
        [value] => Ok(Aggregate {
            value: *value,
            valid_count: 1,
        }),
        _ => {
            let size = window.size();
            Err(FluxValError::InvalidWindowGeometry {
                width: size.width,
                height: size.height,
            })
        }
    }
}

fn continuous_mean(values: &[f32]) -> FluxValResult<Aggregate> {
    let (sum, count) = values
        .iter()
        .filter(|v| **v >= 0.0)
        .fold((0.0f64, 0usize), |(sum, count), v| (sum + *v as f64, count + 1));

    mean(sum, count)
}

fn categorical_mean(values: &[f32]) -> FluxValResult<Aggregate> {
    let (sum, count) = values
        .iter()
        .filter_map(|v| CloudClass::classify(*v))
        .fold((0.0f64, 0usize), |(sum, count), class| {
            (sum + class.value() as f64, count + 1)
        });

    mean(sum, count)
}

fn mean(sum: f64, count: usize) -> FluxValResult<Aggregate> {
    if count == 0 {
        return Err(FluxValError::NoValidData);
    }

    Ok(Aggregate {
        value: (sum / count as f64) as f32,
        valid_count: count,
    })
}
