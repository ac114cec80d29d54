/*!
 * Match satellite acquisition times with station observation records.
 *
 * Acquisition times are turned into a bucket label and the observation records of a station are
 * searched for the first label starting with it. Hourly buckets select one record, daily buckets
 * average the day of records following the match.
 */

use crate::{
    error::{FluxValError, FluxValResult},
    observation::{ObservationRecord, Parameter, StationObservationSet},
    station::Station,
};
use chrono::{Datelike, NaiveDateTime, Timelike};
use strum::{EnumString, IntoStaticStr};

/// Passes acquired later than this many minutes past the hour are matched with the next hour.
const ROUND_AFTER_MINUTE: u32 = 10;

/// The number of hourly records averaged for a daily bucket.
pub const HOURS_PER_DAY: usize = 24;

/// The time resolution products are compared at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(ascii_case_insensitive)]
pub enum Granularity {
    #[strum(serialize = "hourly")]
    Hourly,
    #[strum(serialize = "daily")]
    Daily,
}

/// The minute stamped on hourly bucket labels.
///
/// Some observation sources label an hour of measurements by its end, others by the middle of
/// the hour. Which one matches a satellite pass depends on the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(ascii_case_insensitive)]
pub enum HourLabel {
    /// `hh00`
    #[strum(serialize = "top")]
    TopOfHour,
    /// `hh30`
    #[strum(serialize = "half")]
    HalfPast,
}

impl HourLabel {
    pub fn name(&self) -> &'static str {
        self.into()
    }

    fn minute(self) -> u32 {
        match self {
            HourLabel::TopOfHour => 0,
            HourLabel::HalfPast => 30,
        }
    }
}

/// How acquisition times are turned into bucket labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketPolicy {
    pub granularity: Granularity,
    pub hour_label: HourLabel,
}

/**
 * Build the bucket label for an acquisition time.
 *
 * Hourly labels are `YYYYMMDDhhmm`. A pass acquired more than 10 minutes past the hour belongs
 * to the next hour. Passes late in hour 23 move to hour 00 of the next day number without
 * carrying into the month, so such labels can never be found in a month of observations.
 *
 * Daily labels are `YYYYMMDD`.
 */
pub fn bucket_id(acquired: NaiveDateTime, policy: &BucketPolicy) -> String {
    let (year, month, mut day) = (acquired.year(), acquired.month(), acquired.day());

    match policy.granularity {
        Granularity::Daily => format!("{:04}{:02}{:02}", year, month, day),
        Granularity::Hourly => {
            let mut hour = acquired.hour();
            if acquired.minute() > ROUND_AFTER_MINUTE {
                if hour == 23 {
                    hour = 0;
                    day += 1;
                } else {
                    hour += 1;
                }
            }

            format!(
                "{:04}{:02}{:02}{:02}{:02}",
                year,
                month,
                day,
                hour,
                policy.hour_label.minute()
            )
        }
    }
}

/// An observation matched with a satellite pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObservationMatch<'a> {
    /// The first record in the bucket.
    pub record: &'a ObservationRecord,
    /// The observed value, or the daily mean.
    pub value: f32,
    /// The number of records behind the value.
    pub sample_count: usize,
}

/**
 * Find the observation of a parameter for a bucket.
 *
 * # Arguments
 * * set - the month of observations at the same catalog position as the station.
 * * station - the station being matched.
 * * bucket - a label built with [bucket_id].
 * * granularity - must be the same as was used to build the label.
 * * param - the observed quantity to compare with.
 */
pub fn match_observation<'a>(
    set: &'a StationObservationSet,
    station: &Station,
    bucket: &str,
    granularity: Granularity,
    param: Parameter,
) -> FluxValResult<ObservationMatch<'a>> {
    if set.station_id != station.id {
        return Err(FluxValError::StationMismatch {
            expected: station.id,
            found: set.station_id,
        });
    }

    if set.missing {
        return Err(FluxValError::ObservationsMissing);
    }

    let h = set
        .records
        .iter()
        .position(|rec| rec.label.starts_with(bucket))
        .ok_or(FluxValError::NotFound)?;
    let record = &set.records[h];

    match granularity {
        Granularity::Hourly => {
            let value = record.get(param).ok_or(FluxValError::NotFound)?;
            Ok(ObservationMatch {
                record,
                value,
                sample_count: 1,
            })
        }
        Granularity::Daily => {
            let end = (h + HOURS_PER_DAY + 1).min(set.records.len());
            let (sum, count) = set.records[(h + 1).min(end)..end]
                .iter()
                .filter_map(|rec| rec.get(param))
                .fold((0.0f64, 0usize), |(sum, count), v| (sum + v as f64, count + 1));

            if count == 0 {
                return Err(FluxValError::NoValidData);
            }

            Ok(ObservationMatch {
                record,
                value: (sum / count as f64) as f32,
                sample_count: count,
            })
        }
    }
}
