/*! Contains all the information about product areas and cloud mask codes. */

use strum::{EnumIter, EnumString, IntoStaticStr};

/** The product areas the flux chain produces. */
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, EnumString, IntoStaticStr)]
#[strum(ascii_case_insensitive)]
pub enum ProductArea {
    /// The North Sea and Scandinavia.
    #[strum(serialize = "ns")]
    NS,
    /// The Norwegian Sea and the northern regions.
    #[strum(serialize = "nr")]
    NR,
    /// The Atlantic.
    #[strum(serialize = "at")]
    AT,
    /// Greenland.
    #[strum(serialize = "gr")]
    GR,
}

impl ProductArea {
    /// Get the tag used for the area in product headers and file names.
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Scan the string for the occurrence of an area tag delimited as it is in file names.
    ///
    /// Area tags are only two letters, so they only count when surrounded by '_' or '.', or when
    /// they start or end the string.
    pub fn string_contains_area(string: &str) -> Option<ProductArea> {
        use strum::IntoEnumIterator;

        string
            .split(|c| c == '_' || c == '.')
            .find_map(|part| Self::iter().find(|area| part == area.name()))
    }
}

impl std::fmt::Display for ProductArea {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The two classes a cloud mask code collapses into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudClass {
    /// Cloud free, codes 1 through 4.
    Clear = 1,
    /// Cloudy, codes 5 through 19.
    Overcast = 2,
}

impl CloudClass {
    /// Translate a cloud mask code to a class.
    ///
    /// The codes come from the cloud type product and are stored as floats in the flux products,
    /// so the ranges have a small tolerance on each end. Anything else (unprocessed, sea ice,
    /// fractional or undefined codes) is not classified.
    pub fn classify(code: f32) -> Option<CloudClass> {
        if (0.99..=4.01).contains(&code) {
            Some(CloudClass::Clear)
        } else if (4.99..=19.01).contains(&code) {
            Some(CloudClass::Overcast)
        } else {
            None
        }
    }

    /// The value used when averaging classes.
    pub fn value(self) -> f32 {
        self as i32 as f32
    }
}
