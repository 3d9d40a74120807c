//! Imagery analysis algorithms
//!
//! The pluggable math of a change run:
//! - Clean masks: sensor QA bits, reflectance plausibility, no-data
//! - Compositing: most recent, median, max-NDVI
//! - Spectral indices: NDVI, NDWI, NDBI, EVI, fractional cover

mod clean_mask;
mod composite;
mod fractional_cover;
mod indices;

pub use clean_mask::{
    composite_clean_mask, plausible_bands, plausible_stack, stack_clean_mask, AcceptAll,
    CleanMaskRule, QaBitMask, SensorMask, REFLECTANCE_BANDS, REFLECTANCE_RANGE,
};
pub use composite::{CompositeKind, CompositeMethod, Median, MaxNdvi, MostRecent};
pub use fractional_cover::{rescale, Endmember, FractionalCover, LinearUnmixing, WORKING_MAX};
pub use indices::{Evi, NormalizedDifference, SpectralIndex, SpectralIndexFn};
