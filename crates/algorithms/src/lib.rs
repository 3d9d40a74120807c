//! # specanom algorithms
//!
//! Per-chunk math for spectral change detection.
//!
//! ## Available Algorithm Categories
//!
//! - **imagery**: clean masks, composite methods, spectral indices

pub mod imagery;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::imagery::{
        composite_clean_mask, stack_clean_mask, CleanMaskRule, CompositeKind, CompositeMethod,
        QaBitMask, SensorMask, SpectralIndex, SpectralIndexFn,
    };
    pub use specanom_core::prelude::*;
}
