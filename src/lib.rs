//! ClimWrangle: dataset-wrangling utilities for climate workflows
//!
//! A Rust library for reshaping, converting and cleaning up labeled
//! climate datasets (NetCDF). ClimWrangle provides mask-based stacking of
//! sparse spatial grids and the inverse NaN-filling unstack, calendar
//! conversion between CF calendars, season bucketing of time axes, unit
//! conversion aware of the rate/amount distinction, a configurable
//! attribute clean-up pipeline and controlled-vocabulary lookups.
//!
//! ## Key Features
//!
//! - **Stack/Unstack**: compact masked grids to a single point axis and
//!   reconstruct them later, with a side-car coordinate file contract
//! - **Calendars**: standard, no-leap, all-leap and 360-day calendars with
//!   conversion and missing-step policies
//! - **Seasons**: unstack a time axis into yearly and seasonal axes from
//!   an inferred or explicit season map
//! - **Units**: dimensional-analysis driven conversion, including
//!   amount-to-rate and rate-to-amount transforms
//! - **Clean-up pipeline**: units, calendar, unstack, rounding and a
//!   family of attribute normalization stages in a fixed order
//! - **Vocabularies**: exact and regex controlled-vocabulary lookups from
//!   static JSON mappings
//!
//! ## Module Organization
//!
//! - [`dataset`]: the in-memory labeled dataset model
//! - [`stacking`]: mask-based stacking and NaN-filling unstacking
//! - [`calendar`]: CF calendars, dates, frequencies and conversions
//! - [`seasons`]: season bucketing of time axes
//! - [`units`]: unit parsing and conversion
//! - [`cleanup`]: the orchestrated clean-up pipeline
//! - [`catalog`]: catalog attributes and identifier generation
//! - [`vocab`]: controlled-vocabulary registry
//! - [`release_notes`]: release history formatting
//! - [`netcdf_io`]: NetCDF read/write for the dataset model
//! - [`errors`]: centralized error handling
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use clim_wrangle::prelude::*;
//!
//! let ds = clim_wrangle::netcdf_io::read_dataset("data.nc".as_ref()).unwrap();
//!
//! // Keep only the grid points marked valid by a mask, then clean up
//! let mask = Mask::new(
//!     vec!["lat".to_string(), "lon".to_string()],
//!     ndarray::ArrayD::from_elem(ndarray::IxDyn(&[2, 3]), true),
//! )
//! .unwrap();
//! let stacked = stack_drop_nans(&ds, &mask, &StackOptions::default()).unwrap();
//!
//! let config = CleanUpConfig::default();
//! let cleaned = clean_up(stacked, &config).unwrap();
//! cleaned.print_summary();
//! ```

// Core modules
pub mod calendar;
pub mod catalog;
pub mod cleanup;
pub mod dataset;
pub mod errors;
pub mod netcdf_io;
pub mod release_notes;
pub mod seasons;
pub mod stacking;
pub mod units;
pub mod utils;
pub mod vocab;

// Internal modules
pub mod cli;

// Direct re-exports for the public API
pub use calendar::*;
pub use catalog::*;
pub use cleanup::*;
pub use dataset::*;
pub use errors::*;
pub use seasons::*;
pub use stacking::*;
pub use units::*;
pub use utils::*;

// High-level convenience API
pub mod prelude {
    //! Commonly used imports for convenience
    pub use crate::calendar::{
        minimum_calendar, translate_time_chunk, AlignOn, Calendar, CfDate, ChunkValue,
        ConvertCalendarOptions,
    };
    pub use crate::cleanup::{clean_up, CleanUpConfig};
    pub use crate::dataset::{AttrMap, AttrValue, Coord, CoordData, DataArray, Dataset};
    pub use crate::errors::{Result, WrangleError};
    pub use crate::seasons::unstack_dates;
    pub use crate::stacking::{
        maybe_unstack, stack_drop_nans, unstack_fill_nan, CoordsSource, Mask,
        MaybeUnstackOptions, StackOptions, UnstackOptions,
    };
    pub use crate::units::change_units;
    pub use crate::utils::natural_sort;
    pub use crate::vocab::{MissingPolicy, VocabRegistry, Vocabulary};
}
