//! Dataset clean-up pipeline
//!
//! [`clean_up`] chains the wrangling steps a dataset goes through before
//! being written to its final home: unit conversion, calendar conversion
//! with missing-value handling, unstacking, rounding, and a series of
//! attribute normalization stages. Every stage is optional and driven by
//! its configuration block; the stage order is fixed because later stages
//! depend on attributes produced by earlier ones.

use crate::calendar::{
    convert_calendar, diff_days, get_calendar, AlignOn, Calendar, ConvertCalendarOptions,
};
use crate::catalog::{self, CATALOG_PREFIX};
use crate::dataset::Dataset;
use crate::errors::{Result, WrangleError};
use crate::netcdf_io;
use crate::stacking::{maybe_unstack, MaybeUnstackOptions};
use crate::units::change_units;
use ndarray::{ArrayD, ArrayViewMut1, Axis};
use log::info;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// Numeric stand-in for "missing" while a calendar conversion runs
const MISSING_SENTINEL: f64 = -9999.0;

/// Calendar-conversion block of [`CleanUpConfig`]
#[derive(Debug, Clone, Deserialize)]
pub struct ConvertCalendarConfig {
    pub target: Calendar,
    #[serde(default)]
    pub align_on: Option<AlignOn>,
    #[serde(default)]
    pub missing: Option<f64>,
}

/// Per-variable policy for time steps created by a calendar conversion
#[derive(Debug, Clone, PartialEq)]
pub enum MissingVarPolicy {
    /// Linearly interpolate over time
    Interpolate,
    /// Substitute this value
    Fill(f64),
}

impl<'de> Deserialize<'de> for MissingVarPolicy {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match &value {
            serde_json::Value::String(s) if s == "interpolate" => Ok(MissingVarPolicy::Interpolate),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(MissingVarPolicy::Fill)
                .ok_or_else(|| serde::de::Error::custom("fill value must be finite")),
            _ => Err(serde::de::Error::custom(
                "expected \"interpolate\" or a fill value",
            )),
        }
    }
}

/// A dataset used by the common-attributes reduction: either already open
/// or a path to a NetCDF file
#[derive(Debug, Clone)]
pub enum CommonAttrsSource {
    InMemory(Box<Dataset>),
    Path(PathBuf),
}

impl<'de> Deserialize<'de> for CommonAttrsSource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let path = String::deserialize(deserializer)?;
        Ok(CommonAttrsSource::Path(PathBuf::from(path)))
    }
}

/// Configuration of [`clean_up`]; unset blocks disable their stage
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CleanUpConfig {
    /// Target units per variable, e.g. {"tasmax": "degC", "pr": "mm d-1"}
    pub variables_and_units: Option<BTreeMap<String, String>>,
    /// Calendar conversion, applied to every variable
    pub convert_calendar: Option<ConvertCalendarConfig>,
    /// Per-variable replacement of time steps created by the calendar
    /// conversion; must cover every data variable when given
    pub missing_by_var: Option<BTreeMap<String, MissingVarPolicy>>,
    /// Unstack settings, see [`MaybeUnstackOptions`]
    pub maybe_unstack: Option<MaybeUnstackOptions>,
    /// Decimal digits to round each variable to
    pub round_var: Option<BTreeMap<String, i32>>,
    /// Keep only global attributes identical across all these datasets
    pub common_attrs_only: Option<Vec<CommonAttrsSource>>,
    /// Attribute patterns to remove, per variable or "global"
    pub attrs_to_remove: Option<BTreeMap<String, Vec<String>>>,
    /// Attribute patterns to keep, everything else removed
    pub remove_all_attrs_except: Option<BTreeMap<String, Vec<String>>>,
    /// Attributes to add or overwrite, per variable or "global"
    pub add_attrs: Option<BTreeMap<String, BTreeMap<String, String>>>,
    /// Replacement for the "cat:" prefix in global attribute keys
    pub change_attr_prefix: Option<String>,
    /// Processing level to assign to the output
    pub to_level: Option<String>,
}

/// Check an attribute name against an intake-esm style pattern.
///
/// A trailing `*` checks for a contained substring, a leading `^` for a
/// prefix; anything else must match exactly.
pub fn pattern_matches(pattern: &str, name: &str) -> bool {
    if let Some(substring) = pattern.strip_suffix('*') {
        return name.contains(substring);
    }
    if let Some(prefix) = pattern.strip_prefix('^') {
        return name.starts_with(prefix);
    }
    pattern == name
}

/// Clean up a dataset.
///
/// Runs, in this order: unit conversion, calendar conversion (with
/// always-missing re-masking and per-variable missing policies),
/// unstacking, rounding, common-attributes reduction with identifier
/// regeneration, processing-level assignment, attribute removal, inverse
/// removal, attribute addition and catalog-prefix rewrite. Stages without
/// configuration are skipped.
pub fn clean_up(mut ds: Dataset, config: &CleanUpConfig) -> Result<Dataset> {
    if let Some(variables_and_units) = &config.variables_and_units {
        info!("Converting units: {:?}", variables_and_units);
        change_units(&mut ds, variables_and_units)?;
    }

    if let Some(calendar_config) = &config.convert_calendar {
        // grid points that are missing across the whole timeseries must
        // stay missing after the conversion
        let always_missing = always_missing_mask(&ds);

        let mut opts = ConvertCalendarOptions {
            target: calendar_config.target,
            align_on: calendar_config.align_on,
            missing: calendar_config.missing,
        };
        if let Some(policies) = &config.missing_by_var {
            let uncovered: Vec<String> = ds
                .data_vars
                .keys()
                .filter(|name| !policies.contains_key(*name))
                .cloned()
                .collect();
            if !uncovered.is_empty() {
                return Err(WrangleError::MissingPolicyGap { vars: uncovered });
            }
            opts.missing = Some(MISSING_SENTINEL);
        }
        if get_calendar(&ds) == Calendar::Day360 && opts.align_on.is_none() {
            opts.align_on = Some(AlignOn::Random);
        }

        info!("Converting calendar with {:?}", opts);
        ds = convert_calendar(&ds, &opts)?;
        reapply_missing_mask(&mut ds, &always_missing);

        if let Some(policies) = &config.missing_by_var {
            for (name, policy) in policies {
                if !ds.data_vars.contains_key(name) {
                    continue;
                }
                info!("Filling missing {} with {:?}", name, policy);
                match policy {
                    MissingVarPolicy::Interpolate => {
                        ds.var_mut(name)?.data.mapv_inplace(|v| {
                            if v == MISSING_SENTINEL {
                                f64::NAN
                            } else {
                                v
                            }
                        });
                        interpolate_na_time(&mut ds, name)?;
                    }
                    MissingVarPolicy::Fill(fill) => {
                        // in-place substitution keeps the attributes intact
                        let fill = *fill;
                        ds.var_mut(name)?.data.mapv_inplace(|v| {
                            if v == MISSING_SENTINEL {
                                fill
                            } else {
                                v
                            }
                        });
                    }
                }
            }
        }
    }

    if let Some(unstack_opts) = &config.maybe_unstack {
        ds = maybe_unstack(&ds, unstack_opts)?;
    }

    if let Some(round_var) = &config.round_var {
        for (name, digits) in round_var {
            let scale = 10f64.powi(*digits);
            ds.var_mut(name)?
                .data
                .mapv_inplace(|v| (v * scale).round() / scale);
        }
    }

    if let Some(sources) = &config.common_attrs_only {
        for source in sources {
            let other = match source {
                CommonAttrsSource::InMemory(other) => (**other).clone(),
                CommonAttrsSource::Path(path) => netcdf_io::read_dataset(path)?,
            };
            let keys: Vec<String> = ds.attrs.keys().cloned().collect();
            for key in keys {
                let date_range = key == "cat:date_start" || key == "cat:date_end";
                let shared = other.attrs.get(&key) == ds.attrs.get(&key);
                if date_range || !shared {
                    ds.attrs.remove(&key);
                }
            }
        }
        let id = catalog::generate_id(&ds);
        ds.attrs.set("cat:id", id);
    }

    if let Some(level) = &config.to_level {
        ds.attrs.set("cat:processing_level", level.as_str());
    }

    if let Some(removals) = &config.attrs_to_remove {
        for (scope, patterns) in removals {
            let attrs = ds.attrs_scope_mut(scope)?;
            attrs.retain(|key, _| !patterns.iter().any(|p| pattern_matches(p, key)));
        }
    }

    if let Some(keepers) = &config.remove_all_attrs_except {
        for (scope, patterns) in keepers {
            let attrs = ds.attrs_scope_mut(scope)?;
            attrs.retain(|key, _| patterns.iter().any(|p| pattern_matches(p, key)));
        }
    }

    if let Some(additions) = &config.add_attrs {
        for (scope, new_attrs) in additions {
            let attrs = ds.attrs_scope_mut(scope)?;
            for (key, value) in new_attrs {
                attrs.set(key.as_str(), value.as_str());
            }
        }
    }

    if let Some(prefix) = &config.change_attr_prefix {
        let keys: Vec<String> = ds.attrs.keys().cloned().collect();
        for key in keys {
            let new_key = key.replace(CATALOG_PREFIX, prefix);
            if new_key == key {
                continue;
            }
            let value = ds.attrs.remove(&key);
            if !new_key.is_empty() {
                if let Some(value) = value {
                    ds.attrs.set(new_key, value);
                }
            }
        }
    }

    Ok(ds)
}

/// Per-variable mask of grid points that are NaN at every time step
fn always_missing_mask(ds: &Dataset) -> HashMap<String, ArrayD<bool>> {
    let mut masks = HashMap::new();
    for (name, var) in &ds.data_vars {
        if let Some(axis) = var.axis_of("time") {
            let mask = var
                .data
                .map_axis(Axis(axis), |lane| lane.iter().all(|v| v.is_nan()));
            masks.insert(name.clone(), mask);
        }
    }
    masks
}

/// Restore NaN on the always-missing points of each variable
fn reapply_missing_mask(ds: &mut Dataset, masks: &HashMap<String, ArrayD<bool>>) {
    for (name, mask) in masks {
        if let Some(var) = ds.data_vars.get_mut(name) {
            if let Some(axis) = var.axis_of("time") {
                let steps = var.data.shape()[axis];
                for t in 0..steps {
                    var.data
                        .index_axis_mut(Axis(axis), t)
                        .zip_mut_with(mask, |value, &missing| {
                            if missing {
                                *value = f64::NAN;
                            }
                        });
                }
            }
        }
    }
}

/// Linearly interpolate NaN gaps of one variable along the time axis.
///
/// Interior gaps are filled from the surrounding valid points weighted by
/// the actual time offsets; leading and trailing gaps are left as NaN.
fn interpolate_na_time(ds: &mut Dataset, var_name: &str) -> Result<()> {
    let calendar = get_calendar(ds);
    let times = ds.time()?;
    let reference = times[0];
    let offsets: Vec<f64> = times
        .iter()
        .map(|t| diff_days(calendar, *t, reference) as f64)
        .collect();

    let var = ds.var_mut(var_name)?;
    let axis = var
        .axis_of("time")
        .ok_or_else(|| WrangleError::DimensionNotFound {
            var: var_name.to_string(),
            dim: "time".to_string(),
        })?;
    for mut lane in var.data.lanes_mut(Axis(axis)) {
        interpolate_lane(&mut lane, &offsets);
    }
    Ok(())
}

fn interpolate_lane(lane: &mut ArrayViewMut1<f64>, x: &[f64]) {
    let valid: Vec<usize> = (0..lane.len()).filter(|&i| !lane[i].is_nan()).collect();
    if valid.len() < 2 {
        return;
    }
    for i in 0..lane.len() {
        if !lane[i].is_nan() {
            continue;
        }
        let after = valid.partition_point(|&v| v < i);
        if after == 0 || after == valid.len() {
            continue;
        }
        let lo = valid[after - 1];
        let hi = valid[after];
        let weight = (x[i] - x[lo]) / (x[hi] - x[lo]);
        lane[i] = lane[lo] * (1.0 - weight) + lane[hi] * weight;
    }
}
