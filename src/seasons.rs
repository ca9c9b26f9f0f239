//! Unstacking a multi-season timeseries into yearly and seasonal axes

use crate::calendar::{get_calendar, infer_freq, CfDate, FreqBase, MONTH_ABBREVIATIONS, MONTH_INITIALS};
use crate::dataset::{Coord, CoordData, DataArray, Dataset};
use crate::errors::{Result, WrangleError};
use log::{info, warn};
use ndarray::{Array2, ArrayD, Axis};
use std::collections::BTreeMap;

/// Build the season map for an N-month season length anchored on the months
/// actually present (quarterly anchored in December yields DJF MAM JJA SON)
fn compound_labels(months_present: &[u32], n: usize) -> BTreeMap<String, String> {
    let mut seasons = BTreeMap::new();
    for &m in months_present {
        let label: String = (0..n)
            .map(|offset| MONTH_INITIALS[(m as usize - 1 + offset) % 12])
            .collect();
        seasons.insert(format!("{:02}-01", m), label);
    }
    seasons
}

/// Infer a season map from the time coordinate's sampling frequency.
///
/// Monthly data maps month starts to month abbreviations, N-monthly and
/// quarterly data to compound month-initial labels, annual data to
/// "annual" (January anchor) or "annual-{ABB}". Any other frequency is an
/// error; the caller must pass an explicit map.
pub fn infer_season_map(ds: &Dataset) -> Result<BTreeMap<String, String>> {
    let times = ds.time()?;
    let calendar = get_calendar(ds);
    let freq = infer_freq(times, calendar).ok_or_else(|| WrangleError::FrequencyUnsupported {
        freq: "irregular".to_string(),
    })?;

    match (freq.base, freq.mult) {
        (FreqBase::Month, 1) => Ok(MONTH_ABBREVIATIONS
            .iter()
            .enumerate()
            .map(|(i, abb)| (format!("{:02}-01", i + 1), (*abb).to_string()))
            .collect()),
        (FreqBase::Month, n) => {
            let mut months: Vec<u32> = times.iter().map(|t| t.month).collect();
            months.sort_unstable();
            months.dedup();
            Ok(compound_labels(&months, n))
        }
        (FreqBase::Year, _) => {
            let mut seasons: BTreeMap<String, String> = MONTH_ABBREVIATIONS
                .iter()
                .enumerate()
                .map(|(i, abb)| (format!("{:02}-01", i + 1), format!("annual-{}", abb)))
                .collect();
            seasons.insert("01-01".to_string(), "annual".to_string());
            Ok(seasons)
        }
        (FreqBase::Day, _) => Err(WrangleError::FrequencyUnsupported {
            freq: freq.to_string(),
        }),
    }
}

/// Unstack a multi-season timeseries into a yearly axis and a season one.
///
/// The time axis becomes yearly (year starts) and the season labels go on
/// `new_dim`. Season order follows the chronological order of each label's
/// first "MM-DD" key, so DJF sorts before MAM. Every "MM-DD" present in
/// the data must be a key of the season map.
pub fn unstack_dates(
    ds: &Dataset,
    seasons: Option<&BTreeMap<String, String>>,
    new_dim: &str,
) -> Result<Dataset> {
    let inferred;
    let seasons = match seasons {
        Some(map) => map,
        None => {
            inferred = infer_season_map(ds)?;
            &inferred
        }
    };
    let times = ds.time()?.to_vec();

    // per-timestamp (year, label) assignment
    let mut labels = Vec::with_capacity(times.len());
    for t in &times {
        let key = t.mmdd();
        let label = seasons
            .get(&key)
            .ok_or(WrangleError::SeasonKeyMissing { key })?;
        labels.push(label.clone());
    }

    let mut years: Vec<i32> = times.iter().map(|t| t.year).collect();
    years.dedup();
    let year_pos: BTreeMap<i32, usize> = years.iter().enumerate().map(|(i, &y)| (y, i)).collect();

    // season levels ordered by their first occurrence along the time axis,
    // so DJF of a December-anchored series comes before MAM
    let mut season_levels: Vec<String> = Vec::new();
    for label in &labels {
        if !season_levels.contains(label) {
            season_levels.push(label.clone());
        }
    }
    let season_pos: BTreeMap<&str, usize> = season_levels
        .iter()
        .enumerate()
        .map(|(i, s)| (s.as_str(), i))
        .collect();

    info!(
        "Unstacking time axis into {} years × {} seasons ({})",
        years.len(),
        season_levels.len(),
        season_levels.join(", ")
    );

    let nyears = years.len();
    let nseasons = season_levels.len();
    let mut grid_pos = Vec::with_capacity(times.len());
    let mut occupied = vec![false; nyears * nseasons];
    for (t, label) in times.iter().zip(&labels) {
        let pos = year_pos[&t.year] * nseasons + season_pos[label.as_str()];
        if occupied[pos] {
            return Err(WrangleError::InvalidStack {
                message: format!(
                    "two time steps map to year {} season '{}'",
                    t.year, label
                ),
            });
        }
        occupied[pos] = true;
        grid_pos.push(pos);
    }

    let mut out = Dataset::new();
    out.attrs = ds.attrs.clone();
    for (name, var) in &ds.data_vars {
        match var.axis_of("time") {
            None => out.add_var(name.clone(), var.clone()),
            Some(axis) => {
                let expanded = expand_time(var, axis, nyears, nseasons, &grid_pos)?;
                let mut dims: Vec<String> =
                    var.dims.iter().filter(|d| *d != "time").cloned().collect();
                dims.push("time".to_string());
                dims.push(new_dim.to_string());
                let mut new_var = DataArray::new(dims, expanded)?;
                new_var.attrs = var.attrs.clone();
                out.add_var(name.clone(), new_var);
            }
        }
    }

    for (name, coord) in &ds.coords {
        if name == "time" {
            continue;
        }
        if coord.dims == ["time"] {
            warn!("Dropping auxiliary time coordinate '{}'", name);
            continue;
        }
        out.set_coord(name.clone(), coord.clone());
    }
    let time_attrs = ds.coords.get("time").map(|c| c.attrs.clone()).unwrap_or_default();
    out.set_coord(
        "time",
        Coord::with_attrs(
            "time",
            CoordData::Time(years.iter().map(|&y| CfDate::new(y, 1, 1)).collect()),
            time_attrs,
        ),
    );
    out.set_coord(new_dim, Coord::new(new_dim, CoordData::Text(season_levels)));

    Ok(out)
}

/// Expand the time axis of one variable into (year, season)
fn expand_time(
    var: &DataArray,
    time_axis: usize,
    nyears: usize,
    nseasons: usize,
    grid_pos: &[usize],
) -> Result<ArrayD<f64>> {
    let other_axes: Vec<usize> = (0..var.dims.len()).filter(|&i| i != time_axis).collect();
    let mut perm = other_axes.clone();
    perm.push(time_axis);
    let contiguous = var
        .data
        .clone()
        .permuted_axes(perm)
        .as_standard_layout()
        .to_owned();

    let other_shape: Vec<usize> = other_axes.iter().map(|&a| var.data.shape()[a]).collect();
    let other_flat: usize = other_shape.iter().product();
    let ntime = var.data.shape()[time_axis];

    let flat_in: Array2<f64> = contiguous.into_shape((other_flat, ntime))?;
    let mut flat_out = Array2::<f64>::from_elem((other_flat, nyears * nseasons), f64::NAN);
    for (t, &pos) in grid_pos.iter().enumerate() {
        flat_out.column_mut(pos).assign(&flat_in.column(t));
    }

    let mut final_shape = other_shape;
    final_shape.push(nyears);
    final_shape.push(nseasons);
    Ok(flat_out.into_shape(final_shape)?)
}
