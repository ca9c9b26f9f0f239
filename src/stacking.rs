//! Stacking sparse grids into a point axis and unstacking them back
//!
//! `stack_drop_nans` compacts the dimensions covered by a boolean mask into
//! a single axis holding only the valid points, remembering enough metadata
//! (per-point coordinates and the original shape) for `unstack_fill_nan` to
//! rebuild the full grid later, with masked-out points restored as NaN.

use crate::calendar::{get_calendar, translate_time_chunk, ChunkValue};
use crate::dataset::{AttrMap, AttrValue, Coord, CoordData, CoordKey, DataArray, Dataset};
use crate::errors::{Result, WrangleError};
use crate::netcdf_io;
use log::{info, warn};
use ndarray::{Array2, ArrayD, Axis};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// A boolean mask aligned to a subset of a dataset's dimensions
///
/// True marks the points to keep.
#[derive(Debug, Clone)]
pub struct Mask {
    pub dims: Vec<String>,
    pub values: ArrayD<bool>,
}

impl Mask {
    pub fn new(dims: Vec<String>, values: ArrayD<bool>) -> Result<Self> {
        if dims.len() != values.ndim() {
            return Err(WrangleError::InvalidStack {
                message: format!(
                    "mask has {} dimension names but array rank {}",
                    dims.len(),
                    values.ndim()
                ),
            });
        }
        Ok(Self { dims, values })
    }

    /// Dimension sizes joined by "x", e.g. "10x20"
    pub fn shape_string(&self) -> String {
        self.values
            .shape()
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join("x")
    }

    /// Row-major flat indices of the retained points
    fn kept_indices(&self) -> Vec<usize> {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| if keep { Some(i) } else { None })
            .collect()
    }
}

/// Options for [`stack_drop_nans`]
#[derive(Debug, Clone)]
pub struct StackOptions {
    /// Name of the new stacked dimension
    pub new_dim: String,
    /// Path template for the side-car coordinate file, with `{domain}` and
    /// `{shape}` placeholders
    pub to_file: Option<String>,
}

impl Default for StackOptions {
    fn default() -> Self {
        Self {
            new_dim: "loc".to_string(),
            to_file: None,
        }
    }
}

/// Stack the mask's dimensions into a single axis and drop points where the
/// mask is false.
///
/// Every retained point keeps its original per-dimension coordinate values
/// as auxiliary coordinates on the new axis, and each of those coordinates
/// records the original shape ("10x20") in its attributes so the inverse
/// operation can rebuild the grid. With `to_file`, the full coordinates of
/// the mask dimensions are also written to a coords-only NetCDF file for
/// [`unstack_fill_nan`] to pick up.
pub fn stack_drop_nans(ds: &Dataset, mask: &Mask, opts: &StackOptions) -> Result<Dataset> {
    let original_shape = mask.shape_string();
    let kept = mask.kept_indices();
    let mask_shape = mask.values.shape().to_vec();
    info!(
        "Stacking {:?} into '{}': keeping {} of {} points",
        mask.dims,
        opts.new_dim,
        kept.len(),
        mask.values.len()
    );

    let mut out = Dataset::new();
    out.attrs = ds.attrs.clone();

    for (name, var) in &ds.data_vars {
        let present: Vec<&String> = mask.dims.iter().filter(|d| var.axis_of(d).is_some()).collect();
        if present.is_empty() {
            out.add_var(name.clone(), var.clone());
            continue;
        }
        if present.len() != mask.dims.len() {
            return Err(WrangleError::InvalidStack {
                message: format!(
                    "variable '{}' spans only part of the mask dimensions {:?}",
                    name, mask.dims
                ),
            });
        }
        for (dim, &len) in mask.dims.iter().zip(&mask_shape) {
            let axis = var.axis_of(dim).unwrap_or_default();
            if var.data.shape()[axis] != len {
                return Err(WrangleError::InvalidStack {
                    message: format!(
                        "dimension '{}' has length {} on variable '{}' but {} on the mask",
                        dim,
                        var.data.shape()[axis],
                        name,
                        len
                    ),
                });
            }
        }

        let stacked = stack_array(var, &mask.dims, &kept)?;
        let mut dims: Vec<String> = var
            .dims
            .iter()
            .filter(|d| !mask.dims.contains(d))
            .cloned()
            .collect();
        dims.push(opts.new_dim.clone());
        let mut new_var = DataArray::new(dims, stacked)?;
        new_var.attrs = var.attrs.clone();
        out.add_var(name.clone(), new_var);
    }

    // point coordinates of the retained locations, plus shape bookkeeping
    let strides = row_major_strides(&mask_shape);
    for (k, dim) in mask.dims.iter().enumerate() {
        let source = dim_coord_or_index(ds, dim, mask_shape[k]);
        let per_dim: Vec<usize> = kept
            .iter()
            .map(|&flat| (flat / strides[k]) % mask_shape[k])
            .collect();
        let mut attrs = source.attrs.clone();
        attrs.set("original_shape", original_shape.as_str());
        out.set_coord(
            dim.clone(),
            Coord {
                dims: vec![opts.new_dim.clone()],
                values: source.values.select(&per_dim),
                attrs,
            },
        );
    }
    for (name, coord) in &ds.coords {
        if !mask.dims.contains(name) {
            out.set_coord(name.clone(), coord.clone());
        }
    }

    if let Some(template) = &opts.to_file {
        let domain = ds.attrs.get_text("cat:domain").unwrap_or("unknown");
        let path = template
            .replace("{domain}", domain)
            .replace("{shape}", &original_shape);
        let path = Path::new(&path);
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let coords: Vec<(String, CoordData, AttrMap)> = mask
            .dims
            .iter()
            .enumerate()
            .map(|(k, dim)| {
                let c = dim_coord_or_index(ds, dim, mask_shape[k]);
                (dim.clone(), c.values, c.attrs)
            })
            .collect();
        netcdf_io::write_coords_file(path, &coords)?;
        info!("Stacked coordinates written to {}", path.display());
    }

    Ok(out)
}

/// Where the per-point coordinates for an unstack come from
#[derive(Debug, Clone)]
pub enum CoordsSource {
    /// Names of coordinate variables present on the stacked dataset
    Names(Vec<String>),
    /// Per-point coordinate arrays supplied directly
    Values(Vec<(String, CoordData)>),
    /// A side-car file written by [`stack_drop_nans`]; `{domain}` and
    /// `{shape}` are resolved from the dataset
    File(String),
}

/// Options for [`unstack_fill_nan`]
#[derive(Debug, Clone)]
pub struct UnstackOptions {
    /// The stacked dimension to expand
    pub dim: String,
    pub coords: Option<CoordsSource>,
}

impl Default for UnstackOptions {
    fn default() -> Self {
        Self {
            dim: "loc".to_string(),
            coords: None,
        }
    }
}

/// Unstack a dataset that was stacked by [`stack_drop_nans`].
///
/// The stacked axis is expanded back into its original dimensions using the
/// per-point coordinates; combinations dropped by the mask come back as NaN.
/// When the coordinates come from a side-car file, the result is reindexed
/// onto the file's full coordinate ranges.
pub fn unstack_fill_nan(ds: &Dataset, opts: &UnstackOptions) -> Result<Dataset> {
    let dim = opts.dim.as_str();
    let npoints = ds.dim_len(dim).ok_or_else(|| WrangleError::DimensionNotFound {
        var: "<dataset>".to_string(),
        dim: dim.to_string(),
    })?;

    // resolve the per-point coordinate arrays
    let point_coords: Vec<(String, CoordData, AttrMap)> = match &opts.coords {
        Some(CoordsSource::Names(names)) => {
            let mut resolved = Vec::new();
            for name in names {
                let coord = ds
                    .coord(name)
                    .ok_or_else(|| WrangleError::VariableNotFound { var: name.clone() })?;
                resolved.push((name.clone(), coord.values.clone(), coord.attrs.clone()));
            }
            resolved
        }
        Some(CoordsSource::Values(pairs)) => pairs
            .iter()
            .map(|(name, values)| (name.clone(), values.clone(), AttrMap::new()))
            .collect(),
        _ => {
            if opts.coords.is_none() {
                info!("Dataset unstacked using no coords argument.");
            }
            ds.coords
                .iter()
                .filter(|(_, c)| c.dims == [dim])
                .map(|(name, c)| (name.clone(), c.values.clone(), c.attrs.clone()))
                .collect()
        }
    };
    if point_coords.is_empty() {
        return Err(WrangleError::InvalidStack {
            message: format!("no coordinates found along stacked dimension '{}'", dim),
        });
    }
    for (name, values, _) in &point_coords {
        if values.len() != npoints {
            return Err(WrangleError::InvalidStack {
                message: format!(
                    "coordinate '{}' has {} points but dimension '{}' has {}",
                    name,
                    values.len(),
                    dim,
                    npoints
                ),
            });
        }
    }

    // levels in order of first appearance, and each point's grid position
    let mut levels: Vec<CoordData> = Vec::new();
    let mut point_level: Vec<Vec<usize>> = Vec::new();
    for (_, values, _) in &point_coords {
        let mut seen: HashMap<CoordKey, usize> = HashMap::new();
        let mut level = values.empty_like();
        let mut positions = Vec::with_capacity(npoints);
        for i in 0..npoints {
            let key = values.key(i);
            let next = seen.len();
            let pos = *seen.entry(key).or_insert_with(|| {
                level.push_from(values, i);
                next
            });
            positions.push(pos);
        }
        levels.push(level);
        point_level.push(positions);
    }
    let grid_shape: Vec<usize> = levels.iter().map(CoordData::len).collect();
    let grid_strides = row_major_strides(&grid_shape);
    let grid_pos: Vec<usize> = (0..npoints)
        .map(|p| {
            point_level
                .iter()
                .zip(&grid_strides)
                .map(|(positions, stride)| positions[p] * stride)
                .sum()
        })
        .collect();

    let mut out = Dataset::new();
    out.attrs = ds.attrs.clone();
    let new_dims: Vec<String> = point_coords.iter().map(|(name, ..)| name.clone()).collect();

    for (name, var) in &ds.data_vars {
        match var.axis_of(dim) {
            None => out.add_var(name.clone(), var.clone()),
            Some(_) => {
                let expanded = unstack_array(var, dim, &grid_shape, &grid_pos)?;
                let mut dims: Vec<String> =
                    var.dims.iter().filter(|d| *d != dim).cloned().collect();
                dims.extend(new_dims.iter().cloned());
                let mut new_var = DataArray::new(dims, expanded)?;
                new_var.attrs = var.attrs.clone();
                out.add_var(name.clone(), new_var);
            }
        }
    }

    for ((name, _, attrs), level) in point_coords.iter().zip(levels) {
        let mut coord = Coord::new(name.clone(), level);
        coord.attrs.update(attrs);
        out.set_coord(name.clone(), coord);
    }
    for (name, coord) in &ds.coords {
        if coord.dims.contains(&dim.to_string()) {
            if !new_dims.contains(name) {
                warn!("Dropping leftover coordinate '{}' on stacked dimension", name);
            }
            continue;
        }
        out.set_coord(name.clone(), coord.clone());
    }

    if let Some(CoordsSource::File(template)) = &opts.coords {
        let original_shape = ds
            .coords
            .values()
            .find_map(|c| c.attrs.get_text("original_shape"))
            .unwrap_or("unknown");
        let domain = ds.attrs.get_text("cat:domain").unwrap_or("unknown");
        let path = template
            .replace("{domain}", domain)
            .replace("{shape}", original_shape);
        info!("Dataset unstacked using {}.", path);
        let file_coords = netcdf_io::read_coords_file(Path::new(&path))?;
        for (name, values, _) in &file_coords {
            if new_dims.contains(name) {
                out = reindex_dim(&out, name, values)?;
            }
        }
    }

    Ok(out)
}

/// Options for [`maybe_unstack`]
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MaybeUnstackOptions {
    /// Side-car coordinate file template for the unstack
    pub coords: Option<String>,
    /// Storage-layout hint applied after unstacking
    pub rechunk: Option<HashMap<String, ChunkValue>>,
    /// Whether the dataset was stacked in the first place
    pub stack_drop_nans: bool,
}

/// If the dataset was stacked, unstack it and attach the rechunk hint.
///
/// Chunking itself belongs to the storage layer; the translated hint is
/// recorded as `_chunk_hint:<dim>` global attributes.
pub fn maybe_unstack(ds: &Dataset, opts: &MaybeUnstackOptions) -> Result<Dataset> {
    if !opts.stack_drop_nans {
        return Ok(ds.clone());
    }
    let unstack_opts = UnstackOptions {
        dim: "loc".to_string(),
        coords: opts.coords.clone().map(CoordsSource::File),
    };
    let mut out = unstack_fill_nan(ds, &unstack_opts)?;
    if let Some(rechunk) = &opts.rechunk {
        let timesize = out.dim_len("time").unwrap_or(0);
        let translated = translate_time_chunk(rechunk, get_calendar(&out), timesize);
        for (dimname, value) in &translated {
            if let ChunkValue::Count(n) = value {
                out.attrs
                    .set(format!("_chunk_hint:{}", dimname), AttrValue::Int(*n as i64));
            }
        }
    }
    Ok(out)
}

/// Move the mask dimensions to the end, flatten them and keep `kept` points
fn stack_array(var: &DataArray, mask_dims: &[String], kept: &[usize]) -> Result<ArrayD<f64>> {
    let other_axes: Vec<usize> = (0..var.dims.len())
        .filter(|&i| !mask_dims.contains(&var.dims[i]))
        .collect();
    let mask_axes: Vec<usize> = mask_dims
        .iter()
        .filter_map(|d| var.axis_of(d))
        .collect();

    let mut perm: Vec<usize> = other_axes.clone();
    perm.extend(&mask_axes);
    let permuted = var.data.clone().permuted_axes(perm);
    let contiguous = permuted.as_standard_layout().to_owned();

    let other_shape: Vec<usize> = other_axes.iter().map(|&a| var.data.shape()[a]).collect();
    let flat: usize = mask_axes.iter().map(|&a| var.data.shape()[a]).product();
    let mut stacked_shape = other_shape;
    stacked_shape.push(flat);
    let reshaped = contiguous.into_shape(stacked_shape)?;
    Ok(reshaped.select(Axis(reshaped.ndim() - 1), kept))
}

/// Scatter the stacked axis back onto the full grid, NaN elsewhere
fn unstack_array(
    var: &DataArray,
    dim: &str,
    grid_shape: &[usize],
    grid_pos: &[usize],
) -> Result<ArrayD<f64>> {
    let dim_axis = var.axis_of(dim).ok_or_else(|| WrangleError::DimensionNotFound {
        var: "<stacked>".to_string(),
        dim: dim.to_string(),
    })?;
    let other_axes: Vec<usize> = (0..var.dims.len()).filter(|&i| i != dim_axis).collect();
    let mut perm = other_axes.clone();
    perm.push(dim_axis);
    let permuted = var.data.clone().permuted_axes(perm);
    let contiguous = permuted.as_standard_layout().to_owned();

    let other_shape: Vec<usize> = other_axes.iter().map(|&a| var.data.shape()[a]).collect();
    let other_flat: usize = other_shape.iter().product();
    let npoints = var.data.shape()[dim_axis];
    let grid_flat: usize = grid_shape.iter().product();

    let flat_in: Array2<f64> = contiguous.into_shape((other_flat, npoints))?;
    let mut flat_out = Array2::<f64>::from_elem((other_flat, grid_flat), f64::NAN);
    for (p, &pos) in grid_pos.iter().enumerate() {
        flat_out.column_mut(pos).assign(&flat_in.column(p));
    }

    let mut final_shape = other_shape;
    final_shape.extend_from_slice(grid_shape);
    Ok(flat_out.into_shape(final_shape)?)
}

/// Reindex one dimension onto the given full coordinate values, filling
/// combinations absent from the current coordinate with NaN
fn reindex_dim(ds: &Dataset, dim: &str, full: &CoordData) -> Result<Dataset> {
    let current = ds
        .coord(dim)
        .ok_or_else(|| WrangleError::VariableNotFound {
            var: dim.to_string(),
        })?
        .clone();
    let position: HashMap<CoordKey, usize> = (0..current.len())
        .map(|i| (current.values.key(i), i))
        .collect();
    let mapping: Vec<Option<usize>> = (0..full.len())
        .map(|i| position.get(&full.key(i)).copied())
        .collect();

    let mut out = ds.clone();
    for (name, var) in &ds.data_vars {
        if let Some(axis) = var.axis_of(dim) {
            let mut shape = var.data.shape().to_vec();
            shape[axis] = full.len();
            let mut data = ArrayD::from_elem(shape, f64::NAN);
            for (new_index, old_index) in mapping.iter().enumerate() {
                if let Some(old_index) = *old_index {
                    data.index_axis_mut(Axis(axis), new_index)
                        .assign(&var.data.index_axis(Axis(axis), old_index));
                }
            }
            out.var_mut(name)?.data = data;
        }
    }
    out.set_coord(
        dim.to_string(),
        Coord::with_attrs(dim, full.clone(), current.attrs),
    );
    Ok(out)
}

/// The coordinate of a dimension, or synthesized 0..n integer indices
fn dim_coord_or_index(ds: &Dataset, dim: &str, len: usize) -> Coord {
    match ds.coord(dim) {
        Some(c) if c.dims == [dim] => c.clone(),
        _ => Coord::new(dim, CoordData::Int((0..len as i64).collect())),
    }
}

fn row_major_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for k in (0..shape.len().saturating_sub(1)).rev() {
        strides[k] = strides[k + 1] * shape[k + 1];
    }
    strides
}
