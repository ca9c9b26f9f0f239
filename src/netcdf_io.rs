//! NetCDF I/O for the labeled dataset model
//!
//! Reads NetCDF files into [`Dataset`] values and writes them back,
//! including the coords-only side-car files exchanged between the stacker
//! and the unstacker. Time coordinates are decoded from day-based CF
//! units, honouring the `calendar` attribute.

use crate::calendar::{add_days, diff_days, Calendar, CfDate};
use crate::dataset::{AttrMap, AttrValue, Coord, CoordData, DataArray, Dataset};
use crate::errors::{Result, WrangleError};
use chrono::Utc;
use log::warn;
use ndarray::ArrayD;
use netcdf::{create, open, AttributeValue};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

const DEFAULT_TIME_UNITS: &str = "days since 1850-01-01";

/// Read a NetCDF file into a [`Dataset`].
///
/// 1-D variables named after their dimension become dimension coordinates;
/// variables listed in any `coordinates` attribute become auxiliary
/// coordinates; everything else is read as an f64 data variable.
pub fn read_dataset(path: &Path) -> Result<Dataset> {
    let file = open(path)?;
    let mut ds = Dataset::new();

    for attr in file.attributes() {
        if let Some(value) = attr_to_value(attr.name(), &attr.value()?) {
            ds.attrs.set(attr.name(), value);
        }
    }

    // names referenced by CF "coordinates" attributes are aux coords
    let mut aux_names: BTreeSet<String> = BTreeSet::new();
    for var in file.variables() {
        if let Some(attr) = var.attribute("coordinates") {
            if let AttributeValue::Str(list) = attr.value()? {
                aux_names.extend(list.split_whitespace().map(str::to_string));
            }
        }
    }

    for var in file.variables() {
        let name = var.name();
        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        let shape: Vec<usize> = var.dimensions().iter().map(netcdf::Dimension::len).collect();

        let mut attrs = AttrMap::new();
        for attr in var.attributes() {
            if attr.name() == "coordinates" {
                continue;
            }
            if let Some(value) = attr_to_value(attr.name(), &attr.value()?) {
                attrs.set(attr.name(), value);
            }
        }

        let is_dim_coord = dims.len() == 1 && dims[0] == name;
        if is_dim_coord || aux_names.contains(&name) {
            let values = read_coord_values(&var, &attrs)?;
            ds.set_coord(
                name.clone(),
                Coord {
                    dims,
                    values,
                    attrs,
                },
            );
        } else {
            let values = var.get_values::<f64, _>(..)?;
            let data = ArrayD::from_shape_vec(shape, values)?;
            let mut array = DataArray::new(dims, data)?;
            array.attrs = attrs;
            ds.add_var(name, array);
        }
    }

    Ok(ds)
}

/// Write a [`Dataset`] to a NetCDF file, replacing any existing file.
pub fn write_dataset(ds: &Dataset, path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    let mut file = create(path)?;

    for (dim, len) in ds.dims() {
        file.add_dimension(&dim, len)?;
    }

    for (name, coord) in &ds.coords {
        write_coord(&mut file, name, coord)?;
    }

    let aux_list: Vec<String> = ds
        .coords
        .iter()
        .filter(|(name, coord)| coord.dims.len() != 1 || coord.dims[0] != **name)
        .map(|(name, _)| name.clone())
        .collect();

    for (name, var) in &ds.data_vars {
        let dim_refs: Vec<&str> = var.dims.iter().map(String::as_str).collect();
        let mut nc_var = file.add_variable::<f64>(name, &dim_refs)?;
        for (key, value) in var.attrs.iter() {
            put_attr_value(&mut nc_var, key, value)?;
        }
        if !aux_list.is_empty() {
            nc_var.put_attribute("coordinates", aux_list.join(" "))?;
        }
        nc_var.put(var.data.view(), ..)?;
    }

    for (key, value) in ds.attrs.iter() {
        match value {
            AttrValue::Text(s) => file.add_attribute(key, s.as_str())?,
            AttrValue::Float(v) => file.add_attribute(key, *v)?,
            AttrValue::Int(v) => file.add_attribute(key, *v)?,
        };
    }
    file.add_attribute(
        "history",
        format!("Created by ClimWrangle on {}", Utc::now().to_rfc3339()),
    )?;

    Ok(())
}

/// Write a coords-only side-car file for the unstacker.
pub fn write_coords_file(path: &Path, coords: &[(String, CoordData, AttrMap)]) -> Result<()> {
    if path.exists() {
        fs::remove_file(path)?;
    }
    let mut file = create(path)?;
    for (name, values, attrs) in coords {
        file.add_dimension(name, values.len())?;
        let coord = Coord {
            dims: vec![name.clone()],
            values: values.clone(),
            attrs: attrs.clone(),
        };
        write_coord(&mut file, name, &coord)?;
    }
    Ok(())
}

/// Read a coords-only side-car file back.
pub fn read_coords_file(path: &Path) -> Result<Vec<(String, CoordData, AttrMap)>> {
    if !path.exists() {
        return Err(WrangleError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("coordinate file not found: {}", path.display()),
        )));
    }
    let file = open(path)?;
    let mut out = Vec::new();
    for var in file.variables() {
        if var.dimensions().len() != 1 {
            continue;
        }
        let mut attrs = AttrMap::new();
        for attr in var.attributes() {
            if let Some(value) = attr_to_value(attr.name(), &attr.value()?) {
                attrs.set(attr.name(), value);
            }
        }
        let values = read_coord_values(&var, &attrs)?;
        out.push((var.name(), values, attrs));
    }
    Ok(out)
}

fn read_coord_values(var: &netcdf::Variable, attrs: &AttrMap) -> Result<CoordData> {
    // text coordinates round-trip as an index variable plus a labels attr
    if let Some(labels) = attrs.get_text("labels") {
        return Ok(CoordData::Text(
            labels.split(',').map(str::to_string).collect(),
        ));
    }

    if let Some(units) = attrs.get_text("units") {
        if let Some(reference) = parse_time_units(units) {
            let calendar = attrs
                .get_text("calendar")
                .and_then(|name| Calendar::from_name(name).ok())
                .unwrap_or(Calendar::Standard);
            let offsets = var.get_values::<f64, _>(..)?;
            return Ok(CoordData::Time(
                offsets
                    .iter()
                    .map(|&days| add_days(calendar, reference, days.round() as i64))
                    .collect(),
            ));
        }
    }

    // classify the on-disk type from its debug name
    let type_name = format!("{:?}", var.vartype()).to_lowercase();
    if type_name.contains("int") || type_name.contains("short") || type_name.contains("byte") {
        let values = var.get_values::<i64, _>(..)?;
        Ok(CoordData::Int(values))
    } else {
        let values = var.get_values::<f64, _>(..)?;
        Ok(CoordData::Float(values))
    }
}

fn write_coord(file: &mut netcdf::FileMut, name: &str, coord: &Coord) -> Result<()> {
    let dim_refs: Vec<&str> = coord.dims.iter().map(String::as_str).collect();
    match &coord.values {
        CoordData::Float(values) => {
            let mut var = file.add_variable::<f64>(name, &dim_refs)?;
            put_attrs(&mut var, &coord.attrs)?;
            var.put_values(values, ..)?;
        }
        CoordData::Int(values) => {
            let mut var = file.add_variable::<i64>(name, &dim_refs)?;
            put_attrs(&mut var, &coord.attrs)?;
            var.put_values(values, ..)?;
        }
        CoordData::Text(values) => {
            let mut var = file.add_variable::<i64>(name, &dim_refs)?;
            put_attrs(&mut var, &coord.attrs)?;
            var.put_attribute("labels", values.join(","))?;
            let indices: Vec<i64> = (0..values.len() as i64).collect();
            var.put_values(&indices, ..)?;
        }
        CoordData::Time(dates) => {
            let units = coord
                .attrs
                .get_text("units")
                .filter(|u| parse_time_units(u).is_some())
                .unwrap_or(DEFAULT_TIME_UNITS)
                .to_string();
            let reference = parse_time_units(&units).unwrap_or(CfDate::new(1850, 1, 1));
            let calendar = coord
                .attrs
                .get_text("calendar")
                .and_then(|n| Calendar::from_name(n).ok())
                .unwrap_or(Calendar::Standard);
            let offsets: Vec<i64> = dates
                .iter()
                .map(|d| diff_days(calendar, *d, reference))
                .collect();
            let mut var = file.add_variable::<i64>(name, &dim_refs)?;
            put_attrs(&mut var, &coord.attrs)?;
            var.put_attribute("units", units)?;
            var.put_attribute("calendar", calendar.as_str())?;
            var.put_values(&offsets, ..)?;
        }
    }
    Ok(())
}

fn put_attrs(var: &mut netcdf::VariableMut, attrs: &AttrMap) -> Result<()> {
    for (key, value) in attrs.iter() {
        put_attr_value(var, key, value)?;
    }
    Ok(())
}

fn put_attr_value(var: &mut netcdf::VariableMut, key: &str, value: &AttrValue) -> Result<()> {
    match value {
        AttrValue::Text(s) => var.put_attribute(key, s.as_str())?,
        AttrValue::Float(v) => var.put_attribute(key, *v)?,
        AttrValue::Int(v) => var.put_attribute(key, *v)?,
    };
    Ok(())
}

fn attr_to_value(name: &str, value: &AttributeValue) -> Option<AttrValue> {
    match value {
        AttributeValue::Str(s) => Some(AttrValue::Text(s.clone())),
        AttributeValue::Double(v) => Some(AttrValue::Float(*v)),
        AttributeValue::Float(v) => Some(AttrValue::Float(f64::from(*v))),
        AttributeValue::Int(v) => Some(AttrValue::Int(i64::from(*v))),
        AttributeValue::Short(v) => Some(AttrValue::Int(i64::from(*v))),
        AttributeValue::Longlong(v) => Some(AttrValue::Int(*v)),
        AttributeValue::Uchar(v) => Some(AttrValue::Int(i64::from(*v))),
        _ => {
            warn!("Skipped unsupported attribute type for '{}'", name);
            None
        }
    }
}

/// Parse a day-based CF time unit ("days since 1850-01-01 [00:00:00]")
fn parse_time_units(units: &str) -> Option<CfDate> {
    let mut parts = units.split_whitespace();
    let unit = parts.next()?;
    if !unit.starts_with("day") {
        return None;
    }
    if parts.next()? != "since" {
        return None;
    }
    let date = parts.next()?.split('T').next()?;
    let mut fields = date.split('-');
    let year: i32 = fields.next()?.parse().ok()?;
    let month: u32 = fields.next()?.parse().ok()?;
    let day: u32 = fields.next()?.parse().ok()?;
    Some(CfDate::new(year, month, day))
}
