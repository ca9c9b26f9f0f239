//! In-memory labeled dataset model
//!
//! This module provides the labeled multidimensional container the rest of
//! the crate operates on: named dimensions, 1-D coordinate variables, f64
//! data variables and ordered attribute maps at both the global and the
//! per-variable level. It is intentionally small; it only models what the
//! wrangling pipeline needs from a dataset abstraction.

use crate::calendar::CfDate;
use crate::errors::{Result, WrangleError};
use ndarray::ArrayD;
use std::collections::BTreeMap;
use std::fmt;

/// A single attribute value
///
/// Mirrors the subset of NetCDF attribute types the pipeline manipulates.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Text(String),
    Float(f64),
    Int(i64),
}

impl AttrValue {
    /// Borrow the value as text, if it is one
    pub fn as_text(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Text(s) => write!(f, "{}", s),
            AttrValue::Float(v) => write!(f, "{}", v),
            AttrValue::Int(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

/// Insertion-ordered attribute mapping with explicit mutation operations
///
/// The clean-up pipeline mutates attributes in several stages; keeping the
/// map ordered makes the attribute lineage reproducible across runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttrMap {
    entries: Vec<(String, AttrValue)>,
}

impl AttrMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Get an attribute as text, if present and textual
    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(AttrValue::as_text)
    }

    /// Set an attribute, updating in place if the key already exists
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Remove an attribute, returning its value if it was present
    pub fn remove(&mut self, key: &str) -> Option<AttrValue> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    /// Rename an attribute in place, keeping its position and value
    ///
    /// Returns false when the old key does not exist.
    pub fn rename(&mut self, old: &str, new: impl Into<String>) -> bool {
        match self.entries.iter_mut().find(|(k, _)| k == old) {
            Some(entry) => {
                entry.0 = new.into();
                true
            }
            None => false,
        }
    }

    /// Keep only the entries for which the predicate holds
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &AttrValue) -> bool) {
        self.entries.retain(|(k, v)| keep(k, v));
    }

    /// Copy every entry of `other` into this map (last write wins)
    pub fn update(&mut self, other: &AttrMap) {
        for (k, v) in other.iter() {
            self.set(k.clone(), v.clone());
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, AttrValue)> {
        self.entries.iter()
    }
}

impl FromIterator<(String, AttrValue)> for AttrMap {
    fn from_iter<T: IntoIterator<Item = (String, AttrValue)>>(iter: T) -> Self {
        let mut map = AttrMap::new();
        for (k, v) in iter {
            map.set(k, v);
        }
        map
    }
}

/// 1-D coordinate payload
#[derive(Debug, Clone, PartialEq)]
pub enum CoordData {
    Float(Vec<f64>),
    Int(Vec<i64>),
    Text(Vec<String>),
    Time(Vec<CfDate>),
}

/// A hashable view of a single coordinate value
///
/// Floats are keyed by their bit pattern; coordinate arrays in this crate
/// are read from files or constructed explicitly, so bitwise identity is
/// the right equality for level matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CoordKey {
    Float(u64),
    Int(i64),
    Text(String),
    Time(CfDate),
}

impl CoordData {
    pub fn len(&self) -> usize {
        match self {
            CoordData::Float(v) => v.len(),
            CoordData::Int(v) => v.len(),
            CoordData::Text(v) => v.len(),
            CoordData::Time(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Key of the value at index `i`, for level matching
    pub fn key(&self, i: usize) -> CoordKey {
        match self {
            CoordData::Float(v) => CoordKey::Float(v[i].to_bits()),
            CoordData::Int(v) => CoordKey::Int(v[i]),
            CoordData::Text(v) => CoordKey::Text(v[i].clone()),
            CoordData::Time(v) => CoordKey::Time(v[i]),
        }
    }

    /// An empty payload of the same kind
    pub fn empty_like(&self) -> CoordData {
        match self {
            CoordData::Float(_) => CoordData::Float(Vec::new()),
            CoordData::Int(_) => CoordData::Int(Vec::new()),
            CoordData::Text(_) => CoordData::Text(Vec::new()),
            CoordData::Time(_) => CoordData::Time(Vec::new()),
        }
    }

    /// Append the value at `other[i]` to this payload
    ///
    /// Panics when the payload kinds differ; callers pair payloads built
    /// with `empty_like`.
    pub fn push_from(&mut self, other: &CoordData, i: usize) {
        match (self, other) {
            (CoordData::Float(dst), CoordData::Float(src)) => dst.push(src[i]),
            (CoordData::Int(dst), CoordData::Int(src)) => dst.push(src[i]),
            (CoordData::Text(dst), CoordData::Text(src)) => dst.push(src[i].clone()),
            (CoordData::Time(dst), CoordData::Time(src)) => dst.push(src[i]),
            _ => panic!("coordinate payload kind mismatch"),
        }
    }

    /// New payload containing the values at the given indices
    pub fn select(&self, indices: &[usize]) -> CoordData {
        let mut out = self.empty_like();
        for &i in indices {
            out.push_from(self, i);
        }
        out
    }
}

/// A named coordinate variable
#[derive(Debug, Clone, PartialEq)]
pub struct Coord {
    pub dims: Vec<String>,
    pub values: CoordData,
    pub attrs: AttrMap,
}

impl Coord {
    /// 1-D coordinate along a single dimension
    pub fn new(dim: impl Into<String>, values: CoordData) -> Self {
        Self {
            dims: vec![dim.into()],
            values,
            attrs: AttrMap::new(),
        }
    }

    pub fn with_attrs(dim: impl Into<String>, values: CoordData, attrs: AttrMap) -> Self {
        Self {
            dims: vec![dim.into()],
            values,
            attrs,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A labeled N-dimensional data variable
#[derive(Debug, Clone, PartialEq)]
pub struct DataArray {
    pub dims: Vec<String>,
    pub data: ArrayD<f64>,
    pub attrs: AttrMap,
}

impl DataArray {
    /// Create a data variable, checking that dims and array rank agree
    pub fn new(dims: Vec<String>, data: ArrayD<f64>) -> Result<Self> {
        if dims.len() != data.ndim() {
            return Err(WrangleError::Generic(format!(
                "Variable has {} dimension names but array rank {}",
                dims.len(),
                data.ndim()
            )));
        }
        Ok(Self {
            dims,
            data,
            attrs: AttrMap::new(),
        })
    }

    /// Axis index of a named dimension
    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    /// The declared unit of this variable, if any
    pub fn units(&self) -> Option<&str> {
        self.attrs.get_text("units")
    }
}

/// A labeled dataset: data variables, coordinates and global attributes
///
/// Dimension sizes are not stored separately; they are derived from the
/// variables and coordinates that use them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub data_vars: BTreeMap<String, DataArray>,
    pub coords: BTreeMap<String, Coord>,
    pub attrs: AttrMap,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Length of a named dimension, if any variable or coordinate uses it
    pub fn dim_len(&self, dim: &str) -> Option<usize> {
        for var in self.data_vars.values() {
            if let Some(axis) = var.axis_of(dim) {
                return Some(var.data.shape()[axis]);
            }
        }
        for coord in self.coords.values() {
            if coord.dims.len() == 1 && coord.dims[0] == dim {
                return Some(coord.len());
            }
        }
        None
    }

    /// All dimensions with their sizes
    pub fn dims(&self) -> BTreeMap<String, usize> {
        let mut out = BTreeMap::new();
        for var in self.data_vars.values() {
            for (dim, &len) in var.dims.iter().zip(var.data.shape()) {
                out.entry(dim.clone()).or_insert(len);
            }
        }
        for (name, coord) in &self.coords {
            if coord.dims.len() == 1 && coord.dims[0] == *name {
                out.entry(name.clone()).or_insert(coord.len());
            }
        }
        out
    }

    pub fn add_var(&mut self, name: impl Into<String>, var: DataArray) {
        self.data_vars.insert(name.into(), var);
    }

    pub fn var(&self, name: &str) -> Result<&DataArray> {
        self.data_vars
            .get(name)
            .ok_or_else(|| WrangleError::VariableNotFound {
                var: name.to_string(),
            })
    }

    pub fn var_mut(&mut self, name: &str) -> Result<&mut DataArray> {
        self.data_vars
            .get_mut(name)
            .ok_or_else(|| WrangleError::VariableNotFound {
                var: name.to_string(),
            })
    }

    pub fn set_coord(&mut self, name: impl Into<String>, coord: Coord) {
        self.coords.insert(name.into(), coord);
    }

    pub fn coord(&self, name: &str) -> Option<&Coord> {
        self.coords.get(name)
    }

    pub fn coord_mut(&mut self, name: &str) -> Option<&mut Coord> {
        self.coords.get_mut(name)
    }

    pub fn drop_coord(&mut self, name: &str) -> Option<Coord> {
        self.coords.remove(name)
    }

    /// The decoded time coordinate
    pub fn time(&self) -> Result<&[CfDate]> {
        match self.coords.get("time") {
            Some(Coord {
                values: CoordData::Time(dates),
                ..
            }) => Ok(dates.as_slice()),
            Some(_) => Err(WrangleError::Generic(
                "Coordinate 'time' does not hold decoded dates".to_string(),
            )),
            None => Err(WrangleError::VariableNotFound {
                var: "time".to_string(),
            }),
        }
    }

    /// Replace the time coordinate values, keeping its attributes
    pub fn set_time(&mut self, dates: Vec<CfDate>) {
        let attrs = self
            .coords
            .get("time")
            .map(|c| c.attrs.clone())
            .unwrap_or_default();
        self.coords.insert(
            "time".to_string(),
            Coord::with_attrs("time", CoordData::Time(dates), attrs),
        );
    }

    /// Attribute map for a scope: "global" or a variable/coordinate name
    pub fn attrs_scope_mut(&mut self, scope: &str) -> Result<&mut AttrMap> {
        if scope == "global" {
            return Ok(&mut self.attrs);
        }
        if let Some(var) = self.data_vars.get_mut(scope) {
            return Ok(&mut var.attrs);
        }
        if let Some(coord) = self.coords.get_mut(scope) {
            return Ok(&mut coord.attrs);
        }
        Err(WrangleError::VariableNotFound {
            var: scope.to_string(),
        })
    }

    /// Prints dimensions, coordinates and variables in an organized format.
    pub fn print_summary(&self) {
        println!("\n Dimensions");
        println!("==============");
        let dims = self.dims();
        if dims.is_empty() {
            println!("   (No dimensions found)");
        } else {
            for (name, len) in &dims {
                println!("    {} = {}", name, len);
            }
        }

        println!("\n Coordinates");
        println!("===============");
        for (name, coord) in &self.coords {
            println!("    {} ({}) [{}]", name, coord.dims.join(", "), coord.len());
        }

        println!("\n Variables");
        println!("=============");
        if self.data_vars.is_empty() {
            println!("   (No variables found)");
        } else {
            for (name, var) in &self.data_vars {
                let shape: Vec<String> = var.data.shape().iter().map(|s| s.to_string()).collect();
                let units = var.units().unwrap_or("-");
                println!(
                    "    {} ({}) shape: ({}) units: {}",
                    name,
                    var.dims.join(", "),
                    shape.join(" × "),
                    units
                );
            }
        }

        println!("\n Global Attributes");
        println!("=====================");
        for (key, value) in self.attrs.iter() {
            println!("    {}: {}", key, value);
        }
    }
}
