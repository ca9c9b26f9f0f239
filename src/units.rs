//! CF unit parsing and unit conversion
//!
//! A compact dimensional-analysis engine over the CF unit subset climate
//! pipelines feed through [`change_units`]: SI-prefixed metres and grams,
//! the time units, temperature (with the affine kelvin/Celsius pair),
//! pressure, energy and power. Conversion is driven by dimensional
//! signatures, not string equality, and knows the water-equivalence
//! between precipitation amounts (kg m-2) and depths (mm).

use crate::calendar::{diff_days, get_calendar};
use crate::dataset::Dataset;
use crate::errors::{Result, WrangleError};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::ops::{Neg, Sub};

/// Exponents of the base dimensions (length, mass, time, temperature)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DimSig {
    pub length: i32,
    pub mass: i32,
    pub time: i32,
    pub temperature: i32,
}

impl DimSig {
    const fn new(length: i32, mass: i32, time: i32, temperature: i32) -> Self {
        Self {
            length,
            mass,
            time,
            temperature,
        }
    }

    fn scaled(self, exponent: i32) -> Self {
        Self::new(
            self.length * exponent,
            self.mass * exponent,
            self.time * exponent,
            self.temperature * exponent,
        )
    }

    fn add(self, other: Self) -> Self {
        Self::new(
            self.length + other.length,
            self.mass + other.mass,
            self.time + other.time,
            self.temperature + other.temperature,
        )
    }

    fn is_zero(self) -> bool {
        self == Self::default()
    }
}

impl Sub for DimSig {
    type Output = DimSig;
    fn sub(self, other: Self) -> Self {
        self.add(other.neg())
    }
}

impl Neg for DimSig {
    type Output = DimSig;
    fn neg(self) -> Self {
        self.scaled(-1)
    }
}

/// Dimensional signature of water density, the bridge between
/// precipitation amounts (kg m-2) and depths (mm)
const DENSITY_DIMS: DimSig = DimSig::new(-3, 1, 0, 0);
const WATER_DENSITY: f64 = 1000.0;

/// A parsed unit: scale factor to SI, affine offset (lone temperature
/// units only) and dimensional signature
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub factor: f64,
    pub offset: f64,
    pub dims: DimSig,
    pub text: String,
}

fn base_unit(symbol: &str) -> Option<(f64, f64, DimSig)> {
    let (factor, offset, dims) = match symbol {
        "m" | "meter" | "metre" => (1.0, 0.0, DimSig::new(1, 0, 0, 0)),
        "km" => (1000.0, 0.0, DimSig::new(1, 0, 0, 0)),
        "cm" => (0.01, 0.0, DimSig::new(1, 0, 0, 0)),
        "mm" => (0.001, 0.0, DimSig::new(1, 0, 0, 0)),
        "kg" => (1.0, 0.0, DimSig::new(0, 1, 0, 0)),
        "g" => (0.001, 0.0, DimSig::new(0, 1, 0, 0)),
        "t" | "tonne" => (1000.0, 0.0, DimSig::new(0, 1, 0, 0)),
        "s" | "sec" | "second" | "seconds" => (1.0, 0.0, DimSig::new(0, 0, 1, 0)),
        "min" | "minute" | "minutes" => (60.0, 0.0, DimSig::new(0, 0, 1, 0)),
        "h" | "hr" | "hour" | "hours" => (3600.0, 0.0, DimSig::new(0, 0, 1, 0)),
        "d" | "day" | "days" => (86400.0, 0.0, DimSig::new(0, 0, 1, 0)),
        "week" | "weeks" => (604800.0, 0.0, DimSig::new(0, 0, 1, 0)),
        "K" | "kelvin" => (1.0, 0.0, DimSig::new(0, 0, 0, 1)),
        "degC" | "°C" | "celsius" => (1.0, 273.15, DimSig::new(0, 0, 0, 1)),
        "Pa" => (1.0, 0.0, DimSig::new(-1, 1, -2, 0)),
        "hPa" => (100.0, 0.0, DimSig::new(-1, 1, -2, 0)),
        "J" => (1.0, 0.0, DimSig::new(2, 1, -2, 0)),
        "W" => (1.0, 0.0, DimSig::new(2, 1, -3, 0)),
        "%" | "percent" => (0.01, 0.0, DimSig::default()),
        "1" => (1.0, 0.0, DimSig::default()),
        _ => return None,
    };
    Some((factor, offset, dims))
}

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z°%]+|1)(?:\^?(-?\d+))?$").unwrap());

/// Parse a CF unit string like "mm d-1", "kg m-2 s-1", "degC" or "W/m2".
pub fn parse_units(text: &str) -> Result<Unit> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(WrangleError::UnitParse {
            unit: text.to_string(),
        });
    }
    // "/" flips the sign of every following exponent, as in udunits
    let spaced = trimmed.replace('*', " ").replace('/', " / ");
    let mut factor = 1.0f64;
    let mut offset = 0.0f64;
    let mut dims = DimSig::default();
    let mut terms = 0usize;
    let mut last_exponent = 1i32;
    let mut sign = 1i32;

    for token in spaced.split_whitespace() {
        if token == "/" {
            sign = -1;
            continue;
        }
        let caps = TOKEN_RE.captures(token).ok_or_else(|| WrangleError::UnitParse {
            unit: text.to_string(),
        })?;
        let symbol = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let exponent: i32 = caps
            .get(2)
            .map(|m| m.as_str().parse().unwrap_or(1))
            .unwrap_or(1)
            * sign;
        let (base_factor, base_offset, base_dims) =
            base_unit(symbol).ok_or_else(|| WrangleError::UnitParse {
                unit: text.to_string(),
            })?;
        factor *= base_factor.powi(exponent);
        offset = base_offset;
        dims = dims.add(base_dims.scaled(exponent));
        terms += 1;
        last_exponent = exponent;
    }

    if terms == 0 {
        return Err(WrangleError::UnitParse {
            unit: text.to_string(),
        });
    }
    // affine offsets only make sense for a lone temperature unit
    if terms != 1 || last_exponent != 1 || dims != DimSig::new(0, 0, 0, 1) {
        offset = 0.0;
    }

    Ok(Unit {
        factor,
        offset,
        dims,
        text: trimmed.to_string(),
    })
}

/// Scale-and-shift pair taking a value from `src` to `dst`
///
/// Fails unless the dimensional signatures agree exactly or differ by the
/// water-density bridge.
fn conversion(src: &Unit, dst: &Unit) -> Option<(f64, f64)> {
    let diff = src.dims - dst.dims;
    let bridge = if diff.is_zero() {
        1.0
    } else if diff == DENSITY_DIMS {
        1.0 / WATER_DENSITY
    } else if diff == -DENSITY_DIMS {
        WATER_DENSITY
    } else {
        return None;
    };
    let scale = src.factor * bridge / dst.factor;
    let shift = (src.offset - dst.offset) / dst.factor;
    Some((scale, shift))
}

/// Change units of dataset variables to the requested, possibly non-CF,
/// representations.
///
/// Equality is judged on parsed units, not strings. When the time exponents
/// differ by exactly one, the variable is interpreted as an amount (one
/// above) or a rate (one below) and the conversion divides or multiplies by
/// the time-step length; any other dimensional mismatch is an error. All
/// attributes are preserved, with `units` rewritten to the target string.
pub fn change_units(ds: &mut Dataset, variables_and_units: &BTreeMap<String, String>) -> Result<()> {
    for (name, target_text) in variables_and_units {
        if !ds.data_vars.contains_key(name) {
            continue;
        }
        let src_text = ds
            .var(name)?
            .units()
            .ok_or_else(|| WrangleError::Generic(format!(
                "Variable '{}' has no units attribute",
                name
            )))?
            .to_string();
        let src = parse_units(&src_text)?;
        let dst = parse_units(target_text)?;
        // physical equality, not string equality: "mm/day" and "mm d-1"
        // need no conversion
        if src.factor == dst.factor && src.offset == dst.offset && src.dims == dst.dims {
            continue;
        }

        let time_delta = src.dims.time - dst.dims.time;
        let (scale, shift) = match time_delta {
            0 => conversion(&src, &dst),
            1 => {
                // the variable is an amount; divide by the step length
                let step = time_step_seconds(ds)?;
                let mut as_rate = src.clone();
                as_rate.dims.time -= 1;
                as_rate.factor /= step;
                as_rate.offset = 0.0;
                conversion(&as_rate, &dst).map(|(s, _)| (s, 0.0))
            }
            -1 => {
                // the variable is a rate; multiply by the step length
                let step = time_step_seconds(ds)?;
                let mut as_amount = src.clone();
                as_amount.dims.time += 1;
                as_amount.factor *= step;
                as_amount.offset = 0.0;
                conversion(&as_amount, &dst).map(|(s, _)| (s, 0.0))
            }
            _ => None,
        }
        .ok_or_else(|| WrangleError::UnitMismatch {
            var: name.clone(),
            from: src_text.clone(),
            to: target_text.clone(),
        })?;

        info!(
            "Converting '{}' from '{}' to '{}'",
            name, src_text, target_text
        );
        let var = ds.var_mut(name)?;
        var.data.mapv_inplace(|v| v * scale + shift);
        var.attrs.set("units", target_text.as_str());
    }
    Ok(())
}

/// Uniform time-step length in seconds, from the first two time points
fn time_step_seconds(ds: &Dataset) -> Result<f64> {
    let times = ds.time()?;
    if times.len() < 2 {
        return Err(WrangleError::Generic(
            "Rate/amount conversion needs at least two time steps".to_string(),
        ));
    }
    let calendar = get_calendar(ds);
    let days = diff_days(calendar, times[1], times[0]);
    if days <= 0 {
        return Err(WrangleError::Generic(
            "Time coordinate is not increasing".to_string(),
        ));
    }
    Ok(days as f64 * 86400.0)
}
