//! Calendar handling: CF calendars, dates, frequencies and conversions
//!
//! Climate model output uses simplified calendars (no leap days, 360-day
//! years) that ordinary date libraries cannot represent, so date arithmetic
//! for those lives here; the standard calendar delegates to `chrono`.

use crate::dataset::Dataset;
use crate::errors::{Result, WrangleError};
use chrono::{Datelike, Duration, NaiveDate};
use log::{debug, info, warn};
use ndarray::Axis;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

/// English month abbreviations, January first
pub const MONTH_ABBREVIATIONS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Month initials used to build compound season labels (DJF, MAM, ...)
pub const MONTH_INITIALS: [char; 12] = ['J', 'F', 'M', 'A', 'M', 'J', 'J', 'A', 'S', 'O', 'N', 'D'];

const DAYS_IN_MONTH: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// A CF calendar
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Calendar {
    /// Gregorian calendar with leap years
    #[serde(
        rename = "standard",
        alias = "gregorian",
        alias = "proleptic_gregorian",
        alias = "default"
    )]
    Standard,
    /// 365-day years, no leap day
    #[serde(rename = "noleap", alias = "365_day")]
    NoLeap,
    /// 366-day years, every year has a leap day
    #[serde(rename = "all_leap", alias = "366_day")]
    AllLeap,
    /// Twelve 30-day months
    #[serde(rename = "360_day")]
    Day360,
}

impl Calendar {
    /// Parse a CF calendar name, accepting the usual aliases
    pub fn from_name(name: &str) -> Result<Calendar> {
        match name {
            "standard" | "gregorian" | "proleptic_gregorian" | "default" => Ok(Calendar::Standard),
            "noleap" | "365_day" => Ok(Calendar::NoLeap),
            "all_leap" | "366_day" => Ok(Calendar::AllLeap),
            "360_day" => Ok(Calendar::Day360),
            _ => Err(WrangleError::Generic(format!(
                "Unknown calendar name '{}'",
                name
            ))),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Calendar::Standard => "standard",
            Calendar::NoLeap => "noleap",
            Calendar::AllLeap => "all_leap",
            Calendar::Day360 => "360_day",
        }
    }

    pub fn is_leap(self, year: i32) -> bool {
        match self {
            Calendar::Standard => (year % 4 == 0 && year % 100 != 0) || year % 400 == 0,
            Calendar::NoLeap | Calendar::Day360 => false,
            Calendar::AllLeap => true,
        }
    }

    pub fn days_in_month(self, year: i32, month: u32) -> u32 {
        match self {
            Calendar::Day360 => 30,
            _ => {
                if month == 2 && self.is_leap(year) {
                    29
                } else {
                    DAYS_IN_MONTH[(month - 1) as usize]
                }
            }
        }
    }

    pub fn days_in_year(self, year: i32) -> u32 {
        match self {
            Calendar::Day360 => 360,
            Calendar::NoLeap => 365,
            Calendar::AllLeap => 366,
            Calendar::Standard => {
                if self.is_leap(year) {
                    366
                } else {
                    365
                }
            }
        }
    }

    /// Mean year length in days, for chunk-size translation
    pub fn mean_year_length(self) -> f64 {
        match self {
            Calendar::Day360 => 360.0,
            Calendar::NoLeap => 365.0,
            Calendar::AllLeap => 366.0,
            Calendar::Standard => 365.25,
        }
    }

    /// Whether (year, month, day) exists in this calendar
    pub fn valid_date(self, year: i32, month: u32, day: u32) -> bool {
        (1..=12).contains(&month) && day >= 1 && day <= self.days_in_month(year, month)
    }
}

impl fmt::Display for Calendar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A day-resolution date, meaningful only together with a [`Calendar`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CfDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl CfDate {
    pub const fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    /// The "MM-DD" key used by season maps
    pub fn mmdd(&self) -> String {
        format!("{:02}-{:02}", self.month, self.day)
    }

    /// 1-based day of year in the given calendar
    pub fn doy(&self, calendar: Calendar) -> u32 {
        let mut doy = self.day;
        for m in 1..self.month {
            doy += calendar.days_in_month(self.year, m);
        }
        doy
    }

    /// Date at a 1-based day of year
    pub fn from_doy(calendar: Calendar, year: i32, doy: u32) -> Self {
        let mut remaining = doy;
        for month in 1..=12u32 {
            let len = calendar.days_in_month(year, month);
            if remaining <= len {
                return CfDate::new(year, month, remaining);
            }
            remaining -= len;
        }
        // doy beyond year end clamps to December 31st-equivalent
        CfDate::new(year, 12, calendar.days_in_month(year, 12))
    }
}

impl fmt::Display for CfDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Days elapsed since year 1, January 1st of the given calendar
pub fn days_from_epoch(calendar: Calendar, date: CfDate) -> i64 {
    match calendar {
        Calendar::Standard => {
            // chrono owns the leap-year bookkeeping for the real calendar
            NaiveDate::from_ymd_opt(date.year, date.month, date.day)
                .map(|d| i64::from(d.num_days_from_ce()))
                .unwrap_or(0)
        }
        _ => {
            let years = i64::from(date.year) - 1;
            let per_year = i64::from(calendar.days_in_year(2001));
            years * per_year + i64::from(date.doy(calendar)) - 1
        }
    }
}

/// Add (or subtract) days to a date within a calendar
pub fn add_days(calendar: Calendar, date: CfDate, days: i64) -> CfDate {
    match calendar {
        Calendar::Standard => {
            let base = NaiveDate::from_ymd_opt(date.year, date.month, date.day)
                .unwrap_or(NaiveDate::MIN);
            let shifted = base + Duration::days(days);
            CfDate::new(shifted.year(), shifted.month(), shifted.day())
        }
        _ => {
            let per_year = i64::from(calendar.days_in_year(2001));
            let total = i64::from(date.year - 1) * per_year + i64::from(date.doy(calendar)) - 1 + days;
            let year = total.div_euclid(per_year) + 1;
            let doy = total.rem_euclid(per_year) + 1;
            CfDate::from_doy(calendar, year as i32, doy as u32)
        }
    }
}

/// Whole days between two dates of the same calendar
pub fn diff_days(calendar: Calendar, later: CfDate, earlier: CfDate) -> i64 {
    days_from_epoch(calendar, later) - days_from_epoch(calendar, earlier)
}

/// Return the minimum calendar from a list.
///
/// Uses the hierarchy: 360_day < noleap < standard < all_leap,
/// and returns one of those names.
pub fn minimum_calendar(calendars: &[&str]) -> &'static str {
    let any_all_leap = calendars
        .iter()
        .any(|cal| *cal == "all_leap" || *cal == "366_day");
    if calendars.contains(&"360_day") {
        return "360_day";
    }
    // mixing no-leap and all-leap sources needs the standard calendar
    if !any_all_leap && (calendars.contains(&"noleap") || calendars.contains(&"365_day")) {
        return "noleap";
    }
    if !calendars.is_empty()
        && calendars
            .iter()
            .all(|cal| *cal == "all_leap" || *cal == "366_day")
    {
        return "all_leap";
    }
    "standard"
}

/// One entry of a chunk specification
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkValue {
    /// Fixed chunk length
    Count(usize),
    /// The whole axis in one chunk (-1 in config files)
    Full,
    /// N calendar years worth of daily steps ("2year" in config files)
    Years(usize),
    /// Per-variable nested specification
    PerVar(HashMap<String, ChunkValue>),
}

impl ChunkValue {
    fn from_json(value: &serde_json::Value) -> std::result::Result<ChunkValue, String> {
        match value {
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    if i == -1 {
                        Ok(ChunkValue::Full)
                    } else if i > 0 {
                        Ok(ChunkValue::Count(i as usize))
                    } else {
                        Err(format!("invalid chunk size {}", i))
                    }
                } else {
                    Err(format!("chunk size must be an integer, got {}", n))
                }
            }
            serde_json::Value::String(s) => match s.strip_suffix("year") {
                Some(n) => n
                    .parse::<usize>()
                    .map(ChunkValue::Years)
                    .map_err(|_| format!("invalid chunk spec '{}'", s)),
                None => Err(format!("invalid chunk spec '{}'", s)),
            },
            serde_json::Value::Object(map) => {
                let mut nested = HashMap::new();
                for (k, v) in map {
                    nested.insert(k.clone(), ChunkValue::from_json(v)?);
                }
                Ok(ChunkValue::PerVar(nested))
            }
            other => Err(format!("invalid chunk spec {}", other)),
        }
    }
}

impl<'de> Deserialize<'de> for ChunkValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        ChunkValue::from_json(&value).map_err(serde::de::Error::custom)
    }
}

/// Translate chunk specification for time into a number.
///
/// `Full` translates to `timesize`, `Years(n)` to n times the number of days
/// in a year of `calendar`. Nested per-variable specifications are translated
/// recursively; everything else passes through unchanged.
pub fn translate_time_chunk(
    chunks: &HashMap<String, ChunkValue>,
    calendar: Calendar,
    timesize: usize,
) -> HashMap<String, ChunkValue> {
    let mut out = HashMap::new();
    for (key, value) in chunks {
        let translated = match value {
            ChunkValue::PerVar(nested) => {
                ChunkValue::PerVar(translate_time_chunk(nested, calendar, timesize))
            }
            ChunkValue::Full if key == "time" => ChunkValue::Count(timesize),
            ChunkValue::Years(n) if key == "time" => {
                ChunkValue::Count((*n as f64 * calendar.mean_year_length()) as usize)
            }
            other => other.clone(),
        };
        out.insert(key.clone(), translated);
    }
    out
}

/// Base of an inferred sampling frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreqBase {
    Day,
    Month,
    Year,
}

/// An inferred time-axis sampling frequency
///
/// `anchor` is the month of the first sample, meaningful for month-based
/// and annual frequencies (QS-DEC, AS-JUL, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frequency {
    pub base: FreqBase,
    pub mult: usize,
    pub anchor: u32,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let abb = MONTH_ABBREVIATIONS[(self.anchor - 1) as usize];
        match (self.base, self.mult) {
            (FreqBase::Day, 1) => write!(f, "D"),
            (FreqBase::Day, n) => write!(f, "{}D", n),
            (FreqBase::Month, 1) => write!(f, "MS"),
            (FreqBase::Month, 3) => write!(f, "QS-{}", abb),
            (FreqBase::Month, n) => write!(f, "{}MS", n),
            (FreqBase::Year, 1) => write!(f, "AS-{}", abb),
            (FreqBase::Year, n) => write!(f, "{}AS-{}", n, abb),
        }
    }
}

/// Infer the sampling frequency of a time coordinate.
///
/// Detects month-start series (monthly, N-monthly, annual) and regular
/// daily series. Needs at least three samples; returns `None` when the
/// spacing is irregular.
pub fn infer_freq(times: &[CfDate], calendar: Calendar) -> Option<Frequency> {
    if times.len() < 3 {
        return None;
    }

    if times.iter().all(|t| t.day == 1) {
        let month_index =
            |t: &CfDate| i64::from(t.year) * 12 + i64::from(t.month) - 1;
        let step = month_index(&times[1]) - month_index(&times[0]);
        if step > 0
            && times
                .windows(2)
                .all(|w| month_index(&w[1]) - month_index(&w[0]) == step)
        {
            let anchor = times[0].month;
            return if step % 12 == 0 {
                Some(Frequency {
                    base: FreqBase::Year,
                    mult: (step / 12) as usize,
                    anchor,
                })
            } else {
                Some(Frequency {
                    base: FreqBase::Month,
                    mult: step as usize,
                    anchor,
                })
            };
        }
    }

    let step = diff_days(calendar, times[1], times[0]);
    if step > 0
        && times
            .windows(2)
            .all(|w| diff_days(calendar, w[1], w[0]) == step)
    {
        return Some(Frequency {
            base: FreqBase::Day,
            mult: step as usize,
            anchor: times[0].month,
        });
    }

    None
}

/// The calendar of a dataset's time coordinate (`calendar` attribute,
/// defaulting to the standard calendar)
pub fn get_calendar(ds: &Dataset) -> Calendar {
    ds.coord("time")
        .and_then(|c| c.attrs.get_text("calendar"))
        .and_then(|name| Calendar::from_name(name).ok())
        .unwrap_or(Calendar::Standard)
}

/// Day-alignment strategy for calendar conversion involving 360-day years
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignOn {
    /// Keep (month, day), dropping dates absent from the target calendar
    Date,
    /// Map the day-of-year proportionally to the year length
    Year,
    /// Distribute the dropped/added days randomly within each year
    Random,
}

/// Options for [`convert_calendar`]
#[derive(Debug, Clone)]
pub struct ConvertCalendarOptions {
    pub target: Calendar,
    pub align_on: Option<AlignOn>,
    /// When set, reindex onto the full target time axis at the source
    /// sampling frequency and fill created steps with this value
    pub missing: Option<f64>,
}

impl ConvertCalendarOptions {
    pub fn new(target: Calendar) -> Self {
        Self {
            target,
            align_on: None,
            missing: None,
        }
    }
}

/// Convert the time axis of a dataset to another calendar.
///
/// Dates that do not exist in the target calendar are dropped; with
/// `missing`, the result is reindexed onto the complete target axis and the
/// created time steps are filled with the given value. Conversions to or
/// from the 360-day calendar require an alignment strategy.
pub fn convert_calendar(ds: &Dataset, opts: &ConvertCalendarOptions) -> Result<Dataset> {
    let source = get_calendar(ds);
    let target = opts.target;
    if source == target {
        return Ok(ds.clone());
    }
    let times = ds.time()?.to_vec();

    let needs_alignment = source == Calendar::Day360 || target == Calendar::Day360;
    let align_on = match (opts.align_on, needs_alignment) {
        (Some(a), _) => a,
        (None, false) => AlignOn::Date,
        (None, true) => {
            return Err(WrangleError::Generic(
                "Argument 'align_on' must be specified when converting to or from the '360_day' calendar"
                    .to_string(),
            ))
        }
    };

    info!(
        "Converting calendar {} -> {} (align_on: {:?})",
        source, target, align_on
    );

    // kept[i] = index into `times`, mapped[i] = its date in the target calendar
    let (kept, mapped) = map_dates(&times, source, target, align_on);
    debug!("{} of {} time steps kept", kept.len(), times.len());

    let mut out = select_time(ds, &kept)?;
    out.set_time(mapped.clone());
    if let Some(coord) = out.coord_mut("time") {
        coord.attrs.set("calendar", target.as_str());
    }

    if let Some(fill) = opts.missing {
        let freq = infer_freq(&times, source).ok_or_else(|| WrangleError::FrequencyUnsupported {
            freq: "irregular".to_string(),
        })?;
        let full_axis = date_sequence(target, mapped[0], *mapped.last().unwrap_or(&mapped[0]), freq);
        out = reindex_time(&out, &full_axis, fill)?;
    }

    Ok(out)
}

fn map_dates(
    times: &[CfDate],
    source: Calendar,
    target: Calendar,
    align_on: AlignOn,
) -> (Vec<usize>, Vec<CfDate>) {
    match align_on {
        AlignOn::Date => {
            let mut kept = Vec::new();
            let mut mapped = Vec::new();
            for (i, t) in times.iter().enumerate() {
                if target.valid_date(t.year, t.month, t.day) {
                    kept.push(i);
                    mapped.push(*t);
                }
            }
            (kept, mapped)
        }
        AlignOn::Year => {
            let mut kept = Vec::new();
            let mut mapped = Vec::new();
            let mut last: Option<CfDate> = None;
            for (i, t) in times.iter().enumerate() {
                let src_len = source.days_in_year(t.year) as f64;
                let tgt_len = target.days_in_year(t.year) as f64;
                let doy = t.doy(source) as f64;
                let new_doy = ((doy * tgt_len / src_len).round() as u32)
                    .clamp(1, target.days_in_year(t.year));
                let date = CfDate::from_doy(target, t.year, new_doy);
                // scaling down can collide; keep the first hit
                if last != Some(date) {
                    kept.push(i);
                    mapped.push(date);
                    last = Some(date);
                }
            }
            (kept, mapped)
        }
        AlignOn::Random => {
            let mut kept = Vec::new();
            let mut mapped = Vec::new();
            let mut rng = rand::rng();
            let mut index = 0usize;
            while index < times.len() {
                let year = times[index].year;
                let year_end = times[index..]
                    .iter()
                    .position(|t| t.year != year)
                    .map(|p| index + p)
                    .unwrap_or(times.len());
                let src_len = source.days_in_year(year) as usize;
                let tgt_len = target.days_in_year(year) as usize;
                if tgt_len < src_len {
                    // drop randomly-chosen source days
                    let mut dropped =
                        rand::seq::index::sample(&mut rng, src_len, src_len - tgt_len).into_vec();
                    dropped.sort_unstable();
                    for (i, t) in times[index..year_end].iter().enumerate() {
                        let doy = t.doy(source) as usize;
                        if dropped.binary_search(&(doy - 1)).is_ok() {
                            continue;
                        }
                        let shift = dropped.partition_point(|&d| d < doy - 1);
                        kept.push(index + i);
                        mapped.push(CfDate::from_doy(target, year, (doy - shift) as u32));
                    }
                } else {
                    // leave randomly-chosen target days empty
                    let mut skipped =
                        rand::seq::index::sample(&mut rng, tgt_len, tgt_len - src_len).into_vec();
                    skipped.sort_unstable();
                    for (i, t) in times[index..year_end].iter().enumerate() {
                        // source doy d maps to the d-th non-skipped target doy
                        let mut new_doy = t.doy(source) as usize;
                        for &s in &skipped {
                            if s + 1 <= new_doy {
                                new_doy += 1;
                            }
                        }
                        kept.push(index + i);
                        mapped.push(CfDate::from_doy(target, year, new_doy.min(tgt_len) as u32));
                    }
                }
                index = year_end;
            }
            (kept, mapped)
        }
    }
}

/// All dates of `calendar` from `start` to `end` inclusive at frequency `freq`
fn date_sequence(calendar: Calendar, start: CfDate, end: CfDate, freq: Frequency) -> Vec<CfDate> {
    let mut out = Vec::new();
    match freq.base {
        FreqBase::Day => {
            let mut current = start;
            while current <= end {
                out.push(current);
                current = add_days(calendar, current, freq.mult as i64);
            }
        }
        FreqBase::Month | FreqBase::Year => {
            let step = if freq.base == FreqBase::Year {
                freq.mult * 12
            } else {
                freq.mult
            } as i64;
            let mut index = i64::from(start.year) * 12 + i64::from(start.month) - 1;
            let end_index = i64::from(end.year) * 12 + i64::from(end.month) - 1;
            while index <= end_index {
                out.push(CfDate::new(
                    (index.div_euclid(12)) as i32,
                    (index.rem_euclid(12) + 1) as u32,
                    1,
                ));
                index += step;
            }
        }
    }
    out
}

/// Subset every time-dependent variable to the given time indices
fn select_time(ds: &Dataset, indices: &[usize]) -> Result<Dataset> {
    let mut out = ds.clone();
    for (name, var) in &ds.data_vars {
        if let Some(axis) = var.axis_of("time") {
            let selected = var.data.select(Axis(axis), indices);
            out.var_mut(name)?.data = selected;
        }
    }
    for (name, coord) in &ds.coords {
        if name != "time" && coord.dims == ["time"] {
            if let Some(c) = out.coord_mut(name) {
                c.values = coord.values.select(indices);
            }
        }
    }
    Ok(out)
}

/// Reindex the time axis onto `new_dates`, filling created steps with `fill`
fn reindex_time(ds: &Dataset, new_dates: &[CfDate], fill: f64) -> Result<Dataset> {
    let old_dates = ds.time()?;
    let position: HashMap<CfDate, usize> = old_dates
        .iter()
        .enumerate()
        .map(|(i, d)| (*d, i))
        .collect();
    let mapping: Vec<Option<usize>> = new_dates.iter().map(|d| position.get(d).copied()).collect();

    let mut out = ds.clone();
    for (name, var) in &ds.data_vars {
        if let Some(axis) = var.axis_of("time") {
            let mut shape = var.data.shape().to_vec();
            shape[axis] = new_dates.len();
            let mut data = ndarray::ArrayD::from_elem(shape, fill);
            for (new_index, old_index) in mapping.iter().enumerate() {
                if let Some(old_index) = *old_index {
                    data.index_axis_mut(Axis(axis), new_index)
                        .assign(&var.data.index_axis(Axis(axis), old_index));
                }
            }
            out.var_mut(name)?.data = data;
        }
    }
    // auxiliary coordinates along time cannot be filled meaningfully
    let stale: Vec<String> = out
        .coords
        .iter()
        .filter(|(name, c)| *name != "time" && c.dims == ["time"])
        .map(|(name, _)| name.clone())
        .collect();
    for name in stale {
        warn!("Dropping auxiliary time coordinate '{}' during reindex", name);
        out.drop_coord(&name);
    }
    out.set_time(new_dates.to_vec());
    Ok(out)
}
