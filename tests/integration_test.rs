//! Integration tests for ClimWrangle
//!
//! These exercise the full workflows: mask-based stacking with the
//! side-car coordinate file, season unstacking, calendar conversion, the
//! clean-up pipeline and NetCDF round-trips.

use clim_wrangle::{
    calendar::{convert_calendar, AlignOn, Calendar, CfDate, ChunkValue, ConvertCalendarOptions},
    cleanup::{clean_up, CleanUpConfig, CommonAttrsSource},
    dataset::{AttrValue, Coord, CoordData, DataArray, Dataset},
    errors::{Result, WrangleError},
    netcdf_io::{read_dataset, write_dataset},
    release_notes::{publish_release_notes, ReleaseNotesStyle},
    seasons::unstack_dates,
    stacking::{
        maybe_unstack, stack_drop_nans, unstack_fill_nan, CoordsSource, Mask,
        MaybeUnstackOptions, StackOptions, UnstackOptions,
    },
};
use ndarray::{ArrayD, IxDyn};
use std::collections::{BTreeMap, HashMap};
use tempfile::tempdir;

/// 3×4 grid with lat/lon coordinates and a "tas" variable holding 0..12
fn grid_dataset() -> Dataset {
    let mut ds = Dataset::new();
    let values: Vec<f64> = (0..12).map(f64::from).collect();
    let data = ArrayD::from_shape_vec(IxDyn(&[3, 4]), values).unwrap();
    let mut tas = DataArray::new(vec!["lat".to_string(), "lon".to_string()], data).unwrap();
    tas.attrs.set("units", "K");
    ds.add_var("tas", tas);

    let mut lat = Coord::new("lat", CoordData::Float(vec![10.0, 20.0, 30.0]));
    lat.attrs.set("units", "degrees_north");
    ds.set_coord("lat", lat);
    let mut lon = Coord::new(
        "lon",
        CoordData::Float(vec![100.0, 110.0, 120.0, 130.0]),
    );
    lon.attrs.set("units", "degrees_east");
    ds.set_coord("lon", lon);

    ds.attrs.set("cat:domain", "NAM");
    ds.attrs.set("cat:source", "TestModel");
    ds
}

/// True on points where (i + j) is even
fn checkerboard() -> Mask {
    let values = ArrayD::from_shape_fn(IxDyn(&[3, 4]), |idx| (idx[0] + idx[1]) % 2 == 0);
    Mask::new(vec!["lat".to_string(), "lon".to_string()], values).unwrap()
}

fn time_series_dataset(dates: Vec<CfDate>, values: Vec<f64>, calendar: &str) -> Dataset {
    let mut ds = Dataset::new();
    let data = ArrayD::from_shape_vec(IxDyn(&[values.len()]), values).unwrap();
    let mut tas = DataArray::new(vec!["time".to_string()], data).unwrap();
    tas.attrs.set("units", "K");
    ds.add_var("tas", tas);
    let mut time = Coord::new("time", CoordData::Time(dates));
    time.attrs.set("calendar", calendar);
    ds.set_coord("time", time);
    ds
}

#[test]
fn test_stack_drop_nans_basic() -> Result<()> {
    let ds = grid_dataset();
    let mask = checkerboard();
    assert_eq!(mask.shape_string(), "3x4");

    let stacked = stack_drop_nans(&ds, &mask, &StackOptions::default())?;

    let tas = stacked.var("tas")?;
    assert_eq!(tas.dims, vec!["loc"]);
    assert_eq!(tas.data.shape(), &[6]);
    // row-major order of the kept points
    let expected = [0.0, 2.0, 5.0, 7.0, 8.0, 10.0];
    for (i, want) in expected.iter().enumerate() {
        assert_eq!(tas.data[[i]], *want);
    }

    let lat = stacked.coord("lat").expect("lat should exist");
    assert_eq!(lat.dims, vec!["loc"]);
    assert_eq!(
        lat.values,
        CoordData::Float(vec![10.0, 10.0, 20.0, 20.0, 30.0, 30.0])
    );
    assert_eq!(lat.attrs.get_text("original_shape"), Some("3x4"));
    assert_eq!(lat.attrs.get_text("units"), Some("degrees_north"));

    let lon = stacked.coord("lon").expect("lon should exist");
    assert_eq!(
        lon.values,
        CoordData::Float(vec![100.0, 120.0, 110.0, 130.0, 100.0, 120.0])
    );
    Ok(())
}

#[test]
fn test_stack_rejects_partial_dimension_overlap() {
    let mut ds = grid_dataset();
    let data = ArrayD::from_shape_vec(IxDyn(&[3]), vec![1.0, 2.0, 3.0]).unwrap();
    ds.add_var(
        "lat_only",
        DataArray::new(vec!["lat".to_string()], data).unwrap(),
    );
    let result = stack_drop_nans(&ds, &checkerboard(), &StackOptions::default());
    assert!(matches!(result, Err(WrangleError::InvalidStack { .. })));
}

#[test]
fn test_unstack_round_trip_autodetect() -> Result<()> {
    let ds = grid_dataset();
    let mask = checkerboard();
    let stacked = stack_drop_nans(&ds, &mask, &StackOptions::default())?;
    let unstacked = unstack_fill_nan(&stacked, &UnstackOptions::default())?;

    let tas = unstacked.var("tas")?;
    assert_eq!(tas.dims, vec!["lat", "lon"]);
    assert_eq!(tas.data.shape(), &[3, 4]);

    // levels come back in order of first appearance, so look points up by
    // their coordinate values rather than by position
    let lat_values = match &unstacked.coord("lat").unwrap().values {
        CoordData::Float(v) => v.clone(),
        other => panic!("Expected float lat, got {:?}", other),
    };
    let lon_values = match &unstacked.coord("lon").unwrap().values {
        CoordData::Float(v) => v.clone(),
        other => panic!("Expected float lon, got {:?}", other),
    };
    let original = ds.var("tas")?;
    for (i, lat) in [10.0, 20.0, 30.0].iter().enumerate() {
        for (j, lon) in [100.0, 110.0, 120.0, 130.0].iter().enumerate() {
            let ui = lat_values.iter().position(|v| v == lat).unwrap();
            let uj = lon_values.iter().position(|v| v == lon).unwrap();
            let value = tas.data[[ui, uj]];
            if (i + j) % 2 == 0 {
                assert_eq!(value, original.data[[i, j]]);
            } else {
                assert!(value.is_nan(), "masked-out point should be NaN");
            }
        }
    }

    // coordinate attributes are propagated onto the rebuilt dimensions
    assert_eq!(
        unstacked.coord("lat").unwrap().attrs.get_text("units"),
        Some("degrees_north")
    );
    Ok(())
}

#[test]
fn test_stack_unstack_with_sidecar_file() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    let template = dir
        .path()
        .join("coords")
        .join("coords_{domain}_{shape}.nc")
        .to_string_lossy()
        .into_owned();

    let ds = grid_dataset();
    let mask = checkerboard();
    let opts = StackOptions {
        new_dim: "loc".to_string(),
        to_file: Some(template.clone()),
    };
    let stacked = stack_drop_nans(&ds, &mask, &opts)?;

    // the template resolved the domain attribute and the grid shape
    let sidecar = dir.path().join("coords").join("coords_NAM_3x4.nc");
    assert!(sidecar.exists(), "side-car coordinate file should be written");

    let unstack_opts = UnstackOptions {
        dim: "loc".to_string(),
        coords: Some(CoordsSource::File(template)),
    };
    let unstacked = unstack_fill_nan(&stacked, &unstack_opts)?;

    // reindexing onto the file coordinates restores the original order
    assert_eq!(
        unstacked.coord("lat").unwrap().values,
        CoordData::Float(vec![10.0, 20.0, 30.0])
    );
    assert_eq!(
        unstacked.coord("lon").unwrap().values,
        CoordData::Float(vec![100.0, 110.0, 120.0, 130.0])
    );

    let tas = unstacked.var("tas")?;
    let original = grid_dataset();
    let expected = original.var("tas")?;
    for i in 0..3 {
        for j in 0..4 {
            if (i + j) % 2 == 0 {
                assert_eq!(tas.data[[i, j]], expected.data[[i, j]]);
            } else {
                assert!(tas.data[[i, j]].is_nan());
            }
        }
    }
    Ok(())
}

#[test]
fn test_unstack_with_explicit_values() -> Result<()> {
    let ds = grid_dataset();
    let stacked = stack_drop_nans(&ds, &checkerboard(), &StackOptions::default())?;

    let lat = stacked.coord("lat").unwrap().values.clone();
    let lon = stacked.coord("lon").unwrap().values.clone();
    let opts = UnstackOptions {
        dim: "loc".to_string(),
        coords: Some(CoordsSource::Values(vec![
            ("lat".to_string(), lat),
            ("lon".to_string(), lon),
        ])),
    };
    let unstacked = unstack_fill_nan(&stacked, &opts)?;
    assert_eq!(unstacked.var("tas")?.data.shape(), &[3, 4]);
    Ok(())
}

#[test]
fn test_unstack_missing_sidecar_fails() -> Result<()> {
    let ds = grid_dataset();
    let stacked = stack_drop_nans(&ds, &checkerboard(), &StackOptions::default())?;
    let opts = UnstackOptions {
        dim: "loc".to_string(),
        coords: Some(CoordsSource::File("/nonexistent/coords_{domain}_{shape}.nc".to_string())),
    };
    assert!(unstack_fill_nan(&stacked, &opts).is_err());
    Ok(())
}

#[test]
fn test_maybe_unstack_rechunk_hint() -> Result<()> {
    let ds = grid_dataset();
    let stacked = stack_drop_nans(&ds, &checkerboard(), &StackOptions::default())?;

    let mut rechunk = HashMap::new();
    rechunk.insert("lat".to_string(), ChunkValue::Count(2));
    let opts = MaybeUnstackOptions {
        coords: None,
        rechunk: Some(rechunk),
        stack_drop_nans: true,
    };
    let unstacked = maybe_unstack(&stacked, &opts)?;
    assert_eq!(
        unstacked.attrs.get("_chunk_hint:lat"),
        Some(&AttrValue::Int(2))
    );

    // without the stacked flag nothing happens
    let noop = maybe_unstack(&ds, &MaybeUnstackOptions::default())?;
    assert_eq!(noop.var("tas")?.dims, vec!["lat", "lon"]);
    Ok(())
}

#[test]
fn test_unstack_dates_quarterly() -> Result<()> {
    let dates = vec![
        CfDate::new(2000, 12, 1),
        CfDate::new(2001, 3, 1),
        CfDate::new(2001, 6, 1),
        CfDate::new(2001, 9, 1),
        CfDate::new(2001, 12, 1),
        CfDate::new(2002, 3, 1),
    ];
    let ds = time_series_dataset(dates, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0], "standard");
    let out = unstack_dates(&ds, None, "season")?;

    // DJF appears first in the series and must sort before MAM
    let season = out.coord("season").expect("season coordinate");
    assert_eq!(
        season.values,
        CoordData::Text(vec![
            "DJF".to_string(),
            "MAM".to_string(),
            "JJA".to_string(),
            "SON".to_string()
        ])
    );

    let time = match &out.coord("time").unwrap().values {
        CoordData::Time(t) => t.clone(),
        other => panic!("Expected time coordinate, got {:?}", other),
    };
    assert_eq!(
        time,
        vec![
            CfDate::new(2000, 1, 1),
            CfDate::new(2001, 1, 1),
            CfDate::new(2002, 1, 1)
        ]
    );

    let tas = out.var("tas")?;
    assert_eq!(tas.dims, vec!["time", "season"]);
    assert_eq!(tas.data.shape(), &[3, 4]);
    assert_eq!(tas.data[[0, 0]], 0.0); // 2000 DJF
    assert_eq!(tas.data[[1, 1]], 1.0); // 2001 MAM
    assert_eq!(tas.data[[1, 2]], 2.0); // 2001 JJA
    assert_eq!(tas.data[[1, 3]], 3.0); // 2001 SON
    assert_eq!(tas.data[[1, 0]], 4.0); // 2001 DJF
    assert_eq!(tas.data[[2, 1]], 5.0); // 2002 MAM
    assert!(tas.data[[0, 1]].is_nan()); // 2000 MAM never observed
    Ok(())
}

#[test]
fn test_unstack_dates_monthly_and_annual() -> Result<()> {
    let dates: Vec<CfDate> = (1..=12).map(|m| CfDate::new(2000, m, 1)).collect();
    let values: Vec<f64> = (0..12).map(f64::from).collect();
    let ds = time_series_dataset(dates, values, "standard");
    let out = unstack_dates(&ds, None, "month")?;
    let months = match &out.coord("month").unwrap().values {
        CoordData::Text(labels) => labels.clone(),
        other => panic!("Expected labels, got {:?}", other),
    };
    assert_eq!(months[0], "JAN");
    assert_eq!(months[11], "DEC");

    let annual = time_series_dataset(
        vec![
            CfDate::new(2000, 7, 1),
            CfDate::new(2001, 7, 1),
            CfDate::new(2002, 7, 1),
        ],
        vec![1.0, 2.0, 3.0],
        "standard",
    );
    let out = unstack_dates(&annual, None, "season")?;
    assert_eq!(
        out.coord("season").unwrap().values,
        CoordData::Text(vec!["annual-JUL".to_string()])
    );
    Ok(())
}

#[test]
fn test_unstack_dates_error_cases() {
    // daily data cannot be mapped to season labels automatically
    let daily = time_series_dataset(
        vec![
            CfDate::new(2000, 1, 1),
            CfDate::new(2000, 1, 2),
            CfDate::new(2000, 1, 3),
        ],
        vec![1.0, 2.0, 3.0],
        "standard",
    );
    assert!(matches!(
        unstack_dates(&daily, None, "season"),
        Err(WrangleError::FrequencyUnsupported { .. })
    ));

    // an explicit map must cover every date present
    let quarterly = time_series_dataset(
        vec![
            CfDate::new(2000, 12, 1),
            CfDate::new(2001, 3, 1),
            CfDate::new(2001, 6, 1),
        ],
        vec![1.0, 2.0, 3.0],
        "standard",
    );
    let mut seasons = BTreeMap::new();
    seasons.insert("12-01".to_string(), "DJF".to_string());
    seasons.insert("03-01".to_string(), "MAM".to_string());
    match unstack_dates(&quarterly, Some(&seasons), "season") {
        Err(WrangleError::SeasonKeyMissing { key }) => assert_eq!(key, "06-01"),
        other => panic!("Expected SeasonKeyMissing, got {:?}", other),
    }
}

#[test]
fn test_convert_calendar_drops_leap_day() -> Result<()> {
    let ds = time_series_dataset(
        vec![
            CfDate::new(2000, 2, 28),
            CfDate::new(2000, 2, 29),
            CfDate::new(2000, 3, 1),
        ],
        vec![1.0, 2.0, 3.0],
        "standard",
    );
    let out = convert_calendar(&ds, &ConvertCalendarOptions::new(Calendar::NoLeap))?;
    assert_eq!(out.time()?.len(), 2);
    let tas = out.var("tas")?;
    assert_eq!(tas.data[[0]], 1.0);
    assert_eq!(tas.data[[1]], 3.0);
    assert_eq!(
        out.coord("time").unwrap().attrs.get_text("calendar"),
        Some("noleap")
    );
    Ok(())
}

#[test]
fn test_convert_calendar_with_missing_fill() -> Result<()> {
    let dates = vec![
        CfDate::new(2000, 2, 26),
        CfDate::new(2000, 2, 27),
        CfDate::new(2000, 2, 28),
        CfDate::new(2000, 3, 1),
        CfDate::new(2000, 3, 2),
    ];
    let ds = time_series_dataset(dates, vec![0.0, 1.0, 2.0, 3.0, 4.0], "noleap");
    let mut opts = ConvertCalendarOptions::new(Calendar::Standard);
    opts.missing = Some(-9999.0);
    let out = convert_calendar(&ds, &opts)?;

    // 2000 is a leap year in the standard calendar, so Feb 29 appears
    let times = out.time()?;
    assert_eq!(times.len(), 6);
    assert_eq!(times[3], CfDate::new(2000, 2, 29));
    let tas = out.var("tas")?;
    assert_eq!(tas.data[[3]], -9999.0);
    assert_eq!(tas.data[[4]], 3.0);
    Ok(())
}

#[test]
fn test_convert_calendar_360_requires_alignment() {
    let ds = time_series_dataset(
        vec![
            CfDate::new(2000, 1, 1),
            CfDate::new(2000, 1, 2),
            CfDate::new(2000, 1, 3),
        ],
        vec![1.0, 2.0, 3.0],
        "360_day",
    );
    let result = convert_calendar(&ds, &ConvertCalendarOptions::new(Calendar::NoLeap));
    assert!(result.is_err());

    let mut opts = ConvertCalendarOptions::new(Calendar::NoLeap);
    opts.align_on = Some(AlignOn::Year);
    let converted = convert_calendar(&ds, &opts).expect("aligned conversion should work");
    assert_eq!(converted.time().unwrap().len(), 3);
}

#[test]
fn test_clean_up_interpolates_missing_steps() -> Result<()> {
    let dates = vec![
        CfDate::new(2000, 2, 26),
        CfDate::new(2000, 2, 27),
        CfDate::new(2000, 2, 28),
        CfDate::new(2000, 3, 1),
        CfDate::new(2000, 3, 2),
    ];
    let ds = time_series_dataset(dates, vec![0.0, 1.0, 2.0, 3.0, 4.0], "noleap");

    let config: CleanUpConfig = serde_json::from_str(
        r#"{
            "convert_calendar": {"target": "standard"},
            "missing_by_var": {"tas": "interpolate"}
        }"#,
    )
    .unwrap();
    let out = clean_up(ds, &config)?;

    let tas = out.var("tas")?;
    assert_eq!(tas.data.shape(), &[6]);
    // Feb 29 sits halfway between Feb 28 (2.0) and Mar 1 (3.0)
    assert!((tas.data[[3]] - 2.5).abs() < 1e-12);
    assert_eq!(tas.attrs.get_text("units"), Some("K"));
    Ok(())
}

#[test]
fn test_clean_up_missing_policy_must_cover_all_vars() {
    let dates = vec![
        CfDate::new(2000, 1, 1),
        CfDate::new(2000, 1, 2),
        CfDate::new(2000, 1, 3),
    ];
    let mut ds = time_series_dataset(dates, vec![1.0, 2.0, 3.0], "noleap");
    let data = ArrayD::from_shape_vec(IxDyn(&[3]), vec![4.0, 5.0, 6.0]).unwrap();
    ds.add_var(
        "pr",
        DataArray::new(vec!["time".to_string()], data).unwrap(),
    );

    let config: CleanUpConfig = serde_json::from_str(
        r#"{
            "convert_calendar": {"target": "standard"},
            "missing_by_var": {"tas": "interpolate"}
        }"#,
    )
    .unwrap();
    match clean_up(ds, &config) {
        Err(WrangleError::MissingPolicyGap { vars }) => assert_eq!(vars, vec!["pr"]),
        other => panic!("Expected MissingPolicyGap, got {:?}", other),
    }
}

#[test]
fn test_clean_up_preserves_always_missing_points() -> Result<()> {
    // one grid point is NaN at every time step; calendar conversion must
    // not invent data there
    let dates = vec![
        CfDate::new(2000, 2, 28),
        CfDate::new(2000, 2, 29),
        CfDate::new(2000, 3, 1),
    ];
    let mut ds = Dataset::new();
    let values = vec![1.0, f64::NAN, 2.0, f64::NAN, 3.0, f64::NAN];
    let data = ArrayD::from_shape_vec(IxDyn(&[3, 2]), values).unwrap();
    ds.add_var(
        "tas",
        DataArray::new(vec!["time".to_string(), "loc".to_string()], data).unwrap(),
    );
    let mut time = Coord::new("time", CoordData::Time(dates));
    time.attrs.set("calendar", "standard");
    ds.set_coord("time", time);

    let config: CleanUpConfig =
        serde_json::from_str(r#"{"convert_calendar": {"target": "noleap"}}"#).unwrap();
    let out = clean_up(ds, &config)?;
    let tas = out.var("tas")?;
    assert_eq!(tas.data.shape(), &[2, 2]);
    assert!(tas.data[[0, 1]].is_nan());
    assert!(tas.data[[1, 1]].is_nan());
    assert_eq!(tas.data[[0, 0]], 1.0);
    Ok(())
}

#[test]
fn test_clean_up_attribute_stages_in_order() -> Result<()> {
    let mut ds = grid_dataset();
    ds.attrs.set("note", "scratch");
    ds.var_mut("tas")?.attrs.set("old_name", "temperature");

    // to_level runs before the pattern removal, so the freshly assigned
    // processing level is removed again by the ^cat: pattern
    let config: CleanUpConfig = serde_json::from_str(
        r#"{
            "to_level": "final",
            "attrs_to_remove": {"global": ["^cat:", "note*"], "tas": ["old_name"]},
            "add_attrs": {"global": {"title": "amazing new dataset"}}
        }"#,
    )
    .unwrap();
    let out = clean_up(ds, &config)?;

    assert!(out.attrs.get("cat:processing_level").is_none());
    assert!(out.attrs.get("cat:domain").is_none());
    assert!(out.attrs.get("note").is_none());
    assert_eq!(out.attrs.get_text("title"), Some("amazing new dataset"));
    assert!(out.var("tas")?.attrs.get("old_name").is_none());
    assert_eq!(out.var("tas")?.attrs.get_text("units"), Some("K"));
    Ok(())
}

#[test]
fn test_clean_up_remove_all_except_and_prefix() -> Result<()> {
    let ds = grid_dataset();
    let config: CleanUpConfig = serde_json::from_str(
        r#"{
            "remove_all_attrs_except": {"global": ["^cat:"]},
            "change_attr_prefix": "dataset:"
        }"#,
    )
    .unwrap();
    let out = clean_up(ds, &config)?;
    assert_eq!(out.attrs.get_text("dataset:domain"), Some("NAM"));
    assert_eq!(out.attrs.get_text("dataset:source"), Some("TestModel"));
    assert!(out.attrs.get("cat:domain").is_none());
    Ok(())
}

#[test]
fn test_clean_up_common_attrs_only() -> Result<()> {
    let mut ds = grid_dataset();
    ds.attrs.set("cat:date_start", "2000-01-01");
    ds.attrs.set("title", "shared title");
    ds.attrs.set("note", "mine");

    let mut other = grid_dataset();
    other.attrs.set("title", "shared title");
    other.attrs.set("note", "theirs");

    let mut config = CleanUpConfig::default();
    config.common_attrs_only = Some(vec![CommonAttrsSource::InMemory(Box::new(other))]);
    let out = clean_up(ds, &config)?;

    // identical attrs survive, differing and date-range attrs are dropped
    assert_eq!(out.attrs.get_text("title"), Some("shared title"));
    assert_eq!(out.attrs.get_text("cat:domain"), Some("NAM"));
    assert!(out.attrs.get("note").is_none());
    assert!(out.attrs.get("cat:date_start").is_none());
    // and the identifier is regenerated from the remaining catalog attrs
    assert_eq!(out.attrs.get_text("cat:id"), Some("TestModel_NAM"));
    Ok(())
}

#[test]
fn test_clean_up_round_var() -> Result<()> {
    let mut ds = grid_dataset();
    ds.var_mut("tas")?.data.mapv_inplace(|v| v + 0.12345);
    let config: CleanUpConfig =
        serde_json::from_str(r#"{"round_var": {"tas": 2}}"#).unwrap();
    let out = clean_up(ds, &config)?;
    assert!((out.var("tas")?.data[[0, 0]] - 0.12).abs() < 1e-12);
    assert!((out.var("tas")?.data[[1, 0]] - 4.12).abs() < 1e-12);
    Ok(())
}

#[test]
fn test_netcdf_round_trip() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("round_trip.nc");

    let mut ds = Dataset::new();
    let values: Vec<f64> = (0..6).map(f64::from).collect();
    let data = ArrayD::from_shape_vec(IxDyn(&[3, 2]), values).unwrap();
    let mut tas = DataArray::new(vec!["time".to_string(), "lat".to_string()], data).unwrap();
    tas.attrs.set("units", "K");
    tas.attrs.set("long_name", "air temperature");
    ds.add_var("tas", tas);
    ds.set_coord("lat", Coord::new("lat", CoordData::Float(vec![45.0, 46.0])));
    let dates = vec![
        CfDate::new(2000, 1, 1),
        CfDate::new(2000, 1, 2),
        CfDate::new(2000, 1, 3),
    ];
    let mut time = Coord::new("time", CoordData::Time(dates.clone()));
    time.attrs.set("calendar", "noleap");
    ds.set_coord("time", time);
    ds.attrs.set("cat:domain", "NAM");
    ds.attrs.set("cat:version", 3i64);

    write_dataset(&ds, &path)?;
    let back = read_dataset(&path)?;

    assert_eq!(back.attrs.get_text("cat:domain"), Some("NAM"));
    assert_eq!(back.attrs.get("cat:version"), Some(&AttrValue::Int(3)));
    assert!(back.attrs.contains("history"));

    let tas = back.var("tas")?;
    assert_eq!(tas.dims, vec!["time", "lat"]);
    assert_eq!(tas.data[[2, 1]], 5.0);
    assert_eq!(tas.attrs.get_text("long_name"), Some("air temperature"));

    assert_eq!(back.time()?, dates.as_slice());
    assert_eq!(
        back.coord("lat").unwrap().values,
        CoordData::Float(vec![45.0, 46.0])
    );
    Ok(())
}

#[test]
fn test_release_notes_markdown() -> Result<()> {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("HISTORY.rst");
    std::fs::write(
        &path,
        "=======\nHistory\n=======\n\nv0.2.0\n------\nContributors: :user:`jdoe`.\n\nNew features\n^^^^^^^^^^^^\n* Fixed the thing. (:issue:`12`, :pull:`13`)\n* See `the docs <https://example.org/docs>`_ for details.\n",
    )?;

    let md = publish_release_notes(ReleaseNotesStyle::Md, Some(&path))?;
    assert!(md.contains("# History"));
    assert!(md.contains("## v0.2.0"));
    assert!(md.contains("### New features"));
    assert!(md.contains("[GH/12](https://github.com/user/ClimWrangle/issues/12)"));
    assert!(md.contains("[PR/13](https://github.com/user/ClimWrangle/pull/13)"));
    assert!(md.contains("[@jdoe](https://github.com/jdoe)"));
    assert!(md.contains("[the docs](https://example.org/docs)"));
    assert!(!md.contains(":issue:"));

    let rst = publish_release_notes(ReleaseNotesStyle::Rst, Some(&path))?;
    assert!(rst.contains("`GH/12 <https://github.com/user/ClimWrangle/issues/12>`_"));
    assert!(rst.contains("Contributors: `@jdoe <https://github.com/jdoe>`_."));
    Ok(())
}

#[test]
fn test_release_notes_errors() {
    let missing = publish_release_notes(
        ReleaseNotesStyle::Md,
        Some(std::path::Path::new("/nonexistent/HISTORY.rst")),
    );
    assert!(matches!(missing, Err(WrangleError::HistoryNotFound { .. })));

    let style: std::result::Result<ReleaseNotesStyle, _> = "pdf".parse();
    match style {
        Err(WrangleError::UnknownStyle { style }) => assert_eq!(style, "pdf"),
        other => panic!("Expected UnknownStyle, got {:?}", other),
    }
}

#[test]
fn test_crate_history_renders() -> Result<()> {
    // the shipped HISTORY.rst must go through the formatter cleanly
    let md = publish_release_notes(ReleaseNotesStyle::Md, None)?;
    assert!(md.contains("# History"));
    assert!(md.starts_with("# History") || md.contains("\n# History"));
    Ok(())
}
