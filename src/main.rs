//! Entry point for the ClimWrangle application.
//! Handles CLI parsing, file loading, and dispatches operations like the
//! clean-up pipeline, season unstacking and vocabulary translation.

use clap::Parser;
use clim_wrangle::cleanup::{clean_up, CleanUpConfig};
use clim_wrangle::cli::Args;
use clim_wrangle::errors::{Result, WrangleError};
use clim_wrangle::netcdf_io::{read_dataset, write_dataset};
use clim_wrangle::release_notes::publish_release_notes;
use clim_wrangle::seasons::unstack_dates;
use clim_wrangle::vocab;
use std::fs;

fn main() -> Result<()> {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if args.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    println!(
        r#"
------------------------------------------------------------------
      ____ _ _          __        __                    _
     / ___| (_)_ __ ___ \ \      / / __ __ _ _ __   __ _| | ___
    | |   | | | '_ ` _ \ \ \ /\ / / '__/ _` | '_ \ / _` | |/ _ \
    | |___| | | | | | | | \ V  V /| | | (_| | | | | (_| | |  __/
     \____|_|_|_| |_| |_|  \_/\_/ |_|  \__,_|_| |_|\__, |_|\___|
                                                   |___/
                Rust-based climate dataset wrangler
------------------------------------------------------------------
"#
    );

    if let Some(style) = &args.release_notes {
        let notes = publish_release_notes(style.parse()?, None)?;
        println!("{}", notes);
        return Ok(());
    }

    if let Some((vocab_name, key)) = &args.translate {
        let vocabulary = vocab::defaults().get(vocab_name).ok_or_else(|| {
            WrangleError::Generic(format!("No vocabulary named '{}'", vocab_name))
        })?;
        let value = vocabulary.lookup(key, &vocab::MissingPolicy::Raise)?;
        println!("{} -> {}", key, value);
        return Ok(());
    }

    let file = args.file.ok_or_else(|| {
        WrangleError::Generic("No input file given; see --help".to_string())
    })?;
    let mut ds = read_dataset(&file)?;
    println!("Successfully opened NetCDF file: {}", file.display());

    if let Some(config_path) = &args.clean {
        let config: CleanUpConfig = serde_json::from_str(&fs::read_to_string(config_path)?)?;
        ds = clean_up(ds, &config)?;
        println!("✅ Clean-up pipeline finished");
    }

    if args.unstack_dates {
        ds = unstack_dates(&ds, None, &args.season_dim)?;
        println!("✅ Time axis unstacked into 'time' × '{}'", args.season_dim);
    }

    if let Some(output) = &args.output_netcdf {
        write_dataset(&ds, output)?;
        println!("✅ Saved result to {}", output.display());
    } else if args.list_vars || (args.clean.is_none() && !args.unstack_dates) {
        ds.print_summary();
    }

    Ok(())
}
