//! Defines command-line interface options using `clap` for the ClimWrangle application.

use clap::Parser;
use std::path::PathBuf;

/// A CLI tool for wrangling climate NetCDF datasets
#[derive(Parser, Debug)]
#[command(
    author = "ClimWrangle contributors",
    version,
    name = "ClimWrangle",
    about = "Reshape, convert and clean up labeled climate datasets"
)]
pub struct Args {
    /// Path to the NetCDF file to operate on
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// List all dimensions, coordinates and variables of the file
    #[arg(long)]
    pub list_vars: bool,

    /// Run the clean-up pipeline driven by a JSON configuration file
    #[arg(long)]
    pub clean: Option<PathBuf>,

    /// Unstack the time axis into yearly and seasonal axes
    #[arg(long)]
    pub unstack_dates: bool,

    /// Name of the season dimension created by --unstack-dates
    #[arg(long, default_value = "season")]
    pub season_dim: String,

    /// Path to save the result as NetCDF. If not set, prints a summary.
    #[arg(long)]
    pub output_netcdf: Option<PathBuf>,

    /// Translate a key through a shipped vocabulary, formatted as <vocabulary>:<key>
    #[arg(long, value_parser = parse_translate_arg)]
    pub translate: Option<(String, String)>,

    /// Print the release notes in the given style ("md" or "rst")
    #[arg(long)]
    pub release_notes: Option<String>,

    /// Enable verbose output.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

fn parse_translate_arg(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.as_slice() {
        [vocab, key] => Ok(((*vocab).to_string(), (*key).to_string())),
        _ => Err("Invalid format: Expected '<vocabulary>:<key>'.".to_string()),
    }
}
