//! Release history formatting
//!
//! Rewrites the crate's `HISTORY.rst` between the ReStructuredText and
//! Markdown conventions: issue/pull/user roles become hyperlinks, section
//! underlines become heading markers. Exists solely for development
//! purposes.

use crate::errors::{Result, WrangleError};
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

const REPO_URL: &str = "https://github.com/user/ClimWrangle";

/// Output convention of [`publish_release_notes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseNotesStyle {
    Md,
    Rst,
}

impl FromStr for ReleaseNotesStyle {
    type Err = WrangleError;

    fn from_str(token: &str) -> Result<Self> {
        match token {
            "md" | "markdown" => Ok(ReleaseNotesStyle::Md),
            "rst" => Ok(ReleaseNotesStyle::Rst),
            other => Err(WrangleError::UnknownStyle {
                style: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for ReleaseNotesStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseNotesStyle::Md => write!(f, "md"),
            ReleaseNotesStyle::Rst => write!(f, "rst"),
        }
    }
}

/// Format the release history in Markdown or ReStructuredText.
///
/// Reads `HISTORY.rst` next to the crate manifest unless an explicit path
/// is given; a missing file is a not-found error.
pub fn publish_release_notes(
    style: ReleaseNotesStyle,
    history_file: Option<&Path>,
) -> Result<String> {
    let default_path = PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/HISTORY.rst"));
    let path = history_file.unwrap_or(&default_path);
    if !path.exists() {
        return Err(WrangleError::HistoryNotFound {
            path: path.to_path_buf(),
        });
    }
    let mut history = fs::read_to_string(path)?;

    let issue_re = Regex::new(r":issue:`([0-9]+)`").unwrap();
    let pull_re = Regex::new(r":pull:`([0-9]+)`").unwrap();
    let user_re = Regex::new(r":user:`([a-zA-Z0-9_.-]+)`").unwrap();
    history = match style {
        ReleaseNotesStyle::Rst => {
            let history = issue_re
                .replace_all(&history, format!("`GH/$1 <{}/issues/$1>`_", REPO_URL))
                .into_owned();
            let history = pull_re
                .replace_all(&history, format!("`PR/$1 <{}/pull/$1>`_", REPO_URL))
                .into_owned();
            user_re
                .replace_all(&history, "`@$1 <https://github.com/$1>`_")
                .into_owned()
        }
        ReleaseNotesStyle::Md => {
            let history = issue_re
                .replace_all(&history, format!("[GH/$1]({}/issues/$1)", REPO_URL))
                .into_owned();
            let history = pull_re
                .replace_all(&history, format!("[PR/$1]({}/pull/$1)", REPO_URL))
                .into_owned();
            user_re
                .replace_all(&history, "[@$1](https://github.com/$1)")
                .into_owned()
        }
    };

    if style == ReleaseNotesStyle::Md {
        history = rst_headings_to_md(&history);
        let link_re = Regex::new(r"`([\w\s][^`<]*)<([^>]+)>`_").unwrap();
        history = link_re
            .replace_all(&history, |caps: &regex::Captures| {
                format!("[{}]({})", caps[1].trim(), &caps[2])
            })
            .into_owned();
    }

    Ok(history)
}

fn is_underline(line: &str, marker: char) -> bool {
    !line.is_empty() && line.chars().all(|c| c == marker)
}

/// Turn RST over/underlined titles into Markdown heading levels
fn rst_headings_to_md(history: &str) -> String {
    let lines: Vec<&str> = history.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        // over+underlined document title
        if is_underline(line, '=')
            && i + 2 < lines.len()
            && !lines[i + 1].trim().is_empty()
            && is_underline(lines[i + 2], '=')
        {
            out.push(format!("# {}", lines[i + 1].trim()));
            i += 3;
            continue;
        }
        if !line.is_empty() && i + 1 < lines.len() {
            let next = lines[i + 1];
            if is_underline(next, '-') {
                out.push(format!("## {}", line));
                i += 2;
                continue;
            }
            if is_underline(next, '^') {
                out.push(format!("### {}", line));
                i += 2;
                continue;
            }
        }
        out.push(line.to_string());
        i += 1;
    }
    let mut joined = out.join("\n");
    if history.ends_with('\n') {
        joined.push('\n');
    }
    joined
}
