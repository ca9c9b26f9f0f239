//! Controlled-vocabulary lookups
//!
//! Vocabularies are flat JSON mappings used to translate inconsistent
//! naming conventions between data sources. A reserved `is_regex` entry
//! switches a vocabulary to first-matching-pattern lookup. The crate ships
//! a set of default vocabularies, loaded once into a process-wide,
//! read-only registry; additional directories can be loaded explicitly.

use crate::errors::{Result, WrangleError};
use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// What a lookup does when the key is not in the mapping
#[derive(Debug, Clone, PartialEq)]
pub enum MissingPolicy {
    /// Raise a not-found error naming the key
    Raise,
    /// Return the key unchanged
    PassKey,
    /// Return this value instead
    Fallback(Value),
}

/// The lookup table of one vocabulary
#[derive(Debug, Clone)]
enum LookupTable {
    Exact(Map<String, Value>),
    /// Patterns in file order; the first full match wins
    Regex(Vec<(Regex, Value)>),
}

/// One controlled vocabulary
#[derive(Debug, Clone)]
pub struct Vocabulary {
    name: String,
    table: LookupTable,
    raw: Map<String, Value>,
}

impl Vocabulary {
    /// Parse a vocabulary from JSON text.
    ///
    /// The document must be a shallow object: values may be strings,
    /// numbers, booleans or arrays of those, never nested objects.
    pub fn from_json(name: &str, path: &Path, text: &str) -> Result<Self> {
        let malformed = |message: String| WrangleError::MalformedVocabulary {
            path: path.to_path_buf(),
            message,
        };

        let value: Value =
            serde_json::from_str(text).map_err(|e| malformed(e.to_string()))?;
        let mut map = match value {
            Value::Object(map) => map,
            other => {
                return Err(malformed(format!(
                    "expected a JSON object, got {}",
                    kind_of(&other)
                )))
            }
        };

        let is_regex = match map.shift_remove("is_regex") {
            None => false,
            Some(Value::Bool(flag)) => flag,
            Some(other) => {
                return Err(malformed(format!(
                    "'is_regex' must be a boolean, got {}",
                    kind_of(&other)
                )))
            }
        };

        for (key, val) in &map {
            let shallow = match val {
                Value::Object(_) => false,
                Value::Array(items) => items.iter().all(|i| !i.is_object() && !i.is_array()),
                _ => true,
            };
            if !shallow {
                return Err(malformed(format!("entry '{}' is not shallow", key)));
            }
        }

        let table = if is_regex {
            let mut patterns = Vec::with_capacity(map.len());
            for (key, val) in &map {
                let re = Regex::new(&format!("^(?:{})$", key))
                    .map_err(|e| malformed(format!("bad pattern '{}': {}", key, e)))?;
                patterns.push((re, val.clone()));
            }
            LookupTable::Regex(patterns)
        } else {
            LookupTable::Exact(map.clone())
        };

        Ok(Self {
            name: name.to_string(),
            table,
            raw: map,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The raw mapping parsed from the file, for introspection
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// Translate a key, applying `policy` when it is not found.
    pub fn lookup(&self, key: &str, policy: &MissingPolicy) -> Result<Value> {
        let found = match &self.table {
            LookupTable::Exact(map) => map.get(key).cloned(),
            LookupTable::Regex(patterns) => patterns
                .iter()
                .find(|(re, _)| re.is_match(key))
                .map(|(_, v)| v.clone()),
        };
        match (found, policy) {
            (Some(value), _) => Ok(value),
            (None, MissingPolicy::Raise) => Err(WrangleError::VocabKeyNotFound {
                vocab: self.name.clone(),
                key: key.to_string(),
            }),
            (None, MissingPolicy::PassKey) => Ok(Value::String(key.to_string())),
            (None, MissingPolicy::Fallback(value)) => Ok(value.clone()),
        }
    }

    /// Like [`lookup`](Self::lookup), but expects a string value.
    pub fn translate(&self, key: &str, policy: &MissingPolicy) -> Result<String> {
        match self.lookup(key, policy)? {
            Value::String(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }
}

/// A read-only set of vocabularies, keyed by name
#[derive(Debug, Clone, Default)]
pub struct VocabRegistry {
    vocabs: BTreeMap<String, Vocabulary>,
}

impl VocabRegistry {
    /// Load every `*.json` file of a directory as a vocabulary.
    ///
    /// A malformed file aborts the whole load with an error naming it.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut vocabs = BTreeMap::new();
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        for path in paths {
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let text = fs::read_to_string(&path)?;
            let vocab = Vocabulary::from_json(&name, &path, &text)?;
            debug!("Loaded vocabulary '{}' from {}", name, path.display());
            vocabs.insert(name, vocab);
        }
        Ok(Self { vocabs })
    }

    pub fn get(&self, name: &str) -> Option<&Vocabulary> {
        self.vocabs.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.vocabs.keys()
    }

    pub fn len(&self) -> usize {
        self.vocabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vocabs.is_empty()
    }
}

macro_rules! embedded_vocabs {
    ($(($name:literal, $file:literal)),+ $(,)?) => {
        [$(($name, include_str!(concat!("vocabularies/", $file)))),+]
    };
}

static DEFAULTS: Lazy<VocabRegistry> = Lazy::new(|| {
    let files = embedded_vocabs![
        ("frequency_to_timedelta", "frequency_to_timedelta.json"),
        ("frequency_to_xrfreq", "frequency_to_xrfreq.json"),
        ("infer_resolution", "infer_resolution.json"),
        ("resampling_methods", "resampling_methods.json"),
        ("variable_names", "variable_names.json"),
        ("xrfreq_to_frequency", "xrfreq_to_frequency.json"),
        ("xrfreq_to_timedelta", "xrfreq_to_timedelta.json"),
    ];
    let mut vocabs = BTreeMap::new();
    for (name, text) in files {
        let vocab = Vocabulary::from_json(name, Path::new(name), text)
            .unwrap_or_else(|err| panic!("While reading vocabulary '{}': {}", name, err));
        vocabs.insert(name.to_string(), vocab);
    }
    VocabRegistry { vocabs }
});

/// The vocabularies shipped with the crate.
///
/// Built once on first access and immutable afterwards. A malformed
/// embedded file aborts the process with a message naming it.
pub fn defaults() -> &'static VocabRegistry {
    &DEFAULTS
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
