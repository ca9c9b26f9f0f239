//! Small shared helpers

use once_cell::sync::Lazy;
use regex::Regex;

static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

/// A piece of a string under natural ordering: runs of digits compare as
/// numbers, everything else as lowercased text
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Piece {
    Number(u64),
    Text(String),
}

fn natural_key(value: &str) -> Vec<Piece> {
    let mut pieces = Vec::new();
    let mut last = 0;
    for m in DIGITS.find_iter(value) {
        if m.start() > last {
            pieces.push(Piece::Text(value[last..m.start()].to_lowercase()));
        }
        pieces.push(Piece::Number(m.as_str().parse().unwrap_or(u64::MAX)));
        last = m.end();
    }
    if last < value.len() {
        pieces.push(Piece::Text(value[last..].to_lowercase()));
    }
    pieces
}

/// Sort strings of numbers in a natural order.
///
/// e.g. [r3i1p1, r1i1p1, r10i1p1] is sorted as [r1i1p1, r3i1p1, r10i1p1]
/// instead of [r10i1p1, r1i1p1, r3i1p1].
pub fn natural_sort<S: AsRef<str>>(items: &[S]) -> Vec<String> {
    let mut out: Vec<String> = items.iter().map(|s| s.as_ref().to_string()).collect();
    out.sort_by(|a, b| {
        natural_key(a)
            .cmp(&natural_key(b))
            .then_with(|| a.cmp(b))
    });
    out
}
