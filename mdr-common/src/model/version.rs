// mdr-common/src/model/version.rs
//! Maven-style version ordering, version ranges and declared version constraints.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{MdrError, Result};

#[derive(Debug, Clone)]
enum Item {
    /// Digits with leading zeros stripped.
    Number(String),
    Qualifier(String),
}

/// A version string with Maven ordering semantics.
///
/// Numeric segments compare numerically, qualifiers follow
/// `alpha < beta < milestone < rc < snapshot < release < sp`, unknown qualifiers sort
/// lexically after the known ones, and trailing zero segments are insignificant
/// (`1.0 == 1.0.0 == 1`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Version {
    raw: String,
    items: Vec<Item>,
}

impl Version {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim().to_string();
        let items = normalize(tokenize(&raw));
        Self { raw, items }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn tokenize(raw: &str) -> Vec<Item> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut current_is_digit = false;

    let flush = |current: &mut String, is_digit: bool, items: &mut Vec<Item>| {
        if current.is_empty() {
            return;
        }
        if is_digit {
            let trimmed = current.trim_start_matches('0');
            items.push(Item::Number(if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() }));
        } else {
            items.push(Item::Qualifier(current.to_ascii_lowercase()));
        }
        current.clear();
    };

    for c in raw.chars() {
        if c == '.' || c == '-' || c == '_' || c == '+' {
            flush(&mut current, current_is_digit, &mut items);
            continue;
        }
        let is_digit = c.is_ascii_digit();
        if !current.is_empty() && is_digit != current_is_digit {
            flush(&mut current, current_is_digit, &mut items);
        }
        current_is_digit = is_digit;
        current.push(c);
    }
    flush(&mut current, current_is_digit, &mut items);
    items
}

fn is_null(item: &Item) -> bool {
    match item {
        Item::Number(n) => n == "0",
        Item::Qualifier(q) => qualifier_rank(q) == RELEASE_RANK,
    }
}

/// Drops zero segments and release qualifiers that end a numeric run, so that
/// `1.0.0-alpha` and `1-alpha` compare equal.
fn normalize(items: Vec<Item>) -> Vec<Item> {
    let mut out: Vec<Item> = Vec::with_capacity(items.len());
    for item in items.into_iter().rev() {
        let ends_run = matches!(out.last(), None | Some(Item::Qualifier(_)));
        if ends_run && is_null(&item) && !out.is_empty() {
            if let Item::Number(_) = item {
                continue;
            }
        }
        if out.is_empty() && is_null(&item) {
            continue;
        }
        out.push(item);
    }
    out.reverse();
    out
}

const RELEASE_RANK: u8 = 5;

fn qualifier_rank(q: &str) -> u8 {
    match q {
        "alpha" | "a" => 0,
        "beta" | "b" => 1,
        "milestone" | "m" => 2,
        "rc" | "cr" => 3,
        "snapshot" => 4,
        "" | "ga" | "final" | "release" => RELEASE_RANK,
        "sp" => 6,
        _ => 7,
    }
}

fn compare_qualifiers(a: &str, b: &str) -> Ordering {
    let (ra, rb) = (qualifier_rank(a), qualifier_rank(b));
    if ra == 7 && rb == 7 {
        return a.cmp(b);
    }
    ra.cmp(&rb)
}

fn compare_numbers(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_items(a: Option<&Item>, b: Option<&Item>) -> Ordering {
    match (a, b) {
        (Some(Item::Number(x)), Some(Item::Number(y))) => compare_numbers(x, y),
        (Some(Item::Number(_)), Some(Item::Qualifier(_))) => Ordering::Greater,
        (Some(Item::Qualifier(_)), Some(Item::Number(_))) => Ordering::Less,
        (Some(Item::Qualifier(x)), Some(Item::Qualifier(y))) => compare_qualifiers(x, y),
        (Some(Item::Number(x)), None) => compare_numbers(x, "0"),
        (None, Some(Item::Number(y))) => compare_numbers("0", y),
        (Some(Item::Qualifier(x)), None) => compare_qualifiers(x, ""),
        (None, Some(Item::Qualifier(y))) => compare_qualifiers("", y),
        (None, None) => Ordering::Equal,
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.items.len().max(other.items.len());
        for i in 0..len {
            let ord = compare_items(self.items.get(i), other.items.get(i));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for item in &self.items {
            match item {
                Item::Number(n) => n.hash(state),
                Item::Qualifier(q) => qualifier_rank(q).hash(state),
            }
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<String> for Version {
    fn from(raw: String) -> Self {
        Version::parse(&raw)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.raw
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    version: Version,
    inclusive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Interval {
    lower: Option<Bound>,
    upper: Option<Bound>,
}

impl Interval {
    fn contains(&self, v: &Version) -> bool {
        let above = match &self.lower {
            None => true,
            Some(b) if b.inclusive => v >= &b.version,
            Some(b) => v > &b.version,
        };
        let below = match &self.upper {
            None => true,
            Some(b) if b.inclusive => v <= &b.version,
            Some(b) => v < &b.version,
        };
        above && below
    }
}

/// A Maven version range such as `[1.0,2.0)`, `(,1.5]`, `[1.2]` or the union
/// `[1,2),[3,4)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    raw: String,
    intervals: Vec<Interval>,
}

impl VersionRange {
    pub fn is_range(raw: &str) -> bool {
        let raw = raw.trim();
        raw.starts_with('[') || raw.starts_with('(')
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let text = raw.trim();
        let invalid = |why: &str| MdrError::InvalidVersion(raw.to_string(), why.to_string());
        let mut intervals = Vec::new();
        let mut rest = text;

        while !rest.is_empty() {
            let open = rest.chars().next().ok_or_else(|| invalid("empty range"))?;
            if open != '[' && open != '(' {
                return Err(invalid("expected '[' or '('"));
            }
            let close_at = rest
                .find([']', ')'])
                .ok_or_else(|| invalid("unterminated range"))?;
            let close = &rest[close_at..=close_at];
            let body = &rest[1..close_at];
            let lower_inclusive = open == '[';
            let upper_inclusive = close == "]";

            let interval = match body.split_once(',') {
                None => {
                    let v = body.trim();
                    if v.is_empty() || !lower_inclusive || !upper_inclusive {
                        return Err(invalid("a single version range must be written [v]"));
                    }
                    let bound = Bound { version: Version::parse(v), inclusive: true };
                    Interval { lower: Some(bound.clone()), upper: Some(bound) }
                }
                Some((lo, hi)) => {
                    let (lo, hi) = (lo.trim(), hi.trim());
                    if hi.contains(',') {
                        return Err(invalid("too many bounds in one interval"));
                    }
                    let lower = (!lo.is_empty())
                        .then(|| Bound { version: Version::parse(lo), inclusive: lower_inclusive });
                    let upper = (!hi.is_empty())
                        .then(|| Bound { version: Version::parse(hi), inclusive: upper_inclusive });
                    if let (Some(l), Some(u)) = (&lower, &upper) {
                        if l.version > u.version {
                            return Err(invalid("lower bound is above upper bound"));
                        }
                    }
                    Interval { lower, upper }
                }
            };
            intervals.push(interval);

            rest = rest[close_at + 1..].trim_start();
            if let Some(stripped) = rest.strip_prefix(',') {
                rest = stripped.trim_start();
            }
        }

        if intervals.is_empty() {
            return Err(invalid("empty range"));
        }
        Ok(Self { raw: text.to_string(), intervals })
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.intervals.iter().any(|i| i.contains(version))
    }

    /// Inclusive lower bounds, usable as candidates when no version listing is available.
    pub fn inclusive_lower_bounds(&self) -> Vec<Version> {
        self.intervals
            .iter()
            .filter_map(|i| i.lower.as_ref().filter(|b| b.inclusive).map(|b| b.version.clone()))
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A version requirement as declared by a caller, a POM, a module file or a BOM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    /// A plain requirement; conflict resolution may pick a higher version.
    Soft(Version),
    /// An exact version that must not be changed (`strictly` or a trailing `!!`).
    Strict(Version),
    Range(VersionRange),
}

impl VersionConstraint {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(MdrError::InvalidVersion(raw.to_string(), "empty version".to_string()));
        }
        if let Some(exact) = raw.strip_suffix("!!") {
            return Ok(VersionConstraint::Strict(Version::parse(exact)));
        }
        if VersionRange::is_range(raw) {
            return Ok(VersionConstraint::Range(VersionRange::parse(raw)?));
        }
        Ok(VersionConstraint::Soft(Version::parse(raw)))
    }

    /// Soft requirements never reject a version; they only nominate candidates.
    pub fn is_satisfied_by(&self, version: &Version) -> bool {
        match self {
            VersionConstraint::Soft(_) => true,
            VersionConstraint::Strict(v) => v == version,
            VersionConstraint::Range(r) => r.contains(version),
        }
    }

    pub fn is_hard(&self) -> bool {
        !matches!(self, VersionConstraint::Soft(_))
    }

    /// The concrete version this constraint nominates, if it names one.
    pub fn nominated(&self) -> Option<&Version> {
        match self {
            VersionConstraint::Soft(v) | VersionConstraint::Strict(v) => Some(v),
            VersionConstraint::Range(_) => None,
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Soft(v) => write!(f, "{v}"),
            VersionConstraint::Strict(v) => write!(f, "{{strictly {v}}}"),
            VersionConstraint::Range(r) => write!(f, "{r}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s)
    }

    #[test]
    fn numeric_segments_compare_numerically() {
        assert!(v("2.3.10") > v("2.3.9"));
        assert!(v("1.10") > v("1.9.9"));
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("1"), v("1.0"));
    }

    #[test]
    fn qualifiers_follow_maven_order() {
        assert!(v("1.0-alpha1") < v("1.0-beta"));
        assert!(v("1.0-beta") < v("1.0-M2"));
        assert!(v("1.0-RC1") < v("1.0-SNAPSHOT"));
        assert!(v("1.0-SNAPSHOT") < v("1.0"));
        assert_eq!(v("1.0-final"), v("1.0"));
        assert!(v("1.0") < v("1.0-sp1"));
        assert!(v("1.0-rc1") < v("1.0.1"));
        assert_eq!(v("1.0.0-alpha"), v("1-alpha"));
    }

    #[test]
    fn ranges_honour_bound_kinds() {
        let r = VersionRange::parse("[1.5,2.0)").unwrap();
        assert!(r.contains(&v("1.5")));
        assert!(r.contains(&v("1.9.9")));
        assert!(!r.contains(&v("2.0")));
        assert!(!r.contains(&v("1.0")));

        let open_lower = VersionRange::parse("(,1.0]").unwrap();
        assert!(open_lower.contains(&v("0.1")));
        assert!(!open_lower.contains(&v("1.0.1")));

        let exact = VersionRange::parse("[1.2]").unwrap();
        assert!(exact.contains(&v("1.2")));
        assert!(!exact.contains(&v("1.2.1")));

        let union = VersionRange::parse("[1,2),[3,4)").unwrap();
        assert!(union.contains(&v("3.5")));
        assert!(!union.contains(&v("2.5")));
        assert_eq!(union.inclusive_lower_bounds(), vec![v("1"), v("3")]);
    }

    #[test]
    fn malformed_ranges_are_rejected() {
        assert!(VersionRange::parse("[1.0,2.0").is_err());
        assert!(VersionRange::parse("[2.0,1.0]").is_err());
        assert!(VersionRange::parse("(1.0)").is_err());
    }

    #[test]
    fn constraints_parse_by_shape() {
        assert_eq!(VersionConstraint::parse("1.0").unwrap(), VersionConstraint::Soft(v("1.0")));
        assert_eq!(VersionConstraint::parse("1.0!!").unwrap(), VersionConstraint::Strict(v("1.0")));
        assert!(matches!(VersionConstraint::parse("[1,2)").unwrap(), VersionConstraint::Range(_)));
        assert!(VersionConstraint::parse(" ").is_err());
    }
}
