// mdr-core/src/constraints.rs
//! Version constraints collected per module and the conflict policy that turns them
//! into one version.
//!
//! 1. A strict version declared directly wins outright. Two different direct strict
//!    versions are a conflict; the higher one is used.
//! 2. Otherwise the highest candidate satisfying every hard constraint (ranges and
//!    strict versions) is chosen. Candidates are the versions nominated by any
//!    constraint, the inclusive lower bounds of ranges and, when a range is present,
//!    the versions the repository lists.
//! 3. Otherwise the conflict is reported and the highest candidate is used.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use mdr_common::dependency::DependencyOrigin;
use mdr_common::model::{ModuleKey, Version, VersionConstraint};

/// One constraint on a module and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub constraint: VersionConstraint,
    pub origin: DependencyOrigin,
    /// Label of the node or BOM that declared it.
    pub source: String,
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} from {})", self.constraint, self.origin, self.source)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Chosen(Version),
    /// No candidate satisfies every constraint; `fallback` is used anyway.
    Conflict { fallback: Version, reason: String },
    /// Nothing nominates a version.
    Unversioned,
}

impl Selection {
    pub fn version(&self) -> Option<&Version> {
        match self {
            Selection::Chosen(v) | Selection::Conflict { fallback: v, .. } => Some(v),
            Selection::Unversioned => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConstraintTable {
    entries: BTreeMap<ModuleKey, Vec<Requirement>>,
}

impl ConstraintTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a requirement. Returns `false` when the same one was already present.
    pub fn add(&mut self, key: &ModuleKey, requirement: Requirement) -> bool {
        let list = self.entries.entry(key.clone()).or_default();
        if list.contains(&requirement) {
            return false;
        }
        list.push(requirement);
        true
    }

    pub fn requirements(&self, key: &ModuleKey) -> &[Requirement] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Whether selection for `key` needs the repository's version listing.
    pub fn has_range(&self, key: &ModuleKey) -> bool {
        self.requirements(key)
            .iter()
            .any(|r| matches!(r.constraint, VersionConstraint::Range(_)))
    }

    pub fn select(&self, key: &ModuleKey, listed: &[Version]) -> Selection {
        let requirements = self.requirements(key);

        let direct_strict: BTreeSet<&Version> = requirements
            .iter()
            .filter(|r| r.origin == DependencyOrigin::Direct)
            .filter_map(|r| match &r.constraint {
                VersionConstraint::Strict(v) => Some(v),
                _ => None,
            })
            .collect();
        match direct_strict.len() {
            0 => {}
            1 => {
                if let Some(v) = direct_strict.first() {
                    return Selection::Chosen((*v).clone());
                }
            }
            _ => {
                let declared: Vec<String> = direct_strict.iter().map(ToString::to_string).collect();
                if let Some(v) = direct_strict.last() {
                    return Selection::Conflict {
                        fallback: (*v).clone(),
                        reason: format!("{key} is forced to several versions: {}", declared.join(", ")),
                    };
                }
            }
        }

        let mut candidates: BTreeSet<Version> = BTreeSet::new();
        let mut has_range = false;
        for requirement in requirements {
            match &requirement.constraint {
                VersionConstraint::Soft(v) | VersionConstraint::Strict(v) => {
                    candidates.insert(v.clone());
                }
                VersionConstraint::Range(range) => {
                    has_range = true;
                    candidates.extend(range.inclusive_lower_bounds());
                }
            }
        }
        if has_range {
            candidates.extend(listed.iter().cloned());
        }

        let hard: Vec<&VersionConstraint> = requirements
            .iter()
            .map(|r| &r.constraint)
            .filter(|c| c.is_hard())
            .collect();
        if let Some(best) = candidates
            .iter()
            .rev()
            .find(|v| hard.iter().all(|c| c.is_satisfied_by(v)))
        {
            return Selection::Chosen(best.clone());
        }

        match candidates.last() {
            Some(highest) => {
                let declared: Vec<String> = requirements.iter().map(ToString::to_string).collect();
                Selection::Conflict {
                    fallback: highest.clone(),
                    reason: format!("no version of {key} satisfies {}", declared.join("; ")),
                }
            }
            None => Selection::Unversioned,
        }
    }
}
