// mdr-common/src/model/coordinates.rs
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MdrError, Result};
use crate::model::version::{VersionConstraint, VersionRange};

/// Identity of a module independent of its version (`group:module`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleKey {
    pub group: String,
    pub module: String,
}

impl ModuleKey {
    pub fn new(group: impl Into<String>, module: impl Into<String>) -> Self {
        Self { group: group.into(), module: module.into() }
    }

    /// Repository directory of this module: `org/acme/widget`.
    pub fn path(&self) -> String {
        format!("{}/{}", self.group.replace('.', "/"), self.module)
    }
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group, self.module)
    }
}

/// `group:module[:version]`. The version stays in its declared textual form until a
/// concrete version has been chosen.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coordinates {
    pub group: String,
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Coordinates {
    pub fn new(group: impl Into<String>, module: impl Into<String>, version: Option<String>) -> Self {
        Self { group: group.into(), module: module.into(), version }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |why: &str| MdrError::InvalidCoordinates(raw.to_string(), why.to_string());
        let parts: Vec<&str> = raw.trim().split(':').map(str::trim).collect();
        let (group, module, version) = match parts.as_slice() {
            [g, m] => (*g, *m, None),
            [g, m, v] => (*g, *m, Some(*v)),
            _ => return Err(invalid("expected group:module[:version]")),
        };
        if group.is_empty() || module.is_empty() {
            return Err(invalid("group and module must not be empty"));
        }
        if group.contains(['/', '\\']) || module.contains(['/', '\\']) {
            return Err(invalid("path separators are not allowed"));
        }
        let version = match version {
            Some("") => return Err(invalid("version must not be empty")),
            Some(v) => {
                VersionConstraint::parse(v)?;
                Some(v.to_string())
            }
            None => None,
        };
        Ok(Self::new(group, module, version))
    }

    pub fn key(&self) -> ModuleKey {
        ModuleKey::new(self.group.clone(), self.module.clone())
    }

    /// The declared constraint, `None` when the version is managed elsewhere (a BOM).
    pub fn constraint(&self) -> Result<Option<VersionConstraint>> {
        self.version.as_deref().map(VersionConstraint::parse).transpose()
    }

    /// Repository-relative path of a file of this (concrete) version:
    /// `org/acme/widget/1.0/widget-1.0[-classifier].ext`.
    pub fn file_path(&self, classifier: Option<&str>, extension: &str) -> Result<String> {
        let version = self.concrete_version()?;
        Ok(format!(
            "{}/{}/{}",
            self.key().path(),
            version,
            self.file_name(classifier, extension)?
        ))
    }

    pub fn file_name(&self, classifier: Option<&str>, extension: &str) -> Result<String> {
        let version = self.concrete_version()?;
        Ok(match classifier {
            Some(c) if !c.is_empty() => format!("{}-{}-{}.{}", self.module, version, c, extension),
            _ => format!("{}-{}.{}", self.module, version, extension),
        })
    }

    fn concrete_version(&self) -> Result<&str> {
        match self.version.as_deref() {
            Some(v) if !VersionRange::is_range(v) && !v.ends_with("!!") => Ok(v),
            _ => Err(MdrError::InvalidCoordinates(
                self.to_string(),
                "a concrete version is required to locate files".to_string(),
            )),
        }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}:{}:{}", self.group, self.module, v),
            None => write!(f, "{}:{}", self.group, self.module),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_and_without_version() {
        let c = Coordinates::parse("io.ktor:ktor-client-core-jvm:2.3.8").unwrap();
        assert_eq!(c.group, "io.ktor");
        assert_eq!(c.module, "ktor-client-core-jvm");
        assert_eq!(c.version.as_deref(), Some("2.3.8"));

        let managed = Coordinates::parse("io.ktor:ktor-client-core-jvm").unwrap();
        assert_eq!(managed.version, None);
        assert_eq!(managed.constraint().unwrap(), None);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(Coordinates::parse("just-a-name").is_err());
        assert!(Coordinates::parse("a:b:c:d").is_err());
        assert!(Coordinates::parse(":b:1.0").is_err());
        assert!(Coordinates::parse("a:b:").is_err());
        assert!(Coordinates::parse("a:b:[1.0").is_err());
        assert!(Coordinates::parse("a/../b:c:1.0").is_err());
    }

    #[test]
    fn builds_repository_paths() {
        let c = Coordinates::parse("org.jetbrains.kotlin:kotlin-stdlib:1.9.20").unwrap();
        assert_eq!(
            c.file_path(None, "pom").unwrap(),
            "org/jetbrains/kotlin/kotlin-stdlib/1.9.20/kotlin-stdlib-1.9.20.pom"
        );
        assert_eq!(
            c.file_name(Some("sources"), "jar").unwrap(),
            "kotlin-stdlib-1.9.20-sources.jar"
        );
        let ranged = Coordinates::parse("a:b:[1,2)").unwrap();
        assert!(ranged.file_path(None, "jar").is_err());
    }
}
