// mdr-common/src/model/gradle_module.rs
//! Gradle Module Metadata (`.module` files).
//!
//! Optional numeric and checksum fields are `Option`s: a publisher that omits `size`
//! has not published a zero-length file.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MdrError, Result};
use crate::model::artifact::Hashes;
use crate::model::coordinates::{Coordinates, ModuleKey};
use crate::model::version::{VersionConstraint, VersionRange};

pub const USAGE: &str = "org.gradle.usage";
pub const CATEGORY: &str = "org.gradle.category";
pub const DOCS_TYPE: &str = "org.gradle.docstype";
pub const JVM_ENVIRONMENT: &str = "org.gradle.jvm.environment";
pub const KOTLIN_PLATFORM_TYPE: &str = "org.jetbrains.kotlin.platform.type";
pub const KOTLIN_NATIVE_TARGET: &str = "org.jetbrains.kotlin.native.target";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    String(String),
}

impl AttributeValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Int(i) => write!(f, "{i}"),
            AttributeValue::String(s) => f.write_str(s),
        }
    }
}

pub type Attributes = BTreeMap<String, AttributeValue>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradleModule {
    pub format_version: String,
    pub component: Component,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<Variant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub group: String,
    pub module: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<ModuleDependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependency_constraints: Vec<ModuleDependency>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<ModuleFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<Capability>,
    #[serde(rename = "available-at", default, skip_serializing_if = "Option::is_none")]
    pub available_at: Option<AvailableAt>,
}

impl Variant {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(AttributeValue::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strictly: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclude {
    pub group: String,
    pub module: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDependency {
    pub group: String,
    pub module: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<Exclude>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ModuleDependency {
    pub fn key(&self) -> ModuleKey {
        ModuleKey::new(self.group.clone(), self.module.clone())
    }

    /// `strictly` wins over `requires`, which wins over `prefers`.
    pub fn constraint(&self) -> Result<Option<VersionConstraint>> {
        let Some(spec) = &self.version else {
            return Ok(None);
        };
        if let Some(strict) = spec.strictly.as_deref() {
            if VersionRange::is_range(strict) {
                return Ok(Some(VersionConstraint::Range(VersionRange::parse(strict)?)));
            }
            return VersionConstraint::parse(&format!("{strict}!!")).map(Some);
        }
        match spec.requires.as_deref().or(spec.prefers.as_deref()) {
            Some(v) => VersionConstraint::parse(v).map(Some),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleFile {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha512: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
}

impl ModuleFile {
    pub fn hashes(&self) -> Hashes {
        Hashes {
            sha512: self.sha512.clone(),
            sha256: self.sha256.clone(),
            sha1: self.sha1.clone(),
            md5: self.md5.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub group: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableAt {
    pub url: String,
    pub group: String,
    pub module: String,
    pub version: String,
}

impl AvailableAt {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.group.clone(), self.module.clone(), Some(self.version.clone()))
    }
}

impl GradleModule {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| MdrError::MalformedMetadata("module".to_string(), e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(MdrError::from)
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(
            self.component.group.clone(),
            self.component.module.clone(),
            Some(self.component.version.clone()),
        )
    }
}
