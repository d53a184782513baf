// mdr-common/src/model/platform.rs
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MdrError;

/// Which classpath is being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionScope {
    #[default]
    Compile,
    Runtime,
}

impl ResolutionScope {
    /// Whether a POM dependency declared with `scope` belongs to this classpath.
    pub fn accepts_pom_scope(&self, scope: Option<&str>) -> bool {
        match (self, scope.unwrap_or("compile")) {
            (_, "compile") => true,
            (ResolutionScope::Runtime, "runtime") => true,
            _ => false,
        }
    }

    /// Value of `org.gradle.usage` matching this scope on the given platform.
    pub fn accepts_usage(&self, usage: &str) -> bool {
        match self {
            ResolutionScope::Compile => usage.ends_with("-api"),
            ResolutionScope::Runtime => usage.ends_with("-runtime"),
        }
    }

    /// A runtime classpath may fall back to api variants when a module publishes no
    /// runtime variant.
    pub fn fallback(&self) -> Option<ResolutionScope> {
        match self {
            ResolutionScope::Runtime => Some(ResolutionScope::Compile),
            ResolutionScope::Compile => None,
        }
    }
}

impl fmt::Display for ResolutionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionScope::Compile => f.write_str("compile"),
            ResolutionScope::Runtime => f.write_str("runtime"),
        }
    }
}

impl FromStr for ResolutionScope {
    type Err = MdrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "compile" => Ok(ResolutionScope::Compile),
            "runtime" => Ok(ResolutionScope::Runtime),
            other => Err(MdrError::Config(format!("Unknown scope '{other}'"))),
        }
    }
}

/// Value of `org.jetbrains.kotlin.platform.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlatformType {
    Common,
    Jvm,
    AndroidJvm,
    Js,
    Wasm,
    Native,
}

impl PlatformType {
    pub fn value(&self) -> &'static str {
        match self {
            PlatformType::Common => "common",
            PlatformType::Jvm => "jvm",
            PlatformType::AndroidJvm => "androidJvm",
            PlatformType::Js => "js",
            PlatformType::Wasm => "wasm",
            PlatformType::Native => "native",
        }
    }

    pub fn fallback(&self) -> Option<PlatformType> {
        match self {
            PlatformType::AndroidJvm => Some(PlatformType::Jvm),
            _ => None,
        }
    }
}

/// A leaf platform an artifact can be resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionPlatform {
    Jvm,
    Android,
    Js,
    Wasm,
    IosArm64,
    IosX64,
    IosSimulatorArm64,
    MacosArm64,
    MacosX64,
    LinuxX64,
    LinuxArm64,
    MingwX64,
}

impl ResolutionPlatform {
    pub const ALL: [ResolutionPlatform; 12] = [
        ResolutionPlatform::Jvm,
        ResolutionPlatform::Android,
        ResolutionPlatform::Js,
        ResolutionPlatform::Wasm,
        ResolutionPlatform::IosArm64,
        ResolutionPlatform::IosX64,
        ResolutionPlatform::IosSimulatorArm64,
        ResolutionPlatform::MacosArm64,
        ResolutionPlatform::MacosX64,
        ResolutionPlatform::LinuxX64,
        ResolutionPlatform::LinuxArm64,
        ResolutionPlatform::MingwX64,
    ];

    pub fn platform_type(&self) -> PlatformType {
        match self {
            ResolutionPlatform::Jvm => PlatformType::Jvm,
            ResolutionPlatform::Android => PlatformType::AndroidJvm,
            ResolutionPlatform::Js => PlatformType::Js,
            ResolutionPlatform::Wasm => PlatformType::Wasm,
            _ => PlatformType::Native,
        }
    }

    /// Value of `org.jetbrains.kotlin.native.target` for native platforms.
    pub fn native_target(&self) -> Option<&'static str> {
        match self {
            ResolutionPlatform::IosArm64 => Some("ios_arm64"),
            ResolutionPlatform::IosX64 => Some("ios_x64"),
            ResolutionPlatform::IosSimulatorArm64 => Some("ios_simulator_arm64"),
            ResolutionPlatform::MacosArm64 => Some("macos_arm64"),
            ResolutionPlatform::MacosX64 => Some("macos_x64"),
            ResolutionPlatform::LinuxX64 => Some("linux_x64"),
            ResolutionPlatform::LinuxArm64 => Some("linux_arm64"),
            ResolutionPlatform::MingwX64 => Some("mingw_x64"),
            _ => None,
        }
    }

    /// Value of `org.gradle.jvm.environment` preferred on JVM-like platforms.
    pub fn jvm_environment(&self) -> Option<&'static str> {
        match self {
            ResolutionPlatform::Jvm => Some("standard-jvm"),
            ResolutionPlatform::Android => Some("android"),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResolutionPlatform::Jvm => "jvm",
            ResolutionPlatform::Android => "android",
            ResolutionPlatform::Js => "js",
            ResolutionPlatform::Wasm => "wasm",
            ResolutionPlatform::IosArm64 => "iosArm64",
            ResolutionPlatform::IosX64 => "iosX64",
            ResolutionPlatform::IosSimulatorArm64 => "iosSimulatorArm64",
            ResolutionPlatform::MacosArm64 => "macosArm64",
            ResolutionPlatform::MacosX64 => "macosX64",
            ResolutionPlatform::LinuxX64 => "linuxX64",
            ResolutionPlatform::LinuxArm64 => "linuxArm64",
            ResolutionPlatform::MingwX64 => "mingwX64",
        }
    }
}

impl fmt::Display for ResolutionPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ResolutionPlatform {
    type Err = MdrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResolutionPlatform::ALL
            .iter()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| MdrError::Config(format!("Unknown platform '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pom_scopes_map_to_classpaths() {
        assert!(ResolutionScope::Compile.accepts_pom_scope(None));
        assert!(ResolutionScope::Compile.accepts_pom_scope(Some("compile")));
        assert!(!ResolutionScope::Compile.accepts_pom_scope(Some("runtime")));
        assert!(ResolutionScope::Runtime.accepts_pom_scope(Some("runtime")));
        assert!(!ResolutionScope::Runtime.accepts_pom_scope(Some("test")));
        assert!(!ResolutionScope::Runtime.accepts_pom_scope(Some("provided")));
    }

    #[test]
    fn platforms_round_trip_through_names() {
        for platform in ResolutionPlatform::ALL {
            assert_eq!(platform.name().parse::<ResolutionPlatform>().unwrap(), platform);
        }
        assert_eq!(
            ResolutionPlatform::IosArm64.native_target(),
            Some("ios_arm64")
        );
        assert_eq!(
            ResolutionPlatform::Android.platform_type().fallback(),
            Some(PlatformType::Jvm)
        );
    }
}
