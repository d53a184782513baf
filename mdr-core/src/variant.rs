// mdr-core/src/variant.rs
//! Gradle variant selection.
//!
//! Candidates are narrowed in a fixed order: capabilities, Kotlin native target,
//! documentation and category, Kotlin platform type, usage, JVM environment, and
//! finally the number of requested attributes a variant does not carry. A variant
//! that lacks an attribute is compatible with any requested value of it.

use mdr_common::error::{MdrError, Result};
use mdr_common::model::gradle_module::{
    Variant, CATEGORY, DOCS_TYPE, JVM_ENVIRONMENT, KOTLIN_NATIVE_TARGET, KOTLIN_PLATFORM_TYPE,
    USAGE,
};
use mdr_common::model::{GradleModule, PlatformType, ResolutionPlatform, ResolutionScope};
use tracing::debug;

const PUBLISHED_SUFFIX: &str = "-published";
const KOTLIN_METADATA_USAGE: &str = "kotlin-metadata";
const METADATA_VARIANT: &str = "metadataApiElements";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantQuery {
    pub platform: ResolutionPlatform,
    pub scope: ResolutionScope,
}

/// Whether the module is published by the Kotlin multiplatform plugin.
pub fn is_multiplatform(module: &GradleModule) -> bool {
    module
        .variants
        .iter()
        .any(|v| v.attribute(KOTLIN_PLATFORM_TYPE).is_some())
}

/// Name of a variant as it appears in Kotlin project-structure metadata.
pub fn published_name(variant_name: &str) -> &str {
    variant_name.strip_suffix(PUBLISHED_SUFFIX).unwrap_or(variant_name)
}

pub fn select_variant<'a>(module: &'a GradleModule, query: &VariantQuery) -> Result<&'a Variant> {
    let coordinates = module.coordinates();
    let no_match = |why: &str| {
        MdrError::NoMatchingVariant(format!(
            "{coordinates} has no variant for {} ({}): {why}",
            query.platform, query.scope
        ))
    };

    let mut candidates: Vec<&Variant> = module
        .variants
        .iter()
        .filter(|v| has_own_capability(module, v))
        .collect();
    if candidates.is_empty() {
        return Err(no_match("no variant provides the component capability"));
    }

    if let Some(target) = query.platform.native_target() {
        candidates.retain(|v| v.attribute(KOTLIN_NATIVE_TARGET).is_none_or(|t| t == target));
        if candidates.is_empty() {
            return Err(no_match("no variant for this native target"));
        }
    }

    candidates.retain(|v| v.attribute(CATEGORY) != Some("documentation"));
    let libraries: Vec<&Variant> = candidates
        .iter()
        .copied()
        .filter(|v| v.attribute(CATEGORY).is_none_or(|c| c == "library"))
        .collect();
    if !libraries.is_empty() {
        candidates = libraries;
    }

    candidates = by_platform_type(candidates, query.platform.platform_type());
    if candidates.is_empty() {
        return Err(no_match("no variant for this platform type"));
    }

    candidates = by_usage(candidates, query.scope);
    if candidates.is_empty() {
        return Err(no_match("no variant with a matching usage"));
    }

    if let Some(environment) = query.platform.jvm_environment() {
        let narrowed: Vec<&Variant> = candidates
            .iter()
            .copied()
            .filter(|v| v.attribute(JVM_ENVIRONMENT).is_none_or(|e| e == environment))
            .collect();
        if !narrowed.is_empty() {
            candidates = narrowed;
        }
    }

    if candidates.len() > 1 {
        let requested = requested_attributes(query);
        let unmatched = |v: &Variant| {
            requested
                .iter()
                .filter(|name| !v.attributes.contains_key(**name))
                .count()
        };
        let fewest = candidates.iter().map(|v| unmatched(v)).min().unwrap_or(0);
        candidates.retain(|v| unmatched(v) == fewest);
    }

    match candidates.as_slice() {
        [single] => {
            debug!("Selected variant {} of {}", single.name, coordinates);
            Ok(*single)
        }
        [] => Err(no_match("every variant was filtered out")),
        many => {
            let names: Vec<&str> = many.iter().map(|v| v.name.as_str()).collect();
            Err(MdrError::AmbiguousVariant(format!(
                "{coordinates} has {} variants matching {} ({}): {}",
                many.len(),
                query.platform,
                query.scope,
                names.join(", ")
            )))
        }
    }
}

/// The Kotlin common metadata variant used when several platforms are requested.
pub fn select_common_variant(module: &GradleModule) -> Result<&Variant> {
    let coordinates = module.coordinates();
    let metadata: Vec<&Variant> = module
        .variants
        .iter()
        .filter(|v| v.attribute(KOTLIN_PLATFORM_TYPE) == Some(PlatformType::Common.value()))
        .filter(|v| v.attribute(CATEGORY) != Some("documentation"))
        .filter(|v| v.attribute(USAGE) == Some(KOTLIN_METADATA_USAGE))
        .collect();
    match metadata.as_slice() {
        [single] => Ok(*single),
        [] => Err(MdrError::NoMatchingVariant(format!(
            "{coordinates} publishes no Kotlin common metadata variant"
        ))),
        many => many
            .iter()
            .find(|v| v.name == METADATA_VARIANT)
            .copied()
            .ok_or_else(|| {
                let names: Vec<&str> = many.iter().map(|v| v.name.as_str()).collect();
                MdrError::AmbiguousVariant(format!(
                    "{coordinates} has several common metadata variants: {}",
                    names.join(", ")
                ))
            }),
    }
}

/// The sources variant for `platform`, if the module publishes one.
pub fn select_sources_variant(module: &GradleModule, platform: ResolutionPlatform) -> Option<&Variant> {
    let platform_type = platform.platform_type();
    let mut sources: Vec<&Variant> = module
        .variants
        .iter()
        .filter(|v| v.attribute(CATEGORY) == Some("documentation"))
        .filter(|v| v.attribute(DOCS_TYPE) == Some("sources"))
        .filter(|v| {
            platform
                .native_target()
                .is_none_or(|t| v.attribute(KOTLIN_NATIVE_TARGET).is_none_or(|vt| vt == t))
        })
        .collect();
    sources = by_platform_type(sources, platform_type);
    sources.sort_by(|a, b| {
        let key = |v: &Variant| (v.attribute(KOTLIN_PLATFORM_TYPE).is_none(), v.name.clone());
        key(a).cmp(&key(b))
    });
    sources.into_iter().next()
}

fn has_own_capability(module: &GradleModule, variant: &Variant) -> bool {
    variant.capabilities.is_empty()
        || variant
            .capabilities
            .iter()
            .any(|c| c.group == module.component.group && c.name == module.component.module)
}

fn by_platform_type(candidates: Vec<&Variant>, platform_type: PlatformType) -> Vec<&Variant> {
    let carries = |value: &str| {
        candidates
            .iter()
            .any(|v| v.attribute(KOTLIN_PLATFORM_TYPE) == Some(value))
    };
    let wanted = match platform_type.fallback() {
        Some(fallback) if !carries(platform_type.value()) && carries(fallback.value()) => fallback,
        _ => platform_type,
    };
    candidates
        .into_iter()
        .filter(|v| v.attribute(KOTLIN_PLATFORM_TYPE).is_none_or(|t| t == wanted.value()))
        .collect()
}

fn by_usage(candidates: Vec<&Variant>, scope: ResolutionScope) -> Vec<&Variant> {
    let offers = |s: ResolutionScope| {
        candidates
            .iter()
            .any(|v| v.attribute(USAGE).is_some_and(|u| s.accepts_usage(u)))
    };
    let wanted = match scope.fallback() {
        Some(fallback) if !offers(scope) && offers(fallback) => fallback,
        _ => scope,
    };
    candidates
        .into_iter()
        .filter(|v| v.attribute(USAGE).is_none_or(|u| wanted.accepts_usage(u)))
        .collect()
}

fn requested_attributes(query: &VariantQuery) -> Vec<&'static str> {
    let mut names = vec![USAGE, CATEGORY, KOTLIN_PLATFORM_TYPE];
    if query.platform.jvm_environment().is_some() {
        names.push(JVM_ENVIRONMENT);
    }
    if query.platform.native_target().is_some() {
        names.push(KOTLIN_NATIVE_TARGET);
    }
    names
}
