// mdr-core/src/metadata.rs
//! Turns repository metadata into [`Descriptor`]s.
//!
//! A `.module` file is preferred over the POM. POMs are reduced to their effective
//! model first: parents folded in, templates expanded, imported BOMs merged and
//! managed versions applied. Descriptors are cached per scope and platform set.

use futures::future::BoxFuture;
use mdr_aio::read_to_bytes_async;
use mdr_common::cache::{Cache, CacheKey};
use mdr_common::dependency::{ArtifactFile, ManagedVersion, Message, Severity};
use mdr_common::error::{MdrError, Result};
use mdr_common::model::gradle_module::{ModuleFile, Variant};
use mdr_common::model::maven_metadata::parse_maven_metadata;
use mdr_common::model::pom::{is_published_with_gradle_metadata, PomDependency};
use mdr_common::model::{Coordinates, GradleModule, ModuleKey, Project, Version, VersionConstraint};
use tracing::{debug, warn};

use crate::cache::{CachedFile, FileRequest};
use crate::context::ResolutionSettings;
use crate::descriptor::{load_descriptor, store_descriptor, Descriptor, DescriptorSource};
use crate::kmp::{platform_variant_names, read_project_structure, shared_source_sets};
use crate::variant::{
    is_multiplatform, select_common_variant, select_sources_variant, select_variant, VariantQuery,
};

/// Parent chains and BOM imports deeper than this are cut off with a warning.
pub const MAX_PARENT_DEPTH: usize = 10;

/// Versions a BOM or platform module manages.
#[derive(Debug, Clone, Default)]
pub struct BomDescription {
    pub managed: Vec<ManagedVersion>,
    pub messages: Vec<Message>,
}

/// Descriptor formats a repository may publish, in lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataKind {
    GradleModule,
    Pom,
}

impl MetadataKind {
    pub const LOOKUP_ORDER: [MetadataKind; 2] = [MetadataKind::GradleModule, MetadataKind::Pom];

    fn cache_key(self, coordinates: &Coordinates) -> Result<CacheKey> {
        match self {
            MetadataKind::GradleModule => CacheKey::gradle_module(coordinates),
            MetadataKind::Pom => CacheKey::pom(coordinates),
        }
    }
}

/// A verified descriptor file from the cache.
#[derive(Debug, Clone)]
pub struct MetadataFile {
    pub kind: MetadataKind,
    pub file: CachedFile,
    pub bytes: Vec<u8>,
}

/// The module's `.module` file when any repository publishes one, otherwise its POM.
pub async fn fetch_metadata(settings: &ResolutionSettings, coordinates: &Coordinates) -> Result<MetadataFile> {
    for kind in MetadataKind::LOOKUP_ORDER {
        if let Some(file) = settings.cache.fetch(FileRequest::new(kind.cache_key(coordinates)?)).await? {
            let bytes = read_to_bytes_async(&file.file.path).await?;
            return Ok(MetadataFile { kind, file, bytes });
        }
    }
    Err(not_found(settings, coordinates))
}

/// Describes `coordinates` (which must carry a concrete version) for the scope and
/// platforms in `settings`.
pub async fn describe(settings: &ResolutionSettings, coordinates: &Coordinates) -> Result<Descriptor> {
    settings.check_cancelled()?;
    let layout = settings.cache.layout();
    let tag = settings.descriptor_tag();

    let metadata = fetch_metadata(settings, coordinates).await?;
    let checksum = metadata.file.sha256();
    if let Some(cached) = load_descriptor(layout, coordinates, &tag, checksum).await {
        return Ok(cached);
    }
    let descriptor = match metadata.kind {
        MetadataKind::GradleModule => {
            let module = GradleModule::parse(&metadata.bytes)?;
            describe_gradle(settings, coordinates, &module, checksum).await?
        }
        MetadataKind::Pom => {
            let mut descriptor = Descriptor::new(coordinates.clone(), DescriptorSource::Pom, checksum);
            if is_published_with_gradle_metadata(&String::from_utf8_lossy(&metadata.bytes)) {
                descriptor.messages.push(Message::warning(
                    "GradleMetadataMissing",
                    format!("{coordinates} was published with Gradle metadata but no .module file was found, using the POM"),
                ));
            }
            let project =
                effective_model(settings, Project::parse(&metadata.bytes)?, &mut descriptor.messages, 0).await?;
            describe_pom(settings, coordinates, &project, &mut descriptor)?;
            descriptor
        }
    };
    remember(layout, &tag, &descriptor).await;
    Ok(descriptor)
}

/// Managed versions of a BOM: the constraints of its platform variant, or the
/// `dependencyManagement` of its effective POM.
pub async fn describe_bom(settings: &ResolutionSettings, coordinates: &Coordinates) -> Result<BomDescription> {
    settings.check_cancelled()?;
    let mut description = BomDescription::default();

    let metadata = fetch_metadata(settings, coordinates).await?;
    match metadata.kind {
        MetadataKind::GradleModule => {
            let module = GradleModule::parse(&metadata.bytes)?;
            let query = VariantQuery { platform: settings.primary_platform(), scope: settings.scope };
            let variant = select_variant(&module, &query)?;
            for constraint in variant.dependency_constraints.iter().chain(&variant.dependencies) {
                if let Some(version) = constraint.constraint()? {
                    description.managed.push(ManagedVersion { key: constraint.key(), constraint: version });
                }
            }
        }
        MetadataKind::Pom => {
            let project =
                effective_model(settings, Project::parse(&metadata.bytes)?, &mut description.messages, 0).await?;
            for managed in project.dependency_management.iter().filter(|d| !d.is_import()) {
                if let Some(constraint) = pom_constraint(coordinates, managed, &mut description.messages) {
                    description.managed.push(ManagedVersion { key: managed.key(), constraint });
                }
            }
        }
    }
    Ok(description)
}

/// Versions listed in the first `maven-metadata.xml` found for `key`.
pub async fn available_versions(settings: &ResolutionSettings, key: &ModuleKey) -> Result<Vec<Version>> {
    settings.check_cancelled()?;
    let Some(listing) = settings.cache.fetch(FileRequest::new(CacheKey::version_listing(key))).await? else {
        debug!("No version listing for {}", key);
        return Ok(Vec::new());
    };
    let bytes = read_to_bytes_async(&listing.file.path).await?;
    match parse_maven_metadata(&bytes) {
        Ok(metadata) => Ok(metadata.versions.iter().map(|v| Version::parse(v)).collect()),
        Err(e) => {
            warn!("Ignoring version listing of {}: {}", key, e);
            Ok(Vec::new())
        }
    }
}

/// The POM alone, for parents and imported BOMs.
async fn load_pom(settings: &ResolutionSettings, coordinates: &Coordinates) -> Result<Vec<u8>> {
    let Some(pom) = settings.cache.fetch(FileRequest::new(MetadataKind::Pom.cache_key(coordinates)?)).await? else {
        return Err(not_found(settings, coordinates));
    };
    read_to_bytes_async(&pom.file.path).await
}

fn not_found(settings: &ResolutionSettings, coordinates: &Coordinates) -> MdrError {
    let repositories: Vec<String> = settings
        .cache
        .client()
        .repositories()
        .iter()
        .map(ToString::to_string)
        .collect();
    MdrError::NotFoundInRepository(coordinates.to_string(), repositories.join(", "))
}

/// Descriptors carrying errors are recomputed next time instead of being cached.
async fn remember(layout: &Cache, tag: &str, descriptor: &Descriptor) {
    if descriptor.messages.iter().any(Message::is_error) {
        return;
    }
    if let Err(e) = store_descriptor(layout, tag, descriptor).await {
        warn!("Could not cache descriptor of {}: {}", descriptor.coordinates, e);
    }
}

// -------- POM ----

/// Folds the parent chain into `own`, expands templates, merges imported BOMs and
/// applies managed versions.
fn effective_model<'a>(
    settings: &'a ResolutionSettings,
    own: Project,
    messages: &'a mut Vec<Message>,
    depth: usize,
) -> BoxFuture<'a, Result<Project>> {
    Box::pin(async move {
        let mut ancestors = Vec::new();
        let mut next = own.parent_coordinates();
        while let Some(parent) = next {
            if ancestors.len() >= MAX_PARENT_DEPTH {
                messages.push(Message::warning(
                    "ParentChainTooDeep",
                    format!("Parent chain is deeper than {MAX_PARENT_DEPTH}, ignoring {parent} and its ancestors"),
                ));
                break;
            }
            debug!("Loading parent POM {}", parent);
            let bytes = load_pom(settings, &parent).await?;
            let project = Project::parse(&bytes)?;
            next = project.parent_coordinates();
            ancestors.push(project);
        }

        let mut inherited: Option<Project> = None;
        for mut ancestor in ancestors.into_iter().rev() {
            if let Some(parent) = &inherited {
                ancestor.merge_parent(parent);
            }
            ancestor.expand_templates();
            inherited = Some(ancestor);
        }
        let mut project = own;
        if let Some(parent) = &inherited {
            project.merge_parent(parent);
        }
        project.expand_templates();

        import_boms(settings, &mut project, messages, depth).await?;
        project.apply_dependency_management();
        Ok(project)
    })
}

async fn import_boms(
    settings: &ResolutionSettings,
    project: &mut Project,
    messages: &mut Vec<Message>,
    depth: usize,
) -> Result<()> {
    let imports: Vec<PomDependency> = project
        .dependency_management
        .iter()
        .filter(|d| d.is_import())
        .cloned()
        .collect();
    if imports.is_empty() {
        return Ok(());
    }
    project.dependency_management.retain(|d| !d.is_import());
    if depth >= MAX_PARENT_DEPTH {
        messages.push(Message::warning(
            "BomImportTooDeep",
            format!("BOM imports nest deeper than {MAX_PARENT_DEPTH}, ignoring {} import(s)", imports.len()),
        ));
        return Ok(());
    }

    for import in imports {
        let Some(version) = import.version.clone().filter(|v| !v.contains("${")) else {
            messages.push(Message::warning(
                "BomWithoutVersion",
                format!("Imported BOM {} has no usable version", import.key()),
            ));
            continue;
        };
        let coordinates = Coordinates::new(import.group_id.clone(), import.artifact_id.clone(), Some(version));
        debug!("Importing BOM {}", coordinates);
        let imported = match load_pom(settings, &coordinates).await {
            Ok(bytes) => {
                let bom = Project::parse(&bytes)?;
                effective_model(settings, bom, messages, depth + 1).await
            }
            Err(e) => Err(e),
        };
        match imported {
            Ok(bom) => {
                for managed in bom.dependency_management {
                    if !project.dependency_management.iter().any(|d| d.key() == managed.key()) {
                        project.dependency_management.push(managed);
                    }
                }
            }
            Err(MdrError::Cancelled) => return Err(MdrError::Cancelled),
            Err(e) => {
                messages.push(Message::from_error(&e, Severity::Error).with_source(coordinates.to_string()));
            }
        }
    }
    Ok(())
}

fn pom_constraint(owner: &Coordinates, dep: &PomDependency, messages: &mut Vec<Message>) -> Option<VersionConstraint> {
    let raw = dep.version.as_deref()?;
    if raw.contains("${") {
        messages.push(Message::warning(
            "UnresolvedProperty",
            format!("{owner} declares {} with unresolved version '{raw}'", dep.key()),
        ));
        return None;
    }
    match VersionConstraint::parse(raw) {
        Ok(constraint) => Some(constraint),
        Err(e) => {
            messages.push(Message::from_error(&e, Severity::Warning));
            None
        }
    }
}

fn describe_pom(
    settings: &ResolutionSettings,
    coordinates: &Coordinates,
    project: &Project,
    descriptor: &mut Descriptor,
) -> Result<()> {
    for dep in &project.dependencies {
        if dep.is_optional() || !settings.scope.accepts_pom_scope(dep.scope.as_deref()) {
            continue;
        }
        if dep.type_.as_deref() == Some("test-jar") {
            continue;
        }
        let constraint = pom_constraint(coordinates, dep, &mut descriptor.messages);
        descriptor.push_dependency(&dep.key(), constraint.as_ref());
    }

    if let Some(extension) = project.artifact_extension() {
        descriptor.push_artifact(ArtifactFile {
            path: coordinates.file_path(None, extension)?,
            file_name: coordinates.file_name(None, extension)?,
            hashes: Default::default(),
            declared_size: None,
            optional: false,
        });
        if settings.download_sources {
            descriptor.push_artifact(ArtifactFile {
                path: coordinates.file_path(Some("sources"), "jar")?,
                file_name: coordinates.file_name(Some("sources"), "jar")?,
                hashes: Default::default(),
                declared_size: None,
                optional: true,
            });
        }
    }
    Ok(())
}

// -------- Gradle module metadata ----

async fn describe_gradle(
    settings: &ResolutionSettings,
    coordinates: &Coordinates,
    module: &GradleModule,
    metadata_sha256: &str,
) -> Result<Descriptor> {
    let mut descriptor = Descriptor::new(coordinates.clone(), DescriptorSource::GradleModule, metadata_sha256);
    if settings.is_multiplatform() && is_multiplatform(module) {
        describe_shared(settings, coordinates, module, &mut descriptor).await?;
        return Ok(descriptor);
    }

    let platform = settings.primary_platform();
    let variant = select_variant(module, &VariantQuery { platform, scope: settings.scope })?;
    descriptor.variant = Some(variant.name.clone());

    if let Some(redirect) = &variant.available_at {
        let target = redirect.coordinates();
        debug!("{} is available at {}", coordinates, target);
        let constraint = VersionConstraint::Soft(Version::parse(&redirect.version));
        descriptor.push_dependency(&target.key(), Some(&constraint));
        return Ok(descriptor);
    }

    add_variant_edges(&mut descriptor, variant)?;
    add_module_files(&mut descriptor, coordinates, &variant.files, false)?;
    if settings.download_sources {
        if let Some(sources) = select_sources_variant(module, platform) {
            add_module_files(&mut descriptor, coordinates, &sources.files, true)?;
        }
    }
    Ok(descriptor)
}

/// Kotlin common metadata for several platforms at once: the node depends only on the
/// modules used by the source sets all platforms share.
async fn describe_shared(
    settings: &ResolutionSettings,
    coordinates: &Coordinates,
    module: &GradleModule,
    descriptor: &mut Descriptor,
) -> Result<()> {
    let common = select_common_variant(module)?;
    descriptor.variant = Some(common.name.clone());
    add_module_files(descriptor, coordinates, &common.files, false)?;

    let structure = match common.files.first() {
        Some(file) => {
            let request = FileRequest::new(CacheKey::module_file(coordinates, &file.url)?)
                .with_expectations(file.hashes(), file.size);
            match settings.cache.fetch(request).await? {
                Some(jar) => read_project_structure(&jar.file.path).await?,
                None => None,
            }
        }
        None => None,
    };

    let Some(structure) = structure else {
        descriptor.messages.push(Message::warning(
            "KotlinProjectStructureMissing",
            format!(
                "{coordinates} has no Kotlin project structure metadata, using the dependencies of {}",
                common.name
            ),
        ));
        return add_variant_edges(descriptor, common);
    };

    let names = platform_variant_names(module, &settings.platforms, settings.scope)?;
    let shared = shared_source_sets(&structure.project_structure, &names);
    for key in &shared.modules {
        let declared = common.dependencies.iter().find(|d| d.key() == *key);
        let constraint = match declared {
            Some(dep) => dep.constraint()?,
            None => None,
        };
        descriptor.push_dependency(key, constraint.as_ref());
    }
    for constraint in &common.dependency_constraints {
        if let Some(version) = constraint.constraint()? {
            descriptor.push_constraint(&constraint.key(), &version);
        }
    }
    descriptor.source_sets = shared.source_sets;
    Ok(())
}

fn add_variant_edges(descriptor: &mut Descriptor, variant: &Variant) -> Result<()> {
    for dep in &variant.dependencies {
        let constraint = dep.constraint()?;
        descriptor.push_dependency(&dep.key(), constraint.as_ref());
    }
    for constraint in &variant.dependency_constraints {
        if let Some(version) = constraint.constraint()? {
            descriptor.push_constraint(&constraint.key(), &version);
        }
    }
    Ok(())
}

fn add_module_files(
    descriptor: &mut Descriptor,
    coordinates: &Coordinates,
    files: &[ModuleFile],
    optional: bool,
) -> Result<()> {
    for file in files {
        let key = CacheKey::module_file(coordinates, &file.url)?;
        descriptor.push_artifact(ArtifactFile {
            file_name: key.file_name().to_string(),
            path: key.repository_path,
            hashes: file.hashes(),
            declared_size: file.size,
            optional,
        });
    }
    Ok(())
}
