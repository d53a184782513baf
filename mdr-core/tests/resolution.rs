mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{coords, file_path, remote_resolver, CountingTransport, Fixture, RepoContent};
use mdr_common::dependency::Severity;
use mdr_common::error::MdrError;
use mdr_common::model::{ModuleKey, ResolutionPlatform, ResolutionScope};
use mdr_core::{MavenResolver, ModuleRequest, ResolutionOutcome, ResolutionPolicy, ResolutionRequest};

fn key(raw: &str) -> ModuleKey {
    coords(raw).key()
}

fn version_of(outcome: &ResolutionOutcome, raw: &str) -> Option<String> {
    outcome.versions.get(&key(raw)).cloned()
}

fn ids(outcome: &ResolutionOutcome, severity: Severity) -> Vec<String> {
    outcome.diagnostics.iter().filter(|m| m.severity == severity).map(|m| m.id.clone()).collect()
}

async fn resolve(resolver: &MavenResolver, request: ResolutionRequest) -> ResolutionOutcome {
    resolver.resolve_request(&request).await.unwrap()
}

#[tokio::test]
async fn resolves_transitive_jars_in_topological_order() {
    let mut repo = RepoContent::default();
    repo.library("org.acme:app:1.0", &["org.acme:core:1.0"])
        .library("org.acme:core:1.0", &["org.acme:util:2.0"])
        .library("org.acme:util:2.0", &[]);
    let fixture = Fixture::new(&repo);

    let outcome = fixture
        .resolver()
        .resolve(&[coords("org.acme:app:1.0")], ResolutionScope::Compile, ResolutionPlatform::Jvm)
        .await
        .unwrap();

    let names: Vec<String> = outcome
        .files
        .iter()
        .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["app-1.0.jar", "core-1.0.jar", "util-2.0.jar"]);
    assert!(outcome.files.iter().all(|f| f.path.starts_with(fixture.cache.path())));
    assert!(ids(&outcome, Severity::Error).is_empty());
    assert_eq!(version_of(&outcome, "org.acme:util"), Some("2.0".to_string()));
}

#[tokio::test]
async fn cold_and_warm_runs_agree() {
    let mut repo = RepoContent::default();
    repo.library("org.acme:app:1.0", &["org.acme:core:1.0", "org.acme:util:1.0"])
        .library("org.acme:core:1.0", &["org.acme:util:1.1"])
        .library("org.acme:util:1.0", &[])
        .library("org.acme:util:1.1", &[]);
    let fixture = Fixture::new(&repo);
    let request = || ResolutionRequest::new(vec![coords("org.acme:app:1.0")]);

    let cold = resolve(&fixture.resolver(), request()).await;
    let warm = resolve(&fixture.resolver(), request()).await;

    assert_eq!(cold.versions, warm.versions);
    let paths = |o: &ResolutionOutcome| o.files.iter().map(|f| f.path.clone()).collect::<Vec<_>>();
    assert_eq!(paths(&cold), paths(&warm));
    assert_eq!(cold.graph.pretty_print(), warm.graph.pretty_print());
    assert_eq!(version_of(&warm, "org.acme:util"), Some("1.1".to_string()));
}

#[tokio::test]
async fn concurrent_resolutions_fetch_each_file_once() {
    let mut repo = RepoContent::default();
    repo.library("org.acme:widget:1.0", &["org.acme:gear:1.0"])
        .library("org.acme:gear:1.0", &[]);
    let transport = CountingTransport::new(&repo);
    let (resolver, _cache) = remote_resolver(transport.clone());

    let wanted = [coords("org.acme:widget:1.0")];
    let runs = (0..8).map(|_| resolver.resolve(&wanted, ResolutionScope::Runtime, ResolutionPlatform::Jvm));
    let outcomes: Vec<ResolutionOutcome> =
        futures::future::join_all(runs).await.into_iter().map(Result::unwrap).collect();

    for path in [
        file_path("org.acme:widget:1.0", "jar"),
        file_path("org.acme:widget:1.0", "pom"),
        file_path("org.acme:gear:1.0", "jar"),
    ] {
        assert_eq!(transport.reads(&path), 1, "{path}");
    }
    let first = &outcomes[0].files;
    assert_eq!(first.len(), 2);
    assert!(outcomes.iter().all(|o| &o.files == first));
}

#[tokio::test]
async fn transitive_range_upgrades_direct_version() {
    let mut repo = RepoContent::default();
    repo.library("org.acme:a:1.0", &[])
        .library("org.acme:a:1.5", &[])
        .library("org.acme:a:1.8", &[])
        .library("org.acme:a:2.0", &[])
        .library("org.acme:b:1.0", &["org.acme:a:[1.5,2.0)"])
        .versions("org.acme:a", &["1.0", "1.5", "1.8", "2.0"]);
    let fixture = Fixture::new(&repo);

    let outcome = resolve(
        &fixture.resolver(),
        ResolutionRequest::new(vec![coords("org.acme:a:1.0"), coords("org.acme:b:1.0")]),
    )
    .await;

    assert_eq!(version_of(&outcome, "org.acme:a"), Some("1.8".to_string()));
    assert!(ids(&outcome, Severity::Error).is_empty());
    assert!(ids(&outcome, Severity::Info).contains(&"VersionChanged".to_string()));
    assert!(outcome.graph.pretty_print().contains("org.acme:a:1.0 -> 1.8"));
    // The rejected version is never downloaded.
    assert!(outcome.files.iter().all(|f| !f.path.ends_with("a-1.0.jar")));
}

#[tokio::test]
async fn bom_supplies_missing_version() {
    let mut repo = RepoContent::default();
    repo.bom("org.acme:platform:1", &["org.acme:a:1.2"])
        .library("org.acme:a:1.2", &[]);
    let fixture = Fixture::new(&repo);

    let request = ResolutionRequest::new(vec![coords("org.acme:a")]).with_boms(vec![coords("org.acme:platform:1")]);
    let outcome = resolve(&fixture.resolver(), request).await;

    assert_eq!(version_of(&outcome, "org.acme:a"), Some("1.2".to_string()));
    assert_eq!(outcome.files.len(), 1);
    // The BOM is not a dependency of the root.
    assert!(outcome.versions.get(&key("org.acme:platform")).is_none());
}

#[tokio::test]
async fn bom_overrides_lower_direct_version() {
    let mut repo = RepoContent::default();
    repo.bom("io.ktor:ktor-bom:2.3.9", &["io.ktor:ktor-client-core-jvm:2.3.9"])
        .library("io.ktor:ktor-client-core-jvm:2.3.8", &[])
        .library("io.ktor:ktor-client-core-jvm:2.3.9", &[]);
    let fixture = Fixture::new(&repo);

    let request = ResolutionRequest::new(vec![coords("io.ktor:ktor-client-core-jvm:2.3.8")])
        .with_boms(vec![coords("io.ktor:ktor-bom:2.3.9")]);
    let outcome = resolve(&fixture.resolver(), request).await;

    assert_eq!(version_of(&outcome, "io.ktor:ktor-client-core-jvm"), Some("2.3.9".to_string()));
}

#[tokio::test]
async fn insight_shows_the_bom_that_forced_a_version() {
    let mut repo = RepoContent::default();
    repo.bom("io.ktor:ktor-bom:2.3.9", &["io.ktor:ktor-client-core-jvm:2.3.9"])
        .library("io.ktor:ktor-client-core-jvm:2.3.8", &[])
        .library("io.ktor:ktor-client-core-jvm:2.3.9", &[])
        .library("org.acme:app:1.0", &["io.ktor:ktor-client-core-jvm:2.3.8", "org.acme:util:1.0"])
        .library("org.acme:util:1.0", &[]);
    let fixture = Fixture::new(&repo);

    let request = ResolutionRequest::new(vec![coords("org.acme:app:1.0")])
        .with_boms(vec![coords("io.ktor:ktor-bom:2.3.9")]);
    let outcome = resolve(&fixture.resolver(), request).await;

    let insight = outcome.graph.filter_paths(&key("io.ktor:ktor-client-core-jvm"), true).pretty_print();
    let lines: Vec<&str> = insight.lines().collect();
    assert_eq!(lines.len(), 5, "{insight}");
    assert_eq!(lines[1], "├─── org.acme:app:1.0");
    assert_eq!(lines[2], "│    ╰─── io.ktor:ktor-client-core-jvm:2.3.8 -> 2.3.9");
    assert_eq!(lines[3], "╰─── bom:io.ktor:ktor-bom:2.3.9");
    assert_eq!(lines[4], "     ╰─── io.ktor:ktor-client-core-jvm:2.3.8 -> 2.3.9");
    assert!(!insight.contains("util"));
}

#[tokio::test]
async fn forced_direct_version_wins_over_bom() {
    let mut repo = RepoContent::default();
    repo.bom("io.ktor:ktor-bom:2.3.9", &["io.ktor:ktor-client-core-jvm:2.3.9"])
        .library("io.ktor:ktor-client-core-jvm:2.3.8", &[]);
    let fixture = Fixture::new(&repo);

    let request = ResolutionRequest::new(vec![coords("io.ktor:ktor-client-core-jvm:2.3.8!!")])
        .with_boms(vec![coords("io.ktor:ktor-bom:2.3.9")]);
    let outcome = resolve(&fixture.resolver(), request).await;

    assert_eq!(version_of(&outcome, "io.ktor:ktor-client-core-jvm"), Some("2.3.8".to_string()));
}

#[tokio::test]
async fn cycles_are_cut_and_reported_once() {
    let mut repo = RepoContent::default();
    repo.library("org.acme:a:1.0", &["org.acme:b:1.0"])
        .library("org.acme:b:1.0", &["org.acme:a:1.0"]);
    let fixture = Fixture::new(&repo);

    let request = ResolutionRequest::new(vec![coords("org.acme:a:1.0")]).with_policy(ResolutionPolicy::Lenient);
    let outcome = resolve(&fixture.resolver(), request).await;

    let cycles = ids(&outcome, Severity::Error).into_iter().filter(|id| id == "CyclicDependency").count();
    assert_eq!(cycles, 1);
    assert_eq!(outcome.versions.len(), 2);
    assert_eq!(outcome.files.len(), 2);
    assert_eq!(outcome.graph.topological_order().len(), 3);
}

#[tokio::test]
async fn cycles_fail_strict_resolution() {
    let mut repo = RepoContent::default();
    repo.library("org.acme:a:1.0", &["org.acme:b:1.0"])
        .library("org.acme:b:1.0", &["org.acme:a:1.0"]);
    let fixture = Fixture::new(&repo);

    let err = fixture
        .resolver()
        .resolve(&[coords("org.acme:a:1.0")], ResolutionScope::Compile, ResolutionPlatform::Jvm)
        .await
        .unwrap_err();
    match err {
        MdrError::ResolutionFailed { primary, suppressed } => {
            assert!(primary.contains("Cyclic"), "{primary}");
            assert!(suppressed.is_empty());
        }
        other => panic!("expected ResolutionFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn checksum_mismatch_discards_the_artifact() {
    let mut repo = RepoContent::default();
    repo.put(
        &file_path("org.acme:a:1.0", "pom"),
        common::pom("org.acme:a:1.0", "jar", "").as_bytes(),
    )
    .put_corrupt(&file_path("org.acme:a:1.0", "jar"), b"tampered");
    let fixture = Fixture::new(&repo);

    let request = ResolutionRequest::new(vec![coords("org.acme:a:1.0")]).with_policy(ResolutionPolicy::Lenient);
    let outcome = resolve(&fixture.resolver(), request).await;

    assert_eq!(ids(&outcome, Severity::Error), vec!["ChecksumMismatch".to_string()]);
    assert!(outcome.files.is_empty());
    assert_eq!(version_of(&outcome, "org.acme:a"), Some("1.0".to_string()));
}

#[tokio::test]
async fn missing_modules_are_reported_with_partial_results() {
    let mut repo = RepoContent::default();
    repo.library("org.acme:app:1.0", &["org.acme:ghost:1.0", "org.acme:core:1.0"])
        .library("org.acme:core:1.0", &[]);
    let fixture = Fixture::new(&repo);

    let request = ResolutionRequest::new(vec![coords("org.acme:app:1.0")]).with_policy(ResolutionPolicy::Lenient);
    let outcome = resolve(&fixture.resolver(), request).await;

    assert_eq!(ids(&outcome, Severity::Error), vec!["NotFoundInRepository".to_string()]);
    assert_eq!(outcome.files.len(), 2);
}

fn file_names(outcome: &ResolutionOutcome) -> Vec<String> {
    outcome
        .files
        .iter()
        .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn disjoint_ranges_fall_back_to_the_highest_candidate() {
    let mut repo = RepoContent::default();
    repo.library("org.acme:b:1.0", &["org.acme:a:[1.0,2.0)"])
        .library("org.acme:c:1.0", &["org.acme:a:[2.5,3.0)"])
        .library("org.acme:a:1.0", &[])
        .library("org.acme:a:1.5", &[])
        .library("org.acme:a:2.5", &[])
        .versions("org.acme:a", &["1.0", "1.5", "2.5"]);
    let fixture = Fixture::new(&repo);

    let request = ResolutionRequest::new(vec![coords("org.acme:b:1.0"), coords("org.acme:c:1.0")])
        .with_policy(ResolutionPolicy::Lenient);
    let outcome = resolve(&fixture.resolver(), request).await;

    assert_eq!(version_of(&outcome, "org.acme:a"), Some("2.5".to_string()));
    assert!(ids(&outcome, Severity::Error).contains(&"VersionConflictUnresolved".to_string()));
    assert_eq!(outcome.files.len(), 3);
    assert!(file_names(&outcome).contains(&"a-2.5.jar".to_string()));
}

#[tokio::test]
async fn disjoint_ranges_fail_strict_resolution() {
    let mut repo = RepoContent::default();
    repo.library("org.acme:b:1.0", &["org.acme:a:[1.0,2.0)"])
        .library("org.acme:c:1.0", &["org.acme:a:[2.5,3.0)"])
        .library("org.acme:a:1.5", &[])
        .library("org.acme:a:2.5", &[])
        .versions("org.acme:a", &["1.5", "2.5"]);
    let fixture = Fixture::new(&repo);

    let request = ResolutionRequest::new(vec![coords("org.acme:b:1.0"), coords("org.acme:c:1.0")]);
    let err = fixture.resolver().resolve_request(&request).await.unwrap_err();
    assert!(matches!(err, MdrError::ResolutionFailed { .. }), "{err:?}");
}

const AMBIGUOUS_MODULE: &str = r#"{
  "formatVersion": "1.1",
  "component": { "group": "org.acme", "module": "split", "version": "1.0" },
  "variants": [
    {
      "name": "fooApiElements",
      "attributes": { "org.gradle.category": "library", "org.gradle.usage": "java-api" },
      "files": [ { "name": "split-foo-1.0.jar", "url": "split-foo-1.0.jar" } ]
    },
    {
      "name": "barApiElements",
      "attributes": { "org.gradle.category": "library", "org.gradle.usage": "java-api" },
      "files": [ { "name": "split-bar-1.0.jar", "url": "split-bar-1.0.jar" } ]
    }
  ]
}"#;

#[tokio::test]
async fn ambiguous_variant_leaves_siblings_resolved() {
    let gav = "org.acme:split:1.0";
    let mut repo = RepoContent::default();
    repo.put(&file_path(gav, "module"), AMBIGUOUS_MODULE.as_bytes())
        .put(&file_path(gav, "pom"), common::pom(gav, "jar", "").as_bytes())
        .library("org.acme:ok:1.0", &[]);
    let fixture = Fixture::new(&repo);

    let request = ResolutionRequest::new(vec![coords(gav), coords("org.acme:ok:1.0")])
        .with_policy(ResolutionPolicy::Lenient);
    let outcome = resolve(&fixture.resolver(), request).await;

    assert_eq!(ids(&outcome, Severity::Error), vec!["AmbiguousVariant".to_string()]);
    assert_eq!(file_names(&outcome), vec!["ok-1.0.jar".to_string()]);
    // The version was still decided; only the variant was not.
    assert_eq!(version_of(&outcome, "org.acme:split"), Some("1.0".to_string()));
}

#[tokio::test]
async fn malformed_module_file_loses_only_its_own_subtree() {
    let broken = "org.acme:broken:1.0";
    let mut repo = RepoContent::default();
    repo.library("org.acme:app:1.0", &["org.acme:broken:1.0", "org.acme:core:1.0"])
        .put(&file_path(broken, "module"), b"{ not json")
        .put(
            &file_path(broken, "pom"),
            common::pom(broken, "jar", &common::dependencies(&["org.acme:hidden:1.0"])).as_bytes(),
        )
        .put(&file_path(broken, "jar"), b"jar of broken")
        .library("org.acme:hidden:1.0", &[])
        .library("org.acme:core:1.0", &[]);
    let fixture = Fixture::new(&repo);

    let request = ResolutionRequest::new(vec![coords("org.acme:app:1.0")]).with_policy(ResolutionPolicy::Lenient);
    let outcome = resolve(&fixture.resolver(), request).await;

    assert_eq!(ids(&outcome, Severity::Error), vec!["MalformedMetadata".to_string()]);
    assert_eq!(file_names(&outcome), vec!["app-1.0.jar".to_string(), "core-1.0.jar".to_string()]);
    assert!(version_of(&outcome, "org.acme:hidden").is_none());
}

#[tokio::test]
async fn module_groups_hang_off_the_root() {
    let mut repo = RepoContent::default();
    repo.library("org.acme:core:1.0", &[]).library("org.acme:core:1.1", &[]);
    let fixture = Fixture::new(&repo);

    let request = ResolutionRequest::new(Vec::new())
        .with_module(ModuleRequest { name: "app".to_string(), dependencies: vec![coords("org.acme:core:1.0")] })
        .with_module(ModuleRequest { name: "lib".to_string(), dependencies: vec![coords("org.acme:core:1.1")] });
    let outcome = resolve(&fixture.resolver(), request).await;

    assert_eq!(version_of(&outcome, "org.acme:core"), Some("1.1".to_string()));
    let tree = outcome.graph.pretty_print();
    assert!(tree.contains("module:app"), "{tree}");
    assert!(tree.contains("module:lib"), "{tree}");
}

#[tokio::test]
async fn resolver_is_usable_after_cancelling_a_run() {
    let mut repo = RepoContent::default();
    repo.library("org.acme:a:1.0", &[]);
    let transport = CountingTransport::stalled(&repo);
    let (resolver, _cache) = remote_resolver(transport.clone());
    let resolver = Arc::new(resolver);

    let running = {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move {
            resolver
                .resolve(&[coords("org.acme:a:1.0")], ResolutionScope::Compile, ResolutionPlatform::Jvm)
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!running.is_finished());

    resolver.cancellation_token().cancel();
    let err = running.await.unwrap().unwrap_err();
    assert!(matches!(err, MdrError::Cancelled));

    transport.release();
    let outcome = resolver
        .resolve(&[coords("org.acme:a:1.0")], ResolutionScope::Compile, ResolutionPlatform::Jvm)
        .await
        .unwrap();
    assert_eq!(outcome.files.len(), 1);
}

#[tokio::test]
async fn shared_resolver_is_cloneable_across_tasks() {
    let mut repo = RepoContent::default();
    repo.library("org.acme:a:1.0", &[]);
    let fixture = Fixture::new(&repo);
    let resolver = Arc::new(fixture.resolver());

    let handle = {
        let resolver = Arc::clone(&resolver);
        tokio::spawn(async move {
            resolver
                .resolve(&[coords("org.acme:a:1.0")], ResolutionScope::Compile, ResolutionPlatform::Jvm)
                .await
        })
    };
    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome.files.len(), 1);
}

const GUAVA_MODULE: &str = r#"{
  "formatVersion": "1.1",
  "component": { "group": "com.google.guava", "module": "guava", "version": "33.0.0-jre" },
  "variants": [
    {
      "name": "jreApiElements",
      "attributes": { "org.gradle.category": "library", "org.gradle.usage": "java-api",
                      "org.gradle.jvm.environment": "standard-jvm" },
      "dependencies": [
        { "group": "com.google.guava", "module": "failureaccess", "version": { "requires": "1.0.2" } }
      ],
      "files": [ { "name": "guava-33.0.0-jre.jar", "url": "guava-33.0.0-jre.jar" } ]
    },
    {
      "name": "jreRuntimeElements",
      "attributes": { "org.gradle.category": "library", "org.gradle.usage": "java-runtime",
                      "org.gradle.jvm.environment": "standard-jvm" },
      "dependencies": [
        { "group": "com.google.guava", "module": "failureaccess", "version": { "requires": "1.0.2" } }
      ],
      "files": [ { "name": "guava-33.0.0-jre.jar", "url": "guava-33.0.0-jre.jar" } ]
    }
  ]
}"#;

#[tokio::test]
async fn module_metadata_without_sizes_keeps_them_absent() {
    let gav = "com.google.guava:guava:33.0.0-jre";
    let mut repo = RepoContent::default();
    repo.put(&file_path(gav, "module"), GUAVA_MODULE.as_bytes())
        .put(&file_path(gav, "pom"), common::pom(gav, "bundle", "").as_bytes())
        .put(&file_path(gav, "jar"), b"guava classes")
        .library("com.google.guava:failureaccess:1.0.2", &[]);
    let fixture = Fixture::new(&repo);

    let outcome = resolve(&fixture.resolver(), ResolutionRequest::new(vec![coords(gav)])).await;

    assert_eq!(version_of(&outcome, "com.google.guava:failureaccess"), Some("1.0.2".to_string()));
    assert_eq!(outcome.files.len(), 2);
    let guava = &outcome.files[0];
    assert!(guava.path.ends_with("guava-33.0.0-jre.jar"));
    assert_eq!(guava.declared_size, None);
    assert!(guava.hashes.sha512.is_none());
    assert!(guava.hashes.sha256.is_some());

    let root = outcome.graph.root();
    let child = outcome.graph.node(root).children[0];
    let node = outcome.graph.node(child).as_maven().unwrap();
    assert_eq!(node.variant.as_deref(), Some("jreApiElements"));
}
