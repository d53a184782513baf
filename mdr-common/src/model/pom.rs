// mdr-common/src/model/pom.rs
//! Maven POM model: parsing, writing and the pure parts of building an effective model
//! (parent merge, property expansion, managed versions).

use std::collections::BTreeMap;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use roxmltree::{Document, Node, ParsingOptions};
use serde::{Deserialize, Serialize};

use crate::error::{MdrError, Result};
use crate::model::coordinates::{Coordinates, ModuleKey};

/// Marker Gradle writes into POMs published alongside a `.module` file.
pub const GRADLE_METADATA_MARKER: &str = "do_not_remove: published-with-gradle-metadata";
const MAX_TEMPLATE_PASSES: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parent {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub group_id: String,
    pub artifact_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PomDependency {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Option<String>,
    pub type_: Option<String>,
    pub classifier: Option<String>,
    pub scope: Option<String>,
    pub optional: Option<bool>,
    pub exclusions: Vec<Exclusion>,
}

impl PomDependency {
    pub fn key(&self) -> ModuleKey {
        ModuleKey::new(self.group_id.clone(), self.artifact_id.clone())
    }

    pub fn is_optional(&self) -> bool {
        self.optional.unwrap_or(false)
    }

    pub fn is_import(&self) -> bool {
        self.scope.as_deref() == Some("import")
    }

    fn merge_key(&self) -> (String, String, Option<String>, Option<String>) {
        (
            self.group_id.clone(),
            self.artifact_id.clone(),
            self.classifier.clone(),
            self.type_.clone(),
        )
    }

    fn expand(&mut self, props: &BTreeMap<String, String>) {
        self.group_id = expand_templates(&self.group_id, props);
        self.artifact_id = expand_templates(&self.artifact_id, props);
        for field in [&mut self.version, &mut self.scope, &mut self.type_, &mut self.classifier] {
            if let Some(value) = field.as_mut() {
                *value = expand_templates(value, props);
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub model_version: Option<String>,
    pub parent: Option<Parent>,
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub version: Option<String>,
    pub packaging: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub properties: BTreeMap<String, String>,
    pub dependency_management: Vec<PomDependency>,
    pub dependencies: Vec<PomDependency>,
}

impl Project {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        parse_pom(bytes)
    }

    pub fn to_xml(&self) -> Result<String> {
        write_pom(self)
    }

    pub fn effective_group_id(&self) -> Option<&str> {
        self.group_id
            .as_deref()
            .or_else(|| self.parent.as_ref().map(|p| p.group_id.as_str()))
    }

    pub fn effective_version(&self) -> Option<&str> {
        self.version
            .as_deref()
            .or_else(|| self.parent.as_ref().and_then(|p| p.version.as_deref()))
    }

    pub fn parent_coordinates(&self) -> Option<Coordinates> {
        self.parent.as_ref().map(|p| {
            Coordinates::new(p.group_id.clone(), p.artifact_id.clone(), p.version.clone())
        })
    }

    /// Extension of the main artifact, `None` for `pom` packaging.
    pub fn artifact_extension(&self) -> Option<&str> {
        match self.packaging.as_deref().unwrap_or("jar") {
            "pom" => None,
            "bundle" | "maven-plugin" | "eclipse-plugin" | "ejb" => Some("jar"),
            other => Some(other),
        }
    }

    /// Folds an already effective parent into this project. Values declared here win.
    pub fn merge_parent(&mut self, parent: &Project) {
        if self.group_id.is_none() {
            self.group_id = parent.group_id.clone();
        }
        if self.version.is_none() {
            self.version = parent.version.clone();
        }
        for (key, value) in &parent.properties {
            self.properties.entry(key.clone()).or_insert_with(|| value.clone());
        }
        merge_dependency_lists(&mut self.dependencies, &parent.dependencies);
        merge_dependency_lists(&mut self.dependency_management, &parent.dependency_management);
    }

    /// Properties available to `${...}` templates.
    pub fn template_properties(&self) -> BTreeMap<String, String> {
        let mut props = self.properties.clone();
        let mut builtin = |key: &str, value: Option<&str>| {
            if let Some(v) = value {
                props.insert(key.to_string(), v.to_string());
            }
        };
        let group = self.effective_group_id();
        let version = self.effective_version();
        builtin("project.groupId", group);
        builtin("pom.groupId", group);
        builtin("groupId", group);
        builtin("project.version", version);
        builtin("pom.version", version);
        builtin("version", version);
        builtin("project.artifactId", self.artifact_id.as_deref());
        builtin("pom.artifactId", self.artifact_id.as_deref());
        if let Some(parent) = &self.parent {
            builtin("project.parent.groupId", Some(parent.group_id.as_str()));
            builtin("parent.groupId", Some(parent.group_id.as_str()));
            builtin("project.parent.version", parent.version.as_deref());
            builtin("parent.version", parent.version.as_deref());
        }
        props
    }

    /// Expands `${...}` templates in coordinates and dependency declarations.
    /// Unknown properties are left untouched.
    pub fn expand_templates(&mut self) {
        let props = self.template_properties();
        for field in [&mut self.group_id, &mut self.version, &mut self.packaging] {
            if let Some(value) = field.as_mut() {
                *value = expand_templates(value, &props);
            }
        }
        if let Some(parent) = self.parent.as_mut() {
            if let Some(v) = parent.version.as_mut() {
                *v = expand_templates(v, &props);
            }
        }
        for dep in self.dependencies.iter_mut().chain(self.dependency_management.iter_mut()) {
            dep.expand(&props);
        }
    }

    /// Fills missing dependency versions (and scopes) from `dependencyManagement`.
    pub fn apply_dependency_management(&mut self) {
        let managed: BTreeMap<ModuleKey, &PomDependency> = self
            .dependency_management
            .iter()
            .filter(|d| !d.is_import())
            .map(|d| (d.key(), d))
            .collect();
        let mut filled = Vec::with_capacity(self.dependencies.len());
        for dep in &self.dependencies {
            let mut dep = dep.clone();
            if let Some(m) = managed.get(&dep.key()) {
                if dep.version.is_none() {
                    dep.version = m.version.clone();
                }
                if dep.scope.is_none() {
                    dep.scope = m.scope.clone();
                }
            }
            filled.push(dep);
        }
        self.dependencies = filled;
    }
}

fn merge_dependency_lists(own: &mut Vec<PomDependency>, inherited: &[PomDependency]) {
    let declared: Vec<_> = own.iter().map(PomDependency::merge_key).collect();
    for dep in inherited {
        if !declared.contains(&dep.merge_key()) {
            own.push(dep.clone());
        }
    }
}

/// Replaces every `${name}` with its property value, repeating until nothing changes.
pub fn expand_templates(input: &str, props: &BTreeMap<String, String>) -> String {
    let mut current = input.to_string();
    for _ in 0..MAX_TEMPLATE_PASSES {
        if !current.contains("${") {
            break;
        }
        let mut out = String::with_capacity(current.len());
        let mut rest = current.as_str();
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let name = &after[..end];
                    match props.get(name) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push_str("${");
                            out.push_str(name);
                            out.push('}');
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        if out == current {
            break;
        }
        current = out;
    }
    current
}

pub fn is_published_with_gradle_metadata(pom_text: &str) -> bool {
    pom_text.contains(GRADLE_METADATA_MARKER)
}

// -------- reading ----

fn malformed(reason: impl Into<String>) -> MdrError {
    MdrError::MalformedMetadata("pom".to_string(), reason.into())
}

pub(crate) fn parse_document(bytes: &[u8], kind: &str) -> Result<String> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| MdrError::MalformedMetadata(kind.to_string(), format!("not UTF-8: {e}")))?;
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

pub(crate) fn xml_options() -> ParsingOptions {
    ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    }
}

pub(crate) fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
}

pub(crate) fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

pub(crate) fn child_text(node: Node, name: &str) -> Option<String> {
    child(node, name)
        .and_then(|c| c.text())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

pub fn parse_pom(bytes: &[u8]) -> Result<Project> {
    let text = parse_document(bytes, "pom")?;
    let doc = Document::parse_with_options(&text, xml_options()).map_err(|e| malformed(e.to_string()))?;
    let root = doc.root_element();
    if root.tag_name().name() != "project" {
        return Err(malformed(format!(
            "expected <project> root element, found <{}>",
            root.tag_name().name()
        )));
    }

    let parent = match child(root, "parent") {
        Some(p) => Some(Parent {
            group_id: child_text(p, "groupId").ok_or_else(|| malformed("parent without groupId"))?,
            artifact_id: child_text(p, "artifactId")
                .ok_or_else(|| malformed("parent without artifactId"))?,
            version: child_text(p, "version"),
        }),
        None => None,
    };

    let properties = child(root, "properties")
        .map(|props| {
            props
                .children()
                .filter(|c| c.is_element())
                .map(|c| {
                    let value = c.text().map(|t| t.trim().to_string()).unwrap_or_default();
                    (c.tag_name().name().to_string(), value)
                })
                .collect()
        })
        .unwrap_or_default();

    let dependency_management = match child(root, "dependencyManagement")
        .and_then(|dm| child(dm, "dependencies"))
    {
        Some(deps) => parse_dependencies(deps)?,
        None => Vec::new(),
    };
    let dependencies = match child(root, "dependencies") {
        Some(deps) => parse_dependencies(deps)?,
        None => Vec::new(),
    };

    Ok(Project {
        model_version: child_text(root, "modelVersion"),
        parent,
        group_id: child_text(root, "groupId"),
        artifact_id: child_text(root, "artifactId"),
        version: child_text(root, "version"),
        packaging: child_text(root, "packaging"),
        name: child_text(root, "name"),
        description: child_text(root, "description"),
        url: child_text(root, "url"),
        properties,
        dependency_management,
        dependencies,
    })
}

fn parse_dependencies(node: Node) -> Result<Vec<PomDependency>> {
    children(node, "dependency")
        .map(|dep| {
            let optional = match child_text(dep, "optional").as_deref() {
                None => None,
                Some(v) => Some(v.eq_ignore_ascii_case("true")),
            };
            let exclusions = child(dep, "exclusions")
                .map(|ex| {
                    children(ex, "exclusion")
                        .filter_map(|e| {
                            Some(Exclusion {
                                group_id: child_text(e, "groupId")?,
                                artifact_id: child_text(e, "artifactId")?,
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();
            Ok(PomDependency {
                group_id: child_text(dep, "groupId")
                    .ok_or_else(|| malformed("dependency without groupId"))?,
                artifact_id: child_text(dep, "artifactId")
                    .ok_or_else(|| malformed("dependency without artifactId"))?,
                version: child_text(dep, "version"),
                type_: child_text(dep, "type"),
                classifier: child_text(dep, "classifier"),
                scope: child_text(dep, "scope"),
                optional,
                exclusions,
            })
        })
        .collect()
}

// -------- writing ----

struct PomWriter {
    writer: Writer<Vec<u8>>,
}

impl PomWriter {
    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| MdrError::Xml(e.to_string()))
    }

    fn start(&mut self, name: &str) -> Result<()> {
        self.event(Event::Start(BytesStart::new(name)))
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn text(&mut self, name: &str, value: Option<&str>) -> Result<()> {
        if let Some(value) = value {
            self.start(name)?;
            self.event(Event::Text(BytesText::new(value)))?;
            self.end(name)?;
        }
        Ok(())
    }

    fn dependencies(&mut self, deps: &[PomDependency]) -> Result<()> {
        self.start("dependencies")?;
        for dep in deps {
            self.start("dependency")?;
            self.text("groupId", Some(&dep.group_id))?;
            self.text("artifactId", Some(&dep.artifact_id))?;
            self.text("version", dep.version.as_deref())?;
            self.text("type", dep.type_.as_deref())?;
            self.text("classifier", dep.classifier.as_deref())?;
            self.text("scope", dep.scope.as_deref())?;
            self.text("optional", dep.optional.map(|o| if o { "true" } else { "false" }))?;
            if !dep.exclusions.is_empty() {
                self.start("exclusions")?;
                for ex in &dep.exclusions {
                    self.start("exclusion")?;
                    self.text("groupId", Some(&ex.group_id))?;
                    self.text("artifactId", Some(&ex.artifact_id))?;
                    self.end("exclusion")?;
                }
                self.end("exclusions")?;
            }
            self.end("dependency")?;
        }
        self.end("dependencies")
    }
}

pub fn write_pom(project: &Project) -> Result<String> {
    let mut w = PomWriter {
        writer: Writer::new_with_indent(Vec::new(), b' ', 2),
    };
    w.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    w.event(Event::Start(
        BytesStart::new("project").with_attributes([("xmlns", "http://maven.apache.org/POM/4.0.0")]),
    ))?;
    w.text("modelVersion", project.model_version.as_deref())?;
    if let Some(parent) = &project.parent {
        w.start("parent")?;
        w.text("groupId", Some(&parent.group_id))?;
        w.text("artifactId", Some(&parent.artifact_id))?;
        w.text("version", parent.version.as_deref())?;
        w.end("parent")?;
    }
    w.text("groupId", project.group_id.as_deref())?;
    w.text("artifactId", project.artifact_id.as_deref())?;
    w.text("version", project.version.as_deref())?;
    w.text("packaging", project.packaging.as_deref())?;
    w.text("name", project.name.as_deref())?;
    w.text("description", project.description.as_deref())?;
    w.text("url", project.url.as_deref())?;
    if !project.properties.is_empty() {
        w.start("properties")?;
        for (key, value) in &project.properties {
            w.text(key, Some(value))?;
        }
        w.end("properties")?;
    }
    if !project.dependency_management.is_empty() {
        w.start("dependencyManagement")?;
        w.dependencies(&project.dependency_management)?;
        w.end("dependencyManagement")?;
    }
    if !project.dependencies.is_empty() {
        w.dependencies(&project.dependencies)?;
    }
    w.end("project")?;
    String::from_utf8(w.writer.into_inner()).map_err(|e| MdrError::Xml(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KTOR_LIKE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <!-- do_not_remove: published-with-gradle-metadata -->
  <modelVersion>4.0.0</modelVersion>
  <parent>
    <groupId>org.acme</groupId>
    <artifactId>acme-parent</artifactId>
    <version>3</version>
  </parent>
  <artifactId>widget</artifactId>
  <version>1.0</version>
  <packaging>bundle</packaging>
  <properties>
    <gizmo.version>2.1</gizmo.version>
  </properties>
  <dependencyManagement>
    <dependencies>
      <dependency>
        <groupId>org.acme</groupId>
        <artifactId>gadget</artifactId>
        <version>4.2</version>
      </dependency>
    </dependencies>
  </dependencyManagement>
  <dependencies>
    <dependency>
      <groupId>${project.groupId}</groupId>
      <artifactId>gizmo</artifactId>
      <version>${gizmo.version}</version>
    </dependency>
    <dependency>
      <groupId>org.acme</groupId>
      <artifactId>gadget</artifactId>
    </dependency>
    <dependency>
      <groupId>junit</groupId>
      <artifactId>junit</artifactId>
      <version>4.13</version>
      <scope>test</scope>
      <optional>true</optional>
      <exclusions>
        <exclusion><groupId>org.hamcrest</groupId><artifactId>hamcrest-core</artifactId></exclusion>
      </exclusions>
    </dependency>
  </dependencies>
</project>"#;

    #[test]
    fn parses_and_builds_effective_model() {
        assert!(is_published_with_gradle_metadata(KTOR_LIKE));
        let mut project = Project::parse(KTOR_LIKE.as_bytes()).unwrap();
        assert_eq!(project.group_id, None);
        assert_eq!(project.effective_group_id(), Some("org.acme"));
        assert_eq!(project.artifact_extension(), Some("jar"));
        assert_eq!(project.dependencies[2].optional, Some(true));
        assert_eq!(project.dependencies[2].exclusions.len(), 1);

        project.expand_templates();
        project.apply_dependency_management();
        assert_eq!(project.dependencies[0].group_id, "org.acme");
        assert_eq!(project.dependencies[0].version.as_deref(), Some("2.1"));
        assert_eq!(project.dependencies[1].version.as_deref(), Some("4.2"));
    }

    #[test]
    fn parent_values_are_inherited_but_not_overriding() {
        let parent = Project {
            group_id: Some("org.acme".into()),
            version: Some("3".into()),
            properties: BTreeMap::from([
                ("a".to_string(), "parent".to_string()),
                ("b".to_string(), "parent".to_string()),
            ]),
            dependencies: vec![PomDependency {
                group_id: "org.acme".into(),
                artifact_id: "base".into(),
                version: Some("1".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut child = Project {
            artifact_id: Some("child".into()),
            properties: BTreeMap::from([("a".to_string(), "child".to_string())]),
            ..Default::default()
        };
        child.merge_parent(&parent);
        assert_eq!(child.group_id.as_deref(), Some("org.acme"));
        assert_eq!(child.properties["a"], "child");
        assert_eq!(child.properties["b"], "parent");
        assert_eq!(child.dependencies.len(), 1);
    }

    #[test]
    fn templates_expand_recursively_and_keep_unknowns() {
        let props = BTreeMap::from([
            ("outer".to_string(), "${inner}".to_string()),
            ("inner".to_string(), "42".to_string()),
        ]);
        assert_eq!(expand_templates("v${outer}", &props), "v42");
        assert_eq!(expand_templates("${missing}-x", &props), "${missing}-x");
        assert_eq!(expand_templates("${unterminated", &props), "${unterminated");
    }

    #[test]
    fn malformed_documents_are_reported() {
        let err = Project::parse(b"<project><dependencies>").unwrap_err();
        assert_eq!(err.kind(), "MalformedMetadata");
        let err = Project::parse(b"<settings/>").unwrap_err();
        assert_eq!(err.kind(), "MalformedMetadata");
    }

    #[test]
    fn writing_then_reading_preserves_the_model() {
        let project = Project::parse(KTOR_LIKE.as_bytes()).unwrap();
        let xml = project.to_xml().unwrap();
        let reparsed = Project::parse(xml.as_bytes()).unwrap();
        assert_eq!(reparsed, project);
    }
}
