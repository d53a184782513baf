// mdr-common/src/model/maven_metadata.rs
// `maven-metadata.xml` at the module level lists the published versions.

use roxmltree::Document;

use crate::error::{MdrError, Result};
use crate::model::pom::{child, child_text, children, parse_document, xml_options};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MavenMetadata {
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    pub latest: Option<String>,
    pub release: Option<String>,
    pub versions: Vec<String>,
}

pub fn parse_maven_metadata(bytes: &[u8]) -> Result<MavenMetadata> {
    let text = parse_document(bytes, "maven-metadata.xml")?;
    let doc = Document::parse_with_options(&text, xml_options())
        .map_err(|e| MdrError::MalformedMetadata("maven-metadata.xml".to_string(), e.to_string()))?;
    let root = doc.root_element();
    if root.tag_name().name() != "metadata" {
        return Err(MdrError::MalformedMetadata(
            "maven-metadata.xml".to_string(),
            format!("unexpected root <{}>", root.tag_name().name()),
        ));
    }
    let versioning = child(root, "versioning");
    let versions = versioning
        .and_then(|v| child(v, "versions"))
        .map(|vs| {
            children(vs, "version")
                .filter_map(|v| v.text().map(|t| t.trim().to_string()))
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();
    Ok(MavenMetadata {
        group_id: child_text(root, "groupId"),
        artifact_id: child_text(root, "artifactId"),
        latest: versioning.and_then(|v| child_text(v, "latest")),
        release: versioning.and_then(|v| child_text(v, "release")),
        versions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_versions_in_document_order() {
        let xml = br#"<metadata>
  <groupId>org.acme</groupId>
  <artifactId>widget</artifactId>
  <versioning>
    <latest>2.0</latest>
    <release>2.0</release>
    <versions><version>1.0</version><version>1.5</version><version>2.0</version></versions>
  </versioning>
</metadata>"#;
        let metadata = parse_maven_metadata(xml).unwrap();
        assert_eq!(metadata.versions, vec!["1.0", "1.5", "2.0"]);
        assert_eq!(metadata.release.as_deref(), Some("2.0"));
    }
}
