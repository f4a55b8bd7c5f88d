//! # Schema Sources
//!
//! Raw `.proto` files of a producing component, as delivered by the upstream provider.
//!
//! Upstream bundles travel as base64 text. Once decoded, a bundle is a JSON object grouping files
//! by the artifact that shipped them:
//!
//! ```json
//! { "router-proto.jar": { "echo.proto": "syntax = \"proto3\"; ..." } }
//! ```
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Schema bundle of '{component}' is not valid base64: '{source}'")]
    InvalidBase64 {
        component: String,
        source: base64::DecodeError,
    },
    #[error("Schema bundle of '{component}' is not a JSON tree of files: '{source}'")]
    InvalidJson {
        component: String,
        source: serde_json::Error,
    },
}

/// One schema-definition file of a producing component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaSource {
    pub component: String,
    /// File name relative to the component's schema root (e.g. `act/echo.proto`).
    pub file_name: String,
    pub content: Vec<u8>,
}

impl SchemaSource {
    pub fn new(
        component: impl Into<String>,
        file_name: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            component: component.into(),
            file_name: file_name.into(),
            content: content.into(),
        }
    }
}

/// Decodes a base64 schema bundle into its individual files.
pub fn unpack_bundle(component: &str, encoded: &[u8]) -> Result<Vec<SchemaSource>, SourceError> {
    let encoded: Vec<u8> = encoded
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();

    let decoded = STANDARD
        .decode(encoded)
        .map_err(|source| SourceError::InvalidBase64 {
            component: component.to_string(),
            source,
        })?;

    let tree: BTreeMap<String, BTreeMap<String, String>> = serde_json::from_slice(&decoded)
        .map_err(|source| SourceError::InvalidJson {
            component: component.to_string(),
            source,
        })?;

    Ok(tree
        .into_values()
        .flat_map(BTreeMap::into_iter)
        .map(|(file_name, content)| SchemaSource::new(component, file_name, content))
        .collect())
}

/// Returns `content` with `package <default_package>;` inserted when it declares no package.
///
/// The statement goes right after `syntax = ...;` when there is one, otherwise at the top.
pub fn inject_package(content: &str, default_package: &str) -> String {
    if declares_package(content) {
        return content.to_string();
    }

    let statement = format!("package {default_package};\n");

    match syntax_statement_end(content) {
        Some(end) => {
            let (head, tail) = content.split_at(end);
            format!("{head}\n\n{statement}{tail}")
        }
        None => format!("{statement}\n{content}"),
    }
}

fn declares_package(content: &str) -> bool {
    content.lines().map(strip_line_comment).any(|line| {
        line.trim_start()
            .strip_prefix("package")
            .is_some_and(|rest| rest.starts_with(char::is_whitespace))
    })
}

fn syntax_statement_end(content: &str) -> Option<usize> {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let code = strip_line_comment(line);
        if code.trim_start().starts_with("syntax") || code.trim_start().starts_with("edition") {
            return code.find(';').map(|i| offset + i + 1);
        }
        offset += line.len();
    }
    None
}

fn strip_line_comment(line: &str) -> &str {
    match line.find("//") {
        Some(i) => &line[..i],
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpacks_every_file_of_every_group() {
        let tree = serde_json::json!({
            "a.jar": { "echo.proto": "syntax = \"proto3\";" },
            "b.jar": { "common.proto": "syntax = \"proto2\";", "x/y.proto": "" }
        });
        let encoded = STANDARD.encode(tree.to_string());

        let mut files = unpack_bundle("router", encoded.as_bytes()).unwrap();
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));

        let names: Vec<_> = files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["common.proto", "echo.proto", "x/y.proto"]);
        assert!(files.iter().all(|f| f.component == "router"));
        assert_eq!(files[1].content, b"syntax = \"proto3\";");
    }

    #[test]
    fn rejects_malformed_bundles() {
        assert!(matches!(
            unpack_bundle("router", b"%%%"),
            Err(SourceError::InvalidBase64 { .. })
        ));

        let not_a_tree = STANDARD.encode("[1, 2, 3]");
        assert!(matches!(
            unpack_bundle("router", not_a_tree.as_bytes()),
            Err(SourceError::InvalidJson { .. })
        ));
    }

    #[test]
    fn injects_package_after_syntax() {
        let source = "syntax = \"proto3\";\nmessage A {}\n";

        let patched = inject_package(source, "gateway");

        assert_eq!(
            patched,
            "syntax = \"proto3\";\n\npackage gateway;\n\nmessage A {}\n"
        );
    }

    #[test]
    fn injects_package_at_top_without_syntax() {
        let patched = inject_package("message A {}\n", "gateway");

        assert!(patched.starts_with("package gateway;\n"));
    }

    #[test]
    fn leaves_declared_package_alone() {
        let source = "syntax = \"proto3\";\npackage router;\nmessage package_info {}\n";

        assert_eq!(inject_package(source, "gateway"), source);
    }

    #[test]
    fn ignores_package_in_comments_and_identifiers() {
        let source = "syntax = \"proto3\"; // package foo;\nmessage packages {}\n";

        assert!(inject_package(source, "gateway").contains("package gateway;"));
    }
}
