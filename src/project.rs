//! `.ssproject` descriptor loading.
//!
//! A project file is an XML-like descriptor naming the entry source and
//! optional import roots:
//!
//! ```text
//! <SSProject>
//!   <Entry>Scripts/main.ss</Entry>
//!   <ImportRoots>
//!     <Root>Scripts</Root>
//!     <Root>Libs</Root>
//!   </ImportRoots>
//! </SSProject>
//! ```

use std::path::{Path, PathBuf};

use crate::error::SwiftScriptError;

/// A loaded project: entry file and import roots as absolute paths.
#[derive(Debug, Clone)]
pub struct Project {
    pub project_file: PathBuf,
    pub project_dir: PathBuf,
    pub entry_file: PathBuf,
    pub import_roots: Vec<PathBuf>,
}

impl Project {
    /// Read and parse a `.ssproject` descriptor.
    pub fn load(path: &Path) -> Result<Project, SwiftScriptError> {
        let text = std::fs::read_to_string(path)?;
        let project_file = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let project_dir = project_file
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let entry = extract_tag(&text, "Entry").ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("{}: missing <Entry> element", path.display()),
            )
        })?;
        let entry_file = absolute(&project_dir, entry.trim());
        if !entry_file.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("entry file '{}' does not exist", entry_file.display()),
            )
            .into());
        }

        let mut import_roots = Vec::new();
        if let Some(roots_block) = extract_tag(&text, "ImportRoots") {
            let mut rest = roots_block.as_str();
            while let Some(root) = extract_tag(rest, "Root") {
                import_roots.push(absolute(&project_dir, root.trim()));
                let close = rest.find("</Root>").map(|i| i + "</Root>".len());
                rest = match close {
                    Some(offset) => &rest[offset..],
                    None => break,
                };
            }
        }
        if import_roots.is_empty() {
            if let Some(parent) = entry_file.parent() {
                import_roots.push(parent.to_path_buf());
            }
        }

        Ok(Project {
            project_file,
            project_dir,
            entry_file,
            import_roots,
        })
    }

    /// Output name for `build`: the project file stem.
    pub fn name(&self) -> String {
        self.project_file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "out".to_string())
    }
}

fn absolute(base: &Path, relative: &str) -> PathBuf {
    let candidate = base.join(relative);
    std::fs::canonicalize(&candidate).unwrap_or(candidate)
}

/// First `<tag>…</tag>` body in `text`.
fn extract_tag(text: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(text[start..end].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_tag() {
        let text = "<SSProject><Entry>main.ss</Entry></SSProject>";
        assert_eq!(extract_tag(text, "Entry").as_deref(), Some("main.ss"));
        assert_eq!(extract_tag(text, "Missing"), None);
    }

    #[test]
    fn test_extract_nested_roots() {
        let text = "<ImportRoots><Root>a</Root><Root>b</Root></ImportRoots>";
        let block = extract_tag(text, "ImportRoots").unwrap();
        assert_eq!(extract_tag(&block, "Root").as_deref(), Some("a"));
    }
}
