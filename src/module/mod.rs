//! Module resolution for `import` statements.
//!
//! The compiler is handed a resolver; each `import X` asks it for the
//! absolute path of `X`. The default implementation searches a list of
//! import roots for `X.ss`.

use std::path::{Path, PathBuf};

/// Maps an import name to a source file path. Injected into the compiler;
/// a failed resolution surfaces as a compile error at the import site.
pub trait ModuleResolver {
    fn resolve(&self, import_name: &str) -> Result<PathBuf, String>;
}

/// Filesystem resolver: searches the configured roots in order for
/// `<name>.ss`.
pub struct FileModuleResolver {
    roots: Vec<PathBuf>,
}

impl FileModuleResolver {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self { roots }
    }

    /// A resolver rooted at a single directory (typically the entry
    /// file's).
    pub fn for_directory(dir: &Path) -> Self {
        Self {
            roots: vec![dir.to_path_buf()],
        }
    }
}

impl ModuleResolver for FileModuleResolver {
    fn resolve(&self, import_name: &str) -> Result<PathBuf, String> {
        let file_name = format!("{}.ss", import_name);
        for root in &self.roots {
            let candidate = root.join(&file_name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }
        Err(format!(
            "module '{}' not found in {} import root(s)",
            import_name,
            self.roots.len()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_module_reports_roots() {
        let resolver = FileModuleResolver::new(vec![PathBuf::from("/nonexistent")]);
        let err = resolver.resolve("Missing").unwrap_err();
        assert!(err.contains("Missing"));
    }
}
