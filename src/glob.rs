//! `onlyOn` pattern matching.
//!
//! Patterns are written relative to a package directory while the changed
//! files come from git relative to the repository root. The package directory
//! is turned into a root-relative prefix, escaped and prepended to the glob,
//! then the glob is matched with `literal_separator` so `*` never crosses a `/`.

use globset::{GlobBuilder, GlobMatcher};
use itertools::Itertools;
use std::path::{Path, PathBuf};

/// A compiled `onlyOn` pattern scoped to one package directory.
#[derive(Debug, Clone)]
pub struct PackageGlob {
    dir: String,
    matcher: GlobMatcher,
}

impl PackageGlob {
    pub fn new(pattern: &str, base_path: &Path, root_dir: &Path) -> Result<Self, globset::Error> {
        let dir = package_dir(base_path, root_dir);
        let pattern = normalize(pattern);
        let pattern = pattern.trim_start_matches('/');
        let glob = if dir.is_empty() {
            pattern.to_string()
        } else {
            format!("{}/{pattern}", globset::escape(&dir))
        };
        let matcher = GlobBuilder::new(&glob)
            .literal_separator(true)
            .empty_alternates(true)
            .build()?
            .compile_matcher();
        trace!("onlyOn {pattern:?} in {dir:?} compiled to {glob:?}");
        Ok(Self { dir, matcher })
    }

    pub fn is_match(&self, file: &Path) -> bool {
        let file = normalize(&file.to_string_lossy());
        let file = Path::new(&file);
        (self.dir.is_empty() || file.starts_with(&self.dir)) && self.matcher.is_match(file)
    }

    pub fn matches<P: AsRef<Path>>(&self, files: &[P]) -> Vec<PathBuf> {
        files
            .iter()
            .map(|f| f.as_ref())
            .filter(|f| self.is_match(f))
            .map(|f| f.to_path_buf())
            .collect_vec()
    }
}

/// Returns the files (relative to `root_dir`) that lie under `base_path` and
/// satisfy `pattern`, which is interpreted relative to `base_path`.
pub fn get_matches<P: AsRef<Path>>(
    pattern: &str,
    base_path: &Path,
    files: &[P],
    root_dir: &Path,
) -> Result<Vec<PathBuf>, globset::Error> {
    Ok(PackageGlob::new(pattern, base_path, root_dir)?.matches(files))
}

/// Root-relative, `/`-separated form of the package directory. Empty when the
/// package is the repository root.
fn package_dir(base_path: &Path, root_dir: &Path) -> String {
    let rel = base_path.strip_prefix(root_dir).unwrap_or(base_path);
    normalize(&rel.to_string_lossy())
}

fn normalize(path: &str) -> String {
    let mut path = path.replace('\\', "/");
    while let Some(rest) = path.strip_prefix("./") {
        path = rest.to_string();
    }
    if path == "." {
        path.clear();
    }
    path.trim_end_matches('/').to_string()
}
