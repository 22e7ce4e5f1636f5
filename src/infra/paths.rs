//! Path translation seam
//!
//! Paths handed to external programs may need rewriting when they cross a
//! host/guest filesystem boundary. The translation itself is a collaborator;
//! this module only defines the seam and the pass-through default.

use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// Translate a path for a program running in `cwd`
pub trait PathTranslator: Debug + Send + Sync {
    /// Return the path as the external program should see it
    fn translate(&self, cwd: &Path, path: &Path) -> PathBuf;
}

/// Leaves every path untouched
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityPaths;

impl PathTranslator for IdentityPaths {
    fn translate(&self, _cwd: &Path, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
}

/// Translate a path and render it as a command argument
pub fn translate_arg(translator: &dyn PathTranslator, cwd: &Path, path: &Path) -> String {
    translator.translate(cwd, path).to_string_lossy().into_owned()
}
