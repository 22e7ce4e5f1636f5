//! Application session
//!
//! Bundles what every pipeline stage shares for the lifetime of one
//! application run: the process engine (and with it the in-flight table and
//! session marker), the directory layout, the path translator, and the
//! program that implements the placement, sync and kill-all helpers.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use crate::infra::dirs::LocalpackDirs;
use crate::infra::paths::{IdentityPaths, PathTranslator};
use crate::infra::process::{quote_arg, ProcessEngine, ProcessTask};

/// Fallback helper program when the running executable cannot be located
const HELPER_FALLBACK: &str = "localpack";

type TranslationCache = HashMap<(PathBuf, PathBuf), String>;

/// Shared state of one application run
#[derive(Debug, Clone)]
pub struct Session {
    engine: ProcessEngine,
    dirs: LocalpackDirs,
    translator: Arc<dyn PathTranslator>,
    translations: Arc<Mutex<TranslationCache>>,
    helper: PathBuf,
}

impl Session {
    /// Create a session using the running executable as helper program
    pub fn new(engine: ProcessEngine, dirs: LocalpackDirs) -> Self {
        let helper =
            std::env::current_exe().unwrap_or_else(|_| PathBuf::from(HELPER_FALLBACK));
        Self {
            engine,
            dirs,
            translator: Arc::new(IdentityPaths),
            translations: Arc::new(Mutex::new(HashMap::new())),
            helper,
        }
    }

    /// Use another program for the helper subcommands
    #[must_use]
    pub fn with_helper(mut self, helper: impl Into<PathBuf>) -> Self {
        self.helper = helper.into();
        self
    }

    /// Use another path translator
    #[must_use]
    pub fn with_translator(mut self, translator: Arc<dyn PathTranslator>) -> Self {
        self.set_translator(translator);
        self
    }

    /// Switch path translation, dropping every cached translation
    pub fn set_translator(&mut self, translator: Arc<dyn PathTranslator>) {
        self.translator = translator;
        self.translations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Process engine
    pub fn engine(&self) -> &ProcessEngine {
        &self.engine
    }

    /// Directory layout
    pub fn dirs(&self) -> &LocalpackDirs {
        &self.dirs
    }

    /// Helper program path
    pub fn helper(&self) -> &Path {
        &self.helper
    }

    /// Marker carried by every process of this session
    pub fn marker(&self) -> &str {
        self.engine.session_marker()
    }

    /// Translate a path for a program running in `cwd`
    pub fn translate(&self, cwd: &Path, path: &Path) -> String {
        let key = (cwd.to_path_buf(), path.to_path_buf());
        let mut cache = self
            .translations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        cache
            .entry(key)
            .or_insert_with(|| {
                crate::infra::paths::translate_arg(self.translator.as_ref(), cwd, path)
            })
            .clone()
    }

    /// Number of cached translations
    pub fn cached_translations(&self) -> usize {
        self.translations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Task running `<helper> <subcommand> --session <marker> <args...>` in `cwd`
    pub fn helper_task<I, S>(&self, cwd: &Path, subcommand: &str, args: I) -> ProcessTask
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ProcessTask::new(quote_arg(&self.helper.to_string_lossy()), cwd)
            .arg(subcommand)
            .args(["--session", self.marker()])
            .args(args)
    }
}
