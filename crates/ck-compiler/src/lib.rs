//! coursekit course compiler.
//!
//! Turns author-written course documents (a custom markdown dialect with
//! block directives, inline math, and interactive-widget markup) plus
//! companion localization files into structured JSON Course artifacts for
//! the runtime renderer. One [`Compiler`] owns all run-scoped shared state
//! (the equation cache, the YAML memo, the course-URL set), so runs are
//! re-entrant and testable.
//!
//! Compilation of one (course, locale) pair is deterministic: identical
//! source text hashes to an identical artifact, which is what lets the
//! change cache skip recompilation entirely.
//!
//! # Example
//!
//! ```no_run
//! use ck_cache::JsonCache;
//! use ck_compiler::{Compiler, CompilerConfig};
//! use ck_renderer::NullEngine;
//!
//! let config = CompilerConfig::default();
//! let cache = JsonCache::new("/tmp/coursekit-cache".into());
//! let compiler = Compiler::new(config, Box::new(NullEngine), &cache);
//! let outcomes = compiler.compile_all();
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ck_cache::{Cache, CacheBucket};
use ck_renderer::{EquationService, RenderOptions, TexEngine};
use rayon::prelude::*;

mod config;
mod course;
mod error;
mod goals;
mod locale;
mod output;
mod postprocess;
mod step;

pub use config::{CompilerConfig, ConfigError};
pub use course::{Compiled, Course, Section, StepRecord};
pub use error::CompileError;
pub use output::write_course;

/// Compiles course directories into Course artifacts.
///
/// Holds the run-scoped shared state: the equation placeholder service
/// (backed by the persistent equation cache), the change cache, the
/// per-path YAML memo, and the set of compiled section URLs.
pub struct Compiler {
    pub(crate) config: CompilerConfig,
    pub(crate) equations: EquationService,
    pub(crate) changes: Arc<dyn CacheBucket>,
    pub(crate) yaml_memo: Mutex<HashMap<PathBuf, serde_json::Map<String, serde_json::Value>>>,
    pub(crate) course_urls: Mutex<BTreeSet<String>>,
    /// Localization-file fragments always render with English options.
    pub(crate) fragment_options: RenderOptions,
}

impl Compiler {
    /// Create a compiler over an equation engine and a persistent cache.
    ///
    /// Two buckets are opened: `changes` for source-content hashes and
    /// `equations` for rendered equation markup.
    pub fn new(config: CompilerConfig, engine: Box<dyn TexEngine>, cache: &dyn Cache) -> Self {
        let fragment_options = config.render_options("en");
        Self {
            equations: EquationService::new(engine, cache.bucket("equations")),
            changes: cache.bucket("changes"),
            yaml_memo: Mutex::new(HashMap::new()),
            course_urls: Mutex::new(BTreeSet::new()),
            fragment_options,
            config,
        }
    }

    /// Compile every course and locale under the configured content tree,
    /// writing artifacts for freshly compiled courses.
    ///
    /// Pairs compile in parallel; a fatal error in one pair never affects
    /// the others. Caches are flushed once at the end of the run.
    pub fn compile_all(&self) -> Vec<CourseOutcome> {
        let courses = discover_courses(&self.config.content_dir);
        let pairs: Vec<(PathBuf, String)> = courses
            .iter()
            .flat_map(|dir| {
                self.config
                    .locales
                    .iter()
                    .map(|locale| (dir.clone(), locale.clone()))
            })
            .collect();

        let outcomes: Vec<CourseOutcome> = pairs
            .into_par_iter()
            .map(|(dir, locale)| {
                let result = self.compile(&dir, &locale).and_then(|compiled| {
                    if let Compiled::Course { course, .. } = &compiled {
                        output::write_course(course, &self.config.output_dir)?;
                    }
                    Ok(compiled)
                });
                CourseOutcome {
                    course_id: dir_name(&dir),
                    locale,
                    result,
                }
            })
            .collect();

        self.flush();
        outcomes
    }

    /// URLs of unlocked English sections compiled so far, for sitemaps.
    pub fn course_urls(&self) -> Vec<String> {
        self.course_urls
            .lock()
            .expect("course urls poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Force-flush the change and equation caches.
    pub fn flush(&self) {
        self.changes.flush();
        self.equations.flush();
    }
}

/// Result of one (course, locale) pair within [`Compiler::compile_all`].
#[derive(Debug)]
pub struct CourseOutcome {
    /// Course id (the directory name).
    pub course_id: String,
    /// Locale compiled.
    pub locale: String,
    /// The compilation result.
    pub result: Result<Compiled, CompileError>,
}

/// Course directories under the content root, sorted by id.
fn discover_courses(content_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(content_dir) else {
        return Vec::new();
    };
    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter(|entry| is_course_dir_name(&entry.file_name().to_string_lossy()))
        .map(|entry| entry.path())
        .collect();
    dirs.sort();
    dirs
}

/// Whether a directory name under the content root is a course.
pub(crate) fn is_course_dir_name(name: &str) -> bool {
    name != "shared" && name != "translations" && !name.starts_with('_') && !name.contains('.')
}

pub(crate) fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
