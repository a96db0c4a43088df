//! Compiler error type.
//!
//! Only genuinely fatal conditions become errors; everything the compiler
//! can degrade gracefully from (bad ids, missing localization keys,
//! malformed shorthand expressions) surfaces as a warning on the compile
//! result instead. An error aborts the one (course, locale) pair it
//! occurred in without affecting other compilations in the same run.

/// Fatal failure compiling one (course, locale) pair.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The first segment of the document declared no `##` section title.
    #[error("course {course_id} ({locale}) must start with a section title (##)")]
    MissingSectionTitle {
        /// Course being compiled.
        course_id: String,
        /// Locale being compiled.
        locale: String,
    },

    /// A rendered step could not be parsed back into a tree.
    #[error("malformed step markup: {0}")]
    Dom(#[from] ck_dom::DomError),

    /// Reading or writing an artifact failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The course artifact could not be serialized.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
