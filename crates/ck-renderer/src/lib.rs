//! Course markdown dialect renderer.
//!
//! Turns one segment of an author-written course document into HTML,
//! in three stages:
//!
//! 1. [`preprocess`]: `:::` container directives become nested wrappers,
//!    and a handful of text substitutions resolve grammar collisions.
//! 2. [`CourseRenderer`]: an event-driven markdown pass that captures
//!    titles and metadata, rewrites inline interactions (blanks,
//!    equations, variables, emoji), and dispatches links and code spans.
//! 3. [`EquationService::fill_placeholders`]: equation placeholders left
//!    by the render pass are resolved through the (cached) [`TexEngine`]
//!    backend.
//!
//! The post-processing passes that operate on the rendered HTML as a tree
//! live in the compiler crate; this crate is purely text to text.

mod equation;
pub mod expr;
pub mod inline;
mod metadata;
pub mod preprocess;
mod renderer;
pub mod template;

pub use equation::{EquationService, NullEngine, TexEngine, TexError};
pub use metadata::StepMetadata;
pub use preprocess::{block_containers, preprocess, preprocess_fragment};
pub use renderer::{CourseRenderer, RenderOptions, RenderResult, is_rtl};
pub use template::{TagExpr, TemplateError};
