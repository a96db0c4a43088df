//! Arena-based HTML tree for coursekit post-processing.
//!
//! The compiler renders markdown to an HTML string, then runs a series of
//! in-place rewrite passes over it (attribute expansion, no-wrap insertion,
//! goal annotation). Those passes need a mutable tree with parent access,
//! which this crate models as an arena: every node lives in a flat `Vec`
//! and refers to its parent and children by [`NodeId`] index, so tree
//! edits are simple index operations with no aliasing hazards.
//!
//! Text placement follows the `text`/`tail` convention: an element's
//! `text` precedes its first child, and each child's `tail` is the text
//! between it and the next sibling.
//!
//! # Example
//!
//! ```
//! use ck_dom::Document;
//!
//! let mut doc = Document::parse("<p>Hello <em>world</em>!</p>", "x-step").unwrap();
//! let p = doc.children(doc.root())[0];
//! doc.add_class(p, "intro");
//! assert_eq!(doc.outer_html(doc.root()),
//!     r#"<x-step><p class="intro">Hello <em>world</em>!</p></x-step>"#);
//! ```

pub mod entities;
mod parse;
mod serialize;
mod tree;

pub use parse::DomError;
pub use serialize::{escape_attr, escape_text};
pub use tree::{Document, NodeId};
