//! Equation placeholder service.
//!
//! Equation-to-markup conversion is expensive and lives behind the
//! [`TexEngine`] boundary, but the markdown renderer's handlers are
//! synchronous. The service bridges the two with a two-phase protocol:
//! [`placeholder`](EquationService::placeholder) synchronously hands out a
//! unique token (or an already-cached result), and
//! [`fill_placeholders`](EquationService::fill_placeholders) later walks
//! the finished HTML, resolves every pending token through the engine, and
//! substitutes the markup in place. Results persist across process
//! restarts through a [`CacheBucket`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex};

use ck_cache::CacheBucket;
use regex::Regex;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"XEQUATIONX[0-9]+XEQUATIONX").expect("invalid placeholder regex"));

/// Error produced by a [`TexEngine`].
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct TexError(pub String);

/// Boundary to the equation-rendering backend.
///
/// Implementations should defer any heavyweight initialization until the
/// first `render` call; the service only touches the engine when a
/// document actually contains an uncached equation.
pub trait TexEngine: Send + Sync {
    /// Render TeX source to display markup.
    fn render(&self, code: &str, inline: bool) -> Result<String, TexError>;
}

/// Engine that renders every equation as empty markup.
///
/// Used in tests and in builds without an equation backend; documents
/// still compile, with empty equation spans.
pub struct NullEngine;

impl TexEngine for NullEngine {
    fn render(&self, _code: &str, _inline: bool) -> Result<String, TexError> {
        Ok(String::new())
    }
}

/// Two-phase equation rendering with a persistent cache.
pub struct EquationService {
    engine: Box<dyn TexEngine>,
    store: Arc<dyn CacheBucket>,
    pending: Mutex<HashMap<String, (String, bool)>>,
    counter: AtomicUsize,
}

impl EquationService {
    /// Create a service over an engine and a persistent cache bucket.
    pub fn new(engine: Box<dyn TexEngine>, store: Arc<dyn CacheBucket>) -> Self {
        Self {
            engine,
            store,
            pending: Mutex::new(HashMap::new()),
            counter: AtomicUsize::new(0),
        }
    }

    /// Return cached markup for `(code, inline)`, or a unique placeholder
    /// token recording the pending pair.
    ///
    /// `code` must already be entity-decoded.
    pub fn placeholder(&self, code: &str, inline: bool) -> String {
        if let Some(markup) = self.store.get(&store_key(code, inline)) {
            return markup;
        }
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let token = format!("XEQUATIONX{n}XEQUATIONX");
        self.pending
            .lock()
            .expect("pending equations poisoned")
            .insert(token.clone(), (code.to_owned(), inline));
        token
    }

    /// Replace every placeholder token in `html` with rendered markup.
    ///
    /// Engine failures degrade to empty markup behind a warning that
    /// carries the offending source.
    pub fn fill_placeholders(&self, html: &str, warnings: &mut Vec<String>) -> String {
        if !html.contains("XEQUATIONX") {
            return html.to_owned();
        }
        let mut result = String::with_capacity(html.len());
        let mut last = 0;
        for m in PLACEHOLDER_RE.find_iter(html) {
            result.push_str(&html[last..m.start()]);
            result.push_str(&self.resolve_token(m.as_str(), warnings));
            last = m.end();
        }
        result.push_str(&html[last..]);
        result
    }

    fn resolve_token(&self, token: &str, warnings: &mut Vec<String>) -> String {
        let pending = self
            .pending
            .lock()
            .expect("pending equations poisoned")
            .remove(token);
        match pending {
            Some((code, inline)) => self.resolve(&code, inline, warnings),
            None => {
                warnings.push(format!("unknown equation placeholder {token}"));
                String::new()
            }
        }
    }

    fn resolve(&self, code: &str, inline: bool, warnings: &mut Vec<String>) -> String {
        let key = store_key(code, inline);
        if let Some(markup) = self.store.get(&key) {
            return markup;
        }
        let markup = match self.engine.render(code, inline) {
            Ok(markup) => markup,
            Err(e) => {
                tracing::warn!(code, "equation engine failed: {e}");
                warnings.push(format!("Equation error – {e} at \"{code}\""));
                String::new()
            }
        };
        // Failures are cached too, so a broken equation is reported once.
        self.store.set(&key, &markup);
        markup
    }

    /// Flush the persistent cache.
    pub fn flush(&self) {
        self.store.flush();
    }
}

fn store_key(code: &str, inline: bool) -> String {
    format!("{code}{inline}")
}
