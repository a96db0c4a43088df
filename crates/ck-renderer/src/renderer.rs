//! Course markdown renderer.
//!
//! An event-driven renderer over pulldown-cmark with course-specific
//! handling: level-1/2 headings are captured as course/section titles
//! instead of being emitted, blockquotes carry YAML step metadata, inline
//! bodies run through the inline rewriter, links dispatch on their scheme
//! prefix, and code spans parse as math expressions. Equations leave as
//! placeholders to be filled after rendering (see
//! [`EquationService`](crate::EquationService)).

use std::collections::BTreeSet;
use std::fmt::Write;
use std::sync::LazyLock;

use ck_dom::entities;
use ck_dom::{escape_attr, escape_text};
use pulldown_cmark::{Alignment, CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use regex::Regex;

use crate::equation::EquationService;
use crate::metadata::StepMetadata;
use crate::{expr, inline, template};

static LANG_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\{(\w+)\}").expect("invalid lang tag regex"));

/// Language names for syntax highlighting that differ from their fence tag.
fn lang_alias(lang: &str) -> &str {
    match lang {
        "py" => "python",
        "c" => "clike",
        "jl" => "julia",
        "sh" => "bash",
        "code" => "md",
        other => other,
    }
}

/// Locales written right to left.
#[must_use]
pub fn is_rtl(locale: &str) -> bool {
    matches!(locale, "ar" | "he" | "fa" | "ur")
}

/// Options shared by every render of one course.
#[derive(Clone, Debug)]
pub struct RenderOptions {
    /// Locale being compiled.
    pub locale: String,
    /// Site domain; links elsewhere open in a new tab.
    pub domain: String,
    /// Base URL for emoji images.
    pub emoji_url: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            locale: "en".to_owned(),
            domain: "example.org".to_owned(),
            emoji_url: "https://static.example.org/emoji".to_owned(),
        }
    }
}

/// Result of rendering one markdown segment.
#[derive(Debug)]
pub struct RenderResult {
    /// Rendered HTML (with unresolved equation placeholders).
    pub html: String,
    /// Metadata merged from blockquote front matter.
    pub metadata: StepMetadata,
    /// Course title from the first `#` heading.
    pub course_title: Option<String>,
    /// Section title from the last `##` heading.
    pub section_title: Option<String>,
    /// Glossary ids referenced via `gloss:` links.
    pub gloss: BTreeSet<String>,
    /// Biography ids referenced via `bio:` links.
    pub bios: BTreeSet<String>,
    /// Warnings collected along the way.
    pub warnings: Vec<String>,
}

#[derive(Debug)]
enum BufKind {
    Paragraph,
    Item { has_block: bool },
    Cell { header: bool, align: &'static str },
    Heading(u8),
    Link,
    ImageAlt,
}

#[derive(Debug)]
struct Buf {
    kind: BufKind,
    content: String,
}

struct CodeBlock {
    lang: Option<String>,
    content: String,
}

/// Event-driven renderer for one markdown segment.
pub struct CourseRenderer<'a> {
    equations: &'a EquationService,
    options: &'a RenderOptions,
    output: String,
    bufs: Vec<Buf>,
    links: Vec<String>,
    code: Option<CodeBlock>,
    pending_image: Option<(String, String)>,
    table_aligns: Vec<Alignment>,
    in_table_head: bool,
    cell_index: usize,
    blockquote_depth: usize,
    metadata: StepMetadata,
    course_title: Option<String>,
    section_title: Option<String>,
    gloss: BTreeSet<String>,
    bios: BTreeSet<String>,
    warnings: Vec<String>,
}

impl<'a> CourseRenderer<'a> {
    /// Create a renderer bound to an equation service and render options.
    pub fn new(equations: &'a EquationService, options: &'a RenderOptions) -> Self {
        Self {
            equations,
            options,
            output: String::with_capacity(4096),
            bufs: Vec::new(),
            links: Vec::new(),
            code: None,
            pending_image: None,
            table_aligns: Vec::new(),
            in_table_head: false,
            cell_index: 0,
            blockquote_depth: 0,
            metadata: StepMetadata::default(),
            course_title: None,
            section_title: None,
            gloss: BTreeSet::new(),
            bios: BTreeSet::new(),
            warnings: Vec::new(),
        }
    }

    /// Render a (preprocessed) markdown segment.
    pub fn render(mut self, source: &str) -> RenderResult {
        let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
        for event in Parser::new_ext(source, options) {
            self.event(event);
        }
        RenderResult {
            html: self.output,
            metadata: self.metadata,
            course_title: self.course_title,
            section_title: self.section_title,
            gloss: self.gloss,
            bios: self.bios,
            warnings: self.warnings,
        }
    }

    /// Append to the innermost open buffer, or the output.
    fn push(&mut self, s: &str) {
        if let Some(buf) = self.bufs.last_mut() {
            buf.content.push_str(s);
        } else {
            self.output.push_str(s);
        }
    }

    /// Mark an enclosing list item as containing block-level content, so
    /// its body is not inline-rewritten a second time.
    fn mark_item_block(&mut self) {
        if let Some(Buf {
            kind: BufKind::Item { has_block },
            ..
        }) = self.bufs.last_mut()
        {
            *has_block = true;
        }
    }

    fn rewrite(&self, text: &str) -> String {
        inline::rewrite(text, self.equations, &self.options.emoji_url)
    }

    fn event(&mut self, event: Event<'_>) {
        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) => self.text(&text),
            Event::Code(code) => {
                let markup = self.codespan(&code);
                self.push(&markup);
            }
            Event::Html(html) | Event::InlineHtml(html) => self.push(&html),
            Event::SoftBreak => self.push("\n"),
            Event::HardBreak => self.push("<br/>"),
            Event::Rule => self.push("<hr/>"),
            Event::TaskListMarker(_)
            | Event::FootnoteReference(_)
            | Event::InlineMath(_)
            | Event::DisplayMath(_) => {}
        }
    }

    fn start_tag(&mut self, tag: Tag<'_>) {
        match tag {
            Tag::Paragraph => self.bufs.push(Buf {
                kind: BufKind::Paragraph,
                content: String::new(),
            }),
            Tag::Heading { level, .. } => self.bufs.push(Buf {
                kind: BufKind::Heading(heading_level(level)),
                content: String::new(),
            }),
            Tag::BlockQuote(_) => self.blockquote_depth += 1,
            Tag::CodeBlock(kind) => {
                let lang = match kind {
                    CodeBlockKind::Fenced(info) if !info.is_empty() => info
                        .split_whitespace()
                        .next()
                        .map(std::borrow::ToOwned::to_owned),
                    _ => None,
                };
                self.code = Some(CodeBlock {
                    lang,
                    content: String::new(),
                });
            }
            Tag::List(start) => match start {
                Some(1) => self.push("<ol>"),
                Some(n) => {
                    let tag = format!(r#"<ol start="{n}">"#);
                    self.push(&tag);
                }
                None => self.push("<ul>"),
            },
            Tag::Item => self.bufs.push(Buf {
                kind: BufKind::Item { has_block: false },
                content: String::new(),
            }),
            Tag::Table(aligns) => {
                self.table_aligns = aligns;
                self.push("<table>");
            }
            Tag::TableHead => {
                self.in_table_head = true;
                self.push("<thead><tr>");
            }
            Tag::TableRow => {
                self.cell_index = 0;
                self.push("<tr>");
            }
            Tag::TableCell => {
                let align = match self.table_aligns.get(self.cell_index) {
                    Some(Alignment::Left) => "left",
                    Some(Alignment::Center) => "center",
                    Some(Alignment::Right) => "right",
                    _ => "",
                };
                self.bufs.push(Buf {
                    kind: BufKind::Cell {
                        header: self.in_table_head,
                        align,
                    },
                    content: String::new(),
                });
            }
            // Metadata blockquotes must see the author's original text, so
            // emphasis markers are restored instead of rendered there.
            Tag::Emphasis => self.push(if self.blockquote_depth > 0 { "*" } else { "<em>" }),
            Tag::Strong => self.push(if self.blockquote_depth > 0 { "**" } else { "<strong>" }),
            Tag::Strikethrough => self.push(if self.blockquote_depth > 0 { "~~" } else { "<s>" }),
            Tag::Link { dest_url, .. } => {
                self.links.push(dest_url.into_string());
                self.bufs.push(Buf {
                    kind: BufKind::Link,
                    content: String::new(),
                });
            }
            Tag::Image {
                dest_url, title, ..
            } => {
                self.pending_image = Some((dest_url.into_string(), title.into_string()));
                self.bufs.push(Buf {
                    kind: BufKind::ImageAlt,
                    content: String::new(),
                });
            }
            _ => {}
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                let Some(buf) = self.bufs.pop() else { return };
                // This buffer holds the pre-rewrite paragraph text, which
                // is what the metadata parse must see.
                let text = buf.content;
                if self.blockquote_depth > 0 {
                    self.parse_metadata(&text);
                    return;
                }
                let rewritten = self.rewrite(&text);
                self.mark_item_block();
                self.push(&format!("<p>{rewritten}</p>"));
            }
            TagEnd::Heading(_) => {
                let Some(buf) = self.bufs.pop() else { return };
                let BufKind::Heading(level) = buf.kind else {
                    return;
                };
                match level {
                    // Captured titles end up in the artifact as plain text,
                    // so markdown escaping is undone here.
                    1 => self.course_title = Some(entities::decode(buf.content.trim())),
                    2 => self.section_title = Some(entities::decode(buf.content.trim())),
                    // One global level shift: ### renders as <h2>.
                    n => {
                        let shifted = n - 1;
                        self.push(&format!("<h{shifted}>{}</h{shifted}>", buf.content.trim()));
                    }
                }
            }
            TagEnd::BlockQuote(_) => self.blockquote_depth -= 1,
            TagEnd::CodeBlock => {
                let Some(code) = self.code.take() else { return };
                let markup = self.code_block(code.lang.as_deref(), &code.content);
                self.mark_item_block();
                self.push(&markup);
            }
            TagEnd::List(ordered) => {
                self.push(if ordered { "</ol>" } else { "</ul>" });
                self.mark_item_block();
            }
            TagEnd::Item => {
                let Some(buf) = self.bufs.pop() else { return };
                let BufKind::Item { has_block } = buf.kind else {
                    return;
                };
                let content = if has_block {
                    buf.content
                } else {
                    self.rewrite(&buf.content)
                };
                self.push(&format!("<li>{content}</li>"));
            }
            TagEnd::Table => self.push("</tbody></table>"),
            TagEnd::TableHead => {
                self.push("</tr></thead><tbody>");
                self.in_table_head = false;
            }
            TagEnd::TableRow => self.push("</tr>"),
            TagEnd::TableCell => {
                let Some(buf) = self.bufs.pop() else { return };
                let BufKind::Cell { header, align } = buf.kind else {
                    return;
                };
                let rewritten = self.rewrite(&buf.content);
                let tag = if header { "th" } else { "td" };
                let align_attr = if align.is_empty() {
                    String::new()
                } else {
                    format!(r#" align="{align}""#)
                };
                self.push(&format!("<{tag}{align_attr}>{rewritten}</{tag}>"));
                self.cell_index += 1;
            }
            TagEnd::Emphasis => {
                self.push(if self.blockquote_depth > 0 { "*" } else { "</em>" });
            }
            TagEnd::Strong => {
                self.push(if self.blockquote_depth > 0 { "**" } else { "</strong>" });
            }
            TagEnd::Strikethrough => {
                self.push(if self.blockquote_depth > 0 { "~~" } else { "</s>" });
            }
            TagEnd::Link => {
                let Some(buf) = self.bufs.pop() else { return };
                let href = self.links.pop().unwrap_or_default();
                let markup = self.link(&href, &buf.content);
                self.push(&markup);
            }
            TagEnd::Image => {
                let Some(buf) = self.bufs.pop() else { return };
                if let Some((src, title)) = self.pending_image.take() {
                    let title_attr = if title.is_empty() {
                        String::new()
                    } else {
                        format!(r#" title="{}""#, escape_attr(&title))
                    };
                    self.push(&format!(
                        r#"<img src="{}" alt="{}"{title_attr}/>"#,
                        escape_attr(&src),
                        escape_attr(&buf.content)
                    ));
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, text: &str) {
        if let Some(code) = &mut self.code {
            code.content.push_str(text);
        } else if matches!(
            self.bufs.last(),
            Some(Buf {
                kind: BufKind::ImageAlt,
                ..
            })
        ) {
            // Alt text is collected raw and escaped on emit.
            self.push(text);
        } else {
            let escaped = escape_text(text);
            self.push(&escaped);
        }
    }

    /// Merge one blockquote paragraph of YAML into the step metadata.
    ///
    /// The buffered paragraph is the pre-rewrite text, so metadata values
    /// never contain blank or equation markup.
    fn parse_metadata(&mut self, text: &str) {
        let decoded = entities::decode(text);
        match StepMetadata::from_yaml(&decoded) {
            Ok(parsed) => self.metadata.merge(parsed),
            Err(e) => self
                .warnings
                .push(format!("invalid step metadata: {e} in {decoded:?}")),
        }
    }

    /// Render an inline code span.
    fn codespan(&mut self, code: &str) -> String {
        // `{py} x = 10` tags the code span with a language.
        if let Some(caps) = LANG_TAG_RE.captures(code) {
            let lang = caps[1].to_owned();
            let rest = code[caps[0].len()..].trim();
            if lang == "latex" {
                return self.equations.placeholder(&entities::decode(rest), true);
            }
            return format!(
                r#"<code class="language-{}">{}</code>"#,
                lang_alias(&lang),
                escape_text(rest)
            );
        }

        // Untagged code spans are math expressions. A leading § selects
        // the element form used by the newer frontend renderer.
        let (source, element_form) = match code.strip_prefix('§') {
            Some(rest) => (rest, true),
            None => (code, false),
        };

        match expr::render(source) {
            Ok((markup, voice)) => {
                let dir = if is_rtl(&self.options.locale) {
                    r#" dir="ltr""#
                } else {
                    ""
                };
                let voice = escape_attr(&voice);
                if element_form {
                    format!(r#"<x-math data-voice="{voice}"{dir}>{markup}</x-math>"#)
                } else {
                    format!(r#"<span class="math" data-voice="{voice}"{dir}>{markup}</span>"#)
                }
            }
            Err(e) => {
                self.warnings
                    .push(format!("math parsing error in {source:?}: {e}"));
                r#"<span class="math"></span>"#.to_owned()
            }
        }
    }

    /// Render a fenced code block.
    fn code_block(&mut self, lang: Option<&str>, content: &str) -> String {
        match lang {
            Some("latex") => {
                let tex = format!("\\begin{{align*}}{}\\end{{align*}}", content.trim_end());
                let placeholder = self.equations.placeholder(&tex, false);
                format!(r#"<p class="text-center">{placeholder}</p>"#)
            }
            Some(lang) => format!(
                r#"<pre class="language-{}"><code>{}</code></pre>"#,
                lang_alias(lang),
                escape_text(content)
            ),
            // Unnamed blocks are element templates. Template errors must
            // not escape the render pass.
            None => match template::render_block(content) {
                Ok(html) => html,
                Err(e) => {
                    self.warnings.push(format!("template error: {e}"));
                    String::new()
                }
            },
        }
    }

    /// Render a link, dispatching on the href prefix.
    fn link(&mut self, href: &str, text: &str) -> String {
        if href == "btn:next" {
            return format!(r#"<button class="next-step">{text}</button>"#);
        }
        if let Some(id) = href.strip_prefix("gloss:") {
            self.gloss.insert(id.to_owned());
            return format!(r#"<x-gloss xid="{}">{text}</x-gloss>"#, escape_attr(id));
        }
        if let Some(id) = href.strip_prefix("bio:") {
            self.bios.insert(id.to_owned());
            return format!(r#"<x-bio xid="{}">{text}</x-bio>"#, escape_attr(id));
        }
        if let Some(id) = href.strip_prefix("target:") {
            return format!(
                r#"<span class="step-target pill" tabindex="0" data-to="{}">{text}</span>"#,
                escape_attr(id)
            );
        }
        if let Some(id) = href.strip_prefix("action:") {
            return format!(
                r#"<button class="var-action" @click="{}">{text}</button>"#,
                escape_attr(id)
            );
        }
        if let Some(color) = href.strip_prefix("pill:") {
            return format!(
                r#"<strong class="pill {}">{text}</strong>"#,
                escape_attr(color)
            );
        }

        let decoded = entities::decode(href);
        if let Some(target) = decoded.strip_prefix("->") {
            return format!(
                r#"<x-target class="step-target pill" to="{}">{text}</x-target>"#,
                escape_attr(&target.replace('_', " "))
            );
        }

        let external = !href.starts_with('#') && !href.contains(&self.options.domain);
        let mut out = format!(r#"<a href="{}""#, escape_attr(href));
        if external {
            out.push_str(r#" target="_blank""#);
        }
        write!(out, ">{text}</a>").expect("string write");
        out
    }
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}
