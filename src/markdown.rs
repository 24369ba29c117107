use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node};
use serde::{Deserialize, Serialize};

static ESCAPED_PUNCT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\+([*\-_])").expect("valid escape regex"));
static BLANK_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("valid blank line regex"));
static ORDERED_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)([.)])(\s|$)").expect("valid ordered marker regex"));
static BLOCK_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([#>+\-])(\s|$)").expect("valid block marker regex"));

const HARD_BREAK: &str = "\\\n";

/// Shape a source delivers event descriptions in. Every adapter picks one
/// and applies it to all of its events.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DescriptionFormat {
    Html,
    EscapedMarkdown,
}

impl DescriptionFormat {
    pub fn normalize(&self, raw: &str) -> String {
        match self {
            DescriptionFormat::Html => html_to_markdown(raw),
            DescriptionFormat::EscapedMarkdown => unescape_markdown(raw),
        }
    }
}

/// Drops every run of backslashes sitting directly before `*`, `-` or `_`.
/// Idempotent: the output never has a backslash before those characters.
pub fn unescape_markdown(raw: &str) -> String {
    ESCAPED_PUNCT_RE.replace_all(raw, "$1").into_owned()
}

pub fn html_to_markdown(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut writer = MarkdownWriter::default();
    writer.children(fragment.root_element());
    writer.finish()
}

#[derive(Clone, Copy)]
enum ListKind {
    Bullet,
    Ordered(usize),
}

#[derive(Default)]
struct MarkdownWriter {
    out: String,
    lists: Vec<ListKind>,
    /// Content column of every open list item, innermost last.
    item_columns: Vec<usize>,
    inline_depth: usize,
    /// Nothing has been written since the last list marker or hard break.
    fresh_line: bool,
    /// A `<br>` waiting for the next inline content.
    pending_break: bool,
}

impl MarkdownWriter {
    fn finish(self) -> String {
        let collapsed = BLANK_RUN_RE.replace_all(&self.out, "\n\n");
        collapsed.trim().to_string()
    }

    fn children(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.text(text),
                Node::Element(_) => {
                    if let Some(el) = ElementRef::wrap(child) {
                        self.element(el);
                    }
                }
                _ => {}
            }
        }
    }

    fn element(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();
        match name {
            "script" | "style" | "head" | "template" => {}
            "br" => self.line_break(),
            "hr" => {
                self.block_break();
                self.out.push_str("---");
                self.block_break();
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = name[1..].parse::<usize>().unwrap_or(1);
                let inner = self.capture(el);
                self.block_break();
                self.out.push_str(&"#".repeat(level));
                self.out.push(' ');
                self.out.push_str(inner.trim());
                self.block_break();
            }
            "ul" | "ol" => {
                if self.lists.is_empty() {
                    self.block_break();
                } else {
                    self.ensure_newline();
                }
                self.lists.push(if name == "ol" {
                    ListKind::Ordered(0)
                } else {
                    ListKind::Bullet
                });
                self.children(el);
                self.lists.pop();
                if self.lists.is_empty() {
                    self.block_break();
                } else {
                    self.ensure_newline();
                }
            }
            "li" => self.list_item(el),
            "strong" | "b" => self.wrap_inline(el, "**", "**"),
            "em" | "i" => self.wrap_inline(el, "_", "_"),
            "s" | "del" | "strike" => self.wrap_inline(el, "~~", "~~"),
            "code" => self.code(el),
            "a" => self.link(el),
            "img" => {
                if let Some(src) = el.value().attr("src").filter(|src| !src.is_empty()) {
                    let alt = el.value().attr("alt").unwrap_or_default();
                    self.push_inline("", &format!("![{}]({})", alt.trim(), src));
                }
            }
            "pre" => {
                let code: String = el.text().collect();
                self.block_break();
                self.out.push_str("```\n");
                self.out.push_str(code.trim_end_matches('\n'));
                self.out.push_str("\n```");
                self.block_break();
            }
            "blockquote" => {
                let inner = render_block(el);
                if inner.is_empty() {
                    return;
                }
                let quoted = inner
                    .lines()
                    .map(|line| {
                        if line.trim().is_empty() {
                            ">".to_string()
                        } else {
                            format!("> {line}")
                        }
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                self.block_break();
                self.out.push_str(&quoted);
                self.block_break();
            }
            "p" | "div" | "section" | "article" | "header" | "footer" | "main" | "figure" => {
                if self.lists.is_empty() && self.inline_depth == 0 {
                    self.block_break();
                    self.children(el);
                    self.block_break();
                } else {
                    // paragraphs inside a list item stay in the item
                    if self.inline_depth == 0 && !self.fresh_line {
                        self.line_break();
                    }
                    self.children(el);
                }
            }
            _ => self.children(el),
        }
    }

    fn list_item(&mut self, el: ElementRef<'_>) {
        self.ensure_newline();
        let column = self.item_columns.last().copied().unwrap_or(0);
        let marker = match self.lists.last_mut() {
            Some(ListKind::Ordered(n)) => {
                *n += 1;
                format!("{n}. ")
            }
            _ => "- ".to_string(),
        };
        self.out.push_str(&" ".repeat(column));
        self.out.push_str(&marker);
        self.item_columns.push(column + marker.len());
        self.fresh_line = true;
        self.children(el);
        self.item_columns.pop();
        self.fresh_line = false;
    }

    fn link(&mut self, el: ElementRef<'_>) {
        let raw = self.capture(el);
        let text = raw.trim();
        match el.value().attr("href").filter(|href| !href.is_empty()) {
            Some(href) if text.is_empty() => self.push_inline(&raw, &format!("<{href}>")),
            Some(href) => self.push_inline(&raw, &format!("[{text}]({href})")),
            None => self.push_inline(&raw, text),
        }
    }

    fn code(&mut self, el: ElementRef<'_>) {
        let raw = collapse_whitespace(&el.text().collect::<String>());
        let code = raw.trim();
        if code.is_empty() {
            return;
        }
        let rendered = if code.contains('`') {
            format!("`` {code} ``")
        } else {
            format!("`{code}`")
        };
        self.push_inline(&raw, &rendered);
    }

    fn wrap_inline(&mut self, el: ElementRef<'_>, open: &str, close: &str) {
        let raw = self.capture(el);
        let text = raw.trim();
        if text.is_empty() {
            return;
        }
        self.push_inline(&raw, &format!("{open}{text}{close}"));
    }

    /// Pushes `rendered`, keeping the surrounding whitespace `raw` had.
    fn push_inline(&mut self, raw: &str, rendered: &str) {
        if rendered.is_empty() {
            return;
        }
        self.flush_break();
        if raw.starts_with(char::is_whitespace) && !self.at_whitespace() {
            self.out.push(' ');
        }
        self.out.push_str(rendered);
        if raw.ends_with(char::is_whitespace) {
            self.out.push(' ');
        }
        self.fresh_line = false;
    }

    /// Renders the children of `el` into a fresh buffer.
    fn capture(&mut self, el: ElementRef<'_>) -> String {
        let saved = std::mem::take(&mut self.out);
        self.inline_depth += 1;
        self.children(el);
        self.inline_depth -= 1;
        std::mem::replace(&mut self.out, saved)
    }

    fn text(&mut self, text: &str) {
        let collapsed = collapse_whitespace(text);
        if collapsed.trim().is_empty() && (self.pending_break || self.at_line_start()) {
            return;
        }
        self.flush_break();

        let line_start = self.at_line_start() || self.fresh_line;
        let text = if self.at_line_start() || self.out.ends_with(' ') {
            collapsed.trim_start()
        } else {
            collapsed.as_str()
        };
        if text.is_empty() {
            return;
        }

        let escaped = escape_text(text);
        if line_start {
            self.out.push_str(&escape_line_start(&escaped));
        } else {
            self.out.push_str(&escaped);
        }
        self.fresh_line = false;
    }

    fn line_break(&mut self) {
        if !self.at_line_start() {
            self.pending_break = true;
        }
    }

    /// Writes a pending `<br>` as a hard break, indented to the open list item.
    fn flush_break(&mut self) {
        if !self.pending_break {
            return;
        }
        self.pending_break = false;
        self.trim_trailing_spaces();
        self.out.push_str(HARD_BREAK);
        let column = self.item_columns.last().copied().unwrap_or(0);
        self.out.push_str(&" ".repeat(column));
        self.fresh_line = true;
    }

    fn at_line_start(&self) -> bool {
        (self.out.is_empty() && self.inline_depth == 0) || self.out.ends_with('\n')
    }

    fn at_whitespace(&self) -> bool {
        self.out.is_empty() || self.out.ends_with(char::is_whitespace)
    }

    fn trim_trailing_spaces(&mut self) {
        let trimmed = self.out.trim_end_matches([' ', '\t']).len();
        self.out.truncate(trimmed);
    }

    fn ensure_newline(&mut self) {
        self.pending_break = false;
        self.trim_trailing_spaces();
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn block_break(&mut self) {
        self.pending_break = false;
        self.trim_trailing_spaces();
        if self.out.is_empty() {
            return;
        }
        while !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }
}

/// Renders `el` as a standalone document, for containers whose content is
/// prefixed line by line.
fn render_block(el: ElementRef<'_>) -> String {
    let mut writer = MarkdownWriter::default();
    writer.children(el);
    writer.finish()
}

/// Backslash-escapes characters that would otherwise start inline markup.
fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '\\' | '*' | '_' | '`' | '[' | ']') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Escapes text that would be read as a list item, heading or quote when it
/// opens a line.
fn escape_line_start(text: &str) -> String {
    let ordered = ORDERED_MARKER_RE.replace(text, r"${1}\${2}${3}");
    BLOCK_MARKER_RE
        .replace(&ordered, r"\${1}${2}")
        .into_owned()
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            pending_space = true;
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(ch);
        }
    }
    if pending_space {
        out.push(' ');
    }
    out
}
