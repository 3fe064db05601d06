//! Markdown and plain text to standalone HTML

use pulldown_cmark::{html, Options, Parser};

const STYLE: &str = "body { font-family: sans-serif; line-height: 1.5; margin: 2em; }
pre, code { font-family: monospace; }
pre { white-space: pre-wrap; word-wrap: break-word; }
table { border-collapse: collapse; }
th, td { border: 1px solid #999; padding: 0.25em 0.5em; }";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkupFlavor {
    Markdown,
    PlainText,
}

/// Render `text` to a complete HTML page ready for an HTML-to-PDF engine
pub fn render_page(text: &str, flavor: MarkupFlavor, title: &str) -> String {
    let body = match flavor {
        MarkupFlavor::Markdown => markdown_to_html(text),
        MarkupFlavor::PlainText => format!("<pre>{}</pre>", escape_html(text)),
    };
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>\n{STYLE}\n</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n",
        escape_html(title)
    )
}

fn markdown_to_html(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options.insert(Options::ENABLE_FOOTNOTES);

    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
