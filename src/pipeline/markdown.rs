//! HTML fragment → markdown, for the original-content document.
//!
//! Layout responses carry one small HTML fragment per element (`<h1>`, `<p>`,
//! `<table>`, `<figure>`…). Each fragment is converted on its own; the
//! converter handles the handful of tags those fragments use and falls back
//! to plain text for anything else.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Node, Selector};

static SEL_ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static SEL_CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("th, td").unwrap());

/// Convert one HTML fragment to markdown. The result has no trailing newline.
pub fn html_to_markdown(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::new();
    render_blocks(fragment.root_element(), &mut out);
    out.trim().to_string()
}

/// Plain text content of an HTML fragment, whitespace collapsed.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text: String = fragment.root_element().text().collect();
    collapse_whitespace(&text).trim().to_string()
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

// ── Blocks ───────────────────────────────────────────────────────────────────

fn render_blocks(parent: ElementRef<'_>, out: &mut String) {
    for child in parent.children() {
        match child.value() {
            Node::Text(t) => push_paragraph(out, &collapse_whitespace(t)),
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    render_block(el, out);
                }
            }
            _ => {}
        }
    }
}

fn render_block(el: ElementRef<'_>, out: &mut String) {
    match el.value().name() {
        name @ ("h1" | "h2" | "h3" | "h4" | "h5" | "h6") => {
            let level = name[1..].parse::<usize>().unwrap_or(1);
            let text = render_inline(el);
            if !text.trim().is_empty() {
                push_paragraph(out, &format!("{} {}", "#".repeat(level), text.trim()));
            }
        }
        "ul" => render_list(el, false, out),
        "ol" => render_list(el, true, out),
        "table" => push_paragraph(out, &render_table(el)),
        "br" => out.push('\n'),
        "img" => {
            let mut image = String::new();
            inline_element(el, &mut image);
            push_paragraph(out, &image);
        }
        "html" | "body" | "div" | "section" | "figure" | "article" | "header" | "footer" => {
            render_blocks(el, out)
        }
        _ => push_paragraph(out, &render_inline(el)),
    }
}

fn push_paragraph(out: &mut String, text: &str) {
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    if !out.is_empty() {
        out.push_str("\n\n");
    }
    out.push_str(text);
}

fn render_list(list: ElementRef<'_>, ordered: bool, out: &mut String) {
    let mut lines = Vec::new();
    for item in list.children().filter_map(ElementRef::wrap) {
        if item.value().name() != "li" {
            continue;
        }
        let text = render_inline(item);
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let marker = if ordered {
            format!("{}.", lines.len() + 1)
        } else {
            "-".to_string()
        };
        lines.push(format!("{} {}", marker, text));
    }
    push_paragraph(out, &lines.join("\n"));
}

fn render_table(table: ElementRef<'_>) -> String {
    let rows: Vec<Vec<String>> = table
        .select(&SEL_ROW)
        .map(|row| {
            row.select(&SEL_CELL)
                .map(|cell| {
                    render_inline(cell)
                        .replace('\n', " ")
                        .replace('|', "\\|")
                        .trim()
                        .to_string()
                })
                .collect()
        })
        .filter(|cells: &Vec<String>| !cells.is_empty())
        .collect();

    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    if columns == 0 {
        return String::new();
    }

    let format_row = |cells: &[String]| {
        let mut line = String::from("|");
        for i in 0..columns {
            line.push(' ');
            line.push_str(cells.get(i).map(String::as_str).unwrap_or(""));
            line.push_str(" |");
        }
        line
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(format_row(&rows[0]));
    lines.push(format!("|{}", " --- |".repeat(columns)));
    for row in &rows[1..] {
        lines.push(format_row(row));
    }
    lines.join("\n")
}

// ── Inline ───────────────────────────────────────────────────────────────────

fn render_inline(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for child in el.children() {
        match child.value() {
            Node::Text(t) => out.push_str(&collapse_whitespace(t)),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    inline_element(child, &mut out);
                }
            }
            _ => {}
        }
    }
    out
}

fn inline_element(el: ElementRef<'_>, out: &mut String) {
    match el.value().name() {
        "br" => out.push('\n'),
        "strong" | "b" => wrap_inline(out, &render_inline(el), "**"),
        "em" | "i" => wrap_inline(out, &render_inline(el), "*"),
        "code" => wrap_inline(out, &render_inline(el), "`"),
        "img" => {
            let alt = el.value().attr("alt").unwrap_or("");
            if let Some(src) = el.value().attr("src").filter(|s| !s.is_empty()) {
                out.push_str(&format!("![{}]({})", alt, src));
            } else {
                out.push_str(alt);
            }
        }
        "a" => {
            let text = render_inline(el);
            match el.value().attr("href") {
                Some(href) if !href.is_empty() => {
                    out.push_str(&format!("[{}]({})", text.trim(), href))
                }
                _ => out.push_str(&text),
            }
        }
        _ => out.push_str(&render_inline(el)),
    }
}

fn wrap_inline(out: &mut String, text: &str, marker: &str) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        out.push_str(text);
        return;
    }
    out.push_str(marker);
    out.push_str(trimmed);
    out.push_str(marker);
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(c);
            last_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_keep_level() {
        assert_eq!(html_to_markdown("<h1 id='0'>Introduction</h1>"), "# Introduction");
        assert_eq!(html_to_markdown("<h3>3.1 Setup</h3>"), "### 3.1 Setup");
    }

    #[test]
    fn paragraph_with_emphasis() {
        assert_eq!(
            html_to_markdown("<p id='1'>We use <b>multi-head</b>  attention\n with <i>h</i> heads.</p>"),
            "We use **multi-head** attention with *h* heads."
        );
    }

    #[test]
    fn lists() {
        assert_eq!(
            html_to_markdown("<ul><li>alpha</li><li>beta</li></ul>"),
            "- alpha\n- beta"
        );
        assert_eq!(
            html_to_markdown("<ol><li>first</li><li>second</li></ol>"),
            "1. first\n2. second"
        );
    }

    #[test]
    fn table_becomes_gfm() {
        let html = "<table><tr><th>Model</th><th>BLEU</th></tr>\
                    <tr><td>Base</td><td>27.3</td></tr>\
                    <tr><td>Big</td><td>28.4</td></tr></table>";
        assert_eq!(
            html_to_markdown(html),
            "| Model | BLEU |\n| --- | --- |\n| Base | 27.3 |\n| Big | 28.4 |"
        );
    }

    #[test]
    fn ragged_table_rows_are_padded() {
        let html = "<table><tr><td>a</td><td>b</td></tr><tr><td>c</td></tr></table>";
        assert_eq!(html_to_markdown(html), "| a | b |\n| --- | --- |\n| c |  |");
    }

    #[test]
    fn figure_with_image_and_caption() {
        let html = "<figure><img src='assets/image_p0001_e0004.png' alt='Figure 1'>\
                    <figcaption>Architecture</figcaption></figure>";
        assert_eq!(
            html_to_markdown(html),
            "![Figure 1](assets/image_p0001_e0004.png)\n\nArchitecture"
        );
    }

    #[test]
    fn figure_without_src_yields_alt_text_only() {
        assert_eq!(html_to_markdown("<figure><img alt='Plot'></figure>"), "Plot");
        assert_eq!(html_to_markdown("<figure><img></figure>"), "");
    }

    #[test]
    fn bare_text_and_unknown_tags() {
        assert_eq!(html_to_markdown("plain text"), "plain text");
        assert_eq!(html_to_markdown("<span>inline only</span>"), "inline only");
    }

    #[test]
    fn text_extraction_and_escaping() {
        assert_eq!(html_to_text("<h1>2  Related\nWork</h1>"), "2 Related Work");
        assert_eq!(escape_html("a<b & 'c'"), "a&lt;b &amp; &#39;c&#39;");
    }
}
