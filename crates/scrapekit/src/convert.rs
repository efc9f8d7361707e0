//! HTML conversion utilities

use scraper::{Html, Node};
use std::iter::Peekable;
use std::str::Chars;

/// Elements whose content never reaches the output
const SKIP_TAGS: &[&str] = &["script", "style", "noscript", "iframe", "svg", "head", "template"];

/// Convert HTML to markdown
///
/// A single-pass tag scanner: headings, paragraphs, lists, emphasis, code,
/// blockquotes and links are mapped to their markdown forms, everything else
/// is reduced to its text.
pub fn html_to_markdown(html: &str) -> String {
    let mut output = String::new();
    let mut skip_stack: Vec<String> = Vec::new();
    let mut link_stack: Vec<Option<String>> = Vec::new();
    let mut list_depth: usize = 0;
    let mut in_pre = false;
    let mut in_blockquote = false;

    let mut chars = html.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '<' {
            if skip_stack.is_empty() {
                let decoded = decode_entity(c, &mut chars);
                if in_blockquote && decoded == '\n' {
                    output.push_str("\n> ");
                } else {
                    output.push(decoded);
                }
            }
            continue;
        }

        let mut tag = String::new();
        for next in chars.by_ref() {
            if next == '>' {
                break;
            }
            tag.push(next);
        }

        // ASCII folding keeps byte offsets aligned with `tag`
    let tag_lower = tag.to_ascii_lowercase();
        let is_closing = tag_lower.starts_with('/');
        let tag_name = tag_lower
            .trim_start_matches('/')
            .split(|ch: char| ch.is_whitespace() || ch == '/')
            .next()
            .unwrap_or("");

        if SKIP_TAGS.contains(&tag_name) {
            if is_closing {
                if let Some(pos) = skip_stack.iter().rposition(|t| t == tag_name) {
                    skip_stack.truncate(pos);
                }
            } else if !tag.ends_with('/') {
                skip_stack.push(tag_name.to_string());
            }
            continue;
        }

        if !skip_stack.is_empty() {
            continue;
        }

        match tag_name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                if is_closing {
                    output.push_str("\n\n");
                } else {
                    let level = tag_name[1..].parse::<usize>().unwrap_or(1);
                    output.push('\n');
                    output.push_str(&"#".repeat(level));
                    output.push(' ');
                }
            }
            "p" | "div" | "section" | "article" | "main" | "header" | "footer" | "tr" => {
                if is_closing {
                    output.push_str("\n\n");
                }
            }
            "br" => output.push('\n'),
            "hr" => output.push_str("\n---\n"),
            "ul" | "ol" => {
                if is_closing {
                    list_depth = list_depth.saturating_sub(1);
                    if list_depth == 0 {
                        output.push('\n');
                    }
                } else {
                    list_depth += 1;
                }
            }
            "li" => {
                if !is_closing {
                    output.push('\n');
                    output.push_str(&"  ".repeat(list_depth.saturating_sub(1)));
                    output.push_str("- ");
                }
            }
            "strong" | "b" => output.push_str("**"),
            "em" | "i" => output.push('*'),
            "pre" => {
                output.push_str("\n```\n");
                in_pre = !is_closing;
            }
            "code" => {
                if !in_pre {
                    output.push('`');
                }
            }
            "blockquote" => {
                if is_closing {
                    in_blockquote = false;
                    output.push('\n');
                } else {
                    in_blockquote = true;
                    output.push_str("\n> ");
                }
            }
            "a" => {
                if is_closing {
                    if let Some(Some(href)) = link_stack.pop() {
                        output.push_str(&format!("]({})", href));
                    }
                } else {
                    let href = extract_attribute(&tag, "href").filter(|h| !h.starts_with('#'));
                    if href.is_some() {
                        output.push('[');
                    }
                    link_stack.push(href);
                }
            }
            _ => {}
        }
    }

    clean_whitespace(&output)
}

/// Extract the text nodes of an HTML document
///
/// Parses the document with an HTML5 parser and joins every text node outside
/// script/style-like elements with single spaces.
pub fn html_to_plain_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut parts: Vec<&str> = Vec::new();

    for node in document.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIP_TAGS.contains(&el.name()))
        });
        if hidden {
            continue;
        }
        let text: &str = text;
        let text = text.trim();
        if !text.is_empty() {
            parts.push(text);
        }
    }

    clean_whitespace(&parts.join(" "))
}

/// Extract attribute value from tag
fn extract_attribute(tag: &str, attr: &str) -> Option<String> {
    let pattern = format!("{}=", attr);
    // ASCII folding keeps byte offsets aligned with `tag`
    let tag_lower = tag.to_ascii_lowercase();

    let start = tag_lower.find(&pattern)?;
    let rest = tag[start + pattern.len()..].trim_start();

    for quote in ['"', '\''] {
        if let Some(rest) = rest.strip_prefix(quote) {
            return rest.find(quote).map(|end| rest[..end].to_string());
        }
    }

    let end = rest
        .find(|c: char| c.is_whitespace() || c == '>')
        .unwrap_or(rest.len());
    Some(rest[..end].to_string())
}

/// Decode an HTML entity starting at `c`
///
/// Consumes the entity from `chars` only when it is recognised; otherwise the
/// ampersand is returned and the following text is left untouched.
fn decode_entity(c: char, chars: &mut Peekable<Chars>) -> char {
    if c != '&' {
        return c;
    }

    let mut lookahead = chars.clone();
    let mut entity = String::new();
    let mut terminated = false;
    for next in lookahead.by_ref() {
        if next == ';' {
            terminated = true;
            break;
        }
        if next.is_whitespace() || entity.len() > 10 {
            break;
        }
        entity.push(next);
    }
    if !terminated {
        return '&';
    }

    let decoded = match entity.as_str() {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        "mdash" => Some('—'),
        "ndash" => Some('–'),
        "hellip" => Some('…'),
        "copy" => Some('©'),
        "reg" => Some('®'),
        _ => entity.strip_prefix('#').and_then(|num| {
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => num.parse::<u32>().ok(),
            };
            code.and_then(char::from_u32)
        }),
    };

    match decoded {
        Some(ch) => {
            *chars = lookahead;
            ch
        }
        None => '&',
    }
}

/// Clean whitespace: collapse runs, trim, keep max 2 newlines
pub fn clean_whitespace(s: &str) -> String {
    let mut result = String::new();
    let mut last_was_space = false;
    let mut newline_count = 0;

    for c in s.chars() {
        if c == '\n' {
            if last_was_space && result.ends_with(' ') {
                result.pop();
            }
            newline_count += 1;
            last_was_space = true;
            if newline_count <= 2 {
                result.push(c);
            }
        } else if c.is_whitespace() {
            if !last_was_space {
                result.push(' ');
                last_was_space = true;
            }
        } else {
            newline_count = 0;
            last_was_space = false;
            result.push(c);
        }
    }

    result.trim().to_string()
}
