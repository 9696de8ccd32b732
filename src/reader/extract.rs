use anyhow::Result;
use url::Url;

use super::Article;

/// Pulls the readable article out of a full page.
///
/// [`Article::content`] may be raw page markup; the reader sanitizes it.
/// `Ok(None)` means the page has no article.
pub trait ArticleExtractor: Send + Sync {
    fn extract(&self, html: &str, url: &Url) -> Result<Option<Article>>;
}

/// Structural fallback extractor: the page's `<article>`, else `<main>`, else
/// `<body>`, with scripts and styles removed.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentExtractor;

impl ArticleExtractor for DocumentExtractor {
    fn extract(&self, html: &str, url: &Url) -> Result<Option<Article>> {
        let Some(content) = ["article", "main", "body"]
            .iter()
            .find_map(|tag| inner_html(html, tag))
        else {
            return Ok(None);
        };

        let title = inner_html(html, "title")
            .map(super::html_to_text)
            .filter(|t| !t.is_empty());

        Ok(Some(Article {
            title: title.unwrap_or_default(),
            content: strip_elements(content, &["script", "style", "noscript", "iframe"]),
            byline: meta_content(html, "author"),
            site_name: meta_content(html, "og:site_name").or_else(|| url.host_str().map(str::to_string)),
            excerpt: meta_content(html, "description"),
        }))
    }
}

/// Markup between the first `<tag ...>` and its matching-by-name close tag.
fn inner_html<'a>(html: &'a str, tag: &str) -> Option<&'a str> {
    let lower = html.to_ascii_lowercase();
    let open = find_open_tag(&lower, tag, 0)?;
    let start = open + lower[open..].find('>')? + 1;
    let end = lower[start..].rfind(&format!("</{tag}>"))? + start;
    Some(&html[start..end])
}

/// Byte offset of `<tag` followed by `>` or whitespace, at or after `from`.
fn find_open_tag(lower: &str, tag: &str, from: usize) -> Option<usize> {
    let needle = format!("<{tag}");
    let mut cursor = from;
    while let Some(pos) = lower[cursor..].find(&needle) {
        let abs = cursor + pos;
        let after = lower[abs + needle.len()..].chars().next();
        if matches!(after, Some(c) if c == '>' || c.is_whitespace()) {
            return Some(abs);
        }
        cursor = abs + needle.len();
    }
    None
}

fn strip_elements(html: &str, tags: &[&str]) -> String {
    let mut result = html.to_string();
    for tag in tags {
        loop {
            let lower = result.to_ascii_lowercase();
            let Some(open) = find_open_tag(&lower, tag, 0) else {
                break;
            };
            let close_tag = format!("</{tag}>");
            let end = match lower[open..].find(&close_tag) {
                Some(pos) => open + pos + close_tag.len(),
                None => result.len(),
            };
            result.replace_range(open..end, "");
        }
    }
    result
}

/// `content` of `<meta name="..">` or `<meta property="..">`.
fn meta_content(html: &str, name: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let mut cursor = 0;
    while let Some(pos) = find_open_tag(&lower, "meta", cursor) {
        let end = pos + lower[pos..].find('>')?;
        let tag = &html[pos..end];
        let named = ["name", "property"]
            .iter()
            .any(|attr| attribute(tag, attr).is_some_and(|v| v.eq_ignore_ascii_case(name)));
        if named {
            let value = super::html_to_text(attribute(tag, "content")?);
            return (!value.is_empty()).then_some(value);
        }
        cursor = end;
    }
    None
}

/// Value of `attr` inside an open tag: double-quoted, single-quoted or bare.
fn attribute<'a>(tag: &'a str, attr: &str) -> Option<&'a str> {
    let lower = tag.to_ascii_lowercase();
    let needle = format!("{attr}=");
    let mut cursor = 0;
    while let Some(pos) = lower[cursor..].find(&needle) {
        let at = cursor + pos;
        cursor = at + needle.len();
        // Skip matches inside longer names such as `data-name=`
        if !lower[..at].ends_with(|c: char| c.is_whitespace()) {
            continue;
        }
        let rest = &tag[cursor..];
        return match rest.chars().next() {
            Some(quote @ ('"' | '\'')) => {
                let inner = &rest[1..];
                inner.find(quote).map(|len| &inner[..len])
            }
            _ => {
                let len = rest.find(char::is_whitespace).unwrap_or(rest.len());
                Some(rest[..len].trim_end_matches('/'))
            }
        };
    }
    None
}
