//! Turning a URL into speakable article text.

pub mod extract;
pub mod fetch;
pub mod text;
pub mod validate;

pub use extract::{ArticleExtractor, DocumentExtractor};
pub use fetch::PageFetcher;
pub use text::html_to_text;
pub use validate::validate_url;

use serde::{Deserialize, Serialize};

use crate::error::ReaderError;

pub const DEFAULT_TITLE: &str = "Extracted Content";

/// Pages with less visible text than this are treated as empty.
pub const DEFAULT_MIN_CONTENT_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub title: String,
    /// Article markup. [`Reader`] sanitizes it before handing it out.
    pub content: String,
    pub byline: Option<String>,
    pub site_name: Option<String>,
    pub excerpt: Option<String>,
}

/// An article together with the plain text that gets spoken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedArticle {
    pub url: String,
    pub article: Article,
    pub text: String,
}

pub struct Reader {
    fetcher: PageFetcher,
    extractor: Box<dyn ArticleExtractor>,
    min_content_chars: usize,
}

impl Reader {
    pub fn new(
        fetcher: PageFetcher,
        extractor: Box<dyn ArticleExtractor>,
        min_content_chars: usize,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            min_content_chars,
        }
    }

    /// Validate, fetch and extract the article at `raw_url`.
    pub async fn load(&self, raw_url: &str) -> Result<LoadedArticle, ReaderError> {
        let url = validate_url(raw_url)?;
        let html = self.fetcher.fetch(&url).await?;
        let loaded = self.extract(&html, &url)?;
        tracing::info!(
            "Loaded '{}' from {} ({} chars of text)",
            loaded.article.title,
            url,
            loaded.text.chars().count()
        );
        Ok(loaded)
    }

    /// Extraction half of [`Reader::load`], for markup already in hand.
    pub fn extract(&self, html: &str, url: &url::Url) -> Result<LoadedArticle, ReaderError> {
        let visible = html_to_text(html);
        if visible.chars().count() < self.min_content_chars {
            tracing::warn!("Only {} chars of text at {}", visible.chars().count(), url);
            return Err(ReaderError::NoReadableContent);
        }

        let mut article = self
            .extractor
            .extract(html, url)?
            .ok_or(ReaderError::NoReadableContent)?;
        article.content = sanitize(&article.content, url);
        if article.content.trim().is_empty() {
            return Err(ReaderError::NoReadableContent);
        }
        if article.title.trim().is_empty() {
            article.title = DEFAULT_TITLE.to_string();
        }

        let text = html_to_text(&article.content);
        Ok(LoadedArticle {
            url: url.to_string(),
            article,
            text,
        })
    }
}

/// Allow-list clean of extracted markup before it reaches the webview.
/// Relative links and images are resolved against the page URL.
fn sanitize(markup: &str, base: &url::Url) -> String {
    ammonia::Builder::default()
        .url_relative(ammonia::UrlRelative::RewriteWithBase(base.clone()))
        .clean(markup)
        .to_string()
}
