//! Result extraction from fetched pages
//!
//! Extractors turn a page body into candidate result links. They are
//! synchronous and never touch the network; the paginator owns everything
//! else.

use crate::config::QueryEntry;
use crate::url::resolve_link;
use crate::ConfigError;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// A result link found on a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub url: String,
    pub title: String,
}

impl Candidate {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }
}

/// Parses result links out of a page body
pub trait ContentExtractor: Send + Sync {
    /// Returns the page's candidates in document order
    ///
    /// # Arguments
    ///
    /// * `body` - The page content
    /// * `page_url` - The URL the page was fetched from, for resolving relative links
    fn extract(&self, body: &str, page_url: &Url) -> Result<Vec<Candidate>, String>;
}

/// Hrefs that point back into the search engine itself
const ENGINE_INTERNAL: &[&str] = &["google.com", "/search?", "/url?", "support.google"];

/// Extracts organic results from a search engine result page
///
/// A result is an `<a>` containing an `<h3>`; the heading is its title.
pub struct SearchResultExtractor {
    anchor: Selector,
    heading: Selector,
}

impl SearchResultExtractor {
    pub fn new() -> Result<Self, ConfigError> {
        Ok(Self {
            anchor: parse_selector("a[href]")?,
            heading: parse_selector("h3")?,
        })
    }
}

impl ContentExtractor for SearchResultExtractor {
    fn extract(&self, body: &str, page_url: &Url) -> Result<Vec<Candidate>, String> {
        let document = Html::parse_document(body);
        let mut candidates = Vec::new();

        for anchor in document.select(&self.anchor) {
            let heading = match anchor.select(&self.heading).next() {
                Some(heading) => heading,
                None => continue,
            };

            let href = match anchor.value().attr("href") {
                Some(href) => href,
                None => continue,
            };
            if ENGINE_INTERNAL.iter().any(|pattern| href.contains(pattern)) {
                continue;
            }

            if let Some(url) = resolve_link(href, page_url) {
                candidates.push(Candidate::new(url, element_text(&heading)));
            }
        }

        Ok(candidates)
    }
}

/// Extracts results with site-specific CSS selectors
///
/// `result` selects each result; when it is not itself a link, its first
/// descendant link is used. `title` is evaluated relative to each result and
/// falls back to the result's own text.
pub struct SelectorExtractor {
    result: Selector,
    title: Option<Selector>,
    link: Selector,
}

impl SelectorExtractor {
    pub fn new(result: &str, title: Option<&str>) -> Result<Self, ConfigError> {
        Ok(Self {
            result: parse_selector(result)?,
            title: title.map(parse_selector).transpose()?,
            link: parse_selector("a[href]")?,
        })
    }

    fn href<'a>(&self, element: &ElementRef<'a>) -> Option<&'a str> {
        if let Some(href) = element.value().attr("href") {
            return Some(href);
        }
        element
            .select(&self.link)
            .next()
            .and_then(|link| link.value().attr("href"))
    }
}

impl ContentExtractor for SelectorExtractor {
    fn extract(&self, body: &str, page_url: &Url) -> Result<Vec<Candidate>, String> {
        let document = Html::parse_document(body);
        let mut candidates = Vec::new();

        for element in document.select(&self.result) {
            let url = match self.href(&element).and_then(|h| resolve_link(h, page_url)) {
                Some(url) => url,
                None => continue,
            };

            let title = match &self.title {
                Some(selector) => element
                    .select(selector)
                    .next()
                    .map(|t| element_text(&t))
                    .unwrap_or_default(),
                None => element_text(&element),
            };

            candidates.push(Candidate::new(url, title));
        }

        Ok(candidates)
    }
}

/// Builds the extractor a query asks for
pub fn extractor_for(query: &QueryEntry) -> Result<Box<dyn ContentExtractor>, ConfigError> {
    match &query.result_selector {
        Some(result) => Ok(Box::new(SelectorExtractor::new(
            result,
            query.title_selector.as_deref(),
        )?)),
        None => Ok(Box::new(SearchResultExtractor::new()?)),
    }
}

pub(crate) fn parse_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector)
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}

/// Element text with whitespace runs collapsed
fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERP: &str = r#"
        <html><body>
          <div id="search">
            <div class="g">
              <a href="https://jobs.lever.co/acme/123"><h3>Automation Engineer - Acme</h3></a>
            </div>
            <div class="g">
              <a href="https://acme.wd3.myworkdayjobs.com/en-US/careers/job/456">
                <br><h3>  QA   Analyst </h3>
              </a>
            </div>
            <div class="g">
              <a href="/url?q=https://tracked.example.com"><h3>Tracked</h3></a>
              <a href="https://support.google.com/websearch"><h3>Help</h3></a>
              <a href="https://maps.google.com/place"><h3>Map</h3></a>
            </div>
            <a href="https://jobs.lever.co/acme/789">No heading</a>
          </div>
          <a id="pnnext" href="/search?q=jobs&amp;start=10"><span>Next</span></a>
        </body></html>
    "#;

    fn page_url() -> Url {
        Url::parse("https://www.google.com/search?q=jobs").unwrap()
    }

    #[test]
    fn test_search_results_in_document_order() {
        let extractor = SearchResultExtractor::new().unwrap();
        let candidates = extractor.extract(SERP, &page_url()).unwrap();

        assert_eq!(
            candidates,
            vec![
                Candidate::new("https://jobs.lever.co/acme/123", "Automation Engineer - Acme"),
                Candidate::new(
                    "https://acme.wd3.myworkdayjobs.com/en-US/careers/job/456",
                    "QA Analyst"
                ),
            ]
        );
    }

    #[test]
    fn test_search_results_on_empty_page() {
        let extractor = SearchResultExtractor::new().unwrap();
        let candidates = extractor
            .extract("<html><body><p>No results</p></body></html>", &page_url())
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_selector_extractor_with_title() {
        let html = r#"
            <ul>
              <li class="job"><a href="/jobs/1"><span class="t">Rust Dev</span> Toronto</a></li>
              <li class="job"><a href="/jobs/2"><span class="t">Go Dev</span></a></li>
              <li class="job"><a href="javascript:void(0)">Broken</a></li>
            </ul>
        "#;
        let extractor = SelectorExtractor::new("li.job a", Some("span.t")).unwrap();
        let base = Url::parse("https://boards.example.com/acme").unwrap();

        let candidates = extractor.extract(html, &base).unwrap();
        assert_eq!(
            candidates,
            vec![
                Candidate::new("https://boards.example.com/jobs/1", "Rust Dev"),
                Candidate::new("https://boards.example.com/jobs/2", "Go Dev"),
            ]
        );
    }

    #[test]
    fn test_selector_extractor_uses_descendant_link() {
        let html = r#"<div class="card"><h2>Data Engineer</h2><a href="https://x.example.com/d">Apply</a></div>"#;
        let extractor = SelectorExtractor::new("div.card", Some("h2")).unwrap();
        let base = Url::parse("https://x.example.com/").unwrap();

        let candidates = extractor.extract(html, &base).unwrap();
        assert_eq!(
            candidates,
            vec![Candidate::new("https://x.example.com/d", "Data Engineer")]
        );
    }

    #[test]
    fn test_selector_extractor_falls_back_to_element_text() {
        let html = r#"<a class="r" href="/a">  Senior
            Engineer </a>"#;
        let extractor = SelectorExtractor::new("a.r", None).unwrap();
        let base = Url::parse("https://x.example.com/").unwrap();

        let candidates = extractor.extract(html, &base).unwrap();
        assert_eq!(candidates[0].title, "Senior Engineer");
    }

    #[test]
    fn test_invalid_selector() {
        assert!(matches!(
            SelectorExtractor::new("a[[", None),
            Err(ConfigError::InvalidSelector(_))
        ));
    }

    #[test]
    fn test_extractor_for_query() {
        let mut query = QueryEntry {
            id: "q".to_string(),
            url: "https://www.google.com/search?q=x".to_string(),
            result_selector: None,
            title_selector: None,
            next_selectors: Vec::new(),
        };
        let extractor = extractor_for(&query).unwrap();
        assert_eq!(extractor.extract(SERP, &page_url()).unwrap().len(), 2);

        query.result_selector = Some("a#pnnext".to_string());
        let extractor = extractor_for(&query).unwrap();
        let candidates = extractor.extract(SERP, &page_url()).unwrap();
        assert_eq!(
            candidates,
            vec![Candidate::new(
                "https://www.google.com/search?q=jobs&start=10",
                "Next"
            )]
        );
    }
}
