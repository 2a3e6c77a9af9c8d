//! "Next page" location
//!
//! A locator is an ordered chain of named strategies. Each strategy either
//! finds a next-page URL or does not; the first one that finds an unvisited
//! URL wins.

use crate::crawler::extractor::parse_selector;
use crate::url::resolve_link;
use crate::ConfigError;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Built-in chain for search engine result pages, most specific first
const DEFAULT_CHAIN: &[(&str, &str)] = &[
    ("next-id", "a#pnnext"),
    ("next-aria-label", "a[aria-label='Next page']"),
    ("pager-arrow", "span.SJajHc.NVbCr a"),
    ("start-offset", "a[href*='start=']"),
];

struct Strategy {
    name: String,
    selector: Selector,
}

/// Where the next page is and which strategy found it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextPage {
    pub url: String,
    pub strategy: String,
}

pub struct NextPageLocator {
    strategies: Vec<Strategy>,
}

impl NextPageLocator {
    /// The built-in chain
    pub fn search_defaults() -> Result<Self, ConfigError> {
        let strategies = DEFAULT_CHAIN
            .iter()
            .map(|(name, selector)| {
                Ok(Strategy {
                    name: name.to_string(),
                    selector: parse_selector(selector)?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self { strategies })
    }

    /// A chain of caller-supplied selectors, each named after itself
    pub fn from_selectors(selectors: &[String]) -> Result<Self, ConfigError> {
        let strategies = selectors
            .iter()
            .map(|selector| {
                Ok(Strategy {
                    name: selector.clone(),
                    selector: parse_selector(selector)?,
                })
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Ok(Self { strategies })
    }

    /// Uses `selectors` when given, the built-in chain otherwise
    pub fn for_selectors(selectors: &[String]) -> Result<Self, ConfigError> {
        if selectors.is_empty() {
            Self::search_defaults()
        } else {
            Self::from_selectors(selectors)
        }
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name.as_str()).collect()
    }

    /// Finds the next page of `body`
    ///
    /// Links that resolve to a URL in `visited` are treated as absent, so a
    /// pager pointing back at an earlier page ends pagination instead of
    /// looping.
    pub fn locate(&self, body: &str, page_url: &Url, visited: &HashSet<String>) -> Option<NextPage> {
        let document = Html::parse_document(body);

        for strategy in &self.strategies {
            let found = document
                .select(&strategy.selector)
                .filter_map(|element| element.value().attr("href"))
                .filter_map(|href| resolve_link(href, page_url))
                .find(|url| !visited.contains(url) && url != page_url.as_str());

            if let Some(url) = found {
                tracing::debug!("Next page {} located by '{}'", url, strategy.name);
                return Some(NextPage {
                    url,
                    strategy: strategy.name.clone(),
                });
            }
        }

        None
    }
}
