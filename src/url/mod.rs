//! URL handling module for Harrow
//!
//! This module builds search URLs from the `[search]` section, resolves
//! links found on result pages, and keys target sites for per-site pacing.

use crate::config::{QueryEntry, SearchConfig};
use crate::{UrlError, UrlResult};
use std::collections::HashSet;
use url::Url;

/// Builds a search URL with a `q` parameter and an optional `lr` language filter
///
/// # Arguments
///
/// * `base` - Search endpoint (e.g. "https://www.google.com/search")
/// * `query` - Raw query text; encoded here
/// * `language` - Value of the `lr` parameter, if any
///
/// # Examples
///
/// ```
/// use harrow::url::build_search_url;
///
/// let url = build_search_url("https://www.google.com/search", "site:jobs.lever.co rust", Some("lang_en")).unwrap();
/// assert_eq!(url, "https://www.google.com/search?q=site%3Ajobs.lever.co+rust&lr=lang_en");
/// ```
pub fn build_search_url(base: &str, query: &str, language: Option<&str>) -> UrlResult<String> {
    let mut url = Url::parse(base).map_err(|e| UrlError::Parse(format!("{}: {}", base, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("q", query);
        if let Some(language) = language.filter(|l| !l.is_empty()) {
            pairs.append_pair("lr", language);
        }
    }

    Ok(url.to_string())
}

/// Expands the `[search]` section into one query per site × location
///
/// Query text is `"{site} {location} {keywords} {date-filter}"` with empty
/// parts left out. Ids are derived from site and location and made unique.
pub fn expand_search_queries(search: &SearchConfig) -> Vec<QueryEntry> {
    let locations: Vec<Option<&str>> = if search.locations.is_empty() {
        vec![None]
    } else {
        search.locations.iter().map(|l| Some(l.as_str())).collect()
    };

    let mut used_ids = HashSet::new();
    let mut queries = Vec::new();

    for site in &search.sites {
        for location in &locations {
            let text = [
                Some(site.as_str()),
                *location,
                Some(search.keywords.as_str()),
                search.date_filter.as_deref(),
            ]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

            // An unusable base URL is kept as-is so validation reports it
            let url = build_search_url(&search.base_url, &text, search.language.as_deref())
                .unwrap_or_else(|_| search.base_url.clone());

            let base_id = match location {
                Some(location) => slugify(&format!("{} {}", site, location)),
                None => slugify(site),
            };
            let id = unique_id(base_id, &mut used_ids);

            queries.push(QueryEntry {
                id,
                url,
                result_selector: None,
                title_selector: None,
                next_selectors: Vec::new(),
            });
        }
    }

    queries
}

/// Lowercase alphanumeric slug with single dashes
fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "query".to_string()
    } else {
        slug.to_string()
    }
}

fn unique_id(base: String, used: &mut HashSet<String>) -> String {
    if used.insert(base.clone()) {
        return base;
    }

    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
pub fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    if href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(absolute_url) => {
            if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" {
                Some(absolute_url.to_string())
            } else {
                None
            }
        }
        Err(_) => None,
    }
}

/// Returns the key under which a URL's site shares pacing and identity
///
/// The lowercase host with any leading `www.` removed.
pub fn site_key(url: &str) -> UrlResult<String> {
    let parsed = Url::parse(url).map_err(|e| UrlError::Parse(format!("{}: {}", url, e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| UrlError::MissingHost(url.to_string()))?
        .to_lowercase();

    Ok(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}
