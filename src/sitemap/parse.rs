//! Sitemap XML parsing
//!
//! Turns a fetched document into either child-sitemap URIs (for a
//! `<sitemapindex>` root) or page entries (for a `<urlset>` root). Malformed
//! documents never abort a crawl: anything unparsable degrades to an empty
//! result with a warning.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use quick_xml::Reader;
use quick_xml::de::from_str;
use quick_xml::events::Event;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::sitemap::SitemapEntry;

/// Result of parsing one sitemap document
///
/// Exactly one of the two collections is populated: indexes yield child
/// sitemaps, urlsets yield entries.
#[derive(Debug, Default)]
pub struct ParsedSitemap {
    /// Page entries from a urlset document
    pub entries: Vec<SitemapEntry>,

    /// Child sitemap URIs from an index document
    pub child_sitemaps: Vec<Url>,
}

/// XML shape of a `<sitemapindex>` document
#[derive(Debug, Deserialize)]
struct SitemapIndexXml {
    #[serde(rename = "sitemap", default)]
    sitemaps: Vec<SitemapRefXml>,
}

#[derive(Debug, Deserialize)]
struct SitemapRefXml {
    loc: Option<String>,
}

/// XML shape of a `<urlset>` document
///
/// Every leaf is an `Option<String>` so one unparseable value never rejects
/// the whole document; conversion happens field by field afterwards.
#[derive(Debug, Deserialize)]
struct UrlsetXml {
    #[serde(rename = "url", default)]
    urls: Vec<UrlXml>,
}

#[derive(Debug, Deserialize)]
struct UrlXml {
    loc: Option<String>,
    lastmod: Option<String>,
    changefreq: Option<String>,
    priority: Option<String>,
}

/// Parse one sitemap document into entries or child sitemaps
pub fn parse_sitemap(source_uri: &Url, content: &str) -> ParsedSitemap {
    match root_element(content).as_deref() {
        Some("sitemapindex") => match from_str::<SitemapIndexXml>(content) {
            Ok(index) => parse_index(source_uri, index),
            Err(e) => {
                warn!("Malformed sitemap index at {}: {}", source_uri, e);
                ParsedSitemap::default()
            }
        },
        Some("urlset") => match from_str::<UrlsetXml>(content) {
            Ok(urlset) => parse_urlset(source_uri, urlset),
            Err(e) => {
                warn!("Malformed urlset at {}: {}", source_uri, e);
                ParsedSitemap::default()
            }
        },
        Some(other) => {
            warn!(
                "Unrecognized root element <{}> in sitemap at {}",
                other, source_uri
            );
            ParsedSitemap::default()
        }
        None => {
            warn!("Unparsable sitemap document at {}", source_uri);
            ParsedSitemap::default()
        }
    }
}

/// Local name of the document's root element, if the XML is well-formed
/// enough to reach it
fn root_element(content: &str) -> Option<String> {
    let mut reader = Reader::from_str(content);
    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                return Some(String::from_utf8_lossy(start.local_name().as_ref()).into_owned());
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => continue,
        }
    }
}

fn parse_index(source_uri: &Url, index: SitemapIndexXml) -> ParsedSitemap {
    let mut seen = HashSet::new();
    let mut child_sitemaps = Vec::new();

    for child in index.sitemaps {
        let Some(loc) = child.loc else {
            debug!("Dropping index child without <loc> in {}", source_uri);
            continue;
        };
        // join resolves relative locations against the source document
        match source_uri.join(loc.trim()) {
            Ok(uri) => {
                if seen.insert(uri.as_str().to_ascii_lowercase()) {
                    child_sitemaps.push(uri);
                }
            }
            Err(e) => {
                debug!("Dropping unresolvable child <loc> {:?}: {}", loc, e);
            }
        }
    }

    ParsedSitemap {
        entries: Vec::new(),
        child_sitemaps,
    }
}

fn parse_urlset(source_uri: &Url, urlset: UrlsetXml) -> ParsedSitemap {
    let mut entries = Vec::new();

    for url in urlset.urls {
        let Some(loc) = url.loc else {
            debug!("Dropping <url> without <loc> in {}", source_uri);
            continue;
        };
        let location = match source_uri.join(loc.trim()) {
            Ok(uri) => uri,
            Err(e) => {
                debug!("Dropping unresolvable <loc> {:?}: {}", loc, e);
                continue;
            }
        };

        entries.push(SitemapEntry {
            location,
            last_modified: url.lastmod.as_deref().and_then(parse_lastmod),
            change_frequency: url
                .changefreq
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty()),
            priority: url.priority.and_then(|p| p.trim().parse::<f64>().ok()),
            heuristic_score: 0.0,
        });
    }

    ParsedSitemap {
        entries,
        child_sitemaps: Vec::new(),
    }
}

/// Parse a W3C datetime `<lastmod>` value; `None` on any failure
fn parse_lastmod(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Some(timestamp.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
