//! Tolerant RSS 2.0 / Atom reader and HTML feed discovery.
//!
//! Parsing is tag extraction, not XML validation: malformed input yields
//! fewer items (possibly none), never an error.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AdapterError;

const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";

static CDATA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*<!\[CDATA\[(.*?)\]\]>\s*$").unwrap());
static ENTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").unwrap());
static ATTRIBUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"([\w:.-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap());
static ATOM_ROOT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<feed[\s>]").unwrap());
static LINE_BREAK_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>|</p\s*>|</li\s*>|</div\s*>").unwrap());
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Rss,
    Atom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub kind: FeedKind,
    pub title: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub items: Vec<FeedItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub description: Option<String>,
    pub published: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub guid: Option<String>,
    pub author: Option<String>,
    pub enclosure: Option<Enclosure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enclosure {
    pub url: String,
    pub mime_type: Option<String>,
    pub length: Option<u64>,
}

/// One element occurrence: raw attribute text and raw inner text.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Element<'a> {
    pub attrs: &'a str,
    pub inner: &'a str,
}

impl<'a> Element<'a> {
    pub fn attr(&self, name: &str) -> Option<String> {
        ATTRIBUTE
            .captures_iter(self.attrs)
            .find(|caps| caps.get(1).is_some_and(|m| m.as_str().eq_ignore_ascii_case(name)))
            .and_then(|caps| caps.get(2).or_else(|| caps.get(3)))
            .map(|m| decode_entities(m.as_str()))
    }

    pub fn text(&self) -> Option<String> {
        text_content(self.inner)
    }
}

/// All occurrences of `<tag ...>...</tag>` (or self-closing `<tag/>`) in document order.
/// Nested elements of the same name are not supported.
pub(crate) fn elements<'a>(xml: &'a str, tag: &str) -> Vec<Element<'a>> {
    let open = format!("<{tag}");
    let close = format!("</{tag}>");
    let mut out = Vec::new();
    let mut pos = 0;

    while let Some(found) = xml[pos..].find(&open) {
        let name_end = pos + found + open.len();
        let after = &xml[name_end..];
        match after.chars().next() {
            Some(c) if c == '>' || c == '/' || c.is_whitespace() => {}
            _ => {
                pos = name_end;
                continue;
            }
        }
        let Some(gt) = after.find('>') else { break };
        let head = &after[..gt];
        let body_start = name_end + gt + 1;

        if head.ends_with('/') {
            out.push(Element {
                attrs: head.trim_end_matches('/').trim(),
                inner: "",
            });
            pos = body_start;
            continue;
        }

        let Some(end) = xml[body_start..].find(&close) else { break };
        out.push(Element {
            attrs: head.trim(),
            inner: &xml[body_start..body_start + end],
        });
        pos = body_start + end + close.len();
    }

    out
}

pub(crate) fn first_element<'a>(xml: &'a str, tag: &str) -> Option<Element<'a>> {
    elements(xml, tag).into_iter().next()
}

/// Text of the first `tag` element, trying each name in turn.
pub(crate) fn child_text(xml: &str, tags: &[&str]) -> Option<String> {
    tags.iter()
        .find_map(|tag| first_element(xml, tag).and_then(|el| el.text()))
}

/// CDATA body if the value is wrapped in one, otherwise entity-decoded text.
pub(crate) fn text_content(raw: &str) -> Option<String> {
    let value = match CDATA.captures(raw).and_then(|c| c.get(1)) {
        Some(cdata) => cdata.as_str().trim().to_string(),
        None => decode_entities(raw.trim()),
    };
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    ENTITY
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ if entity.starts_with("#x") || entity.starts_with("#X") => {
                    u32::from_str_radix(&entity[2..], 16).ok().and_then(char::from_u32)
                }
                _ if entity.starts_with('#') => entity[1..].parse::<u32>().ok().and_then(char::from_u32),
                _ => None,
            };
            decoded.map_or_else(|| caps[0].to_string(), |c| c.to_string())
        })
        .into_owned()
}

/// Reduces an HTML fragment to plain text, keeping block breaks as newlines.
pub fn strip_html(html: &str) -> String {
    let with_breaks = LINE_BREAK_TAG.replace_all(html, "\n");
    let without_tags = ANY_TAG.replace_all(&with_breaks, " ");
    decode_entities(&without_tags)
}

pub(crate) fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    DateTime::parse_from_rfc2822(text)
        .or_else(|_| DateTime::parse_from_rfc3339(text))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn is_atom(xml: &str) -> bool {
    if xml.contains(ATOM_NAMESPACE) && ATOM_ROOT.is_match(xml) {
        return true;
    }
    !xml.contains("<item") && xml.contains("<entry")
}

pub fn parse_feed(xml: &str) -> Feed {
    if is_atom(xml) {
        parse_atom(xml)
    } else {
        parse_rss(xml)
    }
}

fn keep_item(item: &FeedItem) -> bool {
    item.title.is_some() || item.link.is_some()
}

fn parse_rss(xml: &str) -> Feed {
    let header = xml.split("<item").next().unwrap_or(xml);
    let items = elements(xml, "item")
        .into_iter()
        .map(|el| rss_item(el.inner))
        .filter(keep_item)
        .collect();

    Feed {
        kind: FeedKind::Rss,
        title: child_text(header, &["title"]),
        description: child_text(header, &["description"]),
        link: child_text(header, &["link"]),
        items,
    }
}

fn rss_item(block: &str) -> FeedItem {
    let published = child_text(block, &["pubDate", "dc:date"]);
    let enclosure = first_element(block, "enclosure").and_then(|el| {
        Some(Enclosure {
            url: el.attr("url")?,
            mime_type: el.attr("type"),
            length: el.attr("length").and_then(|l| l.trim().parse().ok()),
        })
    });

    FeedItem {
        title: child_text(block, &["title"]),
        link: child_text(block, &["link"]),
        description: child_text(block, &["description", "content:encoded"]),
        published_at: published.as_deref().and_then(parse_date),
        published,
        guid: child_text(block, &["guid"]),
        author: child_text(block, &["author", "dc:creator"]),
        enclosure,
    }
}

fn atom_link(block: &str) -> Option<String> {
    let links = elements(block, "link");
    let alternate = links.iter().find(|el| {
        el.attr("rel")
            .map_or(true, |rel| rel.eq_ignore_ascii_case("alternate"))
    });
    alternate
        .or_else(|| links.first())
        .and_then(|el| el.attr("href").or_else(|| el.text()))
}

fn parse_atom(xml: &str) -> Feed {
    let header = xml.split("<entry").next().unwrap_or(xml);
    let items = elements(xml, "entry")
        .into_iter()
        .map(|el| atom_entry(el.inner))
        .filter(keep_item)
        .collect();

    Feed {
        kind: FeedKind::Atom,
        title: child_text(header, &["title"]),
        description: child_text(header, &["subtitle"]),
        link: atom_link(header),
        items,
    }
}

fn atom_entry(block: &str) -> FeedItem {
    let published = child_text(block, &["published", "updated"]);
    let author = first_element(block, "author")
        .and_then(|el| child_text(el.inner, &["name"]).or_else(|| el.text()));

    FeedItem {
        title: child_text(block, &["title"]),
        link: atom_link(block),
        description: child_text(block, &["content", "summary"]),
        published_at: published.as_deref().and_then(parse_date),
        published,
        guid: child_text(block, &["id"]),
        author,
        enclosure: None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredFeed {
    pub url: String,
    pub title: Option<String>,
    pub kind: FeedKind,
}

/// Finds `<link rel="alternate">` feed declarations in an HTML page,
/// resolving relative hrefs against `base_url`.
pub fn discover_feeds(html: &str, base_url: &str) -> Result<Vec<DiscoveredFeed>, AdapterError> {
    let base = Url::parse(base_url)
        .map_err(|e| AdapterError::Config(format!("invalid page url {base_url}: {e}")))?;
    let selector = Selector::parse("link[rel][href]")
        .map_err(|e| AdapterError::Config(format!("invalid selector: {e}")))?;
    let document = Html::parse_document(html);

    let mut feeds: Vec<DiscoveredFeed> = Vec::new();
    for node in document.select(&selector) {
        let el = node.value();
        let is_alternate = el
            .attr("rel")
            .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("alternate")));
        if !is_alternate {
            continue;
        }
        let kind = match el.attr("type").map(|t| t.trim().to_ascii_lowercase()).as_deref() {
            Some("application/rss+xml") => FeedKind::Rss,
            Some("application/atom+xml") => FeedKind::Atom,
            _ => continue,
        };
        let Some(href) = el.attr("href") else { continue };
        let Ok(url) = base.join(href.trim()) else { continue };
        let url = url.to_string();
        if feeds.iter().any(|f| f.url == url) {
            continue;
        }
        feeds.push(DiscoveredFeed {
            url,
            title: el.attr("title").map(|t| t.trim().to_string()).filter(|t| !t.is_empty()),
            kind,
        });
    }
    Ok(feeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn fixture(name: &str) -> String {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../fixtures").join(name);
        std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("reading {}: {e}", path.display()))
    }

    #[test]
    fn rss_items_are_extracted_with_cdata_and_entities() {
        let feed = parse_feed(&fixture("rss/jobs.xml"));
        assert_eq!(feed.kind, FeedKind::Rss);
        assert_eq!(feed.title.as_deref(), Some("Example Jobs Board"));
        assert_eq!(feed.items.len(), 4);

        let first = &feed.items[0];
        assert_eq!(first.title.as_deref(), Some("Senior Rust Engineer"));
        assert_eq!(first.guid.as_deref(), Some("job-1001"));
        assert_eq!(first.author.as_deref(), Some("Acme Corp"));
        assert!(first.description.as_deref().unwrap().contains("<p>"));
        assert!(first.published_at.is_some());

        let second = &feed.items[1];
        assert_eq!(second.title.as_deref(), Some("Data Analyst & Reporting Lead"));
        let enclosure = second.enclosure.as_ref().unwrap();
        assert_eq!(enclosure.mime_type.as_deref(), Some("application/pdf"));
        assert_eq!(enclosure.length, Some(1024));
    }

    #[test]
    fn items_without_title_and_link_are_dropped() {
        let xml = r#"<rss version="2.0"><channel><title>t</title>
            <item><description>nothing to point at</description></item>
            <item><title>Only a title</title></item>
        </channel></rss>"#;
        let feed = parse_feed(xml);
        assert_eq!(feed.items.len(), 1);
        assert_eq!(feed.items[0].title.as_deref(), Some("Only a title"));
    }

    #[test]
    fn atom_entries_prefer_alternate_href() {
        let feed = parse_feed(&fixture("rss/jobs.atom"));
        assert_eq!(feed.kind, FeedKind::Atom);
        assert_eq!(feed.title.as_deref(), Some("Remote Roles"));
        assert_eq!(feed.items.len(), 2);
        let entry = &feed.items[0];
        assert_eq!(entry.link.as_deref(), Some("https://remote.example/jobs/77"));
        assert_eq!(entry.author.as_deref(), Some("Globex"));
        assert_eq!(entry.guid.as_deref(), Some("urn:uuid:77"));
        assert!(entry.published_at.is_some());
    }

    #[test]
    fn rss_with_atom_self_link_is_still_rss() {
        let xml = r#"<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom"><channel>
            <title>Mixed</title>
            <atom:link href="https://x.example/feed" rel="self" type="application/rss+xml"/>
            <item><title>A</title><link>https://x.example/a</link></item>
        </channel></rss>"#;
        let feed = parse_feed(xml);
        assert_eq!(feed.kind, FeedKind::Rss);
        assert_eq!(feed.items.len(), 1);
    }

    #[test]
    fn garbage_yields_empty_feed() {
        let feed = parse_feed("<html><body>not a feed</body></html>");
        assert!(feed.items.is_empty());
    }

    #[test]
    fn strip_html_keeps_paragraph_breaks() {
        let text = strip_html("<p>Build &amp; ship</p><p>Austin, TX</p>");
        assert!(text.contains("Build & ship"));
        assert!(text.contains('\n'));
        assert!(!text.contains('<'));
    }

    #[test]
    fn numeric_entities_decode() {
        assert_eq!(decode_entities("caf&#233; &#x2014; ok &bogus;"), "café \u{2014} ok &bogus;");
    }

    #[test]
    fn discovers_alternate_feed_links() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="/style.css">
            <link rel="alternate" type="application/rss+xml" title="Jobs" href="/careers/feed.xml">
            <link rel="alternate" type="application/atom+xml" href="https://cdn.example/atom">
            <link rel="alternate" type="text/html" href="/fr/">
        </head></html>"#;
        let feeds = discover_feeds(html, "https://company.example/careers/").unwrap();
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].url, "https://company.example/careers/feed.xml");
        assert_eq!(feeds[0].title.as_deref(), Some("Jobs"));
        assert_eq!(feeds[0].kind, FeedKind::Rss);
        assert_eq!(feeds[1].kind, FeedKind::Atom);
    }
}
