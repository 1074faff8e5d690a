//! HTML parsing: a pure function from bytes + URL to a `PageRecord`.
//!
//! Never panics or errors on malformed HTML; every extractor degrades to
//! an empty default, mirroring `HTMLParser.parse_html`'s try/except-per-
//! field wrapping in the Python original.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use serde::Serialize;
use url::Url;

#[derive(Debug, Clone, Serialize)]
pub struct ImageRef {
    pub src: String,
    pub alt: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Headers {
    pub h1: Vec<String>,
    pub h2: Vec<String>,
    pub h3: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Lists {
    pub ul: Vec<Vec<String>>,
    pub ol: Vec<Vec<String>>,
}

pub type TableRow = Vec<String>;
pub type Table = Vec<TableRow>;

#[derive(Debug, Clone, Serialize)]
pub struct PageRecord {
    pub url: Url,
    pub title: String,
    pub text: String,
    pub links: Vec<Url>,
    pub metadata: HashMap<String, String>,
    pub images: Vec<ImageRef>,
    pub headers: Headers,
    pub tables: Vec<Table>,
    pub lists: Lists,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub crawled_at: DateTime<Utc>,
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn extract_metadata(doc: &Html) -> HashMap<String, String> {
    let mut metadata = HashMap::new();

    if let Some(sel) = selector("title") {
        if let Some(title) = doc.select(&sel).next() {
            let text = title.text().collect::<String>().trim().to_string();
            if !text.is_empty() {
                metadata.insert("title".to_string(), text);
            }
        }
    }

    let Some(meta_sel) = selector("meta") else {
        return metadata;
    };

    for meta in doc.select(&meta_sel) {
        let name = meta.value().attr("name").unwrap_or("").to_ascii_lowercase();
        let property = meta.value().attr("property").unwrap_or("").to_ascii_lowercase();
        let content = meta.value().attr("content").unwrap_or("").trim().to_string();

        if content.is_empty() {
            continue;
        }

        match (name.as_str(), property.as_str()) {
            ("description", _) => {
                metadata.insert("description".to_string(), content);
            }
            ("keywords", _) => {
                metadata.insert("keywords".to_string(), content);
            }
            (_, "og:title") if !metadata.contains_key("title") => {
                metadata.insert("title".to_string(), content);
            }
            (_, "og:description") if !metadata.contains_key("description") => {
                metadata.insert("description".to_string(), content);
            }
            _ => {}
        }
    }

    metadata
}

fn extract_text(doc: &Html) -> String {
    doc.root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn extract_links(doc: &Html, base: &Url) -> Vec<Url> {
    let Some(sel) = selector("a") else {
        return Vec::new();
    };

    let mut seen = std::collections::HashSet::new();
    doc.select(&sel)
        .filter_map(|a| a.value().attr("href"))
        .filter(|href| {
            let href = href.trim();
            !href.is_empty() && !href.starts_with('#') && !href.starts_with("javascript:")
        })
        .filter_map(|href| crate::url_filter::normalize(base, href))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

fn extract_images(doc: &Html, base: &Url) -> Vec<ImageRef> {
    let Some(sel) = selector("img") else {
        return Vec::new();
    };

    doc.select(&sel)
        .filter_map(|img| {
            let src = img.value().attr("src")?.trim();
            if src.is_empty() {
                return None;
            }
            let absolute = base.join(src).ok()?;
            let alt = img.value().attr("alt").unwrap_or("").trim().to_string();
            Some(ImageRef {
                src: absolute.into(),
                alt,
            })
        })
        .collect()
}

fn heading_texts(doc: &Html, tag: &str) -> Vec<String> {
    let Some(sel) = selector(tag) else {
        return Vec::new();
    };
    doc.select(&sel)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .collect()
}

fn extract_headers(doc: &Html) -> Headers {
    Headers {
        h1: heading_texts(doc, "h1"),
        h2: heading_texts(doc, "h2"),
        h3: heading_texts(doc, "h3"),
    }
}

fn extract_tables(doc: &Html) -> Vec<Table> {
    let (Some(table_sel), Some(row_sel), Some(cell_sel)) =
        (selector("table"), selector("tr"), selector("td, th"))
    else {
        return Vec::new();
    };

    doc.select(&table_sel)
        .filter_map(|table| {
            let rows: Vec<TableRow> = table
                .select(&row_sel)
                .map(|row| {
                    row.select(&cell_sel)
                        .map(|cell| cell.text().collect::<String>().trim().to_string())
                        .collect()
                })
                .collect();
            (!rows.is_empty()).then_some(rows)
        })
        .collect()
}

fn extract_lists(doc: &Html) -> Lists {
    let list_items = |tag: &str| -> Vec<Vec<String>> {
        let (Some(list_sel), Some(item_sel)) = (selector(tag), selector("li")) else {
            return Vec::new();
        };
        doc.select(&list_sel)
            .filter_map(|list| {
                let items: Vec<String> = list
                    .select(&item_sel)
                    .map(|li| li.text().collect::<String>().trim().to_string())
                    .collect();
                (!items.is_empty()).then_some(items)
            })
            .collect()
    };

    Lists {
        ul: list_items("ul"),
        ol: list_items("ol"),
    }
}

/// Parse `body` (already UTF-8 decoded by the fetcher) into a `PageRecord`.
/// Pure: the same input always produces the same output, and malformed
/// HTML degrades gracefully rather than erroring.
pub fn parse(
    body: &str,
    url: Url,
    status_code: u16,
    content_type: Option<String>,
    crawled_at: DateTime<Utc>,
) -> PageRecord {
    let doc = Html::parse_document(body);

    let metadata = extract_metadata(&doc);
    let title = metadata.get("title").cloned().unwrap_or_default();

    PageRecord {
        title,
        text: extract_text(&doc),
        links: extract_links(&doc, &url),
        images: extract_images(&doc, &url),
        headers: extract_headers(&doc),
        tables: extract_tables(&doc),
        lists: extract_lists(&doc),
        metadata,
        url,
        status_code,
        content_type,
        crawled_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u() -> Url {
        Url::parse("https://example.com/page").unwrap()
    }

    #[test]
    fn extracts_title_text_and_links() {
        let html = r#"
            <html><head><title>Hi</title></head>
            <body><p>Hello world</p><a href="/about">About</a></body></html>
        "#;
        let record = parse(html, u(), 200, None, Utc::now());
        assert_eq!(record.title, "Hi");
        assert!(record.text.contains("Hello world"));
        assert_eq!(record.links, vec![Url::parse("https://example.com/about").unwrap()]);
    }

    #[test]
    fn extracts_metadata_with_og_fallback() {
        let html = r#"
            <html><head>
                <meta property="og:title" content="OG Title">
                <meta name="description" content="A page">
            </head><body></body></html>
        "#;
        let record = parse(html, u(), 200, None, Utc::now());
        assert_eq!(record.metadata.get("title").unwrap(), "OG Title");
        assert_eq!(record.metadata.get("description").unwrap(), "A page");
    }

    #[test]
    fn extracts_images_headers_tables_lists() {
        let html = r#"
            <html><body>
                <img src="/logo.png" alt="Logo">
                <h1>Main</h1><h2>Sub</h2>
                <table><tr><td>a</td><td>b</td></tr></table>
                <ul><li>one</li><li>two</li></ul>
            </body></html>
        "#;
        let record = parse(html, u(), 200, None, Utc::now());
        assert_eq!(record.images.len(), 1);
        assert_eq!(record.images[0].alt, "Logo");
        assert_eq!(record.headers.h1, vec!["Main".to_string()]);
        assert_eq!(record.headers.h2, vec!["Sub".to_string()]);
        assert_eq!(record.tables, vec![vec![vec!["a".to_string(), "b".to_string()]]]);
        assert_eq!(record.lists.ul, vec![vec!["one".to_string(), "two".to_string()]]);
    }

    #[test]
    fn malformed_html_never_panics() {
        let html = "<html><body><p>unclosed <div>broken";
        let record = parse(html, u(), 200, None, Utc::now());
        assert!(record.text.contains("unclosed"));
    }

    #[test]
    fn skips_fragment_and_javascript_links() {
        let html = r#"<a href="#top">Top</a><a href="javascript:void(0)">JS</a><a href="/ok">Ok</a>"#;
        let record = parse(html, u(), 200, None, Utc::now());
        assert_eq!(record.links, vec![Url::parse("https://example.com/ok").unwrap()]);
    }
}
