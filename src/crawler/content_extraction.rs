//! Page extraction for the crawler module
//!
//! Turns a fetched HTML document into a [`PageRecord`] plus the same-site
//! links worth feeding back into the frontier.

use super::error::CrawlError;
use super::fetcher::FetchedPage;
use super::frontier::in_scope;
use super::language::{DetectionInput, detect_language};
use super::{
    AccessibilityFlags, Heading, ImageRef, LinkRef, MobileFlags, PageRecord, SchemaFlags,
    SecurityFlags,
};
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Elements whose text never counts as page content
const NON_CONTENT: &[&str] = &[
    "head", "script", "style", "noscript", "template", "nav", "header", "footer", "aside",
];

/// Input types a visitor types into and that therefore need a label
const LABELED_INPUT_TYPES: &[&str] = &["text", "email", "password", "tel", "search", "url", "number"];

/// Result of extracting one page
#[derive(Debug, Clone)]
pub struct ExtractedPage {
    pub record: PageRecord,

    /// Same-site HTTP(S) links in document order
    pub discovered: Vec<Url>,
}

fn selector(css: &str) -> Result<Selector, CrawlError> {
    Selector::parse(css)
        .map_err(|e| CrawlError::HtmlParse(format!("Failed to parse selector '{}': {}", css, e)))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn first_attr(document: &Html, css: &str, attr: &str) -> Result<Option<String>, CrawlError> {
    let selector = selector(css)?;
    Ok(document
        .select(&selector)
        .next()
        .and_then(|element| element.value().attr(attr))
        .map(|value| value.trim().to_string()))
}

fn exists(document: &Html, css: &str) -> Result<bool, CrawlError> {
    let selector = selector(css)?;
    Ok(document.select(&selector).next().is_some())
}

/// Extract a page record from an HTML response
///
/// `seed_host` decides which links are internal. Fails with
/// [`CrawlError::NotHtml`] or [`CrawlError::EmptyBody`] for responses that
/// cannot be audited.
pub fn extract_page(
    page: &FetchedPage,
    seed_host: &str,
    sequence: usize,
) -> Result<ExtractedPage, CrawlError> {
    if !page.is_html() {
        return Err(CrawlError::NotHtml(
            page.content_type.clone().unwrap_or_else(|| "missing content type".to_string()),
        ));
    }
    if page.body.trim().is_empty() {
        return Err(CrawlError::EmptyBody);
    }

    let document = Html::parse_document(&page.body);

    let title_selector = selector("title")?;
    let title = document.select(&title_selector).next().map(element_text);

    let headings = extract_headings(&document)?;
    let images = extract_images(&document, &page.url)?;
    let (links, discovered) = extract_links(&document, &page.url, seed_host)?;

    let html_lang = first_attr(&document, "html", "lang")?.filter(|lang| !lang.is_empty());
    let text = visible_text(&document);
    let language = detect_language(&DetectionInput {
        lang_attribute: html_lang.as_deref(),
        url: &page.url,
        text: &text,
    });

    let viewport = first_attr(&document, "meta[name='viewport']", "content")?;
    let mobile = MobileFlags {
        viewport: viewport.is_some(),
        device_width: viewport
            .map(|content| content.replace(' ', "").to_ascii_lowercase().contains("width=device-width"))
            .unwrap_or(false),
    };

    let record = PageRecord {
        url: page.url.to_string(),
        status: page.status,
        load_time_ms: page.elapsed.as_millis() as u64,
        page_size_bytes: page.body.len() as u64,
        language,
        title,
        meta_description: first_attr(&document, "meta[name='description']", "content")?,
        canonical: first_attr(&document, "link[rel~='canonical']", "href")?,
        robots: first_attr(&document, "meta[name='robots']", "content")?,
        headings,
        images,
        links,
        schema: SchemaFlags {
            json_ld: exists(&document, "script[type='application/ld+json']")?,
            microdata: exists(&document, "[itemscope], [itemtype]")?,
            open_graph: exists(&document, "meta[property^='og:']")?,
            twitter_card: exists(&document, "meta[name^='twitter:']")?,
        },
        security: security_flags(page),
        mobile,
        accessibility: AccessibilityFlags {
            html_lang: html_lang.is_some(),
            aria_landmarks: exists(
                &document,
                "main, nav, [role='main'], [role='navigation'], [role='banner'], [role='contentinfo'], [role='search']",
            )?,
            unlabeled_inputs: count_unlabeled_inputs(&document)?,
            low_contrast_hints: count_contrast_hints(&document)?,
        },
        word_count: text.split_whitespace().count(),
        sequence,
        fetched_at: Utc::now(),
        error: None,
    };

    Ok(ExtractedPage { record, discovered })
}

fn extract_headings(document: &Html) -> Result<Vec<Heading>, CrawlError> {
    let selector = selector("h1, h2, h3, h4, h5, h6")?;
    Ok(document
        .select(&selector)
        .filter_map(|element| {
            let level = element.value().name()[1..].parse::<u8>().ok()?;
            Some(Heading {
                level,
                text: element_text(element),
            })
        })
        .collect())
}

fn extract_images(document: &Html, base: &Url) -> Result<Vec<ImageRef>, CrawlError> {
    let selector = selector("img")?;
    Ok(document
        .select(&selector)
        .map(|img| {
            let attrs = img.value();
            let src = attrs.attr("src").filter(|s| !s.trim().is_empty());
            let deferred = attrs.attr("data-src").filter(|s| !s.trim().is_empty());
            let raw = src.or(deferred).unwrap_or_default().trim();
            ImageRef {
                src: base
                    .join(raw)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| raw.to_string()),
                has_alt: attrs.attr("alt").is_some_and(|alt| !alt.trim().is_empty()),
                lazy: attrs.attr("loading").is_some_and(|l| l.eq_ignore_ascii_case("lazy"))
                    || (src.is_none() && deferred.is_some()),
            }
        })
        .collect())
}

fn extract_links(
    document: &Html,
    base: &Url,
    seed_host: &str,
) -> Result<(Vec<LinkRef>, Vec<Url>), CrawlError> {
    let selector = selector("a[href]")?;
    let mut links = Vec::new();
    let mut discovered = Vec::new();

    for anchor in document.select(&selector) {
        let raw = anchor.value().attr("href").unwrap_or_default().trim();
        let nofollow = anchor
            .value()
            .attr("rel")
            .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("nofollow")));
        let text = element_text(anchor);

        let resolved = if raw.is_empty() || raw.starts_with('#') {
            None
        } else {
            base.join(raw)
                .ok()
                .filter(|url| matches!(url.scheme(), "http" | "https"))
        };

        match resolved {
            Some(mut url) => {
                url.set_fragment(None);
                let internal = url.host_str().is_some_and(|host| in_scope(host, seed_host));
                if internal {
                    discovered.push(url.clone());
                }
                links.push(LinkRef {
                    href: url.to_string(),
                    text,
                    internal,
                    nofollow,
                });
            }
            // Fragment, mailto:, tel: and javascript: links are kept as written
            None => links.push(LinkRef {
                href: raw.to_string(),
                text,
                internal: false,
                nofollow,
            }),
        }
    }

    Ok((links, discovered))
}

/// Text outside of non-content elements, whitespace separated
fn visible_text(document: &Html) -> String {
    let mut text = String::new();
    for node in document.root_element().descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|element| NON_CONTENT.contains(&element.name()))
        });
        if !hidden {
            text.push_str(fragment);
            text.push(' ');
        }
    }
    text
}

fn count_unlabeled_inputs(document: &Html) -> Result<usize, CrawlError> {
    let inputs = selector("input, textarea, select")?;
    let labels = selector("label[for]")?;
    let labeled_ids: Vec<&str> = document
        .select(&labels)
        .filter_map(|label| label.value().attr("for"))
        .collect();

    Ok(document
        .select(&inputs)
        .filter(|input| {
            let attrs = input.value();
            if attrs.name() == "input" {
                let kind = attrs.attr("type").unwrap_or("text").to_ascii_lowercase();
                if !LABELED_INPUT_TYPES.contains(&kind.as_str()) {
                    return false;
                }
            }
            let aria = ["aria-label", "aria-labelledby"]
                .iter()
                .any(|name| attrs.attr(name).is_some_and(|v| !v.trim().is_empty()));
            let by_for = attrs.id().is_some_and(|id| labeled_ids.contains(&id));
            let wrapped = input
                .ancestors()
                .any(|a| a.value().as_element().is_some_and(|e| e.name() == "label"));
            !(aria || by_for || wrapped)
        })
        .count())
}

/// Elements whose inline style sets both a text and a background color
fn count_contrast_hints(document: &Html) -> Result<usize, CrawlError> {
    let styled = selector("[style]")?;
    Ok(document
        .select(&styled)
        .filter(|element| {
            let style = element.value().attr("style").unwrap_or_default().to_ascii_lowercase();
            let properties: Vec<&str> = style
                .split(';')
                .filter_map(|decl| decl.split_once(':').map(|(name, _)| name.trim()))
                .collect();
            properties.contains(&"color") && properties.iter().any(|p| p.starts_with("background"))
        })
        .count())
}

fn security_flags(page: &FetchedPage) -> SecurityFlags {
    let has = |name: &str| page.headers.contains_key(name);
    SecurityFlags {
        https: page.url.scheme() == "https",
        hsts: has("strict-transport-security"),
        content_security_policy: has("content-security-policy"),
        x_frame_options: has("x-frame-options"),
        x_content_type_options: has("x-content-type-options"),
        referrer_policy: has("referrer-policy"),
        permissions_policy: has("permissions-policy"),
    }
}
