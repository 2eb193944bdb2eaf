// Single-page content analysis
//
// Everything here is a pure function of one page and the catalog. Results are
// returned as fragments; merging into the shared findings is the caller's job.

use crate::catalog::IndicatorCatalog;
use crate::findings::{Fragment, keys};
use crate::observation::PageObservation;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;
use std::sync::LazyLock;

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("anchor selector is valid"));

/// Runs every detector over the page and folds the results into one fragment
pub fn analyze_page(page: &PageObservation, catalog: &IndicatorCatalog) -> Fragment {
    let document = Html::parse_document(&page.body);
    analyze_document(page, &document, catalog)
}

/// Same as [`analyze_page`] for callers that already parsed the body
pub fn analyze_document(
    page: &PageObservation,
    document: &Html,
    catalog: &IndicatorCatalog,
) -> Fragment {
    let keywords = keywords_in_document(document, catalog);
    let (has_hidden, hidden) = hidden_in_document(document, catalog);
    let contacts = contacts_in_document(document, catalog);

    let mut fragment = Fragment::new()
        .union(keys::FOUND_KEYWORDS, keywords)
        .any(keys::HAS_HIDDEN_ELEMENTS, has_hidden)
        .union(keys::HIDDEN_ELEMENTS, hidden)
        .any(keys::HAS_CONTACT_INFO, !contacts.is_empty())
        .union(keys::CONTACT_INFO, contacts)
        .add(keys::PAGES_ANALYZED, 1);
    fragment.extend(check_security(page, catalog));
    fragment
}

pub fn detect_keywords(page: &PageObservation, catalog: &IndicatorCatalog) -> BTreeSet<String> {
    keywords_in_document(&Html::parse_document(&page.body), catalog)
}

pub fn detect_hidden_elements(
    page: &PageObservation,
    catalog: &IndicatorCatalog,
) -> (bool, Vec<String>) {
    hidden_in_document(&Html::parse_document(&page.body), catalog)
}

pub fn check_contact_info(page: &PageObservation, catalog: &IndicatorCatalog) -> BTreeSet<String> {
    contacts_in_document(&Html::parse_document(&page.body), catalog)
}

/// Transport and request-hygiene checks.
///
/// The header check looks at the headers of the request this crawler sent,
/// not at what the server returned.
pub fn check_security(page: &PageObservation, catalog: &IndicatorCatalog) -> Fragment {
    let secure = page.is_secure();
    let mut fragment = Fragment::new()
        .any(keys::UNSECURE_CONNECTION, !secure)
        .all(keys::SECURE_CONNECTION, secure);

    for header in &catalog.suspicious_headers {
        if !page.request_headers.contains_key(header.as_str()) {
            fragment = fragment.any(&keys::missing_header(header), true);
        }
    }
    fragment
}

/// Lower-cased text content with whitespace runs collapsed
pub fn page_text(document: &Html) -> String {
    let raw: String = document.root_element().text().collect();
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn keywords_in_document(document: &Html, catalog: &IndicatorCatalog) -> BTreeSet<String> {
    let text = page_text(document);
    catalog
        .suspicious_keywords
        .iter()
        .filter(|keyword| text.contains(&keyword.to_lowercase()))
        .cloned()
        .collect()
}

fn hidden_in_document(document: &Html, catalog: &IndicatorCatalog) -> (bool, Vec<String>) {
    let markers: Vec<String> = catalog
        .hidden_markers
        .iter()
        .map(|m| compact(&m.to_lowercase()))
        .collect();

    let mut descriptions = Vec::new();
    for element in document.root_element().descendants().filter_map(ElementRef::wrap) {
        let value = element.value();
        let tag = value.name();

        if let Some(style) = value.attr("style") {
            let style = compact(&style.to_lowercase());
            for marker in &markers {
                if style_contains(&style, marker) {
                    descriptions.push(format!("Hidden by style: {} (<{}>)", marker, tag));
                }
            }
        }

        if let Some(class) = value.attr("class") {
            let class = class.to_lowercase();
            for marker in &markers {
                if class.contains(marker.as_str()) {
                    descriptions.push(format!("Hidden by class: {} (<{}>)", marker, tag));
                }
            }
        }

        if value.attr("hidden").is_some() {
            descriptions.push(format!("Hidden by attribute: hidden (<{}>)", tag));
        }
        if let Some(aria) = value.attr("aria-hidden")
            && !aria.trim().eq_ignore_ascii_case("false")
        {
            descriptions.push(format!("Hidden by attribute: aria-hidden (<{}>)", tag));
        }
    }

    let mut seen = BTreeSet::new();
    descriptions.retain(|d| seen.insert(d.clone()));
    (!descriptions.is_empty(), descriptions)
}

fn contacts_in_document(document: &Html, catalog: &IndicatorCatalog) -> BTreeSet<String> {
    let patterns: Vec<String> = catalog
        .contact_patterns
        .iter()
        .map(|p| p.to_lowercase())
        .collect();

    let mut found = BTreeSet::new();
    for anchor in document.select(&ANCHOR_SELECTOR) {
        let href = anchor.value().attr("href").unwrap_or_default().trim();
        let text = anchor
            .text()
            .collect::<String>()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let href_lower = href.to_lowercase();

        for pattern in &patterns {
            if !href.is_empty() && href_lower.contains(pattern.as_str()) {
                found.insert(href.to_string());
            }
            if !text.is_empty() && text.contains(pattern.as_str()) {
                found.insert(text.clone());
            }
        }
    }
    found
}

fn compact(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

// "opacity:0" must not match "opacity:0.5"
fn style_contains(style: &str, marker: &str) -> bool {
    style.match_indices(marker).any(|(idx, _)| {
        let ends_with_digit = marker.ends_with(|c: char| c.is_ascii_digit());
        match style[idx + marker.len()..].chars().next() {
            Some(next) if ends_with_digit => !(next.is_ascii_digit() || next == '.'),
            _ => true,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
    use url::Url;

    fn page(url: &str, body: &str) -> PageObservation {
        PageObservation::new(Url::parse(url).unwrap())
            .with_status(200)
            .with_body(body)
    }

    #[test]
    fn test_keyword_found() {
        let p = page(
            "https://shop.example",
            "<html><body><p>Our deals are 100% SAFE, trust us</p></body></html>",
        );
        let found = detect_keywords(&p, &IndicatorCatalog::default());
        assert!(found.contains("100% safe"));
    }

    #[test]
    fn test_keyword_across_inline_markup() {
        let p = page("https://shop.example", "<p>Earn <b>cash</b> now</p>");
        let found = detect_keywords(&p, &IndicatorCatalog::default());
        assert!(found.contains("earn cash"));
    }

    #[test]
    fn test_keyword_none() {
        let p = page("https://shop.example", "<p>Fresh vegetables delivered weekly</p>");
        assert!(detect_keywords(&p, &IndicatorCatalog::default()).is_empty());
    }

    #[test]
    fn test_hidden_style() {
        let p = page("https://shop.example", r#"<div style="display:none">x</div>"#);
        let (found, descriptions) = detect_hidden_elements(&p, &IndicatorCatalog::default());
        assert!(found);
        assert!(descriptions.iter().any(|d| d.contains("display:none")));
    }

    #[test]
    fn test_hidden_style_with_spaces() {
        let p = page("https://shop.example", r#"<span style="Display : None;">x</span>"#);
        let (found, descriptions) = detect_hidden_elements(&p, &IndicatorCatalog::default());
        assert!(found);
        assert!(descriptions[0].contains("<span>"));
    }

    #[test]
    fn test_partial_opacity_not_hidden() {
        let p = page("https://shop.example", r#"<div style="opacity:0.5">x</div>"#);
        let (found, _) = detect_hidden_elements(&p, &IndicatorCatalog::default());
        assert!(!found);
    }

    #[test]
    fn test_hidden_class_and_attributes() {
        let p = page(
            "https://shop.example",
            r#"<div class="sr-Hidden">a</div><p hidden>b</p><i aria-hidden="true">c</i><i aria-hidden="false">d</i>"#,
        );
        let (found, descriptions) = detect_hidden_elements(&p, &IndicatorCatalog::default());
        assert!(found);
        assert!(descriptions.iter().any(|d| d.starts_with("Hidden by class: hidden")));
        assert!(descriptions.contains(&"Hidden by attribute: hidden (<p>)".to_string()));
        assert_eq!(
            descriptions
                .iter()
                .filter(|d| d.starts_with("Hidden by attribute: aria-hidden"))
                .count(),
            1
        );
    }

    #[test]
    fn test_nothing_hidden() {
        let p = page(
            "https://shop.example",
            r#"<div style="color:red" class="banner">visible</div>"#,
        );
        let (found, descriptions) = detect_hidden_elements(&p, &IndicatorCatalog::default());
        assert!(!found);
        assert!(descriptions.is_empty());
    }

    #[test]
    fn test_contact_info_href_and_text() {
        let p = page(
            "https://shop.example",
            r#"<a href="/Contact-Us">Reach us</a><a href="/x">Customer Support</a><a href="/y">Shop</a>"#,
        );
        let found = check_contact_info(&p, &IndicatorCatalog::default());
        assert!(found.contains("/Contact-Us"));
        assert!(found.contains("customer support"));
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_contact_info_localized() {
        let p = page("https://shop.example", r#"<a href="/fa/c">تماس با ما</a>"#);
        let found = check_contact_info(&p, &IndicatorCatalog::default());
        assert!(found.contains("تماس با ما"));
    }

    #[test]
    fn test_insecure_transport_flagged() {
        let p = page("http://shop.example/", "");
        let fragment = check_security(&p, &IndicatorCatalog::default());
        assert!(
            fragment
                .entries()
                .iter()
                .any(|(k, u)| k == keys::UNSECURE_CONNECTION
                    && *u == crate::findings::FindingUpdate::Any(true))
        );
    }

    #[test]
    fn test_secure_with_all_headers_has_no_missing() {
        let catalog = IndicatorCatalog::default();
        let mut headers = HeaderMap::new();
        for name in &catalog.suspicious_headers {
            headers.insert(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_static("x"),
            );
        }
        let p = page("https://shop.example/", "").with_request_headers(headers);
        let fragment = check_security(&p, &catalog);

        assert!(
            !fragment
                .entries()
                .iter()
                .any(|(k, _)| k.starts_with(keys::MISSING_HEADER_PREFIX))
        );
    }

    #[test]
    fn test_missing_request_headers_flagged() {
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("x"));
        let p = page("https://shop.example/", "").with_request_headers(headers);
        let fragment = check_security(&p, &IndicatorCatalog::default());
        let missing: Vec<&str> = fragment
            .entries()
            .iter()
            .filter_map(|(k, _)| k.strip_prefix(keys::MISSING_HEADER_PREFIX))
            .collect();

        assert!(missing.contains(&"DNT"));
        assert!(!missing.contains(&"User-Agent"));
        assert_eq!(missing.len(), 5);
    }
}
