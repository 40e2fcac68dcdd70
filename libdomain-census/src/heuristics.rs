//! Content rules for the HTTP stage.
//!
//! A site counts as parked or placeholder when the server answered with a
//! non-2xx status, served almost nothing, landed on a known parking host after
//! redirects, shows registrar or parking wording, or carries default-page and
//! "coming soon" wording in its title or main heading. A site counts as
//! an active product when it is an active site showing at least
//! [`MIN_PRODUCT_SIGNALS`] distinct commerce markers.

use crate::{
    site::SiteResponse,
    types::{ProductState, UsageState},
};
use lazy_static::lazy_static;
use regex::{Regex, RegexSet};

/// Bodies with fewer non-whitespace bytes than this carry no real content.
pub const MIN_CONTENT_BYTES: usize = 64;

pub const MIN_PRODUCT_SIGNALS: usize = 2;

const PARKING_HOSTS: &[&str] = &[
    "sedoparking.com",
    "sedo.com",
    "parkingcrew.net",
    "bodis.com",
    "dan.com",
    "afternic.com",
    "hugedomains.com",
    "undeveloped.com",
    "parklogic.com",
    "above.com",
    "godaddy.com",
];

lazy_static! {
    static ref PARKING_MARKERS: RegexSet = RegexSet::new([
        r"(?i)domain (name )?(is |may be )?for sale",
        r"(?i)buy (this|the) domain",
        r"(?i)this domain (has been|is) (registered|parked)",
        r"(?i)\bparked (free|domain)|\bdomain parking\b|\b(parkingcrew|sedoparking|bodis)\b",
        r"(?i)\b(hugedomains|afternic|dan|undeveloped)\.com\b",
        r"(?i)future home of something quite cool",
        r"(?i)this (site|domain) is (not|no longer) (configured|available)|account (has been )?suspended",
    ])
    .expect("parking markers are valid regexes");

    /// Placeholder wording that only counts inside `<title>` or `<h1>`.
    static ref HEADLINE_MARKERS: RegexSet = RegexSet::new([
        r"(?i)\bcoming soon\b|\bunder construction\b|website is under maintenance",
        r"(?i)welcome to nginx|apache2 (ubuntu|debian) default page|^\s*it works!|iis windows server",
        r"(?i)^\s*index of /",
    ])
    .expect("headline markers are valid regexes");

    static ref HEADLINES: Regex =
        Regex::new(r"(?is)<(?:title|h1)\b[^>]*>(.*?)</(?:title|h1)\s*>")
            .expect("headline pattern is a valid regex");

    static ref PRODUCT_MARKERS: RegexSet = RegexSet::new([
        r"(?i)add to (cart|bag|basket)|shopping (cart|bag)|checkout",
        r"(?i)\bpricing\b|/pricing\b|per (month|user)|/mo\b",
        r"(?i)sign ?up|create (an |your )?account|get started",
        r"(?i)free trial|start (your )?trial|book a demo|request a demo",
        r#"(?i)"@type"\s*:\s*"(product|offer|softwareapplication)""#,
        r#"(?i)og:type"\s+content="product"#,
        r"(?i)apps\.apple\.com|play\.google\.com/store",
        r"(?i)buy now|subscribe now|order now",
    ])
    .expect("product markers are valid regexes");
}

fn is_parking_host(host: &str) -> bool {
    PARKING_HOSTS
        .iter()
        .any(|p| host == *p || host.ends_with(&format!(".{}", p)))
}

fn has_content(body: &str) -> bool {
    body.bytes().filter(|b| !b.is_ascii_whitespace()).count() >= MIN_CONTENT_BYTES
}

/// Parking/placeholder predicate over one HTTP response.
pub fn is_parked_or_placeholder(response: &SiteResponse) -> bool {
    if !(200..300).contains(&response.status) {
        return true;
    }
    if response.final_host.as_deref().is_some_and(is_parking_host) {
        return true;
    }
    !has_content(&response.body)
        || PARKING_MARKERS.is_match(&response.body)
        || has_placeholder_headline(&response.body)
}

fn has_placeholder_headline(body: &str) -> bool {
    HEADLINES
        .captures_iter(body)
        .filter_map(|c| c.get(1))
        .any(|text| HEADLINE_MARKERS.is_match(text.as_str()))
}

/// Number of distinct commerce markers present in `body`.
pub fn product_signal_count(body: &str) -> usize {
    PRODUCT_MARKERS.matches(body).iter().count()
}

pub fn has_product_signal(body: &str) -> bool {
    product_signal_count(body) >= MIN_PRODUCT_SIGNALS
}

/// Usage and product classification for a registered domain; `None` means the
/// HTTP stage produced no response at all.
pub fn classify_site(response: Option<&SiteResponse>) -> (UsageState, ProductState) {
    let Some(response) = response else {
        return (UsageState::NoWebsite, ProductState::Unknown);
    };

    if is_parked_or_placeholder(response) {
        return (UsageState::ParkedOrPlaceholder, ProductState::Unknown);
    }

    let product = if has_product_signal(&response.body) {
        ProductState::ActiveProduct
    } else {
        ProductState::Unknown
    };
    (UsageState::ActiveSite, product)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(status: u16, body: &str) -> SiteResponse {
        SiteResponse {
            status,
            final_host: Some("example.com".into()),
            body: body.into(),
        }
    }

    fn article() -> String {
        "<html><head><title>Notes on rust</title></head><body><p>".to_string()
            + &"Some thoughts about ownership and borrowing. ".repeat(5)
            + "</p></body></html>"
    }

    #[test]
    fn no_response_means_no_website() {
        assert_eq!(
            classify_site(None),
            (UsageState::NoWebsite, ProductState::Unknown)
        );
    }

    #[test]
    fn error_status_is_placeholder() {
        assert_eq!(
            classify_site(Some(&page(503, &article()))).0,
            UsageState::ParkedOrPlaceholder
        );
        assert_eq!(
            classify_site(Some(&page(404, &article()))).0,
            UsageState::ParkedOrPlaceholder
        );
    }

    #[test]
    fn parking_wording_is_placeholder() {
        let body = article() + "<p>This domain is for sale! Make an offer today.</p>";
        assert!(is_parked_or_placeholder(&page(200, &body)));
        let default_page = article() + "<h1>Welcome to nginx!</h1>";
        assert!(is_parked_or_placeholder(&page(200, &default_page)));
    }

    #[test]
    fn placeholder_headline_is_placeholder() {
        let body = "<html><head><title>Coming Soon</title></head><body>".to_string()
            + &"<p>We are working hard on something new. Stay tuned.</p>".repeat(3)
            + "</body></html>";
        assert!(is_parked_or_placeholder(&page(200, &body)));
        let listing = article().replace("<title>Notes on rust", "<title>Index of /files");
        assert!(is_parked_or_placeholder(&page(200, &listing)));
    }

    #[test]
    fn link_to_similar_host_is_not_parking() {
        let body = "<html><head><title>Shoe reviews</title></head><body><p>".to_string()
            + &"We compare running shoes from every major brand each season. ".repeat(4)
            + "<a href=\"https://www.jordan.com/\">Jordan</a></p></body></html>";
        assert_eq!(
            classify_site(Some(&page(200, &body))).0,
            UsageState::ActiveSite
        );

        let sale = article() + "<a href=\"https://www.dan.com/buy-domain/x.com\">offer</a>";
        assert!(is_parked_or_placeholder(&page(200, &sale)));
    }

    #[test]
    fn teaser_wording_in_content_is_not_parking() {
        let body = "<html><head><title>Linen shirt</title></head><body><h1>Linen shirt</h1><p>"
            .to_string()
            + &"Breathable washed linen, cut for a relaxed fit. ".repeat(4)
            + "New colours coming soon!</p></body></html>";
        assert_eq!(
            classify_site(Some(&page(200, &body))).0,
            UsageState::ActiveSite
        );
    }

    #[test]
    fn tiny_body_is_placeholder() {
        assert!(is_parked_or_placeholder(&page(200, "<html>  </html>")));
    }

    #[test]
    fn parking_host_after_redirect_is_placeholder() {
        let mut response = page(200, &article());
        response.final_host = Some("www.sedoparking.com".into());
        assert!(is_parked_or_placeholder(&response));
        response.final_host = Some("notsedo.com".into());
        assert!(!is_parked_or_placeholder(&response));
    }

    #[test]
    fn content_page_is_active_without_product() {
        assert_eq!(
            classify_site(Some(&page(200, &article()))),
            (UsageState::ActiveSite, ProductState::Unknown)
        );
    }

    #[test]
    fn product_needs_two_distinct_signals() {
        let one = article() + "<a href=\"/pricing\">Pricing</a>";
        assert_eq!(product_signal_count(&one), 1);
        assert_eq!(
            classify_site(Some(&page(200, &one))).1,
            ProductState::Unknown
        );

        let two = one + "<button>Start your free trial</button>";
        assert_eq!(
            classify_site(Some(&page(200, &two))),
            (UsageState::ActiveSite, ProductState::ActiveProduct)
        );
    }

    #[test]
    fn parked_page_never_counts_as_product() {
        let body = article() + "Buy this domain. Pricing. Checkout. Free trial.";
        assert_eq!(
            classify_site(Some(&page(200, &body))),
            (UsageState::ParkedOrPlaceholder, ProductState::Unknown)
        );
    }
}
