//! Canonical site identity.
//!
//! Job-board providers expose the same board under several hosts and API
//! paths. Normalization collapses those variants into one URL per board so
//! duplicate site records can be found by key. Generic sites keep their
//! query string, since listing pages often encode required filters there.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::models::SiteType;

static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").expect("valid slug regex"));

const GREENHOUSE_BOARD_HOSTS: &[&str] = &[
    "boards.greenhouse.io",
    "job-boards.greenhouse.io",
    "boards.eu.greenhouse.io",
    "job-boards.eu.greenhouse.io",
];
const GREENHOUSE_API_HOSTS: &[&str] = &["boards-api.greenhouse.io", "api.greenhouse.io"];
const LEVER_BOARD_HOSTS: &[&str] = &["jobs.lever.co", "jobs.eu.lever.co"];
const LEVER_API_HOSTS: &[&str] = &["api.lever.co", "api.eu.lever.co"];
const ASHBY_BOARD_HOSTS: &[&str] = &["jobs.ashbyhq.com"];
const ASHBY_API_HOSTS: &[&str] = &["api.ashbyhq.com"];

/// Full lowercase hostname of a URL, used as the rate-limit key.
pub fn extract_domain(url: &str) -> Option<String> {
    Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()))
        .filter(|h| !h.is_empty())
}

fn parse_lenient(raw: &str) -> Option<Url> {
    let raw = raw.trim();
    match Url::parse(raw) {
        Ok(u) if u.has_host() => Some(u),
        _ if !raw.contains("://") => Url::parse(&format!("https://{}", raw))
            .ok()
            .filter(|u| u.has_host()),
        _ => None,
    }
}

fn segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default()
}

fn valid_slug(s: &str) -> Option<String> {
    SLUG_RE.is_match(s).then(|| s.to_ascii_lowercase())
}

/// Provider whose hosts include this one.
pub fn provider_for_host(host: &str) -> Option<SiteType> {
    let host = host.to_ascii_lowercase();
    let h = host.as_str();
    if GREENHOUSE_BOARD_HOSTS.contains(&h) || GREENHOUSE_API_HOSTS.contains(&h) {
        Some(SiteType::Greenhouse)
    } else if LEVER_BOARD_HOSTS.contains(&h) || LEVER_API_HOSTS.contains(&h) {
        Some(SiteType::Lever)
    } else if ASHBY_BOARD_HOSTS.contains(&h) || ASHBY_API_HOSTS.contains(&h) {
        Some(SiteType::Ashby)
    } else {
        None
    }
}

/// Board slug for `provider`, if the URL is one of that provider's hosts.
fn provider_slug(url: &Url, provider: SiteType) -> Option<String> {
    let host = url.host_str()?.to_ascii_lowercase();
    let host = host.as_str();
    let segs = segments(url);

    match provider {
        SiteType::Greenhouse if GREENHOUSE_BOARD_HOSTS.contains(&host) => {
            if segs.first() == Some(&"embed") {
                // boards.greenhouse.io/embed/job_board?for=<slug>
                url.query_pairs()
                    .find(|(k, _)| k == "for")
                    .and_then(|(_, v)| valid_slug(&v))
            } else {
                segs.first().and_then(|s| valid_slug(s))
            }
        }
        SiteType::Greenhouse if GREENHOUSE_API_HOSTS.contains(&host) => {
            // /v1/boards/<slug>/jobs
            let idx = segs.iter().position(|s| *s == "boards")?;
            segs.get(idx + 1).and_then(|s| valid_slug(s))
        }
        SiteType::Lever if LEVER_BOARD_HOSTS.contains(&host) => {
            segs.first().and_then(|s| valid_slug(s))
        }
        SiteType::Lever if LEVER_API_HOSTS.contains(&host) => {
            // /v0/postings/<slug>
            let idx = segs.iter().position(|s| *s == "postings")?;
            segs.get(idx + 1).and_then(|s| valid_slug(s))
        }
        SiteType::Ashby if ASHBY_BOARD_HOSTS.contains(&host) => {
            segs.first().and_then(|s| valid_slug(s))
        }
        SiteType::Ashby if ASHBY_API_HOSTS.contains(&host) => {
            // /posting-api/job-board/<slug>
            let idx = segs.iter().position(|s| *s == "job-board")?;
            segs.get(idx + 1).and_then(|s| valid_slug(s))
        }
        _ => None,
    }
}

/// Resolve the hosted board behind a URL.
///
/// The declared site type is tried first; a generic or mistyped site whose
/// host belongs to a provider is still recognised by host.
pub fn resolve_board(url: &Url, site_type: SiteType) -> Option<(SiteType, String)> {
    if site_type.is_known_provider() {
        if let Some(slug) = provider_slug(url, site_type) {
            return Some((site_type, slug));
        }
    }
    let detected = provider_for_host(url.host_str()?)?;
    provider_slug(url, detected).map(|slug| (detected, slug))
}

fn board_url(provider: SiteType, slug: &str) -> String {
    match provider {
        SiteType::Greenhouse => format!("https://boards.greenhouse.io/{}", slug),
        SiteType::Lever => format!("https://jobs.lever.co/{}", slug),
        SiteType::Ashby => format!("https://jobs.ashbyhq.com/{}", slug),
        SiteType::Generic => slug.to_string(),
    }
}

fn normalize_generic(mut url: Url) -> String {
    url.set_fragment(None);
    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }
    if url.query() == Some("") {
        url.set_query(None);
    }
    url.to_string()
}

/// Collapse a site URL into its canonical form.
///
/// Unparseable input is returned trimmed, so it still dedupes by exact text.
pub fn normalize(raw: &str, site_type: SiteType) -> String {
    let Some(url) = parse_lenient(raw) else {
        return raw.trim().to_string();
    };
    match resolve_board(&url, site_type) {
        Some((provider, slug)) => board_url(provider, &slug),
        None => normalize_generic(url),
    }
}

/// Deduplication identity: `provider:slug` for hosted boards, otherwise the
/// normalized URL itself.
pub fn canonical_key(normalized: &str, site_type: SiteType) -> String {
    match parse_lenient(normalized).and_then(|u| resolve_board(&u, site_type)) {
        Some((provider, slug)) => format!("{}:{}", provider.as_str(), slug),
        None => normalized.to_string(),
    }
}

/// Best-effort site type from a URL's host.
pub fn detect_site_type(raw: &str) -> SiteType {
    parse_lenient(raw)
        .and_then(|u| u.host_str().and_then(provider_for_host))
        .unwrap_or(SiteType::Generic)
}

/// Human-readable fallback name for a site with none recorded.
pub fn default_name(normalized: &str, site_type: SiteType) -> String {
    let Some(url) = parse_lenient(normalized) else {
        return normalized.to_string();
    };
    if let Some((_, slug)) = resolve_board(&url, site_type) {
        return slug;
    }
    url.host_str()
        .map(|h| h.trim_start_matches("www.").to_string())
        .unwrap_or_else(|| normalized.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greenhouse_variants_collapse() {
        let expected = "https://boards.greenhouse.io/acme";
        for raw in [
            "https://boards.greenhouse.io/acme",
            "https://boards.greenhouse.io/acme/",
            "https://job-boards.greenhouse.io/acme?gh_src=abc",
            "https://boards-api.greenhouse.io/v1/boards/acme/jobs?content=true",
            "https://api.greenhouse.io/v1/boards/Acme",
            "https://boards.greenhouse.io/embed/job_board?for=acme",
            "boards.greenhouse.io/acme/jobs/12345",
        ] {
            assert_eq!(normalize(raw, SiteType::Greenhouse), expected, "{raw}");
        }
        assert_eq!(canonical_key(expected, SiteType::Greenhouse), "greenhouse:acme");
    }

    #[test]
    fn lever_and_ashby_variants_collapse() {
        assert_eq!(
            normalize("https://api.lever.co/v0/postings/acme?mode=json", SiteType::Lever),
            "https://jobs.lever.co/acme"
        );
        assert_eq!(
            normalize(
                "https://api.ashbyhq.com/posting-api/job-board/acme",
                SiteType::Ashby
            ),
            "https://jobs.ashbyhq.com/acme"
        );
    }

    #[test]
    fn generic_sites_keep_query_strings() {
        let raw = "https://Careers.Example.com/search/?dept=eng&loc=remote#top";
        let norm = normalize(raw, SiteType::Generic);
        assert_eq!(norm, "https://careers.example.com/search?dept=eng&loc=remote");
        assert_eq!(canonical_key(&norm, SiteType::Generic), norm);
    }

    #[test]
    fn generic_type_with_provider_host_is_recognised() {
        let norm = normalize("https://jobs.lever.co/acme/", SiteType::Generic);
        assert_eq!(norm, "https://jobs.lever.co/acme");
        assert_eq!(canonical_key(&norm, SiteType::Generic), "lever:acme");
        assert_eq!(detect_site_type("https://jobs.lever.co/acme"), SiteType::Lever);
    }

    #[test]
    fn custom_domain_on_provider_type_falls_back_to_generic() {
        let norm = normalize("https://example.com/careers/", SiteType::Greenhouse);
        assert_eq!(norm, "https://example.com/careers");
        assert_eq!(canonical_key(&norm, SiteType::Greenhouse), norm);
    }

    #[test]
    fn unparseable_input_is_trimmed() {
        assert_eq!(normalize("  not a url  ", SiteType::Generic), "not a url");
    }

    #[test]
    fn extract_domain_keeps_full_hostname() {
        assert_eq!(
            extract_domain("https://Jobs.Example.com:8443/a?b=c").as_deref(),
            Some("jobs.example.com")
        );
        assert_eq!(extract_domain("mailto:someone@example.com"), None);
        assert_eq!(extract_domain("nonsense"), None);
    }

    #[test]
    fn default_names() {
        assert_eq!(
            default_name("https://boards.greenhouse.io/acme", SiteType::Greenhouse),
            "acme"
        );
        assert_eq!(
            default_name("https://www.example.com/jobs", SiteType::Generic),
            "example.com"
        );
    }
}
