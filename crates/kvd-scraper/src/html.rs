//! Regex-based HTML queries for listing and detail pages.

use std::sync::LazyLock;

use kvd_core::ImageSource;
use regex::Regex;

static SCRIPT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b[^>]*>(.*?)</script>").expect("valid regex"));
static ANCHOR_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<a\b[^>]*>").expect("valid regex"));
static META_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("valid regex"));

/// Marker identifying the script that carries the embedded store state.
pub const STORE_MARKER: &str = "storeObjects";

/// Path prefix of auction detail links on the listing page.
pub const DETAIL_PATH_PREFIX: &str = "/auktioner/";

/// Hostname fragment of the image CDN used as the last image fallback.
const IMAGE_CDN_FRAGMENT: &str = "imgix.net";

/// Text content of every `<script>` element, in document order.
#[must_use]
pub fn script_bodies(html: &str) -> Vec<&str> {
    SCRIPT_RE
        .captures_iter(html)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .filter(|body| !body.trim().is_empty())
        .collect()
}

/// Script bodies that mention [`STORE_MARKER`].
#[must_use]
pub fn store_scripts(html: &str) -> Vec<&str> {
    script_bodies(html)
        .into_iter()
        .filter(|body| body.contains(STORE_MARKER))
        .collect()
}

/// Absolute URLs of `a[href^="/auktioner/"]` links, de-duplicated in
/// first-seen order.
#[must_use]
pub fn detail_links(html: &str, base_url: &str) -> Vec<String> {
    let base = base_url.trim_end_matches('/');
    let mut seen = std::collections::HashSet::new();
    ANCHOR_TAG_RE
        .find_iter(html)
        .filter_map(|m| extract_attr(m.as_str(), "href"))
        .filter(|href| href.starts_with(DETAIL_PATH_PREFIX))
        .map(|href| format!("{base}{}", decode_amp(&href)))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

/// `content` of the first `<meta>` whose `key_attr` equals `key_value`.
#[must_use]
pub fn find_meta_content(html: &str, key_attr: &str, key_value: &str) -> Option<String> {
    find_meta(html, |tag| {
        extract_attr(tag, key_attr).is_some_and(|k| k.eq_ignore_ascii_case(key_value))
    })
}

fn find_meta<P>(html: &str, predicate: P) -> Option<String>
where
    P: Fn(&str) -> bool,
{
    let tag = META_TAG_RE
        .find_iter(html)
        .map(|m| m.as_str())
        .find(|tag| predicate(tag))?;
    extract_attr(tag, "content")
        .filter(|c| !c.is_empty())
        .map(|c| decode_amp(&c))
}

/// Resolves the main image URL, trying in order: the store entry's
/// `previewImage`, `og:image` by property, the react-helmet `og:image`,
/// `og:image` by name, and finally any `<meta>` content on the image CDN.
#[must_use]
pub fn resolve_main_image(html: &str, preview_image: Option<&str>) -> Option<(String, ImageSource)> {
    if let Some(url) = preview_image.map(str::trim).filter(|u| !u.is_empty()) {
        return Some((url.to_string(), ImageSource::StoreDataPreviewImage));
    }
    if let Some(url) = find_meta_content(html, "property", "og:image") {
        return Some((url, ImageSource::MetaOgImage));
    }
    if let Some(url) = find_meta(html, |tag| {
        extract_attr(tag, "property").is_some_and(|p| p.eq_ignore_ascii_case("og:image"))
            && extract_attr(tag, "data-react-helmet").is_some_and(|v| v == "true")
    }) {
        return Some((url, ImageSource::MetaReactHelmet));
    }
    if let Some(url) = find_meta_content(html, "name", "og:image") {
        return Some((url, ImageSource::MetaNameOgImage));
    }
    META_TAG_RE
        .find_iter(html)
        .filter_map(|m| extract_attr(m.as_str(), "content"))
        .find(|content| content.contains(IMAGE_CDN_FRAGMENT))
        .map(|url| (decode_amp(&url), ImageSource::MetaImgixNet))
}

fn extract_attr(tag: &str, attr: &str) -> Option<String> {
    let pattern = format!(
        r#"(?is)(?:^|[\s<])(?:{})\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#,
        regex::escape(attr)
    );
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(tag)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str().trim().to_string())
}

fn decode_amp(s: &str) -> String {
    s.replace("&amp;", "&")
}
