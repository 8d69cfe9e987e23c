use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

/// One entry of the reading queue. Identity is the normalized `href`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    pub author: String,
    pub href: String,
}

/// An archived article and the document written for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleSummary {
    pub title: String,
    pub author: String,
    pub href: String,
    pub document: PathBuf,
}

impl ArticleSummary {
    pub fn new(article: &Article, document: PathBuf) -> Self {
        Self {
            title: article.title.clone(),
            author: article.author.clone(),
            href: article.href.clone(),
            document,
        }
    }
}

/// Scheme + host of an absolute URL, e.g. `https://medium.com`.
static ORIGIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?i)(https?)://[^/?#\s]+").unwrap());

/// Characters that are not allowed in file names on common filesystems
/// (FAT32 e-reader volumes included).
static UNSAFE_FILENAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\?%*:|"<>\x00-\x1f]"#).unwrap());

/// Extract the origin of an absolute URL. `None` for relative input.
pub fn origin(url: &str) -> Option<&str> {
    ORIGIN_RE.find(url).map(|m| m.as_str())
}

/// Resolve an item link against the queue page URL.
///
/// - absolute `http(s)://` links are kept as-is
/// - protocol-relative `//host/path` inherits the base scheme
/// - `/path` is joined to the base origin
/// - anything else is treated as relative to the origin root
pub fn normalize_href(href: &str, base: &str) -> String {
    let href = href.trim();
    if origin(href).is_some() {
        return href.to_string();
    }
    let base_origin = origin(base).unwrap_or(base).trim_end_matches('/');
    if let Some(rest) = href.strip_prefix("//") {
        let scheme = base_origin.split("://").next().unwrap_or("https");
        return format!("{scheme}://{rest}");
    }
    if href.starts_with('/') {
        format!("{base_origin}{href}")
    } else {
        format!("{base_origin}/{href}")
    }
}

/// Longest stem in bytes. NAME_MAX is 255 on common filesystems; the rest is
/// left for a ` (n)` suffix and the extension.
pub const MAX_STEM_BYTES: usize = 240;

/// Turn an article title into a file name stem.
///
/// Unsafe characters become `-`, whitespace runs collapse to one space, and
/// the result is cut on a character boundary to [`MAX_STEM_BYTES`].
pub fn sanitize_filename(title: &str) -> String {
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");
    let replaced = UNSAFE_FILENAME_RE.replace_all(&collapsed, "-");
    let trimmed = replaced.trim_matches(|c: char| c == '.' || c == ' ');
    let end = trimmed
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|&end| end <= MAX_STEM_BYTES)
        .last()
        .unwrap_or(0);
    let stem = trimmed[..end].trim_end_matches(|c: char| c == '.' || c == ' ');
    if stem.is_empty() {
        "untitled".to_string()
    } else {
        stem.to_string()
    }
}
