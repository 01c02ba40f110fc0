//! Turns a [`RawEntry`] into a [`NormalizedEntry`]: absolute vs. relative,
//! path/query/hash decomposition, base-path stripping, percent-encoding and
//! the trailing-slash policy.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat};
use data_model_smap::config::SitemapConfig;
use data_model_smap::entry::{Alternate, EntryMeta, ParsedLoc, RawEntry};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use url::Url;

use crate::errors::{Result, SitemapError};

/// Characters percent-encoded in a path. `%` is included because valid
/// escapes are copied through before the set is applied.
const PATH_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Global policy that every normalization run shares.
#[derive(Debug, Clone, Default)]
pub struct NormalizePolicy {
    /// Configured site origin; absolute entries on it become relative.
    pub site_origin: Option<Url>,
    /// Base path without a trailing slash, empty when mounted at `/`.
    pub base_path: String,
    pub trailing_slash: Option<bool>,
}

impl NormalizePolicy {
    pub fn from_config(config: &SitemapConfig) -> Result<Self> {
        let site_origin = config.site_url.as_deref().map(Url::parse).transpose()?;
        Ok(Self {
            site_origin,
            base_path: config.base_url.trim_end_matches('/').to_string(),
            trailing_slash: config.trailing_slash,
        })
    }

    /// Apply the trailing-slash policy to a pathname.
    pub fn apply_trailing_slash(&self, pathname: &str) -> String {
        match self.trailing_slash {
            Some(true) if !pathname.ends_with('/') => format!("{pathname}/"),
            Some(true) => {
                let trimmed = pathname.trim_end_matches('/');
                format!("{trimmed}/")
            }
            Some(false) if pathname.len() > 1 => {
                let trimmed = pathname.trim_end_matches('/');
                if trimmed.is_empty() { "/".to_string() } else { trimmed.to_string() }
            }
            _ => pathname.to_string(),
        }
    }
}

/// An entry after URL normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEntry {
    /// Root-relative location, or the full URL for external entries.
    pub loc: String,
    pub path: ParsedLoc,
    pub meta: EntryMeta,
    pub i18n_transform: Option<bool>,
    pub sitemap: Option<String>,
    pub alternatives: Option<Vec<Alternate>>,
    pub encoded: bool,
}

impl NormalizedEntry {
    pub fn is_external(&self) -> bool {
        self.path.is_absolute()
    }
}

/// Normalize one raw entry. Pure: the same entry and policy always produce
/// the same result.
///
/// # Errors
///
/// Returns [`SitemapError::MalformedEntry`] for empty locations and for
/// absolute URLs that are not `http(s)`.
pub fn normalize_entry(raw: RawEntry, policy: &NormalizePolicy) -> Result<NormalizedEntry> {
    let input = raw.into_input();
    let loc = input.loc.trim();
    if loc.is_empty() {
        return Err(malformed(loc, "empty location"));
    }

    let meta = normalize_meta(input.meta, loc);
    let alternatives = input.alternatives.map(|alternatives| {
        alternatives
            .into_iter()
            .map(|alt| {
                let href = match parse_location(&alt.href, input.encoded, policy) {
                    Ok(Location::Relative(path)) => path.relative(),
                    Ok(Location::External(loc, _)) => loc,
                    Err(_) => alt.href,
                };
                Alternate::new(alt.hreflang, href)
            })
            .collect()
    });

    let (loc, path) = match parse_location(loc, input.encoded, policy)? {
        Location::External(loc, path) => (loc, path),
        Location::Relative(path) => (path.relative(), path),
    };

    Ok(NormalizedEntry {
        loc,
        path,
        meta,
        i18n_transform: input.i18n_transform,
        sitemap: input.sitemap,
        alternatives,
        encoded: input.encoded,
    })
}

enum Location {
    External(String, ParsedLoc),
    Relative(ParsedLoc),
}

fn parse_location(loc: &str, encoded: bool, policy: &NormalizePolicy) -> Result<Location> {
    let candidate = if loc.starts_with("//") {
        format!("https:{loc}")
    } else {
        loc.to_string()
    };

    match Url::parse(&candidate) {
        Ok(url) => {
            if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
                return Err(malformed(loc, "unsupported URL scheme"));
            }
            let same_origin = policy
                .site_origin
                .as_ref()
                .is_some_and(|site| site.origin() == url.origin());
            if same_origin {
                let relative = format!(
                    "{}{}{}",
                    url.path(),
                    url.query().map(|q| format!("?{q}")).unwrap_or_default(),
                    url.fragment().map(|f| format!("#{f}")).unwrap_or_default()
                );
                return Ok(Location::Relative(parse_relative(&relative, encoded, policy)));
            }
            Ok(Location::External(
                if encoded { loc.to_string() } else { url.to_string() },
                parse_absolute(&url),
            ))
        }
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Ok(Location::Relative(parse_relative(loc, encoded, policy)))
        }
        Err(e) => Err(malformed(loc, &e.to_string())),
    }
}

fn parse_absolute(url: &Url) -> ParsedLoc {
    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        _ => String::new(),
    };
    ParsedLoc {
        scheme: url.scheme().to_string(),
        host,
        pathname: url.path().to_string(),
        search: url.query().map(|q| format!("?{q}")).unwrap_or_default(),
        hash: url.fragment().map(|f| format!("#{f}")).unwrap_or_default(),
    }
}

fn parse_relative(loc: &str, encoded: bool, policy: &NormalizePolicy) -> ParsedLoc {
    let (rest, hash) = match loc.find('#') {
        Some(i) => (&loc[..i], loc[i..].to_string()),
        None => (loc, String::new()),
    };
    let (pathname, search) = match rest.find('?') {
        Some(i) => (&rest[..i], rest[i..].to_string()),
        None => (rest, String::new()),
    };

    let mut pathname = if pathname.starts_with('/') {
        pathname.to_string()
    } else {
        format!("/{pathname}")
    };
    pathname = strip_base(&pathname, &policy.base_path);
    if !encoded {
        pathname = encode_path(&pathname);
    }
    pathname = policy.apply_trailing_slash(&pathname);

    ParsedLoc {
        pathname,
        search: if search == "?" { String::new() } else { search },
        hash: if hash == "#" { String::new() } else { hash },
        ..Default::default()
    }
}

/// Strip the base path once.
fn strip_base(pathname: &str, base_path: &str) -> String {
    if base_path.is_empty() {
        return pathname.to_string();
    }
    match pathname.strip_prefix(base_path) {
        Some("") => "/".to_string(),
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => pathname.to_string(),
    }
}

/// Percent-encode a path, leaving existing `%XX` escapes and the path
/// separator untouched.
pub fn encode_path(path: &str) -> String {
    let bytes = path.as_bytes();
    let mut out = String::with_capacity(path.len());
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let is_escape = bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit();
        if is_escape {
            out.extend(utf8_percent_encode(&path[start..i], PATH_ENCODE_SET));
            out.push_str(&path[i..i + 3]);
            i += 3;
            start = i;
        } else {
            i += 1;
        }
    }
    out.extend(utf8_percent_encode(&path[start..], PATH_ENCODE_SET));
    out
}

fn normalize_meta(mut meta: EntryMeta, loc: &str) -> EntryMeta {
    if let Some(lastmod) = meta.lastmod.take() {
        meta.lastmod = normalize_lastmod(&lastmod);
        if meta.lastmod.is_none() {
            tracing::warn!(loc = %loc, lastmod = %lastmod, "dropping invalid lastmod");
        }
    }
    if let Some(priority) = meta.priority {
        if priority.is_nan() {
            tracing::warn!(loc = %loc, "dropping NaN priority");
            meta.priority = None;
        } else if !(0.0..=1.0).contains(&priority) {
            tracing::warn!(loc = %loc, priority = %priority, "clamping priority into 0.0-1.0");
            meta.priority = Some(priority.clamp(0.0, 1.0));
        }
    }
    meta
}

/// Validate a lastmod value: RFC 3339 date-times are kept as given, naive
/// date-times are read as UTC, bare dates are kept. Anything else is `None`.
pub fn normalize_lastmod(value: &str) -> Option<String> {
    let value = value.trim();
    if DateTime::parse_from_rfc3339(value).is_ok() {
        return Some(value.to_string());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true));
        }
    }
    if NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok() {
        return Some(value.to_string());
    }
    None
}

fn malformed(loc: &str, reason: &str) -> SitemapError {
    SitemapError::MalformedEntry {
        loc: loc.to_string(),
        reason: reason.to_string(),
    }
}
