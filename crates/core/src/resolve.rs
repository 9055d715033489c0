//! Dial target resolution for progress channels.
//!
//! Job payloads may embed a host from whatever environment produced them
//! (a dev port, another service). The authority is always re-derived from the
//! live API base so the same payload works everywhere.

use url::Url;

use crate::error::ResolveError;
use crate::machine::ChannelKind;

/// Where the application shell itself is served from.
///
/// Used as the fallback authority when the API base is relative, and as the
/// source of transport security for event streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageOrigin {
    pub secure: bool,
    /// `host[:port]`
    pub host: String,
}

impl PageOrigin {
    pub fn new(secure: bool, host: impl Into<String>) -> Self {
        Self {
            secure,
            host: host.into(),
        }
    }

    /// Parse an origin such as `https://app.example.com:8443`.
    pub fn parse(origin: &str) -> Result<Self, ResolveError> {
        let url = Url::parse(origin.trim()).map_err(|e| ResolveError::invalid(origin, e))?;
        let host = authority(&url).ok_or_else(|| ResolveError::invalid(origin, "origin has no host"))?;
        Ok(Self {
            secure: matches!(url.scheme(), "https" | "wss"),
            host,
        })
    }
}

impl Default for PageOrigin {
    fn default() -> Self {
        Self::new(false, "localhost")
    }
}

/// Resolve a raw stream address into the URL a channel of `kind` must dial.
///
/// - Absolute addresses already pointing at the target authority with the
///   resolved scheme pass through unchanged.
/// - Other absolute addresses keep only their path and query.
/// - Relative addresses are treated as root-relative.
pub fn resolve_stream_url(
    raw: &str,
    api_base: &str,
    page: &PageOrigin,
    kind: ChannelKind,
) -> Result<Url, ResolveError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ResolveError::EmptyAddress);
    }

    let base = absolute_base(api_base);
    let target = target_authority(base.as_ref(), api_base, page)?;
    let scheme = scheme_for(kind, base.as_ref(), page.secure);

    match Url::parse(raw) {
        Ok(url) if url.has_host() => {
            // Default ports are implicit in the authority, so the scheme must match exactly.
            if url.scheme() == scheme && authority(&url).as_deref() == Some(target.as_str()) {
                return Ok(url);
            }
            let mut path = url.path().to_string();
            if let Some(query) = url.query() {
                path.push('?');
                path.push_str(query);
            }
            splice(scheme, &target, &path, raw)
        }
        Ok(_) => Err(ResolveError::invalid(raw, "address has no host")),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let path = if raw.starts_with('/') {
                raw.to_string()
            } else {
                format!("/{raw}")
            };
            splice(scheme, &target, &path, raw)
        }
        Err(e) => Err(ResolveError::invalid(raw, e)),
    }
}

/// Build `<api-base>/progress-stream/?job_id=<id>[&token=<t>]` for an
/// event-stream channel.
pub fn event_stream_url(
    api_base: &str,
    page: &PageOrigin,
    job_id: &str,
    token: Option<&str>,
) -> Result<Url, ResolveError> {
    let base = absolute_base(api_base);
    let target = target_authority(base.as_ref(), api_base, page)?;
    let scheme = scheme_for(ChannelKind::EventStream, base.as_ref(), page.secure);

    let base_path = match &base {
        Some(b) => b.path().to_string(),
        None => api_base.trim().to_string(),
    };
    let base_path = base_path.trim_end_matches('/');
    let prefix = if base_path.is_empty() || base_path.starts_with('/') {
        ""
    } else {
        "/"
    };

    let mut url = splice(
        scheme,
        &target,
        &format!("{prefix}{base_path}/progress-stream/"),
        api_base,
    )?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("job_id", job_id);
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            query.append_pair("token", token);
        }
    }
    Ok(url)
}

fn absolute_base(api_base: &str) -> Option<Url> {
    Url::parse(api_base.trim())
        .ok()
        .filter(|u| u.has_host() && !u.cannot_be_a_base())
}

fn target_authority(base: Option<&Url>, api_base: &str, page: &PageOrigin) -> Result<String, ResolveError> {
    let target = match base {
        Some(b) => authority(b),
        None => Some(page.host.clone()).filter(|h| !h.is_empty()),
    };
    target.ok_or_else(|| ResolveError::NoHost {
        api_base: api_base.to_string(),
    })
}

fn scheme_for(kind: ChannelKind, base: Option<&Url>, page_secure: bool) -> &'static str {
    match kind {
        ChannelKind::EventStream => {
            if page_secure {
                "https"
            } else {
                "http"
            }
        }
        ChannelKind::Socket => {
            let secure = match base {
                Some(b) => matches!(b.scheme(), "https" | "wss"),
                None => page_secure,
            };
            if secure {
                "wss"
            } else {
                "ws"
            }
        }
    }
}

/// `host[:port]`, with the port only when it is not the scheme default.
fn authority(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn splice(scheme: &str, authority: &str, path: &str, original: &str) -> Result<Url, ResolveError> {
    Url::parse(&format!("{scheme}://{authority}{path}")).map_err(|e| ResolveError::invalid(original, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn https_page() -> PageOrigin {
        PageOrigin::new(true, "app.example.com")
    }

    fn http_page() -> PageOrigin {
        PageOrigin::new(false, "localhost:5173")
    }

    #[test]
    fn test_resolve_table() {
        use ChannelKind::{EventStream, Socket};

        let cases: &[(&str, &str, PageOrigin, ChannelKind, &str)] = &[
            // Stale embedded host is replaced by the API host
            (
                "wss://old-host:9999/stream/42",
                "https://api.example.com",
                https_page(),
                Socket,
                "wss://api.example.com/stream/42",
            ),
            // Socket scheme follows the API base, not the page
            (
                "/ws/jobs/7",
                "http://api.internal:8000/api",
                https_page(),
                Socket,
                "ws://api.internal:8000/ws/jobs/7",
            ),
            // Relative API base falls back to the page host and security
            (
                "/ws/jobs/7",
                "/api",
                https_page(),
                Socket,
                "wss://app.example.com/ws/jobs/7",
            ),
            (
                "ws/jobs/7",
                "/api",
                http_page(),
                Socket,
                "ws://localhost:5173/ws/jobs/7",
            ),
            // Event streams follow the page's security
            (
                "http://127.0.0.1:8000/progress-stream/?job_id=3",
                "http://api.example.com",
                https_page(),
                EventStream,
                "https://api.example.com/progress-stream/?job_id=3",
            ),
            // Already in final form: untouched
            (
                "wss://api.example.com/stream/42?x=1",
                "https://api.example.com",
                https_page(),
                Socket,
                "wss://api.example.com/stream/42?x=1",
            ),
            // Same host, plaintext scheme under a secure base: upgraded
            (
                "ws://api.example.com/stream/42",
                "https://api.example.com",
                https_page(),
                Socket,
                "wss://api.example.com/stream/42",
            ),
            // Same host but wrong family for the channel: rebuilt
            (
                "https://api.example.com/stream/42",
                "https://api.example.com",
                https_page(),
                Socket,
                "wss://api.example.com/stream/42",
            ),
        ];

        for (raw, base, page, kind, expected) in cases {
            let url = resolve_stream_url(raw, base, page, *kind).unwrap();
            assert_eq!(url.as_str(), *expected, "raw={raw} base={base}");
        }
    }

    #[test]
    fn test_resolve_errors() {
        assert_eq!(
            resolve_stream_url("  ", "https://api.example.com", &https_page(), ChannelKind::Socket),
            Err(ResolveError::EmptyAddress)
        );
        assert!(matches!(
            resolve_stream_url("/ws", "/api", &PageOrigin::new(true, ""), ChannelKind::Socket),
            Err(ResolveError::NoHost { .. })
        ));
        assert!(matches!(
            resolve_stream_url("mailto:someone", "https://api.example.com", &https_page(), ChannelKind::Socket),
            Err(ResolveError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_event_stream_url() {
        let url = event_stream_url("https://api.example.com/api/", &https_page(), "77", Some("tok en")).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/api/progress-stream/?job_id=77&token=tok+en"
        );

        let url = event_stream_url("/api", &http_page(), "77", None).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5173/api/progress-stream/?job_id=77");

        let url = event_stream_url("", &http_page(), "5", Some("")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5173/progress-stream/?job_id=5");
    }

    #[test]
    fn test_page_origin_parse() {
        assert_eq!(
            PageOrigin::parse("https://app.example.com:8443").unwrap(),
            PageOrigin::new(true, "app.example.com:8443")
        );
        assert_eq!(
            PageOrigin::parse("http://localhost").unwrap(),
            PageOrigin::new(false, "localhost")
        );
        assert!(PageOrigin::parse("not an origin").is_err());
    }
}
