//! Endpoint resolution for the chat socket.

use url::Url;

/// Resolve a configured endpoint into a socket URL.
///
/// Rewrites `http -> ws` and `https -> wss`, and appends the auth token as
/// a `token` query parameter when present. Best-effort: an endpoint that
/// does not parse is returned trimmed and unchanged, and an empty endpoint
/// resolves to an empty string (meaning "not configured").
#[must_use]
pub fn resolve_socket_url(endpoint: &str, token: Option<&str>) -> String {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };
    let scheme = match url.scheme() {
        "http" => Some("ws"),
        "https" => Some("wss"),
        _ => None,
    };
    if let Some(scheme) = scheme {
        // Both sides are "special" schemes, so this cannot fail.
        let _ = url.set_scheme(scheme);
    }
    if let Some(token) = token.filter(|t| !t.is_empty()) {
        url.query_pairs_mut().append_pair("token", token);
    }
    url.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_https_and_appends_token() {
        assert_eq!(
            resolve_socket_url("https://h/p", Some("tok")),
            "wss://h/p?token=tok"
        );
    }

    #[test]
    fn rewrites_http_without_token() {
        assert_eq!(resolve_socket_url("http://example.com/chat", None), "ws://example.com/chat");
        assert_eq!(
            resolve_socket_url("http://example.com/chat", Some("")),
            "ws://example.com/chat"
        );
    }

    #[test]
    fn keeps_ws_schemes() {
        assert_eq!(
            resolve_socket_url("wss://example.com/ws", None),
            "wss://example.com/ws"
        );
    }

    #[test]
    fn empty_endpoint_means_unconfigured() {
        assert_eq!(resolve_socket_url("", Some("tok")), "");
        assert_eq!(resolve_socket_url("   ", None), "");
    }

    #[test]
    fn unparseable_endpoint_is_returned_trimmed() {
        assert_eq!(resolve_socket_url("  not a url  ", Some("tok")), "not a url");
    }

    #[test]
    fn token_is_percent_encoded() {
        assert_eq!(
            resolve_socket_url("https://h/p", Some("a b&c")),
            "wss://h/p?token=a+b%26c"
        );
    }
}
