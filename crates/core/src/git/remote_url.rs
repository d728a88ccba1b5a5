//! Host-aware remote URL derivation.
//!
//! The hosting API normally returns each repository's ssh URL. When a
//! response omits it, the ssh URL is rebuilt from the API URL:
//!
//! - `https://api.github.com`        → host `github.com`
//! - `https://<host>/api/v1` (Gitea) → host `<host>`
//! - `https://<host>/api/v3` (GHES)  → host `<host>`
//! - anything else                   → the URL's own host
//!
//! giving `git@<host>:<owner>/<repo>.git`.

/// Derive the web base URL (scheme + host, no API path) from an API URL.
pub fn derive_web_base_url(api_url: &str) -> String {
    let url = api_url.trim().trim_end_matches('/');

    if url.eq_ignore_ascii_case("https://api.github.com") {
        return "https://github.com".to_string();
    }

    for suffix in ["/api/v1", "/api/v3"] {
        if let Some(base) = url.strip_suffix(suffix) {
            return base.to_string();
        }
    }

    url.to_string()
}

/// Host part of a URL: scheme, userinfo, port, and path removed.
pub fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let authority = rest.split('/').next().unwrap_or(rest);
    let authority = authority.rsplit_once('@').map(|(_, h)| h).unwrap_or(authority);
    authority.split(':').next().unwrap_or(authority)
}

/// Derive the ssh clone/push URL for `owner/repo` on the service behind `api_url`.
pub fn derive_ssh_url(api_url: &str, owner: &str, repo: &str) -> String {
    let base = derive_web_base_url(api_url);
    format!("git@{}:{}/{}.git", host_of(&base).to_ascii_lowercase(), owner, repo)
}
