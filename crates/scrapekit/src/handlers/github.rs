//! GitHub handler
//!
//! Rewrites `github.com` page URLs to the equivalent REST API endpoint so the
//! caller receives JSON instead of a rendered page.

use crate::error::ScrapeError;
use crate::handlers::{Handler, HandlerContext, HandlerOutcome};
use crate::types::ScrapeRequest;
use async_trait::async_trait;
use url::Url;

/// Public GitHub REST API
const DEFAULT_API_BASE: &str = "https://api.github.com";

/// REST API version header value
const API_VERSION: &str = "2022-11-28";

/// Repository path patterns and their API templates
///
/// Patterns are matched against the path after `/{owner}/{repo}`. A `{name}`
/// segment captures one path segment, `{name*}` captures the rest of the
/// path and must come last. Templates are appended to
/// `/repos/{owner}/{repo}`. The first matching pattern wins.
pub const GITHUB_ROUTES: &[(&str, &str)] = &[
    ("", ""),
    ("branches", "branches"),
    ("branches/{branch*}", "branches/{branch}"),
    ("tree/{branch*}", "branches/{branch}"),
    ("blob/{branch}/{path*}", "contents/{path}?ref={branch}"),
    ("contents", "contents"),
    ("contents/{path*}", "contents/{path}"),
    ("commits", "commits"),
    ("commits/{sha}", "commits/{sha}"),
    ("commit/{sha}", "commits/{sha}"),
    ("tags", "tags"),
    ("compare/{spec*}", "compare/{spec}"),
    ("issues", "issues"),
    ("issues/{number}", "issues/{number}"),
    ("pulls", "pulls"),
    ("pull/{number}", "pulls/{number}"),
    ("pulls/{number}", "pulls/{number}"),
    ("releases", "releases"),
    ("releases/latest", "releases/latest"),
    ("releases/tag/{tag}", "releases/tags/{tag}"),
    ("releases/tags/{tag}", "releases/tags/{tag}"),
    ("stargazers", "stargazers"),
    ("watchers", "subscribers"),
    ("subscribers", "subscribers"),
    ("contributors", "contributors"),
    ("graphs/contributors", "contributors"),
    ("languages", "languages"),
    ("topics", "topics"),
    ("license", "license"),
    ("readme", "readme"),
    ("actions", "actions/runs"),
    ("actions/workflows", "actions/workflows"),
    ("actions/workflows/{workflow}", "actions/workflows/{workflow}"),
    ("actions/runs", "actions/runs"),
    ("actions/runs/{run}", "actions/runs/{run}"),
    ("milestones", "milestones"),
    ("milestone/{number}", "milestones/{number}"),
    ("milestones/{number}", "milestones/{number}"),
    ("projects", "projects"),
    ("security/advisories", "security-advisories"),
    ("security/advisories/{ghsa}", "security-advisories/{ghsa}"),
];

/// First path segments that are site pages rather than users or owners
const RESERVED_OWNERS: &[&str] = &[
    "about",
    "collections",
    "codespaces",
    "enterprise",
    "events",
    "explore",
    "features",
    "issues",
    "join",
    "login",
    "marketplace",
    "notifications",
    "organizations",
    "pricing",
    "pulls",
    "security",
    "settings",
    "sponsors",
    "team",
    "topics",
    "trending",
];

/// Handler for `github.com` and `api.github.com`
///
/// - `api.github.com` URLs pass through unchanged
/// - `github.com/{user}` maps to `/users/{user}`
/// - `github.com/{owner}/{repo}/...` maps through [`GITHUB_ROUTES`], falling
///   back to the repository endpoint for unknown sub-paths
///
/// Every request carries the GitHub JSON media type and, when the
/// `github_token` valve is set, a bearer token.
#[derive(Debug, Clone)]
pub struct GitHubHandler {
    api_base: String,
}

impl GitHubHandler {
    /// Create a handler for the public GitHub API
    pub fn new() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Create a handler for a different API base (GitHub Enterprise, tests)
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    /// Map a GitHub URL to its API endpoint
    ///
    /// Returns `None` for URLs with no API equivalent (the site root and
    /// site pages such as `/features` or `/settings/profile`).
    pub fn build_api_url(&self, url: &Url) -> Option<String> {
        if url.host_str() == Some("api.github.com") {
            return Some(url.to_string());
        }

        let segments: Vec<&str> = url
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        if segments
            .first()
            .is_some_and(|owner| RESERVED_OWNERS.contains(owner))
        {
            return None;
        }

        match segments.as_slice() {
            [] => None,
            [user] => Some(format!("{}/users/{}", self.api_base, user)),
            [owner, repo, rest @ ..] => {
                let repo = repo.strip_suffix(".git").unwrap_or(*repo);
                let base = format!("{}/repos/{}/{}", self.api_base, owner, repo);
                match map_repo_path(rest) {
                    Some(tail) if tail.is_empty() => Some(base),
                    Some(tail) => Some(format!("{}/{}", base, tail)),
                    None => {
                        tracing::debug!(url = %url, "Unmapped GitHub path, using repository endpoint");
                        Some(base)
                    }
                }
            }
        }
    }
}

impl Default for GitHubHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Find the first route matching `rest` and fill in its template
fn map_repo_path(rest: &[&str]) -> Option<String> {
    GITHUB_ROUTES
        .iter()
        .find_map(|(pattern, template)| match_route(pattern, rest).map(|c| fill(template, &c)))
}

/// Match path segments against a pattern, returning the captures
fn match_route(pattern: &str, segments: &[&str]) -> Option<Vec<(String, String)>> {
    let parts: Vec<&str> = pattern.split('/').filter(|p| !p.is_empty()).collect();
    let mut captures = Vec::new();

    for (index, part) in parts.iter().enumerate() {
        if let Some(name) = part.strip_prefix('{').and_then(|p| p.strip_suffix("*}")) {
            let remaining = segments.get(index..).filter(|r| !r.is_empty())?;
            captures.push((name.to_string(), remaining.join("/")));
            return Some(captures);
        }

        let segment = segments.get(index)?;
        match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            Some(name) => captures.push((name.to_string(), segment.to_string())),
            None if part == segment => {}
            None => return None,
        }
    }

    (segments.len() == parts.len()).then_some(captures)
}

fn fill(template: &str, captures: &[(String, String)]) -> String {
    captures
        .iter()
        .fold(template.to_string(), |acc, (name, value)| {
            acc.replace(&format!("{{{}}}", name), value)
        })
}

#[async_trait]
impl Handler for GitHubHandler {
    fn name(&self) -> &'static str {
        "github"
    }

    fn domain_suffixes(&self) -> &[&str] {
        &["github.com"]
    }

    fn matches(&self, host: &str) -> bool {
        host == "github.com" || host == "www.github.com" || host == "api.github.com"
    }

    async fn handle(
        &self,
        request: &ScrapeRequest,
        ctx: &HandlerContext<'_>,
    ) -> Result<HandlerOutcome, ScrapeError> {
        let url = Url::parse(&request.url).map_err(|e| ScrapeError::InvalidUrl(e.to_string()))?;
        let api_url = self.build_api_url(&url).ok_or_else(|| {
            ScrapeError::HandlerError(format!("No GitHub API endpoint for {}", request.url))
        })?;

        tracing::debug!(url = %request.url, api_url = %api_url, "Rewrote GitHub URL");

        let mut api_request = request
            .with_url(api_url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(ref token) = ctx.valves.github_token {
            api_request = api_request.bearer(token.clone());
        }

        Ok(HandlerOutcome::Delegate(api_request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(url: &str) -> Option<String> {
        GitHubHandler::new().build_api_url(&Url::parse(url).unwrap())
    }

    #[test]
    fn test_repo_root() {
        assert_eq!(
            api("https://github.com/rust-lang/rust"),
            Some("https://api.github.com/repos/rust-lang/rust".to_string())
        );
        assert_eq!(
            api("https://github.com/rust-lang/rust.git"),
            Some("https://api.github.com/repos/rust-lang/rust".to_string())
        );
        assert_eq!(
            api("https://github.com/rust-lang/rust/"),
            Some("https://api.github.com/repos/rust-lang/rust".to_string())
        );
    }

    #[test]
    fn test_user() {
        assert_eq!(
            api("https://github.com/octocat"),
            Some("https://api.github.com/users/octocat".to_string())
        );
    }

    #[test]
    fn test_site_root_has_no_endpoint() {
        assert_eq!(api("https://github.com/"), None);
    }

    #[test]
    fn test_tree_maps_to_branches() {
        assert_eq!(
            api("https://github.com/owner/repo/tree/main"),
            Some("https://api.github.com/repos/owner/repo/branches/main".to_string())
        );
        assert_eq!(
            api("https://github.com/owner/repo/tree/feature/login"),
            Some("https://api.github.com/repos/owner/repo/branches/feature/login".to_string())
        );
    }

    #[test]
    fn test_blob_maps_to_contents_with_ref() {
        assert_eq!(
            api("https://github.com/owner/repo/blob/main/src/lib.rs"),
            Some("https://api.github.com/repos/owner/repo/contents/src/lib.rs?ref=main".to_string())
        );
    }

    #[test]
    fn test_renamed_routes() {
        let cases = [
            ("pull/42", "pulls/42"),
            ("commit/abc123", "commits/abc123"),
            ("releases/tag/v1.0.0", "releases/tags/v1.0.0"),
            ("actions", "actions/runs"),
            ("security/advisories", "security-advisories"),
            ("milestone/3", "milestones/3"),
            ("watchers", "subscribers"),
            ("compare/main...dev", "compare/main...dev"),
            ("issues/7", "issues/7"),
        ];
        for (path, expected) in cases {
            assert_eq!(
                api(&format!("https://github.com/o/r/{}", path)),
                Some(format!("https://api.github.com/repos/o/r/{}", expected)),
                "path {}",
                path
            );
        }
    }

    #[test]
    fn test_unknown_subpath_falls_back_to_repo() {
        assert_eq!(
            api("https://github.com/owner/repo/wiki/Home"),
            Some("https://api.github.com/repos/owner/repo".to_string())
        );
        assert_eq!(
            api("https://github.com/owner/repo/issues/7/comments/extra"),
            Some("https://api.github.com/repos/owner/repo".to_string())
        );
        assert_eq!(
            api("https://github.com/owner/repo/archive/refs/heads/main.tar.gz"),
            Some("https://api.github.com/repos/owner/repo".to_string())
        );
    }

    #[test]
    fn test_site_pages_have_no_endpoint() {
        assert_eq!(api("https://github.com/features"), None);
        assert_eq!(api("https://github.com/login"), None);
        assert_eq!(api("https://github.com/settings/profile"), None);
        assert_eq!(api("https://github.com/explore/topics"), None);
        assert_eq!(
            api("https://github.com/octocat/features"),
            Some("https://api.github.com/repos/octocat/features".to_string())
        );
    }

    #[test]
    fn test_api_urls_pass_through() {
        assert_eq!(
            api("https://api.github.com/repos/a/b/issues?state=open"),
            Some("https://api.github.com/repos/a/b/issues?state=open".to_string())
        );
    }

    #[test]
    fn test_custom_api_base() {
        let handler = GitHubHandler::with_api_base("http://127.0.0.1:9000/");
        assert_eq!(
            handler.build_api_url(&Url::parse("https://github.com/a/b/pulls").unwrap()),
            Some("http://127.0.0.1:9000/repos/a/b/pulls".to_string())
        );
    }

    #[test]
    fn test_match_route() {
        assert_eq!(match_route("", &[]), Some(vec![]));
        assert_eq!(match_route("issues", &["pulls"]), None);
        assert_eq!(match_route("issues/{n}", &["issues"]), None);
        assert_eq!(match_route("tree/{b*}", &["tree"]), None);
        assert_eq!(
            match_route("blob/{b}/{p*}", &["blob", "main", "a", "b.rs"]),
            Some(vec![
                ("b".to_string(), "main".to_string()),
                ("p".to_string(), "a/b.rs".to_string())
            ])
        );
    }

    #[test]
    fn test_matches_hosts() {
        let handler = GitHubHandler::new();
        assert!(handler.matches("github.com"));
        assert!(handler.matches("api.github.com"));
        assert!(!handler.matches("gist.github.com"));
        assert!(!handler.matches("raw.githubusercontent.com"));
    }
}
