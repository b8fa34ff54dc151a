//! Repository URL parsing shared by the git-hosting adapters

use crate::error::{Result, SourceError};
use url::Url;

const GITHUB_HOST: &str = "github.com";
const GITHUB_API: &str = "https://api.github.com";
const GITHUB_RAW: &str = "https://raw.githubusercontent.com";

/// `https://<host>/<owner>/<repo>` split into its parts
///
/// GitLab namespaces can nest, so `owner` may itself contain slashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoLocation {
    origin: String,
    host: String,
    pub owner: String,
    pub repo: String,
}

impl RepoLocation {
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw.trim()).map_err(|e| {
            SourceError::invalid_source(format!("'{}' is not a valid repository URL: {}", raw, e))
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(SourceError::Core(cairn_core::Error::unsupported_scheme(
                raw,
                url.scheme(),
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| SourceError::invalid_source(format!("'{}' has no host", raw)))?
            .to_lowercase();

        let segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).collect())
            .unwrap_or_default();

        if segments.len() < 2 {
            return Err(SourceError::invalid_source(format!(
                "'{}' must point at a repository (<host>/<owner>/<repo>)",
                raw
            )));
        }

        let last = segments.len() - 1;
        let repo = segments[last].trim_end_matches(".git").to_string();
        let owner = segments[..last].join("/");

        Ok(Self {
            origin: url.origin().ascii_serialization(),
            host,
            owner,
            repo,
        })
    }

    pub fn is_github_dot_com(&self) -> bool {
        self.host == GITHUB_HOST || self.host == "www.github.com"
    }

    /// `owner/repo`
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Browser URL of the repository
    pub fn web_url(&self) -> String {
        format!("{}/{}", self.origin, self.full_name())
    }

    /// REST base: `api.github.com` for github.com, `/api/v3` on Enterprise hosts
    pub fn github_api_base(&self) -> String {
        if self.is_github_dot_com() {
            GITHUB_API.to_string()
        } else {
            format!("{}/api/v3", self.origin)
        }
    }

    pub fn gitlab_api_base(&self) -> String {
        format!("{}/api/v4", self.origin)
    }

    /// Project path as GitLab expects it in `/projects/:id`
    pub fn encoded_project_path(&self) -> String {
        self.full_name().replace('/', "%2F")
    }

    /// Raw file URL on a GitHub host
    pub fn github_raw_url(&self, branch: &str, path: &str) -> String {
        let path = path.trim_start_matches('/');
        if self.is_github_dot_com() {
            format!("{}/{}/{}/{}", GITHUB_RAW, self.full_name(), branch, path)
        } else {
            format!("{}/{}/raw/{}/{}", self.origin, self.full_name(), branch, path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_github_dot_com() {
        let loc = RepoLocation::parse("https://GitHub.com/acme/prompts.git/").unwrap();
        assert!(loc.is_github_dot_com());
        assert_eq!(loc.owner, "acme");
        assert_eq!(loc.repo, "prompts");
        assert_eq!(loc.github_api_base(), "https://api.github.com");
        assert_eq!(
            loc.github_raw_url("main", "/collections/a.collection.yml"),
            "https://raw.githubusercontent.com/acme/prompts/main/collections/a.collection.yml"
        );
    }

    #[test]
    fn test_parse_enterprise_host() {
        let loc = RepoLocation::parse("http://127.0.0.1:8080/acme/prompts").unwrap();
        assert!(!loc.is_github_dot_com());
        assert_eq!(loc.github_api_base(), "http://127.0.0.1:8080/api/v3");
        assert_eq!(loc.gitlab_api_base(), "http://127.0.0.1:8080/api/v4");
        assert_eq!(
            loc.github_raw_url("dev", "x.yml"),
            "http://127.0.0.1:8080/acme/prompts/raw/dev/x.yml"
        );
    }

    #[test]
    fn test_nested_gitlab_namespace() {
        let loc = RepoLocation::parse("https://gitlab.example.com/group/sub/project").unwrap();
        assert_eq!(loc.owner, "group/sub");
        assert_eq!(loc.repo, "project");
        assert_eq!(loc.encoded_project_path(), "group%2Fsub%2Fproject");
    }

    #[test]
    fn test_rejects_non_repository_urls() {
        assert!(RepoLocation::parse("https://github.com/acme").is_err());
        assert!(RepoLocation::parse("not a url").is_err());
        assert!(RepoLocation::parse("ssh://github.com/acme/prompts").is_err());
    }
}
