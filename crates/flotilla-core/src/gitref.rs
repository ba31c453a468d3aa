//! Parsing of `host:owner/repo#ref` dependency strings.

use serde::{Deserialize, Serialize};

/// Parsed form of a git dependency string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRef {
    /// The original string.
    pub raw: String,
    /// Forge host code (letters and digits).
    pub host: String,
    /// Owner/namespace segment.
    pub owner: String,
    /// Repository name (anything up to `#`).
    pub repo: String,
    /// Ref — branch, tag, or sha; free-form to end of string.
    pub ref_name: String,
}

impl GitRef {
    /// Parse `host:owner/repo#ref`. Invalid strings yield `None`.
    pub fn parse(spec: &str) -> Option<Self> {
        let (host, rest) = spec.split_once(':')?;
        if host.is_empty() || !host.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        let (owner, rest) = rest.split_once('/')?;
        if owner.is_empty() {
            return None;
        }
        let (repo, ref_name) = rest.split_once('#')?;
        if repo.is_empty() {
            return None;
        }
        Some(Self {
            raw: spec.to_string(),
            host: host.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            ref_name: ref_name.to_string(),
        })
    }

    /// Build the canonical string form of a ref.
    pub fn canonical(host: &str, owner: &str, repo: &str, ref_name: &str) -> String {
        format!("{host}:{owner}/{repo}#{ref_name}")
    }

    /// HTTPS clone URL for this ref's repository.
    pub fn clone_url(&self) -> String {
        let domain = match self.host.as_str() {
            "github" | "gh" => "github.com".to_string(),
            "gitlab" | "gl" => "gitlab.com".to_string(),
            "bitbucket" | "bb" => "bitbucket.org".to_string(),
            "codeberg" | "cb" => "codeberg.org".to_string(),
            other => format!("{other}.com"),
        };
        format!("https://{domain}/{}/{}.git", self.owner, self.repo)
    }

    /// Synthesize a ref from a remote URL plus a branch.
    ///
    /// Understands `git@host:owner/name.git` and `https://host/owner/name.git`
    /// forms; anything else yields `None`.
    pub fn from_remote_url(url: &str, host_code: &str, branch: &str) -> Option<Self> {
        let (owner, name) = parse_owner_name(url)?;
        let raw = Self::canonical(host_code, &owner, &name, branch);
        Self::parse(&raw)
    }
}

impl std::fmt::Display for GitRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Whether a dependency version string names an ecosystem-owned git ref.
///
/// Only internal refs induce graph edges; external git-specified deps are
/// opaque to the orchestrator.
pub fn is_internal_ref(spec: &str, owner: &str) -> bool {
    spec.contains(&format!(":{owner}/"))
}

/// Extract owner and repo name from a git remote URL.
fn parse_owner_name(url: &str) -> Option<(String, String)> {
    // SSH form: git@github.com:owner/name.git
    if let Some(rest) = url.strip_prefix("git@") {
        let (_, path) = rest.split_once(':')?;
        return split_owner_path(path);
    }

    // HTTPS form: https://github.com/owner/name.git
    if let Some(scheme_end) = url.find("://") {
        let rest = &url[scheme_end + 3..];
        let slash = rest.find('/')?;
        return split_owner_path(&rest[slash + 1..]);
    }

    None
}

fn split_owner_path(path: &str) -> Option<(String, String)> {
    let path = path.trim_end_matches(".git").trim_matches('/');
    let mut parts = path.split('/');
    let owner = parts.next()?;
    let name = parts.next()?;
    if owner.is_empty() || name.is_empty() {
        return None;
    }
    Some((owner.to_string(), name.to_string()))
}
