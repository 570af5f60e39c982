//! GitHub REST API collaborator
//!
//! Evaluators and the roles report only see the [`GitHubService`] trait; the
//! production implementation is [`GitHubClient`], a thin `reqwest` wrapper.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::error::{AlertError, Result};

const PER_PAGE: usize = 100;
const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("github_alert_hooks/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct GitHubUser {
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PullRequest {
    pub number: u64,
    pub html_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RepositorySummary {
    pub name: String,
    pub full_name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub forks_count: u64,
}

/// Flattened view of a branch protection rule.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BranchProtection {
    pub required_approvals: u32,
    pub require_code_owner_reviews: bool,
    pub allowed_users: Vec<String>,
    pub allowed_teams: Vec<String>,
    pub enforce_admins: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
    Approver,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrgMember {
    pub login: String,
    pub role: Role,
}

/// Operations the evaluators need from GitHub, scoped to the configured organization.
#[async_trait]
pub trait GitHubService: Send + Sync {
    async fn authenticated_login(&self) -> Result<String>;

    async fn get_user_by_username(&self, login: &str) -> Result<GitHubUser>;

    /// Returns the open pull request for `head` -> `base` when one exists,
    /// otherwise opens a new one.
    async fn create_or_reuse_pull_request(
        &self,
        owner: &str,
        repo: &str,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequest>;

    async fn commit_exists(&self, repo: &str, sha: &str) -> Result<bool>;

    async fn list_org_repositories(&self) -> Result<Vec<RepositorySummary>>;

    /// `None` when the branch is not protected.
    async fn get_branch_protection(
        &self,
        repo: &str,
        branch: &str,
    ) -> Result<Option<BranchProtection>>;

    async fn list_org_members_with_roles(&self) -> Result<Vec<OrgMember>>;
}

#[derive(Deserialize)]
struct LoginOnly {
    login: String,
}

#[derive(Deserialize)]
struct MembershipRole {
    role: Role,
}

#[derive(Deserialize)]
struct Meta {
    #[serde(default)]
    hooks: Vec<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawProtection {
    required_pull_request_reviews: Option<RawReviews>,
    restrictions: Option<RawRestrictions>,
    enforce_admins: Option<RawEnabled>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawReviews {
    required_approving_review_count: u32,
    require_code_owner_reviews: bool,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawRestrictions {
    users: Vec<LoginOnly>,
    teams: Vec<RawTeam>,
}

#[derive(Deserialize)]
struct RawTeam {
    name: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct RawEnabled {
    enabled: bool,
}

impl From<RawProtection> for BranchProtection {
    fn from(raw: RawProtection) -> Self {
        let reviews = raw.required_pull_request_reviews.unwrap_or_default();
        let restrictions = raw.restrictions.unwrap_or_default();
        BranchProtection {
            required_approvals: reviews.required_approving_review_count,
            require_code_owner_reviews: reviews.require_code_owner_reviews,
            allowed_users: restrictions.users.into_iter().map(|u| u.login).collect(),
            allowed_teams: restrictions.teams.into_iter().map(|t| t.name).collect(),
            enforce_admins: raw.enforce_admins.map(|e| e.enabled).unwrap_or(false),
        }
    }
}

/// REST client bound to one organization.
#[derive(Clone)]
pub struct GitHubClient {
    client: reqwest::Client,
    api_url: String,
    token: Option<String>,
    owner: String,
}

impl GitHubClient {
    pub fn new(
        api_url: impl Into<String>,
        token: Option<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.filter(|t| !t.is_empty()),
            owner: owner.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.api_url, path))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(Method::GET, path).send().await?;
        Ok(response.error_for_status()?.json().await?)
    }

    async fn paginate<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1usize;
        loop {
            let batch: Vec<T> = self
                .request(Method::GET, path)
                .query(&[("per_page", PER_PAGE), ("page", page)])
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            let last = batch.len() < PER_PAGE;
            items.extend(batch);
            if last {
                break;
            }
            page += 1;
        }
        debug!("Fetched {} item(s) from {} across {} page(s)", items.len(), path, page);
        Ok(items)
    }

    /// Source ranges GitHub currently uses for webhook deliveries.
    pub async fn hook_ranges(&self) -> Result<Vec<String>> {
        let meta: Meta = self.get_json("/meta").await?;
        Ok(meta.hooks)
    }
}

#[async_trait]
impl GitHubService for GitHubClient {
    async fn authenticated_login(&self) -> Result<String> {
        let user: LoginOnly = self.get_json("/user").await?;
        Ok(user.login)
    }

    async fn get_user_by_username(&self, login: &str) -> Result<GitHubUser> {
        debug!("Fetching GitHub user '{}'", login);
        self.get_json(&format!("/users/{}", login)).await
    }

    async fn create_or_reuse_pull_request(
        &self,
        owner: &str,
        repo: &str,
        head: &str,
        base: &str,
        title: &str,
        body: &str,
    ) -> Result<PullRequest> {
        let path = format!("/repos/{}/{}/pulls", owner, repo);
        let head_filter = format!("{}:{}", owner, head);

        let open: Vec<PullRequest> = self
            .request(Method::GET, &path)
            .query(&[("state", "open"), ("head", head_filter.as_str()), ("base", base)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(existing) = open.into_iter().next() {
            info!(
                "Reusing open pull request #{} for {}/{} {} -> {}",
                existing.number, owner, repo, head, base
            );
            return Ok(existing);
        }

        let created: PullRequest = self
            .request(Method::POST, &path)
            .json(&json!({ "title": title, "head": head, "base": base, "body": body }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        info!(
            "Opened pull request #{} for {}/{} {} -> {}",
            created.number, owner, repo, head, base
        );
        Ok(created)
    }

    async fn commit_exists(&self, repo: &str, sha: &str) -> Result<bool> {
        let path = format!("/repos/{}/{}/commits/{}", self.owner, repo, sha);
        let response = self.request(Method::GET, &path).send().await?;
        match response.status() {
            // 422 is returned for SHAs GitHub cannot resolve at all
            StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(AlertError::github(format!(
                "commit lookup {} returned {}",
                path, status
            ))),
        }
    }

    async fn list_org_repositories(&self) -> Result<Vec<RepositorySummary>> {
        self.paginate(&format!("/orgs/{}/repos", self.owner)).await
    }

    async fn get_branch_protection(
        &self,
        repo: &str,
        branch: &str,
    ) -> Result<Option<BranchProtection>> {
        let path = format!("/repos/{}/{}/branches/{}/protection", self.owner, repo, branch);
        let response = self.request(Method::GET, &path).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let raw: RawProtection = response.error_for_status()?.json().await?;
        Ok(Some(raw.into()))
    }

    async fn list_org_members_with_roles(&self) -> Result<Vec<OrgMember>> {
        let members: Vec<LoginOnly> = self
            .paginate(&format!("/orgs/{}/members", self.owner))
            .await?;

        let mut with_roles = Vec::with_capacity(members.len());
        for member in members {
            let membership: MembershipRole = self
                .get_json(&format!("/orgs/{}/memberships/{}", self.owner, member.login))
                .await?;
            with_roles.push(OrgMember {
                login: member.login,
                role: membership.role,
            });
        }
        Ok(with_roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_branch_protection() {
        let raw: RawProtection = serde_json::from_value(serde_json::json!({
            "required_pull_request_reviews": {
                "required_approving_review_count": 2,
                "require_code_owner_reviews": true
            },
            "restrictions": {
                "users": [{"login": "ana"}],
                "teams": [{"name": "platform"}]
            },
            "enforce_admins": {"enabled": true}
        }))
        .unwrap();

        let protection = BranchProtection::from(raw);
        assert_eq!(protection.required_approvals, 2);
        assert!(protection.require_code_owner_reviews);
        assert_eq!(protection.allowed_users, vec!["ana"]);
        assert_eq!(protection.allowed_teams, vec!["platform"]);
        assert!(protection.enforce_admins);
    }

    #[test]
    fn missing_protection_sections_default_to_open() {
        let raw: RawProtection = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(BranchProtection::from(raw), BranchProtection::default());
    }

    #[test]
    fn client_trims_trailing_slash_and_empty_token() {
        let client = GitHubClient::new("https://api.github.com/", Some(String::new()), "org");
        assert_eq!(client.api_url, "https://api.github.com");
        assert!(client.token.is_none());
        assert_eq!(client.owner(), "org");
    }
}
