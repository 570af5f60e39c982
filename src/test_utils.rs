//! In-memory collaborators shared by the unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::alert::Alert;
use crate::error::{AlertError, Result};
use crate::github::{
    BranchProtection, GitHubService, GitHubUser, OrgMember, PullRequest, RepositorySummary,
};
use crate::notify::Notifier;

type PrKey = (String, String, String, String);

/// Scriptable stand-in for the GitHub API.
#[derive(Default)]
pub struct FakeGitHub {
    pub users: HashMap<String, GitHubUser>,
    pub commits: HashSet<String>,
    pub repositories: Vec<RepositorySummary>,
    pub protections: HashMap<String, BranchProtection>,
    pub members: Vec<OrgMember>,
    pub failing: bool,
    open_pulls: Mutex<HashMap<PrKey, PullRequest>>,
    pub pulls_created: AtomicUsize,
}

impl FakeGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn with_user(mut self, login: &str, email: Option<&str>) -> Self {
        self.users.insert(
            login.to_string(),
            GitHubUser {
                login: login.to_string(),
                name: None,
                email: email.map(String::from),
            },
        );
        self
    }

    pub fn with_commit(mut self, sha: &str) -> Self {
        self.commits.insert(sha.to_string());
        self
    }

    pub fn with_repository(mut self, name: &str, protection: Option<BranchProtection>) -> Self {
        self.repositories.push(RepositorySummary {
            name: name.to_string(),
            full_name: format!("acme/{}", name),
            private: true,
            html_url: format!("https://github.com/acme/{}", name),
            created_at: None,
            updated_at: None,
            forks_count: 0,
        });
        if let Some(protection) = protection {
            self.protections.insert(name.to_string(), protection);
        }
        self
    }

    pub fn with_member(mut self, login: &str, role: crate::github::Role) -> Self {
        self.members.push(OrgMember {
            login: login.to_string(),
            role,
        });
        self
    }

    pub fn created(&self) -> usize {
        self.pulls_created.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.failing {
            Err(AlertError::github("fake GitHub is down"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl GitHubService for FakeGitHub {
    async fn authenticated_login(&self) -> Result<String> {
        self.check()?;
        Ok("alert-bot".to_string())
    }

    async fn get_user_by_username(&self, login: &str) -> Result<GitHubUser> {
        self.check()?;
        self.users
            .get(login)
            .cloned()
            .ok_or_else(|| AlertError::github(format!("user {} not found", login)))
    }

    async fn create_or_reuse_pull_request(
        &self,
        owner: &str,
        repo: &str,
        head: &str,
        base: &str,
        _title: &str,
        _body: &str,
    ) -> Result<PullRequest> {
        self.check()?;
        let key = (
            owner.to_string(),
            repo.to_string(),
            head.to_string(),
            base.to_string(),
        );
        let mut pulls = self.open_pulls.lock().unwrap();
        if let Some(existing) = pulls.get(&key) {
            return Ok(existing.clone());
        }
        let number = self.pulls_created.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        let pr = PullRequest {
            number,
            html_url: format!("https://github.com/{}/{}/pull/{}", owner, repo, number),
        };
        pulls.insert(key, pr.clone());
        Ok(pr)
    }

    async fn commit_exists(&self, _repo: &str, sha: &str) -> Result<bool> {
        self.check()?;
        Ok(self.commits.contains(sha))
    }

    async fn list_org_repositories(&self) -> Result<Vec<RepositorySummary>> {
        self.check()?;
        Ok(self.repositories.clone())
    }

    async fn get_branch_protection(
        &self,
        repo: &str,
        _branch: &str,
    ) -> Result<Option<BranchProtection>> {
        self.check()?;
        Ok(self.protections.get(repo).cloned())
    }

    async fn list_org_members_with_roles(&self) -> Result<Vec<OrgMember>> {
        self.check()?;
        Ok(self.members.clone())
    }
}

/// Notifier that keeps every delivered alert.
#[derive(Default)]
pub struct RecordingNotifier {
    pub delivered: Mutex<Vec<Alert>>,
}

impl RecordingNotifier {
    pub fn alerts(&self) -> Vec<Alert> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, alert: &Alert) {
        self.delivered.lock().unwrap().push(alert.clone());
    }
}
