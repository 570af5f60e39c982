//! Repository, push and pull request rules
//!
//! The push checks that need canonical data (`monitor_push_user`,
//! `generate_pull_request`, `force_push`) call out to [`GitHubService`].

use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

use super::{Check, Evaluator, UNKNOWN, branch_name, mismatch};
use crate::alert::{Alert, Category};
use crate::error::{AlertError, Result};
use crate::github::GitHubService;
use crate::webhook::{PushPayload, RepositoryPayload, WebhookEvent};

/// Path prefix whose modification is always reported.
pub const PROTECTED_PATH_PREFIX: &str = "config/Jenkinsfile";
/// Branch generated pull requests target.
pub const PULL_REQUEST_BASE: &str = "main";
const PULL_REQUEST_TITLE: &str = ":robot: Pull request generated automatically";
/// Prefix of the null SHA GitHub sends for created or deleted refs.
const NULL_SHA_PREFIX: &str = "000000";

static PULL_REQUEST_BRANCHES: OnceLock<Regex> = OnceLock::new();
static FORCE_PUSH_BRANCHES: OnceLock<Regex> = OnceLock::new();

fn pull_request_branches() -> &'static Regex {
    PULL_REQUEST_BRANCHES
        .get_or_init(|| Regex::new(r"(?i)release|develop").expect("Invalid regex pattern"))
}

fn force_push_branches() -> &'static Regex {
    FORCE_PUSH_BRANCHES.get_or_init(|| Regex::new(r"(?i)main").expect("Invalid regex pattern"))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

pub struct RepositoryEvaluator {
    github: Arc<dyn GitHubService>,
    owner: String,
    protected_prefix: &'static str,
}

impl RepositoryEvaluator {
    pub fn new(github: Arc<dyn GitHubService>, owner: impl Into<String>) -> Self {
        Self {
            github,
            owner: owner.into(),
            protected_prefix: PROTECTED_PATH_PREFIX,
        }
    }

    /// Alerts when a private repository is deleted.
    pub fn monitor_private_repository_removed(&self, payload: &RepositoryPayload) -> Option<Alert> {
        if payload.action.as_deref() != Some("deleted") {
            return None;
        }

        let repo = payload.repository.as_ref()?;
        if repo.private != Some(true) {
            return None;
        }

        let org = payload.organization.as_ref().and_then(|o| o.login.as_deref());
        let sender = payload.sender.as_ref().and_then(|s| s.login.as_deref());

        Some(
            Alert::new(
                "repository",
                Category::High,
                "Repositorio eliminado",
                format!(
                    "Se eliminó un repositorio privado ({}) en la organización {} por {}. URL: {}",
                    repo.full_name.as_deref().unwrap_or(UNKNOWN),
                    org.unwrap_or(UNKNOWN),
                    sender.unwrap_or(UNKNOWN),
                    repo.html_url.as_deref().unwrap_or(UNKNOWN)
                ),
            )
            .with_repository(repo.full_name.as_deref())
            .with_actor(sender)
            .with_source_url(repo.html_url.as_deref()),
        )
    }

    /// Compares the head commit author with the GitHub account that pushed.
    pub async fn monitor_push_user(&self, payload: &PushPayload) -> Result<Option<Alert>> {
        let Some(author) = payload.head_commit.as_ref().and_then(|c| c.author.as_ref()) else {
            debug!("Push without head commit author, nothing to compare");
            return Ok(None);
        };

        let pusher = payload.pusher.as_ref().and_then(|p| non_empty(p.name.as_deref()));
        let username = non_empty(author.username.as_deref());
        let git_name = match (username, pusher) {
            (Some(username), Some(pusher)) if username.eq_ignore_ascii_case(pusher) => {
                Some(username)
            }
            _ => non_empty(author.name.as_deref()),
        };
        let git_email = non_empty(author.email.as_deref());

        let github_login = payload.sender.as_ref().and_then(|s| non_empty(s.login.as_deref()));
        let github_email = match github_login {
            Some(login) => match self.github.get_user_by_username(login).await {
                Ok(user) => user.email.filter(|e| !e.is_empty()),
                Err(e) => {
                    warn!("Could not fetch GitHub user '{}': {}", login, e);
                    None
                }
            },
            None => None,
        };

        let git_identity = format!(
            "{}, {}",
            git_name.unwrap_or(UNKNOWN),
            git_email.unwrap_or(UNKNOWN)
        );
        let github_identity = format!(
            "{}, {}",
            github_login.unwrap_or(UNKNOWN),
            github_email.as_deref().unwrap_or(UNKNOWN)
        );

        let mut inconsistencies = Vec::new();
        if let (Some(name), Some(login)) = (git_name, github_login) {
            if !name.eq_ignore_ascii_case(login) {
                inconsistencies.push(format!(
                    "Inconsistencia detectada: El usuario que hizo push ({}) no coincide con el usuario de GitHub ({}).",
                    git_identity, github_identity
                ));
            }
        }
        if let (Some(email), Some(canonical)) = (git_email, github_email.as_deref()) {
            if !email.eq_ignore_ascii_case(canonical) {
                inconsistencies.push(format!(
                    "Inconsistencia detectada: El correo del usuario que hizo push ({}) no coincide con el correo de GitHub ({}).",
                    git_identity, github_identity
                ));
            }
        }

        if inconsistencies.is_empty() {
            return Ok(None);
        }

        let repo = payload.repository.as_ref();
        Ok(Some(
            Alert::new(
                "push",
                Category::Low,
                "Inconsistencia en datos de usuario",
                inconsistencies.join(" | "),
            )
            .with_repository(repo.and_then(|r| r.full_name.as_deref()))
            .with_branch(payload.git_ref.as_deref().map(branch_name))
            .with_actor(github_login)
            .with_source_url(payload.compare.as_deref()),
        ))
    }

    /// Opens (or reuses) a pull request into `main` for release and develop branches.
    ///
    /// Only the ref is matched. Tag pushes such as `refs/tags/release-1` and
    /// deletions of a release branch still reach the pull request API, which
    /// rejects them; the pipeline logs that failure and carries on.
    ///
    /// The existence check and the creation are two separate API calls, so two
    /// deliveries racing on the same branch can still open two pull requests.
    pub async fn generate_pull_request(&self, payload: &PushPayload) -> Result<Option<Alert>> {
        let git_ref = payload.git_ref.as_deref().unwrap_or_default();
        if !pull_request_branches().is_match(git_ref) {
            debug!("Ref '{}' does not take automatic pull requests", git_ref);
            return Ok(None);
        }

        let head = branch_name(git_ref);
        let repo = payload.repository.as_ref();
        let repo_name = repo
            .and_then(|r| non_empty(r.name.as_deref()))
            .ok_or_else(|| AlertError::Validation("push payload has no repository.name".into()))?;

        let commit = payload.commits.first().or(payload.head_commit.as_ref());
        let body = format!(
            "Pull request generado automáticamente desde la rama {} por el webhook de GitHub. Para el commit {}, con la siguiente especificación: {}",
            head,
            commit.and_then(|c| c.id.as_deref()).unwrap_or(UNKNOWN),
            commit.and_then(|c| c.message.as_deref()).unwrap_or_default()
        );

        let pr = self
            .github
            .create_or_reuse_pull_request(
                &self.owner,
                repo_name,
                head,
                PULL_REQUEST_BASE,
                PULL_REQUEST_TITLE,
                &body,
            )
            .await?;
        info!("Pull request for {}:{} is {}", repo_name, head, pr.html_url);

        Ok(Some(
            Alert::new(
                "push",
                Category::Success,
                "Pull request generado",
                format!(
                    "Webhook recibido y procesado correctamente se creo el pull request {}",
                    pr.html_url
                ),
            )
            .with_repository(repo.and_then(|r| r.full_name.as_deref()))
            .with_branch(Some(head))
            .with_actor(payload.pusher.as_ref().and_then(|p| p.name.as_deref()))
            .with_source_url(Some(pr.html_url)),
        ))
    }

    /// Reports commits touching files under the protected path.
    pub fn changes_folder_config(&self, payload: &PushPayload) -> Option<Alert> {
        let repo = payload.repository.as_ref();
        let repository = repo.and_then(|r| r.full_name.as_deref());

        let notes: Vec<String> = payload
            .commits
            .iter()
            .filter_map(|commit| {
                let files: Vec<&str> = commit
                    .modified
                    .iter()
                    .map(String::as_str)
                    .filter(|f| f.starts_with(self.protected_prefix))
                    .collect();
                if files.is_empty() {
                    return None;
                }
                let author = commit
                    .author
                    .as_ref()
                    .and_then(|a| a.username.as_deref().or(a.name.as_deref()));
                Some(format!(
                    "Carpeta protegida modificada en el repositorio {} por el usuario {}\nArchivos: {}\nCommit: {}\nMensaje: \"{}\"",
                    repository.unwrap_or(UNKNOWN),
                    author.unwrap_or(UNKNOWN),
                    files.join(", "),
                    commit.url.as_deref().unwrap_or(UNKNOWN),
                    commit.message.as_deref().unwrap_or_default()
                ))
            })
            .collect();

        if notes.is_empty() {
            return None;
        }

        Some(
            Alert::new(
                "push",
                Category::Medium,
                "Webhook recibido y procesado correctamente, se crea alerta de carpeta protegida",
                notes.join("\n\n"),
            )
            .with_repository(repository)
            .with_branch(payload.git_ref.as_deref().map(branch_name))
            .with_actor(payload.pusher.as_ref().and_then(|p| p.name.as_deref()))
            .with_source_url(payload.compare.as_deref()),
        )
    }

    /// Heuristic force-push detection on `main`.
    ///
    /// Ref creation, ref deletion and pushes that carry commits are skipped.
    /// Otherwise the old head is looked up: if GitHub no longer knows it the
    /// history was rewritten, if it still exists the push was a reset or rebase.
    pub async fn force_push(&self, payload: &PushPayload) -> Result<Option<Alert>> {
        let git_ref = payload.git_ref.as_deref().unwrap_or_default();
        if !force_push_branches().is_match(git_ref) {
            debug!("Ref '{}' is not watched for force pushes", git_ref);
            return Ok(None);
        }

        let before = payload.before.as_deref().unwrap_or_default();
        let after = payload.after.as_deref().unwrap_or_default();
        if before.starts_with(NULL_SHA_PREFIX)
            || after.starts_with(NULL_SHA_PREFIX)
            || !payload.commits.is_empty()
        {
            return Ok(None);
        }

        if before.is_empty() {
            return Err(AlertError::Validation("push payload has no 'before' SHA".into()));
        }
        let repo = payload.repository.as_ref();
        let repo_name = repo
            .and_then(|r| non_empty(r.name.as_deref()))
            .ok_or_else(|| AlertError::Validation("push payload has no repository.name".into()))?;

        let (message, status) = if self.github.commit_exists(repo_name, before).await? {
            ("Posible rebase/reset detectado", "Posible rebase/reset")
        } else {
            ("Force push detectado", "Force push detectado")
        };

        Ok(Some(
            Alert::new(
                "push",
                Category::Low,
                message,
                format!(
                    "{} en el repositorio {} y en la rama {}",
                    status,
                    repo_name,
                    branch_name(git_ref)
                ),
            )
            .with_repository(repo.and_then(|r| r.full_name.as_deref()))
            .with_branch(Some(branch_name(git_ref)))
            .with_actor(payload.pusher.as_ref().and_then(|p| p.name.as_deref()))
            .with_source_url(payload.compare.as_deref()),
        ))
    }
}

#[async_trait]
impl Evaluator for RepositoryEvaluator {
    fn name(&self) -> &'static str {
        "repository"
    }

    async fn run(&self, check: Check, event: &WebhookEvent) -> Result<Option<Alert>> {
        match (check, event) {
            (Check::PrivateRepositoryRemoved, WebhookEvent::Repository(p)) => {
                Ok(self.monitor_private_repository_removed(p))
            }
            (Check::PushUser, WebhookEvent::Push(p)) => self.monitor_push_user(p).await,
            (Check::GeneratePullRequest, WebhookEvent::Push(p)) => {
                self.generate_pull_request(p).await
            }
            (Check::ChangesFolderConfig, WebhookEvent::Push(p)) => {
                Ok(self.changes_folder_config(p))
            }
            (Check::ForcePush, WebhookEvent::Push(p)) => self.force_push(p).await,
            _ => Err(mismatch(self.name(), check, event)),
        }
    }
}
