//! Organization roles report: who can approve what on `main`, plus every member's org role.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::error::Result;
use crate::github::{GitHubService, Role};

const REPORT_BRANCH: &str = "main";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RoleEntry {
    pub user_or_team: String,
    pub repo: Vec<String>,
    pub branch: String,
    pub role: Role,
}

/// Approvers come first, sorted by name, each listing the repositories whose
/// `main` protection names them. Org members follow unless already listed.
pub async fn build_roles_report(github: &dyn GitHubService) -> Result<Vec<RoleEntry>> {
    let repositories = github.list_org_repositories().await?;

    let mut approvers: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for repo in &repositories {
        let Some(protection) = github.get_branch_protection(&repo.name, REPORT_BRANCH).await? else {
            debug!("Repository '{}' has no protection on {}", repo.name, REPORT_BRANCH);
            continue;
        };
        for approver in protection
            .allowed_users
            .iter()
            .chain(protection.allowed_teams.iter())
        {
            approvers
                .entry(approver.clone())
                .or_default()
                .insert(repo.name.clone());
        }
    }

    let members = github.list_org_members_with_roles().await?;

    let mut report: Vec<RoleEntry> = approvers
        .iter()
        .map(|(name, repos)| RoleEntry {
            user_or_team: name.clone(),
            repo: repos.iter().cloned().collect(),
            branch: REPORT_BRANCH.to_string(),
            role: Role::Approver,
        })
        .collect();

    report.extend(
        members
            .into_iter()
            .filter(|member| !approvers.contains_key(&member.login))
            .map(|member| RoleEntry {
                user_or_team: member.login,
                repo: Vec::new(),
                branch: REPORT_BRANCH.to_string(),
                role: member.role,
            }),
    );

    info!(
        "Roles report built: {} repositories, {} entries",
        repositories.len(),
        report.len()
    );
    Ok(report)
}
