//! Normalized alert record handed to the notification channel

use serde::{Deserialize, Serialize};

/// Severity of an alert, drives the badge and colour of the rendered card
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    High,
    Medium,
    Low,
    Success,
    Notify,
    Error,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::High => "high",
            Category::Medium => "medium",
            Category::Low => "low",
            Category::Success => "success",
            Category::Notify => "notify",
            Category::Error => "error",
        }
    }

    /// Badge text shown on the card.
    pub fn badge(&self) -> &'static str {
        match self {
            Category::High => "ALTA",
            Category::Medium => "MEDIA",
            Category::Low => "BAJA",
            Category::Success => "ÉXITO",
            Category::Notify => "NOTIFICACIÓN",
            Category::Error => "ERROR",
        }
    }

    /// Card theme colour, hex without the leading `#`.
    pub fn theme_color(&self) -> &'static str {
        match self {
            Category::High => "D13438",
            Category::Medium => "FF8C00",
            Category::Low => "FFB900",
            Category::Success => "107C10",
            Category::Notify => "0078D4",
            Category::Error => "A4262C",
        }
    }
}

/// Result of a matching check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub event: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub alert: String,
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl Alert {
    pub fn new(
        event: impl Into<String>,
        category: Category,
        message: impl Into<String>,
        alert: impl Into<String>,
    ) -> Self {
        Self {
            event: event.into(),
            message: message.into(),
            repository: None,
            branch: None,
            alert: alert.into(),
            category,
            actor: None,
            source_url: None,
        }
    }

    pub fn with_repository(mut self, repository: Option<impl Into<String>>) -> Self {
        self.repository = repository.map(Into::into);
        self
    }

    pub fn with_branch(mut self, branch: Option<impl Into<String>>) -> Self {
        self.branch = branch.map(Into::into);
        self
    }

    pub fn with_actor(mut self, actor: Option<impl Into<String>>) -> Self {
        self.actor = actor.map(Into::into);
        self
    }

    pub fn with_source_url(mut self, url: Option<impl Into<String>>) -> Self {
        self.source_url = url.map(Into::into);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_camel_case_and_skips_missing_context() {
        let alert = Alert::new("delete", Category::High, "msg", "detail")
            .with_repository(Some("org/repo"))
            .with_source_url(Some("https://github.com/org/repo"));

        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["category"], "high");
        assert_eq!(value["sourceUrl"], "https://github.com/org/repo");
        assert_eq!(value["repository"], "org/repo");
        assert!(value.get("branch").is_none());
        assert!(value.get("actor").is_none());
    }

    #[test]
    fn badges_follow_category() {
        assert_eq!(Category::High.badge(), "ALTA");
        assert_eq!(Category::Notify.badge(), "NOTIFICACIÓN");
        assert_eq!(Category::Success.as_str(), "success");
    }
}
