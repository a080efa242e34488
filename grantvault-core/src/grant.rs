//! Persisted grant records and the filters used to select them

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// A persisted, owner-scoped, time-bounded record.
///
/// `data` is opaque to the store; the remaining fields drive indexing
/// (`subject_id`, `client_id`, `grant_type`) and expiry (`expiration`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grant {
    pub key: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub grant_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub creation_time: Timestamp,
    pub expiration: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_time: Option<Timestamp>,
    pub data: String,
}

impl Grant {
    /// Create a grant with only the mandatory fields set.
    pub fn new(
        key: impl Into<String>,
        data: impl Into<String>,
        creation_time: Timestamp,
        expiration: Timestamp,
    ) -> Self {
        Self {
            key: key.into(),
            grant_type: None,
            subject_id: None,
            session_id: None,
            client_id: None,
            description: None,
            creation_time,
            expiration,
            consumed_time: None,
            data: data.into(),
        }
    }

    pub fn with_subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_type(mut self, grant_type: impl Into<String>) -> Self {
        self.grant_type = Some(grant_type.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The owning subject, if present and non-empty.
    pub fn subject(&self) -> Option<&str> {
        non_empty(self.subject_id.as_deref())
    }

    pub fn client(&self) -> &str {
        self.client_id.as_deref().unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.grant_type.as_deref().unwrap_or_default()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }
}

/// Selection criteria for bulk reads and deletes.
///
/// `subject_id` is mandatory for every query; the other fields narrow it.
/// Empty strings are treated the same as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantFilter {
    pub subject_id: Option<String>,
    pub client_id: Option<String>,
    #[serde(rename = "type")]
    pub grant_type: Option<String>,
    pub session_id: Option<String>,
}

impl GrantFilter {
    /// Filter on a subject.
    pub fn for_subject(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: Some(subject_id.into()),
            ..Default::default()
        }
    }

    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_type(mut self, grant_type: impl Into<String>) -> Self {
        self.grant_type = Some(grant_type.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn subject(&self) -> Option<&str> {
        non_empty(self.subject_id.as_deref())
    }

    pub fn client(&self) -> Option<&str> {
        non_empty(self.client_id.as_deref())
    }

    pub fn kind(&self) -> Option<&str> {
        non_empty(self.grant_type.as_deref())
    }

    pub fn session(&self) -> Option<&str> {
        non_empty(self.session_id.as_deref())
    }

    /// Whether `grant` satisfies every criterion set on this filter.
    pub fn matches(&self, grant: &Grant) -> bool {
        fn field_matches(wanted: Option<&str>, actual: Option<&str>) -> bool {
            wanted.map_or(true, |w| actual == Some(w))
        }

        field_matches(self.subject(), grant.subject_id.as_deref())
            && field_matches(self.client(), grant.client_id.as_deref())
            && field_matches(self.kind(), grant.grant_type.as_deref())
            && field_matches(self.session(), grant.session_id.as_deref())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
