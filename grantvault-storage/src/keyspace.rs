//! Key-space layout for grants and their index sets.
//!
//! Every key the grant store touches is derived here from the grant's
//! identity fields. Index sets are addressed purely by these strings, never
//! by reference.
//!
//! # Layout
//!
//! | key                         | holds                                   |
//! |-----------------------------|-----------------------------------------|
//! | `{prefix}{key}`             | serialized grant                        |
//! | `{prefix}{sub}`             | set of primary keys for the subject     |
//! | `{prefix}{sub}:{cli}`       | ... for subject + client                |
//! | `{prefix}{sub}:{cli}:{typ}` | ... for subject + client + type         |
//!
//! Subject, client and type values containing `:` can alias one another.
//! Callers must keep the separator out of those values.

use grantvault_core::{normalize_prefix, Grant, GrantFilter};

/// Separator between the components of a composite index key.
pub const SEPARATOR: char = ':';

/// Derives primary and index keys under a fixed prefix.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeySpace {
    prefix: String,
}

/// Which index set a query reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexLevel {
    Subject,
    SubjectClient,
    SubjectClientType,
}

/// The three index keys a grant is listed under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantIndexKeys {
    pub subject: String,
    pub subject_client: String,
    pub subject_client_type: String,
}

impl GrantIndexKeys {
    pub fn all(&self) -> [&str; 3] {
        [&self.subject, &self.subject_client, &self.subject_client_type]
    }
}

impl KeySpace {
    /// Create a key space; a non-empty prefix gets a trailing `:`.
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: normalize_prefix(prefix),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn primary(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    pub fn by_subject(&self, subject_id: &str) -> String {
        format!("{}{}", self.prefix, subject_id)
    }

    pub fn by_subject_client(&self, subject_id: &str, client_id: &str) -> String {
        format!("{}{}{}{}", self.prefix, subject_id, SEPARATOR, client_id)
    }

    pub fn by_subject_client_type(&self, subject_id: &str, client_id: &str, grant_type: &str) -> String {
        format!(
            "{}{}{sep}{}{sep}{}",
            self.prefix,
            subject_id,
            client_id,
            grant_type,
            sep = SEPARATOR
        )
    }

    /// Index keys for a grant, or `None` if it has no subject.
    pub fn grant_indexes(&self, grant: &Grant) -> Option<GrantIndexKeys> {
        let subject = grant.subject()?;
        Some(GrantIndexKeys {
            subject: self.by_subject(subject),
            subject_client: self.by_subject_client(subject, grant.client()),
            subject_client_type: self.by_subject_client_type(subject, grant.client(), grant.kind()),
        })
    }

    /// The most specific index a filter can be answered from.
    ///
    /// Returns the chosen key, its level, and the coarser index keys of the
    /// same subject. `None` if the filter has no subject.
    pub fn index_for_filter(&self, filter: &GrantFilter) -> Option<(String, IndexLevel, Vec<String>)> {
        let subject = filter.subject()?;
        let selection = match (filter.client(), filter.kind()) {
            (Some(client), Some(kind)) => (
                self.by_subject_client_type(subject, client, kind),
                IndexLevel::SubjectClientType,
                vec![self.by_subject_client(subject, client), self.by_subject(subject)],
            ),
            (Some(client), None) => (
                self.by_subject_client(subject, client),
                IndexLevel::SubjectClient,
                vec![self.by_subject(subject)],
            ),
            (None, _) => (self.by_subject(subject), IndexLevel::Subject, Vec::new()),
        };
        Some(selection)
    }
}

impl IndexLevel {
    /// Whether reading this index already enforces every field the filter
    /// sets, so no in-memory filtering is needed.
    pub fn covers(self, filter: &GrantFilter) -> bool {
        if filter.session().is_some() {
            return false;
        }
        match self {
            IndexLevel::SubjectClientType => true,
            IndexLevel::SubjectClient => filter.kind().is_none(),
            IndexLevel::Subject => filter.client().is_none() && filter.kind().is_none(),
        }
    }
}
