//! Claims and the principals that carry them
//!
//! Claims are cached alongside other state, so they have a compact JSON form:
//! `valueType`, `issuer` and `originalIssuer` are only written when they
//! differ from their defaults.

use serde::{Deserialize, Serialize};

/// Default claim value type.
pub const STRING_VALUE_TYPE: &str = "string";

/// Issuer assigned to claims that do not name one.
pub const DEFAULT_ISSUER: &str = "LOCAL AUTHORITY";

/// Claim type holding the subject identifier.
pub const SUBJECT_CLAIM: &str = "sub";

/// A single statement about a subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "ClaimRepr", into = "ClaimRepr")]
pub struct Claim {
    pub claim_type: String,
    pub value: String,
    pub value_type: String,
    pub issuer: String,
    pub original_issuer: String,
}

impl Claim {
    /// Create a string claim issued by the local authority.
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
            value_type: STRING_VALUE_TYPE.to_string(),
            issuer: DEFAULT_ISSUER.to_string(),
            original_issuer: DEFAULT_ISSUER.to_string(),
        }
    }

    pub fn with_value_type(mut self, value_type: impl Into<String>) -> Self {
        self.value_type = value_type.into();
        self
    }

    /// Set the issuer. The original issuer follows unless set explicitly afterwards.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self.original_issuer = self.issuer.clone();
        self
    }

    pub fn with_original_issuer(mut self, original_issuer: impl Into<String>) -> Self {
        self.original_issuer = original_issuer.into();
        self
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClaimRepr {
    #[serde(rename = "type")]
    claim_type: String,
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    original_issuer: Option<String>,
}

impl From<Claim> for ClaimRepr {
    fn from(claim: Claim) -> Self {
        let value_type = (claim.value_type != STRING_VALUE_TYPE).then_some(claim.value_type);
        let original_issuer =
            (claim.original_issuer != claim.issuer).then_some(claim.original_issuer);
        let issuer = (claim.issuer != DEFAULT_ISSUER).then_some(claim.issuer);
        Self {
            claim_type: claim.claim_type,
            value: claim.value,
            value_type,
            issuer,
            original_issuer,
        }
    }
}

impl From<ClaimRepr> for Claim {
    fn from(repr: ClaimRepr) -> Self {
        let issuer = repr.issuer.unwrap_or_else(|| DEFAULT_ISSUER.to_string());
        Self {
            claim_type: repr.claim_type,
            value: repr.value,
            value_type: repr
                .value_type
                .unwrap_or_else(|| STRING_VALUE_TYPE.to_string()),
            original_issuer: repr.original_issuer.unwrap_or_else(|| issuer.clone()),
            issuer,
        }
    }
}

/// An authenticated subject described by its claims.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimsPrincipal {
    pub claims: Vec<Claim>,
}

impl ClaimsPrincipal {
    pub fn new(claims: Vec<Claim>) -> Self {
        Self { claims }
    }

    /// Principal with a single `sub` claim.
    pub fn for_subject(subject_id: impl Into<String>) -> Self {
        Self::new(vec![Claim::new(SUBJECT_CLAIM, subject_id)])
    }

    /// First claim of the given type, in insertion order.
    pub fn find_first(&self, claim_type: &str) -> Option<&Claim> {
        self.claims.iter().find(|c| c.claim_type == claim_type)
    }

    pub fn subject_id(&self) -> Option<&str> {
        self.find_first(SUBJECT_CLAIM).map(|c| c.value.as_str())
    }
}
