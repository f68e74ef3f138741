use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Request category assigned by the triage step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Billing,
    Technical,
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Billing => "billing",
            Self::Technical => "technical",
            Self::General => "general",
        }
    }

    pub fn all() -> [Category; 3] {
        [Self::Billing, Self::Technical, Self::General]
    }
}

impl std::str::FromStr for Category {
    type Err = ContextError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "billing" => Ok(Self::Billing),
            "technical" => Ok(Self::Technical),
            "general" => Ok(Self::General),
            other => Err(ContextError::UnknownCategory(other.to_string())),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("category already assigned as {existing} for this request")]
    CategoryAlreadyAssigned { existing: Category },
    #[error("unknown category `{0}` (expected billing|technical|general)")]
    UnknownCategory(String),
}

/// Session-scoped state consulted by routing and capability gating.
///
/// One instance is exclusively owned by at most one in-flight request: the
/// controller takes it by value and hands it back in the request outcome, so
/// two concurrently-running requests can never share a context.
///
/// `category` is the only per-request field. It starts unset, is written
/// exactly once by the triage step, and is cleared again only by
/// [`SessionContext::begin_request`] before the next request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    identity: String,
    is_privileged: bool,
    category: Option<Category>,
}

impl SessionContext {
    pub fn new(identity: impl Into<String>, is_privileged: bool) -> Self {
        Self { identity: identity.into(), is_privileged, category: None }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn is_privileged(&self) -> bool {
        self.is_privileged
    }

    pub fn category(&self) -> Option<Category> {
        self.category
    }

    /// Clear per-request state. Hosts call this before submitting the next
    /// request on the same session.
    pub fn begin_request(&mut self) {
        self.category = None;
    }

    /// Record the classification result. Second writes within one request
    /// are rejected so the write-once invariant cannot be lost silently.
    pub fn assign_category(&mut self, category: Category) -> Result<(), ContextError> {
        match self.category {
            Some(existing) => Err(ContextError::CategoryAlreadyAssigned { existing }),
            None => {
                self.category = Some(category);
                Ok(())
            }
        }
    }
}
