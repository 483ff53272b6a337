use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Identity of an authenticated principal (human user, service account, etc).
///
/// Opaque to the relay: whatever the identity provider puts in `sub`. Never
/// empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrincipalId(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("principal id must not be empty")]
pub struct EmptyPrincipalId;

impl PrincipalId {
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyPrincipalId> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(EmptyPrincipalId);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PrincipalId {
    type Error = EmptyPrincipalId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PrincipalId> for String {
    fn from(value: PrincipalId) -> Self {
        value.0
    }
}

impl FromStr for PrincipalId {
    type Err = EmptyPrincipalId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_subject_is_rejected() {
        assert!(PrincipalId::new("").is_err());
        assert!(serde_json::from_str::<PrincipalId>("\" \"").is_err());
        assert_eq!(PrincipalId::new("u").unwrap().as_str(), "u");
    }
}
