//! Record-level (row) scope model.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WardenError;

/// Actions a record scope can restrict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordAction {
    Read,
    Update,
    Delete,
    Associate,
    Recover,
}

impl RecordAction {
    pub const ALL: [RecordAction; 5] = [
        RecordAction::Read,
        RecordAction::Update,
        RecordAction::Delete,
        RecordAction::Associate,
        RecordAction::Recover,
    ];

    /// Field name of this action's bucket inside a stored record scope.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordAction::Read => "read",
            RecordAction::Update => "update",
            RecordAction::Delete => "delete",
            RecordAction::Associate => "associate",
            RecordAction::Recover => "recover",
        }
    }
}

impl fmt::Display for RecordAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| format!("unknown record action: {s}"))
    }
}

/// Per-row authorization attribute: which scope tokens may act on the
/// row, per action. Tokens in `root` apply to every action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordScope {
    #[serde(default)]
    pub read: Vec<String>,
    #[serde(default)]
    pub update: Vec<String>,
    #[serde(default)]
    pub delete: Vec<String>,
    #[serde(default)]
    pub associate: Vec<String>,
    #[serde(default)]
    pub recover: Vec<String>,
    #[serde(default)]
    pub root: Vec<String>,
}

impl RecordScope {
    pub fn bucket(&self, action: RecordAction) -> &[String] {
        match action {
            RecordAction::Read => &self.read,
            RecordAction::Update => &self.update,
            RecordAction::Delete => &self.delete,
            RecordAction::Associate => &self.associate,
            RecordAction::Recover => &self.recover,
        }
    }

    pub fn bucket_mut(&mut self, action: RecordAction) -> &mut Vec<String> {
        match action {
            RecordAction::Read => &mut self.read,
            RecordAction::Update => &mut self.update,
            RecordAction::Delete => &mut self.delete,
            RecordAction::Associate => &mut self.associate,
            RecordAction::Recover => &mut self.recover,
        }
    }

    /// The action bucket followed by `root`, without duplicates.
    pub fn tokens_for(&self, action: RecordAction) -> Vec<&str> {
        let mut tokens: Vec<&str> = Vec::new();
        for token in self.bucket(action).iter().chain(&self.root) {
            if !tokens.contains(&token.as_str()) {
                tokens.push(token);
            }
        }
        tokens
    }

    /// Append tokens to a bucket, skipping ones already present.
    pub fn add_tokens<I, S>(&mut self, action: RecordAction, tokens: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let bucket = self.bucket_mut(action);
        for token in tokens {
            let token = token.into();
            if !bucket.contains(&token) {
                bucket.push(token);
            }
        }
    }

    pub fn remove_tokens<S: AsRef<str>>(&mut self, action: RecordAction, tokens: &[S]) {
        self.bucket_mut(action)
            .retain(|t| !tokens.iter().any(|r| r.as_ref() == t));
    }

    /// Stored tokens must be bare: no `+`/`!` prefix and no placeholder.
    pub fn validate(&self) -> Result<(), WardenError> {
        let all = RecordAction::ALL
            .iter()
            .flat_map(|a| self.bucket(*a))
            .chain(&self.root);
        for token in all {
            validate_token(token)?;
        }
        Ok(())
    }
}

/// Check a single stored record-scope token.
pub fn validate_token(token: &str) -> Result<(), WardenError> {
    if token.is_empty() {
        return Err(WardenError::Validation {
            message: "record scope token must not be empty".into(),
        });
    }
    if token.starts_with('+') || token.starts_with('!') {
        return Err(WardenError::Validation {
            message: format!("record scope token must not carry a prefix: {token}"),
        });
    }
    if token.contains('{') || token.contains('}') {
        return Err(WardenError::Validation {
            message: format!("record scope token must not be templated: {token}"),
        });
    }
    Ok(())
}

/// A row of a record-scoped model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: Uuid,
    pub record_scope: RecordScope,
    pub data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_for_unions_root_without_duplicates() {
        let scope = RecordScope {
            read: vec!["user-abc".into(), "admin".into()],
            root: vec!["admin".into(), "Super Admin".into()],
            ..Default::default()
        };

        assert_eq!(
            scope.tokens_for(RecordAction::Read),
            vec!["user-abc", "admin", "Super Admin"]
        );
        assert_eq!(
            scope.tokens_for(RecordAction::Delete),
            vec!["admin", "Super Admin"]
        );
    }

    #[test]
    fn add_and_remove_tokens() {
        let mut scope = RecordScope::default();
        scope.add_tokens(RecordAction::Update, ["a", "b", "a"]);
        assert_eq!(scope.update, vec!["a".to_string(), "b".to_string()]);

        scope.remove_tokens(RecordAction::Update, &["a"]);
        assert_eq!(scope.update, vec!["b".to_string()]);
    }

    #[test]
    fn validate_rejects_prefixed_and_templated_tokens() {
        let ok = RecordScope {
            read: vec!["user-1".into()],
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        for bad in ["+admin", "!guest", "user-{params.id}", ""] {
            let scope = RecordScope {
                root: vec![bad.into()],
                ..Default::default()
            };
            assert!(scope.validate().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn action_parses_from_bucket_name() {
        assert_eq!("recover".parse::<RecordAction>(), Ok(RecordAction::Recover));
        assert!("write".parse::<RecordAction>().is_err());
    }

    #[test]
    fn missing_buckets_deserialize_empty() {
        let scope: RecordScope = serde_json::from_str(r#"{"read":["x"]}"#).unwrap();
        assert_eq!(scope.read, vec!["x".to_string()]);
        assert!(scope.root.is_empty());
    }
}
