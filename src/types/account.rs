use serde::{Deserialize, Serialize};

/// Best-known identity for an account, as observed from snapshot records,
/// live event payloads, or `GET /accounts/:id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl AccountSummary {
    pub fn bare(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// True when the record carries something worth caching beyond the id.
    pub fn has_identity(&self) -> bool {
        self.username.is_some() || self.email.is_some()
    }

    /// Fill absent fields from `other`. Populated fields are never replaced,
    /// so records only ever get richer and merge order does not matter.
    pub fn enrich_from(&mut self, other: &AccountSummary) {
        if self.username.is_none() {
            self.username = other.username.clone();
        }
        if self.email.is_none() {
            self.email = other.email.clone();
        }
        if self.role.is_none() {
            self.role = other.role.clone();
        }
    }

    /// Display policy: username, then email, then an id-derived placeholder.
    pub fn display_name(&self) -> String {
        if let Some(username) = &self.username {
            username.clone()
        } else if let Some(email) = &self.email {
            email.clone()
        } else {
            fallback_display_name(&self.id)
        }
    }
}

/// Placeholder name for an account known only by id. The `user-` prefix keeps
/// it visually distinct from real usernames until a fetch resolves.
pub fn fallback_display_name(id: &str) -> String {
    let start = id
        .char_indices()
        .rev()
        .nth(5)
        .map(|(i, _)| i)
        .unwrap_or(0);
    format!("user-{}", &id[start..])
}

/// An account reference as it appears on the wire: either a bare id string
/// or an inline summary object. Never both absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountRef {
    Id(String),
    Summary(AccountSummary),
}

impl AccountRef {
    pub fn id(&self) -> &str {
        match self {
            AccountRef::Id(id) => id,
            AccountRef::Summary(summary) => &summary.id,
        }
    }

    pub fn as_summary(&self) -> Option<&AccountSummary> {
        match self {
            AccountRef::Id(_) => None,
            AccountRef::Summary(summary) => Some(summary),
        }
    }

    /// Upgrade to an inline summary, enriching any fields already present.
    pub fn enrich(&mut self, incoming: &AccountSummary) {
        match self {
            AccountRef::Id(id) if *id == incoming.id => {
                *self = AccountRef::Summary(incoming.clone());
            }
            AccountRef::Summary(summary) if summary.id == incoming.id => {
                summary.enrich_from(incoming);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_prefers_username_then_email() {
        let mut account = AccountSummary::bare("abcdef123456");
        assert_eq!(account.display_name(), "user-123456");

        account.email = Some("bob@example.com".into());
        assert_eq!(account.display_name(), "bob@example.com");

        account.username = Some("bob".into());
        assert_eq!(account.display_name(), "bob");
    }

    #[test]
    fn fallback_handles_short_ids() {
        assert_eq!(fallback_display_name("u1"), "user-u1");
    }

    #[test]
    fn enrich_never_downgrades() {
        let mut cached = AccountSummary {
            id: "u1".into(),
            username: Some("alice".into()),
            email: None,
            role: None,
        };
        cached.enrich_from(&AccountSummary {
            id: "u1".into(),
            username: None,
            email: Some("alice@example.com".into()),
            role: Some("user".into()),
        });
        assert_eq!(cached.username.as_deref(), Some("alice"));
        assert_eq!(cached.email.as_deref(), Some("alice@example.com"));
        assert_eq!(cached.role.as_deref(), Some("user"));
    }

    #[test]
    fn account_ref_deserializes_both_shapes() {
        let bare: AccountRef = serde_json::from_str("\"u1\"").unwrap();
        assert_eq!(bare, AccountRef::Id("u1".into()));

        let inline: AccountRef =
            serde_json::from_str(r#"{"id":"u2","username":"bob"}"#).unwrap();
        assert_eq!(inline.id(), "u2");
        assert_eq!(
            inline.as_summary().and_then(|s| s.username.as_deref()),
            Some("bob")
        );
    }

    #[test]
    fn enrich_upgrades_bare_ref_in_place() {
        let mut account = AccountRef::Id("u1".into());
        account.enrich(&AccountSummary {
            id: "u1".into(),
            username: Some("alice".into()),
            email: None,
            role: None,
        });
        assert_eq!(
            account.as_summary().and_then(|s| s.username.as_deref()),
            Some("alice")
        );

        // A summary for a different id must not clobber the reference.
        let mut other = AccountRef::Id("u2".into());
        other.enrich(&AccountSummary::bare("u3"));
        assert_eq!(other, AccountRef::Id("u2".into()));
    }
}
