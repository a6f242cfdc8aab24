//! Engine settings persisted in the `app_config` table.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::storage::{repository, Database};

pub const KEY_DEFAULT_USER: &str = "default_user";
pub const KEY_STORE_FAILURE_POLICY: &str = "metrics.store_failure_policy";

/// What metrics reads do when the task store cannot be queried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreFailurePolicy {
    /// Log the failure and report a zero aggregate with `uniqueDays = 1`.
    #[default]
    Degrade,
    /// Surface the failure as a dependency error.
    Raise,
}

impl StoreFailurePolicy {
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "degrade" => Ok(Self::Degrade),
            "raise" => Ok(Self::Raise),
            other => Err(Error::Configuration(format!(
                "{KEY_STORE_FAILURE_POLICY} must be 'degrade' or 'raise', got '{other}'"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Degrade => "degrade",
            Self::Raise => "raise",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub default_user: Option<String>,
    pub store_failure_policy: StoreFailurePolicy,
}

impl EngineConfig {
    pub async fn load(db: &Database) -> Result<Self> {
        let (default_user, policy) = db
            .reader()
            .call(|conn| {
                let user = repository::get_config(conn, KEY_DEFAULT_USER)?;
                let policy = repository::get_config(conn, KEY_STORE_FAILURE_POLICY)?;
                Ok::<_, rusqlite::Error>((user, policy))
            })
            .await?;

        let store_failure_policy = match policy {
            Some(p) => StoreFailurePolicy::parse(&p)?,
            None => StoreFailurePolicy::default(),
        };
        Ok(Self {
            default_user: default_user.filter(|u| !u.trim().is_empty()),
            store_failure_policy,
        })
    }
}

/// Reject values for recognized keys that `EngineConfig::load` would refuse.
pub fn validate_entry(key: &str, value: &str) -> Result<()> {
    if key == KEY_STORE_FAILURE_POLICY {
        StoreFailurePolicy::parse(value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parse() {
        assert_eq!(StoreFailurePolicy::parse("Raise").unwrap(), StoreFailurePolicy::Raise);
        assert_eq!(
            StoreFailurePolicy::parse(" degrade ").unwrap(),
            StoreFailurePolicy::Degrade
        );
        assert!(matches!(
            StoreFailurePolicy::parse("ignore"),
            Err(Error::Configuration(_))
        ));
        assert!(validate_entry("default_user", "anything").is_ok());
        assert!(validate_entry(KEY_STORE_FAILURE_POLICY, "nope").is_err());
    }

    #[tokio::test]
    async fn test_load_defaults() {
        let db = Database::open_memory().await.unwrap();
        let config = EngineConfig::load(&db).await.unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[tokio::test]
    async fn test_load_stored_values() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                repository::set_config(conn, KEY_DEFAULT_USER, "u1")?;
                repository::set_config(conn, KEY_STORE_FAILURE_POLICY, "raise")
            })
            .await
            .unwrap();

        let config = EngineConfig::load(&db).await.unwrap();
        assert_eq!(config.default_user.as_deref(), Some("u1"));
        assert_eq!(config.store_failure_policy, StoreFailurePolicy::Raise);
    }

    #[tokio::test]
    async fn test_load_rejects_unknown_policy() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| repository::set_config(conn, KEY_STORE_FAILURE_POLICY, "shrug"))
            .await
            .unwrap();

        let err = EngineConfig::load(&db).await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
