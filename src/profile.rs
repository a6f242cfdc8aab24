//! User profile: the owner's timezone and hourly rate.

use async_trait::async_trait;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::date_util::parse_timezone;
use crate::error::{Error, Result};
use crate::storage::{repository, Database};

pub const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub username: Option<String>,
    /// IANA timezone name.
    pub timezone: String,
    pub hourly_rate: f64,
}

impl UserProfile {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            username: None,
            timezone: DEFAULT_TIMEZONE.to_string(),
            hourly_rate: 0.0,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(Error::Validation("user id is required".into()));
        }
        parse_timezone(&self.timezone)?;
        if !self.hourly_rate.is_finite() || self.hourly_rate < 0.0 {
            return Err(Error::Validation(format!(
                "hourlyRate must be >= 0, got {}",
                self.hourly_rate
            )));
        }
        Ok(())
    }

    pub fn tz(&self) -> Result<Tz> {
        parse_timezone(&self.timezone)
    }
}

/// Source of user profiles. Must be consulted before any period resolution.
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    async fn profile(&self, user_id: &str) -> Result<UserProfile>;
}

#[async_trait]
impl ProfileProvider for Database {
    async fn profile(&self, user_id: &str) -> Result<UserProfile> {
        let id = user_id.to_string();
        let found = self
            .reader()
            .call(move |conn| repository::get_profile(conn, &id))
            .await?;
        found.ok_or_else(|| Error::NotFound(format!("user {user_id}")))
    }
}

/// Timezone and hourly rate for a user.
///
/// A profile that cannot be fetched (missing or store unreachable) falls back
/// to UTC with no rate. A profile carrying an unknown timezone name is a
/// configuration error.
pub async fn profile_settings(
    provider: &dyn ProfileProvider,
    user_id: &str,
) -> Result<(Tz, f64)> {
    match provider.profile(user_id).await {
        Ok(profile) => Ok((profile.tz()?, profile.hourly_rate)),
        Err(e) => {
            log::warn!("Could not load profile for {user_id}, defaulting to {DEFAULT_TIMEZONE}: {e}");
            Ok((chrono_tz::UTC, 0.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Unreachable;

    #[async_trait]
    impl ProfileProvider for Unreachable {
        async fn profile(&self, _user_id: &str) -> Result<UserProfile> {
            Err(Error::Dependency("connection refused".into()))
        }
    }

    #[test]
    fn test_validate() {
        let mut p = UserProfile::new("u1");
        assert!(p.validate().is_ok());

        p.timezone = "Nowhere/Special".into();
        assert!(matches!(p.validate(), Err(Error::Configuration(_))));

        p.timezone = "America/Lima".into();
        p.hourly_rate = -3.0;
        assert!(matches!(p.validate(), Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_database_provider() {
        let db = Database::open_memory().await.unwrap();
        let err = db.profile("ghost").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let mut p = UserProfile::new("u1");
        p.timezone = "America/New_York".into();
        p.hourly_rate = 24.5;
        db.writer()
            .call({
                let p = p.clone();
                move |conn| repository::upsert_profile(conn, &p)
            })
            .await
            .unwrap();

        assert_eq!(db.profile("u1").await.unwrap(), p);
        let (tz, rate) = profile_settings(&db, "u1").await.unwrap();
        assert_eq!(tz, chrono_tz::America::New_York);
        assert_eq!(rate, 24.5);
    }

    #[tokio::test]
    async fn test_fetch_failure_defaults_to_utc() {
        let (tz, rate) = profile_settings(&Unreachable, "u1").await.unwrap();
        assert_eq!(tz, chrono_tz::UTC);
        assert_eq!(rate, 0.0);
    }

    #[tokio::test]
    async fn test_bad_stored_timezone_is_configuration_error() {
        let db = Database::open_memory().await.unwrap();
        db.writer()
            .call(|conn| {
                conn.execute(
                    "INSERT INTO user_profiles (user_id, timezone, hourly_rate, created_at, updated_at)
                     VALUES ('u1', 'Atlantis/Capital', 0, 'now', 'now')",
                    [],
                )
            })
            .await
            .unwrap();
        let err = profile_settings(&db, "u1").await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }
}
