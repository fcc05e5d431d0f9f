//! The process-wide cloud session: endpoint configuration plus the one
//! credential set every AWS call is made with.
//!
//! The session is mutated in exactly two places: a successful login stores
//! the SSO bearer token, and a successful role assumption swaps the active
//! credentials. Both happen under a write lock, so readers observe either
//! the previous or the next value and never a mixture. Concurrent role
//! assumptions are not ordered against each other: the last one to finish
//! wins.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tracing::debug;

use aws_utility_schema::credentials::Credentials;

use crate::assume_role::Role;
use crate::error::{Error, Result};
use crate::profile::load::LoadProfiles;
use crate::profile::ProfileSet;

pub mod aws_sdk;

pub mod defaults {
    pub const REGION: &str = "us-east-1";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsoConfig {
    pub start_url: String,
    pub account_id: Option<String>,
    pub role_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSource {
    /// Log in through IAM Identity Center.
    Sso(SsoConfig),
    /// Use whatever credentials the named profile resolves to.
    Profile(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub region: String,
    pub source: SessionSource,
}

impl SessionConfig {
    pub fn sso<S: Into<String>>(start_url: S, region: S) -> Result<SessionConfig> {
        let config = SessionConfig {
            region: region.into(),
            source: SessionSource::Sso(SsoConfig {
                start_url: start_url.into(),
                account_id: None,
                role_name: None,
            }),
        };
        config.validate()?;
        Ok(config)
    }

    /// Resolves a command line target, which is either an SSO start URL or
    /// the name of a profile in the shared AWS config.
    pub fn resolve(
        target: &str,
        region_override: Option<&str>,
        profiles: &ProfileSet,
    ) -> Result<SessionConfig> {
        let config = if is_start_url(target) {
            SessionConfig {
                region: region_override.unwrap_or(defaults::REGION).to_string(),
                source: SessionSource::Sso(SsoConfig {
                    start_url: target.to_string(),
                    account_id: None,
                    role_name: None,
                }),
            }
        } else {
            let profile = profiles.get_profile(target).ok_or_else(|| {
                Error::Config(format!("no profile found. profile_name:{}", target))
            })?;

            let region = region_override
                .or_else(|| profile.sso_region())
                .or_else(|| profile.region_name())
                .unwrap_or(defaults::REGION)
                .to_string();

            let source = match profile.sso_start_url() {
                Some(start_url) => SessionSource::Sso(SsoConfig {
                    start_url: start_url.to_string(),
                    account_id: profile.sso_account_id().map(|s| s.to_string()),
                    role_name: profile.sso_role_name().map(|s| s.to_string()),
                }),
                None => SessionSource::Profile(profile.name().to_string()),
            };
            SessionConfig { region, source }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_region(&self.region)?;
        if let SessionSource::Sso(sso) = &self.source {
            if !is_start_url(&sso.start_url) || sso.start_url.len() <= "https://".len() {
                return Err(Error::Config(format!(
                    "start URL must be an https URL. start_url:{}",
                    sso.start_url
                )));
            }
        }
        Ok(())
    }

    pub fn sso_config(&self) -> Option<&SsoConfig> {
        match &self.source {
            SessionSource::Sso(sso) => Some(sso),
            SessionSource::Profile(_) => None,
        }
    }
}

fn is_start_url(target: &str) -> bool {
    target.starts_with("https://")
}

// Region names look like `us-east-1` or `us-gov-west-1`.
fn validate_region(region: &str) -> Result<()> {
    let parts = region.split('-').collect::<Vec<_>>();
    let valid = parts.len() >= 3
        && parts[..parts.len() - 1]
            .iter()
            .all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_lowercase()))
        && parts[parts.len() - 1]
            .chars()
            .all(|c| c.is_ascii_digit())
        && !parts[parts.len() - 1].is_empty();

    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!("invalid region name. region:{}", region)))
    }
}

/// The SSO access token obtained by the device authorization flow.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl BearerToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("access_token", &"** redacted **")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Credentials the AWS APIs are called with, and the role they belong to.
/// `role` is `None` when the credentials came straight from a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveCredentials {
    pub role: Option<Role>,
    pub credentials: Credentials,
}

#[derive(Debug, Default)]
struct SessionState {
    bearer_token: Option<BearerToken>,
    active: Option<Arc<ActiveCredentials>>,
}

#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    state: RwLock<SessionState>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Session {
        Session {
            config,
            state: RwLock::new(SessionState::default()),
        }
    }

    pub fn with_credentials(config: SessionConfig, credentials: Credentials) -> Session {
        let session = Session::new(config);
        session.replace_credentials(ActiveCredentials {
            role: None,
            credentials,
        });
        session
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn region(&self) -> &str {
        &self.config.region
    }

    pub fn bearer_token(&self) -> Option<BearerToken> {
        self.read(|s| s.bearer_token.clone())
    }

    pub fn set_bearer_token(&self, token: BearerToken) {
        debug!("bearer token stored. expires_at:{}", token.expires_at);
        self.write(|s| s.bearer_token = Some(token));
    }

    /// A snapshot of the active credentials. The snapshot stays valid even
    /// if a role is assumed while it is in use.
    pub fn credentials(&self) -> Option<Arc<ActiveCredentials>> {
        self.read(|s| s.active.clone())
    }

    pub fn current_role(&self) -> Option<Role> {
        self.read(|s| s.active.as_ref().and_then(|a| a.role.clone()))
    }

    pub fn replace_credentials(&self, active: ActiveCredentials) {
        let active = Arc::new(active);
        self.write(|s| s.active = Some(active));
    }

    fn read<T>(&self, f: impl FnOnce(&SessionState) -> T) -> T {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    fn write(&self, f: impl FnOnce(&mut SessionState)) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

/// Creates the session for a start URL or profile name. Profiles without
/// SSO settings are resolved to their credentials right away.
pub async fn new_session<L: LoadProfiles>(
    target: &str,
    region_override: Option<&str>,
    loader: &L,
) -> Result<Session> {
    let profiles = if is_start_url(target) {
        ProfileSet::default()
    } else {
        loader
            .load_profiles()
            .await
            .map_err(|e| Error::Config(format!("failed to load profiles: {:#}", e)))?
    };

    let config = SessionConfig::resolve(target, region_override, &profiles)?;
    match &config.source {
        SessionSource::Sso(sso) => {
            debug!("sso session. start_url:{}, region:{}", sso.start_url, config.region);
            Ok(Session::new(config))
        }
        SessionSource::Profile(profile_name) => {
            debug!("profile session. profile:{}, region:{}", profile_name, config.region);
            let credentials =
                aws_sdk::load_profile_credentials(profile_name, &config.region).await?;
            Ok(Session::with_credentials(config, credentials))
        }
    }
}
