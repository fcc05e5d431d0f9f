use aws_config::{BehaviorVersion, SdkConfig};
use aws_credential_types::provider::ProvideCredentials;
use aws_types::region::Region;
use chrono::{DateTime, Utc};

use aws_utility_schema::credentials::Credentials;

use crate::error::{Error, Result};

pub async fn load_sdk_config(region: &str) -> SdkConfig {
    aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .load()
        .await
}

pub async fn load_profile_credentials(profile_name: &str, region: &str) -> Result<Credentials> {
    let config = aws_config::defaults(BehaviorVersion::latest())
        .profile_name(profile_name)
        .region(Region::new(region.to_string()))
        .load()
        .await;

    let credentials_provider = config.credentials_provider().ok_or_else(|| {
        Error::Config(format!(
            "no credentials provider found. profile:{}",
            profile_name
        ))
    })?;

    let creds = credentials_provider
        .provide_credentials()
        .await
        .map_err(|e| {
            Error::Config(format!(
                "failed to load credentials. profile:{}, error:{}",
                profile_name, e
            ))
        })?;

    Ok(Credentials {
        key: creds.access_key_id().to_string(),
        secret: creds.secret_access_key().to_string(),
        token: creds.session_token().map(|s| s.to_string()),
        expires_at: creds.expiry().map(DateTime::<Utc>::from),
    })
}
