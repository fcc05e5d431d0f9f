use async_trait::async_trait;
use aws_config::SdkConfig;
use tracing::instrument;

use crate::device_auth::{
    defaults, DeviceAuthorization, DeviceAuthorizationApi, RegisteredClient, TokenGrant, TokenPoll,
};
use crate::error::ProviderError;

#[derive(Debug, Clone)]
pub struct AwsSdkDeviceAuthorization {
    client: aws_sdk_ssooidc::Client,
}

impl From<&SdkConfig> for AwsSdkDeviceAuthorization {
    fn from(config: &SdkConfig) -> Self {
        AwsSdkDeviceAuthorization {
            client: aws_sdk_ssooidc::Client::new(config),
        }
    }
}

fn missing(field: &str) -> ProviderError {
    ProviderError::message(format!("sso-oidc response is missing {}", field))
}

#[async_trait]
impl DeviceAuthorizationApi for AwsSdkDeviceAuthorization {
    #[instrument(skip(self))]
    async fn register_client(&self, client_name: &str) -> Result<RegisteredClient, ProviderError> {
        let output = self
            .client
            .register_client()
            .client_name(client_name)
            .client_type(defaults::CLIENT_TYPE)
            .scopes(defaults::SCOPE)
            .send()
            .await
            .map_err(ProviderError::from_sdk)?;

        Ok(RegisteredClient {
            client_id: output.client_id.ok_or_else(|| missing("clientId"))?,
            client_secret: output.client_secret.ok_or_else(|| missing("clientSecret"))?,
        })
    }

    #[instrument(skip(self, client))]
    async fn start_device_authorization(
        &self,
        client: &RegisteredClient,
        start_url: &str,
    ) -> Result<DeviceAuthorization, ProviderError> {
        let output = self
            .client
            .start_device_authorization()
            .client_id(&client.client_id)
            .client_secret(&client.client_secret)
            .start_url(start_url)
            .send()
            .await
            .map_err(ProviderError::from_sdk)?;

        Ok(DeviceAuthorization {
            device_code: output.device_code.ok_or_else(|| missing("deviceCode"))?,
            user_code: output.user_code.ok_or_else(|| missing("userCode"))?,
            verification_uri: output
                .verification_uri
                .ok_or_else(|| missing("verificationUri"))?,
            verification_uri_complete: output.verification_uri_complete,
            expires_in: output.expires_in,
            interval: output.interval,
        })
    }

    #[instrument(skip_all)]
    async fn create_token(
        &self,
        client: &RegisteredClient,
        device_code: &str,
    ) -> Result<TokenPoll, ProviderError> {
        let result = self
            .client
            .create_token()
            .client_id(&client.client_id)
            .client_secret(&client.client_secret)
            .grant_type(defaults::GRANT_TYPE)
            .device_code(device_code)
            .send()
            .await;

        match result {
            Ok(output) => Ok(TokenPoll::Granted(TokenGrant {
                access_token: output.access_token.ok_or_else(|| missing("accessToken"))?,
                expires_in: output.expires_in,
            })),
            Err(e) => match e.as_service_error() {
                Some(se) if se.is_authorization_pending_exception() => Ok(TokenPoll::Pending),
                Some(se) if se.is_slow_down_exception() => Ok(TokenPoll::SlowDown),
                _ => Err(ProviderError::from_sdk(e)),
            },
        }
    }
}
