use async_trait::async_trait;
use aws_config::SdkConfig;
use chrono::DateTime;
use tracing::instrument;

use aws_utility_schema::credentials::Credentials;

use crate::assume_role::{Account, PortalApi, Role};
use crate::error::ProviderError;
use crate::paginate::Page;

#[derive(Debug, Clone)]
pub struct AwsSdkPortal {
    client: aws_sdk_sso::Client,
}

impl From<&SdkConfig> for AwsSdkPortal {
    fn from(config: &SdkConfig) -> Self {
        AwsSdkPortal {
            client: aws_sdk_sso::Client::new(config),
        }
    }
}

fn missing(field: &str) -> ProviderError {
    ProviderError::message(format!("sso response is missing {}", field))
}

#[async_trait]
impl PortalApi for AwsSdkPortal {
    #[instrument(skip(self, access_token))]
    async fn list_accounts(
        &self,
        access_token: &str,
        next_token: Option<String>,
    ) -> Result<Page<Account>, ProviderError> {
        let output = self
            .client
            .list_accounts()
            .access_token(access_token)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(ProviderError::from_sdk)?;

        let accounts = output
            .account_list
            .unwrap_or_default()
            .into_iter()
            .map(|a| {
                Ok(Account {
                    id: a.account_id.ok_or_else(|| missing("accountId"))?,
                    name: a.account_name.unwrap_or_default(),
                    email_address: a.email_address,
                })
            })
            .collect::<Result<Vec<_>, ProviderError>>()?;

        Ok(Page::new(accounts, output.next_token))
    }

    #[instrument(skip(self, access_token))]
    async fn list_account_roles(
        &self,
        access_token: &str,
        account_id: &str,
        next_token: Option<String>,
    ) -> Result<Page<Role>, ProviderError> {
        let output = self
            .client
            .list_account_roles()
            .access_token(access_token)
            .account_id(account_id)
            .set_next_token(next_token)
            .send()
            .await
            .map_err(ProviderError::from_sdk)?;

        let roles = output
            .role_list
            .unwrap_or_default()
            .into_iter()
            .map(|r| {
                Ok(Role {
                    name: r.role_name.ok_or_else(|| missing("roleName"))?,
                    account_id: account_id.to_string(),
                })
            })
            .collect::<Result<Vec<_>, ProviderError>>()?;

        Ok(Page::new(roles, output.next_token))
    }

    #[instrument(skip(self, access_token))]
    async fn get_role_credentials(
        &self,
        access_token: &str,
        account_id: &str,
        role_name: &str,
    ) -> Result<Credentials, ProviderError> {
        let output = self
            .client
            .get_role_credentials()
            .access_token(access_token)
            .account_id(account_id)
            .role_name(role_name)
            .send()
            .await
            .map_err(ProviderError::from_sdk)?;

        let creds = output
            .role_credentials
            .ok_or_else(|| missing("roleCredentials"))?;

        Ok(Credentials {
            key: creds.access_key_id.ok_or_else(|| missing("accessKeyId"))?,
            secret: creds
                .secret_access_key
                .ok_or_else(|| missing("secretAccessKey"))?,
            token: creds.session_token,
            // milliseconds since the epoch; zero means the service did not say
            expires_at: (creds.expiration > 0)
                .then(|| DateTime::from_timestamp_millis(creds.expiration))
                .flatten(),
        })
    }
}
