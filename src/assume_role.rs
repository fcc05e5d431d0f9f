//! Accounts and roles reachable with an SSO bearer token, and the exchange
//! of an (account, role) pair for role credentials.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use aws_utility_schema::credentials::Credentials;

use crate::error::{Error, ProviderError, Result};
use crate::paginate::{collect_pages, Page};
use crate::session::{ActiveCredentials, BearerToken, Session};

pub mod aws_sdk;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub email_address: Option<String>,
}

impl Account {
    pub fn new<S: Into<String>>(id: S, name: S) -> Account {
        Account {
            id: id.into(),
            name: name.into(),
            email_address: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub name: String,
    pub account_id: String,
}

impl Role {
    pub fn new<S: Into<String>>(name: S, account_id: S) -> Role {
        Role {
            name: name.into(),
            account_id: account_id.into(),
        }
    }
}

/// The IAM Identity Center portal API.
#[async_trait]
pub trait PortalApi {
    async fn list_accounts(
        &self,
        access_token: &str,
        next_token: Option<String>,
    ) -> Result<Page<Account>, ProviderError>;

    async fn list_account_roles(
        &self,
        access_token: &str,
        account_id: &str,
        next_token: Option<String>,
    ) -> Result<Page<Role>, ProviderError>;

    async fn get_role_credentials(
        &self,
        access_token: &str,
        account_id: &str,
        role_name: &str,
    ) -> Result<Credentials, ProviderError>;
}

#[async_trait]
impl<T: PortalApi + Send + Sync + ?Sized> PortalApi for Arc<T> {
    async fn list_accounts(
        &self,
        access_token: &str,
        next_token: Option<String>,
    ) -> Result<Page<Account>, ProviderError> {
        (**self).list_accounts(access_token, next_token).await
    }

    async fn list_account_roles(
        &self,
        access_token: &str,
        account_id: &str,
        next_token: Option<String>,
    ) -> Result<Page<Role>, ProviderError> {
        (**self)
            .list_account_roles(access_token, account_id, next_token)
            .await
    }

    async fn get_role_credentials(
        &self,
        access_token: &str,
        account_id: &str,
        role_name: &str,
    ) -> Result<Credentials, ProviderError> {
        (**self)
            .get_role_credentials(access_token, account_id, role_name)
            .await
    }
}

fn usable_token(token: Option<&BearerToken>) -> Result<&BearerToken, ProviderError> {
    let token = token.ok_or_else(|| ProviderError::message("not logged in"))?;
    if token.is_expired_at(Utc::now()) {
        return Err(ProviderError::message(format!(
            "SSO access token expired at {}, log in again",
            token.expires_at
        )));
    }
    Ok(token)
}

pub struct RoleResolver<P> {
    api: P,
    session: Arc<Session>,
}

impl<P> RoleResolver<P>
where
    P: PortalApi + Send + Sync,
{
    pub fn new(api: P, session: Arc<Session>) -> Self {
        Self { api, session }
    }

    pub async fn list_accounts(&self, token: &BearerToken) -> Result<Vec<Account>> {
        let token = usable_token(Some(token)).map_err(Error::AccountListFailed)?;
        let accounts = collect_pages(|next| self.api.list_accounts(&token.access_token, next))
            .await
            .map_err(|e| {
                warn!("failed to list accounts. error:{}", e);
                Error::AccountListFailed(e)
            })?;

        debug!("accounts listed. count:{}", accounts.len());
        Ok(accounts)
    }

    pub async fn list_roles(&self, token: &BearerToken, account_id: &str) -> Result<Vec<Role>> {
        let fail = |source| Error::RoleListFailed {
            account_id: account_id.to_string(),
            source,
        };

        let token = usable_token(Some(token)).map_err(fail)?;
        let roles = collect_pages(|next| {
            self.api
                .list_account_roles(&token.access_token, account_id, next)
        })
        .await
        .map_err(|e| {
            warn!("failed to list roles. account_id:{}, error:{}", account_id, e);
            fail(e)
        })?;

        debug!("roles listed. account_id:{}, count:{}", account_id, roles.len());
        Ok(roles)
    }

    /// Exchanges the session's bearer token for credentials of the given
    /// role and makes them the session's active credentials. On failure
    /// the session keeps whatever it had before.
    pub async fn assume_role(&self, account_id: &str, role_name: &str) -> Result<()> {
        let fail = |source| Error::RoleAssumptionFailed {
            account_id: account_id.to_string(),
            role_name: role_name.to_string(),
            source,
        };

        let token = self.session.bearer_token();
        let token = usable_token(token.as_ref()).map_err(fail)?;
        let credentials = self
            .api
            .get_role_credentials(&token.access_token, account_id, role_name)
            .await
            .map_err(|e| {
                warn!(
                    "failed to get role credentials. account_id:{}, role_name:{}, error:{}",
                    account_id, role_name, e
                );
                fail(e)
            })?;

        self.session.replace_credentials(ActiveCredentials {
            role: Some(Role::new(role_name, account_id)),
            credentials,
        });

        info!("role assumed. account_id:{}, role_name:{}", account_id, role_name);
        Ok(())
    }
}
