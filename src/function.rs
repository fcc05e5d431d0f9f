//! Listing and invoking Lambda functions with the session's active
//! credentials.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use aws_utility_schema::credentials::Credentials;

use crate::error::{Error, ProviderError, Result};
use crate::paginate::{collect_pages, Page};
use crate::session::{ActiveCredentials, Session};

pub mod aws_sdk;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionDescriptor {
    pub name: String,
}

impl FunctionDescriptor {
    pub fn new<S: Into<String>>(name: S) -> FunctionDescriptor {
        FunctionDescriptor { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationResult {
    pub status_code: i32,
    pub executed_version: Option<String>,
    pub payload: Vec<u8>,
}

impl InvocationResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    pub fn payload_lossy(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// The Lambda API. Remote execution errors (a function that threw) are
/// reported as `Err` just like transport errors.
#[async_trait]
pub trait FunctionApi {
    async fn list_functions(
        &self,
        credentials: &Credentials,
        marker: Option<String>,
    ) -> Result<Page<FunctionDescriptor>, ProviderError>;

    async fn invoke(
        &self,
        credentials: &Credentials,
        function_name: &str,
        payload: Vec<u8>,
    ) -> Result<InvocationResult, ProviderError>;
}

#[async_trait]
impl<T: FunctionApi + Send + Sync + ?Sized> FunctionApi for Arc<T> {
    async fn list_functions(
        &self,
        credentials: &Credentials,
        marker: Option<String>,
    ) -> Result<Page<FunctionDescriptor>, ProviderError> {
        (**self).list_functions(credentials, marker).await
    }

    async fn invoke(
        &self,
        credentials: &Credentials,
        function_name: &str,
        payload: Vec<u8>,
    ) -> Result<InvocationResult, ProviderError> {
        (**self).invoke(credentials, function_name, payload).await
    }
}

fn active_credentials(session: &Session) -> Result<Arc<ActiveCredentials>, ProviderError> {
    let active = session
        .credentials()
        .ok_or_else(|| ProviderError::message("no credentials, assume a role first"))?;
    if active.credentials.is_expired_at(Utc::now()) {
        return Err(ProviderError::message(format!(
            "credentials expired at {:?}, assume the role again",
            active.credentials.expires_at()
        )));
    }
    Ok(active)
}

pub struct FunctionDirectory<F> {
    api: F,
    session: Arc<Session>,
}

impl<F> FunctionDirectory<F>
where
    F: FunctionApi + Send + Sync,
{
    pub fn new(api: F, session: Arc<Session>) -> Self {
        Self { api, session }
    }

    pub async fn list_functions(&self) -> Result<Vec<FunctionDescriptor>> {
        let active = active_credentials(&self.session).map_err(Error::DirectoryListFailed)?;
        let functions = collect_pages(|marker| self.api.list_functions(&active.credentials, marker))
            .await
            .map_err(|e| {
                warn!("failed to list functions. error:{}", e);
                Error::DirectoryListFailed(e)
            })?;

        debug!("functions listed. count:{}", functions.len());
        Ok(functions)
    }
}

pub struct FunctionInvoker<F> {
    api: F,
    session: Arc<Session>,
}

impl<F> FunctionInvoker<F>
where
    F: FunctionApi + Send + Sync,
{
    pub fn new(api: F, session: Arc<Session>) -> Self {
        Self { api, session }
    }

    /// Invokes the function once with `payload` as is. There are no retries:
    /// an invocation may have side effects.
    pub async fn invoke(&self, function_name: &str, payload: Vec<u8>) -> Result<InvocationResult> {
        let fail = |source| Error::InvocationFailed {
            function_name: function_name.to_string(),
            source,
        };

        if function_name.is_empty() {
            return Err(fail(ProviderError::message("function name is empty")));
        }

        let active = active_credentials(&self.session).map_err(fail)?;
        debug!(
            "invoking function. function_name:{}, payload_bytes:{}",
            function_name,
            payload.len()
        );

        let result = self
            .api
            .invoke(&active.credentials, function_name, payload)
            .await
            .map_err(|e| {
                warn!("invocation failed. function_name:{}, error:{}", function_name, e);
                fail(e)
            })?;

        info!(
            "function invoked. function_name:{}, status_code:{}",
            function_name, result.status_code
        );
        Ok(result)
    }
}
