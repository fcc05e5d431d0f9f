#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

use aws_utility::assume_role::{Account, PortalApi, Role};
use aws_utility::device_auth::{
    DeviceAuthorization, DeviceAuthorizationApi, RegisteredClient, TokenGrant, TokenPoll,
};
use aws_utility::function::{FunctionApi, FunctionDescriptor, InvocationResult};
use aws_utility::paginate::Page;
use aws_utility::prompt::StaticInputReader;
use aws_utility::select::{Choice, Select};
use aws_utility::session::{BearerToken, Session, SessionConfig};
use aws_utility::ProviderError;
use aws_utility_schema::credentials::Credentials;

pub const START_URL: &str = "https://corp.awsapps.com/start";
pub const ACCESS_TOKEN: &str = "access-token";

pub fn sso_session() -> Arc<Session> {
    Arc::new(Session::new(SessionConfig::sso(START_URL, "us-east-1").unwrap()))
}

pub fn logged_in_session() -> Arc<Session> {
    let session = sso_session();
    session.set_bearer_token(bearer_token(Utc::now() + chrono::Duration::hours(8)));
    session
}

pub fn bearer_token(expires_at: DateTime<Utc>) -> BearerToken {
    BearerToken {
        access_token: ACCESS_TOKEN.to_string(),
        expires_at,
    }
}

pub fn credentials(key: &str) -> Credentials {
    Credentials {
        key: key.to_string(),
        secret: format!("{}-secret", key),
        token: Some(format!("{}-token", key)),
        expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
    }
}

pub fn not_found(name: &str) -> ProviderError {
    ProviderError::new(
        Some("ResourceNotFoundException"),
        format!("Function not found: {}", name),
    )
}

/// Serves `pages` in order, linking them with continuation tokens that are
/// the index of the next page.
fn page_of<T: Clone>(pages: &[Vec<T>], token: Option<String>) -> Page<T> {
    let index = token.map(|t| t.parse::<usize>().unwrap()).unwrap_or(0);
    let items = pages.get(index).cloned().unwrap_or_default();
    let next = (index + 1 < pages.len()).then(|| (index + 1).to_string());
    Page::new(items, next)
}

pub struct FakeIdentityCenter {
    pub register_delay: Duration,
    pub register_error: Option<ProviderError>,
    pub start: Result<DeviceAuthorization, ProviderError>,
    /// Token request outcomes in order; the last one repeats.
    pub polls: Mutex<VecDeque<Result<TokenPoll, ProviderError>>>,
    pub registrations: Mutex<Vec<String>>,
    pub starts: Mutex<Vec<String>>,
    pub token_requests: Mutex<Vec<Instant>>,
}

impl FakeIdentityCenter {
    pub fn new(
        expires_in: i32,
        interval: i32,
        polls: Vec<Result<TokenPoll, ProviderError>>,
    ) -> FakeIdentityCenter {
        FakeIdentityCenter {
            register_delay: Duration::ZERO,
            register_error: None,
            start: Ok(DeviceAuthorization {
                device_code: "device-code".to_string(),
                user_code: "ABCD-EFGH".to_string(),
                verification_uri: "https://device.sso.us-east-1.amazonaws.com/".to_string(),
                verification_uri_complete: Some(
                    "https://device.sso.us-east-1.amazonaws.com/?user_code=ABCD-EFGH".to_string(),
                ),
                expires_in,
                interval,
            }),
            polls: Mutex::new(polls.into_iter().collect()),
            registrations: Mutex::new(Vec::new()),
            starts: Mutex::new(Vec::new()),
            token_requests: Mutex::new(Vec::new()),
        }
    }

    pub fn granting_immediately() -> FakeIdentityCenter {
        FakeIdentityCenter::new(600, 1, vec![Ok(granted())])
    }

    pub fn token_request_count(&self) -> usize {
        self.token_requests.lock().unwrap().len()
    }
}

pub fn granted() -> TokenPoll {
    TokenPoll::Granted(TokenGrant {
        access_token: ACCESS_TOKEN.to_string(),
        expires_in: 28800,
    })
}

#[async_trait]
impl DeviceAuthorizationApi for FakeIdentityCenter {
    async fn register_client(&self, client_name: &str) -> Result<RegisteredClient, ProviderError> {
        self.registrations
            .lock()
            .unwrap()
            .push(client_name.to_string());
        tokio::time::sleep(self.register_delay).await;
        match &self.register_error {
            Some(e) => Err(e.clone()),
            None => Ok(RegisteredClient {
                client_id: "client-id".to_string(),
                client_secret: "client-secret".to_string(),
            }),
        }
    }

    async fn start_device_authorization(
        &self,
        _client: &RegisteredClient,
        start_url: &str,
    ) -> Result<DeviceAuthorization, ProviderError> {
        self.starts.lock().unwrap().push(start_url.to_string());
        self.start.clone()
    }

    async fn create_token(
        &self,
        client: &RegisteredClient,
        device_code: &str,
    ) -> Result<TokenPoll, ProviderError> {
        assert_eq!("client-id", client.client_id);
        assert_eq!("device-code", device_code);
        self.token_requests.lock().unwrap().push(Instant::now());

        let mut polls = self.polls.lock().unwrap();
        if polls.len() > 1 {
            polls.pop_front().unwrap()
        } else {
            polls.front().cloned().unwrap_or(Ok(TokenPoll::Pending))
        }
    }
}

#[derive(Default)]
pub struct FakePortal {
    pub account_pages: Vec<Vec<Account>>,
    pub role_pages: HashMap<String, Vec<Vec<Role>>>,
    /// Fails listing requests made with these continuation tokens.
    pub failing_tokens: Vec<Option<String>>,
    pub role_credentials: HashMap<(String, String), Credentials>,
    pub requests: Mutex<Vec<String>>,
}

impl FakePortal {
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn check(&self, token: &Option<String>) -> Result<(), ProviderError> {
        if self.failing_tokens.contains(token) {
            Err(ProviderError::new(
                Some("TooManyRequestsException"),
                "rate exceeded",
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PortalApi for FakePortal {
    async fn list_accounts(
        &self,
        access_token: &str,
        next_token: Option<String>,
    ) -> Result<Page<Account>, ProviderError> {
        assert_eq!(ACCESS_TOKEN, access_token);
        self.requests
            .lock()
            .unwrap()
            .push(format!("list_accounts {:?}", next_token));
        self.check(&next_token)?;
        Ok(page_of(&self.account_pages, next_token))
    }

    async fn list_account_roles(
        &self,
        access_token: &str,
        account_id: &str,
        next_token: Option<String>,
    ) -> Result<Page<Role>, ProviderError> {
        assert_eq!(ACCESS_TOKEN, access_token);
        self.requests
            .lock()
            .unwrap()
            .push(format!("list_account_roles {} {:?}", account_id, next_token));
        self.check(&next_token)?;
        let pages = self.role_pages.get(account_id).cloned().unwrap_or_default();
        Ok(page_of(&pages, next_token))
    }

    async fn get_role_credentials(
        &self,
        access_token: &str,
        account_id: &str,
        role_name: &str,
    ) -> Result<Credentials, ProviderError> {
        assert_eq!(ACCESS_TOKEN, access_token);
        self.requests
            .lock()
            .unwrap()
            .push(format!("get_role_credentials {} {}", account_id, role_name));
        self.role_credentials
            .get(&(account_id.to_string(), role_name.to_string()))
            .cloned()
            .ok_or_else(|| ProviderError::new(Some("ForbiddenException"), "No access"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub credentials_key: String,
    pub function_name: String,
    pub payload: Vec<u8>,
}

#[derive(Default)]
pub struct FakeLambda {
    pub function_pages: Vec<Vec<FunctionDescriptor>>,
    pub list_error: Option<ProviderError>,
    pub responses: HashMap<String, Vec<u8>>,
    pub list_requests: Mutex<Vec<Option<String>>>,
    pub invocations: Mutex<Vec<Invocation>>,
}

impl FakeLambda {
    pub fn with_functions(names: &[&[&str]]) -> FakeLambda {
        FakeLambda {
            function_pages: names
                .iter()
                .map(|page| page.iter().map(|n| FunctionDescriptor::new(*n)).collect())
                .collect(),
            ..FakeLambda::default()
        }
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl FunctionApi for FakeLambda {
    async fn list_functions(
        &self,
        _credentials: &Credentials,
        marker: Option<String>,
    ) -> Result<Page<FunctionDescriptor>, ProviderError> {
        self.list_requests.lock().unwrap().push(marker.clone());
        if let Some(e) = &self.list_error {
            return Err(e.clone());
        }
        Ok(page_of(&self.function_pages, marker))
    }

    async fn invoke(
        &self,
        credentials: &Credentials,
        function_name: &str,
        payload: Vec<u8>,
    ) -> Result<InvocationResult, ProviderError> {
        self.invocations.lock().unwrap().push(Invocation {
            credentials_key: credentials.key().to_string(),
            function_name: function_name.to_string(),
            payload,
        });
        match self.responses.get(function_name) {
            Some(response) => Ok(InvocationResult {
                status_code: 200,
                executed_version: Some("$LATEST".to_string()),
                payload: response.clone(),
            }),
            None => Err(not_found(function_name)),
        }
    }
}

/// Answers each picker by prompt; a prompt without an answer aborts.
#[derive(Default)]
pub struct ScriptedSelector {
    answers: HashMap<String, String>,
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ScriptedSelector {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        ScriptedSelector {
            answers: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl Select for ScriptedSelector {
    fn select<'a, T: Choice>(&self, prompt: &str, items: &'a [T]) -> anyhow::Result<Option<&'a T>> {
        Ok(self
            .answers
            .get(prompt)
            .and_then(|key| items.iter().find(|item| item.key() == key)))
    }
}

pub fn deploy_inputs() -> StaticInputReader {
    [("cluster", "c1"), ("service", "s1"), ("tag", "t1")]
        .into_iter()
        .collect()
}
