//! The OAuth2 device authorization grant against IAM Identity Center:
//! register a public client, start a device authorization, then poll for
//! the access token while the user approves the request in a browser.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, ProviderError, Result};
use crate::session::{BearerToken, Session};

pub mod aws_sdk;

pub mod defaults {
    use std::time::Duration;

    pub const CLIENT_NAME: &str = "aws-utility";
    pub const CLIENT_TYPE: &str = "public";
    pub const SCOPE: &str = "sso-portal:*";
    pub const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
    pub const REGISTER_TIMEOUT: Duration = Duration::from_secs(1);
    /// RFC 8628 section 3.2: poll every 5 seconds when no interval is given.
    pub const POLL_INTERVAL: Duration = Duration::from_secs(5);
    /// RFC 8628 section 3.5: back off by 5 seconds on `slow_down`.
    pub const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);
}

#[derive(Clone, PartialEq, Eq)]
pub struct RegisteredClient {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for RegisteredClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &"** redacted **")
            .finish()
    }
}

/// A device authorization as returned by the provider, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: Option<String>,
    pub expires_in: i32,
    pub interval: i32,
}

#[derive(Clone)]
pub struct AuthenticationChallenge {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: Option<String>,
    pub expires_in: Duration,
    pub interval: Duration,
    pub issued_at: Instant,
}

impl AuthenticationChallenge {
    pub fn deadline(&self) -> Instant {
        self.issued_at + self.expires_in
    }

    /// The URI to send the user to; the complete form embeds the user code.
    pub fn browser_uri(&self) -> &str {
        self.verification_uri_complete
            .as_deref()
            .unwrap_or(&self.verification_uri)
    }
}

impl TryFrom<DeviceAuthorization> for AuthenticationChallenge {
    type Error = ProviderError;

    fn try_from(value: DeviceAuthorization) -> Result<Self, Self::Error> {
        if value.expires_in <= 0 || value.interval < 0 {
            return Err(ProviderError::message(format!(
                "invalid device authorization timing. expires_in:{}, interval:{}",
                value.expires_in, value.interval
            )));
        }

        let interval = match value.interval {
            0 => defaults::POLL_INTERVAL,
            n => Duration::from_secs(n as u64),
        };

        Ok(AuthenticationChallenge {
            device_code: value.device_code,
            user_code: value.user_code,
            verification_uri: value.verification_uri,
            verification_uri_complete: value.verification_uri_complete,
            expires_in: Duration::from_secs(value.expires_in as u64),
            interval,
            issued_at: Instant::now(),
        })
    }
}

impl fmt::Debug for AuthenticationChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticationChallenge")
            .field("device_code", &"** redacted **")
            .field("user_code", &self.user_code)
            .field("verification_uri", &self.verification_uri)
            .field("verification_uri_complete", &self.verification_uri_complete)
            .field("expires_in", &self.expires_in)
            .field("interval", &self.interval)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: i32,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"** redacted **")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Outcome of one token request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenPoll {
    Granted(TokenGrant),
    /// The user has not approved the request yet.
    Pending,
    /// The provider asks the client to poll less often.
    SlowDown,
}

/// The IAM Identity Center OIDC API.
#[async_trait]
pub trait DeviceAuthorizationApi {
    async fn register_client(&self, client_name: &str) -> Result<RegisteredClient, ProviderError>;

    async fn start_device_authorization(
        &self,
        client: &RegisteredClient,
        start_url: &str,
    ) -> Result<DeviceAuthorization, ProviderError>;

    async fn create_token(
        &self,
        client: &RegisteredClient,
        device_code: &str,
    ) -> Result<TokenPoll, ProviderError>;
}

#[async_trait]
impl<T: DeviceAuthorizationApi + Send + Sync + ?Sized> DeviceAuthorizationApi for Arc<T> {
    async fn register_client(&self, client_name: &str) -> Result<RegisteredClient, ProviderError> {
        (**self).register_client(client_name).await
    }

    async fn start_device_authorization(
        &self,
        client: &RegisteredClient,
        start_url: &str,
    ) -> Result<DeviceAuthorization, ProviderError> {
        (**self).start_device_authorization(client, start_url).await
    }

    async fn create_token(
        &self,
        client: &RegisteredClient,
        device_code: &str,
    ) -> Result<TokenPoll, ProviderError> {
        (**self).create_token(client, device_code).await
    }
}

/// What to do with token request errors other than "pending" and "slow down".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollErrors {
    /// Log the error and keep polling until the challenge expires.
    #[default]
    Permissive,
    /// Fail the login on the first such error.
    Strict,
}

#[derive(Debug, Clone)]
pub struct DeviceAuthorizationOptions {
    pub client_name: String,
    pub register_timeout: Duration,
    pub poll_errors: PollErrors,
}

impl Default for DeviceAuthorizationOptions {
    fn default() -> Self {
        DeviceAuthorizationOptions {
            client_name: defaults::CLIENT_NAME.to_string(),
            register_timeout: defaults::REGISTER_TIMEOUT,
            poll_errors: PollErrors::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    Unregistered,
    Registered,
    ChallengeIssued,
    Polling,
    Authenticated,
    TimedOut,
    Cancelled,
    Failed,
}

pub struct DeviceAuthorizationClient<A> {
    api: A,
    session: Arc<Session>,
    options: DeviceAuthorizationOptions,
    state: Mutex<LoginState>,
}

impl<A> DeviceAuthorizationClient<A>
where
    A: DeviceAuthorizationApi + Send + Sync,
{
    pub fn new(api: A, session: Arc<Session>, options: DeviceAuthorizationOptions) -> Self {
        Self {
            api,
            session,
            options,
            state: Mutex::new(LoginState::Unregistered),
        }
    }

    pub fn state(&self) -> LoginState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: LoginState) {
        debug!("login state: {:?}", state);
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn fail<T>(&self, state: LoginState, err: Error) -> Result<T> {
        warn!("login failed. error:{}", err);
        self.set_state(state);
        Err(err)
    }

    pub async fn register_client(&self, client_name: &str) -> Result<RegisteredClient> {
        self.set_state(LoginState::Unregistered);
        let registration = tokio::time::timeout(
            self.options.register_timeout,
            self.api.register_client(client_name),
        )
        .await;

        match registration {
            Ok(Ok(client)) => {
                info!("client registered. client_name:{}", client_name);
                self.set_state(LoginState::Registered);
                Ok(client)
            }
            Ok(Err(e)) => self.fail(LoginState::Failed, Error::RegistrationFailed(e)),
            Err(_) => self.fail(
                LoginState::Failed,
                Error::RegistrationFailed(ProviderError::message(format!(
                    "no response within {:?}",
                    self.options.register_timeout
                ))),
            ),
        }
    }

    pub async fn start_device_authorization(
        &self,
        client: &RegisteredClient,
        start_url: &str,
    ) -> Result<AuthenticationChallenge> {
        if client.client_id.is_empty() || client.client_secret.is_empty() {
            return self.fail(
                LoginState::Failed,
                Error::AuthorizationStartFailed(ProviderError::message(
                    "client not registered, register the client first",
                )),
            );
        }

        let challenge = self
            .api
            .start_device_authorization(client, start_url)
            .await
            .and_then(AuthenticationChallenge::try_from);

        match challenge {
            Ok(challenge) => {
                info!(
                    "challenge issued. user_code:{}, expires_in:{:?}, interval:{:?}",
                    challenge.user_code, challenge.expires_in, challenge.interval
                );
                self.set_state(LoginState::ChallengeIssued);
                Ok(challenge)
            }
            Err(e) => self.fail(LoginState::Failed, Error::AuthorizationStartFailed(e)),
        }
    }

    /// Polls for the access token, once per interval starting when the
    /// challenge was issued, until the user approves the request or the
    /// challenge expires. The token is stored in the session on success.
    pub async fn poll_for_token(
        &self,
        client: &RegisteredClient,
        challenge: &AuthenticationChallenge,
        cancel: &CancellationToken,
    ) -> Result<BearerToken> {
        self.set_state(LoginState::Polling);

        let deadline = challenge.deadline();
        let timed_out = || Error::AuthenticationTimedOut(challenge.expires_in.as_secs());
        let mut interval = challenge.interval;
        let mut next_poll = challenge.issued_at;
        let mut attempts = 0u32;

        loop {
            if next_poll >= deadline {
                if wait_until(deadline, cancel).await.is_err() {
                    return self.fail(LoginState::Cancelled, Error::AuthenticationCancelled);
                }
                return self.fail(LoginState::TimedOut, timed_out());
            }

            if wait_until(next_poll, cancel).await.is_err() {
                return self.fail(LoginState::Cancelled, Error::AuthenticationCancelled);
            }

            attempts += 1;
            let poll = tokio::time::timeout_at(
                deadline,
                self.api.create_token(client, &challenge.device_code),
            )
            .await;

            match poll {
                Err(_) => return self.fail(LoginState::TimedOut, timed_out()),
                Ok(Ok(TokenPoll::Granted(grant))) => {
                    let lifetime = chrono::Duration::seconds(i64::from(grant.expires_in));
                    let token = BearerToken {
                        access_token: grant.access_token,
                        expires_at: Utc::now() + lifetime,
                    };
                    info!(
                        "token acquired. attempts:{}, expires_at:{}",
                        attempts, token.expires_at
                    );
                    self.session.set_bearer_token(token.clone());
                    self.set_state(LoginState::Authenticated);
                    return Ok(token);
                }
                Ok(Ok(TokenPoll::Pending)) => {
                    debug!("authorization pending. attempts:{}", attempts);
                }
                Ok(Ok(TokenPoll::SlowDown)) => {
                    interval += defaults::SLOW_DOWN_STEP;
                    debug!("slow down requested. interval:{:?}", interval);
                }
                Ok(Err(e)) => match self.options.poll_errors {
                    PollErrors::Permissive => {
                        warn!("token request failed, polling again. error:{}", e);
                    }
                    PollErrors::Strict => {
                        return self.fail(LoginState::Failed, Error::AuthenticationFailed(e));
                    }
                },
            }

            let now = Instant::now();
            next_poll += interval;
            if next_poll < now {
                next_poll = now + interval;
            }
        }
    }

    /// Runs the whole flow for the given start URL. `show` is called with
    /// the challenge so the user can be sent to the verification page.
    pub async fn login<F>(
        &self,
        start_url: &str,
        show: F,
        cancel: &CancellationToken,
    ) -> Result<BearerToken>
    where
        F: FnOnce(&AuthenticationChallenge) + Send,
    {
        let client = self.register_client(&self.options.client_name).await?;
        let challenge = self.start_device_authorization(&client, start_url).await?;
        show(&challenge);
        self.poll_for_token(&client, &challenge, cancel).await
    }
}

struct Cancelled;

async fn wait_until(at: Instant, cancel: &CancellationToken) -> Result<(), Cancelled> {
    if cancel.is_cancelled() {
        return Err(Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Cancelled),
        _ = tokio::time::sleep_until(at) => Ok(()),
    }
}
