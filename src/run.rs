use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use aws_utility_schema::deploy::DeployRequest;

use crate::assume_role::{PortalApi, RoleResolver};
use crate::device_auth::{
    DeviceAuthorizationApi, DeviceAuthorizationClient, DeviceAuthorizationOptions,
};
use crate::function::{
    FunctionApi, FunctionDescriptor, FunctionDirectory, FunctionInvoker, InvocationResult,
};
use crate::prompt::{show_challenge, ReadInput};
use crate::select::Select;
use crate::session::{BearerToken, Session};

pub mod labels {
    pub const ACCOUNT: &str = "account";
    pub const ROLE: &str = "role";
    pub const FUNCTION: &str = "function";
    pub const CLUSTER: &str = "cluster";
    pub const SERVICE: &str = "service";
    pub const TAG: &str = "tag";
}

/// What is known so far about the deployment being prepared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Answers {
    pub logged_in: bool,
    /// The session already holds credentials to call Lambda with.
    pub credentials_ready: bool,
    pub account_id: Option<String>,
    pub role_name: Option<String>,
    pub function_name: Option<String>,
    pub cluster: Option<String>,
    pub service: Option<String>,
    pub ecr_tag: Option<String>,
}

impl Answers {
    fn deploy_request(&self) -> Option<DeployRequest> {
        Some(DeployRequest {
            cluster: self.cluster.clone()?,
            service: self.service.clone()?,
            ecr_tag: self.ecr_tag.clone()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    Login,
    SelectAccount,
    SelectRole,
    AssumeRole,
    SelectFunction,
    ReadCluster,
    ReadService,
    ReadTag,
    Invoke,
    Done,
}

impl Step {
    fn successor(self) -> Step {
        use Step::*;
        match self {
            Login => SelectAccount,
            SelectAccount => SelectRole,
            SelectRole => AssumeRole,
            AssumeRole => SelectFunction,
            SelectFunction => ReadCluster,
            ReadCluster => ReadService,
            ReadService => ReadTag,
            ReadTag => Invoke,
            Invoke => Done,
            Done => Done,
        }
    }

    fn is_answered(self, answers: &Answers) -> bool {
        use Step::*;
        match self {
            Login => answers.logged_in || answers.credentials_ready,
            SelectAccount => answers.account_id.is_some() || answers.credentials_ready,
            SelectRole => answers.role_name.is_some() || answers.credentials_ready,
            AssumeRole => answers.credentials_ready,
            SelectFunction => answers.function_name.is_some(),
            ReadCluster => answers.cluster.is_some(),
            ReadService => answers.service.is_some(),
            ReadTag => answers.ecr_tag.is_some(),
            Invoke | Done => false,
        }
    }

    fn skip_answered(self, answers: &Answers) -> Step {
        let mut step = self;
        while step.is_answered(answers) {
            step = step.successor();
        }
        step
    }

    pub fn first(answers: &Answers) -> Step {
        Step::Login.skip_answered(answers)
    }

    /// The next step that still needs doing.
    pub fn next(self, answers: &Answers) -> Step {
        self.successor().skip_answered(answers)
    }
}

pub struct WorkflowOptions {
    pub device_authorization: DeviceAuthorizationOptions,
    pub open_browser: bool,
    pub cancel: CancellationToken,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        WorkflowOptions {
            device_authorization: DeviceAuthorizationOptions::default(),
            open_browser: true,
            cancel: CancellationToken::new(),
        }
    }
}

enum Outcome {
    Continue,
    Aborted,
}

pub struct Workflow<D, P, F, S, R> {
    session: Arc<Session>,
    device_auth: DeviceAuthorizationClient<D>,
    roles: RoleResolver<P>,
    directory: FunctionDirectory<F>,
    invoker: FunctionInvoker<F>,
    selector: S,
    input: R,
    open_browser: bool,
    cancel: CancellationToken,
    answers: Answers,
}

impl<D, P, F, S, R> Workflow<D, P, F, S, R>
where
    D: DeviceAuthorizationApi + Send + Sync,
    P: PortalApi + Send + Sync,
    F: FunctionApi + Clone + Send + Sync,
    S: Select,
    R: ReadInput + Send + Sync,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session: Arc<Session>,
        device_api: D,
        portal_api: P,
        function_api: F,
        selector: S,
        input: R,
        answers: Answers,
        options: WorkflowOptions,
    ) -> Self {
        let mut answers = answers;
        if let Some(sso) = session.config().sso_config() {
            answers.account_id = answers.account_id.or_else(|| sso.account_id.clone());
            answers.role_name = answers.role_name.or_else(|| sso.role_name.clone());
        }

        Self {
            device_auth: DeviceAuthorizationClient::new(
                device_api,
                session.clone(),
                options.device_authorization,
            ),
            roles: RoleResolver::new(portal_api, session.clone()),
            directory: FunctionDirectory::new(function_api.clone(), session.clone()),
            invoker: FunctionInvoker::new(function_api, session.clone()),
            session,
            selector,
            input,
            open_browser: options.open_browser,
            cancel: options.cancel,
            answers,
        }
    }

    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    fn refresh(&mut self) {
        self.answers.logged_in = self
            .session
            .bearer_token()
            .map(|t| !t.is_expired_at(chrono::Utc::now()))
            .unwrap_or(false);
        self.answers.credentials_ready = self.session.credentials().is_some();
    }

    fn bearer_token(&self) -> anyhow::Result<BearerToken> {
        self.session
            .bearer_token()
            .ok_or_else(|| anyhow::anyhow!("not logged in with SSO"))
    }

    /// Performs steps until `until` is the next one, or the user aborts a
    /// selection. Returns the step the workflow stopped at.
    async fn drive(&mut self, until: Step) -> anyhow::Result<Option<Step>> {
        self.refresh();
        let mut step = Step::first(&self.answers);
        while step < until {
            if self.cancel.is_cancelled() {
                anyhow::bail!("interrupted before step {:?}", step);
            }
            debug!("step: {:?}", step);
            match self.perform(step).await? {
                Outcome::Continue => {}
                Outcome::Aborted => {
                    debug!("aborted at step: {:?}", step);
                    return Ok(None);
                }
            }
            self.refresh();
            step = step.next(&self.answers);
        }
        Ok(Some(step))
    }

    async fn perform(&mut self, step: Step) -> anyhow::Result<Outcome> {
        match step {
            Step::Login => {
                let start_url = self
                    .session
                    .config()
                    .sso_config()
                    .map(|sso| sso.start_url.clone())
                    .ok_or_else(|| anyhow::anyhow!("the session has no SSO start URL"))?;
                let open_browser = self.open_browser;
                self.device_auth
                    .login(
                        &start_url,
                        |challenge| show_challenge(challenge, open_browser),
                        &self.cancel,
                    )
                    .await?;
            }
            Step::SelectAccount => {
                let token = self.bearer_token()?;
                let accounts = self.roles.list_accounts(&token).await?;
                match self.selector.select(labels::ACCOUNT, &accounts)? {
                    Some(account) => self.answers.account_id = Some(account.id.clone()),
                    None => return Ok(Outcome::Aborted),
                }
            }
            Step::SelectRole => {
                let token = self.bearer_token()?;
                let account_id = self
                    .answers
                    .account_id
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("no account selected"))?;
                let roles = self.roles.list_roles(&token, &account_id).await?;
                match self.selector.select(labels::ROLE, &roles)? {
                    Some(role) => self.answers.role_name = Some(role.name.clone()),
                    None => return Ok(Outcome::Aborted),
                }
            }
            Step::AssumeRole => {
                let (account_id, role_name) = self
                    .answers
                    .account_id
                    .clone()
                    .zip(self.answers.role_name.clone())
                    .ok_or_else(|| anyhow::anyhow!("no account or role selected"))?;
                self.roles.assume_role(&account_id, &role_name).await?;
            }
            Step::SelectFunction => {
                let functions = self.directory.list_functions().await?;
                match self.selector.select(labels::FUNCTION, &functions)? {
                    Some(f) => self.answers.function_name = Some(f.name.clone()),
                    None => return Ok(Outcome::Aborted),
                }
            }
            Step::ReadCluster => {
                self.answers.cluster = Some(self.input.read_input(labels::CLUSTER).await?);
            }
            Step::ReadService => {
                self.answers.service = Some(self.input.read_input(labels::SERVICE).await?);
            }
            Step::ReadTag => {
                self.answers.ecr_tag = Some(self.input.read_input(labels::TAG).await?);
            }
            Step::Invoke | Step::Done => {}
        }

        Ok(Outcome::Continue)
    }

    /// Runs every remaining step and invokes the selected function.
    /// `None` means the user backed out of a selection.
    pub async fn run(mut self) -> anyhow::Result<Option<InvocationResult>> {
        if self.drive(Step::Invoke).await?.is_none() {
            return Ok(None);
        }

        let function_name = self
            .answers
            .function_name
            .clone()
            .ok_or_else(|| anyhow::anyhow!("no function selected"))?;
        let request = self
            .answers
            .deploy_request()
            .ok_or_else(|| anyhow::anyhow!("deploy request is incomplete"))?;
        debug!("deploy request: {:?}", request);

        if self.cancel.is_cancelled() {
            anyhow::bail!("interrupted before invoking {}", function_name);
        }
        let result = self
            .invoker
            .invoke(&function_name, request.to_payload()?)
            .await?;
        Ok(Some(result))
    }

    pub async fn list_accounts(mut self) -> anyhow::Result<Vec<crate::assume_role::Account>> {
        self.drive(Step::SelectAccount).await?;
        let token = self.bearer_token()?;
        Ok(self.roles.list_accounts(&token).await?)
    }

    pub async fn list_roles(
        mut self,
        account_id: &str,
    ) -> anyhow::Result<Vec<crate::assume_role::Role>> {
        self.drive(Step::SelectAccount).await?;
        let token = self.bearer_token()?;
        Ok(self.roles.list_roles(&token, account_id).await?)
    }

    pub async fn list_functions(mut self) -> anyhow::Result<Option<Vec<FunctionDescriptor>>> {
        if self.drive(Step::SelectFunction).await?.is_none() {
            return Ok(None);
        }
        Ok(Some(self.directory.list_functions().await?))
    }
}
