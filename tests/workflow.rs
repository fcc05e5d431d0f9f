mod common;

use std::collections::HashMap;
use std::sync::Arc;

use aws_utility::assume_role::{Account, Role};
use aws_utility::device_auth::{DeviceAuthorizationOptions, PollErrors, TokenPoll};
use aws_utility::run::{labels, Answers, Workflow, WorkflowOptions};
use aws_utility::session::{Session, SessionConfig, SessionSource, SsoConfig};
use aws_utility::{Error, ProviderError};

use common::{
    credentials, deploy_inputs, sso_session, FakeIdentityCenter, FakeLambda, FakePortal,
    ScriptedSelector,
};

const ACCOUNT_ID: &str = "111111111111";

fn portal() -> Arc<FakePortal> {
    let mut role_pages = HashMap::new();
    role_pages.insert(
        ACCOUNT_ID.to_string(),
        vec![vec![
            Role::new("ReadOnly", ACCOUNT_ID),
            Role::new("Deployer", ACCOUNT_ID),
        ]],
    );
    let mut role_credentials = HashMap::new();
    role_credentials.insert(
        (ACCOUNT_ID.to_string(), "Deployer".to_string()),
        credentials("ROLE"),
    );
    Arc::new(FakePortal {
        account_pages: vec![
            vec![Account::new(ACCOUNT_ID, "production")],
            vec![Account::new("222222222222", "staging")],
        ],
        role_pages,
        role_credentials,
        ..FakePortal::default()
    })
}

fn lambda() -> Arc<FakeLambda> {
    let mut lambda = FakeLambda::with_functions(&[&["deploy-api", "deploy-web"]]);
    lambda
        .responses
        .insert("deploy-api".to_string(), br#"{"ok":true}"#.to_vec());
    Arc::new(lambda)
}

fn full_selection() -> ScriptedSelector {
    [
        (labels::ACCOUNT, ACCOUNT_ID),
        (labels::ROLE, "Deployer"),
        (labels::FUNCTION, "deploy-api"),
    ]
    .into_iter()
    .collect()
}

fn options() -> WorkflowOptions {
    WorkflowOptions {
        open_browser: false,
        ..WorkflowOptions::default()
    }
}

fn strict_options() -> WorkflowOptions {
    WorkflowOptions {
        device_authorization: DeviceAuthorizationOptions {
            poll_errors: PollErrors::Strict,
            ..DeviceAuthorizationOptions::default()
        },
        ..options()
    }
}

#[tokio::test(start_paused = true)]
async fn runs_from_login_to_invocation() {
    let identity = Arc::new(FakeIdentityCenter::granting_immediately());
    let portal = portal();
    let lambda = lambda();
    let session = sso_session();

    let result = Workflow::new(
        session.clone(),
        identity.clone(),
        portal.clone(),
        lambda.clone(),
        full_selection(),
        deploy_inputs(),
        Answers::default(),
        options(),
    )
    .run()
    .await
    .unwrap()
    .unwrap();

    assert_eq!(br#"{"ok":true}"#.to_vec(), result.payload);
    assert_eq!(1, identity.token_request_count());
    assert_eq!(
        Some(Role::new("Deployer", ACCOUNT_ID)),
        session.current_role()
    );

    let invocations = lambda.invocations();
    assert_eq!(1, invocations.len());
    assert_eq!("ROLE", invocations[0].credentials_key);
    assert_eq!("deploy-api", invocations[0].function_name);
    assert_eq!(
        br#"{"cluster":"c1","service":"s1","ecr_tag":"t1"}"#.to_vec(),
        invocations[0].payload
    );
}

#[tokio::test(start_paused = true)]
async fn profile_account_and_role_skip_the_pickers() {
    let identity = Arc::new(FakeIdentityCenter::granting_immediately());
    let portal = portal();
    let lambda = lambda();
    let session = Arc::new(Session::new(SessionConfig {
        region: "us-east-1".to_string(),
        source: SessionSource::Sso(SsoConfig {
            start_url: common::START_URL.to_string(),
            account_id: Some(ACCOUNT_ID.to_string()),
            role_name: Some("Deployer".to_string()),
        }),
    }));
    let selector: ScriptedSelector = [(labels::FUNCTION, "deploy-api")].into_iter().collect();

    let result = Workflow::new(
        session,
        identity,
        portal.clone(),
        lambda.clone(),
        selector,
        deploy_inputs(),
        Answers::default(),
        options(),
    )
    .run()
    .await
    .unwrap();

    assert!(result.is_some());
    assert_eq!(
        vec![format!("get_role_credentials {} Deployer", ACCOUNT_ID)],
        *portal.requests.lock().unwrap()
    );
}

#[tokio::test]
async fn static_credentials_invoke_without_login() {
    let identity = Arc::new(FakeIdentityCenter::granting_immediately());
    let portal = portal();
    let lambda = lambda();
    let session = Arc::new(Session::with_credentials(
        SessionConfig {
            region: "eu-west-1".to_string(),
            source: SessionSource::Profile("ci".to_string()),
        },
        credentials("STATIC"),
    ));
    let answers = Answers {
        function_name: Some("deploy-api".to_string()),
        ..Answers::default()
    };

    let result = Workflow::new(
        session,
        identity.clone(),
        portal.clone(),
        lambda.clone(),
        ScriptedSelector::default(),
        deploy_inputs(),
        answers,
        options(),
    )
    .run()
    .await
    .unwrap();

    assert!(result.is_some());
    assert!(identity.registrations.lock().unwrap().is_empty());
    assert_eq!(0, portal.request_count());
    assert_eq!("STATIC", lambda.invocations()[0].credentials_key);
}

#[tokio::test(start_paused = true)]
async fn backing_out_of_a_picker_invokes_nothing() {
    let lambda = lambda();
    let selector: ScriptedSelector = [(labels::ACCOUNT, ACCOUNT_ID), (labels::ROLE, "Deployer")]
        .into_iter()
        .collect();

    let result = Workflow::new(
        sso_session(),
        Arc::new(FakeIdentityCenter::granting_immediately()),
        portal(),
        lambda.clone(),
        selector,
        deploy_inputs(),
        Answers::default(),
        options(),
    )
    .run()
    .await
    .unwrap();

    assert!(result.is_none());
    assert!(lambda.invocations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_login_is_returned_to_the_caller() {
    let identity = Arc::new(FakeIdentityCenter::new(
        600,
        1,
        vec![Err(ProviderError::new(
            Some("AccessDeniedException"),
            "user denied the request",
        ))],
    ));
    let portal = portal();
    let session = sso_session();

    let error = Workflow::new(
        session.clone(),
        identity,
        portal.clone(),
        lambda(),
        full_selection(),
        deploy_inputs(),
        Answers::default(),
        strict_options(),
    )
    .run()
    .await
    .unwrap_err();

    assert!(matches!(
        error.downcast_ref::<Error>(),
        Some(Error::AuthenticationFailed(_))
    ));
    assert!(session.bearer_token().is_none());
    assert_eq!(0, portal.request_count());
}

#[tokio::test(start_paused = true)]
async fn login_can_be_restarted() {
    let session = sso_session();
    let denied = Arc::new(FakeIdentityCenter::new(
        600,
        1,
        vec![Err(ProviderError::new(Some("ExpiredTokenException"), "expired"))],
    ));
    let first = Workflow::new(
        session.clone(),
        denied,
        portal(),
        lambda(),
        full_selection(),
        deploy_inputs(),
        Answers::default(),
        strict_options(),
    )
    .run()
    .await;
    assert!(first.is_err());

    let granting = Arc::new(FakeIdentityCenter::new(
        600,
        1,
        vec![Ok(TokenPoll::Pending), Ok(common::granted())],
    ));
    let second = Workflow::new(
        session,
        granting.clone(),
        portal(),
        lambda(),
        full_selection(),
        deploy_inputs(),
        Answers::default(),
        options(),
    )
    .run()
    .await
    .unwrap();

    assert!(second.is_some());
    assert_eq!(2, granting.token_request_count());
}

#[tokio::test(start_paused = true)]
async fn accounts_are_listed_after_login() {
    let identity = Arc::new(FakeIdentityCenter::granting_immediately());

    let accounts = Workflow::new(
        sso_session(),
        identity.clone(),
        portal(),
        lambda(),
        ScriptedSelector::default(),
        deploy_inputs(),
        Answers::default(),
        options(),
    )
    .list_accounts()
    .await
    .unwrap();

    assert_eq!(
        vec![
            Account::new(ACCOUNT_ID, "production"),
            Account::new("222222222222", "staging"),
        ],
        accounts
    );
    assert_eq!(1, identity.token_request_count());
}

#[tokio::test]
async fn functions_are_listed_with_static_credentials() {
    let functions = Workflow::new(
        Arc::new(Session::with_credentials(
            SessionConfig {
                region: "eu-west-1".to_string(),
                source: SessionSource::Profile("ci".to_string()),
            },
            credentials("STATIC"),
        )),
        Arc::new(FakeIdentityCenter::granting_immediately()),
        portal(),
        lambda(),
        ScriptedSelector::default(),
        deploy_inputs(),
        Answers::default(),
        options(),
    )
    .list_functions()
    .await
    .unwrap()
    .unwrap();

    let names: Vec<&str> = functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(vec!["deploy-api", "deploy-web"], names);
}

#[tokio::test(start_paused = true)]
async fn interrupt_during_login_cancels_polling() {
    let identity = Arc::new(FakeIdentityCenter::new(600, 1, vec![Ok(TokenPoll::Pending)]));
    let lambda = lambda();
    let cancel = tokio_util::sync::CancellationToken::new();
    let workflow = Workflow::new(
        sso_session(),
        identity.clone(),
        portal(),
        lambda.clone(),
        full_selection(),
        deploy_inputs(),
        Answers::default(),
        WorkflowOptions {
            cancel: cancel.clone(),
            ..options()
        },
    );

    let (result, _) = tokio::join!(workflow.run(), async {
        tokio::time::sleep(std::time::Duration::from_millis(2500)).await;
        cancel.cancel();
    });

    let error = result.unwrap_err();
    assert!(matches!(
        error.downcast_ref::<Error>(),
        Some(Error::AuthenticationCancelled)
    ));
    assert_eq!(3, identity.token_request_count());
    assert!(lambda.invocations().is_empty());
}

#[tokio::test]
async fn interrupted_workflow_runs_no_further_steps() {
    let portal = portal();
    let lambda = lambda();
    let cancel = tokio_util::sync::CancellationToken::new();
    cancel.cancel();

    let result = Workflow::new(
        common::logged_in_session(),
        Arc::new(FakeIdentityCenter::granting_immediately()),
        portal.clone(),
        lambda.clone(),
        full_selection(),
        deploy_inputs(),
        Answers::default(),
        WorkflowOptions {
            cancel,
            ..options()
        },
    )
    .run()
    .await;

    assert!(result.is_err());
    assert_eq!(0, portal.request_count());
    assert!(lambda.invocations().is_empty());
}
