use std::env;
use std::ffi::OsStr;
use std::io;
use std::time::Duration;

use clap::builder::{PossibleValue, TypedValueParser};
use clap::ArgAction;
use clap_complete::Shell;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::assume_role::aws_sdk::AwsSdkPortal;
use crate::device_auth::aws_sdk::AwsSdkDeviceAuthorization;
use crate::device_auth::{DeviceAuthorizationOptions, PollErrors};
use crate::function::aws_sdk::AwsSdkFunctions;
use crate::profile::load::aws_sdk::AwsSdkProfileLoader;
use crate::profile::load::LoadProfiles;
use crate::prompt::StdinInputReader;
use crate::run::{Answers, Workflow, WorkflowOptions};
use crate::select::skim::SkimSelector;
use crate::select::SingleOr;
use crate::session::aws_sdk::load_sdk_config;
use crate::session::new_session;

const NAME: &str = "aws-utility";

async fn profile_names<L: LoadProfiles>(loader: L) -> anyhow::Result<Vec<String>> {
    let profiles = loader.load_profiles().await?;
    Ok(profiles.names().map(|n| n.to_string()).collect::<Vec<_>>())
}

#[derive(Debug, Clone)]
struct ProfileNameParser {
    profile_names: Vec<String>,
}

impl From<Vec<String>> for ProfileNameParser {
    fn from(profile_names: Vec<String>) -> Self {
        ProfileNameParser { profile_names }
    }
}

impl TypedValueParser for ProfileNameParser {
    type Value = String;

    fn parse_ref(
        &self,
        cmd: &clap::Command,
        _arg: Option<&clap::Arg>,
        value: &OsStr,
    ) -> Result<Self::Value, clap::Error> {
        let value = value
            .to_os_string()
            .into_string()
            .map_err(|_| clap::Error::new(clap::error::ErrorKind::InvalidUtf8).with_cmd(cmd))?;

        if self.profile_names.contains(&value) {
            Ok(value)
        } else {
            Err(clap::Error::new(clap::error::ErrorKind::InvalidValue).with_cmd(cmd))
        }
    }

    fn possible_values(&self) -> Option<Box<dyn Iterator<Item = PossibleValue> + '_>> {
        Some(Box::new(
            self.profile_names
                .clone()
                .into_iter()
                .map(PossibleValue::new),
        ))
    }
}

fn required_value(name: &'static str, help: &'static str) -> clap::Arg {
    clap::Arg::new(name)
        .long(name)
        .required(true)
        .value_hint(clap::ValueHint::Other)
        .help(help)
}

pub fn command(profile_names: Vec<String>) -> clap::Command {
    let name_parser = ProfileNameParser::from(profile_names);

    clap::Command::new(NAME)
        .disable_colored_help(false)
        .about("Log in with AWS IAM Identity Center and invoke deployment Lambdas.")
        .arg(
            clap::Arg::new("profile")
                .short('p')
                .long("profile")
                .global(true)
                .value_hint(clap::ValueHint::Other)
                .value_parser(name_parser)
                .help("Profile of the shared AWS config to use. Defaults to $AWS_PROFILE."),
        )
        .arg(
            clap::Arg::new("start-url")
                .long("start-url")
                .global(true)
                .conflicts_with("profile")
                .value_hint(clap::ValueHint::Url)
                .help("IAM Identity Center start URL to log in to."),
        )
        .arg(
            clap::Arg::new("region")
                .short('r')
                .long("region")
                .global(true)
                .value_hint(clap::ValueHint::Other)
                .help("Region to use instead of the profile's."),
        )
        .arg(
            clap::Arg::new("account")
                .long("account")
                .global(true)
                .value_hint(clap::ValueHint::Other)
                .help("Account id to assume the role in."),
        )
        .arg(
            clap::Arg::new("role")
                .long("role")
                .global(true)
                .value_hint(clap::ValueHint::Other)
                .help("Name of the role to assume."),
        )
        .arg(
            clap::Arg::new("no-browser")
                .long("no-browser")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Do not open the verification page in a browser."),
        )
        .arg(
            clap::Arg::new("strict-polling")
                .long("strict-polling")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Fail the login on the first unexpected error while waiting for approval."),
        )
        .arg(
            clap::Arg::new("register-timeout")
                .long("register-timeout")
                .global(true)
                .value_parser(clap::value_parser!(u64))
                .help("Seconds to wait for client registration."),
        )
        .subcommand(clap::Command::new("accounts").about("Show the accounts you can access."))
        .subcommand(
            clap::Command::new("roles")
                .about("Show the roles you can assume in an account.")
                .arg(
                    clap::Arg::new("account_id")
                        .required(true)
                        .value_hint(clap::ValueHint::Other)
                        .help("Account id."),
                ),
        )
        .subcommand(
            clap::Command::new("list-functions")
                .visible_alias("list_lambdas")
                .about("Show the available Lambda functions."),
        )
        .subcommand(
            clap::Command::new("invoke")
                .visible_aliases(["lambda", "l"])
                .about("Invoke a Lambda function with a deploy request.")
                .arg(
                    clap::Arg::new("function")
                        .required(true)
                        .value_hint(clap::ValueHint::Other)
                        .help("Name of the Lambda function."),
                )
                .arg(required_value("cluster", "Cluster name."))
                .arg(required_value("service", "Service name."))
                .arg(required_value("tag", "Image tag to deploy.")),
        )
        .subcommand(
            clap::Command::new("interactive")
                .about("Choose account, role and function step by step (default)."),
        )
        .subcommand(
            clap::Command::new("completions")
                .about("Print shell completions.")
                .arg(
                    clap::Arg::new("shell")
                        .required(true)
                        .value_parser(clap::value_parser!(Shell))
                        .help("Target shell."),
                ),
        )
}

pub async fn app() -> anyhow::Result<clap::Command> {
    let profile_names = profile_names(AwsSdkProfileLoader::default()).await?;
    Ok(command(profile_names))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// A profile name or a start URL.
    pub name: String,
    pub region: Option<String>,
    pub account_id: Option<String>,
    pub role_name: Option<String>,
    pub open_browser: bool,
    pub poll_errors: PollErrors,
    pub register_timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoke {
    pub function_name: String,
    pub cluster: String,
    pub service: String,
    pub ecr_tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    ListAccounts,
    ListRoles(String),
    ListFunctions,
    Invoke(Invoke),
    Interactive,
}

#[derive(Debug)]
pub enum App {
    Run(Target, Action),
    Completions(Shell, clap::Command),
}

impl App {
    pub fn from_matches(c: clap::Command, matches: clap::ArgMatches) -> Self {
        let get = |id: &str| matches.get_one::<String>(id).map(|s| s.to_string());

        if let Some(("completions", sub)) = matches.subcommand() {
            let shell = sub.get_one::<Shell>("shell").copied().unwrap_or(Shell::Bash);
            return App::Completions(shell, c);
        }

        let target = Target {
            name: get("start-url")
                .or_else(|| get("profile"))
                .or_else(|| env::var("AWS_PROFILE").ok())
                .unwrap_or_else(|| "default".to_string()),
            region: get("region"),
            account_id: get("account"),
            role_name: get("role"),
            open_browser: !matches.get_flag("no-browser"),
            poll_errors: if matches.get_flag("strict-polling") {
                PollErrors::Strict
            } else {
                PollErrors::Permissive
            },
            register_timeout: matches
                .get_one::<u64>("register-timeout")
                .map(|s| Duration::from_secs(*s)),
        };

        let sub_get = |sub: &clap::ArgMatches, id: &str| {
            sub.get_one::<String>(id).cloned().unwrap_or_default()
        };
        let action = match matches.subcommand() {
            Some(("accounts", _)) => Action::ListAccounts,
            Some(("roles", sub)) => Action::ListRoles(sub_get(sub, "account_id")),
            Some(("list-functions", _)) => Action::ListFunctions,
            Some(("invoke", sub)) => Action::Invoke(Invoke {
                function_name: sub_get(sub, "function"),
                cluster: sub_get(sub, "cluster"),
                service: sub_get(sub, "service"),
                ecr_tag: sub_get(sub, "tag"),
            }),
            _ => Action::Interactive,
        };

        App::Run(target, action)
    }
}

impl From<clap::Command> for App {
    fn from(c: clap::Command) -> Self {
        let matches = c.clone().get_matches();
        App::from_matches(c, matches)
    }
}

impl App {
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        match self {
            App::Completions(shell, mut c) => {
                clap_complete::generate(shell, &mut c, NAME, &mut io::stdout());
                Ok(())
            }
            App::Run(target, action) => Self::run_action(target, action, cancel).await,
        }
    }

    async fn run_action(
        target: Target,
        action: Action,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let session = new_session(
            &target.name,
            target.region.as_deref(),
            &AwsSdkProfileLoader::default(),
        )
        .await?;
        let sdk_config = load_sdk_config(session.region()).await;

        let mut device_authorization = DeviceAuthorizationOptions {
            poll_errors: target.poll_errors,
            ..DeviceAuthorizationOptions::default()
        };
        if let Some(timeout) = target.register_timeout {
            device_authorization.register_timeout = timeout;
        }

        let mut answers = Answers {
            account_id: target.account_id.clone(),
            role_name: target.role_name.clone(),
            ..Answers::default()
        };
        if let Action::Invoke(invoke) = &action {
            answers.function_name = Some(invoke.function_name.clone());
            answers.cluster = Some(invoke.cluster.clone());
            answers.service = Some(invoke.service.clone());
            answers.ecr_tag = Some(invoke.ecr_tag.clone());
        }

        let workflow = Workflow::new(
            std::sync::Arc::new(session),
            AwsSdkDeviceAuthorization::from(&sdk_config),
            AwsSdkPortal::from(&sdk_config),
            AwsSdkFunctions::from(&sdk_config),
            SingleOr::new(SkimSelector),
            StdinInputReader,
            answers,
            WorkflowOptions {
                device_authorization,
                open_browser: target.open_browser,
                cancel,
            },
        );

        match action {
            Action::ListAccounts => {
                for a in workflow.list_accounts().await? {
                    println!("{}\t{}", a.id, a.name);
                }
            }
            Action::ListRoles(account_id) => {
                for r in workflow.list_roles(&account_id).await? {
                    println!("{}", r.name);
                }
            }
            Action::ListFunctions => {
                for f in workflow.list_functions().await?.unwrap_or_default() {
                    println!("{}", f.name);
                }
            }
            Action::Invoke(_) | Action::Interactive => {
                if let Some(result) = workflow.run().await? {
                    info!(
                        "function invoked. status_code:{}, executed_version:{:?}",
                        result.status_code, result.executed_version
                    );
                    println!("{}", result.payload_lossy());
                }
            }
        }

        Ok(())
    }
}
