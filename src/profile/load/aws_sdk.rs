use std::convert::TryFrom;

use async_trait::async_trait;
use aws_config::profile::load;
use aws_runtime::env_config::file::EnvConfigFiles;
use aws_runtime::env_config::section::EnvConfigSections;
use aws_types::os_shim_internal::{Env, Fs};

use crate::profile::load::LoadProfiles;
use crate::profile::{Profile, ProfileSet};

fn profile_from(
    name: &str,
    value: &aws_config::profile::Profile,
    sections: &EnvConfigSections,
) -> Profile {
    fn maybe_s<S: Into<String>>(s: Option<S>) -> Option<String> {
        s.map(|x| x.into())
    }

    // `sso_session = name` moves the start URL and region into a
    // `[sso-session name]` section; values on the profile itself win.
    let sso_session_name = value.get("sso_session");
    let session = sso_session_name.and_then(|n| sections.sso_session(n));
    let sso_get = |key: &str| value.get(key).or_else(|| session.and_then(|s| s.get(key)));

    Profile {
        name: name.to_string(),
        region_name: maybe_s(value.get("region")),
        sso_session_name: maybe_s(sso_session_name),
        sso_start_url: maybe_s(sso_get("sso_start_url")),
        sso_region: maybe_s(sso_get("sso_region")),
        sso_account_id: maybe_s(value.get("sso_account_id")),
        sso_role_name: maybe_s(value.get("sso_role_name")),
    }
}

impl TryFrom<EnvConfigSections> for ProfileSet {
    type Error = anyhow::Error;

    fn try_from(value: EnvConfigSections) -> Result<Self, Self::Error> {
        let profiles = value
            .profiles()
            .filter_map(|n| value.get_profile(n).map(|p| profile_from(n, p, &value)))
            .collect::<ProfileSet>();
        Ok(profiles)
    }
}

#[derive(Debug, Default)]
pub struct AwsSdkProfileLoader {
    profile_files: EnvConfigFiles,
    fs: Fs,
    env: Env,
}

#[async_trait]
impl LoadProfiles for AwsSdkProfileLoader {
    async fn load_profiles(&self) -> anyhow::Result<ProfileSet> {
        let profiles = load(&self.fs, &self.env, &self.profile_files, None).await?;
        Ok(ProfileSet::try_from(profiles)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
[default]
region = ap-northeast-1

[profile deploy]
sso_session = corp
sso_account_id = 123456789012
sso_role_name = Deployer
region = eu-west-1

[profile legacy]
sso_start_url = https://legacy.awsapps.com/start
sso_region = us-west-2

[sso-session corp]
sso_start_url = https://corp.awsapps.com/start
sso_region = us-east-1
"#;

    async fn load_from(config: &str) -> ProfileSet {
        let fs = Fs::from_slice(&[("config", config)]);
        let env = Env::from_slice(&[("AWS_CONFIG_FILE", "config"), ("HOME", "/home")]);
        let loader = AwsSdkProfileLoader {
            profile_files: EnvConfigFiles::default(),
            fs,
            env,
        };
        loader.load_profiles().await.unwrap()
    }

    #[tokio::test]
    async fn resolves_sso_session_sections() {
        let profiles = load_from(CONFIG).await;
        let deploy = profiles.get_profile("deploy").unwrap();
        assert_eq!(Some("corp"), deploy.sso_session_name());
        assert_eq!(Some("https://corp.awsapps.com/start"), deploy.sso_start_url());
        assert_eq!(Some("us-east-1"), deploy.sso_region());
        assert_eq!(Some("123456789012"), deploy.sso_account_id());
        assert_eq!(Some("Deployer"), deploy.sso_role_name());
        assert_eq!(Some("eu-west-1"), deploy.region_name());
    }

    #[tokio::test]
    async fn legacy_sso_keys_and_plain_profiles() {
        let profiles = load_from(CONFIG).await;
        let legacy = profiles.get_profile("legacy").unwrap();
        assert_eq!(Some("https://legacy.awsapps.com/start"), legacy.sso_start_url());
        assert_eq!(Some("us-west-2"), legacy.sso_region());

        let default = profiles.get_profile("default").unwrap();
        assert!(!default.has_sso());
        assert_eq!(Some("ap-northeast-1"), default.region_name());
    }
}
