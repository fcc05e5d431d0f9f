use async_trait::async_trait;

use crate::profile::ProfileSet;

pub mod aws_sdk;

#[async_trait]
pub trait LoadProfiles {
    async fn load_profiles(&self) -> anyhow::Result<ProfileSet>;
}

/// Serves a fixed set of profiles; used when no shared config is wanted.
#[derive(Debug, Clone, Default)]
pub struct StaticProfileLoader {
    profiles: ProfileSet,
}

impl From<ProfileSet> for StaticProfileLoader {
    fn from(profiles: ProfileSet) -> Self {
        StaticProfileLoader { profiles }
    }
}

#[async_trait]
impl LoadProfiles for StaticProfileLoader {
    async fn load_profiles(&self) -> anyhow::Result<ProfileSet> {
        Ok(self.profiles.clone())
    }
}
