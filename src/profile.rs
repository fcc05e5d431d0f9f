use std::collections::BTreeMap;

pub mod load;

#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub name: String,
    pub region_name: Option<String>,
    pub sso_session_name: Option<String>,
    pub sso_start_url: Option<String>,
    pub sso_region: Option<String>,
    pub sso_account_id: Option<String>,
    pub sso_role_name: Option<String>,
}

impl Profile {
    pub fn has_sso(&self) -> bool {
        self.sso_start_url.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn region_name(&self) -> Option<&str> {
        self.region_name.as_deref()
    }

    pub fn sso_session_name(&self) -> Option<&str> {
        self.sso_session_name.as_deref()
    }

    pub fn sso_start_url(&self) -> Option<&str> {
        self.sso_start_url.as_deref()
    }

    pub fn sso_region(&self) -> Option<&str> {
        self.sso_region.as_deref()
    }

    pub fn sso_account_id(&self) -> Option<&str> {
        self.sso_account_id.as_deref()
    }

    pub fn sso_role_name(&self) -> Option<&str> {
        self.sso_role_name.as_deref()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileSet {
    pub profiles: BTreeMap<String, Profile>,
}

impl ProfileSet {
    pub fn get_profile(&self, profile_name: &str) -> Option<&Profile> {
        self.profiles.get(profile_name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(|k| k.as_str())
    }
}

impl FromIterator<Profile> for ProfileSet {
    fn from_iter<I: IntoIterator<Item = Profile>>(iter: I) -> Self {
        let profiles = iter
            .into_iter()
            .map(|p| (p.name.clone(), p))
            .collect::<BTreeMap<_, _>>();
        ProfileSet { profiles }
    }
}
