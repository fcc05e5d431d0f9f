use serde::{Deserialize, Serialize};

/// The request a deployment Lambda expects: which ECS service of which
/// cluster to roll to which image tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub cluster: String,
    pub service: String,
    pub ecr_tag: String,
}

impl DeployRequest {
    pub fn new<S: Into<String>>(cluster: S, service: S, ecr_tag: S) -> DeployRequest {
        DeployRequest {
            cluster: cluster.into(),
            service: service.into(),
            ecr_tag: ecr_tag.into(),
        }
    }

    pub fn to_payload(&self) -> anyhow::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
