use std::time::SystemTime;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_lambda::primitives::Blob;
use tracing::instrument;

use aws_utility_schema::credentials::Credentials;

use crate::error::ProviderError;
use crate::function::{FunctionApi, FunctionDescriptor, InvocationResult};
use crate::paginate::Page;

const PROVIDER_NAME: &str = "aws-utility";

/// Builds a Lambda client per call so every request is signed with the
/// credentials the session holds at that moment.
#[derive(Debug, Clone)]
pub struct AwsSdkFunctions {
    config: SdkConfig,
}

impl From<&SdkConfig> for AwsSdkFunctions {
    fn from(config: &SdkConfig) -> Self {
        AwsSdkFunctions {
            config: config.clone(),
        }
    }
}

impl AwsSdkFunctions {
    fn client(&self, credentials: &Credentials) -> aws_sdk_lambda::Client {
        let provider = aws_sdk_lambda::config::Credentials::new(
            credentials.key(),
            credentials.secret(),
            credentials.token().map(|s| s.to_string()),
            credentials.expires_at().map(SystemTime::from),
            PROVIDER_NAME,
        );
        let config = aws_sdk_lambda::config::Builder::from(&self.config)
            .credentials_provider(provider)
            .build();
        aws_sdk_lambda::Client::from_conf(config)
    }
}

#[async_trait]
impl FunctionApi for AwsSdkFunctions {
    #[instrument(skip(self, credentials))]
    async fn list_functions(
        &self,
        credentials: &Credentials,
        marker: Option<String>,
    ) -> Result<Page<FunctionDescriptor>, ProviderError> {
        let output = self
            .client(credentials)
            .list_functions()
            .set_marker(marker)
            .send()
            .await
            .map_err(ProviderError::from_sdk)?;

        let functions = output
            .functions
            .unwrap_or_default()
            .into_iter()
            .filter_map(|f| f.function_name.map(FunctionDescriptor::new))
            .collect::<Vec<_>>();

        Ok(Page::new(functions, output.next_marker))
    }

    #[instrument(skip(self, credentials, payload))]
    async fn invoke(
        &self,
        credentials: &Credentials,
        function_name: &str,
        payload: Vec<u8>,
    ) -> Result<InvocationResult, ProviderError> {
        let output = self
            .client(credentials)
            .invoke()
            .function_name(function_name)
            .payload(Blob::new(payload))
            .send()
            .await
            .map_err(ProviderError::from_sdk)?;

        let payload = output.payload.map(Blob::into_inner).unwrap_or_default();

        // The call itself succeeded but the function raised; the payload
        // holds the error document.
        if let Some(function_error) = output.function_error {
            return Err(ProviderError::new(
                Some(&function_error),
                String::from_utf8_lossy(&payload).into_owned(),
            ));
        }

        Ok(InvocationResult {
            status_code: output.status_code,
            executed_version: output.executed_version,
            payload,
        })
    }
}
