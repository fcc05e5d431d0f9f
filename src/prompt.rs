use std::collections::HashMap;
use std::io;
use std::io::Write;

use async_trait::async_trait;
use tracing::warn;

use crate::device_auth::AuthenticationChallenge;

#[async_trait]
pub trait ReadInput {
    async fn read_input(&self, label: &str) -> anyhow::Result<String>;
}

pub struct StdinInputReader;

#[async_trait]
impl ReadInput for StdinInputReader {
    async fn read_input(&self, label: &str) -> anyhow::Result<String> {
        let label = label.to_string();
        tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
            eprint!("Enter {}: ", label);
            io::stderr().flush()?;

            let mut value = String::new();
            io::stdin().read_line(&mut value)?;
            Ok(value.trim().to_string())
        })
        .await?
    }
}

/// Answers from values given up front, keyed by label.
#[derive(Debug, Default)]
pub struct StaticInputReader {
    values: HashMap<String, String>,
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for StaticInputReader {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        StaticInputReader {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl ReadInput for StaticInputReader {
    async fn read_input(&self, label: &str) -> anyhow::Result<String> {
        self.values
            .get(label)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no value given for {}", label))
    }
}

/// Tells the user where to approve the login, on stderr so stdout stays
/// clean for command output.
pub fn show_challenge(challenge: &AuthenticationChallenge, open_browser: bool) {
    eprintln!(
        "Approve the login at {} and confirm the code {}",
        challenge.verification_uri, challenge.user_code
    );

    if open_browser {
        if let Err(e) = open::that(challenge.browser_uri()) {
            warn!("failed to open browser. error:{}", e);
        }
    }
}
