use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use aws_utility::app::{app, App};

/// `LOG_LEVEL` takes `debug`, `info`, `warn`, `error` or any filter
/// directive; `RUST_LOG` is the fallback.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// The first ctrl-c cancels the running operation, a second one exits.
fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("interrupted, press ctrl-c again to exit");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(130);
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let app = App::from(app().await?);
    match app.run(cancel).await {
        Ok(_) => Ok(()),
        Err(e) => {
            error!("error:{:?}", e);
            Err(e)
        }
    }
}
