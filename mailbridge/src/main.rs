use std::sync::Arc;

use clap::Parser;
use tracing::info;

use mailbridge::{
    BridgeConfig, BridgeService, Cli, Dispatcher, FsMailbox, ProcessLauncher, VersionInfo,
    telemetry, transport,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();

    let config = BridgeConfig::try_from(Cli::parse())?;
    info!("mailbridge {}", env!("CARGO_PKG_VERSION"));
    info!(
        mailbox = %config.mailbox_dir.display(),
        worker = %config.worker,
        worker_timeout_s = config.worker_timeout.as_secs(),
        request_timeout_s = config.request_timeout.as_secs(),
        "Configuration loaded"
    );

    let mailbox = Arc::new(FsMailbox::new(&config.mailbox_dir));
    let launcher = Arc::new(ProcessLauncher::new(
        config.worker.clone(),
        &config.mailbox_dir,
    ));
    let dispatcher =
        Dispatcher::new(mailbox, launcher).with_worker_timeout(config.worker_timeout);

    let service = Arc::new(
        BridgeService::new(dispatcher)
            .with_request_timeout(config.request_timeout)
            .with_version(VersionInfo::new().with_worker(config.worker.to_string())),
    );

    // A broken mailbox leaves the server up but DEFUNCT, so health checks can see why.
    let _ = service.start().await;

    transport::serve(config.server, service).await
}
