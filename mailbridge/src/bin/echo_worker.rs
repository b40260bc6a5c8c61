//! Reference worker: answers every request with `echo: <message>`.

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;

use mailbridge::{RequestArtifact, RequestHandler, ResponseArtifact, WorkerError, run_worker};

#[derive(Debug, Parser)]
#[command(name = "mailbridge-echo-worker", version, about = "Echo worker for mailbridge")]
struct Args {
    /// Sleep this long before answering.
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// Confidence to report; omitted from the response when unset.
    #[arg(long)]
    confidence: Option<f64>,

    /// Correlation id, appended by the bridge.
    id: String,
}

struct Echo {
    delay: Duration,
    confidence: Option<f64>,
}

#[async_trait::async_trait]
impl RequestHandler for Echo {
    async fn handle(&self, request: RequestArtifact) -> Result<ResponseArtifact, WorkerError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let response = ResponseArtifact::new(format!("echo: {}", request.payload));
        Ok(match self.confidence {
            Some(c) => response.with_confidence(c),
            None => response,
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    mailbridge::telemetry::init_tracing();

    let args = Args::parse();
    let handler = Echo {
        delay: Duration::from_millis(args.delay_ms),
        confidence: args.confidence,
    };
    run_worker(args.id, &handler).await
}
