use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use switchboard_agent::{support_directory, support_registry, Disposition, HandoffController};
use switchboard_core::config::AppConfig;
use switchboard_core::SessionContext;

use crate::http::HttpCompletionsProvider;

/// Interactive console loop: one line in, one routed-and-validated answer
/// out. The session context persists across iterations; only its per-request
/// state is cleared between requests.
pub async fn run(
    config: &AppConfig,
    identity: String,
    privileged: bool,
    verbose: bool,
) -> Result<()> {
    let provider = Arc::new(HttpCompletionsProvider::from_config(&config.provider)?);
    let controller = HandoffController::new(
        Arc::new(support_directory()?),
        Arc::new(support_registry()?),
        provider,
        config.policy.clone(),
    )?;

    println!("Support desk ready - type 'exit' to quit.");
    let mut context = SessionContext::new(identity.clone(), privileged);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let maybe_line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
        };
        let Some(line) = maybe_line else { break };
        let message = line.trim().to_string();
        if message.is_empty() {
            continue;
        }
        if message == "exit" {
            break;
        }

        context.begin_request();
        let mut handle = controller.start_request(message, context);
        if let Some(mut stream) = handle.events() {
            while let Some(event) = stream.next().await {
                if verbose {
                    println!("  [{}]", event.kind.name());
                }
            }
        }

        match handle.result().await {
            Ok(outcome) => {
                match &outcome.disposition {
                    Disposition::Accepted { answer } => println!("{answer}"),
                    Disposition::Failed { error } => println!("(request failed: {error})"),
                }
                context = outcome.context;
            }
            Err(error) => {
                // The request tore down without an outcome; resume the
                // session with a fresh context.
                println!("(request aborted: {error})");
                context = SessionContext::new(identity.clone(), privileged);
            }
        }
    }

    Ok(())
}
