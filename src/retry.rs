//! Re-invoke an engine that reports it is still warming up.

use tracing::info;

use crate::transport::{EngineCall, EngineTransport, RawOutcome};

/// Text a warming-up engine prints on stdout.
pub const WARMUP_MARKER: &str = "Please wait until the";

/// Whether an outcome asks to be retried with `budget` retries left.
pub fn should_retry(outcome: &RawOutcome, budget: u32) -> bool {
    budget > 0
        && outcome
            .stdout()
            .is_some_and(|stdout| stdout.contains(WARMUP_MARKER))
}

/// Invoke `call`, retrying immediately while the engine is warming up.
///
/// Makes at most `budget + 1` attempts and returns the last outcome.
pub async fn invoke_with_retry(
    transport: &dyn EngineTransport,
    call: &EngineCall,
    budget: u32,
) -> RawOutcome {
    let mut remaining = budget;
    loop {
        let outcome = transport.invoke(call).await;
        if !should_retry(&outcome, remaining) {
            return outcome;
        }
        remaining -= 1;
        info!(operation = call.operation, remaining, "engine is warming up, retrying");
    }
}
