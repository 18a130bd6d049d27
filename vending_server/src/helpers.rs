use rand::{distributions::Alphanumeric, thread_rng, Rng};
use vending_engine::vm_types::{CorrelationToken, InvalidIdentifier};

const TOKEN_PREFIX: &str = "TEMP_";

/// A fresh correlation token for intents submitted without one, e.g. `TEMP_x8Kd02LmQa7Z`.
pub fn new_correlation_token() -> Result<CorrelationToken, InvalidIdentifier> {
    let suffix = thread_rng().sample_iter(&Alphanumeric).take(12).map(char::from).collect::<String>();
    format!("{TOKEN_PREFIX}{suffix}").parse()
}
