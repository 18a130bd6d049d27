use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // VMP_MQTT_PASSWORD is deliberately absent
    const DISPLAY_ENVS: [&str; 15] = [
        "RUST_LOG",
        "VMP_HOST",
        "VMP_PORT",
        "VMP_DATABASE_URL",
        "VMP_MQTT_BROKER_URL",
        "VMP_MQTT_CLIENT_ID",
        "VMP_MQTT_USERNAME",
        "VMP_MQTT_KEEP_ALIVE_SECS",
        "VMP_TOPIC_ROOT",
        "VMP_LIVENESS_WINDOW_SECS",
        "VMP_LOG_CAPACITY",
        "VMP_SETTLEMENT_TIMEOUT_MS",
        "VMP_IDEMPOTENCY_RETENTION_SECS",
        "VMP_MIN_TEMPERATURE",
        "VMP_MAX_TEMPERATURE",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
