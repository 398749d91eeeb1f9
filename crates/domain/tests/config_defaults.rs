use tg_domain::config::{BackoffStrategy, Config, ConfigSeverity, Topology};

#[test]
fn default_heartbeat_timings() {
    let config = Config::default();
    assert_eq!(config.connection.heartbeat_interval_ms, 30_000);
    assert_eq!(config.connection.heartbeat_timeout_ms, 10_000);
    assert_eq!(config.connection.request_timeout_ms, 30_000);
}

#[test]
fn default_reconnect_interval_is_five_seconds() {
    let config = Config::default();
    assert_eq!(config.backoff.initial_delay_ms, 5_000);
    assert_eq!(config.backoff.strategy, BackoffStrategy::Exponential);
    assert_eq!(config.backoff.max_attempts, 10);
}

#[test]
fn default_topology_is_shared() {
    let config = Config::default();
    assert_eq!(config.routing.topology, Topology::Shared);
}

#[test]
fn default_tool_call_timeout_and_history() {
    let config = Config::default();
    assert_eq!(config.tool_call.timeout_ms, 30_000);
    assert_eq!(config.tool_call.max_attempts, 3);
    assert_eq!(config.tool_call.history_capacity, 100);
}

#[test]
fn default_process_settings() {
    let config = Config::default();
    assert_eq!(config.process.max_restarts, 3);
    assert_eq!(config.process.shutdown_grace_ms, 5_000);
}

#[test]
fn endpoints_parse_with_process() {
    let toml_str = r#"
[[endpoints]]
url = "ws://coordinator-a:9100/mcp"

[[endpoints]]
url = "wss://coordinator-b/mcp"

[endpoints.process]
command = "npx"
args = ["-y", "some-mcp-server"]

[routing]
topology = "dedicated"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.endpoints.len(), 2);
    assert!(config.endpoints[0].process.is_none());
    let proc = config.endpoints[1].process.as_ref().unwrap();
    assert_eq!(proc.command, "npx");
    assert_eq!(proc.args, vec!["-y", "some-mcp-server"]);
    assert_eq!(config.routing.topology, Topology::Dedicated);
}

#[test]
fn validate_rejects_non_ws_url() {
    let toml_str = r#"
[[endpoints]]
url = "http://not-a-socket"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.field == "endpoints[0].url"));
}

#[test]
fn validate_requires_process_for_dedicated() {
    let toml_str = r#"
[[endpoints]]
url = "ws://coordinator:9100/mcp"

[routing]
topology = "dedicated"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Error && i.field.contains("process")));
}

#[test]
fn validate_warns_when_heartbeat_timeout_exceeds_interval() {
    let toml_str = r#"
[[endpoints]]
url = "ws://coordinator:9100/mcp"

[connection]
heartbeat_interval_ms = 5000
heartbeat_timeout_ms = 10000
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    let issues = config.validate();
    assert!(issues
        .iter()
        .any(|i| i.severity == ConfigSeverity::Warning
            && i.field == "connection.heartbeat_timeout_ms"));
}

#[test]
fn empty_config_parses_to_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert!(config.endpoints.is_empty());
    assert_eq!(config.connection.connect_timeout_ms, 10_000);
}

#[test]
fn retry_delay_grows_and_clamps() {
    let config = Config::default();
    let d1 = config.tool_call.retry_delay(1);
    let d2 = config.tool_call.retry_delay(2);
    assert_eq!(d1.as_millis(), 1_000);
    assert_eq!(d2.as_millis(), 2_000);
    // Far attempts clamp to the cap.
    assert_eq!(config.tool_call.retry_delay(30).as_millis(), 30_000);
}
