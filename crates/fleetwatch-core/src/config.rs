//! fleetwatch.toml configuration parser.
//!
//! The file is parsed into a loose `RawConfig` and then validated into an
//! immutable [`WatchdogConfig`]. Validation failures are fatal at startup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::binding::{AlarmBinding, NodeId};
use crate::error::{ConfigError, ConfigResult};
use crate::types::{Comparison, NodeState, Statistic};

const DEFAULT_HEALTH_PATH: &str = "/info";
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_RETRY_INTERVAL: Duration = Duration::ZERO;
/// Longest accepted value for any duration field.
const MAX_DURATION: Duration = Duration::from_secs(7 * 24 * 3600);

// ── Validated config ───────────────────────────────────────────────

/// Immutable per-process configuration.
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// Upper bound on running nodes.
    pub node_limit: usize,
    pub watched_tag: WatchedTag,
    pub template: LaunchTemplate,
    pub application_port: u16,
    pub alarm_binding: AlarmBinding,
    pub alarm: AlarmSpec,
    pub check_period: Duration,
    /// Wall-clock ceiling for the health gate.
    pub endpoint_timeout: Duration,
    pub health: HealthSettings,
    pub proxy: ProxySettings,
    pub simulation: Option<SimulationConfig>,
}

/// Tag that marks nodes belonging to the managed fleet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WatchedTag {
    pub key: String,
    pub value: String,
}

/// How a launch template is referenced. Exactly one form is allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateRef {
    Id(String),
    Name(String),
}

/// Launch parameters for new nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchTemplate {
    pub reference: TemplateRef,
    pub version: Option<String>,
    pub subnet_id: Option<String>,
}

/// Parameters of the CPU-utilization alarm bound to every node.
#[derive(Debug, Clone, PartialEq)]
pub struct AlarmSpec {
    pub statistic: Statistic,
    pub period: Duration,
    pub evaluation_periods: u32,
    /// Percent CPU.
    pub threshold: f64,
    pub comparison: Comparison,
}

impl Default for AlarmSpec {
    fn default() -> Self {
        Self {
            statistic: Statistic::Average,
            period: Duration::from_secs(60),
            evaluation_periods: 1,
            threshold: 70.0,
            comparison: Comparison::GreaterThanThreshold,
        }
    }
}

/// Health gate probe settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSettings {
    pub path: String,
    /// Bound on a single probe attempt.
    pub probe_timeout: Duration,
    /// Fixed pause between failed attempts.
    pub retry_interval: Duration,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            path: DEFAULT_HEALTH_PATH.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            retry_interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Reverse-proxy config store and reload settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub config_path: PathBuf,
    /// Name of the upstream block that holds the fleet's members.
    pub upstream: String,
    /// Command (argv) that makes the proxy pick up a new config.
    pub reload_command: Vec<String>,
}

/// Seed for the in-memory cloud used in dev mode.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub nodes: Vec<SimulatedNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SimulatedNode {
    pub id: NodeId,
    pub state: NodeState,
    #[serde(default)]
    pub private_address: String,
}

/// Values the command line may override before validation.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub check_period: Option<String>,
}

// ── Raw file layout ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawConfig {
    node_limit: usize,
    watched_tag: WatchedTag,
    application_port: u16,
    alarm_name_prefix: String,
    check_period: String,
    endpoint_timeout: String,
    template: RawTemplate,
    alarm: Option<RawAlarm>,
    health: Option<RawHealth>,
    proxy: RawProxy,
    simulation: Option<SimulationConfig>,
}

#[derive(Debug, Deserialize)]
struct RawTemplate {
    id: Option<String>,
    name: Option<String>,
    version: Option<String>,
    subnet_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawAlarm {
    statistic: Option<Statistic>,
    period: Option<String>,
    evaluation_periods: Option<u32>,
    threshold: Option<f64>,
    comparison: Option<Comparison>,
}

#[derive(Debug, Deserialize)]
struct RawHealth {
    path: Option<String>,
    probe_timeout: Option<String>,
    retry_interval: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawProxy {
    config_path: PathBuf,
    upstream: String,
    reload_command: Option<Vec<String>>,
}

impl WatchdogConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        Self::from_file_with(path, &ConfigOverrides::default())
    }

    /// Load a config file, applying command-line overrides before validation.
    pub fn from_file_with(path: &Path, overrides: &ConfigOverrides) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str_with(&content, overrides)
    }

    /// Parse and validate config text.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        Self::from_toml_str_with(content, &ConfigOverrides::default())
    }

    fn from_toml_str_with(content: &str, overrides: &ConfigOverrides) -> ConfigResult<Self> {
        let mut raw: RawConfig = toml::from_str(content)?;
        if let Some(period) = &overrides.check_period {
            raw.check_period = period.clone();
        }
        raw.validate()
    }
}

impl RawConfig {
    fn validate(self) -> ConfigResult<WatchdogConfig> {
        if self.node_limit == 0 {
            return Err(invalid("node_limit", "must be at least 1"));
        }
        if self.application_port == 0 {
            return Err(invalid("application_port", "must be non-zero"));
        }
        if self.watched_tag.key.trim().is_empty() {
            return Err(invalid("watched_tag.key", "must not be empty"));
        }

        let check_period = duration_field("check_period", &self.check_period)?;
        if check_period.is_zero() {
            return Err(invalid("check_period", "must be non-zero"));
        }
        let endpoint_timeout = duration_field("endpoint_timeout", &self.endpoint_timeout)?;

        let alarm = match self.alarm {
            Some(raw) => raw.validate()?,
            None => AlarmSpec::default(),
        };
        let health = match self.health {
            Some(raw) => raw.validate()?,
            None => HealthSettings::default(),
        };

        if self.proxy.upstream.trim().is_empty() {
            return Err(invalid("proxy.upstream", "must not be empty"));
        }
        let reload_command = self.proxy.reload_command.unwrap_or_else(|| {
            vec!["systemctl".to_string(), "reload".to_string(), "nginx".to_string()]
        });
        if reload_command.is_empty() {
            return Err(invalid("proxy.reload_command", "must name a program"));
        }

        Ok(WatchdogConfig {
            node_limit: self.node_limit,
            watched_tag: self.watched_tag,
            template: self.template.validate()?,
            application_port: self.application_port,
            alarm_binding: AlarmBinding::new(self.alarm_name_prefix)?,
            alarm,
            check_period,
            endpoint_timeout,
            health,
            proxy: ProxySettings {
                config_path: self.proxy.config_path,
                upstream: self.proxy.upstream,
                reload_command,
            },
            simulation: self.simulation,
        })
    }
}

impl RawTemplate {
    fn validate(self) -> ConfigResult<LaunchTemplate> {
        let reference = match (self.id, self.name) {
            (Some(id), None) if !id.is_empty() => TemplateRef::Id(id),
            (None, Some(name)) if !name.is_empty() => TemplateRef::Name(name),
            (Some(_), Some(_)) => {
                return Err(ConfigError::AmbiguousTemplate(
                    "both template id and name given".to_string(),
                ));
            }
            _ => {
                return Err(ConfigError::AmbiguousTemplate(
                    "one of template id or name is required".to_string(),
                ));
            }
        };
        Ok(LaunchTemplate {
            reference,
            version: self.version,
            subnet_id: self.subnet_id,
        })
    }
}

impl RawAlarm {
    fn validate(self) -> ConfigResult<AlarmSpec> {
        let defaults = AlarmSpec::default();
        let period = match self.period {
            Some(p) => duration_field("alarm.period", &p)?,
            None => defaults.period,
        };
        if period.as_secs() == 0 {
            return Err(invalid("alarm.period", "must be at least one second"));
        }
        let evaluation_periods = self.evaluation_periods.unwrap_or(defaults.evaluation_periods);
        if evaluation_periods == 0 {
            return Err(invalid("alarm.evaluation_periods", "must be at least 1"));
        }
        let threshold = self.threshold.unwrap_or(defaults.threshold);
        if !(0.0..=100.0).contains(&threshold) {
            return Err(invalid("alarm.threshold", "must be a CPU percentage"));
        }
        Ok(AlarmSpec {
            statistic: self.statistic.unwrap_or(defaults.statistic),
            period,
            evaluation_periods,
            threshold,
            comparison: self.comparison.unwrap_or(defaults.comparison),
        })
    }
}

impl RawHealth {
    fn validate(self) -> ConfigResult<HealthSettings> {
        let defaults = HealthSettings::default();
        let path = self.path.unwrap_or(defaults.path);
        if !path.starts_with('/') {
            return Err(invalid("health.path", "must start with '/'"));
        }
        let probe_timeout = match self.probe_timeout {
            Some(t) => duration_field("health.probe_timeout", &t)?,
            None => defaults.probe_timeout,
        };
        let retry_interval = match self.retry_interval {
            Some(t) => duration_field("health.retry_interval", &t)?,
            None => defaults.retry_interval,
        };
        Ok(HealthSettings {
            path,
            probe_timeout,
            retry_interval,
        })
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

fn duration_field(field: &'static str, value: &str) -> ConfigResult<Duration> {
    let parsed = parse_duration(value).ok_or_else(|| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
    })?;
    if parsed > MAX_DURATION {
        return Err(invalid(field, "must not exceed 7 days"));
    }
    Ok(parsed)
}

/// Parse a duration string like "5s", "500ms", "2m". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        let m = mins.parse::<u64>().ok()?;
        m.checked_mul(60).map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        let h = hours.parse::<u64>().ok()?;
        h.checked_mul(3600).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
node_limit = 4
application_port = 8080
alarm_name_prefix = "fleetwatch-cpu-"
check_period = "60s"
endpoint_timeout = "5m"

[watched_tag]
key = "workload"
value = "api"

[template]
name = "api-node"

[proxy]
config_path = "/etc/fleetwatch/upstream.toml"
upstream = "api"
"#;

    #[test]
    fn parse_minimal_applies_defaults() {
        let config = WatchdogConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.node_limit, 4);
        assert_eq!(config.application_port, 8080);
        assert_eq!(config.check_period, Duration::from_secs(60));
        assert_eq!(config.endpoint_timeout, Duration::from_secs(300));
        assert_eq!(config.template.reference, TemplateRef::Name("api-node".into()));
        assert_eq!(config.alarm, AlarmSpec::default());
        assert_eq!(config.health.path, "/info");
        assert_eq!(config.health.probe_timeout, Duration::from_secs(10));
        assert_eq!(config.health.retry_interval, Duration::ZERO);
        assert_eq!(config.proxy.reload_command, vec!["systemctl", "reload", "nginx"]);
        assert_eq!(config.alarm_binding.prefix(), "fleetwatch-cpu-");
        assert!(config.simulation.is_none());
    }

    #[test]
    fn alarm_defaults_match_cpu_policy() {
        let alarm = AlarmSpec::default();
        assert_eq!(alarm.statistic, Statistic::Average);
        assert_eq!(alarm.period, Duration::from_secs(60));
        assert_eq!(alarm.evaluation_periods, 1);
        assert_eq!(alarm.threshold, 70.0);
        assert_eq!(alarm.comparison, Comparison::GreaterThanThreshold);
    }

    #[test]
    fn template_with_id_and_name_is_ambiguous() {
        let text = MINIMAL.replace("name = \"api-node\"", "name = \"api-node\"\nid = \"lt-123\"");
        let err = WatchdogConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousTemplate(_)));
    }

    #[test]
    fn template_without_reference_is_ambiguous() {
        let text = MINIMAL.replace("name = \"api-node\"", "version = \"3\"");
        let err = WatchdogConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousTemplate(_)));
    }

    #[test]
    fn zero_node_limit_rejected() {
        let text = MINIMAL.replace("node_limit = 4", "node_limit = 0");
        let err = WatchdogConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "node_limit", .. }));
    }

    #[test]
    fn bad_duration_rejected() {
        let text = MINIMAL.replace("\"60s\"", "\"soon\"");
        let err = WatchdogConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDuration { field: "check_period", .. }));
    }

    #[test]
    fn bad_prefix_rejected() {
        let text = MINIMAL.replace("\"fleetwatch-cpu-\"", "\"cpu alarm \"");
        let err = WatchdogConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAlarmPrefix(_)));
    }

    #[test]
    fn override_replaces_check_period() {
        let overrides = ConfigOverrides {
            check_period: Some("15s".to_string()),
        };
        let config = WatchdogConfig::from_toml_str_with(MINIMAL, &overrides).unwrap();
        assert_eq!(config.check_period, Duration::from_secs(15));
    }

    #[test]
    fn parse_full_sections() {
        let text = format!(
            "{MINIMAL}
[alarm]
threshold = 85.5
evaluation_periods = 2
period = \"5m\"

[health]
path = \"/healthz\"
probe_timeout = \"2s\"
retry_interval = \"500ms\"

[[simulation.nodes]]
id = \"i-1\"
state = \"stopped\"
private_address = \"10.0.0.1\"
"
        );
        let config = WatchdogConfig::from_toml_str(&text).unwrap();
        assert_eq!(config.alarm.threshold, 85.5);
        assert_eq!(config.alarm.evaluation_periods, 2);
        assert_eq!(config.alarm.period, Duration::from_secs(300));
        assert_eq!(config.health.path, "/healthz");
        assert_eq!(config.health.retry_interval, Duration::from_millis(500));
        let sim = config.simulation.unwrap();
        assert_eq!(sim.nodes.len(), 1);
        assert_eq!(sim.nodes[0].state, NodeState::Stopped);
    }

    #[test]
    fn from_file_reports_missing_path() {
        let err = WatchdogConfig::from_file(Path::new("/nonexistent/fleetwatch.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn from_file_reads_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleetwatch.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = WatchdogConfig::from_file(&path).unwrap();
        assert_eq!(config.watched_tag.value, "api");
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("soon"), None);
    }

    #[test]
    fn parse_duration_overflow_is_none() {
        assert_eq!(parse_duration("999999999999999999m"), None);
        assert_eq!(parse_duration("18446744073709551615h"), None);
    }

    #[test]
    fn huge_durations_rejected() {
        let text = MINIMAL.replace("\"5m\"", "\"999999999999999999m\"");
        let err = WatchdogConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDuration { field: "endpoint_timeout", .. }
        ));

        let text = MINIMAL.replace("\"5m\"", "\"18446744073709551615s\"");
        let err = WatchdogConfig::from_toml_str(&text).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { field: "endpoint_timeout", .. }
        ));
    }
}
