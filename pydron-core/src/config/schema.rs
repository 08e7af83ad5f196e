//! Configuration schema (spec §6).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level configuration: the ordered worker groups a pool is built from,
/// the scheduling strategy name, and the master's own RPC data ports.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PydronConfig {
    #[serde(default)]
    pub workers: Vec<WorkerGroupConfig>,

    #[serde(default = "default_scheduler")]
    pub scheduler: String,

    #[serde(default)]
    pub data_ports: DataPorts,
}

fn default_scheduler() -> String {
    "trivial".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerGroupType {
    Multicore,
    Ssh,
    Cloud,
}

/// One entry of the `workers` list. `type` selects which of the
/// `ssh`/`cloud` fields apply; a `multicore` group leaves them `None`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerGroupConfig {
    #[serde(rename = "type")]
    pub group_type: WorkerGroupType,

    pub cores: usize,

    #[serde(default)]
    pub data_ports: DataPorts,

    #[serde(default)]
    pub preconnect: bool,

    pub hostname: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub private_key_files: Option<Vec<String>>,
    pub private_keys: Option<Vec<String>>,

    pub provider: Option<String>,
    pub accesskeyid: Option<String>,
    pub accesskey: Option<String>,
    pub imageid: Option<String>,
    pub sizeid: Option<String>,
    pub publickey: Option<String>,
    pub privatekey: Option<String>,

    pub tmp_dir: Option<String>,
}

/// `data_ports` accepts a single port, an explicit list, a range string
/// (`"a-b"`), or `0` meaning "pick automatically" (spec §6). A bare integer
/// deserializes as `Single`; `0` is the auto sentinel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataPorts {
    Single(u32),
    List(Vec<u16>),
    Range(String),
}

impl Default for DataPorts {
    fn default() -> Self {
        DataPorts::Single(0)
    }
}

impl DataPorts {
    /// Expands to the concrete list of ports this entry describes. A range
    /// string like `"8000-8003"` expands inclusive of both ends. `0` (auto)
    /// expands to an empty list, leaving port selection to the caller.
    pub fn resolve(&self) -> Result<Vec<u16>, DataPortsError> {
        match self {
            DataPorts::Single(0) => Ok(Vec::new()),
            DataPorts::Single(n) => Ok(vec![*n as u16]),
            DataPorts::List(ports) => Ok(ports.clone()),
            DataPorts::Range(s) => {
                let (lo, hi) = s.split_once('-').ok_or_else(|| DataPortsError(s.clone()))?;
                let lo: u16 = lo.trim().parse().map_err(|_| DataPortsError(s.clone()))?;
                let hi: u16 = hi.trim().parse().map_err(|_| DataPortsError(s.clone()))?;
                if lo > hi {
                    return Err(DataPortsError(s.clone()));
                }
                Ok((lo..=hi).collect())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DataPortsError(pub String);

impl fmt::Display for DataPortsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid data_ports value: {}", self.0)
    }
}

impl std::error::Error for DataPortsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_trivial_scheduler_and_no_workers() {
        let config = PydronConfig::default();
        assert_eq!(config.scheduler, "trivial");
        assert!(config.workers.is_empty());
    }

    #[test]
    fn data_ports_range_expands_inclusive() {
        let ports = DataPorts::Range("8000-8002".to_string()).resolve().unwrap();
        assert_eq!(ports, vec![8000, 8001, 8002]);
    }

    #[test]
    fn data_ports_auto_zero_resolves_empty() {
        assert_eq!(DataPorts::Single(0).resolve().unwrap(), Vec::<u16>::new());
    }

    #[test]
    fn data_ports_reversed_range_is_an_error() {
        assert!(DataPorts::Range("10-5".to_string()).resolve().is_err());
    }

    #[test]
    fn worker_group_deserializes_from_toml() {
        let toml = r#"
            type = "ssh"
            cores = 4
            data_ports = "9000-9003"
            preconnect = true
            hostname = "build-1"
            username = "pydron"
        "#;
        let group: WorkerGroupConfig = toml::from_str(toml).unwrap();
        assert_eq!(group.group_type, WorkerGroupType::Ssh);
        assert_eq!(group.cores, 4);
        assert_eq!(group.hostname.as_deref(), Some("build-1"));
        assert!(group.accesskeyid.is_none());
    }

    #[test]
    fn multicore_group_omits_transport_fields() {
        let toml = r#"
            type = "multicore"
            cores = 8
        "#;
        let group: WorkerGroupConfig = toml::from_str(toml).unwrap();
        assert_eq!(group.group_type, WorkerGroupType::Multicore);
        assert!(matches!(group.data_ports, DataPorts::Single(0)));
        assert!(!group.preconnect);
    }
}
