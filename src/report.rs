use std::collections::BTreeMap;

use serde::Serialize;

/// Snapshot of everything this crate can say about the host.
#[derive(Debug, Serialize)]
pub struct HostReport {
    /// Canonical microarchitecture name, "generic" when unidentified
    pub cpu_name: String,
    /// Physical core count, -1 when unknown
    pub physical_cores: i32,
    /// Pointer-width-corrected triple of the running process
    pub process_triple: String,
    /// Feature availability, absent on platforms without feature probing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<BTreeMap<&'static str, bool>>,
}

impl HostReport {
    pub fn collect() -> Self {
        Self {
            cpu_name: crate::get_host_cpu_name(),
            physical_cores: crate::get_host_num_physical_cores(),
            process_triple: crate::get_process_triple(),
            features: crate::get_host_cpu_features(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_to_json() {
        let report = HostReport::collect();
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"cpu_name\""));
        assert!(json.contains("\"physical_cores\""));
        assert!(json.contains("\"process_triple\""));
    }

    #[test]
    fn features_key_is_omitted_when_absent() {
        let report = HostReport {
            cpu_name: "generic".to_string(),
            physical_cores: -1,
            process_triple: "x86_64-unknown-linux-gnu".to_string(),
            features: None,
        };
        let json = serde_json::to_string(&report).unwrap();
        assert!(!json.contains("features"));
    }
}
