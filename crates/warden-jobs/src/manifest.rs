use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Alternate termination command used instead of the shim-mediated stop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopCommand {
    #[serde(default)]
    pub executable: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// One supervised executable. `name` doubles as the native service identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    pub name: String,
    pub executable: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopCommand>,
}

impl Process {
    /// The full start invocation: executable followed by its arguments.
    pub fn start_invocation(&self) -> Vec<String> {
        let mut invocation = Vec::with_capacity(self.args.len() + 1);
        invocation.push(self.executable.clone());
        invocation.extend(self.args.iter().cloned());
        invocation
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobManifest {
    #[serde(default)]
    pub processes: Vec<Process>,
}

/// Parses manifest bytes. Callers decide what an empty body means before calling this.
pub fn parse_job_manifest(raw: &[u8]) -> Result<JobManifest, serde_json::Error> {
    serde_json::from_slice(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_parse_job_manifest_reads_processes_with_optional_fields() {
        let manifest = parse_job_manifest(
            br#"{"processes":[
                {"name":"worker-1","executable":"/bin/app","args":["--flag"],"env":{"K":"V"}},
                {"name":"nats","executable":"/bin/nats","stop":{"executable":"/bin/nats-stop","args":["--now"]}}
            ]}"#,
        )
        .expect("parse manifest");

        assert_eq!(manifest.processes.len(), 2);
        let worker = &manifest.processes[0];
        assert_eq!(worker.start_invocation(), vec!["/bin/app", "--flag"]);
        assert_eq!(worker.env.get("K").map(String::as_str), Some("V"));
        assert!(worker.stop.is_none());

        let nats = &manifest.processes[1];
        assert!(nats.args.is_empty());
        assert!(nats.env.is_empty());
        assert_eq!(
            nats.stop,
            Some(StopCommand {
                executable: "/bin/nats-stop".to_string(),
                args: vec!["--now".to_string()],
            })
        );
    }

    #[test]
    fn regression_parse_job_manifest_rejects_malformed_json() {
        assert!(parse_job_manifest(b"{\"processes\": [").is_err());
        assert!(parse_job_manifest(b"{\"processes\": [{\"name\": 7}]}").is_err());
    }
}
