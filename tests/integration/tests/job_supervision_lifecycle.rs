use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{bail, Result};
use tempfile::TempDir;
use tokio::sync::oneshot;
use warden_core::{AgentDirectories, CommandOutput, CommandRunner, OsFileSystem};
use warden_service::{
    install_staged_service, ServiceControl, SystemdServiceControl, SystemdServiceControlConfig,
};
use warden_supervisor::{
    Alert, JobFailureHandler, JobStatus, JobSupervisor, JobSupervisorConfig, ProcessInfo,
    SupervisionState,
};

/// Stands in for systemd and the shim: `warden-shim install` really installs
/// the staged unit, `systemctl` tracks which units are active.
#[derive(Default)]
struct FakeHost {
    active_units: Mutex<BTreeSet<String>>,
    systemctl_calls: Mutex<Vec<String>>,
}

impl FakeHost {
    fn systemctl_calls(&self) -> Vec<String> {
        self.systemctl_calls.lock().expect("calls lock").clone()
    }

    fn systemctl(&self, args: &[&str]) -> Result<CommandOutput> {
        self.systemctl_calls
            .lock()
            .expect("calls lock")
            .push(args.join(" "));
        let mut active = self.active_units.lock().expect("active lock");
        let mut stdout = String::new();
        match args.split_first() {
            Some((&"start", units)) => active.extend(units.iter().map(|unit| unit.to_string())),
            Some((&"stop", units)) => {
                for unit in units {
                    active.remove(*unit);
                }
            }
            Some((&"show", rest)) => {
                for unit in rest.iter().filter(|arg| !arg.starts_with("--")) {
                    let state = if active.contains(*unit) { "active" } else { "inactive" };
                    stdout.push_str(&format!(
                        "Id={unit}\nActiveState={state}\nFreezerState=running\n\n"
                    ));
                }
            }
            Some((&"daemon-reload" | &"enable" | &"disable", _)) => {}
            other => bail!("unexpected systemctl invocation {other:?}"),
        }
        Ok(CommandOutput {
            stdout,
            ..CommandOutput::default()
        })
    }
}

impl CommandRunner for FakeHost {
    fn run_command(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        if program == "systemctl" {
            return self.systemctl(args);
        }
        let shim = Path::new(program);
        if shim.file_name().and_then(|name| name.to_str()) == Some("warden-shim")
            && args == ["install"]
        {
            let process_dir = shim.parent().unwrap_or_else(|| Path::new("/"));
            install_staged_service(&OsFileSystem, self, process_dir)?;
            return Ok(CommandOutput::default());
        }
        bail!("unexpected command {program} {}", args.join(" "))
    }
}

struct Machine {
    temp: TempDir,
    host: Arc<FakeHost>,
    supervisor: Arc<JobSupervisor>,
}

impl Machine {
    fn new(port: u16) -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let directories = AgentDirectories::new(temp.path().join("vcap"));
        std::fs::create_dir_all(directories.bin_dir()).expect("create bin dir");
        std::fs::write(directories.bin_dir().join("warden-shim"), b"#!/bin/sh\n")
            .expect("write shim");

        let host = Arc::new(FakeHost::default());
        let fs = Arc::new(OsFileSystem);
        let service_control = SystemdServiceControl::new(
            SystemdServiceControlConfig {
                unit_dir: temp.path().join("etc/systemd/system"),
                runtime_unit_dir: temp.path().join("run/systemd/system"),
                ..SystemdServiceControlConfig::default()
            },
            fs.clone(),
            host.clone(),
        );
        let supervisor = JobSupervisor::new(
            JobSupervisorConfig {
                directories,
                job_failures_port: port,
                host_address: "10.0.0.5".to_string(),
                unit_dir: temp.path().join("etc/systemd/system"),
                systemctl: "systemctl".to_string(),
            },
            Arc::new(service_control),
            fs,
            host.clone(),
        );
        Self {
            temp,
            host,
            supervisor: Arc::new(supervisor),
        }
    }

    fn manifest(&self, job: &str, body: &str) -> PathBuf {
        let job_dir = self.temp.path().join("vcap/jobs").join(job);
        std::fs::create_dir_all(&job_dir).expect("create job dir");
        let path = job_dir.join("warden.json");
        std::fs::write(&path, body).expect("write manifest");
        path
    }

    fn unit_path(&self, service: &str) -> PathBuf {
        self.temp
            .path()
            .join("etc/systemd/system")
            .join(format!("{service}.service"))
    }
}

fn free_port() -> u16 {
    let reserved = std::net::TcpListener::bind("127.0.0.1:0").expect("reserve port");
    reserved.local_addr().expect("reserved addr").port()
}

fn processes(infos: &[(&str, &str)]) -> Vec<ProcessInfo> {
    infos
        .iter()
        .map(|(name, state)| ProcessInfo {
            name: name.to_string(),
            state: state.to_string(),
        })
        .collect()
}

#[test]
fn integration_add_job_installs_units_discoverable_by_ownership_tag() {
    let machine = Machine::new(2825);
    std::fs::create_dir_all(machine.temp.path().join("etc/systemd/system")).expect("unit dir");
    std::fs::write(
        machine.unit_path("sshd"),
        "[Unit]\nDescription=OpenSSH server daemon\n",
    )
    .expect("foreign unit");

    let path = machine.manifest(
        "web",
        r#"{"processes":[
            {"name":"nats","executable":"/var/vcap/packages/nats/bin/nats-server","args":["-c","/var/vcap/jobs/web/nats.conf"]},
            {"name":"worker-1","executable":"/bin/app","args":["--flag"],"env":{"K":"V"},
             "stop":{"executable":"/bin/app-stop","args":["--graceful"]}}
        ]}"#,
    );
    machine.supervisor.add_job("web", 0, &path).expect("add job");

    let worker_unit = std::fs::read_to_string(machine.unit_path("worker-1")).expect("worker unit");
    assert!(worker_unit.contains("Description=warden\n"));
    assert!(worker_unit.contains("ExecStop=/bin/app-stop --graceful\n"));
    assert!(worker_unit.contains("Environment=\"__NOTIFY_PROCESS_NAME=worker-1\"\n"));

    let control = SystemdServiceControl::new(
        SystemdServiceControlConfig {
            unit_dir: machine.temp.path().join("etc/systemd/system"),
            ..SystemdServiceControlConfig::default()
        },
        Arc::new(OsFileSystem),
        machine.host.clone(),
    );
    assert_eq!(
        control.enumerate_owned().expect("enumerate"),
        vec!["nats".to_string(), "worker-1".to_string()]
    );

    // Re-running add_job overwrites the existing registration.
    machine.supervisor.add_job("web", 0, &path).expect("re-add job");
    assert!(machine.unit_path("nats").is_file());
}

#[test]
fn integration_lifecycle_drives_systemd_and_marker() {
    let machine = Machine::new(2825);
    let path = machine.manifest(
        "web",
        r#"{"processes":[{"name":"nats","executable":"/bin/nats"},{"name":"worker-1","executable":"/bin/app"}]}"#,
    );
    machine.supervisor.add_job("web", 0, &path).expect("add job");
    assert_eq!(machine.supervisor.status(), JobStatus::Failing);

    machine.supervisor.start().expect("start");
    assert_eq!(machine.supervisor.status(), JobStatus::Running);
    assert_eq!(
        machine.supervisor.processes().expect("processes"),
        processes(&[("nats", "running"), ("worker-1", "running")])
    );
    assert!(machine
        .host
        .systemctl_calls()
        .contains(&"disable warden-agent.service".to_string()));

    machine.supervisor.unmonitor().expect("unmonitor");
    let drop_in = machine
        .temp
        .path()
        .join("run/systemd/system/nats.service.d/unmonitored.conf");
    assert!(drop_in.is_file());
    assert_eq!(machine.supervisor.status(), JobStatus::Running);

    machine.supervisor.stop().expect("stop");
    let calls_after_stop = machine.host.systemctl_calls().len();
    assert_eq!(machine.supervisor.status(), JobStatus::Stopped);
    assert_eq!(machine.host.systemctl_calls().len(), calls_after_stop);

    machine.supervisor.start().expect("restart");
    assert!(!drop_in.exists());
    assert_eq!(machine.supervisor.supervision_state(), SupervisionState::Monitored);

    machine.supervisor.remove_all_jobs().expect("remove all");
    assert!(!machine.unit_path("nats").exists());
    assert!(machine.supervisor.processes().expect("processes").is_empty());
    assert!(machine
        .temp
        .path()
        .join("vcap/jobs/web/nats/warden-shim.service")
        .is_file());
}

#[tokio::test]
async fn integration_failure_alerts_follow_supervision_state() {
    let port = free_port();
    let machine = Machine::new(port);
    let alerts = Arc::new(Mutex::new(Vec::<Alert>::new()));
    let sink = Arc::clone(&alerts);
    let handler: JobFailureHandler = Arc::new(move |alert| {
        sink.lock().expect("alerts lock").push(alert);
        Ok(())
    });

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let supervisor = Arc::clone(&machine.supervisor);
    let listener = tokio::spawn(async move {
        supervisor.monitor_job_failures(handler, shutdown_rx).await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{port}/");
    let event = serde_json::json!({"event": "pid failed", "processName": "nats", "exitCode": 55});

    client.post(&url).json(&event).send().await.expect("post event");
    machine.supervisor.unmonitor().expect("unmonitor");
    client.post(&url).json(&event).send().await.expect("post event");
    client.post(&url).json(&event).send().await.expect("post event");
    machine.supervisor.start().expect("start");
    client.post(&url).json(&event).send().await.expect("post event");

    {
        let alerts = alerts.lock().expect("alerts lock");
        assert_eq!(alerts.len(), 2);
        assert!(alerts
            .iter()
            .all(|alert| alert.id == "nats" && alert.description == "exited with code 55"));
    }

    shutdown_tx.send(()).expect("send shutdown");
    listener
        .await
        .expect("join listener")
        .expect("listener result");
}
