use warden_core::{LOG_ROTATION_MAX_BYTES_ENV, LOG_ROTATION_MAX_FILES_ENV};
use warden_jobs::{FailureAction, ServiceDescriptor};

pub const SYSTEMD_UNIT_SUFFIX: &str = ".service";

/// `worker-1` -> `worker-1.service`.
pub fn systemd_unit_name(service: &str) -> String {
    if service.ends_with(SYSTEMD_UNIT_SUFFIX) {
        service.to_string()
    } else {
        format!("{service}{SYSTEMD_UNIT_SUFFIX}")
    }
}

/// Serializes a descriptor into a systemd unit file.
pub fn render_systemd_unit(descriptor: &ServiceDescriptor) -> String {
    let mut exec_start = vec![descriptor.executable.clone()];
    exec_start.extend(descriptor.launch_arguments().iter().cloned());

    // No ExecStop when it would only re-run the process's own executable; systemd then stops it by SIGTERM.
    let exec_stop = descriptor
        .stop_executable
        .as_ref()
        .filter(|executable| {
            !descriptor.stop_arguments.is_empty()
                || descriptor.launch_arguments().first() != Some(*executable)
        })
        .map(|executable| {
            let mut command = vec![executable.clone()];
            command.extend(descriptor.stop_arguments.iter().cloned());
            format!("ExecStop={}\n", render_command_line(&command))
        })
        .unwrap_or_default();

    let restart = match descriptor.on_failure.action {
        FailureAction::Restart => "on-failure",
        FailureAction::None => "no",
    };

    let mut environment = String::new();
    for entry in &descriptor.env {
        environment.push_str(&render_environment_line(&entry.name, &entry.value));
    }
    environment.push_str(&render_environment_line(
        LOG_ROTATION_MAX_BYTES_ENV,
        &descriptor.log_mode.size_threshold.to_string(),
    ));
    environment.push_str(&render_environment_line(
        LOG_ROTATION_MAX_FILES_ENV,
        &descriptor.log_mode.keep_files.to_string(),
    ));

    format!(
        r#"[Unit]
Description={description}
After=network.target
StartLimitIntervalSec=0

[Service]
Type=simple
ExecStart={exec_start}
{exec_stop}Restart={restart}
RestartSec={restart_sec}
WorkingDirectory={log_path}
{environment}
[Install]
WantedBy=multi-user.target
"#,
        description = descriptor.description,
        exec_start = render_command_line(&exec_start),
        exec_stop = exec_stop,
        restart = restart,
        restart_sec = descriptor.on_failure.delay_seconds,
        log_path = escape_specifiers(&descriptor.log_path),
        environment = environment,
    )
}

/// Value of `Description=` in the `[Unit]` section, if any.
pub fn parse_unit_description(unit: &str) -> Option<&str> {
    let mut in_unit_section = false;
    for line in unit.lines().map(str::trim) {
        if line.starts_with('[') {
            in_unit_section = line == "[Unit]";
            continue;
        }
        if !in_unit_section {
            continue;
        }
        if let Some(value) = line.strip_prefix("Description=") {
            return Some(value.trim());
        }
    }
    None
}

fn render_environment_line(name: &str, value: &str) -> String {
    format!(
        "Environment=\"{}\"\n",
        escape_specifiers(&escape_quoted(&format!("{name}={value}")))
    )
}

fn render_command_line(command: &[String]) -> String {
    command
        .iter()
        .map(|word| quote_command_word(word))
        .collect::<Vec<_>>()
        .join(" ")
}

fn quote_command_word(word: &str) -> String {
    let escaped = escape_specifiers(word).replace('$', "$$");
    let needs_quotes = escaped.is_empty()
        || escaped
            .chars()
            .any(|ch| ch.is_whitespace() || matches!(ch, '"' | '\'' | '\\' | ';'));
    if needs_quotes {
        format!("\"{}\"", escape_quoted(&escaped))
    } else {
        escaped
    }
}

fn escape_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn escape_specifiers(value: &str) -> String {
    value.replace('%', "%%")
}

#[cfg(test)]
mod tests {
    use warden_jobs::{translate, Process, StopCommand, TranslationContext};

    use super::*;

    fn descriptor(stop: Option<StopCommand>) -> ServiceDescriptor {
        let process = Process {
            name: "worker-1".to_string(),
            executable: "/bin/app".to_string(),
            args: vec!["--flag".to_string(), "two words".to_string()],
            env: [("K".to_string(), "V".to_string())].into_iter().collect(),
            stop,
        };
        translate(
            &process,
            &TranslationContext::new("/var/log/worker-1", "http://localhost:2825", "10.0.0.5"),
        )
    }

    #[test]
    fn unit_render_systemd_unit_includes_shim_start_and_environment() {
        let rendered = render_systemd_unit(&descriptor(None));
        assert!(rendered.contains("Description=warden\n"));
        assert!(rendered
            .contains("ExecStart=/var/vcap/bosh/bin/warden-shim /bin/app --flag \"two words\"\n"));
        assert!(!rendered.contains("ExecStop="));
        assert!(rendered.contains("Restart=on-failure\n"));
        assert!(rendered.contains("RestartSec=5\n"));
        assert!(rendered.contains("Environment=\"K=V\"\n"));
        assert!(rendered.contains("Environment=\"__NOTIFY_HTTP=http://localhost:2825\"\n"));
        assert!(rendered.contains("Environment=\"WARDEN_LOG_ROTATION_MAX_BYTES=50000\"\n"));
        assert!(rendered.contains("Environment=\"WARDEN_LOG_ROTATION_MAX_FILES=7\"\n"));
        assert_eq!(parse_unit_description(&rendered), Some("warden"));
    }

    #[test]
    fn unit_render_systemd_unit_places_exec_stop_for_stop_command() {
        let rendered = render_systemd_unit(&descriptor(Some(StopCommand {
            executable: "/bin/app-stop".to_string(),
            args: vec!["--graceful".to_string()],
        })));
        assert!(rendered.contains("ExecStop=/bin/app-stop --graceful\n"));
        assert!(rendered.contains("ExecStart=/var/vcap/bosh/bin/warden-shim /bin/app --flag"));
    }

    #[test]
    fn regression_render_systemd_unit_omits_exec_stop_for_bare_own_executable() {
        let rendered = render_systemd_unit(&descriptor(Some(StopCommand::default())));
        assert!(rendered
            .contains("ExecStart=/var/vcap/bosh/bin/warden-shim /bin/app --flag \"two words\"\n"));
        assert!(!rendered.contains("ExecStop="));

        let rendered = render_systemd_unit(&descriptor(Some(StopCommand {
            executable: "/bin/app".to_string(),
            args: Vec::new(),
        })));
        assert!(!rendered.contains("ExecStop="));
    }

    #[test]
    fn unit_render_systemd_unit_keeps_distinct_stop_executable_without_args() {
        let rendered = render_systemd_unit(&descriptor(Some(StopCommand {
            executable: "/bin/app-stop".to_string(),
            args: Vec::new(),
        })));
        assert!(rendered.contains("ExecStop=/bin/app-stop\n"));
    }

    #[test]
    fn regression_render_systemd_unit_escapes_specifiers_and_quotes() {
        let mut descriptor = descriptor(None);
        descriptor.arguments = vec!["/bin/app".to_string(), "100%".to_string(), "$HOME".to_string()];
        descriptor.env[0].value = "say \"hi\"".to_string();
        let rendered = render_systemd_unit(&descriptor);
        assert!(rendered.contains("ExecStart=/var/vcap/bosh/bin/warden-shim /bin/app 100%% $$HOME\n"));
        assert!(rendered.contains("Environment=\"K=say \\\"hi\\\"\"\n"));
    }

    #[test]
    fn unit_parse_unit_description_ignores_other_sections() {
        let unit = "[Service]\nDescription=not-this\n[Unit]\nDescription= sshd \n";
        assert_eq!(parse_unit_description(unit), Some("sshd"));
        assert_eq!(parse_unit_description("[Service]\nType=simple\n"), None);
    }

    #[test]
    fn unit_systemd_unit_name_appends_suffix_once() {
        assert_eq!(systemd_unit_name("nats"), "nats.service");
        assert_eq!(systemd_unit_name("nats.service"), "nats.service");
    }
}
