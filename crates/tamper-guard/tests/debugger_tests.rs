use std::time::Duration;

use tamper_guard::{detect_debugger, DebuggerCheckConfig, DebuggerSignal, ForkStatus, HostProbes};

#[derive(Clone)]
struct StubProbes {
    tracer_pid: Option<u32>,
    tracer_error: Option<String>,
    parent_pid: u32,
    modules: Vec<String>,
    existing_paths: Vec<String>,
    open_ports: Vec<u16>,
}

impl StubProbes {
    fn clean() -> Self {
        Self {
            tracer_pid: None,
            tracer_error: None,
            parent_pid: 1,
            modules: vec!["/usr/lib/libc.so.6".to_string()],
            existing_paths: Vec::new(),
            open_ports: Vec::new(),
        }
    }
}

impl HostProbes for StubProbes {
    fn tracer_pid(&self) -> Result<Option<u32>, String> {
        match &self.tracer_error {
            Some(detail) => Err(detail.clone()),
            None => Ok(self.tracer_pid),
        }
    }

    fn parent_pid(&self) -> u32 {
        self.parent_pid
    }

    fn loaded_modules(&self) -> Vec<String> {
        self.modules.clone()
    }

    fn path_exists(&self, path: &str) -> bool {
        self.existing_paths.iter().any(|p| p == path)
    }

    fn path_readable(&self, _path: &str) -> bool {
        false
    }

    fn write_probe(&self, _dir: &str) -> bool {
        false
    }

    fn symlink_target(&self, _path: &str) -> Option<String> {
        None
    }

    fn scheme_handler(&self, _scheme: &str) -> bool {
        false
    }

    fn local_port_open(&self, port: u16, _timeout: Duration) -> bool {
        self.open_ports.contains(&port)
    }

    fn try_fork(&self) -> ForkStatus {
        ForkStatus::Refused
    }
}

fn all_probes_enabled() -> DebuggerCheckConfig {
    DebuggerCheckConfig {
        enable_tracer_probe: true,
        enable_parent_probe: true,
        enable_module_probe: true,
        enable_binary_probe: true,
        enable_port_probe: true,
        port_probe_timeout: Duration::from_millis(50),
    }
}

#[test]
fn clean_process_yields_no_signals() {
    let observation = detect_debugger(&StubProbes::clean(), &all_probes_enabled());
    assert!(!observation.detected());
    assert!(observation.signals.is_empty());
}

#[test]
fn tracer_pid_alone_drives_detection() {
    let mut probes = StubProbes::clean();
    probes.tracer_pid = Some(812);
    let observation = detect_debugger(&probes, &all_probes_enabled());
    assert!(observation.detected());
    assert_eq!(observation.signal_codes(), vec!["tracer_attached"]);
    assert_eq!(
        observation.signals[0],
        DebuggerSignal::TracerAttached { tracer_pid: 812 }
    );
}

#[test]
fn tracer_pid_zero_is_not_a_signal() {
    let mut probes = StubProbes::clean();
    probes.tracer_pid = Some(0);
    let observation = detect_debugger(&probes, &all_probes_enabled());
    assert!(!observation.detected());
}

#[test]
fn reparented_process_alone_drives_detection() {
    let mut probes = StubProbes::clean();
    probes.parent_pid = 4242;
    let observation = detect_debugger(&probes, &all_probes_enabled());
    assert_eq!(observation.signal_codes(), vec!["reparented_process"]);
}

#[test]
fn denylisted_module_alone_drives_detection() {
    let mut probes = StubProbes::clean();
    probes.modules.push("/opt/tools/FridaGadget.so".to_string());
    let observation = detect_debugger(&probes, &all_probes_enabled());
    assert_eq!(observation.signal_codes(), vec!["suspicious_module"]);
    assert!(observation.signals[0]
        .to_string()
        .contains("/opt/tools/FridaGadget.so"));
}

#[test]
fn instrumentation_binary_alone_drives_detection() {
    let mut probes = StubProbes::clean();
    probes
        .existing_paths
        .push("/usr/sbin/frida-server".to_string());
    let observation = detect_debugger(&probes, &all_probes_enabled());
    assert_eq!(observation.signal_codes(), vec!["instrumentation_binary"]);
}

#[test]
fn open_instrumentation_port_alone_drives_detection() {
    let mut probes = StubProbes::clean();
    probes.open_ports.push(27042);
    let observation = detect_debugger(&probes, &all_probes_enabled());
    assert_eq!(observation.signal_codes(), vec!["instrumentation_port"]);
    assert_eq!(
        observation.signals[0],
        DebuggerSignal::InstrumentationPort { port: 27042 }
    );
}

#[test]
fn disabled_probes_stay_silent() {
    let mut probes = StubProbes::clean();
    probes.tracer_pid = Some(7);
    probes.parent_pid = 99;
    probes.modules.push("/usr/lib/cynject.so".to_string());
    probes.existing_paths.push("/tmp/frida-server".to_string());
    probes.open_ports.push(4444);

    let config = DebuggerCheckConfig {
        enable_tracer_probe: false,
        enable_parent_probe: false,
        enable_module_probe: false,
        enable_binary_probe: false,
        enable_port_probe: false,
        port_probe_timeout: Duration::from_millis(50),
    };
    let observation = detect_debugger(&probes, &config);
    assert!(!observation.detected());
}

#[test]
fn concurrent_signals_are_all_reported() {
    let mut probes = StubProbes::clean();
    probes.tracer_pid = Some(7);
    probes.open_ports.push(4444);
    let observation = detect_debugger(&probes, &all_probes_enabled());
    assert_eq!(
        observation.signal_codes(),
        vec!["tracer_attached", "instrumentation_port"]
    );
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "process status query failed")]
fn failing_process_status_query_asserts_in_development_builds() {
    let mut probes = StubProbes::clean();
    probes.tracer_error = Some("permission denied".to_string());
    let _ = detect_debugger(&probes, &all_probes_enabled());
}
