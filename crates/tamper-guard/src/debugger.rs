use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::checks::find_denylisted_module;
use crate::probes::HostProbes;

/// Module-name substrings of known instrumentation frameworks.
const INSTRUMENTATION_MODULE_MARKERS: [&str; 4] =
    ["fridagadget", "frida", "cynject", "libcycript"];

/// On-disk locations of known instrumentation server binaries.
const INSTRUMENTATION_BINARY_PATHS: [&str; 4] = [
    "/usr/sbin/frida-server",
    "/usr/bin/frida-server",
    "/data/local/tmp/frida-server",
    "/tmp/frida-server",
];

/// Loopback ports instrumentation servers listen on by default.
const INSTRUMENTATION_PORTS: [u16; 2] = [27042, 4444];

#[derive(Debug, Clone)]
pub struct DebuggerCheckConfig {
    pub enable_tracer_probe: bool,
    pub enable_parent_probe: bool,
    pub enable_module_probe: bool,
    pub enable_binary_probe: bool,
    pub enable_port_probe: bool,
    pub port_probe_timeout: Duration,
}

impl Default for DebuggerCheckConfig {
    fn default() -> Self {
        Self {
            enable_tracer_probe: env_bool("TAMPER_GUARD_ENABLE_TRACER_PROBE", true),
            enable_parent_probe: env_bool("TAMPER_GUARD_ENABLE_PARENT_PROBE", true),
            enable_module_probe: env_bool("TAMPER_GUARD_ENABLE_MODULE_PROBE", true),
            enable_binary_probe: env_bool("TAMPER_GUARD_ENABLE_BINARY_PROBE", true),
            enable_port_probe: env_bool("TAMPER_GUARD_ENABLE_PORT_PROBE", true),
            port_probe_timeout: Duration::from_millis(env_u64(
                "TAMPER_GUARD_PORT_PROBE_TIMEOUT_MS",
                200,
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum DebuggerSignal {
    TracerAttached { tracer_pid: u32 },
    ReparentedProcess { parent_pid: u32 },
    SuspiciousModule { module: String },
    InstrumentationBinary { path: String },
    InstrumentationPort { port: u16 },
}

impl DebuggerSignal {
    pub fn code(&self) -> &'static str {
        match self {
            Self::TracerAttached { .. } => "tracer_attached",
            Self::ReparentedProcess { .. } => "reparented_process",
            Self::SuspiciousModule { .. } => "suspicious_module",
            Self::InstrumentationBinary { .. } => "instrumentation_binary",
            Self::InstrumentationPort { .. } => "instrumentation_port",
        }
    }
}

impl fmt::Display for DebuggerSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TracerAttached { tracer_pid } => {
                write!(f, "kernel trace flag set by pid {}", tracer_pid)
            }
            Self::ReparentedProcess { parent_pid } => {
                write!(f, "process reparented under pid {}", parent_pid)
            }
            Self::SuspiciousModule { module } => {
                write!(f, "instrumentation module loaded: {}", module)
            }
            Self::InstrumentationBinary { path } => {
                write!(f, "instrumentation binary present: {}", path)
            }
            Self::InstrumentationPort { port } => {
                write!(f, "instrumentation server reachable on 127.0.0.1:{}", port)
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DebuggerObservation {
    pub signals: Vec<DebuggerSignal>,
}

impl DebuggerObservation {
    pub fn detected(&self) -> bool {
        !self.signals.is_empty()
    }

    pub fn signal_codes(&self) -> Vec<&'static str> {
        self.signals.iter().map(DebuggerSignal::code).collect()
    }
}

/// Runs the debugger probes. Read-only: no counter, no log emission.
pub fn detect_debugger(
    probes: &dyn HostProbes,
    config: &DebuggerCheckConfig,
) -> DebuggerObservation {
    let mut signals = Vec::new();

    if config.enable_tracer_probe {
        match probes.tracer_pid() {
            Ok(Some(tracer_pid)) if tracer_pid > 0 => {
                signals.push(DebuggerSignal::TracerAttached { tracer_pid });
            }
            Ok(_) => {}
            Err(detail) => {
                // A failing process-status query is a bug in this crate, not
                // evidence of tampering; release builds record no signal.
                debug_assert!(false, "process status query failed: {}", detail);
            }
        }
    }

    if config.enable_parent_probe {
        let parent_pid = probes.parent_pid();
        if parent_pid != 1 {
            signals.push(DebuggerSignal::ReparentedProcess { parent_pid });
        }
    }

    if config.enable_module_probe {
        let modules = probes.loaded_modules();
        if let Some(module) = find_denylisted_module(&modules, &INSTRUMENTATION_MODULE_MARKERS) {
            signals.push(DebuggerSignal::SuspiciousModule { module });
        }
    }

    if config.enable_binary_probe {
        for path in INSTRUMENTATION_BINARY_PATHS {
            if probes.path_exists(path) {
                signals.push(DebuggerSignal::InstrumentationBinary {
                    path: path.to_string(),
                });
                break;
            }
        }
    }

    if config.enable_port_probe {
        for port in INSTRUMENTATION_PORTS {
            if probes.local_port_open(port, config.port_probe_timeout) {
                signals.push(DebuggerSignal::InstrumentationPort { port });
                break;
            }
        }
    }

    DebuggerObservation { signals }
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(raw) => matches!(
            raw.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .unwrap_or(default)
}
