use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

use crate::checks::{CheckOutcome, CHECK_BATTERY};
use crate::counter::CounterStore;
use crate::debugger::{detect_debugger, DebuggerCheckConfig, DebuggerObservation};
use crate::probes::HostProbes;

/// Obscured persistence key for the tamper counter.
const COUNTER_KEY: &str = "qv81xc3";

const HONEYPOT_SEED: i64 = 37493;
const HONEYPOT_MARKER: &str = "749";
const HONEYPOT_OFFSET: i64 = 11386;
const HONEYPOT_TARGET: i64 = 48879;

/// Internal consistency target: formatting, parsing and integer arithmetic
/// over these values must hold exactly on an untampered runtime. The
/// defaults are an implementation secret, not a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoneypotSpec {
    pub seed: i64,
    pub marker: String,
    pub offset: i64,
    pub target: i64,
}

impl Default for HoneypotSpec {
    fn default() -> Self {
        Self {
            seed: HONEYPOT_SEED,
            marker: HONEYPOT_MARKER.to_string(),
            offset: HONEYPOT_OFFSET,
            target: HONEYPOT_TARGET,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GuardConfig {
    /// Master gate; defaults to off in development builds so detection never
    /// interferes with a debugging session.
    pub detection_enabled: bool,
    pub debugger: DebuggerCheckConfig,
    pub honeypot: HoneypotSpec,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            detection_enabled: env_bool(
                "TAMPER_GUARD_ENABLE_DETECTION",
                !cfg!(debug_assertions),
            ),
            debugger: DebuggerCheckConfig::default(),
            honeypot: HoneypotSpec::default(),
        }
    }
}

/// Aggregate result of one battery run. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TamperVerdict {
    pub passed: bool,
    pub failures: Vec<CheckOutcome>,
}

impl TamperVerdict {
    pub fn failed_codes(&self) -> Vec<&'static str> {
        self.failures
            .iter()
            .map(|outcome| outcome.check.code())
            .collect()
    }

    pub fn failure_summary(&self) -> String {
        self.failures
            .iter()
            .map(|outcome| outcome.detail.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn alert_payload(&self) -> String {
        json!({
            "rule_name": "runtime_tamper",
            "passed": self.passed,
            "checks": self.failed_codes(),
            "detail": self.failure_summary(),
        })
        .to_string()
    }
}

/// Debugger and tamper detection over an injected probe surface and counter
/// store. Stateless across invocations apart from the persisted counter.
pub struct GuardEngine {
    config: GuardConfig,
    probes: Box<dyn HostProbes>,
    store: Box<dyn CounterStore>,
}

impl GuardEngine {
    pub fn new(
        config: GuardConfig,
        probes: Box<dyn HostProbes>,
        store: Box<dyn CounterStore>,
    ) -> Self {
        Self {
            config,
            probes,
            store,
        }
    }

    pub fn from_env() -> Self {
        Self::new(
            GuardConfig::default(),
            Box::new(crate::probes::SystemProbes::new()),
            Box::new(crate::counter::FileCounterStore::from_env()),
        )
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Runs the full battery. All seven checks execute regardless of earlier
    /// outcomes so every violation is collected; a failed battery increments
    /// the persisted counter and emits one security log entry.
    pub fn run_checks(&self) -> TamperVerdict {
        let mut failures = Vec::new();
        for descriptor in &CHECK_BATTERY {
            let outcome = (descriptor.eval)(self.probes.as_ref());
            if !outcome.passed {
                failures.push(outcome);
            }
        }

        let verdict = TamperVerdict {
            passed: failures.is_empty(),
            failures,
        };
        if !verdict.passed {
            self.bump_counter();
            error!(
                target: "tamper_guard::security",
                checks = ?verdict.failed_codes(),
                "tamper checks failed: {}",
                verdict.failure_summary()
            );
        }
        verdict
    }

    pub fn observe_debugger(&self) -> DebuggerObservation {
        detect_debugger(self.probes.as_ref(), &self.config.debugger)
    }

    pub fn is_debugger_active(&self) -> bool {
        if !self.config.detection_enabled {
            return false;
        }
        self.observe_debugger().detected()
    }

    /// Battery-only verdict.
    pub fn is_tamper_active(&self) -> bool {
        if !self.config.detection_enabled {
            return false;
        }
        !self.run_checks().passed
    }

    /// Battery verdict folded with the honeypot self-check. This is the
    /// entry point applications should call. The honeypot runs regardless of
    /// the development gate; a broken runtime counts as tampering.
    pub fn is_tamper_active_on_device(&self) -> bool {
        if self.is_tamper_active() {
            return true;
        }
        if honeypot_intact(&self.config.honeypot) {
            false
        } else {
            self.bump_counter();
            true
        }
    }

    /// Current persisted tamper count.
    pub fn tamper_counter(&self) -> u64 {
        self.store.get_counter(COUNTER_KEY)
    }

    fn bump_counter(&self) {
        let next = self.store.get_counter(COUNTER_KEY).saturating_add(1);
        if let Err(detail) = self.store.set_counter(COUNTER_KEY, next) {
            // Failing closed on storage errors would turn a full disk into a
            // denial of service; record and move on.
            warn!(
                target: "tamper_guard::system",
                "tamper counter not persisted: {}", detail
            );
        }
    }
}

fn honeypot_intact(spec: &HoneypotSpec) -> bool {
    let text = spec.seed.to_string();
    if !text.contains(&spec.marker) {
        return false;
    }
    let Ok(round_tripped) = String::from_utf8(text.into_bytes()) else {
        return false;
    };
    let Ok(total) = round_tripped.parse::<i64>() else {
        return false;
    };
    total.checked_add(spec.offset) == Some(spec.target)
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
