use serde::Serialize;

use crate::probes::{ForkStatus, HostProbes};

/// Closed set of tamper checks, executed as one fixed battery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TamperCheck {
    UrlSchemeHandlers,
    SuspiciousFileExists,
    SuspiciousFileReadable,
    RestrictedDirectoryWritable,
    ForkCapability,
    SymlinkAnomaly,
    LoadedModuleSignature,
}

impl TamperCheck {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UrlSchemeHandlers => "url_scheme_handlers",
            Self::SuspiciousFileExists => "suspicious_file_exists",
            Self::SuspiciousFileReadable => "suspicious_file_readable",
            Self::RestrictedDirectoryWritable => "restricted_directory_writable",
            Self::ForkCapability => "fork_capability",
            Self::SymlinkAnomaly => "symlink_anomaly",
            Self::LoadedModuleSignature => "loaded_module_signature",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub check: TamperCheck,
    pub passed: bool,
    /// Empty on pass, otherwise names the triggering path, scheme or module.
    pub detail: String,
}

impl CheckOutcome {
    fn pass(check: TamperCheck) -> Self {
        Self {
            check,
            passed: true,
            detail: String::new(),
        }
    }

    fn fail(check: TamperCheck, detail: String) -> Self {
        Self {
            check,
            passed: false,
            detail,
        }
    }
}

/// URL schemes registered by companion apps of known rooting tools.
const JAILBREAK_URL_SCHEMES: [&str; 4] = ["cydia", "sileo", "zbra", "undecimus"];

/// Artifacts of rooting tools, injection frameworks and package managers
/// that never ship on a locked-down image.
const SUSPICIOUS_PATHS: [&str; 22] = [
    "/usr/sbin/frida-server",
    "/usr/bin/frida-server",
    "/usr/local/bin/frida-server",
    "/data/local/tmp/frida-server",
    "/tmp/frida-server",
    "/usr/lib/libsubstrate.so",
    "/system/lib/libsubstrate.so",
    "/sbin/.magisk",
    "/data/adb/magisk",
    "/system/app/Superuser.apk",
    "/system/bin/su",
    "/system/xbin/su",
    "/sbin/su",
    "/etc/apt",
    "/var/lib/apt",
    "/var/lib/dpkg",
    "/var/cache/apt",
    "/usr/bin/dpkg",
    "/etc/opkg",
    "/usr/bin/opkg",
    "/var/lib/undecimus",
    "/usr/share/jailbreak",
];

/// Standard POSIX tooling that a sealed image does not carry.
const UNEXPECTED_TOOL_PATHS: [&str; 7] = [
    "/bin/bash",
    "/usr/sbin/sshd",
    "/usr/bin/ssh",
    "/etc/ssh/sshd_config",
    "/usr/libexec/ssh-keysign",
    "/usr/libexec/sftp-server",
    "/usr/sbin/dropbear",
];

/// Subset of the path denylist probed for readability rather than existence.
const READABLE_PROBE_PATHS: [&str; 6] = [
    "/etc/apt",
    "/var/lib/dpkg",
    "/data/adb/magisk",
    "/bin/bash",
    "/usr/sbin/sshd",
    "/usr/bin/ssh",
];

/// Directories the sandbox must never be able to write into.
const RESTRICTED_WRITE_DIRS: [&str; 4] = ["/", "/root/", "/usr/", "/lib/"];

/// Paths that are plain directories on the reference image; a symlink here
/// means the filesystem layout has been rewritten.
const SYMLINK_PROBE_PATHS: [&str; 6] = [
    "/usr/lib",
    "/usr/libexec",
    "/usr/include",
    "/usr/share",
    "/var/lib",
    "/opt",
];

/// Extended module denylist. `/.file` is the marker left by tools that
/// rewrite loaded-module paths to hide injected libraries.
const SUSPICIOUS_MODULE_MARKERS: [&str; 10] = [
    "fridagadget",
    "frida",
    "cynject",
    "libcycript",
    "substrate",
    "substrateloader",
    "tweakinject",
    "sslkillswitch",
    "rocketbootstrap",
    "/.file",
];

/// Case-insensitive substring match of every loaded module path against a
/// marker list. Returns the first offending module path.
pub fn find_denylisted_module(modules: &[String], markers: &[&str]) -> Option<String> {
    for module in modules {
        let lowered = module.to_ascii_lowercase();
        if markers
            .iter()
            .any(|marker| lowered.contains(&marker.to_ascii_lowercase()))
        {
            return Some(module.clone());
        }
    }
    None
}

pub(crate) struct CheckDescriptor {
    pub(crate) check: TamperCheck,
    pub(crate) eval: fn(&dyn HostProbes) -> CheckOutcome,
}

/// The battery, in execution order. The engine iterates this table
/// uniformly; every entry runs on every invocation.
pub(crate) const CHECK_BATTERY: [CheckDescriptor; 7] = [
    CheckDescriptor {
        check: TamperCheck::UrlSchemeHandlers,
        eval: check_url_scheme_handlers,
    },
    CheckDescriptor {
        check: TamperCheck::SuspiciousFileExists,
        eval: check_suspicious_file_exists,
    },
    CheckDescriptor {
        check: TamperCheck::SuspiciousFileReadable,
        eval: check_suspicious_file_readable,
    },
    CheckDescriptor {
        check: TamperCheck::RestrictedDirectoryWritable,
        eval: check_restricted_directory_writable,
    },
    CheckDescriptor {
        check: TamperCheck::ForkCapability,
        eval: check_fork_capability,
    },
    CheckDescriptor {
        check: TamperCheck::SymlinkAnomaly,
        eval: check_symlink_anomaly,
    },
    CheckDescriptor {
        check: TamperCheck::LoadedModuleSignature,
        eval: check_loaded_module_signature,
    },
];

fn check_url_scheme_handlers(probes: &dyn HostProbes) -> CheckOutcome {
    for scheme in JAILBREAK_URL_SCHEMES {
        if probes.scheme_handler(scheme) {
            return CheckOutcome::fail(
                TamperCheck::UrlSchemeHandlers,
                format!("handler registered for {}://", scheme),
            );
        }
    }
    CheckOutcome::pass(TamperCheck::UrlSchemeHandlers)
}

fn check_suspicious_file_exists(probes: &dyn HostProbes) -> CheckOutcome {
    for path in SUSPICIOUS_PATHS.iter().chain(UNEXPECTED_TOOL_PATHS.iter()) {
        if probes.path_exists(path) {
            return CheckOutcome::fail(
                TamperCheck::SuspiciousFileExists,
                format!("suspicious path exists: {}", path),
            );
        }
    }
    CheckOutcome::pass(TamperCheck::SuspiciousFileExists)
}

fn check_suspicious_file_readable(probes: &dyn HostProbes) -> CheckOutcome {
    for path in READABLE_PROBE_PATHS {
        if probes.path_readable(path) {
            return CheckOutcome::fail(
                TamperCheck::SuspiciousFileReadable,
                format!("suspicious path is readable: {}", path),
            );
        }
    }
    CheckOutcome::pass(TamperCheck::SuspiciousFileReadable)
}

fn check_restricted_directory_writable(probes: &dyn HostProbes) -> CheckOutcome {
    for dir in RESTRICTED_WRITE_DIRS {
        // A write that the sandbox lets through is the violation; probe
        // errors mean the restriction held.
        if probes.write_probe(dir) {
            return CheckOutcome::fail(
                TamperCheck::RestrictedDirectoryWritable,
                format!("wrote inside restricted directory: {}", dir),
            );
        }
    }
    CheckOutcome::pass(TamperCheck::RestrictedDirectoryWritable)
}

fn check_fork_capability(probes: &dyn HostProbes) -> CheckOutcome {
    match probes.try_fork() {
        ForkStatus::Spawned(pid) => CheckOutcome::fail(
            TamperCheck::ForkCapability,
            format!("fork created child process {}", pid),
        ),
        ForkStatus::Refused | ForkStatus::Unavailable => {
            CheckOutcome::pass(TamperCheck::ForkCapability)
        }
    }
}

fn check_symlink_anomaly(probes: &dyn HostProbes) -> CheckOutcome {
    for path in SYMLINK_PROBE_PATHS {
        if let Some(target) = probes.symlink_target(path) {
            return CheckOutcome::fail(
                TamperCheck::SymlinkAnomaly,
                format!("{} resolves to symlink target {}", path, target),
            );
        }
    }
    CheckOutcome::pass(TamperCheck::SymlinkAnomaly)
}

fn check_loaded_module_signature(probes: &dyn HostProbes) -> CheckOutcome {
    let modules = probes.loaded_modules();
    match find_denylisted_module(&modules, &SUSPICIOUS_MODULE_MARKERS) {
        Some(module) => CheckOutcome::fail(
            TamperCheck::LoadedModuleSignature,
            format!("suspicious module loaded: {}", module),
        ),
        None => CheckOutcome::pass(TamperCheck::LoadedModuleSignature),
    }
}
