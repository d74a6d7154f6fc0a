use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;

#[cfg(unix)]
use nix::sys::signal::{kill, Signal};
#[cfg(unix)]
use nix::sys::wait::waitpid;
#[cfg(unix)]
use nix::unistd::Pid;

use crate::dispatch::QueryContext;

/// Result of invoking the process-creation primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkStatus {
    /// The call returned a child pid; the child has been terminated and
    /// reaped before this value is produced.
    Spawned(i32),
    /// The kernel refused to create a process.
    Refused,
    /// The fork symbol could not be resolved in the global namespace.
    Unavailable,
}

/// Host introspection surface consumed by the detectors. The default
/// implementation is [`SystemProbes`]; tests substitute their own.
pub trait HostProbes {
    /// Pid of the tracer attached to this process, `None` when the kernel
    /// reports no tracer. An `Err` means the status query itself failed.
    fn tracer_pid(&self) -> Result<Option<u32>, String>;

    fn parent_pid(&self) -> u32;

    /// Paths of all file-backed modules mapped into this process.
    fn loaded_modules(&self) -> Vec<String>;

    fn path_exists(&self, path: &str) -> bool;

    fn path_readable(&self, path: &str) -> bool;

    /// Attempts to write and remove a uniquely named file inside `dir`.
    /// Returns true only when both operations succeed.
    fn write_probe(&self, dir: &str) -> bool;

    /// Non-empty symbolic-link target of `path`, `None` for plain entries.
    fn symlink_target(&self, path: &str) -> Option<String>;

    /// Whether the host registers a handler for `scheme://` URLs.
    fn scheme_handler(&self, scheme: &str) -> bool;

    fn local_port_open(&self, port: u16, timeout: Duration) -> bool;

    fn try_fork(&self) -> ForkStatus;
}

/// Procfs-backed probe implementation for the running process.
pub struct SystemProbes {
    scheme_queries: OnceLock<Option<QueryContext>>,
}

impl SystemProbes {
    pub fn new() -> Self {
        Self {
            scheme_queries: OnceLock::new(),
        }
    }

    fn scheme_query_context(&self) -> Option<&QueryContext> {
        self.scheme_queries
            .get_or_init(|| QueryContext::spawn("scheme-query").ok())
            .as_ref()
    }
}

impl Default for SystemProbes {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbes for SystemProbes {
    fn tracer_pid(&self) -> Result<Option<u32>, String> {
        #[cfg(target_os = "linux")]
        {
            let status = std::fs::read_to_string("/proc/self/status")
                .map_err(|err| format!("read /proc/self/status: {}", err))?;
            Ok(parse_tracer_pid(&status))
        }
        #[cfg(not(target_os = "linux"))]
        {
            Ok(None)
        }
    }

    fn parent_pid(&self) -> u32 {
        #[cfg(unix)]
        {
            std::os::unix::process::parent_id()
        }
        #[cfg(not(unix))]
        {
            1
        }
    }

    fn loaded_modules(&self) -> Vec<String> {
        #[cfg(target_os = "linux")]
        {
            match std::fs::read_to_string("/proc/self/maps") {
                Ok(maps) => parse_module_paths(&maps),
                Err(_) => Vec::new(),
            }
        }
        #[cfg(not(target_os = "linux"))]
        {
            Vec::new()
        }
    }

    fn path_exists(&self, path: &str) -> bool {
        Path::new(path).exists()
    }

    fn path_readable(&self, path: &str) -> bool {
        std::fs::File::open(path).is_ok()
    }

    fn write_probe(&self, dir: &str) -> bool {
        let path = Path::new(dir).join(unique_probe_name());
        if std::fs::write(&path, b"tg-probe").is_err() {
            return false;
        }
        std::fs::remove_file(&path).is_ok()
    }

    fn symlink_target(&self, path: &str) -> Option<String> {
        let target = std::fs::read_link(path).ok()?;
        let rendered = target.display().to_string();
        if rendered.is_empty() {
            None
        } else {
            Some(rendered)
        }
    }

    fn scheme_handler(&self, scheme: &str) -> bool {
        let scheme = scheme.to_string();
        match self.scheme_query_context() {
            Some(context) => context
                .run(move || query_scheme_handler(&scheme))
                .unwrap_or(false),
            None => query_scheme_handler(&scheme),
        }
    }

    fn local_port_open(&self, port: u16, timeout: Duration) -> bool {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        TcpStream::connect_timeout(&addr, timeout).is_ok()
    }

    fn try_fork(&self) -> ForkStatus {
        #[cfg(unix)]
        {
            fork_probe()
        }
        #[cfg(not(unix))]
        {
            ForkStatus::Unavailable
        }
    }
}

/// Extracts the `TracerPid:` value from `/proc/self/status` content.
pub fn parse_tracer_pid(status: &str) -> Option<u32> {
    for line in status.lines() {
        let Some(raw) = line.strip_prefix("TracerPid:") else {
            continue;
        };
        return raw.trim().parse::<u32>().ok();
    }
    None
}

/// Extracts the deduplicated file-backed mapping paths from
/// `/proc/self/maps` content.
pub fn parse_module_paths(maps: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for line in maps.lines() {
        let Some(path) = line.split_whitespace().nth(5) else {
            continue;
        };
        if !path.starts_with('/') {
            continue;
        }
        if out.iter().any(|seen| seen == path) {
            continue;
        }
        out.push(path.to_string());
    }
    out
}

fn query_scheme_handler(scheme: &str) -> bool {
    let output = std::process::Command::new("xdg-mime")
        .args(["query", "default", &format!("x-scheme-handler/{}", scheme)])
        .output();
    match output {
        Ok(output) if output.status.success() => {
            !String::from_utf8_lossy(&output.stdout).trim().is_empty()
        }
        _ => false,
    }
}

fn unique_probe_name() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!(".tg-{}-{}", std::process::id(), nanos)
}

/// Resolves `fork` dynamically and invokes it. The only raw-interop site in
/// the crate; every spawned child is terminated and reaped before returning.
#[cfg(unix)]
fn fork_probe() -> ForkStatus {
    type ForkFn = unsafe extern "C" fn() -> libc::pid_t;

    // SAFETY: looking up a libc symbol in the global namespace; the returned
    // pointer is only used when non-null.
    let symbol = unsafe { libc::dlsym(libc::RTLD_DEFAULT, b"fork\0".as_ptr().cast()) };
    if symbol.is_null() {
        return ForkStatus::Unavailable;
    }

    // SAFETY: the resolved symbol has fork's C signature; calling it probes
    // whether the sandbox permits process creation.
    let pid = unsafe {
        let fork_fn: ForkFn = std::mem::transmute(symbol);
        fork_fn()
    };

    if pid == 0 {
        // Child branch of a permitted fork; leave before running any more of
        // the parent's code.
        // SAFETY: _exit is async-signal-safe and does not unwind.
        unsafe { libc::_exit(0) };
    }

    if pid > 0 {
        let child = Pid::from_raw(pid);
        let _ = kill(child, Signal::SIGTERM);
        let _ = waitpid(child, None);
        return ForkStatus::Spawned(pid);
    }

    ForkStatus::Refused
}
