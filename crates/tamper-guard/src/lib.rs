mod checks;
mod counter;
mod debugger;
mod dispatch;
mod engine;
mod probes;

pub use checks::{find_denylisted_module, CheckOutcome, TamperCheck};
pub use counter::{CounterStore, FileCounterStore, MemoryCounterStore};
pub use debugger::{
    detect_debugger, DebuggerCheckConfig, DebuggerObservation, DebuggerSignal,
};
pub use dispatch::QueryContext;
pub use engine::{GuardConfig, GuardEngine, HoneypotSpec, TamperVerdict};
pub use probes::{parse_module_paths, parse_tracer_pid, ForkStatus, HostProbes, SystemProbes};
