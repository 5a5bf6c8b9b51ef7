use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Liveness oracle for process ids recorded in coordination files.
///
/// Injected so registry and rendezvous scans can be exercised in tests
/// without minting real processes.
pub trait ProcessProbe: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Probe backed by the operating system's process table.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemProcessProbe;

impl ProcessProbe for SystemProcessProbe {
    fn is_alive(&self, pid: u32) -> bool {
        if pid == 0 {
            return false;
        }
        let pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::new(),
        );
        system.process(pid).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_process_is_alive() {
        let probe = SystemProcessProbe;
        assert!(probe.is_alive(std::process::id()));
        assert!(!probe.is_alive(0));
    }
}
