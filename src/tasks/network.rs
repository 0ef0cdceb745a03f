//! Task: wait for NetworkManager to come back after its backend changed.
use std::time::Duration;

use anyhow::Result;

use super::{Context, Task, TaskResult};

const NM_UNIT: &str = "NetworkManager.service";

/// Poll `nmcli` until NetworkManager reports running.
///
/// Giving up is not a failure: the new backend is configured either way,
/// the operator is only told that connectivity may take longer.
#[derive(Debug)]
pub struct WaitForNetworkManager {
    attempts: u32,
    interval: Duration,
}

impl Default for WaitForNetworkManager {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_millis(500),
        }
    }
}

impl WaitForNetworkManager {
    /// Poll `attempts` times, `interval` apart.
    #[must_use]
    pub const fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    fn running(ctx: &Context) -> bool {
        ctx.executor
            .run_unchecked("nmcli", &["-t", "-f", "RUNNING", "general"])
            .is_ok_and(|r| r.success && r.stdout.trim() == "running")
    }
}

impl Task for WaitForNetworkManager {
    fn name(&self) -> &'static str {
        "Wait for NetworkManager"
    }

    fn should_run(&self, ctx: &Context) -> bool {
        ctx.live
            && ctx.activations.restarts().iter().any(|u| u == NM_UNIT)
            && ctx.executor.which("nmcli")
    }

    fn run(&self, ctx: &Context) -> Result<TaskResult> {
        if ctx.dry_run {
            ctx.log.dry_run("would wait for NetworkManager to report running");
            return Ok(TaskResult::DryRun);
        }
        for attempt in 1..=self.attempts {
            ctx.check_interrupt()?;
            if Self::running(ctx) {
                ctx.log
                    .debug(&format!("NetworkManager running after {attempt} check(s)"));
                return Ok(TaskResult::Ok);
            }
            if attempt < self.attempts {
                std::thread::sleep(self.interval);
            }
        }
        ctx.log.warn(&format!(
            "NetworkManager not running after {} checks; connectivity may take longer",
            self.attempts
        ));
        Ok(TaskResult::Skipped("NetworkManager did not report running".to_string()))
    }
}
