//! Checks of live kernel and service state.
//!
//! Absent hardware or features are INFO, a live mismatch is FAIL (usually
//! "needs reboot"), and something that works now but will not survive a
//! reboot is WARN. Hardware signals are advisory and never FAIL.
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::PathBuf;

use super::normalize::values_equal;
use super::static_checks::{find_artifact, modprobe_options};
use super::{ReportKind, Status, VerificationReport, VerifyContext};
use crate::catalog::{Catalog, paths};
use crate::exec::Executor;
use crate::platform::SystemProbe;

const GROUP_CMDLINE: &str = "kernel command line";
const GROUP_PARAMS: &str = "module parameters";
const GROUP_MODULES: &str = "loaded modules";
const GROUP_SERVICES: &str = "service state";
const GROUP_ENV: &str = "session environment";
const GROUP_HARDWARE: &str = "hardware (advisory)";

/// Persistent enablement of a unit as reported by `systemctl is-enabled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitEnablement {
    /// `systemctl` is not available.
    Unavailable,
    /// Enabled, static, alias, indirect or generated.
    Enabled,
    /// Installed but not enabled.
    Disabled,
    /// Masked.
    Masked,
    /// No such unit.
    NotFound,
}

/// Query a unit's enablement. The exit status of `is-enabled` is non-zero
/// for several valid states, so only its output is interpreted.
#[must_use]
pub fn unit_enablement(executor: &dyn Executor, unit: &str) -> UnitEnablement {
    if !executor.which("systemctl") {
        return UnitEnablement::Unavailable;
    }
    let Ok(result) = executor.run_unchecked("systemctl", &["is-enabled", unit]) else {
        return UnitEnablement::Unavailable;
    };
    match result.stdout.trim() {
        "enabled" | "enabled-runtime" | "static" | "alias" | "indirect" | "generated" => {
            UnitEnablement::Enabled
        }
        "masked" | "masked-runtime" => UnitEnablement::Masked,
        "disabled" | "linked" | "linked-runtime" => UnitEnablement::Disabled,
        _ => UnitEnablement::NotFound,
    }
}

/// Whether a unit is currently active.
fn unit_active(executor: &dyn Executor, unit: &str) -> bool {
    executor
        .run_unchecked("systemctl", &["is-active", unit])
        .is_ok_and(|r| r.stdout.trim() == "active")
}

/// Everything the runtime checks read from.
pub struct RuntimeEnv<'a> {
    /// Expected values.
    pub catalog: &'a Catalog,
    /// Package and kernel queries.
    pub probe: &'a dyn SystemProbe,
    /// Runs `systemctl` and `iw`.
    pub executor: &'a dyn Executor,
    /// Root under which `/proc` and `/sys` are read (`/` normally).
    pub root: PathBuf,
    /// Environment of the current session.
    pub environment: HashMap<String, String>,
}

impl fmt::Debug for RuntimeEnv<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeEnv")
            .field("root", &self.root)
            .field("environment", &self.environment.len())
            .finish_non_exhaustive()
    }
}

impl<'a> RuntimeEnv<'a> {
    /// An environment reading the live `/proc`, `/sys` and process
    /// environment.
    #[must_use]
    pub fn live(
        catalog: &'a Catalog,
        probe: &'a dyn SystemProbe,
        executor: &'a dyn Executor,
    ) -> Self {
        Self {
            catalog,
            probe,
            executor,
            root: PathBuf::from("/"),
            environment: std::env::vars().collect(),
        }
    }

    fn read(&self, path: &str) -> Option<String> {
        fs::read_to_string(self.resolve(path)).ok()
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn module_present(&self, module: &str, loaded: &HashSet<String>) -> bool {
        loaded.contains(module) || self.resolve(&format!("/sys/module/{module}")).exists()
    }
}

/// Run every runtime check.
#[must_use]
pub fn verify_runtime(env: &RuntimeEnv<'_>) -> VerificationReport {
    let mut ctx = VerifyContext::new();
    check_cmdline(env, &mut ctx);
    check_module_params(env, &mut ctx);
    check_loaded_modules(env, &mut ctx);
    check_services(env, &mut ctx);
    check_environment(env, &mut ctx);
    check_regdom(env, &mut ctx);
    check_power_save(env, &mut ctx);
    check_epp(env, &mut ctx);
    ctx.finish(ReportKind::Runtime)
}

/// Expected command-line tokens, as rendered for the kernel cmdline file.
fn expected_cmdline(catalog: &Catalog) -> Vec<String> {
    find_artifact(catalog, paths::KERNEL_CMDLINE)
        .and_then(|a| catalog.render(&a.destination).ok())
        .map(|lines| lines.iter().flat_map(|l| l.split_whitespace()).map(String::from).collect())
        .unwrap_or_default()
}

fn check_cmdline(env: &RuntimeEnv<'_>, ctx: &mut VerifyContext) {
    let Some(live) = env.read("/proc/cmdline") else {
        ctx.record(GROUP_CMDLINE, "/proc/cmdline", Status::Info, "not readable");
        return;
    };
    let tokens: Vec<&str> = live.split_whitespace().collect();
    for expected in expected_cmdline(env.catalog) {
        let (status, message) = match expected.split_once('=') {
            Some((key, value)) => {
                let prefix = format!("{key}=");
                match tokens.iter().rev().find_map(|t| t.strip_prefix(prefix.as_str())) {
                    Some(live_value) if values_equal(value, live_value) => (Status::Ok, String::new()),
                    Some(live_value) => (
                        Status::Fail,
                        format!("running with {key}={live_value} (needs reboot)"),
                    ),
                    None => (Status::Fail, "not on the running command line (needs reboot)".to_string()),
                }
            }
            None if tokens.contains(&expected.as_str()) => (Status::Ok, String::new()),
            None => (Status::Fail, "not on the running command line (needs reboot)".to_string()),
        };
        ctx.record(GROUP_CMDLINE, expected, status, message);
    }
}

fn loaded_modules(env: &RuntimeEnv<'_>) -> Option<HashSet<String>> {
    let content = env.read("/proc/modules")?;
    Some(
        content
            .lines()
            .filter_map(|l| l.split_whitespace().next())
            .map(String::from)
            .collect(),
    )
}

fn check_module_params(env: &RuntimeEnv<'_>, ctx: &mut VerifyContext) {
    let state = env.catalog.state();
    let wanted: Vec<String> = state
        .scalars("module_options")
        .map(|o| format!("options {o}"))
        .collect();
    for (module, param, value) in modprobe_options(&wanted.join("\n")) {
        let description = format!("{module}.{param}={value}");
        if !env.resolve(&format!("/sys/module/{module}")).exists() {
            ctx.record(GROUP_PARAMS, description, Status::Info, "module not loaded");
            continue;
        }
        match env.read(&format!("/sys/module/{module}/parameters/{param}")) {
            None => ctx.record(GROUP_PARAMS, description, Status::Info, "parameter not exposed"),
            Some(live) if values_equal(&value, &live) => {
                ctx.record(GROUP_PARAMS, description, Status::Ok, "");
            }
            Some(live) => ctx.record(
                GROUP_PARAMS,
                description,
                Status::Fail,
                format!("live value {} (needs reboot or module reload)", live.trim()),
            ),
        }
    }
}

fn check_loaded_modules(env: &RuntimeEnv<'_>, ctx: &mut VerifyContext) {
    let Some(loaded) = loaded_modules(env) else {
        ctx.record(GROUP_MODULES, "/proc/modules", Status::Info, "not readable");
        return;
    };
    let state = env.catalog.state();
    for module in state.scalars("module_blacklist") {
        let name = module.replace('-', "_");
        if loaded.contains(&name) {
            ctx.record(
                GROUP_MODULES,
                format!("{module} not loaded"),
                Status::Fail,
                "blacklisted module is loaded (needs reboot)",
            );
        } else {
            ctx.record(GROUP_MODULES, format!("{module} not loaded"), Status::Ok, "");
        }
    }

    let autoload = find_artifact(env.catalog, paths::MODULES_LOAD);
    let applicable = autoload.is_some_and(|a| env.catalog.applies(a, env.probe));
    for module in state.scalars("autoload_modules") {
        let description = format!("{module} loaded");
        if !applicable {
            let reason = autoload.map_or_else(
                || "autoload is not configured".to_string(),
                |a| env.catalog.requirement(a),
            );
            ctx.record(GROUP_MODULES, description, Status::Info, format!("not applicable: {reason}"));
        } else if env.module_present(&module.replace('-', "_"), &loaded) {
            ctx.record(GROUP_MODULES, description, Status::Ok, "");
        } else {
            ctx.record(GROUP_MODULES, description, Status::Fail, "not loaded (needs reboot)");
        }
    }
}

fn check_services(env: &RuntimeEnv<'_>, ctx: &mut VerifyContext) {
    let state = env.catalog.state();
    for unit in state.scalars("units").chain(state.scalars("system_services")) {
        let (status, message) = match unit_enablement(env.executor, unit) {
            UnitEnablement::Unavailable => (Status::Info, "systemctl not available"),
            UnitEnablement::NotFound => (Status::Info, "not installed"),
            UnitEnablement::Masked => (Status::Fail, "masked"),
            enablement if !unit_active(env.executor, unit) => {
                if enablement == UnitEnablement::Enabled {
                    (Status::Fail, "inactive (needs reboot)")
                } else {
                    (Status::Fail, "inactive and not enabled")
                }
            }
            UnitEnablement::Disabled => (Status::Warn, "active but not enabled, will not survive reboot"),
            UnitEnablement::Enabled => (Status::Ok, ""),
        };
        ctx.record(GROUP_SERVICES, unit, status, message);
    }
}

fn check_environment(env: &RuntimeEnv<'_>, ctx: &mut VerifyContext) {
    for (key, value) in env.catalog.state().pairs("environment") {
        let description = format!("{key}={value}");
        match env.environment.get(key) {
            Some(live) if live == value => ctx.record(GROUP_ENV, description, Status::Ok, ""),
            Some(live) => ctx.record(
                GROUP_ENV,
                description,
                Status::Fail,
                format!("session has {key}={live} (log in again)"),
            ),
            None => ctx.record(
                GROUP_ENV,
                description,
                Status::Fail,
                "not set in this session (log in again)",
            ),
        }
    }
}

fn check_regdom(env: &RuntimeEnv<'_>, ctx: &mut VerifyContext) {
    let Some(expected) = env.catalog.state().value("system", "regdom") else {
        return;
    };
    let description = format!("regulatory domain {expected}");
    if !env.executor.which("iw") {
        ctx.record(GROUP_HARDWARE, description, Status::Info, "iw not installed");
        return;
    }
    let live = env
        .executor
        .run_unchecked("iw", &["reg", "get"])
        .ok()
        .filter(|r| r.success)
        .and_then(|r| {
            r.stdout
                .lines()
                .find_map(|l| l.trim().strip_prefix("country "))
                .map(|rest| rest.split(':').next().unwrap_or_default().to_string())
        });
    match live {
        None => ctx.record(GROUP_HARDWARE, description, Status::Info, "no wireless regulatory data"),
        Some(country) if country == expected => ctx.record(GROUP_HARDWARE, description, Status::Ok, ""),
        Some(country) => ctx.record(
            GROUP_HARDWARE,
            description,
            Status::Warn,
            format!("kernel reports {country}"),
        ),
    }
}

fn check_power_save(env: &RuntimeEnv<'_>, ctx: &mut VerifyContext) {
    let Some(iface) = env.catalog.state().value("network", "wifi_interface") else {
        return;
    };
    let description = format!("{iface} power save off");
    if !env.executor.which("iw") {
        ctx.record(GROUP_HARDWARE, description, Status::Info, "iw not installed");
        return;
    }
    let state = env
        .executor
        .run_unchecked("iw", &["dev", iface, "get", "power_save"])
        .ok()
        .filter(|r| r.success)
        .and_then(|r| {
            r.stdout
                .lines()
                .find_map(|l| l.trim().strip_prefix("Power save:"))
                .map(|s| s.trim().to_string())
        });
    match state.as_deref() {
        None => ctx.record(GROUP_HARDWARE, description, Status::Info, "interface not present"),
        Some("off") => ctx.record(GROUP_HARDWARE, description, Status::Ok, ""),
        Some(other) => ctx.record(
            GROUP_HARDWARE,
            description,
            Status::Warn,
            format!("power save is {other}"),
        ),
    }
}

fn check_epp(env: &RuntimeEnv<'_>, ctx: &mut VerifyContext) {
    let Some(expected) = env.catalog.state().value("power", "epp") else {
        return;
    };
    let description = format!("energy performance preference {expected}");
    let path = "/sys/devices/system/cpu/cpufreq/policy0/energy_performance_preference";
    match env.read(path) {
        None => ctx.record(GROUP_HARDWARE, description, Status::Info, "not supported by this CPU driver"),
        Some(live) if values_equal(expected, &live) => {
            ctx.record(GROUP_HARDWARE, description, Status::Ok, "");
        }
        Some(live) => ctx.record(
            GROUP_HARDWARE,
            description,
            Status::Warn,
            format!("currently {}", live.trim()),
        ),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::catalog::{ConfigArtifact, Layout, Privilege, Renderer};
    use crate::config::ConfigurationState;
    use crate::exec::test_helpers::MockExecutor;
    use crate::platform::{FixedProbe, KernelVersion};
    use crate::verify::VerificationResult;
    use std::path::Path;

    /// A temporary root holding fake `/proc` and `/sys` files.
    fn fake_root(files: &[(&str, &str)]) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full = tmp.path().join(path.trim_start_matches('/'));
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(&full, content).unwrap();
        }
        tmp
    }

    fn catalog(state: ConfigurationState) -> Catalog {
        let layout = Layout {
            sysroot: PathBuf::from("/"),
            home: PathBuf::from("/home/me"),
        };
        Catalog::builtin(&layout, state)
    }

    fn env<'a>(
        catalog: &'a Catalog,
        probe: &'a FixedProbe,
        exec: &'a MockExecutor,
        root: &Path,
    ) -> RuntimeEnv<'a> {
        RuntimeEnv {
            catalog,
            probe,
            executor: exec,
            root: root.to_path_buf(),
            environment: HashMap::new(),
        }
    }

    fn find<'r>(report: &'r VerificationReport, description: &str) -> &'r VerificationResult {
        report
            .results
            .iter()
            .find(|r| r.description == description)
            .unwrap()
    }

    #[test]
    fn hex_param_matches_decimal_sysfs_value() {
        let state = ConfigurationState::new()
            .with_scalars("module_options", ["amdgpu ppfeaturemask=0xfffd7fff"]);
        let catalog = catalog(state);
        let root = fake_root(&[(
            "/sys/module/amdgpu/parameters/ppfeaturemask",
            "4294803455\n",
        )]);
        let probe = FixedProbe::new();
        let exec = MockExecutor::new();
        let report = verify_runtime(&env(&catalog, &probe, &exec, root.path()));
        assert_eq!(find(&report, "amdgpu.ppfeaturemask=0xfffd7fff").status, Status::Ok);
    }

    #[test]
    fn absent_module_is_info_and_mismatch_is_fail() {
        let state = ConfigurationState::new().with_scalars(
            "module_options",
            ["iwlwifi power_save=0", "amdgpu ppfeaturemask=0xfffd7fff"],
        );
        let catalog = catalog(state);
        let root = fake_root(&[("/sys/module/amdgpu/parameters/ppfeaturemask", "4294967295\n")]);
        let probe = FixedProbe::new();
        let exec = MockExecutor::new();
        let report = verify_runtime(&env(&catalog, &probe, &exec, root.path()));
        assert_eq!(find(&report, "iwlwifi.power_save=0").status, Status::Info);
        assert_eq!(find(&report, "amdgpu.ppfeaturemask=0xfffd7fff").status, Status::Fail);
    }

    #[test]
    fn cmdline_checks_each_param() {
        let state = ConfigurationState::new()
            .with_pairs("system", [("root", "LABEL=r")])
            .with_scalars("kernel_params", ["quiet", "amdgpu.ppfeaturemask=0xfffd7fff"]);
        let catalog = catalog(state);
        let root = fake_root(&[(
            "/proc/cmdline",
            "BOOT_IMAGE=/vmlinuz root=LABEL=r rw amdgpu.ppfeaturemask=4294803455\n",
        )]);
        let probe = FixedProbe::new();
        let exec = MockExecutor::new();
        let report = verify_runtime(&env(&catalog, &probe, &exec, root.path()));
        assert_eq!(find(&report, "root=LABEL=r").status, Status::Ok);
        assert_eq!(find(&report, "amdgpu.ppfeaturemask=0xfffd7fff").status, Status::Ok);
        assert_eq!(find(&report, "quiet").status, Status::Fail);
    }

    #[test]
    fn blacklist_and_autoload() {
        let state = ConfigurationState::new()
            .with_pairs("system", [("autoload_min_kernel", "6.14")])
            .with_scalars("module_blacklist", ["pcspkr", "sp5100-tco"])
            .with_scalars("autoload_modules", ["ntsync"]);
        let catalog = catalog(state);
        let root = fake_root(&[("/proc/modules", "sp5100_tco 12288 0 - Live 0x0\n")]);
        let exec = MockExecutor::new();

        let old = FixedProbe::new().with_kernel(KernelVersion::new(6, 12, 0));
        let report = verify_runtime(&env(&catalog, &old, &exec, root.path()));
        assert_eq!(find(&report, "pcspkr not loaded").status, Status::Ok);
        assert_eq!(find(&report, "sp5100-tco not loaded").status, Status::Fail);
        assert_eq!(find(&report, "ntsync loaded").status, Status::Info);

        let new = FixedProbe::new().with_kernel(KernelVersion::new(6, 14, 1));
        let report = verify_runtime(&env(&catalog, &new, &exec, root.path()));
        assert_eq!(find(&report, "ntsync loaded").status, Status::Fail);
    }

    #[test]
    fn service_states() {
        let state = ConfigurationState::new().with_scalars(
            "units",
            ["a.service", "b.service", "c.service", "d.service", "e.service"],
        );
        let catalog = catalog(state);
        let root = fake_root(&[]);
        let probe = FixedProbe::new();
        let exec = MockExecutor::new()
            .with_program("systemctl")
            .respond("systemctl is-enabled a.service", true, "enabled\n")
            .respond("systemctl is-active a.service", true, "active\n")
            .respond("systemctl is-enabled b.service", false, "disabled\n")
            .respond("systemctl is-active b.service", true, "active\n")
            .respond("systemctl is-enabled c.service", true, "enabled\n")
            .respond("systemctl is-active c.service", false, "inactive\n")
            .respond("systemctl is-enabled d.service", false, "masked\n");
        let report = verify_runtime(&env(&catalog, &probe, &exec, root.path()));
        assert_eq!(find(&report, "a.service").status, Status::Ok);
        assert_eq!(find(&report, "b.service").status, Status::Warn);
        assert_eq!(find(&report, "c.service").status, Status::Fail);
        assert_eq!(find(&report, "c.service").message, "inactive (needs reboot)");
        assert_eq!(find(&report, "d.service").status, Status::Fail);
        assert_eq!(find(&report, "e.service").status, Status::Info);
    }

    #[test]
    fn environment_propagation() {
        let state = ConfigurationState::new()
            .with_pairs("environment", [("MOZ_ENABLE_WAYLAND", "1"), ("AMD_VULKAN_ICD", "RADV")]);
        let catalog = catalog(state);
        let root = fake_root(&[]);
        let probe = FixedProbe::new();
        let exec = MockExecutor::new();
        let mut runtime = env(&catalog, &probe, &exec, root.path());
        runtime
            .environment
            .insert("MOZ_ENABLE_WAYLAND".to_string(), "1".to_string());
        let report = verify_runtime(&runtime);
        assert_eq!(find(&report, "MOZ_ENABLE_WAYLAND=1").status, Status::Ok);
        assert_eq!(find(&report, "AMD_VULKAN_ICD=RADV").status, Status::Fail);
    }

    #[test]
    fn hardware_checks_never_fail() {
        let state = ConfigurationState::new()
            .with_pairs("system", [("regdom", "US")])
            .with_pairs("network", [("wifi_interface", "wlan0")])
            .with_pairs("power", [("epp", "balance_power")]);
        let catalog = catalog(state);
        let root = fake_root(&[(
            "/sys/devices/system/cpu/cpufreq/policy0/energy_performance_preference",
            "performance\n",
        )]);
        let probe = FixedProbe::new();
        let exec = MockExecutor::new()
            .with_program("iw")
            .respond("iw reg get", true, "global\ncountry DE: DFS-ETSI\n")
            .respond("iw dev wlan0 get power_save", true, "Power save: on\n");
        let report = verify_runtime(&env(&catalog, &probe, &exec, root.path()));
        assert_eq!(find(&report, "regulatory domain US").status, Status::Warn);
        assert_eq!(find(&report, "wlan0 power save off").status, Status::Warn);
        assert_eq!(
            find(&report, "energy performance preference balance_power").status,
            Status::Warn
        );
        assert_eq!(report.summary.fail, 0, "{:#?}", report.results);

        let no_iw = MockExecutor::new();
        let empty = fake_root(&[]);
        let report = verify_runtime(&env(&catalog, &probe, &no_iw, empty.path()));
        assert_eq!(find(&report, "regulatory domain US").status, Status::Info);
        assert_eq!(
            find(&report, "energy performance preference balance_power").status,
            Status::Info
        );
    }

    #[test]
    fn unreadable_proc_is_info() {
        let catalog = Catalog::from_artifacts(
            vec![ConfigArtifact::new("/etc/x", Privilege::System, Renderer::fixed(&["x"]))],
            ConfigurationState::new(),
        );
        let root = fake_root(&[]);
        let probe = FixedProbe::new();
        let exec = MockExecutor::new();
        let report = verify_runtime(&env(&catalog, &probe, &exec, root.path()));
        assert_eq!(find(&report, "/proc/cmdline").status, Status::Info);
        assert_eq!(report.overall, Status::Ok);
    }
}
