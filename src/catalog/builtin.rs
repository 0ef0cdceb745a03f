//! The fixed, ordered list of artifacts syscfg manages.
use std::path::Path;

use super::{Activation, Applicability, Block, ConfigArtifact, Layout, Privilege, Renderer};

/// Logical destinations of the built-in artifacts. System paths are
/// absolute (resolved under the system root), user paths are relative to
/// the invoking user's home.
pub mod paths {
    /// Kernel command line read by the UKI/kernel-install tooling.
    pub const KERNEL_CMDLINE: &str = "/etc/kernel/cmdline";
    /// systemd-boot loader configuration.
    pub const LOADER_CONF: &str = "/boot/loader/loader.conf";
    /// systemd-boot entry.
    pub const LOADER_ENTRY: &str = "/boot/loader/entries/syscfg.conf";
    /// mkinitcpio drop-in.
    pub const MKINITCPIO: &str = "/etc/mkinitcpio.conf.d/syscfg.conf";
    /// Module options.
    pub const MODPROBE_OPTIONS: &str = "/etc/modprobe.d/syscfg-options.conf";
    /// Module blacklist.
    pub const MODPROBE_BLACKLIST: &str = "/etc/modprobe.d/syscfg-blacklist.conf";
    /// Modules loaded at boot.
    pub const MODULES_LOAD: &str = "/etc/modules-load.d/syscfg.conf";
    /// udev rules.
    pub const UDEV_RULES: &str = "/etc/udev/rules.d/99-syscfg.rules";
    /// journald drop-in.
    pub const JOURNALD: &str = "/etc/systemd/journald.conf.d/syscfg.conf";
    /// systemd-coredump drop-in.
    pub const COREDUMP: &str = "/etc/systemd/coredump.conf.d/syscfg.conf";
    /// systemd-resolved drop-in.
    pub const RESOLVED: &str = "/etc/systemd/resolved.conf.d/syscfg.conf";
    /// systemd-logind drop-in.
    pub const LOGIND: &str = "/etc/systemd/logind.conf.d/syscfg.conf";
    /// iwd main configuration.
    pub const IWD_MAIN: &str = "/etc/iwd/main.conf";
    /// NetworkManager WiFi backend selection.
    pub const NM_WIFI_BACKEND: &str = "/etc/NetworkManager/conf.d/syscfg-wifi-backend.conf";
    /// Wireless regulatory domain.
    pub const WIRELESS_REGDOM: &str = "/etc/conf.d/wireless-regdom";
    /// Unit disabling WiFi power saving.
    pub const WIFI_POWERSAVE_UNIT: &str = "/etc/systemd/system/syscfg-wifi-powersave.service";
    /// Unit applying the CPU energy performance preference.
    pub const EPP_UNIT: &str = "/etc/systemd/system/syscfg-epp.service";
    /// Session environment for the user manager.
    pub const USER_ENVIRONMENT: &str = ".config/environment.d/50-syscfg.conf";
    /// User manager drop-in.
    pub const USER_MANAGER: &str = ".config/systemd/user.conf.d/50-syscfg.conf";
}

use paths::{
    COREDUMP, EPP_UNIT, IWD_MAIN, JOURNALD, KERNEL_CMDLINE, LOADER_CONF, LOADER_ENTRY, LOGIND,
    MKINITCPIO, MODPROBE_BLACKLIST, MODPROBE_OPTIONS, MODULES_LOAD, NM_WIFI_BACKEND, RESOLVED,
    UDEV_RULES, USER_ENVIRONMENT, USER_MANAGER, WIFI_POWERSAVE_UNIT, WIRELESS_REGDOM,
};

fn system(layout: &Layout, path: &str, renderer: Renderer) -> ConfigArtifact {
    ConfigArtifact::new(layout.system(Path::new(path)), Privilege::System, renderer)
}

fn user(layout: &Layout, path: &str, renderer: Renderer) -> ConfigArtifact {
    ConfigArtifact::new(layout.user(Path::new(path)), Privilege::User, renderer)
}

/// `[section]` header followed by `key=value` lines from `group`.
fn ini_section(section: &str, group: &str) -> Vec<Block> {
    vec![Block::line(&format!("[{section}]")), Block::pairs(group, "=")]
}

fn restart(unit: &str) -> Activation {
    Activation::Restart(unit.to_string())
}

/// The built-in artifacts, in install order, resolved against `layout`.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn builtin_artifacts(layout: &Layout) -> Vec<ConfigArtifact> {
    vec![
        system(
            layout,
            KERNEL_CMDLINE,
            Renderer::template(&["root={system.root} rw {kernel_params}"]),
        )
        .activates(Activation::Boot),
        system(
            layout,
            LOADER_CONF,
            Renderer::Generated(vec![Block::pairs("loader", " ")]),
        )
        .activates(Activation::Boot),
        system(
            layout,
            LOADER_ENTRY,
            Renderer::template(&[
                "title   Arch Linux (syscfg)",
                "linux   /vmlinuz-{system.kernel}",
                "initrd  /initramfs-{system.kernel}.img",
                "options root={system.root} rw {kernel_params}",
            ]),
        )
        .activates(Activation::Boot),
        system(
            layout,
            MKINITCPIO,
            Renderer::template(&[
                "MODULES=({initramfs_modules})",
                "COMPRESSION=\"{system.compression}\"",
            ]),
        )
        .activates(Activation::Boot),
        system(
            layout,
            MODPROBE_OPTIONS,
            Renderer::Generated(vec![Block::scalars("module_options", "options {}")]),
        )
        .activates(Activation::Boot),
        system(
            layout,
            MODPROBE_BLACKLIST,
            Renderer::Generated(vec![Block::scalars("module_blacklist", "blacklist {}")]),
        )
        .activates(Activation::Boot),
        system(
            layout,
            MODULES_LOAD,
            Renderer::Generated(vec![Block::scalars("autoload_modules", "{}")]),
        )
        .when(Applicability::MinKernel {
            group: "system".into(),
            key: "autoload_min_kernel".into(),
        }),
        system(
            layout,
            UDEV_RULES,
            Renderer::fixed(&[
                "# Runtime power management for PCI and USB devices",
                r#"ACTION=="add", SUBSYSTEM=="pci", ATTR{power/control}="auto""#,
                r#"ACTION=="add", SUBSYSTEM=="usb", TEST=="power/control", ATTR{power/control}="auto""#,
            ]),
        )
        .activates(Activation::Udev),
        system(
            layout,
            JOURNALD,
            Renderer::Generated(ini_section("Journal", "journald")),
        )
        .activates(restart("systemd-journald.service")),
        system(
            layout,
            COREDUMP,
            Renderer::Generated(ini_section("Coredump", "coredump")),
        )
        .activates(Activation::DaemonReload),
        system(
            layout,
            RESOLVED,
            Renderer::Generated(ini_section("Resolve", "resolved")),
        )
        .activates(restart("systemd-resolved.service")),
        system(
            layout,
            LOGIND,
            Renderer::Generated(ini_section("Login", "logind")),
        )
        .activates(Activation::DaemonReload),
        system(
            layout,
            IWD_MAIN,
            Renderer::Generated(
                [
                    ini_section("General", "iwd_general"),
                    vec![Block::line("")],
                    ini_section("Network", "iwd_network"),
                ]
                .concat(),
            ),
        )
        .when(Applicability::Packages(vec!["iwd".into()])),
        system(
            layout,
            NM_WIFI_BACKEND,
            Renderer::fixed(&["[device]", "wifi.backend=iwd"]),
        )
        .when(Applicability::Packages(vec![
            "iwd".into(),
            "networkmanager".into(),
        ]))
        .activates(restart("NetworkManager.service")),
        system(
            layout,
            WIRELESS_REGDOM,
            Renderer::template(&["WIRELESS_REGDOM=\"{system.regdom}\""]),
        ),
        system(
            layout,
            WIFI_POWERSAVE_UNIT,
            Renderer::template(&[
                "[Unit]",
                "Description=Disable WiFi power saving on {network.wifi_interface}",
                "After=sys-subsystem-net-devices-{network.wifi_interface}.device",
                "BindsTo=sys-subsystem-net-devices-{network.wifi_interface}.device",
                "",
                "[Service]",
                "Type=oneshot",
                "ExecStart=/usr/bin/iw dev {network.wifi_interface} set power_save off",
                "RemainAfterExit=yes",
                "",
                "[Install]",
                "WantedBy=sys-subsystem-net-devices-{network.wifi_interface}.device",
            ]),
        )
        .activates(Activation::DaemonReload),
        system(
            layout,
            EPP_UNIT,
            Renderer::template(&[
                "[Unit]",
                "Description=Set CPU energy performance preference to {power.epp}",
                "After=systemd-modules-load.service",
                "",
                "[Service]",
                "Type=oneshot",
                "ExecStart=/bin/sh -c 'for f in /sys/devices/system/cpu/cpufreq/policy*/energy_performance_preference; do echo {power.epp} > \"$f\"; done'",
                "RemainAfterExit=yes",
                "",
                "[Install]",
                "WantedBy=multi-user.target",
            ]),
        )
        .activates(Activation::DaemonReload),
        user(
            layout,
            USER_ENVIRONMENT,
            Renderer::Generated(vec![Block::pairs("environment", "=")]),
        ),
        user(
            layout,
            USER_MANAGER,
            Renderer::Generated(ini_section("Manager", "user_manager")),
        ),
    ]
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::defaults;
    use std::path::PathBuf;

    fn layout() -> Layout {
        Layout {
            sysroot: PathBuf::from("/"),
            home: PathBuf::from("/home/me"),
        }
    }

    fn catalog() -> Catalog {
        Catalog::builtin(&layout(), defaults::profile())
    }

    #[test]
    fn has_nineteen_entries_in_order() {
        let artifacts = builtin_artifacts(&layout());
        assert_eq!(artifacts.len(), 19);
        assert_eq!(artifacts[0].destination, PathBuf::from(KERNEL_CMDLINE));
        assert_eq!(
            artifacts[18].destination,
            PathBuf::from("/home/me").join(USER_MANAGER)
        );
    }

    #[test]
    fn user_artifacts_live_in_home() {
        for artifact in builtin_artifacts(&layout()) {
            match artifact.privilege {
                Privilege::User => assert!(artifact.destination.starts_with("/home/me")),
                Privilege::System => assert!(!artifact.destination.starts_with("/home")),
            }
        }
    }

    #[test]
    fn every_artifact_renders_with_defaults() {
        let catalog = catalog();
        for artifact in catalog.artifacts() {
            let lines = catalog.render(&artifact.destination).unwrap();
            assert!(!lines.is_empty(), "{}", artifact.destination.display());
        }
    }

    #[test]
    fn kernel_cmdline_renders() {
        let catalog = catalog();
        let lines = catalog.render(Path::new(KERNEL_CMDLINE)).unwrap();
        insta::assert_snapshot!(lines.join("\n"), @"root=LABEL=archroot rw quiet loglevel=3 nowatchdog nmi_watchdog=0 amdgpu.ppfeaturemask=0xfffd7fff amd_pstate=active");
    }

    #[test]
    fn journald_drop_in_renders() {
        let catalog = catalog();
        let content = catalog.content(Path::new(JOURNALD)).unwrap();
        insta::assert_snapshot!(String::from_utf8(content).unwrap().trim_end(), @r"
        [Journal]
        SystemMaxUse=200M
        MaxRetentionSec=2week
        Compress=yes
        ");
    }

    #[test]
    fn iwd_has_two_sections() {
        let catalog = catalog();
        let lines = catalog.render(Path::new(IWD_MAIN)).unwrap();
        assert_eq!(lines[0], "[General]");
        assert!(lines.contains(&"[Network]".to_string()));
        assert!(lines.contains(&"NameResolvingService=systemd".to_string()));
    }

    #[test]
    fn udev_rules_keep_attr_braces() {
        let catalog = catalog();
        let lines = catalog.render(Path::new(UDEV_RULES)).unwrap();
        assert!(lines[1].contains("ATTR{power/control}"));
    }

    #[test]
    fn sysroot_prefixes_system_paths() {
        let layout = Layout {
            sysroot: PathBuf::from("/tmp/stage"),
            home: PathBuf::from("/tmp/stage/home"),
        };
        let artifacts = builtin_artifacts(&layout);
        assert_eq!(
            artifacts[0].destination,
            PathBuf::from("/tmp/stage/etc/kernel/cmdline")
        );
    }
}
