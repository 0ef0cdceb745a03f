//! Compiled-in configuration profile.
//!
//! Every group referenced by the built-in catalog is defined here so the
//! catalog renders without an overlay file.
use super::state::ConfigurationState;

/// The default profile: an AMD laptop on Arch Linux using systemd-boot,
/// mkinitcpio, iwd and NetworkManager.
#[must_use]
pub fn profile() -> ConfigurationState {
    ConfigurationState::new()
        .with_pairs(
            "system",
            [
                ("root", "LABEL=archroot"),
                ("kernel", "linux"),
                ("compression", "zstd"),
                ("regdom", "US"),
                ("autoload_min_kernel", "6.14"),
            ],
        )
        .with_scalars(
            "kernel_params",
            [
                "quiet",
                "loglevel=3",
                "nowatchdog",
                "nmi_watchdog=0",
                "amdgpu.ppfeaturemask=0xfffd7fff",
                "amd_pstate=active",
            ],
        )
        .with_pairs(
            "loader",
            [
                ("default", "syscfg.conf"),
                ("timeout", "3"),
                ("console-mode", "max"),
                ("editor", "no"),
            ],
        )
        .with_scalars("initramfs_modules", ["amdgpu"])
        .with_scalars(
            "module_options",
            ["amdgpu ppfeaturemask=0xfffd7fff", "iwlwifi power_save=0"],
        )
        .with_scalars("module_blacklist", ["pcspkr", "sp5100_tco"])
        .with_scalars("autoload_modules", ["ntsync"])
        .with_pairs(
            "journald",
            [
                ("SystemMaxUse", "200M"),
                ("MaxRetentionSec", "2week"),
                ("Compress", "yes"),
            ],
        )
        .with_pairs(
            "coredump",
            [("Storage", "none"), ("ProcessSizeMax", "0")],
        )
        .with_pairs(
            "resolved",
            [
                ("DNS", "9.9.9.9#dns.quad9.net 149.112.112.112#dns.quad9.net"),
                ("DNSSEC", "allow-downgrade"),
                ("DNSOverTLS", "opportunistic"),
                ("MulticastDNS", "no"),
            ],
        )
        .with_pairs(
            "logind",
            [
                ("HandleLidSwitch", "suspend"),
                ("HandleLidSwitchExternalPower", "ignore"),
                ("HandlePowerKey", "suspend"),
                ("IdleAction", "ignore"),
            ],
        )
        .with_pairs(
            "iwd_general",
            [
                ("EnableNetworkConfiguration", "false"),
                ("AddressRandomization", "once"),
            ],
        )
        .with_pairs("iwd_network", [("NameResolvingService", "systemd")])
        .with_pairs(
            "network",
            [("wifi_interface", "wlan0"), ("backend_package", "iwd")],
        )
        .with_pairs("power", [("epp", "balance_power")])
        .with_pairs(
            "environment",
            [
                ("MOZ_ENABLE_WAYLAND", "1"),
                ("ELECTRON_OZONE_PLATFORM_HINT", "auto"),
                ("AMD_VULKAN_ICD", "RADV"),
            ],
        )
        .with_pairs("user_manager", [("DefaultTimeoutStopSec", "10s")])
        .with_scalars(
            "packages",
            ["systemd", "mkinitcpio", "linux-firmware", "iw", "wireless-regdb"],
        )
        .with_scalars("optional_packages", ["iwd", "networkmanager"])
        .with_scalars(
            "units",
            ["syscfg-wifi-powersave.service", "syscfg-epp.service"],
        )
        .with_scalars("system_services", ["systemd-resolved.service"])
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn profile_defines_core_groups() {
        let state = profile();
        for group in [
            "system",
            "kernel_params",
            "loader",
            "module_options",
            "module_blacklist",
            "environment",
            "units",
        ] {
            assert!(state.has_group(group), "missing group {group}");
        }
    }

    #[test]
    fn profile_is_deterministic() {
        assert_eq!(profile(), profile());
    }

    #[test]
    fn ppfeaturemask_agrees_between_cmdline_and_modprobe() {
        let state = profile();
        let cmdline = state
            .scalars("kernel_params")
            .find_map(|p| p.strip_prefix("amdgpu.ppfeaturemask="))
            .unwrap();
        let option = state
            .scalars("module_options")
            .find_map(|o| o.strip_prefix("amdgpu ppfeaturemask="))
            .unwrap();
        assert_eq!(cmdline, option);
    }
}
