// src/tweaks/registry/mod.rs

pub mod method;

use method::{RegistryModification, RegistryTweak};

use super::{SystemContext, Tweak};
use crate::{
    logging::LogArea,
    models::RiskLevel,
    utils::registry::{RegistryHive, RegistryKeyValue},
};

const MULTIMEDIA_SYSTEM_PROFILE: &str =
    r"SOFTWARE\Microsoft\Windows NT\CurrentVersion\Multimedia\SystemProfile";
const EXPLORER_POLICIES: &str = r"SOFTWARE\Microsoft\Windows\CurrentVersion\Policies\Explorer";
const DESKTOP: &str = r"Control Panel\Desktop";

fn set(
    hive: RegistryHive,
    path: &'static str,
    key: &'static str,
    target_value: RegistryKeyValue,
    default_value: RegistryKeyValue,
) -> RegistryModification {
    RegistryModification {
        hive,
        path,
        key,
        target_value,
        default_value: Some(default_value),
    }
}

/// A value that only exists while the tweak is applied.
fn create(
    hive: RegistryHive,
    path: &'static str,
    key: &'static str,
    target_value: RegistryKeyValue,
) -> RegistryModification {
    RegistryModification {
        hive,
        path,
        key,
        target_value,
        default_value: None,
    }
}

fn text(value: &str) -> RegistryKeyValue {
    RegistryKeyValue::String(value.to_string())
}

// Network

pub fn network_throttling(ctx: &SystemContext) -> Tweak {
    Tweak::new(
        "network-throttling",
        "Disable Network Throttling",
        "Windows throttles non-multimedia network traffic while multimedia playback is active, \
        capping it at roughly ten packets per millisecond. Setting NetworkThrottlingIndex to \
        0xFFFFFFFF removes the cap, and SystemResponsiveness 0 stops the scheduler from \
        reserving CPU time for background multimedia tasks.",
        RiskLevel::Safe,
        LogArea::Network,
        RegistryTweak::new(
            ctx,
            vec![
                set(
                    RegistryHive::LocalMachine,
                    MULTIMEDIA_SYSTEM_PROFILE,
                    "NetworkThrottlingIndex",
                    RegistryKeyValue::Dword(0xFFFF_FFFF),
                    RegistryKeyValue::Dword(10),
                ),
                set(
                    RegistryHive::LocalMachine,
                    MULTIMEDIA_SYSTEM_PROFILE,
                    "SystemResponsiveness",
                    RegistryKeyValue::Dword(0),
                    RegistryKeyValue::Dword(20),
                ),
            ],
        ),
    )
}

// Performance

pub fn disable_game_dvr(ctx: &SystemContext) -> Tweak {
    Tweak::new(
        "disable-game-dvr",
        "Disable Game DVR",
        "Turns off background game recording and the Game Bar capture pipeline, which keep \
        an encoder running while games are in the foreground.",
        RiskLevel::Safe,
        LogArea::Performance,
        RegistryTweak::new(
            ctx,
            vec![
                create(
                    RegistryHive::LocalMachine,
                    r"SOFTWARE\Policies\Microsoft\Windows\GameDVR",
                    "AllowGameDVR",
                    RegistryKeyValue::Dword(0),
                ),
                set(
                    RegistryHive::CurrentUser,
                    r"System\GameConfigStore",
                    "GameDVR_Enabled",
                    RegistryKeyValue::Dword(0),
                    RegistryKeyValue::Dword(1),
                ),
                set(
                    RegistryHive::CurrentUser,
                    r"SOFTWARE\Microsoft\Windows\CurrentVersion\GameDVR",
                    "AppCaptureEnabled",
                    RegistryKeyValue::Dword(0),
                    RegistryKeyValue::Dword(1),
                ),
            ],
        ),
    )
}

pub fn win32_priority_separation(ctx: &SystemContext) -> Tweak {
    Tweak::new(
        "system-responsiveness",
        "Foreground Priority Boost",
        "Sets Win32PrioritySeparation to 0x26: short, variable quanta with the highest boost \
        for the foreground window. Background work gets smaller time slices.",
        RiskLevel::Moderate,
        LogArea::Performance,
        RegistryTweak::new(
            ctx,
            vec![set(
                RegistryHive::LocalMachine,
                r"SYSTEM\CurrentControlSet\Control\PriorityControl",
                "Win32PrioritySeparation",
                RegistryKeyValue::Dword(38),
                RegistryKeyValue::Dword(2),
            )],
        ),
    )
    .requiring_reboot()
}

// Privacy

pub fn disable_telemetry(ctx: &SystemContext) -> Tweak {
    Tweak::new(
        "disable-telemetry",
        "Disable Telemetry",
        "Sets the diagnostic data policy to the lowest level the edition allows and caps the \
        level users can opt into.",
        RiskLevel::Safe,
        LogArea::Privacy,
        RegistryTweak::new(
            ctx,
            vec![
                set(
                    RegistryHive::LocalMachine,
                    r"SOFTWARE\Policies\Microsoft\Windows\DataCollection",
                    "AllowTelemetry",
                    RegistryKeyValue::Dword(0),
                    RegistryKeyValue::Dword(1),
                ),
                create(
                    RegistryHive::LocalMachine,
                    r"SOFTWARE\Policies\Microsoft\Windows\DataCollection",
                    "MaxTelemetryAllowed",
                    RegistryKeyValue::Dword(0),
                ),
            ],
        ),
    )
}

pub fn disable_advertising_id(ctx: &SystemContext) -> Tweak {
    Tweak::new(
        "disable-advertising-id",
        "Disable Advertising ID",
        "Stops apps from using the per-user advertising identifier for cross-app ad targeting.",
        RiskLevel::Safe,
        LogArea::Privacy,
        RegistryTweak::new(
            ctx,
            vec![
                set(
                    RegistryHive::LocalMachine,
                    r"SOFTWARE\Microsoft\Windows\CurrentVersion\AdvertisingInfo",
                    "Enabled",
                    RegistryKeyValue::Dword(0),
                    RegistryKeyValue::Dword(1),
                ),
                create(
                    RegistryHive::LocalMachine,
                    r"SOFTWARE\Policies\Microsoft\Windows\AdvertisingInfo",
                    "DisabledByGroupPolicy",
                    RegistryKeyValue::Dword(1),
                ),
                set(
                    RegistryHive::CurrentUser,
                    r"SOFTWARE\Microsoft\Windows\CurrentVersion\AdvertisingInfo",
                    "Enabled",
                    RegistryKeyValue::Dword(0),
                    RegistryKeyValue::Dword(1),
                ),
            ],
        ),
    )
}

pub fn disable_location(ctx: &SystemContext) -> Tweak {
    Tweak::new(
        "disable-location",
        "Disable Location Tracking",
        "Disables the location platform and location scripting by policy and denies location \
        access in the capability consent store.",
        RiskLevel::Safe,
        LogArea::Privacy,
        RegistryTweak::new(
            ctx,
            vec![
                create(
                    RegistryHive::LocalMachine,
                    r"SOFTWARE\Policies\Microsoft\Windows\LocationAndSensors",
                    "DisableLocation",
                    RegistryKeyValue::Dword(1),
                ),
                create(
                    RegistryHive::LocalMachine,
                    r"SOFTWARE\Policies\Microsoft\Windows\LocationAndSensors",
                    "DisableLocationScripting",
                    RegistryKeyValue::Dword(1),
                ),
                set(
                    RegistryHive::LocalMachine,
                    r"SOFTWARE\Microsoft\Windows\CurrentVersion\CapabilityAccessManager\ConsentStore\location",
                    "Value",
                    text("Deny"),
                    text("Allow"),
                ),
            ],
        ),
    )
}

// Security

pub fn disable_autorun(ctx: &SystemContext) -> Tweak {
    Tweak::new(
        "disable-autorun",
        "Disable AutoRun",
        "Prevents AutoRun/AutoPlay from launching content on any drive type, a common \
        infection path for removable media.",
        RiskLevel::Safe,
        LogArea::Security,
        RegistryTweak::new(
            ctx,
            vec![
                create(
                    RegistryHive::LocalMachine,
                    EXPLORER_POLICIES,
                    "NoDriveTypeAutoRun",
                    RegistryKeyValue::Dword(0xFF),
                ),
                create(
                    RegistryHive::CurrentUser,
                    EXPLORER_POLICIES,
                    "NoDriveTypeAutoRun",
                    RegistryKeyValue::Dword(0xFF),
                ),
                create(
                    RegistryHive::LocalMachine,
                    EXPLORER_POLICIES,
                    "NoAutorun",
                    RegistryKeyValue::Dword(1),
                ),
            ],
        ),
    )
}

pub fn disable_remote_assistance(ctx: &SystemContext) -> Tweak {
    Tweak::new(
        "disable-remote-assistance",
        "Disable Remote Assistance",
        "Refuses incoming Remote Assistance invitations and remote control of the desktop.",
        RiskLevel::Safe,
        LogArea::Security,
        RegistryTweak::new(
            ctx,
            vec![
                set(
                    RegistryHive::LocalMachine,
                    r"SYSTEM\CurrentControlSet\Control\Remote Assistance",
                    "fAllowToGetHelp",
                    RegistryKeyValue::Dword(0),
                    RegistryKeyValue::Dword(1),
                ),
                set(
                    RegistryHive::LocalMachine,
                    r"SYSTEM\CurrentControlSet\Control\Remote Assistance",
                    "fAllowFullControl",
                    RegistryKeyValue::Dword(0),
                    RegistryKeyValue::Dword(0),
                ),
            ],
        ),
    )
}

// User interface

pub fn menu_show_delay(ctx: &SystemContext) -> Tweak {
    Tweak::new(
        "menu-show-delay",
        "Instant Menus",
        "Removes the 400 ms hover delay before cascading menus open.",
        RiskLevel::Safe,
        LogArea::Ui,
        RegistryTweak::new(
            ctx,
            vec![set(
                RegistryHive::CurrentUser,
                DESKTOP,
                "MenuShowDelay",
                text("0"),
                text("400"),
            )],
        ),
    )
}

pub fn disable_transparency(ctx: &SystemContext) -> Tweak {
    Tweak::new(
        "disable-transparency",
        "Disable Transparency Effects",
        "Turns off acrylic blur on the taskbar, Start and Action Center.",
        RiskLevel::Safe,
        LogArea::Ui,
        RegistryTweak::new(
            ctx,
            vec![set(
                RegistryHive::CurrentUser,
                r"SOFTWARE\Microsoft\Windows\CurrentVersion\Themes\Personalize",
                "EnableTransparency",
                RegistryKeyValue::Dword(0),
                RegistryKeyValue::Dword(1),
            )],
        ),
    )
}

pub fn disable_aero_shake(ctx: &SystemContext) -> Tweak {
    Tweak::new(
        "disable-aero-shake",
        "Disable Aero Shake",
        "Stops shaking a window's title bar from minimizing every other window.",
        RiskLevel::Safe,
        LogArea::Ui,
        RegistryTweak::new(
            ctx,
            vec![create(
                RegistryHive::CurrentUser,
                r"SOFTWARE\Microsoft\Windows\CurrentVersion\Explorer\Advanced",
                "DisallowShaking",
                RegistryKeyValue::Dword(1),
            )],
        ),
    )
}

pub fn auto_end_tasks(ctx: &SystemContext) -> Tweak {
    Tweak::new(
        "auto-end-tasks",
        "Auto End Hung Tasks",
        "Ends hung applications at sign-out or shutdown without prompting, and shortens the \
        time Windows waits before treating an application as hung.",
        RiskLevel::Moderate,
        LogArea::Ui,
        RegistryTweak::new(
            ctx,
            vec![
                set(
                    RegistryHive::CurrentUser,
                    DESKTOP,
                    "AutoEndTasks",
                    text("1"),
                    text("0"),
                ),
                set(
                    RegistryHive::CurrentUser,
                    DESKTOP,
                    "WaitToKillAppTimeout",
                    text("2000"),
                    text("20000"),
                ),
                set(
                    RegistryHive::CurrentUser,
                    DESKTOP,
                    "HungAppTimeout",
                    text("1000"),
                    text("5000"),
                ),
            ],
        ),
    )
}
