// src/tweaks/services/mod.rs

pub mod method;

pub use method::{ServicePhase, ServiceTweak};

use crate::{
    logging::LogArea,
    models::RiskLevel,
    tweaks::{SystemContext, Tweak},
    utils::services::StartupType,
};

fn service_tweak(
    ctx: &SystemContext,
    id: &'static str,
    name: &'static str,
    description: &'static str,
    risk_level: RiskLevel,
    services: &[&'static str],
    default_start_type: StartupType,
) -> Tweak {
    Tweak::new(
        id,
        name,
        description,
        risk_level,
        LogArea::Services,
        ServiceTweak::new(ctx, services).with_default_start_type(default_start_type),
    )
}

pub fn all(ctx: &SystemContext) -> Vec<Tweak> {
    vec![
        service_tweak(
            ctx,
            "disable-bluetooth",
            "Disable Bluetooth Services",
            "Stops the Bluetooth support and audio gateway services. Bluetooth devices stop working.",
            RiskLevel::Safe,
            &["bthserv", "BTAGService"],
            StartupType::Manual,
        ),
        service_tweak(
            ctx,
            "disable-sysmain",
            "Disable SysMain (Superfetch)",
            "Stops memory prefetching of frequently used applications. Can reduce disk activity on SSDs.",
            RiskLevel::Moderate,
            &["SysMain"],
            StartupType::Automatic,
        ),
        service_tweak(
            ctx,
            "disable-print-spooler",
            "Disable Print Spooler",
            "Stops the print queue service. Printing is unavailable until it is re-enabled.",
            RiskLevel::Safe,
            &["Spooler"],
            StartupType::Automatic,
        ),
        service_tweak(
            ctx,
            "disable-remote-registry",
            "Disable Remote Registry",
            "Prevents remote users from modifying the registry on this computer.",
            RiskLevel::Safe,
            &["RemoteRegistry"],
            StartupType::Manual,
        ),
        service_tweak(
            ctx,
            "disable-fax",
            "Disable Fax Service",
            "Stops the fax sending and receiving service.",
            RiskLevel::Safe,
            &["Fax"],
            StartupType::Manual,
        ),
        service_tweak(
            ctx,
            "disable-error-reporting",
            "Disable Windows Error Reporting",
            "Stops crash reports from being collected and sent to Microsoft.",
            RiskLevel::Safe,
            &["WerSvc"],
            StartupType::Manual,
        ),
        service_tweak(
            ctx,
            "disable-windows-insider",
            "Disable Windows Insider Service",
            "Stops the Insider Program service. Preview builds are no longer offered.",
            RiskLevel::Safe,
            &["wisvc"],
            StartupType::Manual,
        ),
        service_tweak(
            ctx,
            "disable-touch-keyboard",
            "Disable Touch Keyboard Service",
            "Stops the touch keyboard and handwriting panel service. Not needed without a touch screen.",
            RiskLevel::Safe,
            &["TabletInputService"],
            StartupType::Manual,
        ),
    ]
}
