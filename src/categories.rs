// src/categories.rs

use indexmap::IndexMap;
use strum_macros::{Display, EnumIter};

use crate::tweaks::{definitions, network, registry, services, SystemContext, Tweak};

/// Accent colour used when presenting a category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum Accent {
    Blue,
    Green,
    Magenta,
    Red,
    Yellow,
    Cyan,
}

/// A named, ordered group of tweaks.
#[derive(Debug)]
pub struct TweakCategory {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub accent: Accent,
    tweaks: Vec<Tweak>,
}

impl TweakCategory {
    pub fn new(
        id: &'static str,
        name: &'static str,
        description: &'static str,
        accent: Accent,
    ) -> Self {
        Self {
            id,
            name,
            description,
            accent,
            tweaks: Vec::new(),
        }
    }

    pub fn register(&mut self, tweak: Tweak) {
        if self.find(tweak.id).is_some() {
            tracing::warn!(
                "{} -> Duplicate tweak id in category '{}', ignoring.",
                tweak.id,
                self.id
            );
            return;
        }
        self.tweaks.push(tweak);
    }

    pub fn with_tweaks(mut self, tweaks: impl IntoIterator<Item = Tweak>) -> Self {
        for tweak in tweaks {
            self.register(tweak);
        }
        self
    }

    /// Tweaks in registration order.
    pub fn tweaks(&self) -> &[Tweak] {
        &self.tweaks
    }

    /// Looks a tweak up by id, ignoring case.
    pub fn find(&self, tweak_id: &str) -> Option<&Tweak> {
        self.tweaks
            .iter()
            .find(|tweak| tweak.id.eq_ignore_ascii_case(tweak_id))
    }
}

/// Every category, in the order they were registered.
#[derive(Debug, Default)]
pub struct CategoryRegistry {
    categories: IndexMap<String, TweakCategory>,
}

impl CategoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a category. The first registration of an id wins.
    pub fn register(&mut self, category: TweakCategory) {
        let key = category.id.to_lowercase();
        if self.categories.contains_key(&key) {
            tracing::warn!("Category '{}' is already registered, ignoring.", category.id);
            return;
        }
        self.categories.insert(key, category);
    }

    pub fn categories(&self) -> impl Iterator<Item = &TweakCategory> {
        self.categories.values()
    }

    pub fn get_by_id(&self, id: &str) -> Option<&TweakCategory> {
        self.categories.get(&id.to_lowercase())
    }

    pub fn find_tweak(&self, category_id: &str, tweak_id: &str) -> Option<&Tweak> {
        self.get_by_id(category_id)?.find(tweak_id)
    }

    pub fn tweak_count(&self) -> usize {
        self.categories.values().map(|c| c.tweaks.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

/// Builds the full tweak catalogue.
pub fn default_registry(ctx: &SystemContext) -> CategoryRegistry {
    let mut categories = CategoryRegistry::new();

    categories.register(
        TweakCategory::new(
            "privacy",
            "Privacy",
            "Telemetry, tracking, and data collection settings",
            Accent::Magenta,
        )
        .with_tweaks([
            registry::disable_telemetry(ctx),
            registry::disable_advertising_id(ctx),
            registry::disable_location(ctx),
        ]),
    );

    categories.register(
        TweakCategory::new(
            "performance",
            "Performance",
            "System performance and optimization tweaks",
            Accent::Green,
        )
        .with_tweaks([
            definitions::ultimate_performance_plan(ctx),
            definitions::disable_hibernation(ctx),
            registry::win32_priority_separation(ctx),
            registry::disable_game_dvr(ctx),
        ]),
    );

    categories.register(
        TweakCategory::new(
            "ui",
            "User Interface",
            "Visual and UI customization options",
            Accent::Cyan,
        )
        .with_tweaks([
            registry::menu_show_delay(ctx),
            registry::disable_transparency(ctx),
            registry::disable_aero_shake(ctx),
            registry::auto_end_tasks(ctx),
        ]),
    );

    categories.register(
        TweakCategory::new(
            "network",
            "Network",
            "Network and connectivity optimizations",
            Accent::Blue,
        )
        .with_tweaks(
            std::iter::once(registry::network_throttling(ctx)).chain(network::all(ctx)),
        ),
    );

    categories.register(
        TweakCategory::new(
            "services",
            "Services",
            "Manage Windows background services",
            Accent::Yellow,
        )
        .with_tweaks(services::all(ctx)),
    );

    categories.register(
        TweakCategory::new(
            "security",
            "Security",
            "Security hardening and configuration",
            Accent::Red,
        )
        .with_tweaks([
            registry::disable_autorun(ctx),
            registry::disable_remote_assistance(ctx),
        ]),
    );

    categories
}
