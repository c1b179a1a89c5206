// formwork-core/src/runtime/dashboard.rs
// ============================================================================
// Module: Formwork Dashboard
// Description: Per-user dashboard layouts stored in runtime settings.
// Purpose: Load, default, and save dashboard grids of model cards.
// Dependencies: crate::core, crate::runtime::{registry, settings}, serde
// ============================================================================

//! ## Overview
//! A dashboard is a CSS-grid template (`["A B", "C C", "D E"]`) and the cards
//! placed in each named area. Layouts are stored per user and preset under
//! the settings key `dashboard-{user}-{preset}`. Without a stored layout every
//! model that declares a card lands in area `A`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::SettingsTree;
use crate::interfaces::StoreError;
use crate::runtime::registry::ModelRegistry;
use crate::runtime::settings::SettingsService;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default grid template rows.
pub const DEFAULT_GRID: &[&str] = &["A B", "C C", "D E"];
/// Default grid area names.
pub const DEFAULT_AREAS: &[&str] = &["A", "B", "C", "D", "E"];

// ============================================================================
// SECTION: Types
// ============================================================================

/// Card shown on a dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardCard {
    /// Model providing the card.
    pub model: String,
    /// Card title.
    pub title: String,
    /// Card description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Dashboard layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Grid template rows.
    #[serde(default)]
    pub grid: Vec<String>,
    /// Cards per area.
    #[serde(default)]
    pub areas: BTreeMap<String, Vec<DashboardCard>>,
}

// ============================================================================
// SECTION: Operations
// ============================================================================

/// Returns the settings key of a dashboard.
#[must_use]
pub fn settings_key(user: &str, preset: u32) -> String {
    format!("dashboard-{user}-{preset}")
}

/// Lists cards offered by registered models.
#[must_use]
pub fn available_cards(registry: &ModelRegistry) -> Vec<DashboardCard> {
    registry
        .models()
        .filter_map(|model| {
            model.card.as_ref().map(|card| DashboardCard {
                model: model.name.to_string(),
                title: card.title.clone(),
                description: card.description.clone(),
            })
        })
        .collect()
}

/// Builds the default layout.
#[must_use]
pub fn default_config(registry: &ModelRegistry) -> DashboardConfig {
    let mut areas: BTreeMap<String, Vec<DashboardCard>> =
        DEFAULT_AREAS.iter().map(|area| ((*area).to_string(), Vec::new())).collect();
    areas.insert("A".to_string(), available_cards(registry));
    DashboardConfig {
        grid: DEFAULT_GRID.iter().map(|row| (*row).to_string()).collect(),
        areas,
    }
}

/// Loads a user's layout, falling back to the default.
#[must_use]
pub fn load(
    settings: &SettingsTree,
    registry: &ModelRegistry,
    user: &str,
    preset: u32,
) -> DashboardConfig {
    settings
        .get(&settings_key(user, preset))
        .and_then(|value| serde_json::from_value::<DashboardConfig>(value.clone()).ok())
        .filter(|config| !config.grid.is_empty())
        .unwrap_or_else(|| default_config(registry))
}

/// Stores a user's layout.
///
/// # Errors
///
/// Returns [`StoreError`] when the layout cannot be persisted.
pub fn save(
    settings: &SettingsService<'_>,
    user: &str,
    preset: u32,
    config: &DashboardConfig,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(config).map_err(|err| StoreError::Invalid(err.to_string()))?;
    settings.save(&settings_key(user, preset), &value, Some(user))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
