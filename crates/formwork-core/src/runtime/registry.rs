// formwork-core/src/runtime/registry.rs
// ============================================================================
// Module: Formwork Model Registry
// Description: Ordered registry of loaded model specifications.
// Purpose: Resolve models by name and validate cross-model references.
// Dependencies: crate::core, thiserror
// ============================================================================

//! ## Overview
//! The registry keeps models in registration order, which is also the table
//! install order. Registering the same model twice is harmless when the
//! definitions match; conflicting definitions are rejected.
//! [`ModelRegistry::validate`] checks that lookups and relations point at
//! registered models and that relation foreign keys exist.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use thiserror::Error;

use crate::core::DataType;
use crate::core::ModelName;
use crate::core::ModelSpec;
use crate::core::RelationKind;
use crate::interfaces::TableSchema;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Model registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Model is not registered.
    #[error("Can't find model {0}")]
    ModelNotFound(String),
    /// A different model with the same name exists.
    #[error("duplicate model definition: {0}")]
    DuplicateModel(String),
    /// A cross-model reference is broken.
    #[error("invalid model reference in {model}: {message}")]
    InvalidReference {
        /// Model holding the reference.
        model: String,
        /// Reason.
        message: String,
    },
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Registry of model specifications.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    /// Models in registration order.
    models: Vec<ModelSpec>,
    /// Index by model name.
    index: BTreeMap<ModelName, usize>,
}

impl ModelRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a model.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateModel`] when a different model with
    /// the same name is already registered.
    pub fn register(&mut self, spec: ModelSpec) -> Result<(), RegistryError> {
        if let Some(existing) = self.index.get(&spec.name).and_then(|idx| self.models.get(*idx)) {
            if *existing == spec {
                return Ok(());
            }
            return Err(RegistryError::DuplicateModel(spec.name.to_string()));
        }
        self.index.insert(spec.name.clone(), self.models.len());
        self.models.push(spec);
        Ok(())
    }

    /// Returns a model by name.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ModelNotFound`] when the model is unknown.
    pub fn get(&self, name: &str) -> Result<&ModelSpec, RegistryError> {
        self.find(&ModelName::new(name)).ok_or_else(|| RegistryError::ModelNotFound(name.to_string()))
    }

    /// Returns a model by typed name.
    #[must_use]
    pub fn find(&self, name: &ModelName) -> Option<&ModelSpec> {
        self.index.get(name).and_then(|idx| self.models.get(*idx))
    }

    /// Returns true when a model is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&ModelName::new(name))
    }

    /// Iterates models in registration order.
    pub fn models(&self) -> impl Iterator<Item = &ModelSpec> {
        self.models.iter()
    }

    /// Returns the number of registered models.
    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Returns true when no models are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Validates references between models.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidReference`] for the first broken
    /// lookup target, relation target, or foreign key.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for model in &self.models {
            let invalid = |message: String| RegistryError::InvalidReference {
                model: model.name.to_string(),
                message,
            };
            for column in &model.columns {
                if let Some(target) = &column.lookup_model
                    && self.find(target).is_none()
                {
                    return Err(invalid(format!(
                        "column {} looks up unknown model {target}",
                        column.name
                    )));
                }
            }
            for relation in &model.relations {
                let Some(related) = self.find(&relation.model) else {
                    return Err(invalid(format!(
                        "relation {} targets unknown model {}",
                        relation.name, relation.model
                    )));
                };
                let holder = match relation.kind {
                    RelationKind::HasMany | RelationKind::HasOne => related,
                    RelationKind::BelongsTo => model,
                };
                if holder.column(relation.foreign_key.as_str()).is_none() {
                    return Err(invalid(format!(
                        "relation {} foreign key {} missing on {}",
                        relation.name, relation.foreign_key, holder.name
                    )));
                }
            }
        }
        Ok(())
    }

    /// Builds the install schema for a model.
    #[must_use]
    pub fn table_schema<'a>(&self, model: &'a ModelSpec) -> TableSchema<'a> {
        let lookup_tables = model
            .columns
            .iter()
            .filter(|column| column.data_type == DataType::Lookup)
            .filter_map(|column| {
                let target = column.lookup_model.as_ref().and_then(|name| self.find(name))?;
                Some((column.name.to_string(), target.table.clone()))
            })
            .collect();
        TableSchema {
            model,
            lookup_tables,
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
