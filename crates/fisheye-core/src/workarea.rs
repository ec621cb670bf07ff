//! Physical workarea dimensions and the model registry that supplies them.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{CoreError, Real};

/// Physical dimensions of a machine's workarea, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Workarea {
    pub width: Real,
    pub height: Real,
    /// Distance from the camera reference plane to the lowest reachable surface.
    pub depth: Real,
    /// Camera position over the workarea, when the model defines one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_center: Option<[Real; 2]>,
}

impl Workarea {
    pub fn new(width: Real, height: Real, depth: Real) -> Self {
        Self {
            width,
            height,
            depth,
            camera_center: None,
        }
    }

    pub fn extent(&self) -> [Real; 2] {
        [self.width, self.height]
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let ok = [self.width, self.height, self.depth]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0);
        if ok {
            Ok(())
        } else {
            Err(CoreError::InvalidWorkarea {
                width: self.width,
                height: self.height,
                depth: self.depth,
            })
        }
    }
}

/// Looks up workarea dimensions for a machine model.
pub trait WorkareaRegistry {
    /// Workarea of `model`, optionally for a hardware `variant` (e.g. an add-on module).
    fn workarea(&self, model: &str, variant: Option<&str>) -> Option<Workarea>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ModelEntry {
    #[serde(flatten)]
    base: Workarea,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    variants: BTreeMap<String, Workarea>,
}

/// JSON-backed registry: `{ "<model>": { width, height, depth, variants: { ... } } }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkareaTable {
    models: BTreeMap<String, ModelEntry>,
}

impl WorkareaTable {
    pub fn from_json(json: &str) -> Result<Self> {
        let table: Self = serde_json::from_str(json).context("failed to parse workarea table")?;
        for (model, entry) in &table.models {
            entry
                .base
                .validate()
                .with_context(|| format!("workarea of model {model}"))?;
            for (variant, wa) in &entry.variants {
                wa.validate()
                    .with_context(|| format!("workarea of model {model} variant {variant}"))?;
            }
        }
        Ok(table)
    }

    pub fn insert(&mut self, model: impl Into<String>, workarea: Workarea) {
        self.models.insert(
            model.into(),
            ModelEntry {
                base: workarea,
                variants: BTreeMap::new(),
            },
        );
    }

    /// Register a variant; ignored when `model` is unknown.
    pub fn insert_variant(&mut self, model: &str, variant: impl Into<String>, workarea: Workarea) {
        if let Some(entry) = self.models.get_mut(model) {
            entry.variants.insert(variant.into(), workarea);
        }
    }
}

impl WorkareaRegistry for WorkareaTable {
    fn workarea(&self, model: &str, variant: Option<&str>) -> Option<Workarea> {
        let entry = self.models.get(model)?;
        match variant {
            Some(v) => match entry.variants.get(v) {
                Some(wa) => Some(*wa),
                None => {
                    debug!("model {model} has no variant {v}, using base workarea");
                    Some(entry.base)
                }
            },
            None => Some(entry.base),
        }
    }
}
