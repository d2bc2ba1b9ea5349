//! Mode/Model Router - which backend model answers in which mode
//!
//! Handles:
//! - The static mode -> eligible models table
//! - Model selection that always stays inside the active mode
//! - Model -> endpoint resolution for the backend client

use std::collections::HashMap;

use super::errors::RouterError;
use super::types::{Mode, ModelId};

/// Eligible models for one mode; `default` is always eligible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeProfile {
    pub default: ModelId,
    pub alternates: &'static [ModelId],
}

impl ModeProfile {
    /// Eligible models, default first
    pub fn eligible(&self) -> impl Iterator<Item = ModelId> + '_ {
        std::iter::once(self.default).chain(self.alternates.iter().copied())
    }

    pub fn contains(&self, model: ModelId) -> bool {
        self.eligible().any(|m| m == model)
    }
}

const MODE_TABLE: [(Mode, ModeProfile); 4] = [
    (
        Mode::Concepts,
        ModeProfile {
            default: ModelId::Llama,
            alternates: &[ModelId::Phi3],
        },
    ),
    (
        Mode::Configuration,
        ModeProfile {
            default: ModelId::Gemini,
            alternates: &[ModelId::Llama],
        },
    ),
    (
        Mode::Troubleshooting,
        ModeProfile {
            default: ModelId::Llama,
            alternates: &[ModelId::Phi3],
        },
    ),
    (
        Mode::Practice,
        ModeProfile {
            default: ModelId::Qwen2,
            alternates: &[ModelId::Phi3],
        },
    ),
];

/// Look up the eligibility profile of a mode
pub fn profile(mode: Mode) -> &'static ModeProfile {
    // MODE_TABLE covers every Mode variant; the test below enforces it.
    MODE_TABLE
        .iter()
        .find(|(m, _)| *m == mode)
        .map(|(_, p)| p)
        .unwrap_or(&MODE_TABLE[0].1)
}

/// Backend endpoint path for one model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub model: ModelId,
    pub path: String,
}

/// Tracks the active mode and model selection
#[derive(Debug, Clone)]
pub struct ModelRouter {
    mode: Mode,
    selected: ModelId,
    endpoints: HashMap<ModelId, String>,
}

impl ModelRouter {
    /// Create a router in `mode` with the backend's default endpoint paths
    pub fn new(mode: Mode) -> Self {
        let endpoints = ModelId::ALL
            .into_iter()
            .map(|m| (m, m.default_endpoint().to_string()))
            .collect();
        Self::with_endpoints(mode, endpoints)
    }

    /// Create a router with an explicit endpoint table
    ///
    /// Models missing from the table fail to resolve with `UnknownModel`.
    pub fn with_endpoints(mode: Mode, endpoints: HashMap<ModelId, String>) -> Self {
        Self {
            mode,
            selected: profile(mode).default,
            endpoints,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn selected(&self) -> ModelId {
        self.selected
    }

    /// Eligible models of the active mode, default first
    pub fn eligible_models(&self) -> Vec<ModelId> {
        profile(self.mode).eligible().collect()
    }

    pub fn is_eligible(&self, model: ModelId) -> bool {
        profile(self.mode).contains(model)
    }

    /// Switch mode and reset the selection to the new mode's default
    pub fn set_mode(&mut self, mode: Mode) -> ModelId {
        self.mode = mode;
        self.selected = profile(mode).default;
        tracing::debug!("Mode set to {}, model reset to {}", mode, self.selected);
        self.selected
    }

    /// Select a model; rejected if it is not eligible in the active mode
    pub fn set_model(&mut self, model: ModelId) -> Result<(), RouterError> {
        if !self.is_eligible(model) {
            return Err(RouterError::InvalidModelSelection {
                model,
                mode: self.mode,
            });
        }
        self.selected = model;
        Ok(())
    }

    /// Map a model to its endpoint
    pub fn resolve_endpoint(&self, model: ModelId) -> Result<Endpoint, RouterError> {
        self.endpoints
            .get(&model)
            .map(|path| Endpoint {
                model,
                path: path.clone(),
            })
            .ok_or_else(|| RouterError::UnknownModel(model.to_string()))
    }

    /// Endpoint of the current selection
    pub fn current_endpoint(&self) -> Result<Endpoint, RouterError> {
        self.resolve_endpoint(self.selected)
    }
}

impl Default for ModelRouter {
    fn default() -> Self {
        Self::new(Mode::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_covers_every_mode() {
        for mode in Mode::ALL {
            assert!(
                MODE_TABLE.iter().any(|(m, _)| *m == mode),
                "{} missing from table",
                mode
            );
            assert!(profile(mode).contains(profile(mode).default));
        }
    }

    #[test]
    fn test_declared_defaults() {
        assert_eq!(profile(Mode::Concepts).default, ModelId::Llama);
        assert_eq!(profile(Mode::Configuration).default, ModelId::Gemini);
        assert_eq!(profile(Mode::Troubleshooting).default, ModelId::Llama);
        assert_eq!(profile(Mode::Practice).default, ModelId::Qwen2);
    }

    #[test]
    fn test_set_mode_discards_manual_selection() {
        let mut router = ModelRouter::new(Mode::Concepts);
        router.set_model(ModelId::Phi3).unwrap();
        assert_eq!(router.selected(), ModelId::Phi3);

        // Phi3 is also eligible in troubleshooting, but the override is still dropped
        let model = router.set_mode(Mode::Troubleshooting);
        assert_eq!(model, ModelId::Llama);
        assert_eq!(router.selected(), ModelId::Llama);
    }

    #[test]
    fn test_set_model_outside_mode_is_rejected() {
        let mut router = ModelRouter::new(Mode::Practice);
        let err = router.set_model(ModelId::Gemini).unwrap_err();
        assert_eq!(
            err,
            RouterError::InvalidModelSelection {
                model: ModelId::Gemini,
                mode: Mode::Practice,
            }
        );
        assert_eq!(router.selected(), ModelId::Qwen2);
    }

    #[test]
    fn test_resolve_endpoint_defaults() {
        let router = ModelRouter::default();
        assert_eq!(
            router.resolve_endpoint(ModelId::Qwen2).unwrap().path,
            "/chat-qwen2"
        );
        assert_eq!(router.current_endpoint().unwrap().path, "/chat-llama");
    }

    #[test]
    fn test_resolve_endpoint_missing_from_table() {
        let mut endpoints = HashMap::new();
        endpoints.insert(ModelId::Llama, "/v2/llama".to_string());
        let router = ModelRouter::with_endpoints(Mode::Concepts, endpoints);

        assert_eq!(router.current_endpoint().unwrap().path, "/v2/llama");
        assert_eq!(
            router.resolve_endpoint(ModelId::Phi3),
            Err(RouterError::UnknownModel("phi3".to_string()))
        );
    }
}
