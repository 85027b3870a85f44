//! # Named Model Prefabs
//!
//! * [`prefab_map`] - static, named config builders.
//! * [`classifier`] - [`classifier::ClassifierConfig`] over the transformer
//!   families, and [`classifier::PREFAB_CLASSIFIER_MAP`].
pub mod classifier;
pub mod prefab_map;
