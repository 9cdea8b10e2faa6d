//! Stackwright Core - component model and Skaffold/Fleet generation
//!
//! This crate turns a per-environment configuration document into a tree of
//! generated deployment fragments:
//! - `Component`: the immutable record of one deployable unit
//! - `components`: typed factories producing an `Emission` per unit
//! - `environments`: named compositions wiring factories in dependency order
//! - `Generation`: the validated, in-memory result of a composition
//! - `aggregate` / `sync`: umbrella Skaffold configs and output promotion

pub mod aggregate;
pub mod component;
pub mod components;
pub mod config;
pub mod emission;
pub mod environments;
pub mod error;
pub mod fragments;
pub mod generate;
pub mod generation;
pub mod settings;
pub mod sync;
pub mod values;

pub use aggregate::{AggregateSummary, FLEET_GRAPH_FILE, MAIN_SKAFFOLD_FILE, aggregate};
pub use component::{Component, ComponentVariant};
pub use components::FactoryContext;
pub use config::{ComponentConfig, ConfigDocument};
pub use emission::{Emission, EmittedFile, Emitter};
pub use environments::EnvironmentName;
pub use error::{GenerateError, Result};
pub use fragments::{
    COMPONENT_SKAFFOLD_FILE, FLEET_FILE, FleetConfig, HelmRelease, SkaffoldConfig,
};
pub use generate::{GenerateReport, generate_skaffolds};
pub use generation::Generation;
pub use settings::{KubesealCert, Settings, SettingsOverrides};
pub use sync::{SyncSummary, sync_output};
pub use values::Values;
