//! Validated, ordered set of emissions for one environment

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::component::Component;
use crate::emission::Emission;
use crate::error::{GenerateError, Result};

/// Everything one composition run produced, in composition order
///
/// Registration enforces the invariants the aggregator relies on:
/// directory names and fleet names are unique, and every `dependsOn`
/// entry names a component registered earlier.
#[derive(Debug, Default)]
pub struct Generation {
    environment: String,
    emissions: Vec<Emission>,
    by_dir: HashMap<String, usize>,
    by_fleet: HashMap<String, usize>,
}

impl Generation {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            ..Self::default()
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Register an emission and hand back its component
    pub fn add(&mut self, emission: Emission) -> Result<Component> {
        let component = &emission.component;

        if let Some(&index) = self.by_dir.get(&component.dir_name) {
            return Err(GenerateError::DuplicateDirectory {
                dir_name: component.dir_name.clone(),
                first: self.emissions[index].component.slug.clone(),
                second: component.slug.clone(),
            });
        }

        if let Some(&index) = self.by_fleet.get(&component.fleet_name) {
            return Err(GenerateError::DuplicateFleetName {
                fleet_name: component.fleet_name.clone(),
                first: self.emissions[index].component.dir_name.clone(),
                second: component.dir_name.clone(),
            });
        }

        if let Some(unknown) = emission
            .depends_on
            .iter()
            .find(|name| !self.by_fleet.contains_key(*name))
        {
            return Err(GenerateError::UnknownDependency {
                dir_name: component.dir_name.clone(),
                dependency: unknown.clone(),
            });
        }

        let index = self.emissions.len();
        self.by_dir.insert(component.dir_name.clone(), index);
        self.by_fleet.insert(component.fleet_name.clone(), index);

        debug!(
            dir = %component.dir_name,
            variant = component.variant.label(),
            depends_on = ?emission.depends_on,
            "registered component"
        );

        let component = component.clone();
        self.emissions.push(emission);
        Ok(component)
    }

    /// Run one composition step, attributing any failure to `slug`
    pub fn compose<F>(&mut self, slug: &str, step: F) -> Result<Component>
    where
        F: FnOnce(&mut Self) -> Result<Component>,
    {
        step(self).map_err(|e| e.in_component(slug))
    }

    pub fn emissions(&self) -> &[Emission] {
        &self.emissions
    }

    /// Components in composition order
    pub fn components(&self) -> Vec<Component> {
        self.emissions.iter().map(|e| e.component.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.emissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emissions.is_empty()
    }

    /// Write every emission below `root`
    pub fn write_to(&self, root: &Path) -> Result<()> {
        std::fs::create_dir_all(root)?;
        std::fs::write(root.join(".gitkeep"), "")?;

        for emission in &self.emissions {
            emission.write_to(root)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentVariant;
    use crate::emission::Emitter;
    use crate::fragments::FleetConfig;

    fn emission(slug: &str, suffix: &str, deps: &[&Component]) -> Emission {
        let component = Component::new(slug, slug, suffix, ComponentVariant::Standard);
        let mut emitter = Emitter::new(component);
        emitter.fleet(&FleetConfig::new(slug, deps)).unwrap();
        emitter.finish()
    }

    #[test]
    fn test_duplicate_directory_is_rejected() {
        let mut generation = Generation::new("test");
        generation.add(emission("web", "redis", &[])).unwrap();
        let err = generation.add(emission("web", "redis", &[])).unwrap_err();
        assert!(matches!(err, GenerateError::DuplicateDirectory { ref dir_name, .. } if dir_name == "web-redis"));
    }

    #[test]
    fn test_duplicate_fleet_name_is_rejected() {
        let mut generation = Generation::new("test");
        generation.add(emission("a", "x", &[])).unwrap();

        let clash = Component::new("b", "b", "y", ComponentVariant::Standard).with_fleet_name("a-x");
        let err = generation.add(Emitter::new(clash).finish()).unwrap_err();
        assert!(matches!(err, GenerateError::DuplicateFleetName { .. }));
    }

    #[test]
    fn test_unregistered_dependency_is_rejected() {
        let mut generation = Generation::new("test");
        let ghost = Component::new("ghost", "ghost", "namespace", ComponentVariant::Namespace);
        let err = generation.add(emission("app", "app", &[&ghost])).unwrap_err();
        assert!(matches!(err, GenerateError::UnknownDependency { ref dependency, .. } if dependency == "ghost-namespace"));
    }

    #[test]
    fn test_compose_wraps_errors_with_slug() {
        let mut generation = Generation::new("test");
        let err = generation
            .compose("broken", |_| {
                Err(GenerateError::missing_parameter("broken", "password"))
            })
            .unwrap_err();
        assert!(err.to_string().contains("broken"));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_components_keep_order() {
        let mut generation = Generation::new("test");
        let a = generation.add(emission("a", "namespace", &[])).unwrap();
        generation.add(emission("b", "app", &[&a])).unwrap();
        let dirs: Vec<_> = generation.components().into_iter().map(|c| c.dir_name).collect();
        assert_eq!(dirs, vec!["a-namespace", "b-app"]);
    }
}
