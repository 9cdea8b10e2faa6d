//! Redis

use serde_json::json;

use super::{FactoryContext, require};
use crate::component::{Component, ComponentVariant};
use crate::emission::{Emission, Emitter};
use crate::error::Result;
use crate::fragments::{FleetConfig, HelmRelease, SkaffoldConfig};
use crate::values::Values;

pub const TYPE_SUFFIX: &str = "redis";

#[derive(Debug, Clone)]
pub struct RedisParams {
    pub slug: String,
    pub namespace: String,
    pub password: String,
    pub storage_size: String,
    pub replicas: u32,
    pub extra_values: Values,
}

/// In-cluster URI of the master service
pub fn connection_uri(slug: &str, namespace: &str, password: &str) -> String {
    format!(
        "redis://:{}@{}-redis-master.{}.svc.cluster.local:6379/0",
        password, slug, namespace
    )
}

pub fn create(
    ctx: &FactoryContext,
    params: &RedisParams,
    depends_on: &[&Component],
) -> Result<Emission> {
    let slug = params.slug.as_str();
    let namespace = require(slug, "namespace", &params.namespace)?;
    let password = require(slug, "password", &params.password)?;
    let component = Component::new(slug, namespace, TYPE_SUFFIX, ComponentVariant::Standard);

    let mut values = Values::from(json!({
        "nameOverride": component.dir_name,
        "auth": { "password": password },
        "master": {
            "disableCommands": [],
            "persistence": { "size": params.storage_size },
        },
        "replica": {
            "replicaCount": params.replicas,
            "revisionHistoryLimit": 0,
        },
    }));
    values.merge(&params.extra_values);

    let mut emitter = Emitter::new(component.clone());
    emitter.values("values.yaml", &values)?;
    emitter.skaffold(
        "skaffold-redis.yaml",
        &SkaffoldConfig::new()
            .with_release(HelmRelease::new(
                &component.dir_name,
                &ctx.chart("redis"),
                "values.yaml",
                namespace,
            ))
            .with_default_namespace(namespace),
    )?;
    emitter.fleet(
        &FleetConfig::new(&component.dir_name, depends_on).with_release_name(&component.dir_name),
    )?;

    Ok(emitter.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing;

    fn params(password: &str) -> RedisParams {
        RedisParams {
            slug: "waha".into(),
            namespace: "whatsapp".into(),
            password: password.into(),
            storage_size: "5Gi".into(),
            replicas: 1,
            extra_values: Values::new(),
        }
    }

    #[test]
    fn test_redis_values() {
        let ns = testing::namespace("whatsapp");
        let emission = create(&testing::context(), &params("pw"), &[&ns]).unwrap();
        assert_eq!(emission.component.dir_name, "waha-redis");

        let values = testing::yaml(&emission, "values.yaml");
        assert_eq!(values["auth"]["password"].as_str(), Some("pw"));
        assert_eq!(values["master"]["persistence"]["size"].as_str(), Some("5Gi"));
    }

    #[test]
    fn test_password_is_required() {
        assert!(create(&testing::context(), &params(""), &[]).is_err());
    }

    #[test]
    fn test_connection_uri() {
        assert_eq!(
            connection_uri("waha", "whatsapp", "pw"),
            "redis://:pw@waha-redis-master.whatsapp.svc.cluster.local:6379/0"
        );
    }
}
