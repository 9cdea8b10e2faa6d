//! PostgreSQL cluster managed by CloudNativePG

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value as JsonValue, json};

use super::{FactoryContext, require};
use crate::component::{Component, ComponentVariant};
use crate::emission::{Emission, Emitter};
use crate::error::Result;
use crate::fragments::{ComparePatch, FleetConfig, HelmRelease, PatchOperation, SkaffoldConfig};
use crate::values::Values;

pub const TYPE_SUFFIX: &str = "cnpg-cluster";

const DEFAULT_IMAGE: &str = "ghcr.io/cloudnative-pg/postgresql:16";

#[derive(Debug, Clone)]
pub struct PostgresParams {
    pub slug: String,
    pub namespace: String,
    pub database: String,
    pub superuser: String,
    pub superuser_password: String,
    pub username: String,
    pub user_password: String,
    pub instances: u32,
    pub storage_size: String,
    pub service_type: String,
    /// Overrides merged over the tuned defaults
    pub parameters: BTreeMap<String, String>,
    pub extra_values: Values,
}

impl PostgresParams {
    pub fn new(slug: impl Into<String>, namespace: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            namespace: namespace.into(),
            database: database.into(),
            superuser: "postgres".into(),
            superuser_password: String::new(),
            username: "app".into(),
            user_password: String::new(),
            instances: 1,
            storage_size: "10Gi".into(),
            service_type: "ClusterIP".into(),
            parameters: BTreeMap::new(),
            extra_values: Values::new(),
        }
    }
}

/// Name of the CNPG `Cluster` resource
pub fn cluster_name(slug: &str) -> String {
    format!("{}-pg", slug)
}

/// In-cluster read-write service host
pub fn rw_service_host(slug: &str, namespace: &str) -> String {
    format!("{}-rw.{}.svc.cluster.local", cluster_name(slug), namespace)
}

fn default_parameters() -> BTreeMap<String, String> {
    [
        ("max_connections", "200"),
        ("shared_buffers", "128MB"),
        ("effective_cache_size", "512MB"),
        ("maintenance_work_mem", "64MB"),
        ("checkpoint_completion_target", "0.9"),
        ("wal_buffers", "16MB"),
        ("default_statistics_target", "100"),
        ("random_page_cost", "1.1"),
        ("effective_io_concurrency", "200"),
        ("work_mem", "4MB"),
        ("min_wal_size", "1GB"),
        ("max_wal_size", "4GB"),
        ("log_checkpoints", "on"),
        ("log_connections", "on"),
        ("log_disconnections", "on"),
        ("log_lock_waits", "on"),
        ("log_min_duration_statement", "1000"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn basic_auth_secret(name: &str, namespace: &str, username: &str, password: &str) -> JsonValue {
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": { "name": name, "namespace": namespace },
        "type": "kubernetes.io/basic-auth",
        "data": {
            "username": STANDARD.encode(username),
            "password": STANDARD.encode(password),
        },
    })
}

pub fn create(
    ctx: &FactoryContext,
    params: &PostgresParams,
    depends_on: &[&Component],
) -> Result<Emission> {
    let slug = params.slug.as_str();
    let namespace = require(slug, "namespace", &params.namespace)?;
    let database = require(slug, "database", &params.database)?;
    let superuser = require(slug, "superuser", &params.superuser)?;
    let superuser_password = require(slug, "superuser_password", &params.superuser_password)?;
    let username = require(slug, "username", &params.username)?;
    let separate_user = username != superuser;
    if separate_user {
        require(slug, "user_password", &params.user_password)?;
    }

    let component = Component::new(slug, namespace, TYPE_SUFFIX, ComponentVariant::Standard);
    let cluster = cluster_name(slug);
    let superuser_secret = format!("{}-superuser-secret", cluster);
    let user_secret = format!("{}-user-secret", cluster);

    let mut parameters = default_parameters();
    parameters.extend(params.parameters.clone());

    let external_service = |selector: &str| {
        json!({
            "selectorType": selector,
            "serviceTemplate": {
                "metadata": { "name": format!("{}-{}-external", cluster, selector) },
                "spec": { "type": params.service_type },
            },
        })
    };

    let grants: Vec<String> = vec![
        format!("GRANT CONNECT ON DATABASE {} TO {};", database, username),
        format!("GRANT USAGE ON SCHEMA public TO {};", username),
        format!("GRANT CREATE ON SCHEMA public TO {};", username),
        format!(
            "ALTER DEFAULT PRIVILEGES IN SCHEMA public GRANT SELECT, INSERT, UPDATE, DELETE ON TABLES TO {};",
            username
        ),
        format!(
            "ALTER DEFAULT PRIVILEGES IN SCHEMA public GRANT USAGE, SELECT ON SEQUENCES TO {};",
            username
        ),
    ];

    let mut values = Values::from(json!({
        "fullnameOverride": cluster,
        "mode": "standalone",
        "cluster": {
            "instances": params.instances,
            "imageName": DEFAULT_IMAGE,
            "postgresql": { "parameters": parameters },
            "storage": { "size": params.storage_size },
            "monitoring": { "enabled": true, "podMonitor": { "enabled": true } },
            "services": { "additional": [external_service("rw"), external_service("ro")] },
            "initdb": {
                "database": database,
                "owner": superuser,
                "secret": { "name": superuser_secret },
                "postInitApplicationSQL": grants,
            },
            "superuserSecret": superuser_secret,
        },
        "backups": { "enabled": false },
    }));
    if separate_user {
        values.set(
            "cluster.roles",
            json!([{
                "name": username,
                "ensure": "present",
                "login": true,
                "passwordSecret": { "name": user_secret },
            }]),
        );
    }
    values.merge(&params.extra_values);

    let mut emitter = Emitter::new(component.clone());
    emitter.values("cnpg-cluster-values.yaml", &values)?;

    let mut skaffold = SkaffoldConfig::new().with_release(HelmRelease::new(
        &component.dir_name,
        &ctx.chart("cluster"),
        "cnpg-cluster-values.yaml",
        namespace,
    ));
    let path = emitter.manifest(
        "superuser-secret.yaml",
        &basic_auth_secret(&superuser_secret, namespace, superuser, superuser_password),
    )?;
    skaffold = skaffold.with_raw_manifest(path);
    if separate_user {
        let path = emitter.manifest(
            "user-secret.yaml",
            &basic_auth_secret(&user_secret, namespace, username, &params.user_password),
        )?;
        skaffold = skaffold.with_raw_manifest(path);
    }
    emitter.skaffold("skaffold-cnpg-cluster.yaml", &skaffold.with_default_namespace(namespace))?;

    // Sealing re-encrypts the password on every run
    emitter.fleet(
        &FleetConfig::new(&component.dir_name, depends_on)
            .with_compare_patch(ComparePatch::remove_path(
                "postgresql.cnpg.io/v1",
                "Cluster",
                &cluster,
                "/status",
            ))
            .with_compare_patch(ComparePatch {
                api_version: "bitnami.com/v1alpha1".to_string(),
                kind: "SealedSecret".to_string(),
                namespace: Some(namespace.to_string()),
                operations: vec![PatchOperation {
                    op: "remove".to_string(),
                    path: "/spec/encryptedData/password".to_string(),
                }],
                ..ComparePatch::default()
            }),
    )?;

    Ok(emitter.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing;

    fn params() -> PostgresParams {
        let mut p = PostgresParams::new("waha", "whatsapp", "waha");
        p.superuser_password = "root-pw".into();
        p.user_password = "app-pw".into();
        p.parameters.insert("max_connections".into(), "50".into());
        p
    }

    #[test]
    fn test_cluster_values() {
        let emission = create(&testing::context(), &params(), &[]).unwrap();
        assert_eq!(emission.component.dir_name, "waha-cnpg-cluster");

        let values = testing::yaml(&emission, "cnpg-cluster-values.yaml");
        assert_eq!(values["fullnameOverride"].as_str(), Some("waha-pg"));
        assert_eq!(
            values["cluster"]["postgresql"]["parameters"]["max_connections"].as_str(),
            Some("50")
        );
        assert_eq!(
            values["cluster"]["postgresql"]["parameters"]["work_mem"].as_str(),
            Some("4MB")
        );
        assert_eq!(values["cluster"]["roles"][0]["name"].as_str(), Some("app"));
        assert!(emission.file("manifests/user-secret.yaml").is_some());
    }

    #[test]
    fn test_superuser_only() {
        let mut p = params();
        p.username = "postgres".into();
        p.user_password.clear();
        let emission = create(&testing::context(), &p, &[]).unwrap();
        assert!(emission.file("manifests/user-secret.yaml").is_none());
    }

    #[test]
    fn test_passwords_are_required() {
        let mut p = params();
        p.superuser_password.clear();
        assert!(create(&testing::context(), &p, &[]).is_err());

        let mut p = params();
        p.user_password.clear();
        let err = create(&testing::context(), &p, &[]).unwrap_err();
        assert!(err.to_string().contains("user_password"));
    }

    #[test]
    fn test_rw_service_host() {
        assert_eq!(
            rw_service_host("waha", "whatsapp"),
            "waha-pg-rw.whatsapp.svc.cluster.local"
        );
    }
}
