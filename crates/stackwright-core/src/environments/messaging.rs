//! WhatsApp HTTP API behind TLS, with its Redis and Postgres backends

use crate::components::FactoryContext;
use crate::components::cert_manager_operator::{self, OperatorParams};
use crate::components::cloudflare_tunnel::{self, TunnelParams};
use crate::components::cloudnative_pg_operator::{self, CnpgOperatorParams};
use crate::components::ingress_nginx::INGRESS_CLASS;
use crate::components::namespace::{self, NamespaceParams};
use crate::components::postgres::{self, PostgresParams};
use crate::components::redis::{self, RedisParams};
use crate::components::registry::{self, RegistryParams};
use crate::components::whatsapp_waha::{self, WahaIngress, WahaParams};
use crate::config::ConfigDocument;
use crate::error::Result;
use crate::generation::Generation;

use super::tls_chain;

const APP_NAMESPACE: &str = "whatsapp";

pub(super) fn compose(
    generation: &mut Generation,
    doc: &ConfigDocument,
    ctx: &FactoryContext,
) -> Result<()> {
    // cert-manager
    let cert_manager_ns = generation.compose("cert-manager", |g| {
        g.add(namespace::create(&NamespaceParams::new("cert-manager", "cert-manager"), &[])?)
    })?;
    let cert_manager = generation.compose("cert-manager", |g| {
        let mut params = OperatorParams::new("cert-manager", "cert-manager");
        params.extra_values = doc.component("cert_manager").values_overrides()?;
        g.add(cert_manager_operator::create(ctx, &params, &[&cert_manager_ns])?)
    })?;

    // Namespace, issuer and certificate for the API host
    let waha_config = doc.component("whatsapp_waha");
    let host = waha_config
        .require_str("domain_name")
        .map_err(|e| e.in_component(APP_NAMESPACE))?;
    let tls = tls_chain(generation, doc, APP_NAMESPACE, APP_NAMESPACE, &host, &cert_manager)?;

    generation.compose("redis", |g| {
        let config = doc.component("redis");
        let params = RedisParams {
            slug: "redis".into(),
            namespace: APP_NAMESPACE.into(),
            password: config.require_str("password")?,
            storage_size: config.str_or("storage_size", "8Gi")?,
            replicas: config.u32_or("replicas", 0)?,
            extra_values: config.values_overrides()?,
        };
        g.add(redis::create(ctx, &params, &[&tls.namespace])?)
    })?;

    // CloudNativePG
    let cnpg_ns = generation.compose("cnpg", |g| {
        g.add(namespace::create(&NamespaceParams::new("cnpg", "cnpg-system"), &[])?)
    })?;
    let cnpg = generation.compose("cnpg", |g| {
        let params = CnpgOperatorParams {
            slug: "cnpg".into(),
            namespace: "cnpg-system".into(),
            extra_values: doc.component("cloudnative_pg_operator").values_overrides()?,
        };
        g.add(cloudnative_pg_operator::create(ctx, &params, &[&cnpg_ns])?)
    })?;

    generation.compose("waha", |g| {
        let config = doc.component("postgres");
        let mut params = PostgresParams::new("waha", APP_NAMESPACE, config.str_or("database", "waha")?);
        params.superuser_password = config.require_str("superuser_password")?;
        params.username = config.str_or("username", "app")?;
        params.user_password = config.optional_str("user_password")?.unwrap_or_default();
        params.instances = config.u32_or("instances", 1)?;
        params.storage_size = config.str_or("storage_size", "10Gi")?;
        params.parameters = config.string_map("parameters")?;
        params.extra_values = config.values_overrides()?;
        g.add(postgres::create(ctx, &params, &[&tls.namespace, &cnpg])?)
    })?;

    let waha = generation.compose(APP_NAMESPACE, |g| {
        let mut params = WahaParams::new(APP_NAMESPACE, APP_NAMESPACE);
        params.username = waha_config.require_str("username")?;
        params.password = waha_config.require_str("password")?;
        params.replicas = waha_config.u32_or("replicas", 1)?;
        params.image_tag = waha_config.str_or("image_tag", &params.image_tag)?;
        params.env = waha_config.string_map("env")?;
        params.ingress = Some(WahaIngress {
            host: host.clone(),
            class_name: INGRESS_CLASS.into(),
            tls_secret: tls.certificate.certificate_secret_name().map(String::from),
        });
        params.extra_values = waha_config.values_overrides()?;
        g.add(whatsapp_waha::create(
            ctx,
            &params,
            &[&tls.namespace, &tls.certificate, &tls.issuer],
        )?)
    })?;

    if doc.has_component("cloudflare_tunnel") {
        generation.compose("cloudflare", |g| {
            let config = doc.component("cloudflare_tunnel");
            let mut params = TunnelParams::new("cloudflare", APP_NAMESPACE, config.require_str("token")?);
            params.replicas = config.u32_or("replicas", params.replicas)?;
            params.env = config.string_map("env")?;
            params.extra_values = config.values_overrides()?;
            g.add(cloudflare_tunnel::create(ctx, &params, &[&tls.namespace, &waha])?)
        })?;
    }

    // Registry credentials come from env so CI can inject them
    if doc.env_str("REGISTRY_URL")?.is_some() {
        generation.compose("registry", |g| {
            let params = RegistryParams {
                slug: "registry".into(),
                namespace: APP_NAMESPACE.into(),
                url: doc.require_env("REGISTRY_URL")?,
                username: doc.require_env("REGISTRY_USERNAME")?,
                password: doc.require_env("REGISTRY_PASSWORD")?,
                insecure_registries: doc.component("registry").string_list("insecure_registries")?,
            };
            g.add(registry::create(&params, &[&tls.namespace])?)
        })?;
    }

    Ok(())
}
