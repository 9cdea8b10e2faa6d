//! Named environment compositions
//!
//! Each environment wires factory calls in dependency order, reading its
//! parameters from the configuration document. Composition is entirely
//! in memory: the returned [`Generation`] is written by the caller.

use std::fmt;
use std::str::FromStr;

use tracing::info;

use crate::component::Component;
use crate::components::cert_manager_certificate::{self, CertificateParams};
use crate::components::cert_manager_issuer::{self, IssuerParams};
use crate::components::namespace::{self, NamespaceParams};
use crate::components::{FactoryContext, root_domain};
use crate::config::ConfigDocument;
use crate::error::{GenerateError, Result};
use crate::generation::Generation;

mod messaging;
mod sample;

/// Environments this build knows how to compose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvironmentName {
    /// Cluster platform: cert-manager, MetalLB, ingress-nginx, Longhorn, Rancher
    Sample,
    /// WhatsApp API stack with Redis, Postgres and a Cloudflare tunnel
    Messaging,
}

impl EnvironmentName {
    pub fn all() -> &'static [EnvironmentName] {
        &[Self::Sample, Self::Messaging]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sample => "sample",
            Self::Messaging => "messaging",
        }
    }

    /// Closest known environment to a mistyped name
    pub fn suggest(input: &str) -> Option<EnvironmentName> {
        Self::all()
            .iter()
            .map(|env| (strsim::levenshtein(input, env.as_str()), *env))
            .filter(|(distance, _)| *distance <= 3)
            .min_by_key(|(distance, _)| *distance)
            .map(|(_, env)| env)
    }
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvironmentName {
    type Err = GenerateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .iter()
            .find(|env| env.as_str() == s)
            .copied()
            .ok_or_else(|| GenerateError::UnknownEnvironment {
                name: s.to_string(),
                available: Self::all()
                    .iter()
                    .map(|env| env.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// Compose every component of an environment
pub fn compose(
    name: EnvironmentName,
    doc: &ConfigDocument,
    ctx: &FactoryContext,
) -> Result<Generation> {
    let mut generation = Generation::new(name.as_str());

    match name {
        EnvironmentName::Sample => sample::compose(&mut generation, doc, ctx)?,
        EnvironmentName::Messaging => messaging::compose(&mut generation, doc, ctx)?,
    }

    info!(
        environment = %name,
        components = generation.len(),
        "composed environment"
    );
    Ok(generation)
}

/// Namespace, Cloudflare DNS-01 issuer and wildcard certificate for one host
struct TlsChain {
    namespace: Component,
    issuer: Component,
    certificate: Component,
}

fn tls_chain(
    generation: &mut Generation,
    doc: &ConfigDocument,
    slug: &str,
    namespace_name: &str,
    host: &str,
    cert_manager: &Component,
) -> Result<TlsChain> {
    let ns = generation.compose(slug, |g| {
        g.add(namespace::create(&NamespaceParams::new(slug, namespace_name), &[])?)
    })?;

    let issuer = generation.compose(slug, |g| {
        let params = IssuerParams {
            slug: slug.to_string(),
            namespace: namespace_name.to_string(),
            cloudflare_email: doc.require_env("CLOUDFLARE_EMAIL")?,
            cloudflare_api_token: doc.require_env("CLOUDFLARE_API_TOKEN")?,
        };
        g.add(cert_manager_issuer::create(&params, &[&ns, cert_manager])?)
    })?;

    let domain = root_domain(host);
    let certificate = generation.compose(slug, |g| {
        let params = CertificateParams {
            slug: slug.to_string(),
            namespace: namespace_name.to_string(),
            domain_name: domain.to_string(),
            issuer_secret_name: issuer.require_issuer_secret_name()?.to_string(),
            dns_names: Vec::new(),
        };
        g.add(cert_manager_certificate::create(&params, &[&ns, &issuer])?)
    })?;

    Ok(TlsChain {
        namespace: ns,
        issuer,
        certificate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_environment() {
        assert_eq!("sample".parse::<EnvironmentName>().unwrap(), EnvironmentName::Sample);
        let err = "prod".parse::<EnvironmentName>().unwrap_err();
        assert!(err.to_string().contains("sample, messaging"));
    }

    #[test]
    fn test_suggest_environment() {
        assert_eq!(EnvironmentName::suggest("messagin"), Some(EnvironmentName::Messaging));
        assert_eq!(EnvironmentName::suggest("production"), None);
    }
}
