//! cert-manager certificate issued by a namespaced issuer

use serde_json::json;

use super::{labels, require};
use crate::component::{Component, ComponentVariant};
use crate::emission::{Emission, Emitter};
use crate::error::Result;
use crate::fragments::{ComparePatch, FleetConfig, SkaffoldConfig};

pub const TYPE_SUFFIX: &str = "certificate";

#[derive(Debug, Clone)]
pub struct CertificateParams {
    pub slug: String,
    pub namespace: String,
    pub domain_name: String,
    pub issuer_secret_name: String,
    /// Defaults to the domain and its wildcard when empty
    pub dns_names: Vec<String>,
}

pub fn create(params: &CertificateParams, depends_on: &[&Component]) -> Result<Emission> {
    let slug = params.slug.as_str();
    let namespace = require(slug, "namespace", &params.namespace)?;
    let domain = require(slug, "domain_name", &params.domain_name)?;
    let issuer = require(slug, "issuer_secret_name", &params.issuer_secret_name)?;

    let secret_name = format!("{}-certificate", slug);
    let dns_names = if params.dns_names.is_empty() {
        super::wildcard_dns_names(domain)
    } else {
        params.dns_names.clone()
    };

    let component = Component::new(
        slug,
        namespace,
        TYPE_SUFFIX,
        ComponentVariant::Certificate {
            certificate_secret_name: secret_name.clone(),
        },
    );
    let mut emitter = Emitter::new(component.clone());

    let certificate = emitter.manifest(
        "certificate.yaml",
        &json!({
            "apiVersion": "cert-manager.io/v1",
            "kind": "Certificate",
            "metadata": {
                "name": secret_name,
                "namespace": namespace,
                "labels": labels(slug, &secret_name),
            },
            "spec": {
                "commonName": domain,
                "dnsNames": dns_names,
                "secretName": secret_name,
                "issuerRef": { "name": issuer, "kind": "Issuer" },
            }
        }),
    )?;

    emitter.skaffold(
        "skaffold-certificate.yaml",
        &SkaffoldConfig::new()
            .with_raw_manifest(certificate)
            .with_default_namespace(namespace),
    )?;

    emitter.fleet(
        &FleetConfig::new(&component.dir_name, depends_on)
            .with_release_name(&component.dir_name)
            .with_compare_patch(ComparePatch::ignore_server_metadata(
                "cert-manager.io/v1",
                "Certificate",
            )),
    )?;

    Ok(emitter.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::testing;

    fn params() -> CertificateParams {
        CertificateParams {
            slug: "longhorn".into(),
            namespace: "longhorn-system".into(),
            domain_name: "example.com".into(),
            issuer_secret_name: "longhorn-issuer".into(),
            dns_names: Vec::new(),
        }
    }

    #[test]
    fn test_certificate_references_issuer() {
        let emission = create(&params(), &[]).unwrap();
        assert_eq!(emission.component.dir_name, "longhorn-certificate");
        assert_eq!(
            emission.component.certificate_secret_name(),
            Some("longhorn-certificate")
        );

        let cert = testing::yaml(&emission, "manifests/certificate.yaml");
        assert_eq!(cert["spec"]["issuerRef"]["name"].as_str(), Some("longhorn-issuer"));
        assert_eq!(cert["spec"]["dnsNames"][1].as_str(), Some("*.example.com"));
    }

    #[test]
    fn test_certificate_requires_issuer() {
        let mut p = params();
        p.issuer_secret_name.clear();
        let err = create(&p, &[]).unwrap_err();
        assert!(err.to_string().contains("issuer_secret_name"));
    }
}
