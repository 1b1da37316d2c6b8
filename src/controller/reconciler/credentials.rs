//! # Credentials
//!
//! Resolves the New Relic API key of a resource and builds a client bound to it.
//!
//! A non-empty inline key wins. Otherwise the referenced Secret is read; its
//! namespace defaults to the namespace of the referencing resource.

use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::{AlertsPolicy, ConditionBase, Region, SecretReference};
use crate::provider::{AlertsClient, ClientCredentials};
use crate::store::SecretSource;
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroizing;

/// Resolve an API key from an inline value or a secret reference
///
/// # Errors
/// Returns `ReconcilerError::Credentials` when neither source yields a key
pub async fn resolve_api_key(
    inline: Option<&str>,
    secret_ref: Option<&SecretReference>,
    default_namespace: &str,
    secrets: &dyn SecretSource,
) -> Result<Zeroizing<String>, ReconcilerError> {
    if let Some(key) = inline.map(str::trim).filter(|key| !key.is_empty()) {
        debug!("Using inline API key");
        return Ok(Zeroizing::new(key.to_string()));
    }

    let Some(reference) = secret_ref else {
        return Err(ReconcilerError::Credentials(
            "neither apiKey nor apiKeySecret is set".to_string(),
        ));
    };

    let namespace = reference
        .namespace
        .as_deref()
        .filter(|ns| !ns.is_empty())
        .unwrap_or(default_namespace);
    let location = format!("{}/{}", namespace, reference.name);

    let data = secrets
        .read_secret(namespace, &reference.name)
        .await
        .map_err(|e| ReconcilerError::Credentials(format!("failed to read secret {location}: {e}")))?
        .ok_or_else(|| ReconcilerError::Credentials(format!("secret {location} not found")))?;

    let raw = data.get(&reference.key_name).ok_or_else(|| {
        ReconcilerError::Credentials(format!(
            "secret {location} has no key '{}'",
            reference.key_name
        ))
    })?;

    let value = std::str::from_utf8(raw).map_err(|e| {
        ReconcilerError::Credentials(format!(
            "key '{}' of secret {location} is not valid UTF-8: {e}",
            reference.key_name
        ))
    })?;
    let value = value.trim();
    if value.is_empty() {
        return Err(ReconcilerError::Credentials(format!(
            "key '{}' of secret {location} is empty",
            reference.key_name
        )));
    }

    debug!("Using API key from secret {}", location);
    Ok(Zeroizing::new(value.to_string()))
}

/// Build a client for the parent policy
///
/// # Errors
/// Returns an error if credentials cannot be resolved or the client cannot be built
pub async fn policy_client(
    ctx: &Reconciler,
    policy: &AlertsPolicy,
) -> Result<Arc<dyn AlertsClient>, ReconcilerError> {
    let namespace = policy.metadata.namespace.as_deref().unwrap_or("default");
    let api_key = resolve_api_key(
        policy.spec.api_key.as_deref(),
        policy.spec.api_key_secret.as_ref(),
        namespace,
        ctx.secrets.as_ref(),
    )
    .await?;
    build_client(
        ctx,
        ClientCredentials {
            api_key,
            region: policy.spec.effective_region(),
        },
    )
}

/// Build a client for a child condition from its inherited fields
///
/// # Errors
/// Returns an error if credentials cannot be resolved or the client cannot be built
pub async fn condition_client(
    ctx: &Reconciler,
    base: &ConditionBase,
    namespace: &str,
) -> Result<Arc<dyn AlertsClient>, ReconcilerError> {
    let api_key = resolve_api_key(
        base.api_key.as_deref(),
        base.api_key_secret.as_ref(),
        namespace,
        ctx.secrets.as_ref(),
    )
    .await?;
    build_client(
        ctx,
        ClientCredentials {
            api_key,
            region: base.region.unwrap_or(Region::Us),
        },
    )
}

fn build_client(
    ctx: &Reconciler,
    credentials: ClientCredentials,
) -> Result<Arc<dyn AlertsClient>, ReconcilerError> {
    ctx.clients
        .build(&credentials)
        .map_err(|e| ReconcilerError::Credentials(format!("cannot build New Relic client: {e}")))
}
