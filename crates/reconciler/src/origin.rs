//! The CloudEvent `source` attribute of a CouchDB source.

use couchdb_source_apis::CouchDbSource;
use k8s_openapi::api::core::v1::Secret;
use tracing::debug;
use url::Url;

use crate::context::ReconcileContext;
use crate::error::{Error, Result};
use crate::store::ObjectStore;

/// Key in the credentials secret holding the CouchDB endpoint.
pub const URL_KEY: &str = "url";

/// Compute `<host>/<database>` for a source from its credentials secret.
///
/// # Errors
///
/// `CredentialsNotFound` when the secret does not exist, `CredentialsInvalid`
/// when it has no usable `url`, and store errors otherwise.
pub async fn event_origin(
    ctx: &ReconcileContext,
    secrets: &dyn ObjectStore<Secret>,
    source: &CouchDbSource,
) -> Result<String> {
    let namespace = source.credentials_namespace();
    let name = source.spec.credentials.name.as_str();

    let secret = ctx
        .run("get Secret", async {
            secrets.get(namespace, name).await.map_err(|e| {
                if e.is_not_found() {
                    Error::credentials_not_found(namespace, name)
                } else {
                    Error::store("get", "Secret", e)
                }
            })
        })
        .await?;

    let raw = secret_value(&secret, URL_KEY)
        .ok_or_else(|| Error::credentials_invalid(namespace, name, "missing field 'url'"))?;
    let url = Url::parse(raw.trim())
        .map_err(|e| Error::credentials_invalid(namespace, name, format!("malformed url: {e}")))?;
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| Error::credentials_invalid(namespace, name, "url has no host"))?;

    let origin = format!("{host}/{}", source.spec.database);
    debug!(
        namespace = source.namespace(),
        name = source.name(),
        origin = %origin,
        "Computed event origin"
    );
    Ok(origin)
}

fn secret_value(secret: &Secret, key: &str) -> Option<String> {
    let from_data = secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .and_then(|bytes| String::from_utf8(bytes.0.clone()).ok());
    from_data
        .or_else(|| secret.string_data.as_ref().and_then(|data| data.get(key).cloned()))
        .filter(|v| !v.trim().is_empty())
}
