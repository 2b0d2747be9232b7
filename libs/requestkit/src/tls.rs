//! HTTPS connector construction.

use crate::config::{TlsRootConfig, TransportSecurity};
use crate::error::HttpError;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use std::sync::{Arc, OnceLock};

static NATIVE_ROOTS: OnceLock<Arc<rustls::RootCertStore>> = OnceLock::new();

/// Globally installed crypto provider, or a fresh aws-lc-rs one.
///
/// Never installs a provider globally.
pub fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

// Loaded once per process; OS store lookups are slow on some platforms.
fn native_roots() -> Arc<rustls::RootCertStore> {
    let store = NATIVE_ROOTS.get_or_init(|| {
        let result = rustls_native_certs::load_native_certs();
        for err in &result.errors {
            tracing::warn!(error = %err, "error loading native root certificate");
        }
        let mut store = rustls::RootCertStore::empty();
        let (added, ignored) = store.add_parsable_certificates(result.certs);
        if ignored > 0 {
            tracing::warn!(added, ignored, "some native root certificates could not be parsed");
        }
        tracing::debug!(count = added, "loaded native root certificates");
        Arc::new(store)
    });
    Arc::clone(store)
}

/// Build the HTTPS connector for the configured roots and transport security.
///
/// HTTP/2 is negotiated through ALPN alongside HTTP/1.1.
///
/// # Errors
/// Returns `HttpError::Tls` when the crypto provider cannot be configured or
/// the OS store yields no usable native roots.
pub fn https_connector(
    roots: TlsRootConfig,
    transport: TransportSecurity,
) -> Result<HttpsConnector<HttpConnector>, HttpError> {
    let provider = crypto_provider();
    let builder = match roots {
        TlsRootConfig::WebPki => HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(provider)
            .map_err(|e| HttpError::Tls(Box::new(e)))?,
        TlsRootConfig::Native => {
            let store = native_roots();
            if store.is_empty() {
                return Err(HttpError::Tls(
                    "no native root CA certificates found in OS certificate store".into(),
                ));
            }
            let config = rustls::ClientConfig::builder_with_provider(provider)
                .with_safe_default_protocol_versions()
                .map_err(|e| HttpError::Tls(Box::new(e)))?
                .with_root_certificates(store)
                .with_no_client_auth();
            HttpsConnectorBuilder::new().with_tls_config(config)
        }
    };

    let connector = if transport == TransportSecurity::AllowInsecureHttp {
        builder.https_or_http().enable_all_versions().build()
    } else {
        builder.https_only().enable_all_versions().build()
    };
    Ok(connector)
}
