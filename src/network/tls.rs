use crate::configuration::types::parse_cipher_list;
use crate::configuration::{Config, TlsVersion};
use crate::error_handling::types::ConfigError;
use log::info;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tokio_rustls::rustls::crypto::{ring, CryptoProvider};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::{self, ServerConfig, SupportedCipherSuite, SupportedProtocolVersion};
use tokio_rustls::TlsAcceptor;

/// Builds the TLS acceptor when TLS is enabled, `Ok(None)` otherwise.
///
/// rustls never negotiates TLS-level compression, so there is nothing to switch off.
pub fn build_tls_acceptor(config: &Config) -> Result<Option<TlsAcceptor>, ConfigError> {
    if !config.tls_enabled {
        return Ok(None);
    }
    let cert_path = config.tls_cert.as_deref().ok_or_else(|| {
        ConfigError::MissingTlsMaterial("TLS enabled without a certificate".into())
    })?;
    let key_path = config.tls_key.as_deref().ok_or_else(|| {
        ConfigError::MissingTlsMaterial("TLS enabled without a private key".into())
    })?;

    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;
    let provider = crypto_provider(config.tls_ciphers.as_deref())?;

    let versions: &[&'static SupportedProtocolVersion] = match config.tls_min_version {
        TlsVersion::Tls12 => &[&rustls::version::TLS13, &rustls::version::TLS12],
        TlsVersion::Tls13 => &[&rustls::version::TLS13],
    };

    let server_config = ServerConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(versions)
        .map_err(|e| {
            ConfigError::InvalidValue(format!(
                "no usable cipher suite for minimum version {}: {}",
                config.tls_min_version, e
            ))
        })?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ConfigError::InvalidValue(format!("TLS certificate/key rejected: {}", e)))?;

    info!(
        "TLS enabled (minimum {}, certificate {})",
        config.tls_min_version,
        cert_path.display()
    );
    Ok(Some(TlsAcceptor::from(Arc::new(server_config))))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    let file = File::open(path).map_err(|e| {
        ConfigError::MissingTlsMaterial(format!("reading TLS cert {}: {}", path.display(), e))
    })?;
    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<_, _>>()
        .map_err(|e| ConfigError::InvalidValue(format!("parsing TLS certs: {}", e)))?;
    if certs.is_empty() {
        return Err(ConfigError::MissingTlsMaterial(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ConfigError> {
    let file = File::open(path).map_err(|e| {
        ConfigError::MissingTlsMaterial(format!("reading TLS key {}: {}", path.display(), e))
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| ConfigError::InvalidValue(format!("parsing TLS key: {}", e)))?
        .ok_or_else(|| {
            ConfigError::MissingTlsMaterial(format!("no private key found in {}", path.display()))
        })
}

/// The ring provider, restricted to `ciphers` when given. Every listed name must be a suite
/// the provider knows.
pub fn crypto_provider(ciphers: Option<&str>) -> Result<CryptoProvider, ConfigError> {
    let mut provider = ring::default_provider();
    let Some(list) = ciphers else {
        return Ok(provider);
    };

    let wanted = parse_cipher_list(list);
    if let Some(unknown) = wanted
        .iter()
        .find(|name| !provider.cipher_suites.iter().any(|s| suite_name(s) == **name))
    {
        return Err(ConfigError::UnknownCipher(unknown.clone()));
    }
    provider
        .cipher_suites
        .retain(|suite| wanted.contains(&suite_name(suite)));
    Ok(provider)
}

fn suite_name(suite: &SupportedCipherSuite) -> String {
    format!("{:?}", suite.suite())
}
