// Copyright 2024 ActorEdge Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! TLS posture for the HTTP/2 mapping: plaintext, one-way (server-only
//! certificate), mutual (client presents a certificate too), or deferring to
//! the platform's default trust store. Modeled as data rather than raw
//! `rustls` types so a server or client can be built from a plain config
//! struct the way `actor-edge-core::config` does for the transport-neutral
//! knobs.

use std::path::PathBuf;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::server::WebPkiClientVerifier;
use rustls::{CertificateError, ClientConfig as RustlsClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig as RustlsServerConfig};

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read certificate material: {0}")]
    Io(#[from] std::io::Error),
    #[error("no certificates found in the supplied source")]
    NoCertificates,
    #[error("no private key found in the supplied source")]
    NoPrivateKey,
    #[error("rustls rejected the supplied configuration: {0}")]
    Rustls(#[from] rustls::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertFormat {
    Pem,
    Der,
}

/// Where certificate or key material comes from. All three forms are
/// resolved to the same `rustls` types before use.
#[derive(Debug, Clone)]
pub enum CertSource {
    Bytes { data: Vec<u8>, format: CertFormat },
    Path { path: PathBuf, format: CertFormat },
    PreLoaded(Vec<CertificateDer<'static>>),
}

impl CertSource {
    pub fn pem_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes { data: data.into(), format: CertFormat::Pem }
    }

    pub fn der_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes { data: data.into(), format: CertFormat::Der }
    }

    pub fn pem_path(path: impl Into<PathBuf>) -> Self {
        Self::Path { path: path.into(), format: CertFormat::Pem }
    }

    pub fn der_path(path: impl Into<PathBuf>) -> Self {
        Self::Path { path: path.into(), format: CertFormat::Der }
    }

    fn read_raw(&self) -> Result<Vec<u8>, TlsError> {
        match self {
            CertSource::Bytes { data, .. } => Ok(data.clone()),
            CertSource::Path { path, .. } => Ok(std::fs::read(path)?),
            CertSource::PreLoaded(_) => unreachable!("pre-loaded sources never read raw bytes"),
        }
    }

    fn format(&self) -> CertFormat {
        match self {
            CertSource::Bytes { format, .. } | CertSource::Path { format, .. } => *format,
            CertSource::PreLoaded(_) => CertFormat::Der,
        }
    }

    pub fn load_certs(&self) -> Result<Vec<CertificateDer<'static>>, TlsError> {
        if let CertSource::PreLoaded(certs) = self {
            return Ok(certs.clone());
        }
        let raw = self.read_raw()?;
        let certs = match self.format() {
            CertFormat::Der => vec![CertificateDer::from(raw)],
            CertFormat::Pem => rustls_pemfile::certs(&mut raw.as_slice())
                .collect::<Result<Vec<_>, _>>()
                .map_err(TlsError::Io)?,
        };
        if certs.is_empty() {
            return Err(TlsError::NoCertificates);
        }
        Ok(certs)
    }

    pub fn load_private_key(&self) -> Result<PrivateKeyDer<'static>, TlsError> {
        let raw = self.read_raw()?;
        match self.format() {
            CertFormat::Der => Ok(PrivateKeyDer::try_from(raw).map_err(|_| TlsError::NoPrivateKey)?),
            CertFormat::Pem => rustls_pemfile::private_key(&mut raw.as_slice())?.ok_or(TlsError::NoPrivateKey),
        }
    }
}

/// A certificate + private key pair presented by a peer during the handshake.
#[derive(Debug, Clone)]
pub struct Identity {
    pub cert: CertSource,
    pub key: CertSource,
}

/// How strictly a client checks the server's certificate. `None` and
/// `NoHostnameVerification` are deliberately dangerous and exist for local
/// development and testing against self-signed material only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerCertVerification {
    /// Skip certificate verification entirely.
    None,
    /// Verify the chain and validity period but not against `server_name`.
    /// Intended for peers addressed by IP or an internal name that never
    /// appears in the certificate's SANs (loopback test harnesses, a mesh
    /// that routes by something other than DNS name).
    NoHostnameVerification,
    /// Verify the full chain, validity period, and hostname.
    #[default]
    FullVerification,
}

/// The TLS posture a server or client operates under (spec §6).
#[derive(Debug, Clone)]
pub enum TlsPosture {
    /// No TLS; envelopes travel in cleartext. Development/test only.
    Plaintext,
    /// The peer authenticates the remote endpoint's certificate; this side
    /// presents none of its own.
    OneWay { roots: CertSource, verification: ServerCertVerification },
    /// Both sides present certificates.
    Mutual { roots: CertSource, identity: Identity, verification: ServerCertVerification },
    /// Defer to the platform/`webpki-roots` default trust store, one-way.
    SystemDefault,
}

/// Client-side knobs layered on top of [`TlsPosture`]: SNI can be set
/// independent of the address actually dialed, and ALPN is not required by
/// default even under mTLS (a server that never negotiates `h2` is common in
/// test harnesses and should not be rejected solely for that).
#[derive(Debug, Clone, Default)]
pub struct TlsClientOptions {
    pub server_name_override: Option<String>,
    pub alpn_required: bool,
}

fn root_store(source: &CertSource) -> Result<RootCertStore, TlsError> {
    let mut store = RootCertStore::empty();
    for cert in source.load_certs()? {
        store.add(cert).map_err(TlsError::Rustls)?;
    }
    Ok(store)
}

fn system_root_store() -> RootCertStore {
    RootCertStore { roots: webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect() }
}

/// Builds the `rustls::ClientConfig` for `posture`, applying `options` on top.
pub fn client_config(posture: &TlsPosture, options: &TlsClientOptions) -> Result<RustlsClientConfig, TlsError> {
    let builder = RustlsClientConfig::builder();
    let mut config = match posture {
        TlsPosture::Plaintext => {
            // Callers must not use this over a TLS-terminating connector;
            // `Http2Transport` checks the posture before ever reaching here.
            return Err(TlsError::Rustls(rustls::Error::General("plaintext posture has no TLS config".into())));
        }
        TlsPosture::SystemDefault => builder.with_root_certificates(system_root_store()).with_no_client_auth(),
        TlsPosture::OneWay { roots, .. } => builder.with_root_certificates(root_store(roots)?).with_no_client_auth(),
        TlsPosture::Mutual { roots, identity, .. } => builder
            .with_root_certificates(root_store(roots)?)
            .with_client_auth_cert(identity.cert.load_certs()?, identity.key.load_private_key()?)
            .map_err(TlsError::Rustls)?,
    };

    let verification = match posture {
        TlsPosture::OneWay { verification, .. } | TlsPosture::Mutual { verification, .. } => *verification,
        _ => ServerCertVerification::FullVerification,
    };
    match verification {
        ServerCertVerification::None => {
            config.dangerous().set_certificate_verifier(Arc::new(AcceptAnyServerCert));
        }
        ServerCertVerification::NoHostnameVerification => {
            let roots = match posture {
                TlsPosture::OneWay { roots, .. } | TlsPosture::Mutual { roots, .. } => roots,
                _ => unreachable!("NoHostnameVerification only occurs on OneWay/Mutual"),
            };
            let inner = WebPkiServerVerifier::builder(Arc::new(root_store(roots)?))
                .build()
                .map_err(|e| TlsError::Rustls(rustls::Error::General(e.to_string())))?;
            config.dangerous().set_certificate_verifier(Arc::new(ChainOnlyServerCert { inner }));
        }
        ServerCertVerification::FullVerification => {}
    }

    if !options.alpn_required {
        config.alpn_protocols.clear();
    } else {
        config.alpn_protocols = vec![b"h2".to_vec()];
    }
    Ok(config)
}

/// Builds the `rustls::ServerConfig` for `posture`.
pub fn server_config(posture: &TlsPosture) -> Result<RustlsServerConfig, TlsError> {
    let builder = RustlsServerConfig::builder();
    match posture {
        TlsPosture::Plaintext => Err(TlsError::Rustls(rustls::Error::General("plaintext posture has no TLS config".into()))),
        TlsPosture::SystemDefault => Err(TlsError::Rustls(rustls::Error::General(
            "a server cannot present the system trust store as its own identity".into(),
        ))),
        TlsPosture::OneWay { .. } => Err(TlsError::Rustls(rustls::Error::General(
            "OneWay describes what the client trusts; server identity needs a Mutual posture's `identity` field".into(),
        ))),
        TlsPosture::Mutual { roots, identity, .. } => {
            let client_verifier = WebPkiClientVerifier::builder(Arc::new(root_store(roots)?))
                .build()
                .map_err(|e| TlsError::Rustls(rustls::Error::General(e.to_string())))?;
            builder
                .with_client_cert_verifier(client_verifier)
                .with_single_cert(identity.cert.load_certs()?, identity.key.load_private_key()?)
                .map_err(TlsError::Rustls)
        }
    }
}

/// Resolves the `ServerName` used for the handshake: an explicit override if
/// set, otherwise the address actually being dialed.
pub fn resolve_server_name(options: &TlsClientOptions, connect_host: &str) -> Result<ServerName<'static>, TlsError> {
    let name = options.server_name_override.as_deref().unwrap_or(connect_host);
    ServerName::try_from(name.to_string()).map_err(|_| TlsError::Rustls(rustls::Error::General(format!("invalid server name '{name}'"))))
}

/// Accepts any certificate presented by the server. Used only under
/// [`ServerCertVerification::None`] -- development and CI against
/// self-signed material, never a default.
#[derive(Debug)]
struct AcceptAnyServerCert;

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider().signature_verification_algorithms.supported_schemes()
    }
}

/// Delegates to the standard webpki-backed verifier for chain and validity
/// checks, but tolerates a hostname mismatch -- used under
/// [`ServerCertVerification::NoHostnameVerification`].
#[derive(Debug)]
struct ChainOnlyServerCert {
    inner: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for ChainOnlyServerCert {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match self.inner.verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now) {
            Err(rustls::Error::InvalidCertificate(CertificateError::NotValidForName)) => Ok(ServerCertVerified::assertion()),
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plaintext_posture_has_no_tls_config() {
        let err = client_config(&TlsPosture::Plaintext, &TlsClientOptions::default()).unwrap_err();
        assert!(matches!(err, TlsError::Rustls(_)));
    }

    #[test]
    fn alpn_is_not_required_by_default() {
        let posture = TlsPosture::SystemDefault;
        let config = client_config(&posture, &TlsClientOptions::default()).unwrap();
        assert!(config.alpn_protocols.is_empty());
    }

    #[test]
    fn alpn_required_requests_h2() {
        let posture = TlsPosture::SystemDefault;
        let options = TlsClientOptions { alpn_required: true, ..Default::default() };
        let config = client_config(&posture, &options).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"h2".to_vec()]);
    }

    #[test]
    fn server_name_override_takes_precedence_over_connect_host() {
        let options = TlsClientOptions { server_name_override: Some("override.example".to_string()), alpn_required: false };
        let name = resolve_server_name(&options, "connect.example").unwrap();
        assert_eq!(name, ServerName::try_from("override.example".to_string()).unwrap());
    }

    #[test]
    fn server_name_falls_back_to_connect_host() {
        let name = resolve_server_name(&TlsClientOptions::default(), "connect.example").unwrap();
        assert_eq!(name, ServerName::try_from("connect.example".to_string()).unwrap());
    }
}
