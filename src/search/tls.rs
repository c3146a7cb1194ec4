// SPDX-License-Identifier: Apache-2.0

use crate::search::errors::{Result, SearchError};
use hyper_rustls::ConfigBuilderExt;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use sha2::{Digest, Sha256};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Installs the process wide rustls provider unless one is already set.
pub fn init_crypto_provider() -> Result<()> {
    if CryptoProvider::get_default().is_some() {
        return Ok(());
    }
    match rustls::crypto::aws_lc_rs::default_provider().install_default() {
        Ok(()) => Ok(()),
        // another thread installed a provider first
        Err(_) if CryptoProvider::get_default().is_some() => Ok(()),
        Err(e) => Err(SearchError::Configuration(format!(
            "failed to initialize crypto library: {:?}",
            e
        ))),
    }
}

/// System roots, or certificate pinning when a fingerprint is given.
pub(crate) fn client_config(fingerprint: Option<Vec<u8>>) -> Result<ClientConfig> {
    let config = match fingerprint {
        Some(fp) => ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(FingerprintVerification::new(fp)),
        None => ClientConfig::builder()
            .with_native_roots()
            .map_err(|e| SearchError::Configuration(format!("failed to load native roots: {}", e)))?,
    };
    Ok(config.with_no_client_auth())
}

/// Accepts exactly the server certificate whose SHA-256 digest matches.
/// Handshake signatures are still verified against that certificate.
pub(crate) struct FingerprintVerification {
    fingerprint: Vec<u8>,
    provider: Arc<CryptoProvider>,
}

impl FingerprintVerification {
    pub(crate) fn new(fingerprint: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            fingerprint,
            provider: Arc::new(rustls::crypto::aws_lc_rs::default_provider()),
        })
    }

    fn matches(&self, cert: &CertificateDer<'_>) -> bool {
        Sha256::digest(cert.as_ref()).as_slice() == self.fingerprint.as_slice()
    }
}

impl Debug for FingerprintVerification {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "FingerprintVerification({})", hex::encode(&self.fingerprint))
    }
}

impl ServerCertVerifier for FingerprintVerification {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        if self.matches(end_entity) {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::General(
                "server certificate fingerprint mismatch".to_string(),
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
