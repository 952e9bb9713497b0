//! Backend TLS configuration for the raw WebSocket tunnel (spec.md §4.D
//! "WebSocket upgrade"), which dials the backend directly over
//! `hyper`/`tokio` rather than through `reqwest`. HTTP(S) forwarding uses
//! `reqwest`'s own TLS stack via [`crate::state::AppShared::client_for`];
//! this module exists only for the tunnel path.

use std::sync::Arc;

use once_cell::sync::Lazy;
use rustls::ClientConfig;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, RootCertStore, SignatureScheme};

#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer,
        _intermediates: &[CertificateDer],
        _server_name: &ServerName,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

static INSECURE: Lazy<Arc<ClientConfig>> = Lazy::new(|| {
    let mut config = ClientConfig::builder()
        .with_root_certificates(RootCertStore::empty())
        .with_no_client_auth();
    config.dangerous().set_certificate_verifier(Arc::new(NoVerifier));
    Arc::new(config)
});

static VERIFYING: Lazy<Arc<ClientConfig>> = Lazy::new(|| {
    let mut roots = RootCertStore::empty();
    if let Ok(native) = rustls_native_certs::load_native_certs().certs.into_iter().try_fold(
        RootCertStore::empty(),
        |mut acc, cert| {
            acc.add(cert)?;
            Ok::<_, rustls::Error>(acc)
        },
    ) {
        roots = native;
    }
    let config = ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();
    Arc::new(config)
});

/// Client TLS config for dialing a proxied app's backend over the raw
/// WebSocket tunnel, honoring that app's `skip_tls_verify` setting.
pub fn client_config(skip_tls_verify: bool) -> Arc<ClientConfig> {
    if skip_tls_verify { INSECURE.clone() } else { VERIFYING.clone() }
}
