use rustls::{
    CertificateError,
    DigitallySignedStruct,
    SignatureScheme,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature},
    pki_types::{CertificateDer, ServerName, UnixTime},
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, warn};
use x509_parser::parse_x509_certificate;

/// The hex-encoded SHA-256 fingerprint of a DER certificate.
pub fn fingerprint(certificate: &CertificateDer<'_>) -> String {
    hex::encode(Sha256::digest(certificate.as_ref()))
}

/// Check that `now` lies within the validity window of a DER certificate.
fn check_validity(certificate: &[u8], now: UnixTime) -> Result<(), CertificateError> {
    let (_, certificate) = parse_x509_certificate(certificate).map_err(|_| CertificateError::BadEncoding)?;
    let validity = certificate.validity();
    let now = i64::try_from(now.as_secs()).unwrap_or(i64::MAX);

    if now < validity.not_before.timestamp() {
        Err(CertificateError::NotValidYet)
    } else if now > validity.not_after.timestamp() {
        Err(CertificateError::Expired)
    } else {
        Ok(())
    }
}

/// A `ServerCertVerifier` that accepts any certificate that is currently valid.
///
/// Neither the hostname nor the issuer is checked: Gemini servers mostly use
/// self-signed certificates. Handshake signatures are still verified against
/// the presented certificate.
#[derive(Debug)]
pub struct ValidityVerifier {
    provider: Arc<CryptoProvider>,
}

impl ValidityVerifier {
    pub fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

impl ServerCertVerifier for ValidityVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let fingerprint = fingerprint(end_entity);

        match check_validity(end_entity.as_ref(), now) {
            Ok(()) => {
                debug!(server = ?server_name, %fingerprint, "accepted server certificate");
                Ok(ServerCertVerified::assertion())
            }
            Err(e) => {
                warn!(server = ?server_name, %fingerprint, error = ?e, "rejected server certificate");
                Err(rustls::Error::InvalidCertificate(e))
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}
