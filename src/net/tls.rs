use std::fs;
use std::io::{self, BufReader, Cursor};
use std::net::TcpStream;
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{
    CertificateError, ClientConfig, ClientConnection, Error as TlsError, RootCertStore,
    SignatureScheme, StreamOwned,
};

use crate::error::Error;
use crate::net::socket::NetSocket;
use crate::options::{MonetConnectOptions, TlsChecks};
use crate::protocol::auth::HashAlgorithm;

/// Wrap a freshly connected TCP stream in TLS and complete the handshake.
///
/// The client offers `mapi/9` via ALPN and refuses anything below TLS 1.3.
/// Certificate-chain and host-name verification follow the disabled-check
/// set; pinning a fingerprint disables both and verifies the peer
/// certificate digest instead.
pub(crate) fn wrap(stream: TcpStream, options: &MonetConnectOptions) -> Result<NetSocket, Error> {
    let host = options
        .host
        .as_deref()
        .ok_or_else(|| Error::Internal("TLS requested without a host name".into()))?;

    let mut disabled = options.dangerous_tls_nocheck;
    if options.fingerprint.is_some() {
        // The fingerprint replaces both checks.
        disabled |= TlsChecks::HOST | TlsChecks::CERT;
    }

    let builder = ClientConfig::builder_with_protocol_versions(&[&rustls::version::TLS13]);

    // authentication using the user's key and its associated certificate
    let user_auth = match &options.client_key {
        Some(key_path) => {
            if options.client_key_password.is_some() {
                return Err(Error::config(
                    "encrypted client keys are not supported; decrypt the key file first",
                ));
            }

            let cert_path = options.client_cert.as_ref().unwrap_or(key_path);
            let cert_chain = certs_from_pem(&fs::read(cert_path)?)?;
            let key_der = private_key_from_pem(&fs::read(key_path)?)?;
            Some((cert_chain, key_der))
        }
        None => None,
    };

    let mut config = if disabled.contains(TlsChecks::CERT) {
        let builder = builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DummyTlsVerifier));

        match user_auth {
            Some((cert_chain, key_der)) => builder
                .with_client_auth_cert(cert_chain, key_der)
                .map_err(Error::tls)?,
            None => builder.with_no_client_auth(),
        }
    } else {
        let mut cert_store = RootCertStore::empty();

        match &options.cert {
            // A configured certificate file replaces the default roots.
            Some(ca) => {
                for cert in certs_from_pem(&fs::read(ca)?)? {
                    cert_store.add(cert).map_err(Error::tls)?;
                }
            }
            None => {
                cert_store.roots = webpki_roots::TLS_SERVER_ROOTS.iter().cloned().collect();
            }
        }

        if disabled.contains(TlsChecks::HOST) {
            let verifier = WebPkiServerVerifier::builder(Arc::new(cert_store))
                .build()
                .map_err(Error::tls)?;
            let builder = builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoHostnameTlsVerifier { verifier }));

            match user_auth {
                Some((cert_chain, key_der)) => builder
                    .with_client_auth_cert(cert_chain, key_der)
                    .map_err(Error::tls)?,
                None => builder.with_no_client_auth(),
            }
        } else {
            let builder = builder.with_root_certificates(cert_store);

            match user_auth {
                Some((cert_chain, key_der)) => builder
                    .with_client_auth_cert(cert_chain, key_der)
                    .map_err(Error::tls)?,
                None => builder.with_no_client_auth(),
            }
        }
    };

    config.alpn_protocols = vec![b"mapi/9".to_vec()];

    let server_name = ServerName::try_from(host.to_owned()).map_err(Error::tls)?;
    let mut conn =
        ClientConnection::new(Arc::new(config), server_name).map_err(Error::tls)?;

    let mut stream = stream;
    while conn.is_handshaking() {
        conn.complete_io(&mut stream)?;
    }

    if let Some(fingerprint) = &options.fingerprint {
        let der = conn
            .peer_certificates()
            .and_then(|certs| certs.first())
            .ok_or_else(|| Error::Tls("server has no certificate".into()))?;

        verify_fingerprint(der.as_ref(), fingerprint)?;
    }

    Ok(NetSocket::Tls(Box::new(StreamOwned::new(conn, stream))))
}

/// Check the DER form of the peer certificate against a comma-separated list
/// of fingerprint specifiers. Each specifier is `{algo}hexdigits` with the
/// algorithm defaulting to `sha1`; colons in the digits are ignored and a
/// prefix match on the hex digest is enough.
fn verify_fingerprint(der: &[u8], fingerprint: &str) -> Result<(), Error> {
    let fingerprint = fingerprint.to_ascii_lowercase();
    let mut computed: Vec<(HashAlgorithm, String)> = Vec::new();

    for spec in fingerprint.split(',') {
        let (algo_name, digits) = match spec.strip_prefix('{') {
            Some(rest) => rest
                .split_once('}')
                .ok_or_else(|| invalid_fingerprint(spec))?,
            None => ("sha1", spec),
        };

        let algo = HashAlgorithm::from_name(algo_name).ok_or_else(|| {
            Error::Tls(format!("unknown fingerprint algorithm {algo_name:?}").into())
        })?;

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit() || b == b':') {
            return Err(invalid_fingerprint(spec));
        }
        let digits: String = digits.chars().filter(|&c| c != ':').collect();

        let digest = match computed.iter().find(|(a, _)| *a == algo) {
            Some((_, digest)) => digest.clone(),
            None => {
                let digest = algo.hex_digest(&[der]);
                computed.push((algo, digest.clone()));
                digest
            }
        };

        if digest.starts_with(&digits) {
            return Ok(());
        }
    }

    let all = computed
        .iter()
        .map(|(algo, digest)| format!("{{{}}}{}", algo.name(), digest))
        .collect::<Vec<_>>()
        .join(", ");

    Err(Error::Tls(
        format!("wrong server certificate fingerprint: {all}").into(),
    ))
}

fn invalid_fingerprint(spec: &str) -> Error {
    Error::Tls(format!("invalid fingerprint {spec:?}").into())
}

fn certs_from_pem(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, Error> {
    let mut reader = BufReader::new(Cursor::new(pem));

    rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, io::Error>>()
        .map_err(Error::Io)
}

fn private_key_from_pem(pem: &[u8]) -> Result<PrivateKeyDer<'static>, Error> {
    let mut reader = BufReader::new(Cursor::new(pem));

    loop {
        match rustls_pemfile::read_one(&mut reader)? {
            Some(rustls_pemfile::Item::Pkcs8Key(key)) => return Ok(PrivateKeyDer::Pkcs8(key)),
            Some(rustls_pemfile::Item::Sec1Key(key)) => return Ok(PrivateKeyDer::Sec1(key)),
            Some(rustls_pemfile::Item::Pkcs1Key(key)) => return Ok(PrivateKeyDer::Pkcs1(key)),
            None => break,
            _ => {}
        }
    }

    Err(Error::config("no keys found in client key file"))
}

#[derive(Debug)]
struct DummyTlsVerifier;

impl ServerCertVerifier for DummyTlsVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

#[derive(Debug)]
struct NoHostnameTlsVerifier {
    verifier: Arc<WebPkiServerVerifier>,
}

impl ServerCertVerifier for NoHostnameTlsVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        match self.verifier.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Err(TlsError::InvalidCertificate(reason))
                if reason == CertificateError::NotValidForName =>
            {
                Ok(ServerCertVerified::assertion())
            }
            res => res,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        self.verifier.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        self.verifier.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.verifier.supported_verify_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::verify_fingerprint;
    use crate::error::Error;
    use crate::protocol::auth::HashAlgorithm;

    const DER: &[u8] = b"not really a certificate, but any bytes will do";

    #[test]
    fn it_accepts_a_matching_prefix() {
        let digest = HashAlgorithm::Sha256.hex_digest(&[DER]);

        verify_fingerprint(DER, &format!("{{sha256}}{}", &digest[..4])).unwrap();
        verify_fingerprint(DER, &format!("{{sha256}}{digest}")).unwrap();
    }

    #[test]
    fn it_rejects_a_wrong_fingerprint() {
        let digest = HashAlgorithm::Sha256.hex_digest(&[DER]);

        // Flip the leading digit so the prefix cannot match.
        let mut wrong = digest.clone();
        let flipped = if wrong.starts_with('0') { "1" } else { "0" };
        wrong.replace_range(0..1, flipped);

        let err = verify_fingerprint(DER, &format!("{{sha256}}{wrong}")).unwrap_err();
        match err {
            Error::Tls(e) => {
                // The error lists the digests that were computed.
                assert!(e.to_string().contains(&digest));
            }
            other => panic!("expected TLS error, got {other:?}"),
        }
    }

    #[test]
    fn it_defaults_to_sha1_and_ignores_colons() {
        let digest = HashAlgorithm::Sha1.hex_digest(&[DER]);
        let spec = format!("{}:{}:{}", &digest[..2], &digest[2..4], &digest[4..6]);

        verify_fingerprint(DER, &spec).unwrap();
    }

    #[test]
    fn it_tries_each_specifier_in_turn() {
        let sha256 = HashAlgorithm::Sha256.hex_digest(&[DER]);
        let sha512 = HashAlgorithm::Sha512.hex_digest(&[DER]);

        let mut wrong = sha256.clone();
        let flipped = if wrong.starts_with('0') { "1" } else { "0" };
        wrong.replace_range(0..1, flipped);

        // The first specifier misses, the second matches.
        verify_fingerprint(DER, &format!("{{sha256}}{wrong},{{sha512}}{}", &sha512[..8]))
            .unwrap();
    }

    #[test]
    fn it_rejects_malformed_specifiers() {
        assert!(matches!(
            verify_fingerprint(DER, "{sha256"),
            Err(Error::Tls(_))
        ));
        assert!(matches!(
            verify_fingerprint(DER, "{nosuchalgo}abcd"),
            Err(Error::Tls(_))
        ));
        assert!(matches!(
            verify_fingerprint(DER, "xyz!"),
            Err(Error::Tls(_))
        ));
    }
}
