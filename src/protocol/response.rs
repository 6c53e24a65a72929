use crate::error::Error;
use crate::options::MonetConnectOptions;
use crate::protocol::auth::{self, HashAlgorithm};
use crate::protocol::challenge::Challenge;
use crate::protocol::handshake::HandshakeOption;

/// Build the login response for a challenge:
///
/// ```text
/// BIG:user:{ALGO}digest:language:database:[FILETRANS:opt=v,...:]
/// ```
///
/// The password is first reduced with the server-chosen pre-hash, then
/// salted and digested with the first mutually supported algorithm. Options
/// below the advertised level are serialized inline and marked `sent`.
pub(crate) fn build_response(
    challenge: &Challenge<'_>,
    options: &MonetConnectOptions,
    handshake_options: &mut [HandshakeOption],
) -> Result<String, Error> {
    // When the merovingian daemon answers, the real credentials are saved
    // for the backend database it forwards us to.
    let (user, password) = if challenge.server_type == "merovingian" {
        ("merovingian", "")
    } else {
        (
            options.user.as_deref().unwrap_or(""),
            options.password.as_deref().unwrap_or(""),
        )
    };

    if challenge.protocol != "9" {
        return Err(Error::NotSupported("We only speak protocol v9".into()));
    }

    let prehash = HashAlgorithm::from_name(challenge.pwhash_algo).ok_or_else(|| {
        Error::NotSupported(format!(
            "unsupported password hash: {}",
            challenge.pwhash_algo
        ))
    })?;
    let password = prehash.hex_digest(&[password.as_bytes()]);

    let (algo_name, algo) = auth::select_algorithm(challenge.hashes).ok_or_else(|| {
        Error::NotSupported(format!(
            "Unsupported hash algorithms required for login: {}",
            challenge.hashes
        ))
    })?;
    let digest = algo.hex_digest(&[password.as_bytes(), challenge.salt.as_bytes()]);

    let mut response = format!(
        "BIG:{}:{{{}}}{}:{}:{}:",
        user,
        algo_name,
        digest,
        options.language,
        options.database.as_deref().unwrap_or(""),
    );

    if let Some(server_options) = challenge.options {
        response.push_str("FILETRANS:");

        let mut options_level = 0;
        for part in server_options.split(',') {
            if let Some(level) = part.strip_prefix("sql=") {
                options_level = level.parse().map_err(|_| {
                    Error::Operational(format!(
                        "invalid sql options level in server challenge: {part}"
                    ))
                })?;
            }
        }

        let mut first = true;
        for opt in handshake_options.iter_mut() {
            if opt.level < options_level {
                if !first {
                    response.push(',');
                }
                response.push_str(&format!("{}={}", opt.name, opt.value));
                opt.sent = true;
                first = false;
            }
        }
        response.push(':');
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::build_response;
    use crate::error::Error;
    use crate::options::MonetConnectOptions;
    use crate::protocol::auth::HashAlgorithm;
    use crate::protocol::challenge::Challenge;
    use crate::protocol::handshake::{derive_options, HandshakeOption};

    fn options() -> MonetConnectOptions {
        MonetConnectOptions::new()
            .user("monetdb")
            .password("monetdb")
            .database("demo")
    }

    #[test]
    fn it_builds_the_salted_response() {
        let challenge = Challenge::parse("sXYZ:mserver:9:SHA256,SHA1:LIT:SHA512:").unwrap();
        let response = build_response(&challenge, &options(), &mut []).unwrap();

        let prehash = HashAlgorithm::Sha512.hex_digest(&[b"monetdb"]);
        let digest = HashAlgorithm::Sha256.hex_digest(&[prehash.as_bytes(), b"sXYZ"]);

        assert_eq!(response, format!("BIG:monetdb:{{SHA256}}{digest}:sql:demo:"));
    }

    #[test]
    fn it_uses_merovingian_credentials() {
        let challenge = Challenge::parse("salt:merovingian:9:SHA256:LIT:SHA512:").unwrap();
        let response = build_response(&challenge, &options(), &mut []).unwrap();

        let prehash = HashAlgorithm::Sha512.hex_digest(&[b""]);
        let digest = HashAlgorithm::Sha256.hex_digest(&[prehash.as_bytes(), b"salt"]);

        assert_eq!(
            response,
            format!("BIG:merovingian:{{SHA256}}{digest}:sql:demo:")
        );
    }

    #[test]
    fn it_serializes_options_below_the_server_level() {
        let challenge =
            Challenge::parse("salt:mserver:9:SHA256:LIT:SHA512:sql=3,other=9:").unwrap();
        let mut handshake = derive_options(&options().autocommit(true), 0);

        let response = build_response(&challenge, &options(), &mut handshake).unwrap();

        // Levels 1 and 2 are below sql=3; size_header (level 3) is not.
        assert!(response.ends_with(":FILETRANS:auto_commit=1,reply_size=100:"));
        assert!(handshake[0].sent);
        assert!(handshake[1].sent);
        assert!(!handshake[2].sent);
    }

    #[test]
    fn it_omits_the_options_block_for_old_servers() {
        let challenge = Challenge::parse("salt:mserver:9:SHA256:LIT:SHA512:").unwrap();
        let mut handshake = vec![HandshakeOption::new(
            1,
            "auto_commit",
            1,
            "Xauto_commit 1".into(),
        )];

        let response = build_response(&challenge, &options(), &mut handshake).unwrap();

        assert!(!response.contains("FILETRANS"));
        assert!(!handshake[0].sent);
    }

    #[test]
    fn it_rejects_other_protocol_versions() {
        let challenge = Challenge::parse("salt:mserver:8:SHA256:LIT:SHA512:").unwrap();

        assert!(matches!(
            build_response(&challenge, &options(), &mut []),
            Err(Error::NotSupported(_))
        ));
    }

    #[test]
    fn it_requires_a_common_hash_algorithm() {
        let challenge = Challenge::parse("salt:mserver:9:RIPEMD160:LIT:SHA512:").unwrap();

        assert!(matches!(
            build_response(&challenge, &options(), &mut []),
            Err(Error::NotSupported(_))
        ));

        let challenge = Challenge::parse("salt:mserver:9:SHA256:LIT:WHIRLPOOL:").unwrap();

        assert!(matches!(
            build_response(&challenge, &options(), &mut []),
            Err(Error::NotSupported(_))
        ));
    }
}
