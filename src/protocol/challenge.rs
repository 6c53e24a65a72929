use crate::error::Error;
use crate::protocol::ServerEndian;

// The challenge is the first block the server sends:
//
//   salt:server_type:protocol:hashes:endian:pwhash_algo[:options[:BINARY=n]]:
//
// The trailing colon is mandatory, everything after the sixth field is
// optional.
#[derive(Debug)]
pub(crate) struct Challenge<'a> {
    pub(crate) salt: &'a str,
    pub(crate) server_type: &'a str,
    pub(crate) protocol: &'a str,
    pub(crate) hashes: &'a str,
    pub(crate) endian: ServerEndian,
    pub(crate) pwhash_algo: &'a str,
    pub(crate) options: Option<&'a str>,
    pub(crate) binexport_level: u32,
}

impl<'a> Challenge<'a> {
    pub(crate) fn parse(challenge: &'a str) -> Result<Challenge<'a>, Error> {
        let mut fields: Vec<&str> = challenge.split(':').collect();

        if fields.last() != Some(&"") || fields.len() < 7 {
            return Err(Error::Operational("Server sent invalid challenge".into()));
        }
        fields.pop();

        let endian = match fields[4] {
            "LIT" => ServerEndian::Little,
            "BIG" => ServerEndian::Big,
            other => {
                return Err(Error::NotSupported(format!("Unknown byte order: {other}")));
            }
        };

        let binexport_level = match fields.get(7) {
            Some(part) => match part.strip_prefix("BINARY=") {
                Some(level) => level.parse().map_err(|_| {
                    Error::Operational(format!(
                        "invalid binary level in server challenge: {part}"
                    ))
                })?,
                None => {
                    return Err(Error::Operational(format!(
                        "unexpected field in server challenge: {part}"
                    )));
                }
            },
            None => 0,
        };

        Ok(Challenge {
            salt: fields[0],
            server_type: fields[1],
            protocol: fields[2],
            hashes: fields[3],
            endian,
            pwhash_algo: fields[5],
            options: fields.get(6).copied(),
            binexport_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::Challenge;
    use crate::error::Error;
    use crate::protocol::ServerEndian;

    const CHALLENGE: &str =
        "Ne85Wk4VDULtrBqF:mserver:9:RIPEMD160,SHA512,SHA384,SHA256,SHA224,SHA1:LIT:SHA512:sql=6,binary=1:BINARY=1:";

    #[test]
    fn it_parses_a_full_challenge() {
        let challenge = Challenge::parse(CHALLENGE).unwrap();

        assert_eq!(challenge.salt, "Ne85Wk4VDULtrBqF");
        assert_eq!(challenge.server_type, "mserver");
        assert_eq!(challenge.protocol, "9");
        assert_eq!(
            challenge.hashes,
            "RIPEMD160,SHA512,SHA384,SHA256,SHA224,SHA1"
        );
        assert_eq!(challenge.endian, ServerEndian::Little);
        assert_eq!(challenge.pwhash_algo, "SHA512");
        assert_eq!(challenge.options, Some("sql=6,binary=1"));
        assert_eq!(challenge.binexport_level, 1);
    }

    #[test]
    fn it_parses_a_minimal_challenge() {
        let challenge = Challenge::parse("salt:merovingian:9:SHA256:BIG:SHA512:").unwrap();

        assert_eq!(challenge.server_type, "merovingian");
        assert_eq!(challenge.endian, ServerEndian::Big);
        assert_eq!(challenge.options, None);
        assert_eq!(challenge.binexport_level, 0);
    }

    #[test]
    fn it_rejects_a_truncated_challenge() {
        // Missing trailing colon.
        assert!(matches!(
            Challenge::parse("salt:mserver:9:SHA256:LIT:SHA512"),
            Err(Error::Operational(_))
        ));
        // Too few fields.
        assert!(matches!(
            Challenge::parse("salt:mserver:9:"),
            Err(Error::Operational(_))
        ));
        assert!(matches!(Challenge::parse(""), Err(Error::Operational(_))));
    }

    #[test]
    fn it_rejects_unknown_byte_orders() {
        assert!(matches!(
            Challenge::parse("salt:mserver:9:SHA256:PDP:SHA512:"),
            Err(Error::NotSupported(_))
        ));
    }
}
