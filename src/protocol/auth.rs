use digest::Digest;

/// A hash algorithm the client can compute.
///
/// Used twice during login: once for the fixed password pre-hash the server
/// names in the challenge, and once for the salted digest picked from the
/// algorithm list. Also used to verify pinned certificate fingerprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HashAlgorithm {
    Sha512,
    Sha384,
    Sha256,
    Sha224,
    Sha1,
    Md5,
}

impl HashAlgorithm {
    pub(crate) fn from_name(name: &str) -> Option<HashAlgorithm> {
        match name.to_ascii_lowercase().as_str() {
            "sha512" => Some(HashAlgorithm::Sha512),
            "sha384" => Some(HashAlgorithm::Sha384),
            "sha256" => Some(HashAlgorithm::Sha256),
            "sha224" => Some(HashAlgorithm::Sha224),
            "sha1" => Some(HashAlgorithm::Sha1),
            "md5" => Some(HashAlgorithm::Md5),
            _ => None,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha512 => "sha512",
            HashAlgorithm::Sha384 => "sha384",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha224 => "sha224",
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Md5 => "md5",
        }
    }

    /// Digest the concatenation of `parts` and return the lowercase hex form.
    pub(crate) fn hex_digest(&self, parts: &[&[u8]]) -> String {
        fn digest_with<D: Digest>(parts: &[&[u8]]) -> String {
            let mut hasher = D::new();
            for part in parts {
                hasher.update(part);
            }
            hex::encode(hasher.finalize())
        }

        match self {
            HashAlgorithm::Sha512 => digest_with::<sha2::Sha512>(parts),
            HashAlgorithm::Sha384 => digest_with::<sha2::Sha384>(parts),
            HashAlgorithm::Sha256 => digest_with::<sha2::Sha256>(parts),
            HashAlgorithm::Sha224 => digest_with::<sha2::Sha224>(parts),
            HashAlgorithm::Sha1 => digest_with::<sha1::Sha1>(parts),
            HashAlgorithm::Md5 => digest_with::<md5::Md5>(parts),
        }
    }
}

/// Pick the first algorithm from the server's comma-separated list that this
/// client implements, returning the server's spelling alongside it: the
/// response must echo the name exactly as advertised.
pub(crate) fn select_algorithm(hashes: &str) -> Option<(&str, HashAlgorithm)> {
    hashes
        .split(',')
        .find_map(|name| HashAlgorithm::from_name(name).map(|algo| (name, algo)))
}
