use sha2::{Digest, Sha256};

/// Number of hex characters kept from the SHA-256 digest.
const ID_LEN: usize = 16;

/// Identity string for a server: repo URL, else homepage, else name.
///
/// Lowercased and trimmed, with trailing slashes and a `.git` suffix removed,
/// so `https://GitHub.com/Acme/Tool/` and `https://github.com/acme/tool.git`
/// resolve to the same key.
pub fn identity_key(repo_url: Option<&str>, homepage: Option<&str>, name: &str) -> String {
    let primary = [repo_url, homepage]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(name);

    let mut key = primary.trim().to_lowercase();
    loop {
        let before = key.len();
        while key.ends_with('/') {
            key.pop();
        }
        if let Some(stripped) = key.strip_suffix(".git") {
            key = stripped.to_string();
        }
        if key.len() == before {
            break;
        }
    }
    key
}

/// Deterministic short id: truncated SHA-256 of the lowercased, trimmed input.
pub fn stable_id(primary: &str) -> String {
    let digest = Sha256::digest(primary.trim().to_lowercase().as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(ID_LEN);
    id
}

/// Full hex SHA-256 of arbitrary text.
pub fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
