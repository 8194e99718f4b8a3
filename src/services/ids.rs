use sha1::{Digest, Sha1};

/// Deterministic hex identifier derived from arbitrary text
pub fn hash_id(input: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    format!("{:x}", result)
}
