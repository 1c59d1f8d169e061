/// Hashing algorithm recorded in attachment metadata.
pub const HASH_ALGORITHM: &str = "sha256";
