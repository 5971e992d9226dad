use sha1::{Digest, Sha1};
use std::collections::BTreeMap;

pub const PASS_FILE: &str = "pass.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const SIGNATURE_FILE: &str = "signature";

/// File name to raw bytes.
pub type Assets = BTreeMap<String, Vec<u8>>;

/// File name to lowercase hex SHA-1, the digest the pass format mandates.
pub type Manifest = BTreeMap<String, String>;

/// Hash every file except the manifest and signature themselves.
pub fn build_manifest(assets: &Assets) -> Manifest {
    assets
        .iter()
        .filter(|(name, _)| name.as_str() != MANIFEST_FILE && name.as_str() != SIGNATURE_FILE)
        .map(|(name, bytes)| (name.clone(), hex::encode(Sha1::digest(bytes))))
        .collect()
}

/// Serialized manifest. Keys come out sorted, so equal inputs always give
/// byte-identical output.
pub fn manifest_bytes(manifest: &Manifest) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_matches_known_sha1_vector() {
        let assets = Assets::from([("pass.json".to_string(), b"abc".to_vec())]);
        let manifest = build_manifest(&assets);
        assert_eq!(manifest["pass.json"], "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn manifest_and_signature_are_never_hashed() {
        let assets = Assets::from([
            ("icon.png".to_string(), b"icon".to_vec()),
            (MANIFEST_FILE.to_string(), b"{}".to_vec()),
            (SIGNATURE_FILE.to_string(), b"sig".to_vec()),
        ]);
        let manifest = build_manifest(&assets);
        assert_eq!(manifest.len(), 1);
        assert!(manifest.contains_key("icon.png"));
    }

    #[test]
    fn rebuilding_from_same_bytes_is_byte_identical() {
        let mut forward = Assets::new();
        forward.insert("icon.png".to_string(), vec![1, 2, 3]);
        forward.insert("logo.png".to_string(), vec![4, 5]);
        let mut reverse = Assets::new();
        reverse.insert("logo.png".to_string(), vec![4, 5]);
        reverse.insert("icon.png".to_string(), vec![1, 2, 3]);

        let a = manifest_bytes(&build_manifest(&forward)).unwrap();
        let b = manifest_bytes(&build_manifest(&reverse)).unwrap();
        assert_eq!(a, b);

        reverse.insert("icon.png".to_string(), vec![1, 2, 4]);
        assert_ne!(a, manifest_bytes(&build_manifest(&reverse)).unwrap());
    }
}
