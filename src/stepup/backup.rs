//! Single-use backup codes for step-up.

use sha2::{Digest, Sha256};

/// No 0, O, 1, I to avoid confusion
const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// A freshly generated set of backup codes.
///
/// `codes` is shown to the operator once; only `hashes` are stored.
#[derive(Clone, Debug)]
pub struct BackupCodes {
    pub codes: Vec<String>,
    pub hashes: Vec<String>,
}

impl BackupCodes {
    /// Format codes for display to the operator (grouped for readability).
    pub fn display_codes(&self) -> Vec<String> {
        self.codes
            .iter()
            .map(|c| {
                if c.len() >= 8 {
                    format!("{}-{}", &c[..4], &c[4..])
                } else {
                    c.clone()
                }
            })
            .collect()
    }
}

/// Generates cryptographically secure backup codes.
#[derive(Clone, Debug)]
pub struct BackupCodeGenerator {
    /// Number of codes to generate (default: 10).
    pub count: usize,
    /// Length of each code (default: 8).
    pub length: usize,
}

impl Default for BackupCodeGenerator {
    fn default() -> Self {
        Self {
            count: 10,
            length: 8,
        }
    }
}

impl BackupCodeGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    pub fn with_length(mut self, length: usize) -> Self {
        self.length = length;
        self
    }

    /// Generate a new set of backup codes with their storage digests.
    pub fn generate(&self) -> BackupCodes {
        use rand::Rng;

        let mut rng = rand::rngs::OsRng;
        let codes: Vec<String> = (0..self.count)
            .map(|_| {
                (0..self.length)
                    .map(|_| {
                        let idx = rng.gen_range(0..CHARSET.len());
                        CHARSET[idx] as char
                    })
                    .collect()
            })
            .collect();
        let hashes = codes.iter().map(|c| hash_backup_code(c)).collect();

        BackupCodes { codes, hashes }
    }
}

/// Canonical form of a typed code: separators removed, uppercased.
///
/// Returns `None` for input that cannot be a backup code.
pub fn normalize_backup_code(code: &str) -> Option<String> {
    let normalized: String = code
        .chars()
        .filter(|c| !matches!(c, '-' | ' '))
        .collect::<String>()
        .to_uppercase();
    (!normalized.is_empty() && normalized.bytes().all(|b| CHARSET.contains(&b)))
        .then_some(normalized)
}

/// Hex SHA-256 digest of a backup code, after normalization.
pub fn hash_backup_code(code: &str) -> String {
    let normalized = normalize_backup_code(code).unwrap_or_else(|| code.to_string());
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_codes() {
        let codes = BackupCodeGenerator::new().generate();

        assert_eq!(codes.codes.len(), 10);
        assert_eq!(codes.hashes.len(), 10);
        assert!(codes.codes.iter().all(|c| c.len() == 8));
        assert!(codes.hashes.iter().all(|h| h.len() == 64));
    }

    #[test]
    fn test_hash_ignores_formatting() {
        let codes = BackupCodeGenerator::new().generate();
        let code = &codes.codes[0];
        let with_dash = format!("{}-{}", &code[..4], &code[4..]);

        assert_eq!(hash_backup_code(&with_dash), codes.hashes[0]);
        assert_eq!(hash_backup_code(&code.to_lowercase()), codes.hashes[0]);
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_backup_code("").is_none());
        assert!(normalize_backup_code(" - ").is_none());
        // 0 and 1 are not in the alphabet
        assert!(normalize_backup_code("ABCD0123").is_none());
        assert_eq!(normalize_backup_code("abcd-2345").as_deref(), Some("ABCD2345"));
    }

    #[test]
    fn test_display_codes() {
        let codes = BackupCodes {
            codes: vec!["ABCD2345".to_string()],
            hashes: vec![],
        };
        assert_eq!(codes.display_codes(), vec!["ABCD-2345"]);
    }

    #[test]
    fn test_custom_settings() {
        let codes = BackupCodeGenerator::new().with_count(5).with_length(10).generate();
        assert_eq!(codes.codes.len(), 5);
        assert!(codes.codes.iter().all(|c| c.len() == 10));
    }
}
