//! Salted password digests.
//!
//! The stored value is `hex(sha256(plaintext ++ salt))` where the salt is an
//! existing business field of the same row (usually `email`). No random salt is
//! generated, so two rows with the same password and salt field share a digest.
//! This is kept for compatibility with existing stored hashes.

use crate::error::{CompileError, CompileResult};
use crate::spec::{CredentialOptions, Record};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hash a password with its salt.
///
/// Both inputs must be non-empty.
pub fn hash_password(plain: &str, salt: &str, salt_field: &str) -> CompileResult<String> {
    if plain.is_empty() || salt.is_empty() {
        return Err(CompileError::MissingSalt {
            salt_field: salt_field.to_string(),
        });
    }
    let mut hasher = Sha256::new();
    hasher.update(plain.as_bytes());
    hasher.update(salt.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Compare a plaintext password against a stored digest.
pub fn verify_password(plain: &str, salt: &str, stored: &str) -> bool {
    match hash_password(plain, salt, "") {
        Ok(digest) => digest.eq_ignore_ascii_case(stored),
        Err(_) => false,
    }
}

/// Text form of a salt value as found in a record.
pub(crate) fn salt_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Whether `record` carries a password that must be hashed.
pub(crate) fn has_password(record: &Record, opts: &CredentialOptions) -> bool {
    opts.hash_password
        && record
            .get(&opts.password_field)
            .is_some_and(|v| !v.is_null() && v.as_str() != Some(""))
}

/// Replace the password field of `record` with its digest.
///
/// `salt` overrides the record's own salt field. Records without a password
/// are left unchanged.
pub(crate) fn apply_credentials(
    record: &mut Record,
    opts: &CredentialOptions,
    salt: Option<&str>,
) -> CompileResult<()> {
    if !has_password(record, opts) {
        return Ok(());
    }

    let salt = match salt {
        Some(s) => Some(s.to_string()),
        None => record.get(&opts.salt_field).and_then(salt_text),
    }
    .ok_or_else(|| CompileError::MissingSalt {
        salt_field: opts.salt_field.clone(),
    })?;

    let plain = match record.get(&opts.password_field) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => return Ok(()),
    };

    let digest = hash_password(&plain, &salt, &opts.salt_field)?;
    record.insert(opts.password_field.clone(), Value::String(digest));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> Record {
        match v {
            Value::Object(m) => m,
            _ => panic!("record must be an object"),
        }
    }

    #[test]
    fn deterministic_and_salt_dependent() {
        let a1 = hash_password("secret", "a@x.com", "email").unwrap();
        let a2 = hash_password("secret", "a@x.com", "email").unwrap();
        let b = hash_password("secret", "b@x.com", "email").unwrap();
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert_eq!(a1.len(), 64);
    }

    #[test]
    fn known_digest() {
        // sha256("abc")
        assert_eq!(
            hash_password("a", "bc", "email").unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn empty_inputs_are_rejected() {
        assert_eq!(
            hash_password("", "a@x.com", "email").unwrap_err(),
            CompileError::MissingSalt {
                salt_field: "email".into()
            }
        );
        assert!(hash_password("secret", "", "email").is_err());
    }

    #[test]
    fn verify_matches_digest() {
        let stored = hash_password("secret", "a@x.com", "email").unwrap();
        assert!(verify_password("secret", "a@x.com", &stored));
        assert!(!verify_password("wrong", "a@x.com", &stored));
        assert!(!verify_password("secret", "", &stored));
    }

    #[test]
    fn apply_uses_record_salt() {
        let mut r = record(json!({"email": "a@x.com", "password": "secret"}));
        apply_credentials(&mut r, &CredentialOptions::hashed(), None).unwrap();
        assert_eq!(
            r["password"],
            json!(hash_password("secret", "a@x.com", "email").unwrap())
        );
    }

    #[test]
    fn apply_without_salt_fails() {
        let mut r = record(json!({"password": "secret"}));
        let err = apply_credentials(&mut r, &CredentialOptions::hashed(), None).unwrap_err();
        assert_eq!(err.field(), "email");
    }

    #[test]
    fn apply_skips_when_disabled_or_absent() {
        let mut r = record(json!({"email": "a@x.com", "password": "secret"}));
        apply_credentials(&mut r, &CredentialOptions::default(), None).unwrap();
        assert_eq!(r["password"], json!("secret"));

        let mut r = record(json!({"email": "a@x.com"}));
        apply_credentials(&mut r, &CredentialOptions::hashed(), None).unwrap();
        assert!(!r.contains_key("password"));
    }

    #[test]
    fn explicit_salt_overrides_record() {
        let opts = CredentialOptions::hashed().salt_field("phone");
        let mut r = record(json!({"password": "secret"}));
        apply_credentials(&mut r, &opts, Some("555-0100")).unwrap();
        assert_eq!(
            r["password"],
            json!(hash_password("secret", "555-0100", "phone").unwrap())
        );
    }
}
