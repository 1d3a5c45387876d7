use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use super::CryptoError;

#[cfg(not(test))]
pub const PBKDF2_ITERATIONS: u32 = 600_000;
#[cfg(test)]
pub const PBKDF2_ITERATIONS: u32 = 1_000;
pub const HASH_LENGTH: usize = 32;
pub const SALT_LENGTH: usize = 32;

const SCHEME: &str = "pbkdf2-sha256";

/// Derived password bytes, zeroed on drop.
#[derive(Zeroize)]
#[zeroize(drop)]
struct DerivedKey([u8; HASH_LENGTH]);

impl DerivedKey {
    fn derive(password: &str, salt: &[u8], iterations: u32) -> Self {
        let mut bytes = [0u8; HASH_LENGTH];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, iterations, &mut bytes);
        Self(bytes)
    }
}

/// Generate a cryptographically random salt
pub fn generate_salt() -> [u8; SALT_LENGTH] {
    use rand::RngCore;
    let mut salt = [0u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Hash a password as `pbkdf2-sha256$<iterations>$<salt>$<hash>` (base64, no padding).
pub fn hash_password(password: &str) -> String {
    let salt = generate_salt();
    let key = DerivedKey::derive(password, &salt, PBKDF2_ITERATIONS);
    format!(
        "{SCHEME}${PBKDF2_ITERATIONS}${}${}",
        STANDARD_NO_PAD.encode(salt),
        STANDARD_NO_PAD.encode(key.0)
    )
}

/// Check `password` against a stored hash in constant time.
///
/// The iteration count is read from the stored value, so hashes written
/// with an older count keep verifying.
pub fn verify_password(password: &str, stored: &str) -> Result<(), CryptoError> {
    let mut parts = stored.split('$');
    let (Some(SCHEME), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(CryptoError::MalformedHash);
    };

    let iterations: u32 = iterations.parse().map_err(|_| CryptoError::MalformedHash)?;
    let salt = STANDARD_NO_PAD
        .decode(salt)
        .map_err(|_| CryptoError::MalformedHash)?;
    let expected = STANDARD_NO_PAD
        .decode(expected)
        .map_err(|_| CryptoError::MalformedHash)?;
    if iterations == 0 || expected.len() != HASH_LENGTH {
        return Err(CryptoError::MalformedHash);
    }

    let key = DerivedKey::derive(password, &salt, iterations);
    if bool::from(key.0[..].ct_eq(&expected[..])) {
        Ok(())
    } else {
        Err(CryptoError::WrongPassword)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let stored = hash_password("correct horse");
        assert!(stored.starts_with("pbkdf2-sha256$1000$"));
        assert!(verify_password("correct horse", &stored).is_ok());
    }

    #[test]
    fn wrong_password_is_rejected() {
        let stored = hash_password("correct horse");
        assert!(matches!(
            verify_password("battery staple", &stored),
            Err(CryptoError::WrongPassword)
        ));
    }

    #[test]
    fn same_password_gets_different_salts() {
        assert_ne!(hash_password("pw123456"), hash_password("pw123456"));
    }

    #[test]
    fn malformed_hashes_are_rejected() {
        for stored in ["", "plain", "bcrypt$10$abc$def", "pbkdf2-sha256$x$c2FsdA$aGFzaA"] {
            assert!(matches!(
                verify_password("pw", stored),
                Err(CryptoError::MalformedHash)
            ));
        }
    }

    #[test]
    fn generate_salt_is_random() {
        assert_ne!(generate_salt(), generate_salt());
    }
}
