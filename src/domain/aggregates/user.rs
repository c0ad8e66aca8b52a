//! User Aggregate

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Domain used for placeholder addresses of users who never gave an e-mail.
pub const PLACEHOLDER_EMAIL_DOMAIN: &str = "nayavish.local";

const AVATAR_BASE_URL: &str = "https://api.dicebear.com/7.x/avataaars/svg?seed=";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub avatar: String,
    pub joined_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password_hash: Option<String>,
    /// Plaintext credential found in blobs written before hashing was introduced.
    #[serde(default, rename = "password", skip_serializing)]
    legacy_password: Option<String>,
}

/// Avatar URI derived from a seed; the same seed always yields the same image.
pub fn avatar_for(seed: &str) -> String {
    format!("{AVATAR_BASE_URL}{}", seed.trim().replace(' ', "%20"))
}

impl User {
    fn new(id: String, name: String, email: String, phone: String, address: String, avatar_seed: &str, joined_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name,
            email,
            phone,
            address,
            avatar: avatar_for(avatar_seed),
            joined_at,
            password_hash: None,
            legacy_password: None,
        }
    }

    /// Account created implicitly by a checkout without a session.
    pub fn guest(name: &str, email: Option<&str>, phone: &str, address: &str, now: DateTime<Utc>) -> Self {
        let millis = now.timestamp_millis();
        let email = email
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map_or_else(|| format!("guest-{millis}@{PLACEHOLDER_EMAIL_DOMAIN}"), str::to_string);
        Self::new(format!("user-{millis}"), name.trim().to_string(), email, phone.to_string(), address.trim().to_string(), name, now)
    }

    /// Account created by the sign-up form; the password is hashed immediately.
    pub fn register(name: &str, email: &str, phone: &str, address: &str, password: &str, now: DateTime<Utc>) -> Result<Self, CredentialError> {
        let mut user = Self::new(
            Uuid::now_v7().to_string(),
            name.trim().to_string(),
            email.trim().to_string(),
            phone.to_string(),
            address.trim().to_string(),
            email,
            now,
        );
        user.set_password(password)?;
        Ok(user)
    }

    /// Account created by a first OTP login with an unknown number.
    pub fn from_phone(phone: &str, now: DateTime<Utc>) -> Self {
        Self::new(
            Uuid::now_v7().to_string(),
            format!("Guest-{phone}"),
            format!("{phone}@{PLACEHOLDER_EMAIL_DOMAIN}"),
            phone.to_string(),
            String::new(),
            phone,
            now,
        )
    }

    pub fn matches_email(&self, email: &str) -> bool {
        !email.trim().is_empty() && self.email.eq_ignore_ascii_case(email.trim())
    }

    pub fn matches_phone(&self, phone: &str) -> bool { !phone.is_empty() && self.phone == phone }

    pub fn has_password(&self) -> bool { self.password_hash.is_some() || self.legacy_password.is_some() }

    pub fn set_password(&mut self, password: &str) -> Result<(), CredentialError> {
        self.password_hash = Some(hash_password(password)?);
        self.legacy_password = None;
        Ok(())
    }

    pub fn verify_password(&self, password: &str) -> Result<(), CredentialError> {
        match (&self.password_hash, &self.legacy_password) {
            (Some(hash), _) => verify_password(password, hash),
            (None, Some(plain)) if plain == password => Ok(()),
            (None, Some(_)) => Err(CredentialError::Mismatch),
            (None, None) => Err(CredentialError::NotSet),
        }
    }

    /// Replaces a legacy plaintext credential with a hash. Returns whether anything changed.
    pub fn upgrade_legacy_password(&mut self) -> Result<bool, CredentialError> {
        match self.legacy_password.take() {
            Some(plain) if self.password_hash.is_none() && !plain.is_empty() => {
                self.password_hash = Some(hash_password(&plain)?);
                Ok(true)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, CredentialError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| CredentialError::Hash)
}

fn verify_password(password: &str, hash: &str) -> Result<(), CredentialError> {
    let parsed = PasswordHash::new(hash).map_err(|_| CredentialError::Mismatch)?;
    Argon2::default().verify_password(password.as_bytes(), &parsed).map_err(|_| CredentialError::Mismatch)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("Password does not match")]
    Mismatch,
    #[error("No password set for this account")]
    NotSet,
    #[error("Failed to hash password")]
    Hash,
}
