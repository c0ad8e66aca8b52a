//! Identity resolution: password login, sign-up, OTP login, checkout guests
//! and the admin console login.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::{Validate, ValidationErrors};

use crate::domain::aggregates::user::{CredentialError, User};
use crate::domain::value_objects::{validate_phone, ContactError, Email, Phone};

pub const OTP_LENGTH: usize = 6;
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@nayavish.com";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";
pub const OTP_RESEND_AFTER_SECS: i64 = 30;

/// How a submitted one-time code is checked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpVerification {
    /// Any six-digit input is accepted; delivery is simulated.
    #[default]
    Simulated,
    /// The input must equal the issued code.
    Strict,
}

impl FromStr for OtpVerification {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simulated" => Ok(Self::Simulated),
            "strict" => Ok(Self::Strict),
            other => Err(format!("unknown otp mode `{other}`")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtpPurpose {
    Login,
    Recovery,
}

/// A code sent to a phone and awaiting verification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OtpChallenge {
    phone: Phone,
    code: String,
    purpose: OtpPurpose,
    issued_at: DateTime<Utc>,
}

impl OtpChallenge {
    pub fn issue(phone: Phone, purpose: OtpPurpose, now: DateTime<Utc>) -> Self {
        let code = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
        Self { phone, code, purpose, issued_at: now }
    }

    pub fn phone(&self) -> &Phone { &self.phone }
    pub fn purpose(&self) -> OtpPurpose { self.purpose }
    pub fn code(&self) -> &str { &self.code }

    pub fn sms_text(&self, store_name: &str) -> String {
        match self.purpose {
            OtpPurpose::Login => format!("Your {store_name} verification code is {}.", self.code),
            OtpPurpose::Recovery => format!("Verification code for account recovery: {}", self.code),
        }
    }

    /// Digits separated by spaces so a voice gateway reads them one by one.
    pub fn spoken_code(&self) -> String {
        self.code.chars().map(String::from).collect::<Vec<_>>().join(" ")
    }

    pub fn can_resend(&self, now: DateTime<Utc>) -> bool {
        now - self.issued_at >= Duration::seconds(OTP_RESEND_AFTER_SECS)
    }

    pub fn accepts(&self, input: &str, policy: OtpVerification) -> bool {
        let input = input.trim();
        let well_formed = input.len() == OTP_LENGTH && input.chars().all(|c| c.is_ascii_digit());
        match policy {
            OtpVerification::Simulated => well_formed,
            OtpVerification::Strict => well_formed && input == self.code,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct SignUpRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Valid email required"))]
    pub email: String,
    #[validate(custom = "validate_phone")]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Credentials of the admin console, kept apart from customer accounts.
#[derive(Clone)]
pub struct AdminCredentials {
    pub email: String,
    pub password: String,
}

impl fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredentials").field("email", &self.email).finish_non_exhaustive()
    }
}

impl Default for AdminCredentials {
    fn default() -> Self {
        Self { email: DEFAULT_ADMIN_EMAIL.into(), password: DEFAULT_ADMIN_PASSWORD.into() }
    }
}

impl AdminCredentials {
    pub fn verify(&self, email: &str, password: &str) -> Result<(), AuthError> {
        Email::parse(email)?;
        if self.email.eq_ignore_ascii_case(email.trim()) && self.password == password {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

/// A user found in, or newly added to, the users collection.
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Existing(User),
    Created(User),
}

impl Resolution {
    pub fn user(&self) -> &User {
        match self { Self::Existing(u) | Self::Created(u) => u }
    }
    pub fn into_user(self) -> User {
        match self { Self::Existing(u) | Self::Created(u) => u }
    }
    pub fn is_new(&self) -> bool { matches!(self, Self::Created(_)) }
}

#[derive(Clone, Debug, PartialEq)]
pub enum OtpOutcome {
    LoggedIn(Resolution),
    RecoveryVerified { phone: Phone },
}

/// Lookups over the registered users.
pub struct IdentityResolver<'a> {
    users: &'a [User],
}

impl<'a> IdentityResolver<'a> {
    pub fn new(users: &'a [User]) -> Self { Self { users } }

    pub fn find_by_email(&self, email: &str) -> Option<&'a User> { self.users.iter().find(|u| u.matches_email(email)) }
    pub fn find_by_phone(&self, phone: &str) -> Option<&'a User> { self.users.iter().find(|u| u.matches_phone(phone)) }

    pub fn login_with_password(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let email = Email::parse(email)?;
        let user = self.find_by_email(email.as_str()).ok_or(AuthError::NotFound)?;
        user.verify_password(password).map_err(|_| AuthError::InvalidCredentials)?;
        Ok(user.clone())
    }

    pub fn sign_up(&self, request: &SignUpRequest, now: DateTime<Utc>) -> Result<User, AuthError> {
        request.validate()?;
        let phone = Phone::parse(&request.phone)?;
        if self.find_by_email(&request.email).is_some() || self.find_by_phone(phone.as_str()).is_some() {
            return Err(AuthError::AlreadyRegistered);
        }
        Ok(User::register(&request.name, &request.email, phone.as_str(), &request.address, &request.password, now)?)
    }

    pub fn verify_otp(&self, challenge: &OtpChallenge, input: &str, policy: OtpVerification, now: DateTime<Utc>) -> Result<OtpOutcome, AuthError> {
        if !challenge.accepts(input, policy) {
            return Err(AuthError::InvalidOtp);
        }
        let phone = challenge.phone();
        Ok(match challenge.purpose() {
            OtpPurpose::Recovery => OtpOutcome::RecoveryVerified { phone: phone.clone() },
            OtpPurpose::Login => OtpOutcome::LoggedIn(match self.find_by_phone(phone.as_str()) {
                Some(user) => Resolution::Existing(user.clone()),
                None => Resolution::Created(User::from_phone(phone.as_str(), now)),
            }),
        })
    }

    /// Matches a checkout without a session to an account by e-mail or phone,
    /// creating a guest account when neither is known.
    pub fn resolve_checkout(&self, name: &str, email: Option<&str>, phone: &str, address: &str, now: DateTime<Utc>) -> Resolution {
        let email = email.map(str::trim).filter(|e| !e.is_empty());
        let existing = self
            .users
            .iter()
            .find(|u| email.is_some_and(|e| u.matches_email(e)) || u.matches_phone(phone));
        match existing {
            Some(user) => Resolution::Existing(user.clone()),
            None => Resolution::Created(User::guest(name, email, phone, address, now)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("Account not found with this email")]
    NotFound,
    #[error("Incorrect credentials")]
    InvalidCredentials,
    #[error("User already registered")]
    AlreadyRegistered,
    #[error("Invalid verification code")]
    InvalidOtp,
    #[error("No verification code has been requested")]
    NoPendingOtp,
    #[error("Please wait before requesting another code")]
    ResendTooSoon,
    #[error("A verification code is already being sent")]
    SendInProgress,
    #[error(transparent)]
    Credential(#[from] CredentialError),
}

impl From<ContactError> for AuthError {
    fn from(e: ContactError) -> Self { Self::Validation(e.to_string()) }
}

impl From<ValidationErrors> for AuthError {
    fn from(e: ValidationErrors) -> Self { Self::Validation(e.to_string()) }
}
