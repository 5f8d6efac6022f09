// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User accounts: email/password sign-up and Google sign-in.
//!
//! The account email (lowercased) is the user id for every other collection.

use crate::db::{collections, Persisted, RecordStore};
use crate::error::{AppError, Result};
use crate::models::{AuthProvider, UserAccount};
use crate::services::google_identity::GoogleUserInfo;
use chrono::Utc;
use ring::rand::{SecureRandom, SystemRandom};
use ring::{digest, pbkdf2};
use std::num::NonZeroU32;

const PBKDF2_ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = digest::SHA256_OUTPUT_LEN;
const MIN_PASSWORD_LEN: usize = 8;

fn iterations() -> NonZeroU32 {
    NonZeroU32::new(PBKDF2_ITERATIONS).unwrap_or(NonZeroU32::MIN)
}

/// Hash a password as `salt_hex$hash_hex`.
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| anyhow::anyhow!("system RNG unavailable"))?;

    let mut hash = [0u8; HASH_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations(),
        &salt,
        password.as_bytes(),
        &mut hash,
    );

    Ok(format!("{}${}", hex::encode(salt), hex::encode(hash)))
}

/// Constant-time check of `password` against a stored `salt_hex$hash_hex`.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, hash_hex)) = stored.split_once('$') else {
        return false;
    };
    let (Ok(salt), Ok(hash)) = (hex::decode(salt_hex), hex::decode(hash_hex)) else {
        return false;
    };

    pbkdf2::verify(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations(),
        &salt,
        password.as_bytes(),
        &hash,
    )
    .is_ok()
}

/// PBKDF2 is CPU-bound; run it on the blocking pool, not an async worker.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Password task failed: {}", e)))
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(AppError::BadRequest("Invalid email address".to_string())),
    }
}

#[derive(Clone)]
pub struct AccountService {
    store: RecordStore,
}

impl AccountService {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    pub fn get(&self, email: &str) -> Option<UserAccount> {
        self.store
            .load_object(collections::USERS, &email.trim().to_lowercase())
    }

    /// Register a password account. Fails with Conflict if the email is taken.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        display_name: Option<String>,
    ) -> Result<Persisted<UserAccount>> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::BadRequest(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if self.get(&email).is_some() {
            return Err(AppError::Conflict("An account with this email already exists".to_string()));
        }

        let password = password.to_string();
        let password_hash = run_blocking(move || hash_password(&password)).await??;

        let now = Utc::now();
        let account = UserAccount {
            email: email.clone(),
            display_name: display_name.filter(|n| !n.trim().is_empty()),
            password_hash: Some(password_hash),
            auth_provider: AuthProvider::Password,
            created_at: now,
            last_login_at: now,
        };

        let write = self.store.save_object(collections::USERS, &email, &account);
        tracing::info!(user_id = %email, "Account created");
        Ok(Persisted::new(account, write))
    }

    /// Check credentials and stamp `last_login_at`.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Persisted<UserAccount>> {
        let email = normalize_email(email).map_err(|_| AppError::Unauthorized)?;
        let mut account = self.get(&email).ok_or(AppError::Unauthorized)?;

        let valid = match account.password_hash.clone() {
            Some(stored) => {
                let password = password.to_string();
                run_blocking(move || verify_password(&password, &stored)).await?
            }
            None => false,
        };
        if !valid {
            tracing::warn!(user_id = %email, "Failed sign-in");
            return Err(AppError::Unauthorized);
        }

        account.last_login_at = Utc::now();
        let write = self.store.save_object(collections::USERS, &email, &account);
        Ok(Persisted::new(account, write))
    }

    /// Create or refresh the account behind a verified Google identity.
    ///
    /// An existing password account keeps its hash, so either method works.
    pub fn sign_in_with_google(&self, info: &GoogleUserInfo) -> Result<Persisted<UserAccount>> {
        let email = normalize_email(&info.email)?;
        let now = Utc::now();

        let account = match self.get(&email) {
            Some(mut existing) => {
                existing.last_login_at = now;
                if existing.display_name.is_none() {
                    existing.display_name = info.name.clone();
                }
                existing
            }
            None => {
                tracing::info!(user_id = %email, "Account created via Google");
                UserAccount {
                    email: email.clone(),
                    display_name: info.name.clone(),
                    password_hash: None,
                    auth_provider: AuthProvider::Google,
                    created_at: now,
                    last_login_at: now,
                }
            }
        };

        let write = self.store.save_object(collections::USERS, &email, &account);
        Ok(Persisted::new(account, write))
    }
}
