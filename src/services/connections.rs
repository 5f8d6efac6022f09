// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Email connection registry (one connection per user and provider).

use crate::db::{collections, Persisted, RecordStore};
use crate::error::{AppError, Result};
use crate::models::{EmailConnection, MailProvider, ScanOutcome};
use chrono::{DateTime, Utc};

/// New or refreshed provider credentials.
#[derive(Debug, Clone)]
pub struct ConnectionCredentials {
    pub provider: MailProvider,
    pub email: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct EmailConnectionRegistry {
    store: RecordStore,
}

impl EmailConnectionRegistry {
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// All connections for a user, connected or not.
    pub fn list(&self, user_id: &str) -> Vec<EmailConnection> {
        self.store.list(collections::EMAIL_CONNECTIONS, user_id)
    }

    pub fn get(&self, user_id: &str, id: &str) -> Option<EmailConnection> {
        self.list(user_id).into_iter().find(|c| c.id == id)
    }

    /// Connected connection for `provider`, if any.
    pub fn get_by_provider(&self, user_id: &str, provider: MailProvider) -> Option<EmailConnection> {
        self.list(user_id)
            .into_iter()
            .find(|c| c.provider == provider && c.connected)
    }

    /// Access token for `provider` if it is connected and unexpired.
    pub fn valid_credential(&self, user_id: &str, provider: MailProvider) -> Option<String> {
        let now = Utc::now();
        self.get_by_provider(user_id, provider)
            .filter(|c| c.has_valid_credential(now))
            .map(|c| c.access_token)
    }

    /// Whether any provider holds a usable credential.
    pub fn has_valid_credential(&self, user_id: &str) -> bool {
        let now = Utc::now();
        self.list(user_id).iter().any(|c| c.has_valid_credential(now))
    }

    pub fn connected_count(&self, user_id: &str) -> u32 {
        self.list(user_id).iter().filter(|c| c.connected).count() as u32
    }

    /// Create the connection for (user, provider) or overwrite its credentials.
    pub fn upsert_connection(
        &self,
        user_id: &str,
        credentials: ConnectionCredentials,
    ) -> Persisted<EmailConnection> {
        let now = Utc::now();
        let mut connections = self.list(user_id);

        let connection = match connections
            .iter_mut()
            .find(|c| c.provider == credentials.provider)
        {
            Some(existing) => {
                existing.email = credentials.email;
                existing.access_token = credentials.access_token;
                existing.refresh_token = credentials.refresh_token;
                existing.token_expires_at = credentials.token_expires_at;
                existing.connected = true;
                existing.updated_at = now;
                tracing::info!(user_id, provider = ?existing.provider, "Refreshed email connection");
                existing.clone()
            }
            None => {
                let created = EmailConnection {
                    id: uuid::Uuid::new_v4().to_string(),
                    user_id: user_id.to_string(),
                    provider: credentials.provider,
                    email: credentials.email,
                    access_token: credentials.access_token,
                    refresh_token: credentials.refresh_token,
                    token_expires_at: credentials.token_expires_at,
                    connected: true,
                    last_scanned_at: None,
                    last_scan_status: None,
                    last_scan_error: None,
                    created_at: now,
                    updated_at: now,
                };
                tracing::info!(user_id, provider = ?created.provider, "Created email connection");
                connections.push(created.clone());
                created
            }
        };

        let write = self
            .store
            .save(collections::EMAIL_CONNECTIONS, user_id, &connections);
        Persisted::new(connection, write)
    }

    /// Set the connected flag. Tokens are kept and not revoked with the provider.
    pub fn toggle(
        &self,
        user_id: &str,
        id: &str,
        connected: bool,
    ) -> Result<Persisted<EmailConnection>> {
        self.modify(user_id, id, |c| c.connected = connected)
    }

    /// Record the outcome of a scan on the connection.
    pub fn record_scan_result(
        &self,
        user_id: &str,
        id: &str,
        status: ScanOutcome,
        error: Option<String>,
    ) -> Result<Persisted<EmailConnection>> {
        self.modify(user_id, id, |c| {
            c.last_scanned_at = Some(Utc::now());
            c.last_scan_status = Some(status);
            c.last_scan_error = error;
        })
    }

    /// Remove the connection entirely.
    pub fn disconnect(&self, user_id: &str, id: &str) -> Result<Persisted<EmailConnection>> {
        let mut connections = self.list(user_id);
        let idx = connections
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Email connection {}", id)))?;

        let removed = connections.remove(idx);
        tracing::info!(user_id, provider = ?removed.provider, "Disconnected email account");

        let write = self
            .store
            .save(collections::EMAIL_CONNECTIONS, user_id, &connections);
        Ok(Persisted::new(removed, write))
    }

    fn modify(
        &self,
        user_id: &str,
        id: &str,
        f: impl FnOnce(&mut EmailConnection),
    ) -> Result<Persisted<EmailConnection>> {
        let mut connections = self.list(user_id);
        let connection = connections
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| AppError::NotFound(format!("Email connection {}", id)))?;

        f(connection);
        connection.updated_at = Utc::now();
        let updated = connection.clone();

        let write = self
            .store
            .save(collections::EMAIL_CONNECTIONS, user_id, &connections);
        Ok(Persisted::new(updated, write))
    }
}
