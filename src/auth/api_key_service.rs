/*!
 * # API Keys Module
 *
 * Issues, validates and revokes the API keys that unlock write access.
 * A key reads `<prefix>.<secret>`; the prefix is stored in clear for lookup,
 * the whole key only as a SHA-256 digest.
 */

use super::api_key::{self, Entity as ApiKey};
use crate::errors::ServiceError;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const KEY_PREFIX_LEN: usize = 8;
pub const KEY_SECRET_LEN: usize = 32;
const MAX_KEY_NAME_LEN: usize = 100;

pub const MISSING_CREDENTIALS: &str = "Authentication credentials were not provided.";
pub const INVALID_CREDENTIALS: &str = "Invalid API key.";

/// Plaintext key returned exactly once, at issue time.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedApiKey {
    pub id: i32,
    pub name: String,
    pub prefix: String,
    pub key: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Database-backed API key store
#[derive(Clone)]
pub struct ApiKeyService {
    db: Arc<DatabaseConnection>,
    header: String,
}

fn random_alphanumeric(len: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Hex SHA-256 digest of the full presented key
pub fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

fn digests_match(a: &str, b: &str) -> bool {
    a.len() == b.len()
        && a
            .bytes()
            .zip(b.bytes())
            .fold(0u8, |acc, (x, y)| acc | (x ^ y))
            == 0
}

impl ApiKeyService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            header: "x-api-key".to_string(),
        }
    }

    /// Name of the extra header that may carry a key.
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into().to_ascii_lowercase();
        self
    }

    pub fn header_name(&self) -> &str {
        &self.header
    }

    /// Create and persist a new key; the plaintext is only available in the result.
    #[instrument(skip(self))]
    pub async fn issue(
        &self,
        name: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<IssuedApiKey, ServiceError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ServiceError::field("name", "This field may not be blank."));
        }
        if name.chars().count() > MAX_KEY_NAME_LEN {
            return Err(ServiceError::field(
                "name",
                format!("Ensure this field has no more than {MAX_KEY_NAME_LEN} characters."),
            ));
        }

        let prefix = random_alphanumeric(KEY_PREFIX_LEN);
        let key = format!("{}.{}", prefix, random_alphanumeric(KEY_SECRET_LEN));
        let now = Utc::now();

        let model = api_key::ActiveModel {
            name: Set(name.to_string()),
            prefix: Set(prefix.clone()),
            key_hash: Set(hash_key(&key)),
            revoked: Set(false),
            expires_at: Set(expires_at),
            created_at: Set(now),
            last_used_at: Set(None),
            ..Default::default()
        }
        .insert(&*self.db)
        .await?;

        info!(prefix = %prefix, "Issued API key {}", model.id);
        Ok(IssuedApiKey {
            id: model.id,
            name: model.name,
            prefix,
            key,
            expires_at: model.expires_at,
            created_at: model.created_at,
        })
    }

    /// Resolve a presented key to its record. Any mismatch, revocation or
    /// expiry is reported as `Forbidden`.
    pub async fn authenticate(&self, presented: &str) -> Result<api_key::Model, ServiceError> {
        let presented = presented.trim();
        let (prefix, _) = presented
            .split_once('.')
            .ok_or_else(|| ServiceError::Forbidden(INVALID_CREDENTIALS.to_string()))?;

        let record = ApiKey::find()
            .filter(api_key::Column::Prefix.eq(prefix))
            .one(&*self.db)
            .await?
            .filter(|record| digests_match(&record.key_hash, &hash_key(presented)))
            .ok_or_else(|| ServiceError::Forbidden(INVALID_CREDENTIALS.to_string()))?;

        if !record.is_usable() {
            warn!(prefix = %record.prefix, revoked = record.revoked, "Rejected unusable API key");
            return Err(ServiceError::Forbidden(INVALID_CREDENTIALS.to_string()));
        }

        // Usage stamp is best effort; a failed write must not block the request.
        if let Err(err) = ApiKey::update_many()
            .col_expr(api_key::Column::LastUsedAt, Expr::value(Utc::now()))
            .filter(api_key::Column::Id.eq(record.id))
            .exec(&*self.db)
            .await
        {
            warn!(prefix = %record.prefix, "Failed to record API key usage: {}", err);
        }

        Ok(record)
    }

    #[instrument(skip(self))]
    pub async fn revoke(&self, prefix: &str) -> Result<api_key::Model, ServiceError> {
        let record = ApiKey::find()
            .filter(api_key::Column::Prefix.eq(prefix))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("API key {} not found", prefix)))?;

        let mut active: api_key::ActiveModel = record.into();
        active.revoked = Set(true);
        let record = active.update(&*self.db).await?;

        info!(prefix = %prefix, "Revoked API key");
        Ok(record)
    }

    pub async fn list(&self) -> Result<Vec<api_key::Model>, ServiceError> {
        ApiKey::find()
            .order_by_asc(api_key::Column::Id)
            .all(&*self.db)
            .await
            .map_err(Into::into)
    }
}
