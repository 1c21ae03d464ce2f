//! JWT token handling

use crate::config::JwtConfig;
use crate::domain::{BranchAssignment, Identity, StringUuid};
use crate::error::{AppError, Result};
use crate::policy::Role;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

const ACCESS_TOKEN_TYPE: &str = "access";

/// Access token claims. The identity layer packs the actor's structured
/// role data into the token so every request can be authorized without a
/// lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (user ID)
    pub sub: String,
    pub iss: String,
    pub aud: String,
    /// Token type discriminator (prevents token confusion attacks)
    #[serde(default)]
    pub token_type: String,
    /// Legacy flat role
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default)]
    pub system_roles: Vec<Role>,
    #[serde(default)]
    pub task_roles: Vec<Role>,
    #[serde(default)]
    pub branches: Vec<BranchAssignment>,
    #[serde(default)]
    pub access_review_required: bool,
    pub iat: i64,
    pub exp: i64,
}

impl AccessClaims {
    pub fn into_identity(self) -> Result<Identity> {
        let user_id = StringUuid::parse_str(&self.sub)
            .map_err(|_| AppError::Unauthorized("Token subject is not a valid user id".to_string()))?;
        Ok(Identity {
            user_id,
            role: self.role,
            system_roles: self.system_roles,
            task_roles: self.task_roles,
            branch_assignments: self.branches,
            access_review_required: self.access_review_required,
        })
    }
}

/// JWT token manager
#[derive(Clone)]
pub struct JwtManager {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtManager {
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());
        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    fn strict_validation(&self) -> Validation {
        let mut v = Validation::new(Algorithm::HS256);
        v.leeway = 5;
        v.set_issuer(&[&self.config.issuer]);
        v.set_audience(&[&self.config.audience]);
        v
    }

    /// Issue an access token carrying `identity`
    pub fn create_access_token(&self, identity: &Identity) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.config.access_token_ttl_secs);

        let claims = AccessClaims {
            sub: identity.user_id.to_string(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            token_type: ACCESS_TOKEN_TYPE.to_string(),
            role: identity.role,
            system_roles: identity.system_roles.clone(),
            task_roles: identity.task_roles.clone(),
            branches: identity.branch_assignments.clone(),
            access_review_required: identity.access_review_required,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(e.into()))
    }

    /// Verify and decode an access token
    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims> {
        let token_data = decode::<AccessClaims>(token, &self.decoding_key, &self.strict_validation())?;
        if token_data.claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(AppError::Unauthorized(
                "Token is not an access token".to_string(),
            ));
        }
        Ok(token_data.claims)
    }
}
