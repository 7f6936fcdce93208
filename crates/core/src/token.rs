use crate::worker::Role;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A short-lived, use-count-capped token that authorizes worker registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinToken {
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_by: String,
    pub role_to_grant: Role,
    pub max_uses: u32,
    pub uses: u32,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenValidity {
    Ok,
    Invalid,
    Revoked,
    Expired,
    Exhausted,
}

impl JoinToken {
    #[must_use]
    pub fn check(&self, now: DateTime<Utc>) -> TokenValidity {
        if !self.is_active {
            return TokenValidity::Revoked;
        }
        if now > self.expires_at {
            return TokenValidity::Expired;
        }
        if self.uses >= self.max_uses {
            return TokenValidity::Exhausted;
        }
        TokenValidity::Ok
    }
}
