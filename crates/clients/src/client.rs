use serde::{Deserialize, Serialize};

use comanda_core::error::require_text;
use comanda_core::{ClientId, DomainError, DomainResult, Entity};

/// Client: a customer who places orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    /// Unique across clients.
    pub email: String,
}

impl Entity for Client {
    type Id = ClientId;

    fn id(&self) -> ClientId {
        self.id
    }
}

/// Payload for registering a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClient {
    pub name: String,
    pub email: String,
}

impl NewClient {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        require_text("client name", &self.name)?;
        validate_email(&self.email)
    }
}

/// Partial update of a client; `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl ClientUpdate {
    pub fn validate(&self) -> DomainResult<()> {
        if let Some(name) = &self.name {
            require_text("client name", name)?;
        }
        if let Some(email) = &self.email {
            validate_email(email)?;
        }
        Ok(())
    }
}

/// Validate an email address.
///
/// Accepts exactly one `@` with a non-empty local part, and a domain holding a
/// `.` that is neither its first nor its last character. Whitespace is not
/// allowed anywhere.
pub fn validate_email(email: &str) -> DomainResult<()> {
    let invalid = || DomainError::validation(format!("invalid email address: {email:?}"));

    if email.is_empty() || email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };

    if local.is_empty() {
        return Err(invalid());
    }

    let last = domain.len().saturating_sub(1);
    let dotted = domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i < last);
    if !dotted {
        return Err(invalid());
    }

    Ok(())
}
