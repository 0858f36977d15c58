use serde::{Deserialize, Serialize};

use travel_core::{ClientId, DomainError, DomainResult, Entity, ValueObject};

/// Required length of a PESEL number.
pub const PESEL_LEN: usize = 11;

/// E-mail address of a client. Always non-blank and contains `@`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        if raw.trim().is_empty() {
            return Err(DomainError::validation("email is required"));
        }
        if !raw.contains('@') {
            return Err(DomainError::validation("email must contain '@'"));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for Email {}

impl core::fmt::Display for Email {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Polish national identification number (fixed length, not checksummed).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Pesel(String);

impl Pesel {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        if raw.chars().count() != PESEL_LEN {
            return Err(DomainError::validation(format!(
                "pesel must be exactly {PESEL_LEN} characters"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// Length is checked first; a blank value of the right length is treated as absent.
    pub fn parse_optional(raw: Option<&str>) -> DomainResult<Option<Self>> {
        match raw {
            None => Ok(None),
            Some(raw) => {
                let pesel = Self::parse(raw)?;
                if raw.trim().is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(pesel))
                }
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for Pesel {}

/// Client data as submitted by a caller, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClient {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub telephone: Option<String>,
    pub pesel: Option<String>,
}

impl NewClient {
    /// Convenience constructor for the required fields only.
    pub fn minimal(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            telephone: None,
            pesel: None,
        }
    }

    pub fn with_telephone(mut self, telephone: impl Into<String>) -> Self {
        self.telephone = Some(telephone.into());
        self
    }

    pub fn with_pesel(mut self, pesel: impl Into<String>) -> Self {
        self.pesel = Some(pesel.into());
        self
    }

    /// Validate and normalize the submitted data.
    ///
    /// Checks run in field order and the first failure is returned.
    pub fn validate(self) -> DomainResult<ValidClient> {
        if self.first_name.trim().is_empty() {
            return Err(DomainError::validation("first name is required"));
        }
        if self.last_name.trim().is_empty() {
            return Err(DomainError::validation("last name is required"));
        }
        let email = Email::parse(&self.email)?;
        let pesel = Pesel::parse_optional(self.pesel.as_deref())?;
        let telephone = self.telephone.filter(|t| !t.trim().is_empty());

        Ok(ValidClient {
            first_name: self.first_name,
            last_name: self.last_name,
            email,
            telephone,
            pesel,
        })
    }
}

/// Client data that passed validation and is ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidClient {
    first_name: String,
    last_name: String,
    email: Email,
    telephone: Option<String>,
    pesel: Option<Pesel>,
}

impl ValidClient {
    pub fn first_name(&self) -> &str {
        &self.first_name
    }

    pub fn last_name(&self) -> &str {
        &self.last_name
    }

    pub fn email(&self) -> &Email {
        &self.email
    }

    pub fn telephone(&self) -> Option<&str> {
        self.telephone.as_deref()
    }

    pub fn pesel(&self) -> Option<&Pesel> {
        self.pesel.as_ref()
    }
}

/// A persisted client. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Client {
    id: ClientId,
    #[serde(flatten)]
    details: ValidClient,
}

impl Client {
    pub fn new(id: ClientId, details: ValidClient) -> Self {
        Self { id, details }
    }

    pub fn id_typed(&self) -> ClientId {
        self.id
    }

    pub fn details(&self) -> &ValidClient {
        &self.details
    }
}

impl Entity for Client {
    type Id = ClientId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
