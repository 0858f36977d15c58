use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use travel_core::{DomainError, DomainResult, Entity, TripId};

/// Country visited by a trip (display only).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Country {
    pub name: String,
}

impl Country {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A bookable trip with a fixed capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: TripId,
    pub name: String,
    pub description: Option<String>,
    pub date_from: DateTime<Utc>,
    pub date_to: DateTime<Utc>,
    /// Capacity: upper bound on live registrations.
    pub max_people: u32,
    #[serde(default)]
    pub countries: Vec<Country>,
}

impl Trip {
    /// Sanity checks for trip records coming from outside the core.
    pub fn validate(&self) -> DomainResult<()> {
        if self.name.trim().is_empty() {
            return Err(DomainError::validation("trip name cannot be empty"));
        }
        if self.date_to < self.date_from {
            return Err(DomainError::invariant(format!(
                "trip {} ends before it starts",
                self.id
            )));
        }
        Ok(())
    }

    pub fn with_countries(mut self, countries: impl IntoIterator<Item = Country>) -> Self {
        self.countries = countries.into_iter().collect();
        self
    }
}

impl Entity for Trip {
    type Id = TripId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
