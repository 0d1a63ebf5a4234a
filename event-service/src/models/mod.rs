use alumni_shared::models::{Fee, RegistrationPolicy};
use chrono::{DateTime, Utc};
use serde::Deserialize;

// Request DTOs
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default)]
    pub registration: Option<RegistrationPolicy>,
}

impl CreateEventRequest {
    /// Checks field values that serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Event title must not be empty".into());
        }

        if self.ends_at <= self.starts_at {
            return Err("Event must end after it starts".into());
        }

        if self.capacity == Some(0) {
            return Err("Capacity must be at least 1 when set".into());
        }

        if let Some(policy) = &self.registration {
            if let Some(deadline) = policy.deadline {
                if deadline > self.starts_at {
                    return Err("Registration deadline must not be after the event starts".into());
                }
            }
            if let Some(fee) = &policy.fee {
                validate_fee(fee)?;
            }
        }

        Ok(())
    }
}

fn validate_fee(fee: &Fee) -> Result<(), String> {
    if fee.currency.len() != 3 || !fee.currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(format!(
            "Invalid fee currency '{}'. Expected a three-letter ISO code",
            fee.currency
        ));
    }
    Ok(())
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PayRegistrationRequest {
    pub payment_token: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPushTokenRequest {
    pub push_token: String,
    pub platform: String,
}
