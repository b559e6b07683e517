//! The persisted form of a provisioned backend.

use crate::endpoint::Endpoint;
use crate::key::ResourceKey;
use crate::store::Fields;

use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

pub const FIELD_KEY: &str = "key";
pub const FIELD_SD_MODEL: &str = "sd_model";
pub const FIELD_SD_VAE: &str = "sd_vae";
pub const FIELD_ENDPOINT: &str = "endpoint";
pub const FIELD_CREATE_TIME: &str = "create_time";
pub const FIELD_LAST_MODIFY_TIME: &str = "last_modify_time";

/// Every column of a record.
pub const ALL_FIELDS: &[&str] = &[
    FIELD_KEY,
    FIELD_SD_MODEL,
    FIELD_SD_VAE,
    FIELD_ENDPOINT,
    FIELD_CREATE_TIME,
    FIELD_LAST_MODIFY_TIME,
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("Record is missing field {0:?}")]
    MissingField(&'static str),

    #[error("Record field {field:?} is not a timestamp: {value:?}")]
    BadTimestamp { field: &'static str, value: String },
}

/// A backend which has been provisioned for a [ResourceKey].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointRecord {
    pub key: ResourceKey,
    pub sd_model: String,
    pub sd_vae: String,
    pub endpoint: Endpoint,
    /// Seconds since the UNIX epoch.
    pub create_time: u64,
    /// Seconds since the UNIX epoch.
    pub last_modify_time: u64,
}

impl EndpointRecord {
    /// Creates a record for a backend provisioned at `now`.
    pub fn new(sd_model: &str, sd_vae: &str, endpoint: Endpoint, now: u64) -> Self {
        Self {
            key: ResourceKey::new(sd_model, sd_vae),
            sd_model: sd_model.to_string(),
            sd_vae: sd_vae.to_string(),
            endpoint,
            create_time: now,
            last_modify_time: now,
        }
    }

    pub fn to_fields(&self) -> Fields {
        Fields::from([
            (FIELD_KEY.to_string(), self.key.to_string()),
            (FIELD_SD_MODEL.to_string(), self.sd_model.clone()),
            (FIELD_SD_VAE.to_string(), self.sd_vae.clone()),
            (FIELD_ENDPOINT.to_string(), self.endpoint.to_string()),
            (FIELD_CREATE_TIME.to_string(), self.create_time.to_string()),
            (
                FIELD_LAST_MODIFY_TIME.to_string(),
                self.last_modify_time.to_string(),
            ),
        ])
    }

    pub fn from_fields(fields: &Fields) -> Result<Self, Error> {
        Ok(Self {
            key: ResourceKey::from(required(fields, FIELD_KEY)?),
            sd_model: required(fields, FIELD_SD_MODEL)?.to_string(),
            sd_vae: required(fields, FIELD_SD_VAE)?.to_string(),
            endpoint: Endpoint::from(required(fields, FIELD_ENDPOINT)?),
            create_time: timestamp(fields, FIELD_CREATE_TIME)?,
            last_modify_time: timestamp(fields, FIELD_LAST_MODIFY_TIME)?,
        })
    }
}

fn required<'a>(fields: &'a Fields, field: &'static str) -> Result<&'a str, Error> {
    fields
        .get(field)
        .map(String::as_str)
        .ok_or(Error::MissingField(field))
}

fn timestamp(fields: &Fields, field: &'static str) -> Result<u64, Error> {
    let value = required(fields, field)?;
    value.parse().map_err(|_| Error::BadTimestamp {
        field,
        value: value.to_string(),
    })
}

/// Seconds since the UNIX epoch.
pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fields_use_flat_string_columns() {
        let record = EndpointRecord::new("sd15", "vae-ft", Endpoint::from("https://e/"), 1700000000);
        let fields = record.to_fields();
        assert_eq!(fields.len(), ALL_FIELDS.len());
        assert_eq!(fields[FIELD_KEY], "sd15:vae-ft");
        assert_eq!(fields[FIELD_CREATE_TIME], "1700000000");
        assert_eq!(EndpointRecord::from_fields(&fields).unwrap(), record);
    }

    #[test]
    fn missing_endpoint_is_rejected() {
        let mut fields = EndpointRecord::new("a", "b", Endpoint::from("https://e/"), 1).to_fields();
        fields.remove(FIELD_ENDPOINT);
        assert_eq!(
            EndpointRecord::from_fields(&fields),
            Err(Error::MissingField(FIELD_ENDPOINT))
        );
    }

    #[test]
    fn non_numeric_timestamp_is_rejected() {
        let mut fields = EndpointRecord::new("a", "b", Endpoint::from("https://e/"), 1).to_fields();
        fields.insert(FIELD_LAST_MODIFY_TIME.to_string(), "yesterday".to_string());
        assert!(matches!(
            EndpointRecord::from_fields(&fields),
            Err(Error::BadTimestamp { field: FIELD_LAST_MODIFY_TIME, .. })
        ));
    }
}
