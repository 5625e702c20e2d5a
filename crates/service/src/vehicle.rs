use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use workshop_core::{CustomerId, DomainError, DomainResult, Entity, UserId, VehicleId};

pub const UNKNOWN_MODEL: &str = "Unknown Model";
pub const UNKNOWN_OWNER: &str = "Unknown Owner";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleType {
    TwoWheeler,
    ThreeWheeler,
    #[default]
    FourWheeler,
    Commercial,
}

impl VehicleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleType::TwoWheeler => "TWO_WHEELER",
            VehicleType::ThreeWheeler => "THREE_WHEELER",
            VehicleType::FourWheeler => "FOUR_WHEELER",
            VehicleType::Commercial => "COMMERCIAL",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw {
            "TWO_WHEELER" => Ok(VehicleType::TwoWheeler),
            "THREE_WHEELER" => Ok(VehicleType::ThreeWheeler),
            "FOUR_WHEELER" => Ok(VehicleType::FourWheeler),
            "COMMERCIAL" => Ok(VehicleType::Commercial),
            other => Err(DomainError::invalid_input(format!(
                "unknown vehicle type: {other}"
            ))),
        }
    }
}

impl core::fmt::Display for VehicleType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A vehicle known to the workshop, keyed by its registration number.
///
/// Owner fields are denormalized snapshots refreshed by later visits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub registration_number: String,
    pub model: String,
    pub vehicle_type: VehicleType,
    pub owner_name: String,
    pub owner_phone: Option<String>,
    pub owner_address: Option<String>,
    pub owner_gstin: Option<String>,
    pub chassis_number: Option<String>,
    pub engine_number: Option<String>,
    /// Login that owns this vehicle; drives history visibility.
    pub owner_user_id: Option<UserId>,
    pub customer_id: Option<CustomerId>,
    pub created_at: DateTime<Utc>,
}

impl Entity for Vehicle {
    type Id = VehicleId;

    fn id(&self) -> VehicleId {
        self.id
    }
}

/// Vehicle fields a visit may carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleDetails {
    pub registration_number: Option<String>,
    pub model: Option<String>,
    pub owner_name: Option<String>,
    pub owner_phone: Option<String>,
    pub owner_address: Option<String>,
    pub owner_gstin: Option<String>,
    pub chassis_number: Option<String>,
    pub engine_number: Option<String>,
    pub owner_user_id: Option<UserId>,
    pub customer_id: Option<CustomerId>,
}

/// Trim and upper-case a registration number; blank yields `None`.
pub fn normalize_registration(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}

pub(crate) fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl Vehicle {
    /// Overwrite owner fields with any non-empty values from `details`.
    ///
    /// Returns whether anything changed.
    pub fn enrich(&mut self, details: &VehicleDetails) -> bool {
        let before = self.clone();

        if let Some(name) = non_blank(&details.owner_name) {
            self.owner_name = name;
        }
        for (slot, value) in [
            (&mut self.owner_phone, &details.owner_phone),
            (&mut self.owner_address, &details.owner_address),
            (&mut self.owner_gstin, &details.owner_gstin),
            (&mut self.chassis_number, &details.chassis_number),
            (&mut self.engine_number, &details.engine_number),
        ] {
            if let Some(v) = non_blank(value) {
                *slot = Some(v);
            }
        }
        if details.owner_user_id.is_some() {
            self.owner_user_id = details.owner_user_id;
        }
        if details.customer_id.is_some() {
            self.customer_id = details.customer_id;
        }

        *self != before
    }
}

/// A vehicle about to be created on first mention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVehicle {
    pub registration_number: String,
    pub model: String,
    pub vehicle_type: VehicleType,
    pub owner_name: String,
    pub owner_phone: Option<String>,
    pub owner_address: Option<String>,
    pub owner_gstin: Option<String>,
    pub chassis_number: Option<String>,
    pub engine_number: Option<String>,
    pub owner_user_id: Option<UserId>,
    pub customer_id: Option<CustomerId>,
}

impl NewVehicle {
    /// Build a vehicle from visit details, filling placeholder model/owner.
    pub fn from_details(details: &VehicleDetails) -> DomainResult<Self> {
        let registration_number = details
            .registration_number
            .as_deref()
            .and_then(normalize_registration)
            .ok_or(DomainError::VehicleRequired)?;

        Ok(Self {
            registration_number,
            model: non_blank(&details.model).unwrap_or_else(|| UNKNOWN_MODEL.to_string()),
            vehicle_type: VehicleType::default(),
            owner_name: non_blank(&details.owner_name).unwrap_or_else(|| UNKNOWN_OWNER.to_string()),
            owner_phone: non_blank(&details.owner_phone),
            owner_address: non_blank(&details.owner_address),
            owner_gstin: non_blank(&details.owner_gstin),
            chassis_number: non_blank(&details.chassis_number),
            engine_number: non_blank(&details.engine_number),
            owner_user_id: details.owner_user_id,
            customer_id: details.customer_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle() -> Vehicle {
        Vehicle {
            id: VehicleId::new(1),
            registration_number: "KA01AB1234".to_string(),
            model: "Swift".to_string(),
            vehicle_type: VehicleType::FourWheeler,
            owner_name: "Asha".to_string(),
            owner_phone: Some("111".to_string()),
            owner_address: None,
            owner_gstin: None,
            chassis_number: None,
            engine_number: None,
            owner_user_id: None,
            customer_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn registration_is_trimmed_and_upper_cased() {
        assert_eq!(
            normalize_registration("  ka01ab1234 ").as_deref(),
            Some("KA01AB1234")
        );
        assert_eq!(normalize_registration("   "), None);
    }

    #[test]
    fn new_vehicle_uses_placeholders() {
        let v = NewVehicle::from_details(&VehicleDetails {
            registration_number: Some("mh12 xy 9".to_string()),
            ..VehicleDetails::default()
        })
        .unwrap();
        assert_eq!(v.registration_number, "MH12 XY 9");
        assert_eq!(v.model, UNKNOWN_MODEL);
        assert_eq!(v.owner_name, UNKNOWN_OWNER);
        assert_eq!(v.vehicle_type, VehicleType::FourWheeler);
    }

    #[test]
    fn new_vehicle_requires_registration() {
        let err = NewVehicle::from_details(&VehicleDetails::default()).unwrap_err();
        assert_eq!(err, DomainError::VehicleRequired);
    }

    #[test]
    fn enrich_keeps_existing_values_for_blank_input() {
        let mut v = vehicle();
        let changed = v.enrich(&VehicleDetails {
            owner_phone: Some("  ".to_string()),
            owner_gstin: Some("29ABCDE1234F1Z5".to_string()),
            ..VehicleDetails::default()
        });
        assert!(changed);
        assert_eq!(v.owner_phone.as_deref(), Some("111"));
        assert_eq!(v.owner_gstin.as_deref(), Some("29ABCDE1234F1Z5"));
        assert_eq!(v.owner_name, "Asha");

        assert!(!v.enrich(&VehicleDetails::default()));
    }

    #[test]
    fn vehicle_type_round_trips_through_text() {
        for t in [
            VehicleType::TwoWheeler,
            VehicleType::ThreeWheeler,
            VehicleType::FourWheeler,
            VehicleType::Commercial,
        ] {
            assert_eq!(VehicleType::parse(t.as_str()).unwrap(), t);
        }
        assert!(VehicleType::parse("TANK").is_err());
    }
}
