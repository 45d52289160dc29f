use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::user::{NewUser, NewVehicle};

/// Where a conversation currently stands, together with the data that the
/// state needs. Booking states can only be built once a customer and a
/// service are known.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state")]
pub enum ConversationState {
    #[serde(rename = "inicio")]
    Start,
    #[serde(rename = "solicitar_email")]
    AskEmail,
    #[serde(rename = "solicitar_nombre")]
    AskName { draft: ProfileDraft },
    #[serde(rename = "solicitar_telefono")]
    AskPhone { draft: ProfileDraft },
    #[serde(rename = "solicitar_direccion")]
    AskAddress { draft: ProfileDraft },
    #[serde(rename = "solicitar_pais")]
    AskCountry { draft: ProfileDraft },
    #[serde(rename = "solicitar_fecha_nacimiento")]
    AskBirthDate { draft: ProfileDraft },
    #[serde(rename = "solicitar_genero")]
    AskGender { draft: ProfileDraft },
    #[serde(rename = "solicitar_marca")]
    AskBrand { owner: VehicleOwner },
    #[serde(rename = "solicitar_modelo")]
    AskModel { owner: VehicleOwner, brand: String },
    #[serde(rename = "solicitar_año")]
    AskYear {
        owner: VehicleOwner,
        brand: String,
        model: String,
    },
    #[serde(rename = "solicitar_password")]
    AskPassword { account: PendingAccount },
    #[serde(rename = "confirmar_password")]
    ConfirmPassword {
        account: PendingAccount,
        /// `salt$digest` of the first entry; the plaintext is never kept.
        password_digest: String,
    },
    #[serde(rename = "reservar_servicio")]
    ChooseService { customer: Customer },
    #[serde(rename = "confirmar_servicio")]
    ConfirmService {
        customer: Customer,
        request: Option<ServiceRequest>,
    },
    #[serde(rename = "interactuar_con_openai")]
    SpecificQuery {
        customer: Customer,
        request: Option<ServiceRequest>,
    },
    #[serde(rename = "solicitar_fecha")]
    AskDate {
        customer: Customer,
        request: ServiceRequest,
    },
    #[serde(rename = "solicitar_hora")]
    AskTime {
        customer: Customer,
        request: ServiceRequest,
        date: NaiveDate,
    },
    #[serde(rename = "despedida")]
    Farewell {
        customer: Customer,
        booked_at: NaiveDateTime,
    },
}

impl ConversationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationState::Start => "inicio",
            ConversationState::AskEmail => "solicitar_email",
            ConversationState::AskName { .. } => "solicitar_nombre",
            ConversationState::AskPhone { .. } => "solicitar_telefono",
            ConversationState::AskAddress { .. } => "solicitar_direccion",
            ConversationState::AskCountry { .. } => "solicitar_pais",
            ConversationState::AskBirthDate { .. } => "solicitar_fecha_nacimiento",
            ConversationState::AskGender { .. } => "solicitar_genero",
            ConversationState::AskBrand { .. } => "solicitar_marca",
            ConversationState::AskModel { .. } => "solicitar_modelo",
            ConversationState::AskYear { .. } => "solicitar_año",
            ConversationState::AskPassword { .. } => "solicitar_password",
            ConversationState::ConfirmPassword { .. } => "confirmar_password",
            ConversationState::ChooseService { .. } => "reservar_servicio",
            ConversationState::ConfirmService { .. } => "confirmar_servicio",
            ConversationState::SpecificQuery { .. } => "interactuar_con_openai",
            ConversationState::AskDate { .. } => "solicitar_fecha",
            ConversationState::AskTime { .. } => "solicitar_hora",
            ConversationState::Farewell { .. } => "despedida",
        }
    }

    /// The registered user this conversation is acting for, if any.
    pub fn user_id(&self) -> Option<i64> {
        match self {
            ConversationState::AskBrand { owner }
            | ConversationState::AskModel { owner, .. }
            | ConversationState::AskYear { owner, .. } => owner.user_id(),
            ConversationState::ChooseService { customer }
            | ConversationState::ConfirmService { customer, .. }
            | ConversationState::SpecificQuery { customer, .. }
            | ConversationState::AskDate { customer, .. }
            | ConversationState::AskTime { customer, .. }
            | ConversationState::Farewell { customer, .. } => Some(customer.user_id),
            _ => None,
        }
    }

    /// Turns whose input is a secret and must not reach the interaction log.
    pub fn expects_secret(&self) -> bool {
        matches!(
            self,
            ConversationState::AskPassword { .. } | ConversationState::ConfirmPassword { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Gender {
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "OTRO")]
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Female => "F",
            Gender::Male => "M",
            Gender::Other => "OTRO",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "F" => Some(Gender::Female),
            "M" => Some(Gender::Male),
            "OTRO" => Some(Gender::Other),
            _ => None,
        }
    }
}

/// Registration fields collected so far. A fresh draft is started every time
/// an unknown email is entered.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProfileDraft {
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub country: Option<String>,
    pub birth_date: Option<NaiveDate>,
}

impl ProfileDraft {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Default::default()
        }
    }

    pub fn complete(self, gender: Gender) -> Option<Profile> {
        Some(Profile {
            email: self.email,
            name: self.name?,
            phone: self.phone?,
            address: self.address?,
            country: self.country?,
            birth_date: self.birth_date?,
            gender,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub email: String,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub country: String,
    pub birth_date: NaiveDate,
    pub gender: Gender,
}

impl Profile {
    /// Splits the full name at the first space into first and last name.
    pub fn to_new_user(&self, password: &str) -> NewUser {
        let (first_name, last_name) = match self.name.split_once(' ') {
            Some((first, last)) => (first.to_string(), last.to_string()),
            None => (self.name.clone(), String::new()),
        };

        NewUser {
            first_name,
            last_name,
            email: self.email.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
            country: self.country.clone(),
            birth_date: self.birth_date.format("%Y-%m-%d").to_string(),
            gender: self.gender.as_str().to_string(),
            password: password.to_string(),
        }
    }
}

/// Who the vehicle being collected belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VehicleOwner {
    Existing { user_id: i64, name: String },
    New { profile: Profile },
}

impl VehicleOwner {
    pub fn user_id(&self) -> Option<i64> {
        match self {
            VehicleOwner::Existing { user_id, .. } => Some(*user_id),
            VehicleOwner::New { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleSpec {
    pub brand: String,
    pub model: String,
    pub year: i32,
}

impl VehicleSpec {
    pub fn to_new_vehicle(&self, user_id: i64) -> NewVehicle {
        NewVehicle {
            user_id,
            brand: self.brand.clone(),
            model: self.model.clone(),
            year: self.year,
        }
    }
}

/// A complete registration waiting for its password. The request token is
/// sent with every creation attempt so a resubmission maps to the same records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingAccount {
    pub profile: Profile,
    pub vehicle: VehicleSpec,
    pub request_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Customer {
    pub user_id: i64,
    pub vehicle_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectedService {
    pub id: i64,
    pub name: String,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceRequest {
    pub service: SelectedService,
    pub problem: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Counters {
    pub queries_started: u32,
    pub requests_served: u32,
    pub conversions: u32,
}

/// The persisted part of a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub state: ConversationState,
    #[serde(default)]
    pub counters: Counters,
    #[serde(default)]
    pub registration_started_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub service_started_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub state: ConversationState,
    pub counters: Counters,
    pub registration_started_at: Option<NaiveDateTime>,
    pub service_started_at: Option<NaiveDateTime>,
    pub last_activity: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl Session {
    pub fn new(id: impl Into<String>, now: NaiveDateTime, ttl: chrono::Duration) -> Self {
        Self {
            id: id.into(),
            state: ConversationState::Start,
            counters: Counters::default(),
            registration_started_at: None,
            service_started_at: None,
            last_activity: now,
            expires_at: now + ttl,
        }
    }

    pub fn data(&self) -> SessionData {
        SessionData {
            state: self.state.clone(),
            counters: self.counters,
            registration_started_at: self.registration_started_at,
            service_started_at: self.service_started_at,
        }
    }

    /// Back to the greeting. Counters survive, they describe the whole session.
    pub fn reset(&mut self) {
        self.state = ConversationState::Start;
        self.registration_started_at = None;
        self.service_started_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: &str) -> Profile {
        Profile {
            email: "ana@example.com".to_string(),
            name: name.to_string(),
            phone: "987654321".to_string(),
            address: "Av. Arequipa 123".to_string(),
            country: "Peru".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1990, 5, 17).unwrap(),
            gender: Gender::Female,
        }
    }

    #[test]
    fn test_state_serializes_with_wire_name() {
        let state = ConversationState::AskYear {
            owner: VehicleOwner::Existing {
                user_id: 4,
                name: "Ana".to_string(),
            },
            brand: "Toyota".to_string(),
            model: "Corolla".to_string(),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "solicitar_año");
        assert_eq!(json["owner"]["kind"], "existing");

        let back: ConversationState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
        assert_eq!(back.as_str(), "solicitar_año");
    }

    #[test]
    fn test_gender_parse_is_case_insensitive() {
        assert_eq!(Gender::parse("f"), Some(Gender::Female));
        assert_eq!(Gender::parse(" Otro "), Some(Gender::Other));
        assert_eq!(Gender::parse("x"), None);
    }

    #[test]
    fn test_incomplete_draft_does_not_complete() {
        let mut draft = ProfileDraft::new("ana@example.com");
        draft.name = Some("Ana Torres".to_string());
        assert!(draft.complete(Gender::Female).is_none());
    }

    #[test]
    fn test_new_user_splits_name_at_first_space() {
        let user = profile("Ana Maria Torres").to_new_user("secreto");
        assert_eq!(user.first_name, "Ana");
        assert_eq!(user.last_name, "Maria Torres");
        assert_eq!(user.birth_date, "1990-05-17");
        assert_eq!(user.gender, "F");

        let single = profile("Ana").to_new_user("secreto");
        assert_eq!(single.first_name, "Ana");
        assert_eq!(single.last_name, "");
    }

    #[test]
    fn test_user_id_follows_state_payload() {
        let customer = Customer {
            user_id: 9,
            vehicle_id: 3,
            name: "Ana".to_string(),
        };
        assert_eq!(ConversationState::AskEmail.user_id(), None);
        assert_eq!(
            ConversationState::Farewell {
                customer,
                booked_at: NaiveDate::from_ymd_opt(2030, 1, 15)
                    .and_then(|d| d.and_hms_opt(10, 0, 0))
                    .unwrap(),
            }
            .user_id(),
            Some(9)
        );
    }
}
