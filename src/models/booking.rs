use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub user_id: i64,
    pub vehicle_id: i64,
    pub service_id: i64,
    pub slot_id: i64,
    pub problem: String,
    pub date_time: NaiveDateTime,
}

/// Body of `POST /reservas`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewBooking {
    #[serde(rename = "usuario_id")]
    pub user_id: i64,
    #[serde(rename = "vehiculo_id")]
    pub vehicle_id: i64,
    #[serde(rename = "servicio_id")]
    pub service_id: i64,
    pub slot_id: i64,
    #[serde(rename = "problema")]
    pub problem: String,
    /// `%Y-%m-%d %H:%M:%S`
    #[serde(rename = "fecha_hora")]
    pub date_time: String,
}
