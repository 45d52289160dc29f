use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: i64,
    pub user_id: i64,
    pub brand: String,
    pub model: String,
    pub year: i32,
}

/// Body of `POST /usuarios`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewUser {
    #[serde(rename = "nombre")]
    pub first_name: String,
    #[serde(rename = "apellido")]
    pub last_name: String,
    pub email: String,
    #[serde(rename = "telefono")]
    pub phone: String,
    #[serde(rename = "direccion")]
    pub address: String,
    #[serde(rename = "pais")]
    pub country: String,
    /// `YYYY-MM-DD`
    #[serde(rename = "fecha_nacimiento")]
    pub birth_date: String,
    #[serde(rename = "genero")]
    pub gender: String,
    pub password: String,
}

/// Body of `POST /vehiculos`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewVehicle {
    #[serde(rename = "usuario_id")]
    pub user_id: i64,
    #[serde(rename = "marca")]
    pub brand: String,
    #[serde(rename = "modelo")]
    pub model: String,
    #[serde(rename = "año")]
    pub year: i32,
}
