use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Actor role, resolved once per request from the bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Role {
    Cliente,
    Empleado,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Cliente => "cliente",
            Role::Empleado => "empleado",
            Role::Admin => "admin",
        }
    }
}

/// Appointment status. Stored and serialized as the Spanish labels the
/// wire contract uses: pendiente, aprobada, rechazada, completada, cancelada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Pendiente,
    Aprobada,
    Rechazada,
    Completada,
    Cancelada,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pendiente => "pendiente",
            AppointmentStatus::Aprobada => "aprobada",
            AppointmentStatus::Rechazada => "rechazada",
            AppointmentStatus::Completada => "completada",
            AppointmentStatus::Cancelada => "cancelada",
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub display_name: String,
    pub telefono: Option<String>,
    pub role: Role,
    pub password_hash: String,
    pub active: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ServiceRow {
    pub id: String,
    pub nombre: String,
    pub descripcion: Option<String>,
    pub duracion: i64,
    /// Canonical decimal text with two fraction digits, e.g. "50.00".
    pub precio: String,
    pub activo: bool,
}

/// Appointment joined with its service and client, as every read path
/// returns it.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppointmentRow {
    pub id: String,
    pub fecha: NaiveDate,
    pub hora: NaiveTime,
    pub estado: AppointmentStatus,
    pub notas: Option<String>,
    pub cliente_id: String,
    pub cliente_nombre: String,
    pub servicio_id: String,
    pub servicio_nombre: String,
    pub servicio_descripcion: Option<String>,
    pub servicio_duracion: i64,
    pub servicio_precio: String,
    pub servicio_activo: bool,
    pub empleado_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Wire shape for an appointment.
#[derive(Debug, Clone, Serialize)]
pub struct AppointmentBody {
    pub id: String,
    pub fecha: NaiveDate,
    pub hora: NaiveTime,
    pub estado: AppointmentStatus,
    pub notas: Option<String>,
    pub cliente: String,
    pub cliente_nombre: String,
    pub servicio: String,
    pub servicio_detalle: ServiceRow,
    pub empleado: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<AppointmentRow> for AppointmentBody {
    fn from(row: AppointmentRow) -> Self {
        AppointmentBody {
            id: row.id,
            fecha: row.fecha,
            hora: row.hora,
            estado: row.estado,
            notas: row.notas,
            cliente: row.cliente_id,
            cliente_nombre: row.cliente_nombre,
            servicio: row.servicio_id.clone(),
            servicio_detalle: ServiceRow {
                id: row.servicio_id,
                nombre: row.servicio_nombre,
                descripcion: row.servicio_descripcion,
                duracion: row.servicio_duracion,
                precio: row.servicio_precio,
                activo: row.servicio_activo,
            },
            empleado: row.empleado_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
