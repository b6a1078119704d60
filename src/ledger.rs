use chrono::{NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use crate::{
    auth::{new_id, Principal},
    config::BusinessHours,
    error::{is_unique_violation, ApiError},
    models::{AppointmentRow, AppointmentStatus, ServiceRow},
};

const APPOINTMENT_SELECT: &str = r#"SELECT a.id, a.fecha, a.hora, a.estado, a.notas,
       a.cliente_id, u.display_name AS cliente_nombre,
       a.servicio_id, s.nombre AS servicio_nombre, s.descripcion AS servicio_descripcion,
       s.duracion AS servicio_duracion, s.precio AS servicio_precio, s.activo AS servicio_activo,
       a.empleado_id, a.created_at, a.updated_at
  FROM citas a
  JOIN users u ON a.cliente_id = u.id
  JOIN servicios s ON a.servicio_id = s.id"#;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceFilter {
    pub nombre: Option<String>,
    pub activo: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceInput {
    pub nombre: String,
    pub descripcion: Option<String>,
    pub duracion: i64,
    pub precio: Decimal,
    pub activo: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentFilter {
    pub fecha_desde: Option<NaiveDate>,
    pub fecha_hasta: Option<NaiveDate>,
    pub estado: Option<AppointmentStatus>,
    pub servicio: Option<String>,
    pub cliente_nombre: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppointmentInput {
    pub servicio: String,
    pub fecha: NaiveDate,
    pub hora: NaiveTime,
    pub notas: Option<String>,
}

/// Sole authority over the `servicios` and `citas` tables.
///
/// Every mutation runs as a single statement (or conditional update) so that
/// concurrent requests serialize at the store: the slot uniqueness index
/// decides double-booking races, and status transitions are guarded by the
/// `WHERE estado` clause rather than a read-then-write in the application.
#[derive(Clone)]
pub struct AppointmentLedger {
    db: SqlitePool,
    hours: BusinessHours,
}

impl AppointmentLedger {
    pub fn new(db: SqlitePool, hours: BusinessHours) -> Self {
        AppointmentLedger { db, hours }
    }

    // ----- servicios -----

    pub async fn list_services(&self, filter: &ServiceFilter) -> Result<Vec<ServiceRow>, ApiError> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, nombre, descripcion, duracion, precio, activo FROM servicios WHERE 1=1",
        );
        if let Some(nombre) = filter.nombre.as_deref().filter(|n| !n.trim().is_empty()) {
            qb.push(" AND nombre LIKE ").push_bind(format!("%{nombre}%"));
        }
        if let Some(activo) = filter.activo {
            qb.push(" AND activo = ").push_bind(activo);
        }
        qb.push(" ORDER BY nombre");

        let rows = qb.build_query_as::<ServiceRow>().fetch_all(&self.db).await?;
        Ok(rows)
    }

    pub async fn get_service(&self, id: &str) -> Result<ServiceRow, ApiError> {
        sqlx::query_as::<_, ServiceRow>(
            "SELECT id, nombre, descripcion, duracion, precio, activo FROM servicios WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ApiError::not_found("servicio", id))
    }

    pub async fn create_service(
        &self,
        principal: &Principal,
        input: ServiceInput,
    ) -> Result<ServiceRow, ApiError> {
        require_staff(principal, "only staff may manage services")?;
        let (nombre, precio) = validate_service_input(&input)?;

        let id = new_id();
        let result = sqlx::query(
            r#"INSERT INTO servicios (id, nombre, descripcion, duracion, precio, activo)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&id)
        .bind(&nombre)
        .bind(&input.descripcion)
        .bind(input.duracion)
        .bind(&precio)
        .bind(input.activo.unwrap_or(true))
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => {
                return Err(ApiError::validation(
                    "nombre",
                    "a service with this name already exists",
                ));
            }
            Err(err) => return Err(err.into()),
        }

        self.get_service(&id).await
    }

    pub async fn update_service(
        &self,
        principal: &Principal,
        id: &str,
        input: ServiceInput,
    ) -> Result<ServiceRow, ApiError> {
        require_staff(principal, "only staff may manage services")?;
        let (nombre, precio) = validate_service_input(&input)?;

        let result = sqlx::query(
            r#"UPDATE servicios
               SET nombre = ?, descripcion = ?, duracion = ?, precio = ?, activo = ?
               WHERE id = ?"#,
        )
        .bind(&nombre)
        .bind(&input.descripcion)
        .bind(input.duracion)
        .bind(&precio)
        .bind(input.activo.unwrap_or(true))
        .bind(id)
        .execute(&self.db)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(ApiError::not_found("servicio", id)),
            Ok(_) => self.get_service(id).await,
            Err(err) if is_unique_violation(&err) => Err(ApiError::validation(
                "nombre",
                "a service with this name already exists",
            )),
            Err(err) => Err(err.into()),
        }
    }

    /// Services referenced by appointments are never deleted, only disabled.
    pub async fn deactivate_service(
        &self,
        principal: &Principal,
        id: &str,
    ) -> Result<ServiceRow, ApiError> {
        require_staff(principal, "only staff may manage services")?;

        let done = sqlx::query("UPDATE servicios SET activo = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        if done.rows_affected() == 0 {
            return Err(ApiError::not_found("servicio", id));
        }
        self.get_service(id).await
    }

    // ----- citas -----

    /// Scoped listing: staff see everything, clients only their own rows.
    /// The ownership scope is applied before any caller-supplied filter.
    pub async fn list_appointments(
        &self,
        principal: &Principal,
        filter: &AppointmentFilter,
    ) -> Result<Vec<AppointmentRow>, ApiError> {
        let owner = (!principal.is_staff()).then_some(principal.id.as_str());
        self.query_appointments(owner, filter).await
    }

    /// Listing restricted to the principal's own appointments, whatever
    /// their role. Staff use this for "my appointments" views.
    pub async fn list_own_appointments(
        &self,
        principal: &Principal,
        filter: &AppointmentFilter,
    ) -> Result<Vec<AppointmentRow>, ApiError> {
        self.query_appointments(Some(&principal.id), filter).await
    }

    async fn query_appointments(
        &self,
        owner: Option<&str>,
        filter: &AppointmentFilter,
    ) -> Result<Vec<AppointmentRow>, ApiError> {
        let mut qb = QueryBuilder::<Sqlite>::new(APPOINTMENT_SELECT);
        qb.push(" WHERE 1=1");
        if let Some(owner) = owner {
            qb.push(" AND a.cliente_id = ").push_bind(owner.to_string());
        }
        if let Some(desde) = filter.fecha_desde {
            qb.push(" AND a.fecha >= ").push_bind(desde);
        }
        if let Some(hasta) = filter.fecha_hasta {
            qb.push(" AND a.fecha <= ").push_bind(hasta);
        }
        if let Some(estado) = filter.estado {
            qb.push(" AND a.estado = ").push_bind(estado);
        }
        if let Some(servicio) = filter.servicio.as_deref().filter(|s| !s.is_empty()) {
            qb.push(" AND a.servicio_id = ").push_bind(servicio.to_string());
        }
        if let Some(cliente) = filter
            .cliente_nombre
            .as_deref()
            .filter(|c| !c.trim().is_empty())
        {
            qb.push(" AND u.display_name LIKE ")
                .push_bind(format!("%{cliente}%"));
        }
        qb.push(" ORDER BY a.fecha DESC, a.hora DESC");

        let rows = qb
            .build_query_as::<AppointmentRow>()
            .fetch_all(&self.db)
            .await?;
        Ok(rows)
    }

    pub async fn get_appointment(
        &self,
        principal: &Principal,
        id: &str,
    ) -> Result<AppointmentRow, ApiError> {
        let row = self.fetch(id).await?;
        // Another client's appointment is indistinguishable from a missing one.
        if !principal.is_staff() && row.cliente_id != principal.id {
            return Err(ApiError::not_found("cita", id));
        }
        Ok(row)
    }

    /// Book a slot. The client reference is always the authenticated
    /// principal, never caller-supplied. The slot uniqueness index makes the
    /// insert the deciding step under concurrency.
    pub async fn create_appointment(
        &self,
        principal: &Principal,
        input: AppointmentInput,
    ) -> Result<AppointmentRow, ApiError> {
        let service = sqlx::query_as::<_, ServiceRow>(
            "SELECT id, nombre, descripcion, duracion, precio, activo FROM servicios WHERE id = ? AND activo = 1",
        )
        .bind(&input.servicio)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| ApiError::not_found("servicio", input.servicio.clone()))?;

        let now = Utc::now();
        let today = now.date_naive();
        if input.fecha < today || (input.fecha == today && input.hora < now.time()) {
            return Err(ApiError::validation("fecha", "date in the past"));
        }
        if !self.hours.contains(input.hora) {
            return Err(ApiError::validation("hora", "outside business hours"));
        }

        let id = new_id();
        let result = sqlx::query(
            r#"INSERT INTO citas
               (id, fecha, hora, estado, notas, cliente_id, servicio_id, empleado_id, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?, ?)"#,
        )
        .bind(&id)
        .bind(input.fecha)
        .bind(input.hora)
        .bind(AppointmentStatus::Pendiente)
        .bind(&input.notas)
        .bind(&principal.id)
        .bind(&service.id)
        .bind(now)
        .bind(now)
        .execute(&self.db)
        .await;

        match result {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err) => return Err(ApiError::Conflict),
            Err(err) => return Err(err.into()),
        }

        log::info!(
            "appointment {id} booked by {} for {} {} ({})",
            principal.id,
            input.fecha,
            input.hora,
            service.nombre
        );
        self.fetch(&id).await
    }

    pub async fn approve(
        &self,
        id: &str,
        principal: &Principal,
    ) -> Result<AppointmentRow, ApiError> {
        require_staff(principal, "only staff may approve appointments")?;
        self.transition(
            id,
            "approve",
            &[AppointmentStatus::Pendiente],
            AppointmentStatus::Aprobada,
            Some(&principal.id),
        )
        .await
    }

    pub async fn reject(&self, id: &str, principal: &Principal) -> Result<AppointmentRow, ApiError> {
        require_staff(principal, "only staff may reject appointments")?;
        self.transition(
            id,
            "reject",
            &[AppointmentStatus::Pendiente],
            AppointmentStatus::Rechazada,
            None,
        )
        .await
    }

    pub async fn complete(
        &self,
        id: &str,
        principal: &Principal,
    ) -> Result<AppointmentRow, ApiError> {
        require_staff(principal, "only staff may complete appointments")?;
        self.transition(
            id,
            "complete",
            &[AppointmentStatus::Aprobada],
            AppointmentStatus::Completada,
            None,
        )
        .await
    }

    /// Cancellation is open to the owning client as well as staff, from
    /// pendiente or aprobada only.
    pub async fn cancel(&self, id: &str, principal: &Principal) -> Result<AppointmentRow, ApiError> {
        let row = self.fetch(id).await?;
        if !principal.is_staff() && row.cliente_id != principal.id {
            return Err(ApiError::not_found("cita", id));
        }
        self.transition(
            id,
            "cancel",
            &[AppointmentStatus::Pendiente, AppointmentStatus::Aprobada],
            AppointmentStatus::Cancelada,
            None,
        )
        .await
    }

    async fn fetch(&self, id: &str) -> Result<AppointmentRow, ApiError> {
        let mut qb = QueryBuilder::<Sqlite>::new(APPOINTMENT_SELECT);
        qb.push(" WHERE a.id = ").push_bind(id.to_string());
        qb.build_query_as::<AppointmentRow>()
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| ApiError::not_found("cita", id))
    }

    /// Single conditional update: the `estado` guard in the WHERE clause is
    /// what serializes racing transitions. When zero rows change, a re-read
    /// tells a missing appointment apart from a state-machine violation.
    async fn transition(
        &self,
        id: &str,
        action: &'static str,
        from: &[AppointmentStatus],
        to: AppointmentStatus,
        assign_empleado: Option<&str>,
    ) -> Result<AppointmentRow, ApiError> {
        let mut qb = QueryBuilder::<Sqlite>::new("UPDATE citas SET estado = ");
        qb.push_bind(to);
        if let Some(empleado) = assign_empleado {
            qb.push(", empleado_id = ").push_bind(empleado.to_string());
        }
        qb.push(", updated_at = ").push_bind(Utc::now());
        qb.push(" WHERE id = ").push_bind(id.to_string());
        qb.push(" AND estado IN (");
        let mut separated = qb.separated(", ");
        for status in from {
            separated.push_bind(*status);
        }
        qb.push(")");

        let done = qb.build().execute(&self.db).await?;
        if done.rows_affected() == 0 {
            let row = self.fetch(id).await?;
            return Err(ApiError::InvalidTransition {
                action,
                current: row.estado.as_str().to_string(),
            });
        }

        let row = self.fetch(id).await?;
        log::info!("appointment {id} -> {}", row.estado.as_str());
        Ok(row)
    }
}

fn require_staff(principal: &Principal, message: &str) -> Result<(), ApiError> {
    if principal.is_staff() {
        Ok(())
    } else {
        Err(ApiError::PermissionDenied(message.to_string()))
    }
}

fn validate_service_input(input: &ServiceInput) -> Result<(String, String), ApiError> {
    let nombre = input.nombre.trim().to_string();
    if nombre.is_empty() {
        return Err(ApiError::validation("nombre", "name must not be empty"));
    }
    if input.duracion <= 0 {
        return Err(ApiError::validation("duracion", "duration must be positive"));
    }
    if input.precio < Decimal::ZERO {
        return Err(ApiError::validation("precio", "price must not be negative"));
    }
    if input.precio.scale() > 2 {
        return Err(ApiError::validation(
            "precio",
            "price supports at most 2 decimal places",
        ));
    }
    Ok((nombre, format!("{:.2}", input.precio)))
}
