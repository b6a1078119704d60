pub mod auth;
pub mod citas;
pub mod health;
pub mod servicios;
