//! Route modules for Folio Server

pub mod convert;
pub mod health;
