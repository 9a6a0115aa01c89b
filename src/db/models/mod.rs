#![allow(unused_imports)]

//! Database models split into separate files.
//! This module re-exports individual model modules so existing imports like
//! `use crate::db::models::*;` continue to work.

pub mod event;
pub mod event_exception;
pub mod notification;
pub mod user;

// Re-export all types at the `crate::db::models` namespace.
pub use self::event::*;
pub use self::event_exception::*;
pub use self::notification::*;
pub use self::user::*;
