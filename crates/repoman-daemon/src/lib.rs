pub mod error;
pub mod gate;
pub mod polkit;
pub mod service;
