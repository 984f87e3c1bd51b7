//! Core types for the sniping kernel: entities, status enums and the order
//! precision validator. Nothing in this crate performs I/O.

pub mod entities;
pub mod enums;
pub mod precision;
