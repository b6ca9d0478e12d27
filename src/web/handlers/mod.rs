//! HTTP request handlers organized by domain

pub mod catalog;
pub mod channels;
pub mod dimensions;
pub mod health;
pub mod validation;
