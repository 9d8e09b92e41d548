//! jma-chart library crate

#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]

pub mod catalog;
pub mod fs;
pub mod listing_service;
pub mod options;
pub mod pagination;
pub mod presenter;
pub mod reporting;
pub mod rows;
pub mod secrets;
pub mod serve_http;
