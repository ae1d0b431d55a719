//! Client for the Xorosoft inventory REST API.
//!
//! Used by the pipeline to check that SKUs held locally exist in the
//! inventory system.

pub mod client;
pub mod error;
pub(crate) mod retry;
pub mod types;

pub use client::{XorosoftClient, XorosoftSettings, DEFAULT_BASE_URL};
pub use error::XorosoftError;
pub use types::{ApiEnvelope, ProductFilter, ProductPage, XorosoftProduct};
