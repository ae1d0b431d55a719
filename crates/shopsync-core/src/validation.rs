//! Pre-upload checks run before a product is pushed to Shopify.

use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::products::ProductSnapshot;

const MAX_TITLE_LEN: usize = 255;
const MAX_HANDLE_LEN: usize = 255;
const MAX_TAGS: usize = 250;
const VALID_STATUSES: &[&str] = &["active", "draft", "archived"];

static HANDLE_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").ok());

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    MissingField { field: &'static str },

    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("invalid handle '{0}': use lowercase letters, digits and single dashes")]
    InvalidHandle(String),

    #[error("invalid status '{0}'")]
    InvalidStatus(String),

    #[error("{field} must not be negative")]
    NegativePrice { field: &'static str },

    #[error("compare-at price {compare_at} must be above price {price}")]
    CompareAtNotAbovePrice { price: Decimal, compare_at: Decimal },

    #[error("too many tags ({0}); Shopify allows {MAX_TAGS}")]
    TooManyTags(usize),
}

/// Checks a product against the constraints Shopify enforces on write.
///
/// Every violation is collected so a report can list them together.
///
/// # Errors
///
/// Returns the list of violations when there is at least one.
pub fn validate_product_for_push(product: &ProductSnapshot) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if product.title.trim().is_empty() {
        errors.push(ValidationError::MissingField { field: "title" });
    } else if product.title.chars().count() > MAX_TITLE_LEN {
        errors.push(ValidationError::TooLong {
            field: "title",
            max: MAX_TITLE_LEN,
        });
    }

    if product.handle.is_empty() {
        errors.push(ValidationError::MissingField { field: "handle" });
    } else if product.handle.len() > MAX_HANDLE_LEN {
        errors.push(ValidationError::TooLong {
            field: "handle",
            max: MAX_HANDLE_LEN,
        });
    } else if !HANDLE_RE
        .as_ref()
        .is_some_and(|re| re.is_match(&product.handle))
    {
        errors.push(ValidationError::InvalidHandle(product.handle.clone()));
    }

    if !VALID_STATUSES.contains(&product.status.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::InvalidStatus(product.status.clone()));
    }

    if product.price.is_some_and(|p| p.is_sign_negative()) {
        errors.push(ValidationError::NegativePrice { field: "price" });
    }
    if product.compare_at_price.is_some_and(|p| p.is_sign_negative()) {
        errors.push(ValidationError::NegativePrice {
            field: "compare_at_price",
        });
    }
    if let (Some(price), Some(compare_at)) = (product.price, product.compare_at_price) {
        if compare_at <= price {
            errors.push(ValidationError::CompareAtNotAbovePrice { price, compare_at });
        }
    }

    if product.tags.len() > MAX_TAGS {
        errors.push(ValidationError::TooManyTags(product.tags.len()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
