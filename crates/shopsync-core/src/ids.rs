//! Helpers for Shopify GraphQL global IDs (`gid://shopify/Product/123`).

/// Returns the numeric suffix of a GraphQL global ID: everything after the
/// last `/`.
///
/// Plain numeric IDs pass through unchanged. Query strings that Shopify
/// occasionally appends (`gid://shopify/Product/1?x=y`) are dropped.
#[must_use]
pub fn extract_numeric_id(gid: &str) -> &str {
    let tail = gid.rsplit('/').next().unwrap_or(gid);
    tail.split('?').next().unwrap_or(tail)
}

/// Builds a product global ID from a numeric ID.
///
/// Values that already look like a global ID are returned as-is.
#[must_use]
pub fn product_gid(id: &str) -> String {
    if id.starts_with("gid://") {
        id.to_owned()
    } else {
        format!("gid://shopify/Product/{id}")
    }
}

/// Builds a product-variant global ID from a numeric ID.
#[must_use]
pub fn variant_gid(id: &str) -> String {
    if id.starts_with("gid://") {
        id.to_owned()
    } else {
        format!("gid://shopify/ProductVariant/{id}")
    }
}

/// Builds a collection global ID from a numeric ID.
#[must_use]
pub fn collection_gid(id: &str) -> String {
    if id.starts_with("gid://") {
        id.to_owned()
    } else {
        format!("gid://shopify/Collection/{id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_suffix_after_last_slash() {
        assert_eq!(extract_numeric_id("gid://shopify/Product/8123456789"), "8123456789");
        assert_eq!(extract_numeric_id("gid://shopify/Collection/42"), "42");
    }

    #[test]
    fn plain_ids_pass_through() {
        assert_eq!(extract_numeric_id("8123456789"), "8123456789");
    }

    #[test]
    fn query_suffix_is_dropped() {
        assert_eq!(
            extract_numeric_id("gid://shopify/ProductImage/77?v=1700000000"),
            "77"
        );
    }

    #[test]
    fn product_gid_round_trips_numeric_id() {
        assert_eq!(product_gid("123"), "gid://shopify/Product/123");
        assert_eq!(
            product_gid("gid://shopify/Product/123"),
            "gid://shopify/Product/123"
        );
    }

    #[test]
    fn variant_and_collection_gids() {
        assert_eq!(variant_gid("55"), "gid://shopify/ProductVariant/55");
        assert_eq!(collection_gid("42"), "gid://shopify/Collection/42");
    }
}
