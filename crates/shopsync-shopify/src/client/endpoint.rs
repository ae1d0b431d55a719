//! Shop URL normalization for the Admin GraphQL endpoint.

use crate::error::ShopifyError;

const MYSHOPIFY_SUFFIX: &str = ".myshopify.com";

/// Extracts the shop subdomain from any of the accepted shop URL forms:
/// `mystore`, `mystore.myshopify.com`, or `https://mystore.myshopify.com/...`.
///
/// # Errors
///
/// Returns [`ShopifyError::InvalidShopUrl`] for custom storefront domains and
/// for names containing characters Shopify does not allow.
pub fn shop_name(shop_url: &str) -> Result<String, ShopifyError> {
    let invalid = |reason: &str| ShopifyError::InvalidShopUrl {
        shop_url: shop_url.to_owned(),
        reason: reason.to_owned(),
    };

    let trimmed = shop_url.trim();
    let without_scheme = trimmed
        .strip_prefix("https://")
        .or_else(|| trimmed.strip_prefix("http://"))
        .unwrap_or(trimmed);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    let name = if let Some(name) = host.strip_suffix(MYSHOPIFY_SUFFIX) {
        name.to_owned()
    } else if host.contains('.') {
        return Err(invalid(
            "the Admin API is only served on the *.myshopify.com domain",
        ));
    } else {
        host
    };

    if name.is_empty() {
        return Err(invalid("shop name is empty"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
    {
        return Err(invalid(
            "shop name may only contain letters, digits and dashes",
        ));
    }

    Ok(name)
}

/// Full Admin GraphQL endpoint for `shop_url` at `api_version`.
///
/// # Errors
///
/// Propagates [`shop_name`] errors.
pub fn graphql_endpoint(shop_url: &str, api_version: &str) -> Result<String, ShopifyError> {
    let name = shop_name(shop_url)?;
    Ok(format!(
        "https://{name}{MYSHOPIFY_SUFFIX}/admin/api/{api_version}/graphql.json"
    ))
}
