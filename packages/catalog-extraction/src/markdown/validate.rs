//! Single-product validation (§4.3, supplemented per §1 of SPEC_FULL.md).

use crate::types::ExtractedProduct;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    TitleLength,
    MissingPrice,
    NoImages,
    RetailerImageQuality(String),
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationFailure::TitleLength => write!(f, "title length outside [5, 200]"),
            ValidationFailure::MissingPrice => write!(f, "price missing or non-numeric"),
            ValidationFailure::NoImages => write!(f, "no image URLs present"),
            ValidationFailure::RetailerImageQuality(r) => write!(f, "image URLs fail {r}'s quality check"),
        }
    }
}

/// Validates a single-product extraction. A failure here means "request
/// tower fallback", not "this is bad data" — the caller decides.
pub fn validate_extracted_product(retailer: &str, product: &ExtractedProduct) -> Result<(), ValidationFailure> {
    let title_len = product.title.as_deref().map(str::len).unwrap_or(0);
    if !(5..=200).contains(&title_len) {
        return Err(ValidationFailure::TitleLength);
    }

    if product.price.is_none() {
        return Err(ValidationFailure::MissingPrice);
    }

    if product.image_urls.is_empty() {
        return Err(ValidationFailure::NoImages);
    }

    if let Err(reason) = retailer_image_quality_check(retailer, &product.image_urls) {
        return Err(ValidationFailure::RetailerImageQuality(reason));
    }

    Ok(())
}

/// Retailer-specific CDN/quality substring checks, supplemented from the
/// original implementation (SPEC_FULL.md §1).
fn retailer_image_quality_check(retailer: &str, image_urls: &[String]) -> Result<(), String> {
    match retailer {
        "revolve" => {
            let has_high_res = image_urls.iter().any(|u| u.contains("/n/z/"));
            let only_thumbnails = image_urls.iter().all(|u| u.contains("/n/ct/"));
            if only_thumbnails && !has_high_res {
                return Err("revolve".to_string());
            }
        }
        "asos" => {
            let has_high_res = image_urls.iter().any(|u| u.contains("XXL") || u.contains("wid=1000"));
            if !has_high_res {
                return Err("asos".to_string());
            }
        }
        "uniqlo" => {
            let from_cdn = image_urls.iter().any(|u| u.contains("image.uniqlo.com"));
            if !from_cdn {
                return Err("uniqlo".to_string());
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_product() -> ExtractedProduct {
        ExtractedProduct {
            url: "https://example.com/p".into(),
            title: Some("A Nice Wrap Dress".into()),
            price: Some(49.99),
            image_urls: vec!["https://cdn.example.com/a.jpg".into()],
            ..Default::default()
        }
    }

    #[test]
    fn accepts_a_well_formed_product() {
        assert!(validate_extracted_product("generic", &base_product()).is_ok());
    }

    #[test]
    fn rejects_short_titles() {
        let mut p = base_product();
        p.title = Some("Hi".into());
        assert_eq!(validate_extracted_product("generic", &p), Err(ValidationFailure::TitleLength));
    }

    #[test]
    fn revolve_rejects_thumbnail_only_images() {
        let mut p = base_product();
        p.image_urls = vec!["https://revolveassets.com/n/ct/thumb.jpg".into()];
        assert!(matches!(
            validate_extracted_product("revolve", &p),
            Err(ValidationFailure::RetailerImageQuality(_))
        ));
    }

    #[test]
    fn revolve_accepts_high_res_images() {
        let mut p = base_product();
        p.image_urls = vec!["https://revolveassets.com/n/z/main.jpg".into()];
        assert!(validate_extracted_product("revolve", &p).is_ok());
    }
}
