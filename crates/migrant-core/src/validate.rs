use once_cell::sync::Lazy;
use regex::Regex;

use crate::CatalogError;

const MAX_PACKAGE_ID_CHARS: usize = 100;
const MAX_VERSION_CHARS: usize = 50;

static PACKAGE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("package id pattern is valid"));

static VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d+(\.\d+)*(-[A-Za-z0-9]+)?$").expect("version pattern is valid")
});

pub fn is_valid_package_id(value: &str) -> bool {
    !value.is_empty() && value.len() <= MAX_PACKAGE_ID_CHARS && PACKAGE_ID.is_match(value)
}

pub fn is_valid_version(value: &str) -> bool {
    !value.is_empty() && value.len() <= MAX_VERSION_CHARS && VERSION.is_match(value)
}

pub fn validate_package_id(value: &str) -> Result<(), CatalogError> {
    if is_valid_package_id(value) {
        Ok(())
    } else {
        Err(CatalogError::InvalidPackageId(value.to_string()))
    }
}

pub fn validate_version(value: &str) -> Result<(), CatalogError> {
    if is_valid_version(value) {
        Ok(())
    } else {
        Err(CatalogError::InvalidVersion(value.to_string()))
    }
}
