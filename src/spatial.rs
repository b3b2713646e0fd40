// 🗺️ Spatial Key Builder - canonical 5-character entity codes
//
// region (2 digits, zero-padded) + sub-region (3 digits, zero-padded)
// e.g. state 6, county 37 → "06037"
//
// Codes are taken as-is for the whole study period. Historical code
// reassignments are not reconciled.

use crate::error::{PanelError, Result};

pub const REGION_WIDTH: usize = 2;
pub const SUBREGION_WIDTH: usize = 3;
pub const KEY_WIDTH: usize = REGION_WIDTH + SUBREGION_WIDTH;

const REGION_MAX: u32 = 99;
const SUBREGION_MAX: u32 = 999;

/// Build the canonical key from numeric components.
///
/// Fails with `MissingKeyComponent` when a component is absent or does not
/// fit its fixed width; the caller drops the record.
pub fn build_key(region_code: Option<u32>, subregion_code: Option<u32>) -> Result<String> {
    let region = region_code.ok_or_else(|| PanelError::missing_component("region_code"))?;
    let subregion =
        subregion_code.ok_or_else(|| PanelError::missing_component("subregion_code"))?;

    if region > REGION_MAX {
        return Err(PanelError::missing_component(format!(
            "region_code (out of range: {})",
            region
        )));
    }
    if subregion > SUBREGION_MAX {
        return Err(PanelError::missing_component(format!(
            "subregion_code (out of range: {})",
            subregion
        )));
    }

    Ok(format!(
        "{:0rw$}{:0sw$}",
        region,
        subregion,
        rw = REGION_WIDTH,
        sw = SUBREGION_WIDTH
    ))
}

/// Build the key from raw text cells ("6", "37.0", " 037 ").
///
/// Non-numeric text is treated the same as an absent component.
pub fn build_key_from_raw(region: Option<&str>, subregion: Option<&str>) -> Result<String> {
    build_key(
        region.and_then(parse_code),
        subregion.and_then(parse_code),
    )
}

/// Numeric code from text; float-formatted integers are truncated the way
/// the source exports write them ("37.0" → 37)
fn parse_code(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(n) = raw.parse::<u32>() {
        return Some(n);
    }
    let f = raw.parse::<f64>().ok()?;
    if f.is_finite() && f >= 0.0 && f <= u32::MAX as f64 {
        Some(f.trunc() as u32)
    } else {
        None
    }
}

/// `true` when `key` has the canonical shape (5 ASCII digits)
pub fn is_canonical(key: &str) -> bool {
    key.len() == KEY_WIDTH && key.bytes().all(|b| b.is_ascii_digit())
}

// ============================================================================
// TESTS
// ============================================================================
