//! Text cleanup and enrichment from [`RawAuctionFields`] to
//! [`kvd_core::AuctionRecord`].
//!
//! Every transform here is total: bad input degrades to `None` or an empty
//! string, never to an error.

use std::sync::LazyLock;

use kvd_core::AuctionRecord;
use regex::Regex;

use crate::mapper::RawAuctionFields;

static HP_PAREN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(\d+hk\)").expect("valid hp regex"));
static HP_BARE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+\d+hk\b").expect("valid hp regex"));
static KWH_ANNOTATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+\d+(?:[,.]\d+)?\s*kWh\b").expect("valid kwh annotation regex")
});
static COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*").expect("valid comma regex"));
static BATTERY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:[,.]\d+)?)\s*kWh").expect("valid battery regex"));
static ENGINE_HP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\((\d+)hk\)|(\d+)hk)").expect("valid engine hp regex"));

/// Known Tesla trims whose listings omit the battery size.
const TESLA_CAPACITIES: &[(&str, f64)] = &[
    ("Model 3 Long Range Dual Motor AWD", 82.0),
    ("Model 3 Performance AWD", 82.0),
    ("Model 3 Standard Range RWD", 55.0),
    ("Model S 100D", 100.0),
    ("Model S 60", 60.0),
    ("Model S 75D", 75.0),
    ("Model S 85D", 85.0),
    ("Model S 90D", 90.0),
    ("Model S P100D", 100.0),
    ("Model S P85", 85.0),
    ("Model X LR AWD", 100.0),
    ("Model Y Long Range Dual Motor AWD", 75.0),
    ("Model Y Performance Dual Motor AWD", 75.0),
];

const ELECTRIC_FUEL_CODE: &str = "Electric";

/// Strips horsepower and kWh annotations from a listed model name and
/// collapses commas into single spaces.
///
/// `"Model 3 Long Range (228hk), 80,0 kWh,"` becomes `"Model 3 Long Range"`.
#[must_use]
pub fn clean_model_name(model_name: &str) -> String {
    let cleaned = HP_PAREN_RE.replace_all(model_name, "");
    let cleaned = HP_BARE_RE.replace_all(&cleaned, "");
    let cleaned = KWH_ANNOTATION_RE.replace_all(&cleaned, "");
    collapse_commas(&cleaned)
}

#[must_use]
pub fn clean_brand_name(brand: &str) -> String {
    collapse_commas(brand)
}

fn collapse_commas(s: &str) -> String {
    COMMA_RE
        .replace_all(s.trim(), " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Battery size in kWh when the model name states one (`"78 kWh"`, `"80,0kWh"`).
#[must_use]
pub fn extract_battery_capacity(model_name: &str) -> Option<f64> {
    let raw = BATTERY_RE.captures(model_name)?.get(1)?.as_str();
    let parsed = raw.replace(',', ".").parse::<f64>().ok();
    if parsed.is_none() {
        tracing::debug!(model_name, raw, "battery capacity is not a number");
    }
    parsed
}

/// Battery size for a known Tesla trim, keyed by cleaned model name with an
/// optional leading `"Tesla "`.
#[must_use]
pub fn tesla_battery_capacity(model_name: &str) -> Option<f64> {
    let trimmed = model_name.trim();
    let key = trimmed.strip_prefix("Tesla ").unwrap_or(trimmed).trim();
    TESLA_CAPACITIES
        .iter()
        .find(|(trim, _)| *trim == key)
        .map(|(_, kwh)| *kwh)
}

/// Horsepower from `"(254hk)"` or a bare `"254hk"` token.
#[must_use]
pub fn extract_engine_power_hp(model_name: &str) -> Option<i32> {
    let caps = ENGINE_HP_RE.captures(model_name)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .and_then(|m| m.as_str().parse::<i32>().ok())
}

/// Brand-prefixed display name. The brand is not repeated when the cleaned
/// model name already starts with it.
#[must_use]
pub fn presentation_name(brand: Option<&str>, cleaned_model: &str) -> Option<String> {
    if cleaned_model.is_empty() {
        return None;
    }
    match brand.filter(|b| !b.is_empty()) {
        Some(brand)
            if cleaned_model
                .to_lowercase()
                .starts_with(&brand.to_lowercase()) =>
        {
            Some(cleaned_model.to_string())
        }
        Some(brand) => Some(format!("{brand} {cleaned_model}")),
        None => Some(cleaned_model.to_string()),
    }
}

/// Hammer price per kWh of battery. `None` unless both inputs are present,
/// the capacity is positive, and the quotient is finite.
#[must_use]
pub fn cost_per_kwh(sold_for: Option<f64>, battery_capacity: Option<f64>) -> Option<f64> {
    let (Some(sold_for), Some(capacity)) = (sold_for, battery_capacity) else {
        return None;
    };
    if capacity <= 0.0 || !capacity.is_finite() {
        tracing::debug!(sold_for, capacity, "skipping cost per kWh for non-positive capacity");
        return None;
    }
    Some(sold_for / capacity).filter(|v| v.is_finite())
}

/// Renders a timestamp with an explicit `+00:00` offset instead of `Z`.
///
/// Valid RFC 3339 input keeps its precision; anything else only gets the
/// literal `Z` substitution.
#[must_use]
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if chrono::DateTime::parse_from_rfc3339(trimmed).is_ok() {
        if let Some(stripped) = trimmed
            .strip_suffix('Z')
            .or_else(|| trimmed.strip_suffix('z'))
        {
            return Some(format!("{stripped}+00:00"));
        }
        return Some(trimmed.to_string());
    }
    tracing::debug!(raw = trimmed, "timestamp is not RFC 3339");
    Some(trimmed.replace('Z', "+00:00"))
}

/// Builds the canonical record from mapped fields.
///
/// The image URL and its provenance are left unset; they depend on the page
/// HTML as well as the store blob.
#[must_use]
pub fn normalize_auction(raw: RawAuctionFields) -> AuctionRecord {
    let brand = raw
        .brand
        .as_deref()
        .map(clean_brand_name)
        .filter(|b| !b.is_empty());
    let cleaned_model = raw
        .model_name
        .as_deref()
        .map(clean_model_name)
        .unwrap_or_default();

    let mut battery_capacity = raw.model_name.as_deref().and_then(extract_battery_capacity);
    if battery_capacity.is_none() && brand.as_deref() == Some("Tesla") && !cleaned_model.is_empty()
    {
        battery_capacity = tesla_battery_capacity(&cleaned_model);
        if let Some(kwh) = battery_capacity {
            tracing::debug!(model = %cleaned_model, kwh, "battery capacity from Tesla trim table");
        }
    }

    let model_name_presentation = presentation_name(brand.as_deref(), &cleaned_model);
    let cost_per_kwh = cost_per_kwh(raw.sold_for, battery_capacity);

    let sold = raw.sold_for.is_some_and(|v| v > 0.0);
    let electric = raw.fuel_code.as_deref() == Some(ELECTRIC_FUEL_CODE);
    let search_name = model_name_presentation.clone().filter(|_| sold);
    let search_brand = brand.clone().filter(|_| sold);

    AuctionRecord {
        auction_id: raw.auction_id,
        auction_url: raw.auction_url,
        slug: raw.slug,
        sell_method: raw.sell_method,
        closed_at: raw.closed_at.as_deref().and_then(normalize_timestamp),
        published_at: raw.published_at.as_deref().and_then(normalize_timestamp),

        sold_for: raw.sold_for,
        buy_now_amount: raw.buy_now_amount,
        preliminary_price: raw.preliminary_price,
        winning_bid: raw.winning_bid,
        highest_bid: raw.highest_bid,
        buy_now_available: raw.buy_now_available,
        is_sold_by_buy_now: raw.is_sold_by_buy_now,
        reservation_price_reached: raw.reservation_price_reached,

        family_name: raw.family_name,
        registration_plate: raw.registration_plate,
        model_name: raw.model_name,
        year: raw.year,
        body: raw.body,
        electric_type: raw.electric_type,
        odometer_reading: raw.odometer_reading,
        gearbox: raw.gearbox,
        base_object_type: raw.base_object_type,

        battery_capacity,
        range_city_wltp_drive: raw.range_city_wltp_drive,
        range_wltp_drive: raw.range_wltp_drive,
        engine_power_hp: raw.engine_power_hp,
        engine_power: raw.engine_power,
        cost_per_kwh,

        model_name_search: search_name.clone(),
        model_name_electric_search: search_name.clone().filter(|_| electric),
        model_name_fossil_search: search_name.filter(|_| !electric),
        brand_electric_search: search_brand.clone().filter(|_| electric),
        brand_fossil_search: search_brand.filter(|_| !electric),

        fuel_code: raw.fuel_code,
        facility_post_code: raw.facility_post_code,
        facility_city: raw.facility_city,

        main_image_url: None,
        image_source: None,
        object_view_json: raw.object_view,

        brand,
        model_name_presentation,
    }
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
