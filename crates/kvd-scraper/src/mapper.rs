//! Flattens the embedded `objectView.storeObjects` entry into raw fields.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::normalize::extract_engine_power_hp;

static AUCTION_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-(\d+)$").expect("valid auction id regex"));

/// Read-only cursor over a JSON tree where missing or `null` nodes read as
/// empty instead of failing, so a whole path can be walked without checks.
#[derive(Debug, Clone, Copy)]
pub struct Node<'a>(Option<&'a Value>);

impl<'a> Node<'a> {
    #[must_use]
    pub fn new(value: &'a Value) -> Self {
        Self(Some(value).filter(|v| !v.is_null()))
    }

    #[must_use]
    pub fn get(self, key: &str) -> Self {
        Self(self.0.and_then(|v| v.get(key)).filter(|v| !v.is_null()))
    }

    #[must_use]
    pub fn at(self, index: usize) -> Self {
        Self(self.0.and_then(|v| v.get(index)).filter(|v| !v.is_null()))
    }

    #[must_use]
    pub fn path(self, keys: &[&str]) -> Self {
        keys.iter().fold(self, |node, key| node.get(key))
    }

    #[must_use]
    pub fn value(self) -> Option<&'a Value> {
        self.0
    }

    /// `true` when the node is absent or an empty container/string/zero/false.
    #[must_use]
    pub fn is_empty(self) -> bool {
        !self.truthy()
    }

    /// Truthiness in the loose sense the site data relies on: `null`,
    /// `false`, `0`, `""`, `[]` and `{}` are all falsy.
    #[must_use]
    pub fn truthy(self) -> bool {
        match self.0 {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
        }
    }

    /// Non-empty string content; numbers are rendered as text.
    #[must_use]
    pub fn text(self) -> Option<String> {
        match self.0? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Any coercible number, zero included.
    #[must_use]
    pub fn number(self) -> Option<f64> {
        self.0.and_then(kvd_core::coerce::to_f64)
    }

    /// A coercible, non-zero number; zero reads as absent.
    #[must_use]
    pub fn nonzero_number(self) -> Option<f64> {
        if self.truthy() {
            self.number().filter(|f| *f != 0.0)
        } else {
            None
        }
    }

    #[must_use]
    pub fn nonzero_i64(self) -> Option<i64> {
        if self.truthy() {
            self.0.and_then(kvd_core::coerce::to_i64).filter(|n| *n != 0)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_i32(self) -> Option<i32> {
        self.0.and_then(kvd_core::coerce::to_i32)
    }
}

/// Raw values for one auction, before text cleanup and enrichment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawAuctionFields {
    pub auction_id: Option<String>,
    pub auction_url: Option<String>,
    pub slug: Option<String>,
    pub sell_method: Option<String>,
    pub closed_at: Option<String>,
    pub published_at: Option<String>,

    pub sold_for: Option<f64>,
    pub buy_now_amount: Option<f64>,
    pub preliminary_price: Option<f64>,
    pub winning_bid: Option<f64>,
    pub highest_bid: Option<f64>,
    pub buy_now_available: bool,
    pub is_sold_by_buy_now: bool,
    pub reservation_price_reached: bool,

    pub brand: Option<String>,
    pub family_name: Option<String>,
    pub registration_plate: Option<String>,
    /// Model name exactly as listed, horsepower and kWh annotations included.
    pub model_name: Option<String>,
    pub year: Option<i32>,
    pub body: Option<String>,
    pub electric_type: Option<String>,
    pub odometer_reading: Option<i64>,
    pub gearbox: Option<String>,
    pub base_object_type: Option<String>,

    pub fuel_code: Option<String>,
    pub range_city_wltp_drive: Option<f64>,
    pub range_wltp_drive: Option<f64>,
    pub engine_power_hp: Option<i32>,
    pub engine_power: Option<f64>,

    pub facility_post_code: Option<String>,
    pub facility_city: Option<String>,

    pub preview_image: Option<String>,
    pub object_view: Option<Value>,
}

/// Trailing `-<digits>` of an auction URL.
#[must_use]
pub fn auction_id_from_url(auction_url: &str) -> Option<String> {
    AUCTION_ID_RE
        .captures(auction_url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Picks the auction entry out of `objectView.storeObjects`.
///
/// A detail page is expected to carry exactly one entry. The first non-empty
/// entry in document order is used; any others are logged and ignored.
fn select_store_entry(tree: &Value) -> Option<&Value> {
    let store = Node::new(tree).path(&["objectView", "storeObjects"]);
    let entries = store.value()?.as_object()?;

    let mut non_empty = entries
        .iter()
        .filter(|(_, item)| Node::new(item).truthy());
    let (key, first) = non_empty.next()?;
    let extra = non_empty.count();
    if extra > 0 {
        tracing::warn!(
            store_key = %key,
            ignored = extra,
            "storeObjects holds more than one entry, using the first"
        );
    }
    Some(first)
}

/// Maps a parsed store blob to raw auction fields.
///
/// Returns `None` when `objectView.storeObjects` is absent or has no entry.
#[must_use]
pub fn map_fields(tree: &Value) -> Option<RawAuctionFields> {
    let item = Node::new(select_store_entry(tree)?);

    let process_object = item.get("processObject");
    let base_obj = process_object.get("baseObject");
    let facility = process_object.path(&["locationInfo", "facility"]);
    let properties = process_object.get("properties");
    let fuels = properties.get("fuels");
    let active_auction = item.get("activeAuction");

    let auction_url = item.get("auctionUrl").text();
    let auction_id = auction_url.as_deref().and_then(auction_id_from_url);
    let model_name = base_obj.get("modelName").text();

    let mut fields = RawAuctionFields {
        auction_id,
        slug: item.get("slug").text(),
        sell_method: item.get("sellMethod").text(),
        closed_at: item.get("closedAt").text(),
        published_at: item.get("publishedAt").text(),

        sold_for: item.get("soldFor").nonzero_number(),
        buy_now_amount: item.get("buyNowAmount").nonzero_number(),
        preliminary_price: item.get("preliminaryPrice").nonzero_number(),
        winning_bid: item.path(&["winningBid", "amount"]).nonzero_number(),
        highest_bid: active_auction
            .path(&["highestBid", "amount"])
            .nonzero_number(),
        buy_now_available: item.get("buyNowAvailable").truthy(),
        is_sold_by_buy_now: item.get("isSoldByBuyNow").truthy(),
        reservation_price_reached: active_auction.get("reservationPriceReached").truthy(),

        brand: properties.get("brand").text(),
        family_name: properties.get("familyName").text(),
        registration_plate: base_obj.get("registrationPlate").text(),
        year: base_obj.get("year").as_i32().filter(|y| *y != 0),
        body: base_obj.get("body").text(),
        electric_type: properties.get("electricType").text(),
        odometer_reading: properties.get("odometerReading").nonzero_i64(),
        gearbox: properties.get("gearbox").text(),
        base_object_type: base_obj.get("baseObjectType").text(),

        facility_post_code: facility.get("postCode").text(),
        facility_city: facility.get("city").text(),

        preview_image: item.get("previewImage").text(),
        object_view: tree.get("objectView").cloned(),

        auction_url,
        model_name,
        ..RawAuctionFields::default()
    };

    if !fuels.is_empty() {
        let fuel = fuels.at(0);
        fields.fuel_code = fuel.get("fuelCode").text();
        fields.range_city_wltp_drive = fuel.get("rangeCityWltpDrive").number();
        fields.range_wltp_drive = fuel.get("rangeWltpDrive").number();

        let tech_fuels = base_obj.path(&[
            "authorityRegisterInformation",
            "generalTechSpecification",
            "fuels",
        ]);
        if !tech_fuels.is_empty() {
            let tech = tech_fuels.at(0);
            fields.engine_power_hp = tech.get("enginePowerHp").as_i32();
            fields.engine_power = tech.get("enginePower").number();
        } else {
            fields.engine_power_hp = fields.model_name.as_deref().and_then(extract_engine_power_hp);
        }
    }

    match fields.auction_id.as_deref() {
        Some(id) => tracing::debug!(auction_id = %id, "mapped store entry"),
        None => tracing::warn!(
            auction_url = fields.auction_url.as_deref().unwrap_or(""),
            "store entry has no auction id"
        ),
    }

    Some(fields)
}

#[cfg(test)]
#[path = "mapper_test.rs"]
mod tests;
