use serde::{Deserialize, Serialize};

use crate::coerce::{lenient_f64, lenient_i32, lenient_i64};

/// Which extraction strategy produced [`AuctionRecord::main_image_url`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    /// `previewImage` on the embedded store entry.
    StoreDataPreviewImage,
    /// `<meta property="og:image">`.
    MetaOgImage,
    /// `<meta property="og:image" data-react-helmet="true">`.
    MetaReactHelmet,
    /// `<meta name="og:image">`.
    MetaNameOgImage,
    /// First `<meta>` whose content points at the imgix CDN.
    MetaImgixNet,
}

impl ImageSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StoreDataPreviewImage => "store_data_preview_image",
            Self::MetaOgImage => "meta_og_image",
            Self::MetaReactHelmet => "meta_react_helmet",
            Self::MetaNameOgImage => "meta_name_og_image",
            Self::MetaImgixNet => "meta_imgix_net",
        }
    }

    /// Inverse of [`ImageSource::as_str`]; unknown tags yield `None`.
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "store_data_preview_image" => Some(Self::StoreDataPreviewImage),
            "meta_og_image" => Some(Self::MetaOgImage),
            "meta_react_helmet" => Some(Self::MetaReactHelmet),
            "meta_name_og_image" => Some(Self::MetaNameOgImage),
            "meta_imgix_net" => Some(Self::MetaImgixNet),
            _ => None,
        }
    }
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One closed auction, flattened from the detail page's embedded store state.
///
/// Serialized in camelCase to match the source site's vocabulary. Numeric
/// fields deserialize leniently: numeric strings are accepted and anything
/// that cannot be coerced becomes `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionRecord {
    /// Trailing digits of `auctionUrl`. Records without one are never persisted.
    pub auction_id: Option<String>,
    pub auction_url: Option<String>,
    pub slug: Option<String>,
    pub sell_method: Option<String>,

    pub closed_at: Option<String>,
    pub published_at: Option<String>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub sold_for: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub buy_now_amount: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub preliminary_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub winning_bid: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub highest_bid: Option<f64>,

    #[serde(default)]
    pub buy_now_available: bool,
    #[serde(default)]
    pub is_sold_by_buy_now: bool,
    #[serde(default)]
    pub reservation_price_reached: bool,

    pub brand: Option<String>,
    pub family_name: Option<String>,
    pub registration_plate: Option<String>,
    pub model_name: Option<String>,
    pub model_name_presentation: Option<String>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub year: Option<i32>,
    pub body: Option<String>,
    pub electric_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub odometer_reading: Option<i64>,
    pub fuel_code: Option<String>,
    pub gearbox: Option<String>,
    pub base_object_type: Option<String>,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub battery_capacity: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub range_city_wltp_drive: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub range_wltp_drive: Option<f64>,
    #[serde(default, deserialize_with = "lenient_i32")]
    pub engine_power_hp: Option<i32>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub engine_power: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub cost_per_kwh: Option<f64>,

    // Populated only for sold auctions, split on fuel code.
    pub model_name_search: Option<String>,
    pub model_name_electric_search: Option<String>,
    pub model_name_fossil_search: Option<String>,
    pub brand_electric_search: Option<String>,
    pub brand_fossil_search: Option<String>,

    pub facility_post_code: Option<String>,
    pub facility_city: Option<String>,

    pub main_image_url: Option<String>,
    pub image_source: Option<ImageSource>,

    /// Full `objectView` subtree as scraped, kept for reprocessing.
    pub object_view_json: Option<serde_json::Value>,
}

impl AuctionRecord {
    /// The auction identifier if it is present and non-blank.
    #[must_use]
    pub fn persistable_id(&self) -> Option<&str> {
        self.auction_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}
