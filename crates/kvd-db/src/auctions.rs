//! Database operations for `car_auctions`.
//!
//! Writes go through a single column table: the record is re-encoded to JSON
//! and every column value is coerced to its declared SQL type before binding.
//! The same table generates the INSERT and UPDATE statements, so the two can
//! never disagree on column order.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use kvd_core::coerce::{to_f64, to_i32, to_i64};
use kvd_core::{AuctionRecord, AuctionSink, ImageSource, PersistOutcome};
use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};

use crate::DbError;

// ---------------------------------------------------------------------------
// Column table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Text,
    /// `DOUBLE PRECISION`; non-finite values become NULL.
    Float,
    /// `INTEGER`; values outside `i32` become NULL.
    Int4,
    /// `BIGINT`
    Int8,
    /// `BOOLEAN NOT NULL`; missing values become `false`.
    Bool,
    Json,
}

struct Column {
    name: &'static str,
    /// Key of the field in the camelCase JSON encoding of [`AuctionRecord`].
    key: &'static str,
    kind: ColumnKind,
}

const fn col(name: &'static str, key: &'static str, kind: ColumnKind) -> Column {
    Column { name, key, kind }
}

/// Every writable column except `auction_id`, which is always `$1`.
const COLUMNS: &[Column] = &[
    col("auction_url", "auctionUrl", ColumnKind::Text),
    col("slug", "slug", ColumnKind::Text),
    col("sell_method", "sellMethod", ColumnKind::Text),
    col("closed_at", "closedAt", ColumnKind::Text),
    col("published_at", "publishedAt", ColumnKind::Text),
    col("sold_for", "soldFor", ColumnKind::Float),
    col("buy_now_amount", "buyNowAmount", ColumnKind::Float),
    col("preliminary_price", "preliminaryPrice", ColumnKind::Float),
    col("winning_bid", "winningBid", ColumnKind::Float),
    col("highest_bid", "highestBid", ColumnKind::Float),
    col("buy_now_available", "buyNowAvailable", ColumnKind::Bool),
    col("is_sold_by_buy_now", "isSoldByBuyNow", ColumnKind::Bool),
    col(
        "reservation_price_reached",
        "reservationPriceReached",
        ColumnKind::Bool,
    ),
    col("brand", "brand", ColumnKind::Text),
    col("family_name", "familyName", ColumnKind::Text),
    col("registration_plate", "registrationPlate", ColumnKind::Text),
    col("model_name", "modelName", ColumnKind::Text),
    col(
        "model_name_presentation",
        "modelNamePresentation",
        ColumnKind::Text,
    ),
    col("year", "year", ColumnKind::Int4),
    col("body", "body", ColumnKind::Text),
    col("electric_type", "electricType", ColumnKind::Text),
    col("odometer_reading", "odometerReading", ColumnKind::Int8),
    col("fuel_code", "fuelCode", ColumnKind::Text),
    col("gearbox", "gearbox", ColumnKind::Text),
    col("base_object_type", "baseObjectType", ColumnKind::Text),
    col("battery_capacity", "batteryCapacity", ColumnKind::Float),
    col(
        "range_city_wltp_drive",
        "rangeCityWltpDrive",
        ColumnKind::Float,
    ),
    col("range_wltp_drive", "rangeWltpDrive", ColumnKind::Float),
    col("engine_power_hp", "enginePowerHp", ColumnKind::Int4),
    col("engine_power", "enginePower", ColumnKind::Float),
    col("cost_per_kwh", "costPerKwh", ColumnKind::Float),
    col("model_name_search", "modelNameSearch", ColumnKind::Text),
    col(
        "model_name_electric_search",
        "modelNameElectricSearch",
        ColumnKind::Text,
    ),
    col(
        "model_name_fossil_search",
        "modelNameFossilSearch",
        ColumnKind::Text,
    ),
    col(
        "brand_electric_search",
        "brandElectricSearch",
        ColumnKind::Text,
    ),
    col("brand_fossil_search", "brandFossilSearch", ColumnKind::Text),
    col("facility_post_code", "facilityPostCode", ColumnKind::Text),
    col("facility_city", "facilityCity", ColumnKind::Text),
    col("main_image_url", "mainImageUrl", ColumnKind::Text),
    col("image_source", "imageSource", ColumnKind::Text),
    col("object_view_json", "objectViewJson", ColumnKind::Json),
];

static INSERT_SQL: LazyLock<String> = LazyLock::new(|| {
    let names: Vec<&str> = COLUMNS.iter().map(|c| c.name).collect();
    let params: Vec<String> = (2..=COLUMNS.len() + 1).map(|i| format!("${i}")).collect();
    format!(
        "INSERT INTO car_auctions (auction_id, {}) VALUES ($1, {})",
        names.join(", "),
        params.join(", ")
    )
});

static UPDATE_SQL: LazyLock<String> = LazyLock::new(|| {
    let assignments: Vec<String> = COLUMNS
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ${}", c.name, i + 2))
        .collect();
    format!(
        "UPDATE car_auctions SET {}, updated_at = NOW() WHERE auction_id = $1",
        assignments.join(", ")
    )
});

/// A column value already coerced to its SQL type.
#[derive(Debug, Clone, PartialEq)]
enum ColumnValue {
    Text(Option<String>),
    Float(Option<f64>),
    Int4(Option<i32>),
    Int8(Option<i64>),
    Bool(bool),
    Json(Option<Value>),
}

fn coerce_column(kind: ColumnKind, value: Option<&Value>) -> ColumnValue {
    let value = value.filter(|v| !v.is_null());
    match kind {
        ColumnKind::Text => ColumnValue::Text(value.and_then(|v| match v {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        })),
        ColumnKind::Float => ColumnValue::Float(value.and_then(to_f64)),
        ColumnKind::Int4 => ColumnValue::Int4(value.and_then(to_i32)),
        ColumnKind::Int8 => ColumnValue::Int8(value.and_then(to_i64)),
        ColumnKind::Bool => ColumnValue::Bool(match value {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.as_str(), "true" | "True" | "1"),
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            _ => false,
        }),
        ColumnKind::Json => ColumnValue::Json(value.cloned()),
    }
}

fn column_values(record: &AuctionRecord) -> Result<Vec<ColumnValue>, DbError> {
    let encoded = serde_json::to_value(record)?;
    Ok(COLUMNS
        .iter()
        .map(|c| coerce_column(c.kind, encoded.get(c.key)))
        .collect())
}

fn bind_columns<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    values: &'q [ColumnValue],
) -> Query<'q, Postgres, PgArguments> {
    for value in values {
        query = match value {
            ColumnValue::Text(v) => query.bind(v.as_deref()),
            ColumnValue::Float(v) => query.bind(*v),
            ColumnValue::Int4(v) => query.bind(*v),
            ColumnValue::Int8(v) => query.bind(*v),
            ColumnValue::Bool(v) => query.bind(*v),
            ColumnValue::Json(v) => query.bind(v.as_ref()),
        };
    }
    query
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `car_auctions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuctionRow {
    pub id: i64,
    pub auction_id: String,
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
    pub model_name: Option<String>,
    pub model_name_presentation: Option<String>,
    pub year: Option<i32>,
    pub body: Option<String>,
    pub electric_type: Option<String>,
    pub odometer_reading: Option<i64>,
    pub fuel_code: Option<String>,
    pub gearbox: Option<String>,
    pub base_object_type: Option<String>,
    pub battery_capacity: Option<f64>,
    pub range_city_wltp_drive: Option<f64>,
    pub range_wltp_drive: Option<f64>,
    pub engine_power_hp: Option<i32>,
    pub engine_power: Option<f64>,
    pub cost_per_kwh: Option<f64>,
    pub model_name_search: Option<String>,
    pub model_name_electric_search: Option<String>,
    pub model_name_fossil_search: Option<String>,
    pub brand_electric_search: Option<String>,
    pub brand_fossil_search: Option<String>,
    pub facility_post_code: Option<String>,
    pub facility_city: Option<String>,
    pub main_image_url: Option<String>,
    /// One of the [`ImageSource`] tags, e.g. `"meta_og_image"`.
    pub image_source: Option<String>,
    pub object_view_json: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuctionRow {
    /// Converts back into the domain record. Unknown image source tags are dropped.
    #[must_use]
    pub fn into_record(self) -> AuctionRecord {
        AuctionRecord {
            auction_id: Some(self.auction_id),
            auction_url: self.auction_url,
            slug: self.slug,
            sell_method: self.sell_method,
            closed_at: self.closed_at,
            published_at: self.published_at,
            sold_for: self.sold_for,
            buy_now_amount: self.buy_now_amount,
            preliminary_price: self.preliminary_price,
            winning_bid: self.winning_bid,
            highest_bid: self.highest_bid,
            buy_now_available: self.buy_now_available,
            is_sold_by_buy_now: self.is_sold_by_buy_now,
            reservation_price_reached: self.reservation_price_reached,
            brand: self.brand,
            family_name: self.family_name,
            registration_plate: self.registration_plate,
            model_name: self.model_name,
            model_name_presentation: self.model_name_presentation,
            year: self.year,
            body: self.body,
            electric_type: self.electric_type,
            odometer_reading: self.odometer_reading,
            fuel_code: self.fuel_code,
            gearbox: self.gearbox,
            base_object_type: self.base_object_type,
            battery_capacity: self.battery_capacity,
            range_city_wltp_drive: self.range_city_wltp_drive,
            range_wltp_drive: self.range_wltp_drive,
            engine_power_hp: self.engine_power_hp,
            engine_power: self.engine_power,
            cost_per_kwh: self.cost_per_kwh,
            model_name_search: self.model_name_search,
            model_name_electric_search: self.model_name_electric_search,
            model_name_fossil_search: self.model_name_fossil_search,
            brand_electric_search: self.brand_electric_search,
            brand_fossil_search: self.brand_fossil_search,
            facility_post_code: self.facility_post_code,
            facility_city: self.facility_city,
            main_image_url: self.main_image_url,
            image_source: self.image_source.as_deref().and_then(ImageSource::from_tag),
            object_view_json: self.object_view_json,
        }
    }
}

/// The stored `objectView` subtree of one auction, with its current image.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredObjectView {
    pub auction_id: String,
    pub object_view_json: Value,
    pub main_image_url: Option<String>,
    pub image_source: Option<String>,
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Insert a new auction or overwrite the existing row with the same `auction_id`.
///
/// Records without a usable `auction_id` are skipped with a warning and
/// never touch the database. The existence check and the write run in one
/// transaction; an update also refreshes `updated_at`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure; the transaction is rolled
/// back and nothing is written.
pub async fn upsert_auction(
    pool: &PgPool,
    record: &AuctionRecord,
) -> Result<PersistOutcome, DbError> {
    let Some(auction_id) = record.persistable_id() else {
        tracing::warn!(
            auction_url = record.auction_url.as_deref().unwrap_or(""),
            "auction has no id, not saving"
        );
        return Ok(PersistOutcome::Skipped);
    };
    let values = column_values(record)?;

    let mut tx = pool.begin().await?;

    let existing: Option<i64> =
        sqlx::query_scalar("SELECT id FROM car_auctions WHERE auction_id = $1")
            .bind(auction_id)
            .fetch_optional(&mut *tx)
            .await?;

    let outcome = if existing.is_some() {
        bind_columns(sqlx::query(UPDATE_SQL.as_str()).bind(auction_id), &values)
            .execute(&mut *tx)
            .await?;
        PersistOutcome::Updated
    } else {
        bind_columns(sqlx::query(INSERT_SQL.as_str()).bind(auction_id), &values)
            .execute(&mut *tx)
            .await?;
        PersistOutcome::Inserted
    };

    tx.commit().await?;
    tracing::debug!(auction_id, outcome = outcome.as_str(), "auction saved");
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Fetch one auction by its `auction_id`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn get_auction(pool: &PgPool, auction_id: &str) -> Result<Option<AuctionRow>, DbError> {
    let row = sqlx::query_as::<_, AuctionRow>("SELECT * FROM car_auctions WHERE auction_id = $1")
        .bind(auction_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Total number of stored auctions.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn count_auctions(pool: &PgPool) -> Result<i64, DbError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM car_auctions")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Stored `objectView` subtrees in `auction_id` order, for rebuilding records
/// without refetching pages. Rows without a stored subtree are left out.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] on query failure.
pub async fn list_object_views(
    pool: &PgPool,
    limit: Option<i64>,
) -> Result<Vec<StoredObjectView>, DbError> {
    let rows = sqlx::query_as::<_, StoredObjectView>(
        "SELECT auction_id, object_view_json, main_image_url, image_source \
         FROM car_auctions \
         WHERE object_view_json IS NOT NULL \
         ORDER BY auction_id \
         LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Sink
// ---------------------------------------------------------------------------

/// Persists crawled auctions into `car_auctions`.
#[derive(Debug, Clone)]
pub struct PgAuctionStore {
    pool: PgPool,
}

impl PgAuctionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl AuctionSink for PgAuctionStore {
    type Error = DbError;

    async fn persist(&self, record: &AuctionRecord) -> Result<PersistOutcome, DbError> {
        upsert_auction(&self.pool, record).await
    }
}
