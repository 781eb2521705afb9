use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Reference block every catalog object carries under `meta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMeta {
    pub href: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_href: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl EntityMeta {
    pub fn reference(href: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            href: href.into(),
            kind: kind.into(),
            metadata_href: None,
            media_type: Some("application/json".to_string()),
        }
    }

    /// Last path segment of the href, the entity UUID.
    pub fn id(&self) -> &str {
        self.href
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PageMeta {
    pub size: usize,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

/// One page of a collection listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub meta: PageMeta,
    pub rows: Vec<T>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTypeRef {
    pub name: String,
    #[serde(default)]
    pub meta: Option<EntityMeta>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalePrice {
    pub value: f64,
    pub price_type: PriceTypeRef,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BuyPrice {
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Attribute {
    pub name: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

impl Attribute {
    pub fn value_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub meta: EntityMeta,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub external_code: String,
    #[serde(default)]
    pub sale_prices: Vec<SalePrice>,
    pub buy_price: BuyPrice,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ComponentsMeta {
    pub href: String,
    pub size: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ComponentsRef {
    pub meta: ComponentsMeta,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub meta: EntityMeta,
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub external_code: String,
    #[serde(default)]
    pub sale_prices: Vec<SalePrice>,
    pub components: ComponentsRef,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AssortmentRef {
    pub meta: EntityMeta,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ComponentRow {
    pub quantity: f64,
    pub assortment: AssortmentRef,
}

/// Organizations, price types and custom templates: anything looked up by name.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NamedEntity {
    pub meta: EntityMeta,
    pub name: String,
}

/// Entities that can be listed page by page and matched by barcode.
pub trait CatalogEntity {
    fn meta(&self) -> &EntityMeta;
    fn code(&self) -> Option<&str>;
}

impl CatalogEntity for Product {
    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

impl CatalogEntity for Bundle {
    fn meta(&self) -> &EntityMeta {
        &self.meta
    }

    fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Product,
    Bundle,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Product => "product",
            EntityKind::Bundle => "bundle",
        }
    }

    pub fn collection_path(&self) -> &'static str {
        match self {
            EntityKind::Product => "entity/product",
            EntityKind::Bundle => "entity/bundle",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marketplace {
    Ozon,
    Wildberries,
    YandexMarket,
}

impl Marketplace {
    pub const ALL: [Marketplace; 3] = [
        Marketplace::Ozon,
        Marketplace::Wildberries,
        Marketplace::YandexMarket,
    ];

    pub fn column_title(&self) -> &'static str {
        match self {
            Marketplace::Ozon => "Ozon SKU",
            Marketplace::Wildberries => "Wildberries SKU",
            Marketplace::YandexMarket => "Yandex Market SKU",
        }
    }
}

/// A bundle whose component rows have been fetched and resolved to products.
#[derive(Debug, Clone)]
pub struct BundleRecord {
    pub bundle: Bundle,
    pub components: Vec<ResolvedComponent>,
}

#[derive(Debug, Clone)]
pub struct ResolvedComponent {
    pub quantity: f64,
    pub product: Product,
}

/// One output line. Prices are in major currency units.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub name: String,
    pub code: String,
    pub external_code: String,
    pub fbo_price: f64,
    pub purchase_price: f64,
    pub skus: BTreeMap<Marketplace, String>,
    pub edit_link: String,
}

#[derive(Debug, Clone, Default)]
pub struct ReportResult {
    pub rows: Vec<ReportRow>,
    pub warnings: Vec<String>,
}

pub fn to_major_units(minor: f64) -> f64 {
    minor / 100.0
}
