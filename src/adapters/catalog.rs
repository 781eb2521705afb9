use crate::adapters::http::{ApiRequest, ResponseMode, RetryingClient};
use crate::domain::model::{
    Bundle, CatalogEntity, ComponentRow, EntityKind, EntityMeta, NamedEntity, Page, Product,
};
use crate::utils::error::{ReportError, Result};
use serde::de::DeserializeOwned;

pub const DEFAULT_BASE_URL: &str = "https://api.moysklad.ru/api/remap/1.2";
pub const DEFAULT_PAGE_LIMIT: usize = 1000;

/// Names the three metadata entities a label export needs.
#[derive(Debug, Clone)]
pub struct LabelRequest {
    pub organization: String,
    pub price_type: String,
    pub template: String,
    pub barcode: String,
}

/// Typed access to the inventory API.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: RetryingClient,
    base_url: String,
    page_limit: usize,
}

impl CatalogClient {
    pub fn new(http: RetryingClient, base_url: impl Into<String>, page_limit: usize) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            page_limit,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Pages through a collection with offset/limit until an empty page.
    pub async fn list_all_entities<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>> {
        let mut offset = 0;
        let mut entities = Vec::new();
        loop {
            let request = ApiRequest::get(url)
                .query("offset", offset)
                .query("limit", self.page_limit)
                .require_key("rows");
            let page: Page<T> = self.http.request_json(&request).await?;

            let offset_got = page.meta.offset.unwrap_or(0);
            if offset_got != offset {
                return Err(ReportError::protocol(format!(
                    "got offset: {}, expected: {}",
                    offset_got, offset
                )));
            }
            let expected = self.page_limit.min(page.meta.size.saturating_sub(offset));
            if page.rows.len() != expected {
                return Err(ReportError::protocol(format!(
                    "entities fetched: {}, expected: {}",
                    page.rows.len(),
                    expected
                )));
            }
            if page.rows.is_empty() {
                break;
            }

            tracing::debug!(
                "fetched {} of {} entities from {}",
                offset + expected,
                page.meta.size,
                url
            );
            entities.extend(page.rows);
            offset += expected;
        }
        Ok(entities)
    }

    pub async fn list_products(&self) -> Result<Vec<Product>> {
        self.list_all_entities(&self.url(EntityKind::Product.collection_path()))
            .await
    }

    pub async fn list_bundles(&self) -> Result<Vec<Bundle>> {
        self.list_all_entities(&self.url(EntityKind::Bundle.collection_path()))
            .await
    }

    /// Single page listing; the reported total must match the rows returned.
    async fn list_single_page<T: DeserializeOwned>(
        &self,
        kind: EntityKind,
        param: &str,
        value: &str,
    ) -> Result<Vec<T>> {
        let request = ApiRequest::get(self.url(kind.collection_path()))
            .query(param, value)
            .require_key("rows");
        let page: Page<T> = self.http.request_json(&request).await?;
        if page.rows.len() != page.meta.size {
            return Err(ReportError::protocol(format!(
                "got incorrect number of {} entities: {} rows, total {}",
                kind,
                page.rows.len(),
                page.meta.size
            )));
        }
        Ok(page.rows)
    }

    pub async fn search_products(&self, text: &str) -> Result<Vec<Product>> {
        self.list_single_page(EntityKind::Product, "search", text)
            .await
    }

    pub async fn list_products_by_code(&self, code: &str) -> Result<Vec<Product>> {
        self.list_single_page(EntityKind::Product, "filter", &format!("code~{}", code))
            .await
    }

    pub async fn list_bundles_by_code(&self, code: &str) -> Result<Vec<Bundle>> {
        self.list_single_page(EntityKind::Bundle, "filter", &format!("code~{}", code))
            .await
    }

    pub async fn get_entity<T: DeserializeOwned>(&self, href: &str) -> Result<T> {
        self.http.request_json(&ApiRequest::get(href)).await
    }

    pub async fn get_product(&self, href: &str) -> Result<Product> {
        let product: Product = self.get_entity(href).await?;
        ensure_kind(&product.meta, EntityKind::Product)?;
        Ok(product)
    }

    pub async fn bundle_component_rows(&self, bundle: &Bundle) -> Result<Vec<ComponentRow>> {
        let meta = &bundle.components.meta;
        if meta.size > meta.limit {
            return Err(ReportError::protocol(format!(
                "bundle \"{}\" has {} components, more than the page limit {}",
                bundle.name, meta.size, meta.limit
            )));
        }

        let request = ApiRequest::get(&meta.href).require_key("rows");
        let page: Page<ComponentRow> = self.http.request_json(&request).await?;
        if page.meta.size != page.rows.len() {
            return Err(ReportError::protocol(format!(
                "bundle \"{}\": got {} component rows, reported {}",
                bundle.name,
                page.rows.len(),
                page.meta.size
            )));
        }
        Ok(page.rows)
    }

    /// Href of the single entity of `kind` whose code equals `barcode`.
    pub async fn resolve_href_by_barcode(
        &self,
        barcode: &str,
        kind: EntityKind,
    ) -> Result<Option<String>> {
        let hrefs: Vec<String> = match kind {
            EntityKind::Product => exact_code_matches(self.search_products(barcode).await?, barcode),
            EntityKind::Bundle => {
                exact_code_matches(self.list_bundles_by_code(barcode).await?, barcode)
            }
        };

        match hrefs.len() {
            0 => Ok(None),
            1 => Ok(hrefs.into_iter().next()),
            _ => Err(ReportError::AmbiguousError {
                kind: kind.to_string(),
                name: barcode.to_string(),
            }),
        }
    }

    async fn named_href(&self, url: String, kind: &str, name: &str, bare_array: bool) -> Result<String> {
        let rows: Vec<NamedEntity> = if bare_array {
            self.http.request_json(&ApiRequest::get(url)).await?
        } else {
            let page: Page<NamedEntity> = self
                .http
                .request_json(&ApiRequest::get(url).require_key("rows"))
                .await?;
            page.rows
        };

        let mut matches = rows.into_iter().filter(|row| row.name == name);
        match (matches.next(), matches.next()) {
            (None, _) => Err(ReportError::NotFoundError {
                kind: kind.to_string(),
                name: name.to_string(),
            }),
            (Some(row), None) => Ok(row.meta.href),
            (Some(_), Some(_)) => Err(ReportError::AmbiguousError {
                kind: kind.to_string(),
                name: name.to_string(),
            }),
        }
    }

    pub async fn organization_href(&self, name: &str) -> Result<String> {
        self.named_href(self.url("entity/organization"), "organization", name, false)
            .await
    }

    pub async fn custom_template_href(&self, name: &str) -> Result<String> {
        self.named_href(
            self.url("entity/assortment/metadata/customtemplate"),
            "custom template",
            name,
            false,
        )
        .await
    }

    /// The price type endpoint answers with a bare array.
    pub async fn price_type_href(&self, name: &str) -> Result<String> {
        self.named_href(
            self.url("context/companysettings/pricetype"),
            "price type",
            name,
            true,
        )
        .await
    }

    /// Names of the custom attributes defined for bundles.
    pub async fn bundle_attribute_names(&self) -> Result<Vec<String>> {
        let request =
            ApiRequest::get(self.url("entity/bundle/metadata/attributes")).require_key("rows");
        let page: Page<NamedEntity> = self.http.request_json(&request).await?;
        Ok(page.rows.into_iter().map(|row| row.name).collect())
    }

    /// Posts an export request for the entity at `entity_href`.
    pub async fn export_label(
        &self,
        entity_href: &str,
        organization_href: &str,
        price_type_href: &str,
        template_href: &str,
    ) -> Result<Vec<u8>> {
        let mut organization = EntityMeta::reference(organization_href, "organization");
        organization.metadata_href = Some(self.url("entity/organization/metadata"));

        let payload = serde_json::json!({
            "organization": { "meta": organization },
            "count": 1,
            "salePrice": {
                "priceType": {
                    "meta": EntityMeta::reference(price_type_href, "pricetype")
                }
            },
            "template": {
                "meta": EntityMeta::reference(template_href, "customtemplate")
            }
        });

        let request = ApiRequest::post(format!("{}/export", entity_href))
            .json(payload)
            .mode(ResponseMode::Binary);
        Ok(self.http.request(&request).await?.into_bytes())
    }

    /// Resolves names and barcode, then exports. `None` when no product or
    /// bundle carries the barcode.
    pub async fn export_label_by_barcode(&self, label: &LabelRequest) -> Result<Option<Vec<u8>>> {
        let organization = self.organization_href(&label.organization).await?;
        let price_type = self.price_type_href(&label.price_type).await?;
        let template = self.custom_template_href(&label.template).await?;

        let href = match self
            .resolve_href_by_barcode(&label.barcode, EntityKind::Product)
            .await?
        {
            Some(href) => href,
            None => match self
                .resolve_href_by_barcode(&label.barcode, EntityKind::Bundle)
                .await?
            {
                Some(href) => href,
                None => return Ok(None),
            },
        };

        tracing::info!("exporting label for {} ({})", label.barcode, href);
        self.export_label(&href, &organization, &price_type, &template)
            .await
            .map(Some)
    }
}

fn exact_code_matches<T: CatalogEntity>(entities: Vec<T>, code: &str) -> Vec<String> {
    entities
        .into_iter()
        .filter(|e| e.code() == Some(code))
        .map(|e| e.meta().href.clone())
        .collect()
}

pub fn ensure_kind(meta: &EntityMeta, kind: EntityKind) -> Result<()> {
    if meta.kind != kind.as_str() {
        return Err(ReportError::protocol(format!(
            "expected entity of type {}, got {} ({})",
            kind, meta.kind, meta.href
        )));
    }
    Ok(())
}
