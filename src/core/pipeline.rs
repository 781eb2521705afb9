use crate::adapters::catalog::{ensure_kind, CatalogClient};
use crate::adapters::csv_export::write_csv;
use crate::adapters::xlsx::{write_workbook, Cell, CellFormat, Column, Sheet};
use crate::config::{AppConfig, OutputFormat};
use crate::core::stable::{poll_until_stable_unique, PollProgress};
use crate::core::{BundleRecord, Pipeline, ReportResult, Storage};
use crate::domain::model::{
    Bundle, EntityKind, Marketplace, Product, ReportRow, ResolvedComponent,
};
use crate::domain::services::{build_report_row, SkuMatcher};
use crate::utils::error::Result;
use std::collections::HashMap;

/// Fetches bundles with their components, prices them and writes the spreadsheet.
pub struct ReportPipeline<S: Storage> {
    storage: S,
    catalog: CatalogClient,
    config: AppConfig,
    matcher: SkuMatcher,
}

impl<S: Storage> ReportPipeline<S> {
    pub fn new(storage: S, catalog: CatalogClient, config: AppConfig) -> Result<Self> {
        let matcher = SkuMatcher::new(
            &config.report.marketplaces,
            &config.report.sku_warning_pattern,
        )?;
        Ok(Self {
            storage,
            catalog,
            config,
            matcher,
        })
    }

    async fn fetch_products(&self) -> Result<Vec<Product>> {
        if !self.config.poll.enabled {
            return self.catalog.list_products().await;
        }
        let catalog = &self.catalog;
        poll_until_stable_unique(
            move || catalog.list_products(),
            |p: &Product| p.meta.href.clone(),
            log_progress("products"),
            &self.config.poll_options(),
        )
        .await
    }

    async fn fetch_bundles(&self) -> Result<Vec<Bundle>> {
        if !self.config.poll.enabled {
            return self.catalog.list_bundles().await;
        }
        let catalog = &self.catalog;
        poll_until_stable_unique(
            move || catalog.list_bundles(),
            |b: &Bundle| b.meta.href.clone(),
            log_progress("bundles"),
            &self.config.poll_options(),
        )
        .await
    }

    /// Warns about marketplaces whose labels match no bundle attribute.
    async fn check_attribute_schema(&self) {
        match self.catalog.bundle_attribute_names().await {
            Ok(names) => {
                for marketplace in self.matcher.missing_marketplaces(&names) {
                    tracing::warn!(
                        "no bundle attribute matches the labels configured for {:?}",
                        marketplace
                    );
                }
            }
            Err(e) => tracing::warn!("could not check bundle attribute schema: {}", e),
        }
    }

    async fn resolve_components(
        &self,
        bundle: &Bundle,
        index: &HashMap<String, Product>,
    ) -> Result<Vec<ResolvedComponent>> {
        let rows = self.catalog.bundle_component_rows(bundle).await?;
        let mut components = Vec::with_capacity(rows.len());

        for row in rows {
            let meta = &row.assortment.meta;
            ensure_kind(meta, EntityKind::Product)?;

            let product = match index.get(&meta.href) {
                Some(product) => product.clone(),
                None => {
                    tracing::debug!("product {} missing from listing, fetching it", meta.href);
                    self.catalog.get_product(&meta.href).await?
                }
            };

            tracing::debug!(
                "  --- product: {}, code: {}, ex code: {}, buy price: {}, qty: {}",
                product.name,
                product.code.as_deref().unwrap_or_default(),
                product.external_code,
                product.buy_price.value,
                row.quantity
            );
            components.push(ResolvedComponent {
                quantity: row.quantity,
                product,
            });
        }
        Ok(components)
    }
}

fn log_progress<T>(what: &'static str) -> impl FnMut(&PollProgress<'_, T>) {
    move |progress| {
        if progress.duplicates {
            tracing::warn!("{}: {}", what, progress.message);
        } else {
            tracing::info!("{}: {}", what, progress.message);
        }
    }
}

/// Column layout of the exported sheet.
pub fn report_columns() -> Vec<Column> {
    let mut columns = vec![
        Column::new("Bundle name", 50.0, CellFormat::General),
        Column::new("Code", 16.0, CellFormat::Text),
        Column::new("External code", 28.0, CellFormat::Text),
        Column::new("FBO price", 12.0, CellFormat::Fixed2),
        Column::new("Purchase price", 14.0, CellFormat::Fixed2),
    ];
    for marketplace in Marketplace::ALL {
        columns.push(Column::new(marketplace.column_title(), 18.0, CellFormat::Text));
    }
    columns.push(Column::new("Edit link", 60.0, CellFormat::General));
    columns
}

pub fn report_sheet(rows: &[ReportRow]) -> Sheet {
    let rows = rows
        .iter()
        .map(|row| {
            let mut cells = vec![
                Cell::Text(row.name.clone()),
                Cell::Text(row.code.clone()),
                Cell::Text(row.external_code.clone()),
                Cell::Number(row.fbo_price),
                Cell::Number(row.purchase_price),
            ];
            for marketplace in Marketplace::ALL {
                cells.push(match row.skus.get(&marketplace) {
                    Some(sku) => Cell::Text(sku.clone()),
                    None => Cell::Empty,
                });
            }
            cells.push(Cell::Text(row.edit_link.clone()));
            cells
        })
        .collect();

    Sheet {
        name: "Bundles".to_string(),
        columns: report_columns(),
        rows,
    }
}

#[async_trait::async_trait]
impl<S: Storage> Pipeline for ReportPipeline<S> {
    async fn extract(&self) -> Result<Vec<BundleRecord>> {
        self.check_attribute_schema().await;

        let products = self.fetch_products().await?;
        tracing::info!("fetched {} products", products.len());
        let index: HashMap<String, Product> = products
            .into_iter()
            .map(|p| (p.meta.href.clone(), p))
            .collect();

        let bundles = self.fetch_bundles().await?;
        tracing::info!("fetched {} bundles", bundles.len());

        let mut records = Vec::with_capacity(bundles.len());
        for bundle in bundles {
            let components = self.resolve_components(&bundle, &index).await?;
            records.push(BundleRecord { bundle, components });
        }
        Ok(records)
    }

    async fn transform(&self, data: Vec<BundleRecord>) -> Result<ReportResult> {
        let mut result = ReportResult::default();

        for record in &data {
            let (row, warnings) = build_report_row(
                record,
                &self.config.report.fbo_price_type,
                &self.matcher,
                &self.config.report.edit_url_template,
            )?;
            for warning in &warnings {
                tracing::warn!("{}", warning);
            }
            tracing::info!(
                "bundle: {}, code: {}, ex code: {}, price FBO: {:.2}, result price: {:.2}",
                row.name,
                row.code,
                row.external_code,
                row.fbo_price,
                row.purchase_price
            );
            result.rows.push(row);
            result.warnings.extend(warnings);
        }

        Ok(result)
    }

    async fn load(&self, result: ReportResult) -> Result<String> {
        let sheet = report_sheet(&result.rows);
        let data = match self.config.report.format {
            OutputFormat::Xlsx => write_workbook(&sheet)?,
            OutputFormat::Csv => write_csv(&sheet)?,
        };

        let filename = self.config.output_filename(chrono::Local::now());
        tracing::debug!("Writing {} ({} bytes) to storage", filename, data.len());
        self.storage.write_file(&filename, &data).await?;

        Ok(format!("{}/{}", self.config.report.output_path, filename))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::http::{RetryPolicy, RetryingClient};
    use crate::utils::error::{ReportError, Result};
    use httpmock::prelude::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;

    #[derive(Clone)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        fn new() -> Self {
            Self {
                files: Arc::new(Mutex::new(HashMap::new())),
            }
        }

        async fn file_names(&self) -> Vec<String> {
            let files = self.files.lock().await;
            files.keys().cloned().collect()
        }

        async fn get_file(&self, path: &str) -> Option<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned()
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                ReportError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }
    }

    fn config(format: OutputFormat) -> AppConfig {
        let mut config = AppConfig::default();
        config.api.token = "secret".to_string();
        config.report.output_path = "test_output".to_string();
        config.report.filename_template = "bundles".to_string();
        config.report.format = format;
        config
    }

    fn catalog(server: &MockServer) -> CatalogClient {
        let http = RetryingClient::with_bearer_token(
            "secret",
            RetryPolicy {
                retries: 1,
                pause: Duration::ZERO,
            },
            None,
        )
        .unwrap();
        CatalogClient::new(http, server.base_url(), 1000)
    }

    fn product_json(server: &MockServer, id: &str, buy: f64) -> serde_json::Value {
        serde_json::json!({
            "meta": {"href": server.url(format!("/entity/product/{}", id)), "type": "product"},
            "name": format!("Product {}", id),
            "code": format!("code-{}", id),
            "externalCode": format!("ext-{}", id),
            "buyPrice": {"value": buy}
        })
    }

    fn mock_catalog(server: &MockServer, component_kind: &str) {
        let products = vec![product_json(server, "p1", 1500.0)];
        server.mock(|when, then| {
            when.method(GET).path("/entity/product").query_param("offset", "0");
            then.status(200).json_body(serde_json::json!({
                "meta": {"size": 1, "limit": 1000, "offset": 0},
                "rows": products
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/entity/product").query_param("offset", "1");
            then.status(200).json_body(serde_json::json!({
                "meta": {"size": 1, "limit": 1000, "offset": 1},
                "rows": []
            }));
        });
        // p2 is only reachable by direct fetch
        let p2 = product_json(server, "p2", 2500.0);
        server.mock(|when, then| {
            when.method(GET).path("/entity/product/p2");
            then.status(200).json_body(p2);
        });

        let bundle = serde_json::json!({
            "meta": {"href": server.url("/entity/bundle/b1"), "type": "bundle"},
            "name": "Gift set",
            "code": "4600000000017",
            "externalCode": "ext-b1",
            "salePrices": [{"value": 10000.0, "priceType": {"name": "Цена FBO"}}],
            "components": {"meta": {"href": server.url("/entity/bundle/b1/components"), "size": 2, "limit": 1000}},
            "attributes": [{"name": "Артикул Ozon", "value": "OZ-1"}]
        });
        server.mock(|when, then| {
            when.method(GET).path("/entity/bundle").query_param("offset", "0");
            then.status(200).json_body(serde_json::json!({
                "meta": {"size": 1, "limit": 1000, "offset": 0},
                "rows": [bundle]
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/entity/bundle").query_param("offset", "1");
            then.status(200).json_body(serde_json::json!({
                "meta": {"size": 1, "limit": 1000, "offset": 1},
                "rows": []
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/entity/bundle/b1/components");
            then.status(200).json_body(serde_json::json!({
                "meta": {"size": 2, "limit": 1000, "offset": 0},
                "rows": [
                    {"quantity": 2, "assortment": {"meta": {"href": server.url("/entity/product/p1"), "type": "product"}}},
                    {"quantity": 1, "assortment": {"meta": {"href": server.url("/entity/product/p2"), "type": component_kind}}}
                ]
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/entity/bundle/metadata/attributes");
            then.status(200).json_body(serde_json::json!({
                "meta": {"size": 1},
                "rows": [{"meta": {"href": server.url("/attr/1"), "type": "attributemetadata"}, "name": "Артикул Ozon"}]
            }));
        });
    }

    #[tokio::test]
    async fn test_extract_resolves_components_from_index_and_fallback() {
        let server = MockServer::start();
        mock_catalog(&server, "product");

        let pipeline =
            ReportPipeline::new(MockStorage::new(), catalog(&server), config(OutputFormat::Xlsx))
                .unwrap();
        let records = pipeline.extract().await.unwrap();

        assert_eq!(records.len(), 1);
        let components = &records[0].components;
        assert_eq!(components.len(), 2);
        assert_eq!(components[0].product.name, "Product p1");
        assert_eq!(components[0].quantity, 2.0);
        assert_eq!(components[1].product.buy_price.value, 2500.0);
    }

    #[tokio::test]
    async fn test_extract_rejects_non_product_component() {
        let server = MockServer::start();
        mock_catalog(&server, "service");

        let pipeline =
            ReportPipeline::new(MockStorage::new(), catalog(&server), config(OutputFormat::Xlsx))
                .unwrap();
        let result = pipeline.extract().await;

        assert!(matches!(result, Err(ReportError::ProtocolError { .. })));
    }

    #[tokio::test]
    async fn test_full_run_computes_total_cost() {
        let server = MockServer::start();
        mock_catalog(&server, "product");

        let storage = MockStorage::new();
        let pipeline =
            ReportPipeline::new(storage.clone(), catalog(&server), config(OutputFormat::Csv))
                .unwrap();

        let records = pipeline.extract().await.unwrap();
        let result = pipeline.transform(records).await.unwrap();
        assert_eq!(result.rows[0].fbo_price, 100.0);
        assert_eq!(result.rows[0].purchase_price, 155.0);
        assert_eq!(result.rows[0].skus[&Marketplace::Ozon], "OZ-1");
        assert!(result.warnings.is_empty());

        let output_path = pipeline.load(result).await.unwrap();
        assert_eq!(output_path, "test_output/bundles.csv");
        assert_eq!(storage.file_names().await, vec!["bundles.csv".to_string()]);

        let csv = String::from_utf8(storage.get_file("bundles.csv").await.unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines[0],
            "Bundle name,Code,External code,FBO price,Purchase price,Ozon SKU,Wildberries SKU,Yandex Market SKU,Edit link"
        );
        assert!(lines[1].starts_with("Gift set,4600000000017,ext-b1,100.00,155.00,OZ-1,,,"));
        assert!(lines[1].ends_with("edit?id=b1"));
    }

    #[tokio::test]
    async fn test_transform_missing_fbo_price_fails() {
        let server = MockServer::start();
        let mut config = config(OutputFormat::Xlsx);
        config.report.fbo_price_type = "Цена Marketplace".to_string();
        mock_catalog(&server, "product");

        let pipeline = ReportPipeline::new(MockStorage::new(), catalog(&server), config).unwrap();
        let records = pipeline.extract().await.unwrap();
        let result = pipeline.transform(records).await;

        assert!(matches!(result, Err(ReportError::MissingFboPrice { .. })));
    }

    #[test]
    fn test_report_sheet_layout() {
        let sheet = report_sheet(&[]);
        assert_eq!(sheet.columns.len(), 9);
        assert_eq!(sheet.columns[3].format, CellFormat::Fixed2);
        assert_eq!(sheet.columns[5].title, "Ozon SKU");
        assert_eq!(sheet.columns[8].title, "Edit link");
    }
}
