use crate::domain::model::{
    to_major_units, Attribute, Bundle, BundleRecord, EntityMeta, Marketplace, ReportRow,
    ResolvedComponent,
};
use crate::utils::error::{ReportError, Result};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};

/// Costs of one bundle in minor currency units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BundleCost {
    pub fbo_price: f64,
    pub purchase_cost: f64,
    pub total_cost: f64,
}

/// First sale price tagged with `price_type`.
pub fn fbo_price(bundle: &Bundle, price_type: &str) -> Result<f64> {
    bundle
        .sale_prices
        .iter()
        .find(|price| price.price_type.name == price_type)
        .map(|price| price.value)
        .ok_or_else(|| ReportError::MissingFboPrice {
            bundle: bundle.name.clone(),
            price_type: price_type.to_string(),
        })
}

pub fn purchase_cost(components: &[ResolvedComponent]) -> f64 {
    components
        .iter()
        .map(|c| c.product.buy_price.value * c.quantity)
        .sum()
}

pub fn bundle_cost(record: &BundleRecord, price_type: &str) -> Result<BundleCost> {
    let fbo_price = fbo_price(&record.bundle, price_type)?;
    let purchase_cost = purchase_cost(&record.components);
    Ok(BundleCost {
        fbo_price,
        purchase_cost,
        total_cost: fbo_price + purchase_cost,
    })
}

/// `{id}` in the template is replaced with the entity UUID.
pub fn edit_link(template: &str, meta: &EntityMeta) -> String {
    template.replace("{id}", meta.id())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SkuExtraction {
    pub skus: BTreeMap<Marketplace, String>,
    /// Attribute names that look like a SKU but map to no marketplace.
    pub unrecognized: Vec<String>,
}

/// Maps free-form attribute labels onto canonical marketplaces.
#[derive(Debug, Clone)]
pub struct SkuMatcher {
    labels: HashMap<String, Marketplace>,
    mapping: BTreeMap<Marketplace, Vec<String>>,
    warning_pattern: Regex,
}

impl SkuMatcher {
    pub fn new(mapping: &BTreeMap<Marketplace, Vec<String>>, warning_pattern: &str) -> Result<Self> {
        let warning_pattern =
            Regex::new(warning_pattern).map_err(|e| ReportError::InvalidConfigValueError {
                field: "report.sku_warning_pattern".to_string(),
                value: warning_pattern.to_string(),
                reason: e.to_string(),
            })?;

        let mut labels = HashMap::new();
        for (marketplace, names) in mapping {
            for name in names {
                if let Some(previous) = labels.insert(normalize(name), *marketplace) {
                    if previous != *marketplace {
                        return Err(ReportError::InvalidConfigValueError {
                            field: "report.marketplaces".to_string(),
                            value: name.clone(),
                            reason: format!(
                                "label is mapped to both {:?} and {:?}",
                                previous, marketplace
                            ),
                        });
                    }
                }
            }
        }

        Ok(Self {
            labels,
            mapping: mapping.clone(),
            warning_pattern,
        })
    }

    pub fn extract(&self, attributes: &[Attribute]) -> SkuExtraction {
        let mut extraction = SkuExtraction::default();
        for attribute in attributes {
            match self.labels.get(&normalize(&attribute.name)) {
                Some(marketplace) => {
                    extraction
                        .skus
                        .entry(*marketplace)
                        .or_insert_with(|| attribute.value_text());
                }
                None if self.warning_pattern.is_match(&attribute.name) => {
                    extraction.unrecognized.push(attribute.name.clone());
                }
                None => {}
            }
        }
        extraction
    }

    /// Marketplaces none of whose labels exist among `known_names`.
    pub fn missing_marketplaces(&self, known_names: &[String]) -> Vec<Marketplace> {
        let known: Vec<String> = known_names.iter().map(|n| normalize(n)).collect();
        self.mapping
            .iter()
            .filter(|(_, names)| !names.iter().any(|n| known.contains(&normalize(n))))
            .map(|(marketplace, _)| *marketplace)
            .collect()
    }
}

fn normalize(label: &str) -> String {
    label.trim().to_lowercase()
}

/// Builds the output line for one bundle, returning warnings alongside.
pub fn build_report_row(
    record: &BundleRecord,
    price_type: &str,
    matcher: &SkuMatcher,
    edit_url_template: &str,
) -> Result<(ReportRow, Vec<String>)> {
    let cost = bundle_cost(record, price_type)?;
    let extraction = matcher.extract(&record.bundle.attributes);
    let bundle = &record.bundle;

    let warnings = extraction
        .unrecognized
        .iter()
        .map(|name| {
            format!(
                "bundle \"{}\": unrecognized marketplace attribute \"{}\"",
                bundle.name, name
            )
        })
        .collect();

    let row = ReportRow {
        name: bundle.name.clone(),
        code: bundle.code.clone().unwrap_or_default(),
        external_code: bundle.external_code.clone(),
        fbo_price: to_major_units(cost.fbo_price),
        purchase_price: to_major_units(cost.total_cost),
        skus: extraction.skus,
        edit_link: edit_link(edit_url_template, &bundle.meta),
    };
    Ok((row, warnings))
}
