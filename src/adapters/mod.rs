// Adapters layer: concrete implementations for external systems (http, catalog API, storage, spreadsheets).

pub mod catalog;
pub mod csv_export;
pub mod http;
pub mod storage;
pub mod xlsx;
