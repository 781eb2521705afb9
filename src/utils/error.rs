use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Spreadsheet error: {0}")]
    XlsxError(#[from] rust_xlsxwriter::XlsxError),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("HTTP request to {url} failed after {tries} tries, giving up")]
    RequestFailed { url: String, tries: u32 },

    #[error("Failed to get a stable list of objects after {tries} tries")]
    UnstableList { tries: usize },

    #[error("Invalid request header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("Protocol violation: {message}")]
    ProtocolError { message: String },

    #[error("There are several {kind} entities matching \"{name}\"")]
    AmbiguousError { kind: String, name: String },

    #[error("{kind} with name \"{name}\" not found")]
    NotFoundError { kind: String, name: String },

    #[error("Bundle \"{bundle}\" has no sale price of type \"{price_type}\"")]
    MissingFboPrice { bundle: String, price_type: String },

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value for {field}: \"{value}\" ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field: {field}")]
    MissingConfigError { field: String },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    DataIntegrity,
    Ambiguity,
    Configuration,
    Io,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ReportError {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::ProtocolError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::HttpError(_) | Self::RequestFailed { .. } | Self::UnstableList { .. } => {
                ErrorCategory::Network
            }
            Self::ProtocolError { .. }
            | Self::MissingFboPrice { .. }
            | Self::SerializationError(_) => ErrorCategory::DataIntegrity,
            Self::AmbiguousError { .. } | Self::NotFoundError { .. } => ErrorCategory::Ambiguity,
            Self::ConfigError { .. }
            | Self::InvalidHeader { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. }
            | Self::ConfigValidationError { .. } => ErrorCategory::Configuration,
            Self::XlsxError(_) | Self::CsvError(_) | Self::IoError(_) => ErrorCategory::Io,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::DataIntegrity | ErrorCategory::Ambiguity => ErrorSeverity::High,
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::Io => ErrorSeverity::Critical,
        }
    }

    /// Short message for the terminal, without internal detail.
    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::RequestFailed { tries, .. } => {
                format!("The catalog API did not answer successfully after {} attempts", tries)
            }
            Self::UnstableList { .. } => {
                "The catalog listing kept changing and never settled".to_string()
            }
            Self::MissingFboPrice { bundle, price_type } => {
                format!("Bundle \"{}\" has no \"{}\" price", bundle, price_type)
            }
            Self::AmbiguousError { .. } | Self::NotFoundError { .. } => self.to_string(),
            Self::ProtocolError { .. } | Self::SerializationError(_) => {
                format!("The catalog API returned unexpected data: {}", self)
            }
            _ => self.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => {
                "Check the API token and network access, or raise api.retry_count"
            }
            ErrorCategory::DataIntegrity => {
                "Re-run the report; if it persists, inspect the entity in the catalog web UI"
            }
            ErrorCategory::Ambiguity => "Make the name or barcode unique in the catalog",
            ErrorCategory::Configuration => "Fix the configuration file or command line flags",
            ErrorCategory::Io => "Check that the output path exists and is writable",
        }
    }

    /// Process exit code derived from severity.
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
