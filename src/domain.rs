use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::EtlError;

/// Declared format of an uploaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileFormat {
    Csv,
    Excel,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Csv => "CSV",
            FileFormat::Excel => "EXCEL",
        }
    }

    /// Guess the format from a file name extension
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => Some(FileFormat::Csv),
            "xls" | "xlsx" | "xlsm" | "xlsb" | "ods" => Some(FileFormat::Excel),
            _ => None,
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileFormat {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CSV" => Ok(FileFormat::Csv),
            "EXCEL" | "XLS" | "XLSX" => Ok(FileFormat::Excel),
            other => Err(EtlError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Audience tier of an indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Visibility {
    Public,
    #[default]
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "PUBLIC",
            Visibility::Private => "PRIVATE",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PUBLIC" => Ok(Visibility::Public),
            "PRIVATE" => Ok(Visibility::Private),
            other => Err(EtlError::Config(format!("unknown visibility '{}'", other))),
        }
    }
}

/// Lifecycle of a raw upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UploadStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "PENDING",
            UploadStatus::Processing => "PROCESSING",
            UploadStatus::Completed => "COMPLETED",
            UploadStatus::Failed => "FAILED",
        }
    }

    /// French label shown to administrators
    pub fn label(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "en attente",
            UploadStatus::Processing => "en traitement",
            UploadStatus::Completed => "complété",
            UploadStatus::Failed => "échoué",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Failed)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(UploadStatus::Pending),
            "PROCESSING" => Ok(UploadStatus::Processing),
            "COMPLETED" => Ok(UploadStatus::Completed),
            "FAILED" => Ok(UploadStatus::Failed),
            other => Err(EtlError::InvalidState(format!("unknown upload status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Named schema grouping, one per category name
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataModel {
    pub id: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A published catalog data asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Indicator {
    pub id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub category_id: Uuid,
    pub data_model_id: Option<Uuid>,
    pub visibility: Visibility,
    pub file_format: FileFormat,
    pub uploaded_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub is_processed: bool,
    pub processing_notes: String,
}

/// File content attached to a raw upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    #[serde(skip_serializing, default)]
    pub bytes: Vec<u8>,
}

/// Generated summary workbook for a completed upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportArtifact {
    pub file_name: String,
    #[serde(skip_serializing, default)]
    pub bytes: Vec<u8>,
}

/// One ingestion attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawUpload {
    pub id: Option<Uuid>,
    pub file: UploadedFile,
    pub file_format: FileFormat,
    pub category_id: Option<Uuid>,
    pub uploaded_by: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub status: UploadStatus,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub processing_completed_at: Option<DateTime<Utc>>,
    pub report: Option<String>,
    pub error_message: Option<String>,
    pub total_rows: usize,
    pub processed_rows: usize,
    pub failed_rows: usize,
    pub output: Option<ReportArtifact>,
}

impl RawUpload {
    pub fn new(
        file_name: impl Into<String>,
        bytes: Vec<u8>,
        file_format: FileFormat,
        category_id: Option<Uuid>,
        uploaded_by: Option<String>,
    ) -> Self {
        Self {
            id: None,
            file: UploadedFile {
                name: file_name.into(),
                bytes,
            },
            file_format,
            category_id,
            uploaded_by,
            uploaded_at: Utc::now(),
            status: UploadStatus::Pending,
            processing_started_at: None,
            processing_completed_at: None,
            report: None,
            error_message: None,
            total_rows: 0,
            processed_rows: 0,
            failed_rows: 0,
            output: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == UploadStatus::Pending
    }

    pub fn is_completed(&self) -> bool {
        self.status == UploadStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == UploadStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_format_parsing() {
        assert_eq!("csv".parse::<FileFormat>().unwrap(), FileFormat::Csv);
        assert_eq!(" EXCEL ".parse::<FileFormat>().unwrap(), FileFormat::Excel);
        let err = "PDF".parse::<FileFormat>().unwrap_err();
        assert!(matches!(err, EtlError::UnsupportedFormat(ref f) if f == "PDF"));
    }

    #[test]
    fn test_file_format_from_name() {
        assert_eq!(FileFormat::from_file_name("data.CSV"), Some(FileFormat::Csv));
        assert_eq!(FileFormat::from_file_name("stats.xlsx"), Some(FileFormat::Excel));
        assert_eq!(FileFormat::from_file_name("notes"), None);
        assert_eq!(FileFormat::from_file_name("image.png"), None);
    }

    #[test]
    fn test_enums_serialize_as_uppercase() {
        assert_eq!(serde_json::to_string(&UploadStatus::Completed).unwrap(), "\"COMPLETED\"");
        assert_eq!(serde_json::to_string(&Visibility::Public).unwrap(), "\"PUBLIC\"");
        assert_eq!(serde_json::to_string(&FileFormat::Excel).unwrap(), "\"EXCEL\"");
    }

    #[test]
    fn test_new_upload_is_pending() {
        let upload = RawUpload::new("a.csv", b"title\nA\n".to_vec(), FileFormat::Csv, None, None);
        assert!(upload.is_pending());
        assert!(!upload.status.is_terminal());
        assert_eq!(upload.total_rows, 0);
        assert!(upload.output.is_none());
    }
}
