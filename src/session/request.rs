//! Job request building and validation.
//!
//! A [`JobRequest`] carries everything one `POST /api/{tool}/process` needs:
//! the pending files, the tool-specific parameters and the output format.
//! Validation happens before anything is sent.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;
use crate::files::PendingFile;
use crate::presets::model::CityPreset;
use crate::presets::prefill::ContactForm;
use crate::presets::selector::CascadingSelector;
use crate::tool::Tool;

// ─────────────────────────────────────────────────────────────────────────────
// Output Format
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
    Tiff,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Tiff => "tiff",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "tiff" | "tif" => Ok(OutputFormat::Tiff),
            other => Err(AppError::InvalidParameter(format!(
                "Unsupported output format: {}",
                other
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resizing
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    Exact,
    #[default]
    Fit,
    Fill,
    Percentage,
}

impl ResizeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResizeMode::Exact => "exact",
            ResizeMode::Fit => "fit",
            ResizeMode::Fill => "fill",
            ResizeMode::Percentage => "percentage",
        }
    }
}

impl std::str::FromStr for ResizeMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(ResizeMode::Exact),
            "fit" => Ok(ResizeMode::Fit),
            "fill" => Ok(ResizeMode::Fill),
            "percentage" => Ok(ResizeMode::Percentage),
            other => Err(AppError::InvalidParameter(format!(
                "Unknown resize mode: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResizeParams {
    pub mode: ResizeMode,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub percentage: Option<u32>,
}

impl ResizeParams {
    fn validate(&self) -> Result<(), AppError> {
        match self.mode {
            ResizeMode::Percentage => match self.percentage {
                None => Err(AppError::MissingField(
                    "Please enter a resize percentage.".into(),
                )),
                Some(p) if !(1..=1000).contains(&p) => Err(AppError::InvalidParameter(
                    "Percentage must be between 1 and 1000".into(),
                )),
                Some(_) => Ok(()),
            },
            _ => {
                let given = |v: Option<u32>| v.is_some_and(|v| v > 0);
                if given(self.width) || given(self.height) {
                    Ok(())
                } else {
                    Err(AppError::MissingField(
                        "Please enter a width or height.".into(),
                    ))
                }
            }
        }
    }

    fn push_fields(&self, fields: &mut Vec<(&'static str, String)>) {
        fields.push(("resize_mode", self.mode.as_str().to_string()));
        if self.mode == ResizeMode::Percentage {
            if let Some(p) = self.percentage {
                fields.push(("percentage", p.to_string()));
            }
            return;
        }
        if let Some(w) = self.width.filter(|w| *w > 0) {
            fields.push(("width", w.to_string()));
        }
        if let Some(h) = self.height.filter(|h| *h > 0) {
            fields.push(("height", h.to_string()));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Watermark
// ─────────────────────────────────────────────────────────────────────────────

pub const DEFAULT_WATERMARK_OPACITY: u8 = 50;
pub const DEFAULT_WATERMARK_SIZE: u8 = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

impl WatermarkPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatermarkPosition::TopLeft => "top_left",
            WatermarkPosition::TopRight => "top_right",
            WatermarkPosition::BottomLeft => "bottom_left",
            WatermarkPosition::BottomRight => "bottom_right",
            WatermarkPosition::Center => "center",
        }
    }
}

impl std::str::FromStr for WatermarkPosition {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "top_left" => Ok(WatermarkPosition::TopLeft),
            "top_right" => Ok(WatermarkPosition::TopRight),
            "bottom_left" => Ok(WatermarkPosition::BottomLeft),
            "bottom_right" => Ok(WatermarkPosition::BottomRight),
            "center" => Ok(WatermarkPosition::Center),
            other => Err(AppError::InvalidParameter(format!(
                "Unknown watermark position: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatermarkKind {
    Text(String),
    /// `None` until an image has been picked.
    Image(Option<PendingFile>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatermarkParams {
    pub kind: WatermarkKind,
    pub position: WatermarkPosition,
    /// 0-100.
    pub opacity: u8,
    /// Percent of the image width, 1-100.
    pub size: u8,
}

impl WatermarkParams {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: WatermarkKind::Text(text.into()),
            position: WatermarkPosition::default(),
            opacity: DEFAULT_WATERMARK_OPACITY,
            size: DEFAULT_WATERMARK_SIZE,
        }
    }

    pub fn image(image: Option<PendingFile>) -> Self {
        Self {
            kind: WatermarkKind::Image(image),
            ..Self::text(String::new())
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        match &self.kind {
            WatermarkKind::Text(text) if text.trim().is_empty() => {
                return Err(AppError::MissingField("Please enter watermark text.".into()));
            }
            WatermarkKind::Image(None) => {
                return Err(AppError::MissingField(
                    "Please select a watermark image.".into(),
                ));
            }
            _ => {}
        }
        if self.opacity > 100 {
            return Err(AppError::InvalidParameter(
                "Opacity must be between 0 and 100".into(),
            ));
        }
        if !(1..=100).contains(&self.size) {
            return Err(AppError::InvalidParameter(
                "Size must be between 1 and 100".into(),
            ));
        }
        Ok(())
    }

    fn push_fields(&self, fields: &mut Vec<(&'static str, String)>) {
        match &self.kind {
            WatermarkKind::Text(text) => {
                fields.push(("watermark_type", "text".into()));
                fields.push(("watermark_text", text.clone()));
            }
            WatermarkKind::Image(_) => fields.push(("watermark_type", "image".into())),
        }
        fields.push(("position", self.position.as_str().into()));
        fields.push(("opacity", self.opacity.to_string()));
        fields.push(("size", self.size.to_string()));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Geotagging Metadata
// ─────────────────────────────────────────────────────────────────────────────

/// The `exif_data` JSON document. Absent keys are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GeotagMetadata {
    #[serde(rename = "GPSLatitude", skip_serializing_if = "Option::is_none")]
    pub gps_latitude: Option<f64>,
    #[serde(rename = "GPSLongitude", skip_serializing_if = "Option::is_none")]
    pub gps_longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_random_coordinates: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<CityPreset>,
    #[serde(rename = "CityDisplayName", skip_serializing_if = "Option::is_none")]
    pub city_display_name: Option<String>,
    #[serde(rename = "GPSDateStamp", skip_serializing_if = "Option::is_none")]
    pub gps_date_stamp: Option<String>,
    #[serde(rename = "GPSTimeStamp", skip_serializing_if = "Option::is_none")]
    pub gps_time_stamp: Option<String>,
    #[serde(rename = "XMP:GPSDateTime", skip_serializing_if = "Option::is_none")]
    pub xmp_gps_date_time: Option<String>,
    #[serde(rename = "Creator", skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(rename = "CreatorTitle", skip_serializing_if = "Option::is_none")]
    pub creator_title: Option<String>,
    #[serde(rename = "Address", skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(rename = "City", skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(rename = "State", skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(rename = "PostalCode", skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(rename = "Country", skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(rename = "Phone", skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(rename = "Email", skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "URL", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "ContactURL", skip_serializing_if = "Option::is_none")]
    pub contact_url: Option<String>,
    #[serde(rename = "Keywords", skip_serializing_if = "Option::is_none")]
    pub keywords: Option<Vec<String>>,
    #[serde(rename = "ContactCountry", skip_serializing_if = "Option::is_none")]
    pub contact_country: Option<String>,
    #[serde(rename = "ContactState", skip_serializing_if = "Option::is_none")]
    pub contact_state: Option<String>,
    #[serde(rename = "ContactCity", skip_serializing_if = "Option::is_none")]
    pub contact_city: Option<String>,
}

impl GeotagMetadata {
    /// Collects the geotagging form: coordinates and city from the cascading
    /// selector, contact fields from the contact form.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidParameter` - a coordinate field is not a number
    pub fn collect(
        selector: &CascadingSelector,
        contact: &ContactForm,
        taken_at: Option<DateTime<Utc>>,
    ) -> Result<Self, AppError> {
        let fields = selector.fields();
        let non_blank = |v: &str| (!v.trim().is_empty()).then(|| v.to_string());

        let mut metadata = GeotagMetadata {
            gps_latitude: parse_coordinate(&fields.latitude, "Latitude")?,
            gps_longitude: parse_coordinate(&fields.longitude, "Longitude")?,
            use_random_coordinates: fields.use_random_coordinates.then_some(true),
            preset: selector.city().cloned(),
            city_display_name: selector
                .city()
                .map(|c| c.name.clone())
                .filter(|n| !n.is_empty()),
            creator: non_blank(&contact.creator),
            creator_title: non_blank(&contact.creator_title),
            address: non_blank(&contact.address),
            city: non_blank(&contact.city),
            state: selector.state().and_then(non_blank),
            postal_code: non_blank(&contact.postal_code),
            country: selector.country().and_then(non_blank),
            phone: non_blank(&contact.phone),
            email: non_blank(&contact.email),
            url: non_blank(&contact.url),
            contact_url: non_blank(&contact.url),
            contact_country: non_blank(&contact.country),
            contact_state: non_blank(&contact.state),
            contact_city: non_blank(&contact.city),
            ..Default::default()
        };

        let keywords = contact.keyword_list();
        if !keywords.is_empty() {
            metadata.keywords = Some(keywords);
        }

        if let Some(at) = taken_at {
            metadata.set_timestamp(at);
        }

        Ok(metadata)
    }

    /// Sets the GPS date, time and XMP timestamp, all in UTC.
    pub fn set_timestamp(&mut self, at: DateTime<Utc>) {
        self.gps_date_stamp = Some(at.format("%Y:%m:%d").to_string());
        self.gps_time_stamp = Some(at.format("%H:%M:%S").to_string());
        self.xmp_gps_date_time = Some(at.format("%Y-%m-%dT%H:%M:%SZ").to_string());
    }
}

fn parse_coordinate(raw: &str, label: &str) -> Result<Option<f64>, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>()
        .map(Some)
        .map_err(|_| AppError::InvalidParameter(format!("{} must be a number", label)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Job Request
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum JobParameters {
    Geotagging(GeotagMetadata),
    Conversion,
    Resizing(ResizeParams),
    Watermark(WatermarkParams),
}

impl JobParameters {
    pub fn tool(&self) -> Tool {
        match self {
            JobParameters::Geotagging(_) => Tool::Geotagging,
            JobParameters::Conversion => Tool::Conversion,
            JobParameters::Resizing(_) => Tool::Resizing,
            JobParameters::Watermark(_) => Tool::Watermark,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub files: Vec<PendingFile>,
    pub parameters: JobParameters,
    pub output_format: OutputFormat,
}

impl JobRequest {
    pub fn new(files: Vec<PendingFile>, parameters: JobParameters, output_format: OutputFormat) -> Self {
        Self {
            files,
            parameters,
            output_format,
        }
    }

    pub fn tool(&self) -> Tool {
        self.parameters.tool()
    }

    /// Rejects a request that must not be sent.
    ///
    /// # Errors
    ///
    /// - `AppError::NoFilesSelected` - empty file set, for every tool
    /// - `AppError::MissingField` - a required tool parameter is blank
    /// - `AppError::InvalidParameter` - a parameter is out of range
    pub fn validate(&self) -> Result<(), AppError> {
        if self.files.is_empty() {
            return Err(AppError::NoFilesSelected);
        }
        match &self.parameters {
            JobParameters::Resizing(params) => params.validate(),
            JobParameters::Watermark(params) => params.validate(),
            JobParameters::Geotagging(_) | JobParameters::Conversion => Ok(()),
        }
    }

    /// Plain text fields of the multipart body, in send order.
    pub fn text_fields(&self) -> Result<Vec<(&'static str, String)>, AppError> {
        let mut fields = Vec::new();
        match &self.parameters {
            JobParameters::Geotagging(metadata) => {
                let json = serde_json::to_string(metadata).map_err(|e| {
                    AppError::Internal(format!("Failed to serialize exif_data: {}", e))
                })?;
                fields.push(("exif_data", json));
            }
            JobParameters::Conversion => {}
            JobParameters::Resizing(params) => params.push_fields(&mut fields),
            JobParameters::Watermark(params) => params.push_fields(&mut fields),
        }
        fields.push(("output_format", self.output_format.as_str().to_string()));
        Ok(fields)
    }

    /// Extra file part beside `files[]`, if any.
    pub fn watermark_image(&self) -> Option<&PendingFile> {
        match &self.parameters {
            JobParameters::Watermark(WatermarkParams {
                kind: WatermarkKind::Image(image),
                ..
            }) => image.as_ref(),
            _ => None,
        }
    }

    /// Bytes counted for upload progress.
    pub fn total_bytes(&self) -> u64 {
        let images: u64 = self.files.iter().map(|f| f.size_bytes).sum();
        images + self.watermark_image().map(|f| f.size_bytes).unwrap_or(0)
    }
}
