//! Capture request parsing and validation
//!
//! Turns untrusted, string-typed query parameters into a bounded
//! [`CaptureOptions`] record. Nothing in here touches the network or a browser.

use crate::ValidationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const MIN_QUALITY: u32 = 1;
pub const MAX_QUALITY: u32 = 100;
pub const DEFAULT_QUALITY: u32 = 100;
pub const MIN_WIDTH: u32 = 1;
pub const MAX_WIDTH: u32 = 1920;
pub const DEFAULT_WIDTH: u32 = 1440;
pub const MIN_HEIGHT: u32 = 1;
pub const MAX_HEIGHT: u32 = 10_000;
pub const DEFAULT_HEIGHT: u32 = 900;
pub const MAX_DELAY_MS: u64 = 30_000;

/// Raw query parameters of a capture request, exactly as received.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    pub url: Option<String>,
    pub full_page: Option<String>,
    pub quality: Option<String>,
    #[serde(rename = "type")]
    pub format: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub wait_until: Option<String>,
    pub wait_for_selector: Option<String>,
    #[serde(rename = "delay")]
    pub delay_ms: Option<String>,
    pub color_scheme: Option<String>,
}

impl CaptureRequest {
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }
}

/// Output image encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Webp,
    Jpeg,
}

impl ImageFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Webp => "webp",
            ImageFormat::Jpeg => "jpeg",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Webp => "image/webp",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }

    /// Lossy encoders are the only ones that take a quality setting.
    pub fn is_lossy(self) -> bool {
        !matches!(self, ImageFormat::Png)
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "png" => Some(ImageFormat::Png),
            "webp" => Some(ImageFormat::Webp),
            "jpeg" => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }
}

/// Condition navigation waits for before the capture sequence continues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum WaitUntil {
    #[serde(rename = "load")]
    Load,
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    /// No network connections for at least 500 ms.
    #[serde(rename = "networkidle0")]
    NetworkIdle0,
    /// At most two network connections for at least 500 ms.
    #[default]
    #[serde(rename = "networkidle2")]
    NetworkIdle2,
}

impl WaitUntil {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "load" => Some(WaitUntil::Load),
            "domcontentloaded" => Some(WaitUntil::DomContentLoaded),
            "networkidle0" => Some(WaitUntil::NetworkIdle0),
            "networkidle2" => Some(WaitUntil::NetworkIdle2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorScheme {
    Light,
    Dark,
}

impl ColorScheme {
    pub fn as_str(self) -> &'static str {
        match self {
            ColorScheme::Light => "light",
            ColorScheme::Dark => "dark",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "light" => Some(ColorScheme::Light),
            "dark" => Some(ColorScheme::Dark),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Default for Dimensions {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

/// Validated, immutable capture parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOptions {
    pub url: Url,
    pub full_page: bool,
    pub quality: u32,
    pub format: ImageFormat,
    pub dimensions: Dimensions,
    pub wait_until: WaitUntil,
    pub wait_for_selector: Option<String>,
    pub delay: Option<Duration>,
    pub color_scheme: Option<ColorScheme>,
}

impl CaptureOptions {
    /// Hostname checked by the allow-list gate.
    pub fn hostname(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn screenshot_spec(&self) -> ScreenshotSpec {
        ScreenshotSpec {
            format: self.format,
            quality: self.format.is_lossy().then_some(self.quality),
            full_page: self.full_page,
        }
    }
}

/// Encoder settings handed to the page for the final capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenshotSpec {
    pub format: ImageFormat,
    /// Always `None` for lossless formats.
    pub quality: Option<u32>,
    pub full_page: bool,
}

/// Validates every field of `raw`, collecting all violations.
pub fn validate(raw: &CaptureRequest) -> Result<CaptureOptions, ValidationError> {
    let mut errors = ValidationError::default();

    let url = match raw.url.as_deref() {
        None => {
            errors.push("url", "Required");
            None
        }
        Some(value) => match parse_url(value) {
            Ok(url) => Some(url),
            Err(message) => {
                errors.push("url", message);
                None
            }
        },
    };

    let full_page = match raw.full_page.as_deref() {
        None | Some("false") => false,
        Some("true") => true,
        Some(other) => {
            errors.push(
                "fullPage",
                format!("Invalid enum value. Expected 'true' | 'false', received '{other}'"),
            );
            false
        }
    };

    let quality = bounded_int(
        &mut errors,
        "quality",
        raw.quality.as_deref(),
        MIN_QUALITY.into(),
        MAX_QUALITY.into(),
    )
    .map_or(DEFAULT_QUALITY, |q| q as u32);

    let format = enum_field(
        &mut errors,
        "type",
        raw.format.as_deref(),
        ImageFormat::parse,
        "'png' | 'webp' | 'jpeg'",
    )
    .unwrap_or_default();

    let width = bounded_int(
        &mut errors,
        "width",
        raw.width.as_deref(),
        MIN_WIDTH.into(),
        MAX_WIDTH.into(),
    )
    .map_or(DEFAULT_WIDTH, |w| w as u32);

    let height = bounded_int(
        &mut errors,
        "height",
        raw.height.as_deref(),
        MIN_HEIGHT.into(),
        MAX_HEIGHT.into(),
    )
    .map_or(DEFAULT_HEIGHT, |h| h as u32);

    let wait_until = enum_field(
        &mut errors,
        "waitUntil",
        raw.wait_until.as_deref(),
        WaitUntil::parse,
        "'load' | 'domcontentloaded' | 'networkidle0' | 'networkidle2'",
    )
    .unwrap_or_default();

    let wait_for_selector = raw
        .wait_for_selector
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let delay = bounded_int(&mut errors, "delay", raw.delay_ms.as_deref(), 0, MAX_DELAY_MS)
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis);

    let color_scheme = enum_field(
        &mut errors,
        "colorScheme",
        raw.color_scheme.as_deref(),
        ColorScheme::parse,
        "'light' | 'dark'",
    );

    match url {
        Some(url) if errors.is_empty() => Ok(CaptureOptions {
            url,
            full_page,
            quality,
            format,
            dimensions: Dimensions { width, height },
            wait_until,
            wait_for_selector,
            delay,
            color_scheme,
        }),
        _ => Err(errors),
    }
}

fn parse_url(value: &str) -> Result<Url, String> {
    let url = Url::parse(value).map_err(|_| "Invalid url".to_string())?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        "http" | "https" => Err("Invalid url".to_string()),
        scheme => Err(format!(
            "Unsupported url scheme '{scheme}', expected http or https"
        )),
    }
}

/// Coerces a string to a whole number and checks it against `[min, max]`.
///
/// Returns `None` when the field is absent or invalid; invalid values are
/// recorded in `errors`. Blank input coerces to zero before the bound check.
fn bounded_int(
    errors: &mut ValidationError,
    field: &'static str,
    value: Option<&str>,
    min: u64,
    max: u64,
) -> Option<u64> {
    let value = value?.trim();
    let number = if value.is_empty() {
        0.0
    } else {
        match value.parse::<f64>() {
            Ok(n) if n.is_finite() => n,
            _ => {
                errors.push(field, "Expected number, received nan");
                return None;
            }
        }
    };

    if number.fract() != 0.0 {
        errors.push(field, "Expected integer, received float");
        return None;
    }
    if number < min as f64 {
        errors.push(
            field,
            format!("Number must be greater than or equal to {min}"),
        );
        return None;
    }
    if number > max as f64 {
        errors.push(field, format!("Number must be less than or equal to {max}"));
        return None;
    }
    Some(number as u64)
}

fn enum_field<T>(
    errors: &mut ValidationError,
    field: &'static str,
    value: Option<&str>,
    parse: fn(&str) -> Option<T>,
    expected: &str,
) -> Option<T> {
    let value = value?;
    let parsed = parse(value);
    if parsed.is_none() {
        errors.push(
            field,
            format!("Invalid enum value. Expected {expected}, received '{value}'"),
        );
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(pairs: &[(&str, &str)]) -> CaptureRequest {
        let mut req = CaptureRequest::default();
        for (key, value) in pairs {
            let value = Some(value.to_string());
            match *key {
                "url" => req.url = value,
                "fullPage" => req.full_page = value,
                "quality" => req.quality = value,
                "type" => req.format = value,
                "width" => req.width = value,
                "height" => req.height = value,
                "waitUntil" => req.wait_until = value,
                "waitForSelector" => req.wait_for_selector = value,
                "delay" => req.delay_ms = value,
                "colorScheme" => req.color_scheme = value,
                other => panic!("unknown field {other}"),
            }
        }
        req
    }

    #[test]
    fn applies_defaults() {
        let options = validate(&CaptureRequest::for_url("https://example.com")).unwrap();

        assert_eq!(options.url.as_str(), "https://example.com/");
        assert!(!options.full_page);
        assert_eq!(options.quality, 100);
        assert_eq!(options.format, ImageFormat::Png);
        assert_eq!(options.dimensions, Dimensions { width: 1440, height: 900 });
        assert_eq!(options.wait_until, WaitUntil::NetworkIdle2);
        assert!(options.wait_for_selector.is_none());
        assert!(options.delay.is_none());
        assert!(options.color_scheme.is_none());
    }

    #[test]
    fn accepts_every_field_within_bounds() {
        let options = validate(&request(&[
            ("url", "https://example.com/page?x=1"),
            ("fullPage", "true"),
            ("quality", "80"),
            ("type", "jpeg"),
            ("width", "800"),
            ("height", "600"),
            ("waitUntil", "domcontentloaded"),
            ("waitForSelector", "#app"),
            ("delay", "250"),
            ("colorScheme", "dark"),
        ]))
        .unwrap();

        assert!(options.full_page);
        assert_eq!(options.quality, 80);
        assert_eq!(options.format, ImageFormat::Jpeg);
        assert_eq!(options.dimensions, Dimensions { width: 800, height: 600 });
        assert_eq!(options.wait_until, WaitUntil::DomContentLoaded);
        assert_eq!(options.wait_for_selector.as_deref(), Some("#app"));
        assert_eq!(options.delay, Some(Duration::from_millis(250)));
        assert_eq!(options.color_scheme, Some(ColorScheme::Dark));
    }

    #[test]
    fn accepts_inclusive_bounds() {
        for (width, height, quality, delay) in [("1", "1", "1", "0"), ("1920", "10000", "100", "30000")] {
            let options = validate(&request(&[
                ("url", "http://example.com"),
                ("width", width),
                ("height", height),
                ("quality", quality),
                ("delay", delay),
            ]))
            .unwrap();
            assert_eq!(options.dimensions.width.to_string(), width);
            assert_eq!(options.dimensions.height.to_string(), height);
            assert_eq!(options.quality.to_string(), quality);
        }
    }

    #[test]
    fn reports_every_violated_field() {
        let err = validate(&request(&[
            ("url", "not a url"),
            ("fullPage", "yes"),
            ("quality", "0"),
            ("type", "gif"),
            ("width", "1921"),
            ("height", "abc"),
            ("waitUntil", "networkidle"),
            ("delay", "30001"),
            ("colorScheme", "sepia"),
        ]))
        .unwrap_err();

        for field in [
            "url",
            "fullPage",
            "quality",
            "type",
            "width",
            "height",
            "waitUntil",
            "delay",
            "colorScheme",
        ] {
            assert!(err.has_field(field), "missing error for {field}: {err}");
        }
        assert_eq!(err.fields.len(), 9);
    }

    #[test]
    fn missing_url_is_required() {
        let err = validate(&CaptureRequest::default()).unwrap_err();
        assert_eq!(err.field_errors()["url"], vec!["Required".to_string()]);
    }

    #[test]
    fn rejects_relative_and_non_http_urls() {
        assert!(validate(&CaptureRequest::for_url("/relative/path")).is_err());
        assert!(validate(&CaptureRequest::for_url("example.com")).is_err());
        assert!(validate(&CaptureRequest::for_url("file:///etc/passwd")).is_err());
        assert!(validate(&CaptureRequest::for_url("javascript:alert(1)")).is_err());
    }

    #[test]
    fn rejects_fractional_numbers() {
        let err = validate(&request(&[("url", "https://example.com"), ("width", "800.5")]))
            .unwrap_err();
        assert!(err.has_field("width"));
    }

    #[test]
    fn blank_numbers_coerce_to_zero() {
        let err = validate(&request(&[("url", "https://example.com"), ("width", "")]))
            .unwrap_err();
        assert!(err.has_field("width"));

        let options = validate(&request(&[("url", "https://example.com"), ("delay", "")]))
            .unwrap();
        assert!(options.delay.is_none());
    }

    #[test]
    fn empty_selector_is_ignored() {
        let options = validate(&request(&[
            ("url", "https://example.com"),
            ("waitForSelector", ""),
        ]))
        .unwrap();
        assert!(options.wait_for_selector.is_none());
    }

    #[test]
    fn quality_only_reaches_lossy_encoders() {
        let png = validate(&request(&[("url", "https://example.com"), ("quality", "50")]))
            .unwrap();
        assert_eq!(png.screenshot_spec().quality, None);

        let webp = validate(&request(&[
            ("url", "https://example.com"),
            ("quality", "50"),
            ("type", "webp"),
        ]))
        .unwrap();
        assert_eq!(webp.screenshot_spec().quality, Some(50));
    }

    #[test]
    fn deserializes_query_names() {
        let req: CaptureRequest = serde_json::from_value(serde_json::json!({
            "url": "https://example.com",
            "type": "webp",
            "delay": "10",
            "fullPage": "true",
            "waitForSelector": ".ready"
        }))
        .unwrap();

        assert_eq!(req.format.as_deref(), Some("webp"));
        assert_eq!(req.delay_ms.as_deref(), Some("10"));
        assert_eq!(req.full_page.as_deref(), Some("true"));
        assert_eq!(req.wait_for_selector.as_deref(), Some(".ready"));
    }
}
