//! CLI output formatting.
//!
//! Every command prints plain lines built by the pure functions here, so the
//! formatting is testable without running a render.
//!
//! ## Render
//!
//! One header line per request URL, in input order. Successful responses get
//! the written file as an indented context line:
//!
//! ```text
//! 001 200 image (2481 bytes)
//!     Request: http://svc/img?empty=10,10&blur=2
//!     Output: out/1.png
//! 002 400 invalid: Too many arguments for crop: expected at most 4
//!     Request: http://svc/img?empty=10,10&crop=1,2,3,4,5
//! ```
//!
//! ## Ops
//!
//! ```text
//! blur       args ≤ 1
//! border     args ≤ 4  flags: color
//! ```

use crate::engine::{OutputFormat, Response};
use crate::error::Outcome;
use crate::operations::REGISTRY;
use std::path::PathBuf;

/// What happened to one request URL given on the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderReport {
    /// 1-based position on the command line.
    pub index: usize,
    pub url: String,
    pub status: u16,
    pub summary: String,
    pub bytes: usize,
    pub written: Option<PathBuf>,
}

/// Short label for an outcome; validation messages are included verbatim.
pub fn outcome_summary(outcome: &Outcome) -> String {
    match outcome {
        Outcome::Image(_) => "image".to_string(),
        Outcome::Passthrough(_) => "passthrough".to_string(),
        Outcome::Invalid(e) => format!("invalid: {}", e.message()),
        Outcome::Internal(e) => format!("error: {}", e.message()),
    }
}

/// File extension for a response body, from its `Content-Type`.
pub fn extension_for(response: &Response) -> &'static str {
    let Some(content_type) = response.header("content-type") else {
        return "bin";
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if let Some(format) = OutputFormat::ALL.iter().find(|f| f.mime_type() == mime) {
        return format.extension();
    }
    match mime.as_str() {
        "text/plain" => "txt",
        "text/html" => "html",
        _ => "bin",
    }
}

pub fn format_render_report(report: &RenderReport) -> Vec<String> {
    let header = if report.summary == "image" || report.summary == "passthrough" {
        format!(
            "{:03} {} {} ({} bytes)",
            report.index, report.status, report.summary, report.bytes
        )
    } else {
        format!("{:03} {} {}", report.index, report.status, report.summary)
    };
    let mut lines = vec![header, format!("    Request: {}", report.url)];
    if let Some(path) = &report.written {
        lines.push(format!("    Output: {}", path.display()));
    }
    lines
}

/// One line per registered operation, in registry order.
pub fn format_ops_table() -> Vec<String> {
    let width = REGISTRY.iter().map(|d| d.name.len()).max().unwrap_or(0);
    REGISTRY
        .iter()
        .map(|def| {
            let mut line = format!("{:<width$}  args ≤ {}", def.name, def.max_args);
            if !def.flags.is_empty() {
                line.push_str(&format!("  flags: {}", def.flags.join(", ")));
            }
            line
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    fn response_with(content_type: &str) -> Response {
        Response {
            status: 200,
            headers: vec![("Content-Type".into(), content_type.into())],
            body: Vec::new(),
        }
    }

    #[test]
    fn extension_from_image_mime() {
        assert_eq!(extension_for(&response_with("image/png")), "png");
        assert_eq!(extension_for(&response_with("image/jpeg")), "jpg");
        assert_eq!(extension_for(&response_with("image/webp")), "webp");
    }

    #[test]
    fn extension_ignores_parameters_and_case() {
        assert_eq!(
            extension_for(&response_with("Text/Plain; charset=utf-8")),
            "txt"
        );
    }

    #[test]
    fn extension_fallback() {
        assert_eq!(extension_for(&response_with("application/json")), "bin");
        let bare = Response {
            status: 200,
            headers: Vec::new(),
            body: Vec::new(),
        };
        assert_eq!(extension_for(&bare), "bin");
    }

    #[test]
    fn summary_includes_validation_message() {
        let outcome = Outcome::Invalid(ValidationError::new("Missing url or empty parameter"));
        assert_eq!(
            outcome_summary(&outcome),
            "invalid: Missing url or empty parameter"
        );
    }

    #[test]
    fn report_lines() {
        let report = RenderReport {
            index: 2,
            url: "http://svc/img?empty=1,1".into(),
            status: 200,
            summary: "image".into(),
            bytes: 67,
            written: Some(PathBuf::from("out/2.png")),
        };
        assert_eq!(
            format_render_report(&report),
            vec![
                "002 200 image (67 bytes)",
                "    Request: http://svc/img?empty=1,1",
                "    Output: out/2.png",
            ]
        );
    }

    #[test]
    fn error_report_has_no_byte_count() {
        let report = RenderReport {
            index: 1,
            url: "x".into(),
            status: 400,
            summary: "invalid: nope".into(),
            bytes: 4,
            written: None,
        };
        assert_eq!(format_render_report(&report)[0], "001 400 invalid: nope");
    }

    #[test]
    fn ops_table_lists_registry() {
        let lines = format_ops_table();
        assert_eq!(lines.len(), REGISTRY.len());
        let border = lines.iter().find(|l| l.starts_with("border")).unwrap();
        assert!(border.ends_with("flags: color"), "{border}");
        let overlay = lines.iter().find(|l| l.starts_with("overlay")).unwrap();
        assert!(overlay.contains("x, y, hrepeat, vrepeat"), "{overlay}");
    }
}
