//! Delivery of module reports
//!
//! Transports are fire-and-forget from the watcher's point of view: a failed
//! send is logged and never retried.

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use log::{info, warn};

use crate::error::{Result, WatchError};
use crate::module::ModuleReport;

/// Hands a batch of module reports to whatever collects them.
pub trait Transport: Send + Sync {
    fn send(&self, reports: &[ModuleReport]) -> Result<()>;
}

/// Deliver `reports`, logging instead of propagating failure.
pub fn send_or_log(transport: &dyn Transport, reports: &[ModuleReport]) {
    if let Err(e) = transport.send(reports) {
        warn!("Dropping report of {} module(s): {e}", reports.len());
    }
}

/// Writes each batch as an `<agent_data>` XML document into a directory.
#[derive(Debug, Clone)]
pub struct XmlFileTransport {
    agent_name: String,
    output_dir: PathBuf,
}

impl XmlFileTransport {
    pub fn new(agent_name: impl Into<String>, output_dir: impl Into<PathBuf>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).map_err(|e| {
            WatchError::Transport(format!(
                "cannot create output dir {}: {e}",
                output_dir.display()
            ))
        })?;
        Ok(Self {
            agent_name: agent_name.into(),
            output_dir,
        })
    }

    fn render(&self, reports: &[ModuleReport], timestamp: &str) -> String {
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        let _ = writeln!(
            xml,
            "<agent_data agent_name=\"{}\" timestamp=\"{}\">",
            escape_xml(&self.agent_name),
            timestamp
        );
        for report in reports {
            let _ = writeln!(
                xml,
                "  <module>\n    <name><![CDATA[{}]]></name>\n    <type>{}</type>\n    <data><![CDATA[{}]]></data>\n  </module>",
                escape_cdata(&report.name),
                report.kind,
                escape_cdata(&report.data)
            );
        }
        xml.push_str("</agent_data>\n");
        xml
    }
}

impl Transport for XmlFileTransport {
    fn send(&self, reports: &[ModuleReport]) -> Result<()> {
        let now = Utc::now();
        let xml = self.render(reports, &now.format("%Y/%m/%d %H:%M:%S").to_string());

        let file_name = format!(
            "{}.{}.data",
            file_stem(&self.agent_name),
            now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp_micros())
        );
        let tmp = self.output_dir.join(format!(".{file_name}.tmp"));
        let path = self.output_dir.join(file_name);

        // Write-then-rename so collectors never see a partial document
        fs::write(&tmp, xml)
            .and_then(|()| fs::rename(&tmp, &path))
            .map_err(|e| WatchError::Transport(format!("{}: {e}", path.display())))?;

        info!("Wrote {} module report(s) to {}", reports.len(), path.display());
        Ok(())
    }
}

/// Logs each report; used when no output directory is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTransport;

impl Transport for LogTransport {
    fn send(&self, reports: &[ModuleReport]) -> Result<()> {
        let body =
            serde_json::to_string(reports).map_err(|e| WatchError::Transport(e.to_string()))?;
        info!("report {body}");
        Ok(())
    }
}

/// Agent name reduced to a single safe path component.
///
/// Separators and other characters outside `[A-Za-z0-9._-]` become `_`, and
/// a leading dot is replaced so the file is neither hidden nor a `..`.
fn file_stem(agent_name: &str) -> String {
    let mut stem: String = agent_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() || stem.starts_with('.') {
        stem.insert(0, '_');
    }
    stem
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// A literal `]]>` would terminate the section early; split it across two.
fn escape_cdata(s: &str) -> String {
    s.replace("]]>", "]]]]><![CDATA[>")
}
