//! Output formatting for frames.
//!
//! Frames are printed one per row in table, CSV, or JSON Lines format. Table
//! and CSV rows summarize the layer chain and the properties of the top
//! layer; JSON rows carry the full layer tree.

use std::fmt::Write as _;
use std::io::Write;
use std::sync::Arc;

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use serde_json::{json, Map, Value as Json};

use capflow_core::{Frame, Layer, Token, TokenRegistry, Value};

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed table (default)
    Table,
    /// Comma-separated values
    Csv,
    /// JSON Lines (one JSON object per frame)
    Json,
}

/// Formats frames for output.
pub struct OutputFormatter<'a> {
    format: OutputFormat,
    tokens: &'a TokenRegistry,
}

impl<'a> OutputFormatter<'a> {
    pub fn new(format: OutputFormat, tokens: &'a TokenRegistry) -> Self {
        Self { format, tokens }
    }

    /// Format frames and write them to the given writer.
    pub fn write<W: Write>(&self, frames: &[Arc<Frame>], writer: &mut W) -> std::io::Result<()> {
        match self.format {
            OutputFormat::Table => self.write_table(frames, writer),
            OutputFormat::Csv => self.write_csv(frames, writer),
            OutputFormat::Json => self.write_json(frames, writer),
        }
    }

    fn name(&self, token: Token) -> String {
        self.tokens
            .string(token)
            .map(|s| s.to_string())
            .unwrap_or_else(|| token.to_string())
    }

    /// Property names are stored with a leading dot.
    fn property_name(&self, token: Token) -> String {
        let name = self.name(token);
        name.strip_prefix('.').map(str::to_string).unwrap_or(name)
    }

    fn chain(&self, frame: &Frame) -> String {
        frame
            .layers()
            .map(|(layer, _)| self.name(layer.id))
            .collect::<Vec<_>>()
            .join("/")
    }

    /// `name=value` pairs of the last layer in the tree.
    fn info(&self, frame: &Frame) -> String {
        let mut info = String::new();
        if let Some((top, _)) = frame.layers().last() {
            for property in top.properties() {
                if !info.is_empty() {
                    info.push(' ');
                }
                let _ = write!(info, "{}={}", self.property_name(property.id), property.value);
            }
        }
        if let Some(error) = frame.error() {
            if !info.is_empty() {
                info.push(' ');
            }
            let _ = write!(info, "error={error}");
        }
        info
    }

    fn write_table<W: Write>(&self, frames: &[Arc<Frame>], writer: &mut W) -> std::io::Result<()> {
        let mut table = Table::new();
        table.set_header(vec!["frame", "timestamp_us", "len", "layers", "info"]);

        for frame in frames {
            table.add_row(vec![
                Cell::new(frame.id()),
                Cell::new(frame.timestamp_us()),
                Cell::new(frame.len()),
                Cell::new(self.chain(frame)),
                Cell::new(self.info(frame)),
            ]);
        }

        writeln!(writer, "{table}")?;
        writeln!(writer, "({} frames)", frames.len())
    }

    fn write_csv<W: Write>(&self, frames: &[Arc<Frame>], writer: &mut W) -> std::io::Result<()> {
        writeln!(writer, "frame,timestamp_us,len,layers,info")?;
        for frame in frames {
            writeln!(
                writer,
                "{},{},{},{},{}",
                frame.id(),
                frame.timestamp_us(),
                frame.len(),
                escape_csv(&self.chain(frame)),
                escape_csv(&self.info(frame)),
            )?;
        }
        Ok(())
    }

    fn write_json<W: Write>(&self, frames: &[Arc<Frame>], writer: &mut W) -> std::io::Result<()> {
        for frame in frames {
            let layers: Vec<Json> = frame.roots().iter().map(|l| self.layer_json(l)).collect();
            let obj = json!({
                "frame": frame.id(),
                "timestamp_us": frame.timestamp_us(),
                "len": frame.len(),
                "layers": layers,
                "error": frame.error(),
            });
            writeln!(writer, "{obj}")?;
        }
        Ok(())
    }

    fn layer_json(&self, layer: &Layer) -> Json {
        let mut properties = Map::new();
        for property in layer.properties() {
            properties.insert(self.property_name(property.id), value_json(&property.value));
        }
        let tags: Vec<String> = layer.tags().iter().map(|t| self.name(*t)).collect();
        let children: Vec<Json> = layer.children().iter().map(|c| self.layer_json(c)).collect();
        json!({
            "id": self.name(layer.id),
            "tags": tags,
            "properties": properties,
            "children": children,
        })
    }
}

fn value_json(value: &Value) -> Json {
    match value {
        Value::UInt(v) => json!(v),
        Value::Int(v) => json!(v),
        Value::Float(v) => json!(v),
        Value::Str(s) => Json::String(s.to_string()),
        Value::Bytes(_) => Json::String(value.to_string()),
        Value::Map(entries) => Json::Object(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), value_json(v)))
                .collect(),
        ),
        Value::List(items) => Json::Array(items.iter().map(value_json).collect()),
        Value::Nil => Json::Null,
    }
}

fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
