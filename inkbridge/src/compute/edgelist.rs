//! Reference compute module: a minimal edge-list diagram compiler.
//!
//! This module exists so the bridge is exercisable end-to-end (CLI, tests)
//! without a real precompiled diagram module. The language is deliberately
//! tiny: one statement per line, either a bare node name or a chain of
//! `->`-connected node names. Comments start with `#`.
//!
//! ```text
//! # a small graph
//! x -> y
//! y -> z -> x
//! orphan
//! ```
//!
//! The codec entry points round-trip source text through base64, and render
//! produces a small standalone SVG. Real deployments register their own
//! [`ComputeUnit`](super::ComputeUnit) through a
//! [`RegistryLoader`](super::RegistryLoader) instead.

use super::{err_envelope, ok_envelope, ComputeUnit, LAYOUT_KEY};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Node box width in the rendered output.
const NODE_WIDTH: f64 = 96.0;
/// Node box height in the rendered output.
const NODE_HEIGHT: f64 = 48.0;
/// Horizontal distance between node origins in the built-in layout.
const NODE_SPACING: f64 = 160.0;

/// The reference compute module.
#[derive(Debug, Default)]
pub struct EdgeListCompute;

impl EdgeListCompute {
    /// Registry name this module is packed under.
    pub const MODULE_NAME: &'static str = "edgelist";

    /// Creates a new module instance.
    pub fn new() -> Self {
        Self
    }

    /// Parses the source out of a compile request's virtual filesystem.
    ///
    /// Single-source requests use the `index` key; otherwise the request's
    /// files are concatenated in path order.
    fn source_of(request: &Value) -> Result<String, String> {
        let fs = request
            .get("fs")
            .and_then(Value::as_object)
            .ok_or_else(|| "compile error: request has no fs map".to_string())?;
        if fs.is_empty() {
            return Err("compile error: fs map is empty".to_string());
        }
        if let Some(index) = fs.get(crate::protocol::INDEX_FILE).and_then(Value::as_str) {
            return Ok(index.to_string());
        }
        // Deterministic order for multi-file requests.
        let mut paths: Vec<&String> = fs.keys().collect();
        paths.sort();
        let mut source = String::new();
        for path in paths {
            if let Some(text) = fs[path].as_str() {
                source.push_str(text);
                source.push('\n');
            }
        }
        Ok(source)
    }

    /// Parses edge-list source into node order and edges.
    fn parse(source: &str) -> Result<(Vec<String>, Vec<(String, String)>), String> {
        let mut nodes: Vec<String> = Vec::new();
        let mut edges: Vec<(String, String)> = Vec::new();

        let mut intern = |name: &str, line: usize| -> Result<String, String> {
            if name.is_empty() {
                return Err(format!("compile error: empty node name on line {line}"));
            }
            if name.contains(char::is_whitespace) {
                return Err(format!(
                    "compile error: invalid node name '{name}' on line {line}"
                ));
            }
            if !nodes.iter().any(|n| n == name) {
                nodes.push(name.to_string());
            }
            Ok(name.to_string())
        };

        for (index, raw_line) in source.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let number = index + 1;
            let parts: Vec<&str> = line.split("->").map(str::trim).collect();
            if parts.len() == 1 {
                intern(parts[0], number)?;
                continue;
            }
            // A chain `a -> b -> c` contributes an edge per adjacent pair.
            for pair in parts.windows(2) {
                let src = intern(pair[0], number)?;
                let dst = intern(pair[1], number)?;
                edges.push((src, dst));
            }
        }

        if nodes.is_empty() {
            return Err("compile error: source declares no nodes".to_string());
        }
        Ok((nodes, edges))
    }

    /// Built-in layout: nodes in a single row, declaration order.
    fn builtin_positions(nodes: &[String]) -> BTreeMap<String, (f64, f64)> {
        nodes
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), (i as f64 * NODE_SPACING, 0.0)))
            .collect()
    }

    /// Positions from a pre-computed layout graph threaded into the request.
    fn handoff_positions(layout: &Value) -> BTreeMap<String, (f64, f64)> {
        let mut positions = BTreeMap::new();
        if let Some(nodes) = layout.get("nodes").and_then(Value::as_array) {
            for node in nodes {
                let id = node.get("id").and_then(Value::as_str);
                let x = node.get("x").and_then(Value::as_f64);
                let y = node.get("y").and_then(Value::as_f64);
                if let (Some(id), Some(x), Some(y)) = (id, x, y) {
                    positions.insert(id.to_string(), (x, y));
                }
            }
        }
        positions
    }

    fn compile_document(request: &Value) -> Result<Value, String> {
        let source = Self::source_of(request)?;
        let (nodes, edges) = Self::parse(&source)?;

        let mut positions = Self::builtin_positions(&nodes);
        if let Some(layout) = request.get(LAYOUT_KEY) {
            for (id, position) in Self::handoff_positions(layout) {
                positions.insert(id, position);
            }
        }

        let node_docs: Vec<Value> = nodes
            .iter()
            .map(|id| {
                let (x, y) = positions[id];
                json!({
                    "id": id,
                    "x": x,
                    "y": y,
                    "width": NODE_WIDTH,
                    "height": NODE_HEIGHT,
                })
            })
            .collect();
        let edge_docs: Vec<Value> = edges
            .iter()
            .map(|(src, dst)| json!({"src": src, "dst": dst}))
            .collect();

        Ok(json!({"nodes": node_docs, "edges": edge_docs}))
    }

    fn render_svg(request: &Value) -> Result<String, String> {
        let diagram = request
            .get("diagram")
            .ok_or_else(|| "render error: request has no diagram".to_string())?;
        let nodes = diagram
            .get("nodes")
            .and_then(Value::as_array)
            .ok_or_else(|| "render error: diagram has no nodes".to_string())?;
        let edges = diagram
            .get("edges")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let options = request.get("options").cloned().unwrap_or_else(|| json!({}));
        let pad = options.get("pad").and_then(Value::as_f64).unwrap_or(100.0);
        let scale = options.get("scale").and_then(Value::as_f64).unwrap_or(-1.0);
        let sketch = options
            .get("sketch")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut centers: BTreeMap<String, (f64, f64)> = BTreeMap::new();
        let mut max_x: f64 = 0.0;
        let mut max_y: f64 = 0.0;
        for node in nodes {
            let id = node
                .get("id")
                .and_then(Value::as_str)
                .ok_or_else(|| "render error: node without id".to_string())?;
            let x = node.get("x").and_then(Value::as_f64).unwrap_or(0.0);
            let y = node.get("y").and_then(Value::as_f64).unwrap_or(0.0);
            centers.insert(id.to_string(), (x + NODE_WIDTH / 2.0, y + NODE_HEIGHT / 2.0));
            max_x = max_x.max(x + NODE_WIDTH);
            max_y = max_y.max(y + NODE_HEIGHT);
        }

        let width = max_x + 2.0 * pad;
        let height = max_y + 2.0 * pad;
        let mut svg = String::new();
        svg.push_str(&format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {width} {height}""#
        ));
        if scale > 0.0 {
            svg.push_str(&format!(
                r#" width="{}" height="{}""#,
                width * scale,
                height * scale
            ));
        }
        if sketch {
            svg.push_str(r#" class="sketch""#);
        }
        svg.push('>');

        for edge in &edges {
            let src = edge.get("src").and_then(Value::as_str).unwrap_or_default();
            let dst = edge.get("dst").and_then(Value::as_str).unwrap_or_default();
            if let (Some(&(x1, y1)), Some(&(x2, y2))) = (centers.get(src), centers.get(dst)) {
                svg.push_str(&format!(
                    r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="black"/>"#,
                    x1 + pad,
                    y1 + pad,
                    x2 + pad,
                    y2 + pad
                ));
            }
        }
        for node in nodes {
            let id = node.get("id").and_then(Value::as_str).unwrap_or_default();
            let x = node.get("x").and_then(Value::as_f64).unwrap_or(0.0) + pad;
            let y = node.get("y").and_then(Value::as_f64).unwrap_or(0.0) + pad;
            svg.push_str(&format!(
                r#"<rect x="{x}" y="{y}" width="{NODE_WIDTH}" height="{NODE_HEIGHT}" fill="none" stroke="black"/>"#
            ));
            svg.push_str(&format!(
                r#"<text x="{}" y="{}" text-anchor="middle">{id}</text>"#,
                x + NODE_WIDTH / 2.0,
                y + NODE_HEIGHT / 2.0
            ));
        }
        svg.push_str("</svg>");
        Ok(svg)
    }
}

impl ComputeUnit for EdgeListCompute {
    fn compile(&mut self, request_json: &str) -> String {
        let request: Value = match serde_json::from_str(request_json) {
            Ok(value) => value,
            Err(e) => return err_envelope(format!("compile error: bad request JSON: {e}")),
        };
        match Self::compile_document(&request) {
            Ok(document) => ok_envelope(document),
            Err(message) => err_envelope(message),
        }
    }

    fn render(&mut self, request_json: &str) -> String {
        let request: Value = match serde_json::from_str(request_json) {
            Ok(value) => value,
            Err(e) => return err_envelope(format!("render error: bad request JSON: {e}")),
        };
        match Self::render_svg(&request) {
            Ok(svg) => ok_envelope(json!(BASE64.encode(svg.as_bytes()))),
            Err(message) => err_envelope(message),
        }
    }

    fn encode(&mut self, source: &str) -> String {
        ok_envelope(json!({"result": BASE64.encode(source.as_bytes())}))
    }

    fn decode(&mut self, encoded: &str) -> String {
        let bytes = match BASE64.decode(encoded) {
            Ok(bytes) => bytes,
            Err(e) => return err_envelope(format!("decode error: invalid payload: {e}")),
        };
        match String::from_utf8(bytes) {
            Ok(source) => ok_envelope(json!({"result": source})),
            Err(e) => err_envelope(format!("decode error: payload is not UTF-8: {e}")),
        }
    }

    fn version(&mut self) -> String {
        ok_envelope(json!({
            "module": Self::MODULE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        }))
    }

    fn layout_graph(&mut self, request_json: &str) -> String {
        let request: Value = match serde_json::from_str(request_json) {
            Ok(value) => value,
            Err(e) => return err_envelope(format!("compile error: bad request JSON: {e}")),
        };
        let source = match Self::source_of(&request) {
            Ok(source) => source,
            Err(message) => return err_envelope(message),
        };
        match Self::parse(&source) {
            Ok((nodes, edges)) => {
                let node_docs: Vec<Value> = nodes
                    .iter()
                    .map(|id| json!({"id": id, "width": NODE_WIDTH, "height": NODE_HEIGHT}))
                    .collect();
                let edge_docs: Vec<Value> = edges
                    .iter()
                    .map(|(src, dst)| json!({"src": src, "dst": dst}))
                    .collect();
                ok_envelope(json!({"nodes": node_docs, "edges": edge_docs}))
            }
            Err(message) => err_envelope(message),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{unwrap_envelope, unwrap_nested_result};

    fn compile_request(source: &str) -> String {
        json!({"fs": {"index": source}, "options": {}}).to_string()
    }

    #[test]
    fn test_compile_simple_edge() {
        let mut unit = EdgeListCompute::new();
        let document = unwrap_envelope(&unit.compile(&compile_request("x -> y"))).unwrap();

        let nodes = document["nodes"].as_array().unwrap();
        let edges = document["edges"].as_array().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0]["id"], "x");
        assert_eq!(nodes[1]["id"], "y");
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0]["src"], "x");
        assert_eq!(edges[0]["dst"], "y");
    }

    #[test]
    fn test_compile_chain_and_bare_node() {
        let mut unit = EdgeListCompute::new();
        let document =
            unwrap_envelope(&unit.compile(&compile_request("a -> b -> c\norphan"))).unwrap();

        assert_eq!(document["nodes"].as_array().unwrap().len(), 4);
        assert_eq!(document["edges"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_compile_rejects_empty_node_name() {
        let mut unit = EdgeListCompute::new();
        let raw = unit.compile(&compile_request("invalid -> -> syntax"));
        let error = unwrap_envelope(&raw).unwrap_err();

        assert!(error.to_string().contains("empty node name"));
    }

    #[test]
    fn test_compile_rejects_empty_source() {
        let mut unit = EdgeListCompute::new();
        let raw = unit.compile(&compile_request("# only a comment\n"));
        assert!(unwrap_envelope(&raw).is_err());
    }

    #[test]
    fn test_compile_uses_handoff_layout_positions() {
        let mut unit = EdgeListCompute::new();
        let request = json!({
            "fs": {"index": "x -> y"},
            "options": {},
            "layout": {"nodes": [
                {"id": "x", "x": 10.0, "y": 20.0},
                {"id": "y", "x": 300.0, "y": 400.0},
            ]},
        });
        let document = unwrap_envelope(&unit.compile(&request.to_string())).unwrap();

        assert_eq!(document["nodes"][1]["x"], 300.0);
        assert_eq!(document["nodes"][1]["y"], 400.0);
    }

    #[test]
    fn test_layout_graph_has_dimensions_but_no_positions() {
        let mut unit = EdgeListCompute::new();
        let graph = unwrap_envelope(&unit.layout_graph(&compile_request("x -> y"))).unwrap();

        let node = &graph["nodes"][0];
        assert_eq!(node["id"], "x");
        assert_eq!(node["width"], NODE_WIDTH);
        assert!(node.get("x").is_none());
    }

    #[test]
    fn test_render_produces_svg_markup() {
        let mut unit = EdgeListCompute::new();
        let document = unwrap_envelope(&unit.compile(&compile_request("x -> y"))).unwrap();
        let raw = unit.render(&json!({"diagram": document, "options": {}}).to_string());
        let data = unwrap_envelope(&raw).unwrap();
        let svg = String::from_utf8(BASE64.decode(data.as_str().unwrap()).unwrap()).unwrap();

        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains(">x</text>"));
        assert!(svg.contains(">y</text>"));
    }

    #[test]
    fn test_render_sketch_and_scale_options() {
        let mut unit = EdgeListCompute::new();
        let document = unwrap_envelope(&unit.compile(&compile_request("solo"))).unwrap();
        let raw = unit.render(
            &json!({"diagram": document, "options": {"sketch": true, "scale": 1.0}}).to_string(),
        );
        let data = unwrap_envelope(&raw).unwrap();
        let svg = String::from_utf8(BASE64.decode(data.as_str().unwrap()).unwrap()).unwrap();

        assert!(svg.contains(r#"class="sketch""#));
        assert!(svg.contains("width="));
    }

    #[test]
    fn test_codec_roundtrip() {
        let mut unit = EdgeListCompute::new();
        for source in ["x -> y", "", "非ascii → テキスト"] {
            let encoded = unwrap_nested_result(&unit.encode(source)).unwrap();
            let decoded = unwrap_nested_result(&unit.decode(encoded.as_str().unwrap())).unwrap();
            assert_eq!(decoded.as_str().unwrap(), source);
        }
    }

    #[test]
    fn test_decode_rejects_invalid_payload() {
        let mut unit = EdgeListCompute::new();
        let error = unwrap_envelope(&unit.decode("not-valid-base64")).unwrap_err();
        assert!(error.to_string().contains("decode error"));
    }

    #[test]
    fn test_version_descriptor() {
        let mut unit = EdgeListCompute::new();
        let descriptor = unwrap_envelope(&unit.version()).unwrap();
        assert_eq!(descriptor["module"], EdgeListCompute::MODULE_NAME);
    }
}
