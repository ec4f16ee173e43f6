//! Sample diagrams and tool-call builders.

use drawsync_core::llm::ToolCall;
use drawsync_core::tools::{DISPLAY_DIAGRAM, EDIT_DIAGRAM};
use serde_json::json;

/// A small flowchart, pretty-printed the way the agent sees documents.
pub const FLOWCHART: &str = r#"<mxGraphModel>
  <root>
    <mxCell id="0"/>
    <mxCell id="1" parent="0"/>
    <mxCell id="start" value="Start" style="rounded=1;whiteSpace=wrap;html=1;" vertex="1" parent="1">
      <mxGeometry x="40" y="40" width="120" height="60" as="geometry"/>
    </mxCell>
    <mxCell id="review" value="Review" style="rhombus;whiteSpace=wrap;html=1;" vertex="1" parent="1">
      <mxGeometry x="240" y="30" width="120" height="80" as="geometry"/>
    </mxCell>
    <mxCell id="e1" style="edgeStyle=orthogonalEdgeStyle;html=1;" edge="1" parent="1" source="start" target="review">
      <mxGeometry relative="1" as="geometry"/>
    </mxCell>
  </root>
</mxGraphModel>"#;

/// Only the `<root>` element, as an agent may send it to `display_diagram`.
pub const BARE_ROOT: &str =
    r#"<root><mxCell id="0"/><mxCell id="1" parent="0"/><mxCell id="a" value="A" vertex="1" parent="1"/></root>"#;

/// A one-cell diagram whose only vertex carries `label`.
pub fn labelled(label: &str) -> String {
    format!(
        "<mxGraphModel>\n  <root>\n    <mxCell id=\"0\"/>\n    <mxCell id=\"1\" parent=\"0\"/>\n    <mxCell id=\"2\" value=\"{label}\" vertex=\"1\" parent=\"1\"/>\n  </root>\n</mxGraphModel>"
    )
}

/// A `display_diagram` call.
pub fn display_call(id: &str, document: &str) -> ToolCall {
    ToolCall::new(id, DISPLAY_DIAGRAM, json!({ "xml": document }))
}

/// An `edit_diagram` call built from `(search, replace)` pairs.
pub fn edit_call(id: &str, edits: &[(&str, &str)]) -> ToolCall {
    let edits: Vec<_> = edits
        .iter()
        .map(|(search, replace)| json!({ "search": search, "replace": replace }))
        .collect();
    ToolCall::new(id, EDIT_DIAGRAM, json!({ "edits": edits }))
}
