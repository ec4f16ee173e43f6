//! Tool surface: definitions sent to the model and validation of the calls it makes.
//!
//! Tool calls arrive as loosely-typed JSON. [`DiagramCall::try_from`] turns
//! them into a tagged union at the boundary so the dispatcher never inspects
//! raw arguments.

use serde::Deserialize;

use crate::llm::types::{ToolCall, ToolDefinition};
use crate::patch::EditOperation;

/// Full-replacement tool.
pub const DISPLAY_DIAGRAM: &str = "display_diagram";
/// Targeted-patch tool.
pub const EDIT_DIAGRAM: &str = "edit_diagram";

/// A validated diagram tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagramCall {
    /// Replace the whole document.
    Display { document: String },
    /// Patch the live document with an ordered batch of edits.
    Edit { edits: Vec<EditOperation> },
}

impl DiagramCall {
    /// Tool name this call was made under.
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::Display { .. } => DISPLAY_DIAGRAM,
            Self::Edit { .. } => EDIT_DIAGRAM,
        }
    }
}

/// A tool call that could not be turned into a [`DiagramCall`].
#[derive(Debug, thiserror::Error)]
pub enum ToolCallError {
    #[error("unknown tool {0:?}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {source}")]
    InvalidArguments {
        tool: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct DisplayArgs {
    #[serde(alias = "document")]
    xml: String,
}

#[derive(Deserialize)]
struct EditArgs {
    edits: Vec<EditOperation>,
}

impl TryFrom<&ToolCall> for DiagramCall {
    type Error = ToolCallError;

    fn try_from(call: &ToolCall) -> Result<Self, Self::Error> {
        match call.name.as_str() {
            DISPLAY_DIAGRAM => {
                let args: DisplayArgs = parse_args(DISPLAY_DIAGRAM, &call.arguments)?;
                Ok(Self::Display { document: args.xml })
            }
            EDIT_DIAGRAM => {
                let args: EditArgs = parse_args(EDIT_DIAGRAM, &call.arguments)?;
                Ok(Self::Edit { edits: args.edits })
            }
            other => Err(ToolCallError::UnknownTool(other.to_string())),
        }
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(
    tool: &'static str,
    arguments: &serde_json::Value,
) -> Result<T, ToolCallError> {
    T::deserialize(arguments).map_err(|source| ToolCallError::InvalidArguments { tool, source })
}

/// Definitions for the two diagram tools, in a stable order.
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: DISPLAY_DIAGRAM.to_string(),
            description: "Display a NEW diagram, replacing the current one. Use this for the \
                          first version of a diagram or for major overhauls. Pass either a full \
                          <mxGraphModel> document or only the <root> element with its cells."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "xml": {
                        "type": "string",
                        "description": "Diagram XML to display"
                    }
                },
                "required": ["xml"]
            }),
        },
        ToolDefinition {
            name: EDIT_DIAGRAM.to_string(),
            description: "Edit specific parts of the current diagram by replacing exact text. \
                          Edits apply in order, each to the result of the previous one, and only \
                          the first match of each search is replaced. If any search is missing \
                          nothing is changed. Keep edits small: include only the changing lines \
                          plus 1-2 lines of context, always whole lines, never truncated."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "edits": {
                        "type": "array",
                        "description": "Search/replace pairs applied sequentially",
                        "items": {
                            "type": "object",
                            "properties": {
                                "search": {
                                    "type": "string",
                                    "description": "Exact lines to search for, including whitespace and indentation"
                                },
                                "replace": {
                                    "type": "string",
                                    "description": "Replacement lines"
                                }
                            },
                            "required": ["search", "replace"]
                        }
                    }
                },
                "required": ["edits"]
            }),
        },
    ]
}
