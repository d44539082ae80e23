// src/debugger/messages.rs
//! The debugger wire protocol: JSON messages tagged by `MessageType`. The
//! transport that frames and ships them is the host's concern; this module
//! only defines the shapes. `CodeHash` is the one cross-message key tying
//! breakpoints and locations back to source text.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakpointAction {
    Add,
    Remove,
}

/// Messages the debugger receives from the front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "MessageType")]
pub enum IncomingMessage {
    #[serde(rename_all = "PascalCase")]
    ChangeBreakpoint {
        code_hash: u64,
        line: u32,
        action: BreakpointAction,
    },
    Resume,
    Pause,
    StepOver,
    StepIn,
    StepOut,
    /// The id is echoed back on the matching `QueryResult`.
    #[serde(rename_all = "PascalCase")]
    QueryExpression { expression: String, query_id: u64 },
    #[serde(rename_all = "PascalCase")]
    ViewExplorerItem { code_hash: u64 },
}

/// One frame of the call stack reported with an execution point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StackFrame {
    pub text: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_hash: Option<u64>,
}

/// One property row in a query answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryValue {
    pub property: String,
    pub value: String,
    pub expandable: bool,
}

/// One browsable root in the explorer tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExplorerRoot {
    pub id: u64,
    pub name: String,
    pub code_hash: u64,
}

/// Messages the debugger sends to the front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "MessageType")]
pub enum OutgoingMessage {
    #[serde(rename_all = "PascalCase")]
    Output {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        line: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code_hash: Option<u64>,
    },
    /// Execution stopped here; sent exactly once per pause.
    #[serde(rename_all = "PascalCase")]
    SetExecutionPoint {
        line: u32,
        code_hash: u64,
        call_stack: Vec<StackFrame>,
    },
    ClearExecutionPoint,
    #[serde(rename_all = "PascalCase")]
    UpdateExplorer { roots: Vec<ExplorerRoot> },
    #[serde(rename_all = "PascalCase")]
    QueryResult {
        query_id: u64,
        expression: String,
        values: Vec<QueryValue>,
    },
    /// The source text for a code entry the front end has not seen.
    #[serde(rename_all = "PascalCase")]
    ShowCodeEntry {
        origin: String,
        code: String,
        code_hash: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incoming_round_trips_through_tagged_json() {
        let text = r#"{"MessageType":"ChangeBreakpoint","CodeHash":42,"Line":7,"Action":"Add"}"#;
        let message: IncomingMessage = serde_json::from_str(text).unwrap();
        assert_eq!(
            message,
            IncomingMessage::ChangeBreakpoint {
                code_hash: 42,
                line: 7,
                action: BreakpointAction::Add,
            }
        );
        let back = serde_json::to_string(&message).unwrap();
        assert_eq!(back, text);
    }

    #[test]
    fn unit_commands_carry_only_the_tag() {
        let message: IncomingMessage = serde_json::from_str(r#"{"MessageType":"Resume"}"#).unwrap();
        assert_eq!(message, IncomingMessage::Resume);
    }

    #[test]
    fn view_explorer_item_keys_on_code_hash() {
        let message: IncomingMessage =
            serde_json::from_str(r#"{"MessageType":"ViewExplorerItem","CodeHash":42}"#).unwrap();
        assert_eq!(message, IncomingMessage::ViewExplorerItem { code_hash: 42 });
    }

    #[test]
    fn execution_point_carries_a_call_stack() {
        let text = serde_json::to_string(&OutgoingMessage::SetExecutionPoint {
            line: 3,
            code_hash: 1,
            call_stack: vec![StackFrame {
                text: "Main".into(),
                language: "Quill".into(),
                line: Some(3),
                code_hash: Some(1),
            }],
        })
        .unwrap();
        assert_eq!(
            text,
            r#"{"MessageType":"SetExecutionPoint","Line":3,"CodeHash":1,"CallStack":[{"Text":"Main","Language":"Quill","Line":3,"CodeHash":1}]}"#
        );
    }

    #[test]
    fn query_messages_correlate_by_query_id() {
        let text = r#"{"MessageType":"QueryExpression","Expression":"this.X","QueryId":9}"#;
        let message: IncomingMessage = serde_json::from_str(text).unwrap();
        let IncomingMessage::QueryExpression {
            expression,
            query_id,
        } = message
        else {
            panic!("wrong variant");
        };
        assert_eq!(query_id, 9);

        let answer = serde_json::to_string(&OutgoingMessage::QueryResult {
            query_id,
            expression,
            values: vec![QueryValue {
                property: "X".into(),
                value: "5".into(),
                expandable: false,
            }],
        })
        .unwrap();
        assert_eq!(
            answer,
            r#"{"MessageType":"QueryResult","QueryId":9,"Expression":"this.X","Values":[{"Property":"X","Value":"5","Expandable":false}]}"#
        );
    }
}
