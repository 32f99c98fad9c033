use crate::errors::SpoolError;
use crate::value::ParamType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Request {
    Ping,
    ListCommands,
    Invoke {
        path: Vec<String>,
        #[serde(default)]
        args: serde_json::Map<String, serde_json::Value>,
    },
    Shutdown,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Response {
    Pong,
    Commands { commands: Vec<CommandInfo> },
    Result { value: serde_json::Value },
    ShuttingDown,
    Error { error: SpoolError },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandInfo {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub params: Vec<ParamInfo>,
    pub uses_context: bool,
    pub yields_group: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ParamType,
    pub required: bool,
}
