use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunCommandParameters<'a> {
    pub command: &'a str,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunCommandRequest<'a> {
    #[serde(rename = "type")]
    pub request_type: &'a str,
    pub parameters: RunCommandParameters<'a>,
}

impl<'a> RunCommandRequest<'a> {
    pub const fn new(command: &'a str) -> Self {
        Self {
            request_type: "runCommand",
            parameters: RunCommandParameters { command },
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub completion_code: i64,
    pub reason_code: i64,
    #[serde(default)]
    pub text: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCommandResponse {
    #[serde(default)]
    pub command_response: Vec<CommandResponse>,
    pub overall_completion_code: i64,
    pub overall_reason_code: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ErrorDetail {
    pub msg: Option<String>,
    pub explanation: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: Vec<ErrorDetail>,
}

impl ErrorResponse {
    pub fn message(&self) -> Option<String> {
        let messages: Vec<&str> = self
            .error
            .iter()
            .filter_map(|detail| detail.msg.as_deref().or(detail.explanation.as_deref()))
            .collect();

        (!messages.is_empty()).then(|| messages.join("; "))
    }
}
