// Copyright (C) 2024, 2025 Solopool Developers (see AUTHORS)
//
// This file is part of Solopool
//
// Solopool is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Solopool is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// Solopool. If not, see <https://www.gnu.org/licenses/>.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// JSON-RPC ID can be a number, string, or null.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Number(u64),
    String(String),
    None(()),
}

impl From<u64> for Id {
    fn from(val: u64) -> Self {
        Id::Number(val)
    }
}

impl From<String> for Id {
    fn from(val: String) -> Self {
        Id::String(val)
    }
}

impl PartialEq for Id {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Id::Number(a), Id::Number(b)) => a == b,
            (Id::String(a), Id::String(b)) => a == b,
            (Id::None(_), Id::None(_)) => true,
            _ => false,
        }
    }
}

/// Error structure in stratum responses
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StratumError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A request received from a miner.
///
/// Params are kept as a raw JSON value, each handler pulls out the shape it
/// expects and rejects the request with InvalidParams otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    /// Get the request param at position `index` as a string slice.
    pub fn param_str(&self, index: usize) -> Option<&str> {
        self.params.get(index).and_then(|v| v.as_str())
    }

    /// Number of positional params, zero when params is not an array.
    pub fn param_count(&self) -> usize {
        self.params.as_array().map(|a| a.len()).unwrap_or(0)
    }

    /// Creates a new subscribe message.
    /// The user agent and version are concatenated with a slash.
    pub fn new_subscribe(
        id: u64,
        user_agent: String,
        version: String,
        extra_nonce: Option<String>,
    ) -> Self {
        let user_agent_param = user_agent + "/" + &version;
        let mut params = vec![json!(user_agent_param)];
        if let Some(extra_nonce) = extra_nonce {
            params.push(json!(extra_nonce));
        }
        Request {
            id: Some(Id::Number(id)),
            method: "mining.subscribe".to_string(),
            params: Value::Array(params),
        }
    }

    /// Creates a new authorize message.
    pub fn new_authorize(id: u64, username: String, password: Option<String>) -> Self {
        let mut params = vec![json!(username)];
        if let Some(password) = password {
            params.push(json!(password));
        }
        Request {
            id: Some(Id::Number(id)),
            method: "mining.authorize".to_string(),
            params: Value::Array(params),
        }
    }

    /// Creates a new submit message.
    /// The server never creates this message, but it is used by clients and tests.
    pub fn new_submit(
        id: u64,
        username: String,
        job_id: String,
        extra_nonce2: String,
        n_time: String,
        nonce: String,
    ) -> Self {
        Request {
            id: Some(Id::Number(id)),
            method: "mining.submit".to_string(),
            params: json!([username, job_id, extra_nonce2, n_time, nonce]),
        }
    }

    /// Creates a new suggest_difficulty message.
    pub fn new_suggest_difficulty(id: u64, difficulty: f64) -> Self {
        Request {
            id: Some(Id::Number(id)),
            method: "mining.suggest_difficulty".to_string(),
            params: json!([difficulty]),
        }
    }

    /// Creates a new configure message requesting version-rolling.
    pub fn new_configure(id: u64, version_rolling_mask: String) -> Self {
        Request {
            id: Some(Id::Number(id)),
            method: "mining.configure".to_string(),
            params: json!([
                ["version-rolling"],
                { "version-rolling.mask": version_rolling_mask }
            ]),
        }
    }
}

/// A response sent back to a miner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: Option<Id>,
    pub result: Option<Value>,
    pub error: Option<StratumError>,
}

impl Response {
    pub fn new_ok(id: Option<Id>, result: Value) -> Self {
        Response {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn new_err(id: Option<Id>, code: i32, message: &str) -> Self {
        Response {
            id,
            result: Some(Value::Bool(false)),
            error: Some(StratumError {
                code,
                message: message.to_string(),
                data: None,
            }),
        }
    }
}

/// Parameters for the mining.notify message, serialized as the
/// protocol's positional array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(from = "NotifyParamsTuple", into = "NotifyParamsTuple")]
pub struct NotifyParams {
    pub job_id: String,
    pub prevhash: String,
    pub coinbase1: String,
    pub coinbase2: String,
    pub merkle_branches: Vec<String>,
    pub version: String,
    pub nbits: String,
    pub ntime: String,
    pub clean_jobs: bool,
}

type NotifyParamsTuple = (
    String,
    String,
    String,
    String,
    Vec<String>,
    String,
    String,
    String,
    bool,
);

impl From<NotifyParamsTuple> for NotifyParams {
    fn from(t: NotifyParamsTuple) -> Self {
        NotifyParams {
            job_id: t.0,
            prevhash: t.1,
            coinbase1: t.2,
            coinbase2: t.3,
            merkle_branches: t.4,
            version: t.5,
            nbits: t.6,
            ntime: t.7,
            clean_jobs: t.8,
        }
    }
}

impl From<NotifyParams> for NotifyParamsTuple {
    fn from(p: NotifyParams) -> Self {
        (
            p.job_id,
            p.prevhash,
            p.coinbase1,
            p.coinbase2,
            p.merkle_branches,
            p.version,
            p.nbits,
            p.ntime,
            p.clean_jobs,
        )
    }
}

/// The mining.notify work push notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notify {
    pub id: Option<Id>,
    pub method: String,
    pub params: NotifyParams,
}

impl Notify {
    pub fn new_notify(params: NotifyParams) -> Self {
        Notify {
            id: None,
            method: "mining.notify".to_string(),
            params,
        }
    }
}

/// The mining.set_difficulty notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDifficultyNotification {
    pub id: Option<Id>,
    pub method: String,
    pub params: Vec<f64>,
}

impl SetDifficultyNotification {
    pub fn new(difficulty: f64) -> Self {
        SetDifficultyNotification {
            id: None,
            method: "mining.set_difficulty".to_string(),
            params: vec![difficulty],
        }
    }
}

/// Any message the server writes to a miner connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
    Notify(Notify),
    SetDifficulty(SetDifficultyNotification),
    Response(Response),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_subscribe() {
        let message = Request::new_subscribe(42, "agent".to_string(), "1.0".to_string(), None);
        let serialized_message = serde_json::to_string(&message).unwrap();
        assert_eq!(
            serialized_message,
            r#"{"id":42,"method":"mining.subscribe","params":["agent/1.0"]}"#
        );
    }

    #[test]
    fn test_new_authorize() {
        let message = Request::new_authorize(1, "username".to_string(), Some("password".to_string()));
        let serialized_message = serde_json::to_string(&message).unwrap();
        assert_eq!(
            serialized_message,
            r#"{"id":1,"method":"mining.authorize","params":["username","password"]}"#
        );
    }

    #[test]
    fn test_new_submit() {
        let message = Request::new_submit(
            5,
            "worker_name".to_string(),
            "job_id".to_string(),
            "extra_nonce2".to_string(),
            "ntime".to_string(),
            "nonce".to_string(),
        );
        let serialized_message = serde_json::to_string(&message).unwrap();
        assert_eq!(
            serialized_message,
            r#"{"id":5,"method":"mining.submit","params":["worker_name","job_id","extra_nonce2","ntime","nonce"]}"#
        );
    }

    #[test]
    fn test_notify_params_roundtrip() {
        let notify_params = NotifyParams {
            job_id: "job_id".to_string(),
            prevhash: "prevhash".to_string(),
            coinbase1: "coinbase1".to_string(),
            coinbase2: "coinbase2".to_string(),
            merkle_branches: vec!["branch1".to_string(), "branch2".to_string()],
            version: "version".to_string(),
            nbits: "nbits".to_string(),
            ntime: "ntime".to_string(),
            clean_jobs: true,
        };

        let message = Notify::new_notify(notify_params.clone());
        let serialized_message = serde_json::to_string(&message).unwrap();
        assert_eq!(
            serialized_message,
            r#"{"id":null,"method":"mining.notify","params":["job_id","prevhash","coinbase1","coinbase2",["branch1","branch2"],"version","nbits","ntime",true]}"#
        );

        let parsed: Notify = serde_json::from_str(&serialized_message).unwrap();
        assert_eq!(parsed.params, notify_params);
    }

    #[test]
    fn test_new_set_difficulty() {
        let message = SetDifficultyNotification::new(1000.0);
        let serialized_message = serde_json::to_string(&message).unwrap();
        assert_eq!(
            serialized_message,
            r#"{"id":null,"method":"mining.set_difficulty","params":[1000.0]}"#
        );
    }

    #[test]
    fn test_error_serialization() {
        let error = StratumError {
            code: -1,
            message: "An error occurred".to_string(),
            data: Some(json!("Additional error data")),
        };
        let serialized_error = serde_json::to_string(&error).unwrap();
        assert_eq!(
            serialized_error,
            r#"{"code":-1,"message":"An error occurred","data":"Additional error data"}"#
        );
    }

    #[test]
    fn test_id_serialization_handle_non_numbers() {
        let id_number = Id::Number(42);
        assert_eq!(serde_json::to_string(&id_number).unwrap(), "42");

        let id_string = Id::String("test".to_string());
        assert_eq!(serde_json::to_string(&id_string).unwrap(), r#""test""#);

        let id_none = Id::None(());
        assert_eq!(serde_json::to_string(&id_none).unwrap(), "null");
    }

    #[test]
    fn test_parse_submit_request() {
        let line = r#"{"id": 4, "method": "mining.submit", "params": ["user.worker", "4f", "fe36a31b00000000", "504e86ed", "e9695791"]}"#;
        let request: Request = serde_json::from_str(line).unwrap();
        assert_eq!(request.method, "mining.submit");
        assert_eq!(request.param_count(), 5);
        assert_eq!(request.param_str(0), Some("user.worker"));
        assert_eq!(request.param_str(1), Some("4f"));
    }

    #[test]
    fn test_parse_request_without_params() {
        let line = r#"{"id": 1, "method": "mining.subscribe"}"#;
        let request: Request = serde_json::from_str(line).unwrap();
        assert_eq!(request.param_count(), 0);
        assert!(request.param_str(0).is_none());
    }
}
