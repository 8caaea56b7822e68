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

use crate::BitcoinRpcConfig;
use base64::Engine;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::MockServer;
use wiremock::{Mock, ResponseTemplate};

pub async fn setup_mock_bitcoin_rpc() -> (MockServer, BitcoinRpcConfig) {
    let mock_server = MockServer::start().await;

    let config = BitcoinRpcConfig {
        url: mock_server.uri(),
        username: "testuser".to_string(),
        password: "testpass".to_string(),
    };

    (mock_server, config)
}

pub async fn mock_method(
    mock_server: &MockServer,
    api_method: &str,
    params: serde_json::Value,
    response: String,
) {
    let auth_header = format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", "testuser", "testpass"))
    );

    let response_json: serde_json::Value =
        serde_json::from_str(&response).expect("Mocked response should be valid JSON");

    Mock::given(method("POST"))
        .and(path("/"))
        .and(header("Authorization", auth_header))
        .and(body_json(serde_json::json!({
            "method": api_method,
            "params": params,
            "id": 0,
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "result": response_json, "error": null, "id": 0 })),
        )
        .mount(mock_server)
        .await;
}

pub async fn mock_submit_block_with_any_body(mock_server: &MockServer) {
    let auth_header = format!(
        "Basic {}",
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", "testuser", "testpass"))
    );

    Mock::given(method("POST"))
        .and(path("/"))
        .and(header("Authorization", auth_header))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "result": null, "error": null, "id": 0 })),
        )
        .mount(mock_server)
        .await;
}
