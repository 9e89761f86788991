// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Extraction of structured error documents returned by the service.

use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::Value;

/// Error details reported by the service in a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    /// Service error code, e.g. `ContainerNotFound`.
    pub code: Option<String>,
    /// The most specific message found in the document.
    pub message: String,
}

/// Parse a service error document.
///
/// Supported shapes:
///
/// - `<Error><Code/><Message/></Error>`
/// - `<error><code/><message/><innererror><message/>...</innererror></error>`
/// - `{"odata.error": {"code", "message": {"value"}, "innererror": {...}}}`
///
/// Nested inner errors are walked and the deepest message wins. Returns
/// `None` when the body is not an error document.
pub fn parse_service_error(body: &[u8]) -> Option<ServiceError> {
    let trimmed = body.trim_ascii_start();
    match trimmed.first() {
        Some(b'<') => parse_xml(trimmed),
        Some(b'{') => parse_json(trimmed),
        _ => None,
    }
}

fn is_nesting(name: &[u8]) -> bool {
    name == b"innererror" || name == b"internalexception"
}

fn parse_xml(body: &[u8]) -> Option<ServiceError> {
    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut code = None;
    let mut best: Option<(usize, String)> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name().as_ref().to_ascii_lowercase();
                if stack.is_empty() && name != b"error" {
                    return None;
                }
                stack.push(name);
            }
            Ok(Event::End(_)) => {
                stack.pop();
            }
            Ok(Event::Text(t)) => {
                let Some(current) = stack.last() else {
                    continue;
                };
                let depth = stack.iter().filter(|n| is_nesting(n)).count();
                let text = t.unescape().ok()?.trim().to_string();
                if text.is_empty() {
                    continue;
                }
                if current == b"message" && best.as_ref().map_or(true, |(d, _)| depth >= *d) {
                    best = Some((depth, text));
                } else if current == b"code" && depth == 0 {
                    code = Some(text);
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }

    best.map(|(_, message)| ServiceError { code, message })
}

fn parse_json(body: &[u8]) -> Option<ServiceError> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let root = value.get("odata.error").or_else(|| value.get("error"))?;

    let code = root.get("code").and_then(Value::as_str).map(str::to_string);
    let mut message = json_message(root);
    let mut inner = root.get("innererror");
    while let Some(node) = inner {
        if let Some(m) = json_message(node) {
            message = Some(m);
        }
        inner = node
            .get("innererror")
            .or_else(|| node.get("internalexception"));
    }

    message.map(|message| ServiceError { code, message })
}

fn json_message(node: &Value) -> Option<String> {
    match node.get("message")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(m) => m.get("value").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}
