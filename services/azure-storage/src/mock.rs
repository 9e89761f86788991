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
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use reqstore_core::request::parse_query;
use reqstore_core::{Context, Error, HttpSend, RequestPipeline, Result};

use crate::{Credential, RequestSigner};

pub const ENDPOINT: &str = "https://account.blob.core.windows.net";

/// Records every request and replays scripted responses in order.
#[derive(Debug, Default, Clone)]
pub struct MockHttpSend {
    requests: Arc<Mutex<Vec<http::Request<Bytes>>>>,
    responses: Arc<Mutex<VecDeque<Result<http::Response<Bytes>>>>>,
}

impl MockHttpSend {
    pub fn respond(self, status: u16, body: &str) -> Self {
        self.respond_with_headers(status, &[], body)
    }

    pub fn respond_with_headers(self, status: u16, headers: &[(&str, &str)], body: &str) -> Self {
        let mut builder = http::Response::builder().status(status);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let resp = builder.body(Bytes::from(body.to_string())).unwrap();
        self.responses.lock().unwrap().push_back(Ok(resp));
        self
    }

    pub fn fail(self, err: Error) -> Self {
        self.responses.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|req| RecordedRequest {
                method: req.method().clone(),
                path: req.uri().path().to_string(),
                query: parse_query(req.uri().query().unwrap_or_default()),
                headers: req.headers().clone(),
                body: req.body().clone(),
            })
            .collect()
    }
}

#[async_trait]
impl HttpSend for MockHttpSend {
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        self.requests.lock().unwrap().push(req);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::unexpected("no scripted response left")))
    }
}

#[derive(Debug)]
pub struct RecordedRequest {
    pub method: http::Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: http::HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn query_get(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub fn pipeline(http: &MockHttpSend) -> RequestPipeline {
    let _ = env_logger::builder().is_test(true).try_init();
    RequestPipeline::new(
        Context::new().with_http_send(http.clone()),
        RequestSigner::new(Credential::with_shared_key("account", "a2V5")),
    )
}

pub fn delegated_pipeline(http: &MockHttpSend) -> RequestPipeline {
    let _ = env_logger::builder().is_test(true).try_init();
    RequestPipeline::new(
        Context::new().with_http_send(http.clone()),
        RequestSigner::delegated(),
    )
}
