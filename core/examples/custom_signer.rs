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
use std::sync::mpsc;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::AUTHORIZATION;
use http::request::Parts;
use http::{HeaderValue, Method, StatusCode};
use reqstore_core::{
    Context, Dispatch, HttpSend, RequestDescriptor, RequestPipeline, Result, SignRequest,
};

/// Signs every request with a static bearer token.
#[derive(Debug)]
struct BearerSigner {
    token: String,
}

#[async_trait]
impl SignRequest for BearerSigner {
    async fn sign_request(&self, _: &Context, req: &mut Parts, content_length: u64) -> Result<()> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.token))?;
        value.set_sensitive(true);
        req.headers.insert(AUTHORIZATION, value);
        req.headers
            .insert(http::header::CONTENT_LENGTH, content_length.into());
        Ok(())
    }

    async fn sign_lite(&self, _: &Context, _: &mut Parts) -> Result<()> {
        Ok(())
    }
}

/// Answers every request locally, echoing its authorization header.
#[derive(Debug)]
struct EchoHttpSend;

#[async_trait]
impl HttpSend for EchoHttpSend {
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let auth = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Ok(http::Response::builder()
            .status(StatusCode::OK)
            .body(Bytes::from(auth))?)
    }
}

/// Hands completion callbacks over to the thread owning the receiver.
#[derive(Debug)]
struct ChannelDispatch(mpsc::Sender<Box<dyn FnOnce() + Send>>);

impl Dispatch for ChannelDispatch {
    fn dispatch(&self, task: Box<dyn FnOnce() + Send>) {
        let _ = self.0.send(task);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let ctx = Context::new()
        .with_http_send(EchoHttpSend)
        .with_dispatch(ChannelDispatch(tx));

    let pipeline = RequestPipeline::new(
        ctx,
        BearerSigner {
            token: "demo-token".to_string(),
        },
    );

    let desc = RequestDescriptor::builder(Method::GET, "https://api.example.com")
        .path("v1")
        .path("users")
        .build()?;

    pipeline
        .send_then(
            &desc,
            |resp| Ok(String::from_utf8(resp.into_body().to_vec())?),
            |result| match result.into_result() {
                Ok(auth) => println!("server saw authorization: {auth}"),
                Err(err) => eprintln!("request failed: {err}"),
            },
        )
        .await;

    // Run the queued callback on this thread.
    for task in rx.try_iter() {
        task();
    }

    Ok(())
}
