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
use http::{Method, StatusCode};
use log::debug;
use reqstore_core::hash::base64_encode;
use reqstore_core::{Context, OperationResult, RequestPipeline, Result, TransientRetry};

use crate::constants::*;
use crate::resource::Resource;
use crate::{Config, RequestSigner};

/// QueueService is the entry point to the queues of one account.
#[derive(Clone, Debug)]
pub struct QueueService {
    pipeline: RequestPipeline,
    endpoint: String,
}

impl QueueService {
    /// Create a service signing with the credential found in `config`.
    pub fn new(ctx: Context, config: &Config) -> Result<Self> {
        let signer = RequestSigner::new(config.credential()?);
        Ok(Self::with_pipeline(
            RequestPipeline::new(ctx, signer),
            config.endpoint()?,
        ))
    }

    /// Create a service on top of an existing pipeline.
    pub fn with_pipeline(pipeline: RequestPipeline, endpoint: &str) -> Self {
        Self {
            pipeline,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    /// Get a handle to a queue. No request is sent.
    pub fn queue(&self, name: &str) -> Queue {
        let resource = Resource::new(self.pipeline.clone(), &self.endpoint, name);
        Queue {
            name: name.to_string(),
            messages: resource.child("messages"),
            resource,
        }
    }
}

/// Queue is a handle to one message queue.
#[derive(Clone, Debug)]
pub struct Queue {
    name: String,
    resource: Resource,
    messages: Resource,
}

impl Queue {
    /// Queue name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create the queue unless it already exists.
    ///
    /// The payload is `true` when the queue was created by this call.
    pub async fn create_if_not_exists(&self) -> OperationResult<bool> {
        let head = self
            .resource
            .send(Method::HEAD, |b| b.query(COMP, "metadata"), |_| Ok(false))
            .await;
        if head.is_success() || head.status() != Some(StatusCode::NOT_FOUND) {
            return head;
        }

        debug!("queue {} not found, creating it", self.name);
        let created = self
            .resource
            .send(Method::PUT, |b| b.expect(StatusCode::CREATED), |_| Ok(true))
            .await;
        // Created concurrently with identical metadata.
        if created.status() == Some(StatusCode::NO_CONTENT) {
            return OperationResult::success(StatusCode::NO_CONTENT, false);
        }
        created
    }

    /// Delete the queue, retrying while the service reports a timeout.
    pub async fn delete(&self) -> OperationResult<bool> {
        TransientRetry::default()
            .run(|| {
                self.resource
                    .send(Method::DELETE, |b| b.expect(StatusCode::NO_CONTENT), |_| Ok(true))
            })
            .await
    }

    /// Remove every message, retrying while the service reports a timeout.
    pub async fn clear(&self) -> OperationResult<bool> {
        TransientRetry::default()
            .run(|| {
                self.messages
                    .send(Method::DELETE, |b| b.expect(StatusCode::NO_CONTENT), |_| Ok(true))
            })
            .await
    }

    /// Enqueue one message. The text is sent base64 encoded.
    pub async fn put_message(&self, text: &str) -> OperationResult<bool> {
        let body = format!(
            "<QueueMessage><MessageText>{}</MessageText></QueueMessage>",
            base64_encode(text.as_bytes())
        );
        self.messages
            .send(
                Method::POST,
                |b| {
                    b.header(http::header::CONTENT_TYPE.as_str(), "application/xml")
                        .body(body)
                        .expect(StatusCode::CREATED)
                },
                |_| Ok(true),
            )
            .await
    }
}
