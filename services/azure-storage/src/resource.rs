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
use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use reqstore_core::{
    OperationResult, ProvideSignedUri, RequestBuilder, RequestDescriptor, RequestPipeline,
    Result, SasCache, SasEntry,
};

/// One addressable container, blob or queue.
///
/// Requests are authorized either by the pipeline's account credential or,
/// once a provider is attached, by this resource's own signature cache.
#[derive(Clone, Debug)]
pub(crate) struct Resource {
    pipeline: RequestPipeline,
    endpoint: String,
    path: Vec<String>,
    sas: Option<SasCache>,
}

impl Resource {
    pub fn new(pipeline: RequestPipeline, endpoint: &str, segment: &str) -> Self {
        Self {
            pipeline,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            path: vec![segment.to_string()],
            sas: None,
        }
    }

    /// A resource nested under this one. Signatures are not shared.
    pub fn child(&self, segment: &str) -> Self {
        let mut path = self.path.clone();
        path.push(segment.to_string());
        Self {
            pipeline: self.pipeline.clone(),
            endpoint: self.endpoint.clone(),
            path,
            sas: None,
        }
    }

    /// Cache key used when asking for a signature, e.g. `container/blob`.
    pub fn key(&self) -> String {
        self.path.join("/")
    }

    pub fn with_sas_provider(mut self, provider: Arc<dyn ProvideSignedUri>) -> Self {
        let cache = SasCache::new(self.pipeline.context().clone(), self.key(), provider);
        self.sas = Some(cache);
        self
    }

    #[cfg(test)]
    pub fn sas(&self) -> Option<&SasCache> {
        self.sas.as_ref()
    }

    pub fn pipeline(&self) -> &RequestPipeline {
        &self.pipeline
    }

    /// Start a request against this resource.
    pub fn request(&self, method: Method, entry: Option<&SasEntry>) -> RequestBuilder {
        match entry {
            Some(entry) => {
                RequestDescriptor::builder(method, entry.base_uri()).signature(entry.sas_query())
            }
            None => self
                .path
                .iter()
                .fold(RequestDescriptor::builder(method, &self.endpoint), |b, s| {
                    b.path(s.as_str())
                }),
        }
    }

    /// A valid signature for this resource, refreshed if needed. `None` when
    /// the account credential signs.
    pub async fn valid_signature(&self) -> Result<Option<SasEntry>> {
        match &self.sas {
            None => Ok(None),
            Some(cache) => cache.valid_entry().await.map(Some),
        }
    }

    /// Run `op` with a valid signature when this resource is delegated, or
    /// with none when the account credential signs.
    pub async fn with_signature<T, F, Fut>(&self, op: F) -> OperationResult<T>
    where
        F: FnOnce(Option<SasEntry>) -> Fut,
        Fut: Future<Output = OperationResult<T>>,
    {
        match &self.sas {
            None => op(None).await,
            Some(cache) => {
                cache
                    .execute_with_valid_signature(|entry| op(Some(entry)), OperationResult::failure)
                    .await
            }
        }
    }

    /// Build and send one request.
    pub async fn send<T, B, F>(&self, method: Method, build: B, mapper: F) -> OperationResult<T>
    where
        B: FnOnce(RequestBuilder) -> RequestBuilder,
        F: FnOnce(http::Response<Bytes>) -> anyhow::Result<T>,
    {
        self.with_signature(|entry| async move {
            let desc = match build(self.request(method, entry.as_ref())).build() {
                Ok(desc) => desc,
                Err(err) => return OperationResult::failure(err),
            };
            self.pipeline.send(&desc, mapper).await
        })
        .await
    }
}
