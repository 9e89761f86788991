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
use std::sync::Arc;

use bytes::Bytes;
use http::{Method, StatusCode};
use log::debug;
use reqstore_core::{
    Context, OperationResult, ProvideSignedUri, RequestPipeline, Result, TransientRetry,
};
use serde::Deserialize;
use tokio::io::AsyncRead;

use crate::constants::*;
use crate::resource::Resource;
use crate::{BlobProperties, ChunkedUploader, Config, RequestSigner};

/// BlobService is the entry point to the containers of one account.
#[derive(Clone, Debug)]
pub struct BlobService {
    pipeline: RequestPipeline,
    endpoint: String,
}

impl BlobService {
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

    /// Get a handle to a container. No request is sent.
    pub fn container(&self, name: &str) -> BlobContainer {
        BlobContainer {
            name: name.to_string(),
            resource: Resource::new(self.pipeline.clone(), &self.endpoint, name),
            provider: None,
        }
    }
}

/// BlobContainer is a handle to one container.
#[derive(Clone, Debug)]
pub struct BlobContainer {
    name: String,
    resource: Resource,
    provider: Option<Arc<dyn ProvideSignedUri>>,
}

impl BlobContainer {
    /// Container name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Authorize every request of this container, and of the blobs obtained
    /// from it afterwards, with delegated signatures from `provider`.
    ///
    /// The container keeps its own signature; each blob keeps another.
    pub fn with_sas_provider(mut self, provider: impl ProvideSignedUri) -> Self {
        let provider: Arc<dyn ProvideSignedUri> = Arc::new(provider);
        self.resource = self.resource.with_sas_provider(provider.clone());
        self.provider = Some(provider);
        self
    }

    /// Get a handle to a blob in this container. No request is sent.
    pub fn blob(&self, name: &str) -> Blob {
        let mut resource = self.resource.child(name);
        if let Some(provider) = &self.provider {
            resource = resource.with_sas_provider(provider.clone());
        }
        Blob {
            name: name.to_string(),
            resource,
        }
    }

    /// Create the container unless it already exists.
    ///
    /// The payload is `true` when the container was created by this call.
    /// An existing container is detected with one attribute fetch and left
    /// untouched.
    pub async fn create_if_not_exists(&self) -> OperationResult<bool> {
        let head = self
            .resource
            .send(Method::HEAD, |b| b.query(RESTYPE, "container"), |_| Ok(false))
            .await;
        if head.is_success() || head.status() != Some(StatusCode::NOT_FOUND) {
            return head;
        }

        debug!("container {} not found, creating it", self.name);
        let created = self
            .resource
            .send(
                Method::PUT,
                |b| b.query(RESTYPE, "container").expect(StatusCode::CREATED),
                |_| Ok(true),
            )
            .await;
        if created.status() == Some(StatusCode::CONFLICT) {
            // Created concurrently by someone else.
            return OperationResult::success(StatusCode::CONFLICT, false);
        }
        created
    }

    /// Delete the container, retrying while the service reports a timeout.
    pub async fn delete(&self) -> OperationResult<bool> {
        TransientRetry::default()
            .run(|| {
                self.resource.send(
                    Method::DELETE,
                    |b| b.query(RESTYPE, "container").expect(StatusCode::ACCEPTED),
                    |_| Ok(true),
                )
            })
            .await
    }

    /// List the blobs of this container, following continuation markers
    /// until the listing is complete.
    ///
    /// With a `delimiter`, names sharing a prefix up to the delimiter are
    /// reported once in [`BlobList::prefixes`].
    pub async fn list_blobs(
        &self,
        prefix: Option<&str>,
        delimiter: Option<&str>,
    ) -> OperationResult<BlobList> {
        let mut list = BlobList {
            prefix: prefix.map(str::to_string),
            ..Default::default()
        };
        let mut marker: Option<String> = None;

        loop {
            let page_marker = marker.take();
            let page = self
                .resource
                .send(
                    Method::GET,
                    |mut b| {
                        b = b.query(RESTYPE, "container").query(COMP, "list");
                        if let Some(prefix) = prefix {
                            b = b.query("prefix", prefix);
                        }
                        if let Some(delimiter) = delimiter {
                            b = b.query("delimiter", delimiter);
                        }
                        if let Some(marker) = page_marker {
                            b = b.query("marker", marker);
                        }
                        b
                    },
                    |resp| {
                        let page: ListBlobsResponse =
                            quick_xml::de::from_reader(resp.body().as_ref())?;
                        Ok(page)
                    },
                )
                .await;

            let status = page.status().unwrap_or(StatusCode::OK);
            let page = match page.into_result() {
                Ok(page) => page,
                Err(err) => return OperationResult::failure(err),
            };

            list.blobs
                .extend(page.blobs.blobs.into_iter().map(BlobItem::from));
            list.prefixes.extend(
                page.blobs
                    .blob_prefix
                    .unwrap_or_default()
                    .into_iter()
                    .map(|p| p.name),
            );

            match page.next_marker.filter(|m| !m.is_empty()) {
                Some(next) => {
                    debug!("listing of {} continues at marker {next}", self.name);
                    marker = Some(next);
                }
                None => return OperationResult::success(status, list),
            }
        }
    }
}

/// Blob is a handle to one block blob.
#[derive(Clone, Debug)]
pub struct Blob {
    name: String,
    resource: Resource,
}

impl Blob {
    /// Blob name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Upload `length` bytes read from `reader`, replacing the blob.
    ///
    /// See [`ChunkedUploader`] for how the payload is split.
    pub async fn upload<R>(
        &self,
        reader: R,
        length: u64,
        properties: BlobProperties,
    ) -> OperationResult<()>
    where
        R: AsyncRead + Unpin,
    {
        self.resource
            .with_signature(|signature| async move {
                ChunkedUploader::new(self.resource.clone(), signature, reader, length, properties)
                    .upload()
                    .await
            })
            .await
    }

    /// Download the whole blob.
    pub async fn download(&self) -> OperationResult<Bytes> {
        self.resource
            .send(Method::GET, |b| b, |resp| Ok(resp.into_body()))
            .await
    }

    /// Read the blob's properties and metadata.
    pub async fn properties(&self) -> OperationResult<BlobProperties> {
        self.resource
            .send(Method::HEAD, |b| b, |resp| {
                BlobProperties::from_headers(resp.headers())
            })
            .await
    }

    /// Delete the blob, retrying while the service reports a timeout.
    pub async fn delete(&self) -> OperationResult<bool> {
        TransientRetry::default()
            .run(|| {
                self.resource
                    .send(Method::DELETE, |b| b.expect(StatusCode::ACCEPTED), |_| Ok(true))
            })
            .await
    }
}

/// Result of a blob listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobList {
    /// Prefix the listing was filtered by.
    pub prefix: Option<String>,
    /// Blobs, in service order.
    pub blobs: Vec<BlobItem>,
    /// Virtual directories found with a delimiter.
    pub prefixes: Vec<String>,
}

/// One entry of a blob listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobItem {
    /// Blob name.
    pub name: String,
    /// Blob size in bytes.
    pub content_length: u64,
    /// MIME type.
    pub content_type: Option<String>,
    /// Entity tag.
    pub etag: Option<String>,
    /// Last modification time as an http date.
    pub last_modified: Option<String>,
}

impl From<ListBlob> for BlobItem {
    fn from(v: ListBlob) -> Self {
        Self {
            name: v.name,
            content_length: v.properties.content_length,
            content_type: v.properties.content_type.filter(|s| !s.is_empty()),
            etag: v.properties.etag,
            last_modified: v.properties.last_modified,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBlobsResponse {
    next_marker: Option<String>,
    #[serde(default)]
    blobs: Blobs,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Blobs {
    blob_prefix: Option<Vec<BlobPrefix>>,
    #[serde(rename = "Blob", default)]
    blobs: Vec<ListBlob>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlobPrefix {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBlob {
    name: String,
    properties: ListBlobProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBlobProperties {
    #[serde(rename = "Last-Modified")]
    last_modified: Option<String>,
    etag: Option<String>,
    #[serde(rename = "Content-Length", default)]
    content_length: u64,
    #[serde(rename = "Content-Type")]
    content_type: Option<String>,
}
