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
use std::fmt::{Debug, Formatter};

use bytes::Bytes;
use http::{Method, StatusCode};
use log::{debug, warn};
use rand::Rng;
use reqstore_core::hash::base64_encode;
use reqstore_core::{Error, OperationResult, RequestBuilder, Result, SasEntry};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::constants::*;
use crate::resource::Resource;
use crate::BlobProperties;

/// Steps of a chunked upload.
///
/// ```text
/// Start -> SingleShot -> Done
/// Start -> UploadBlock* -> CommitBlockList -> Done
/// ```
///
/// `Failed` is absorbing and reachable from every step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStep {
    /// Nothing has been sent yet.
    Start,
    /// The whole payload goes out in one request.
    SingleShot,
    /// The next block is about to be uploaded.
    UploadBlock,
    /// All blocks are uploaded; the block list is about to be committed.
    CommitBlockList,
    /// The blob is written.
    Done,
    /// A request failed; nothing else will be sent.
    Failed,
}

/// Progress of one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadState {
    total_length: u64,
    bytes_sent: u64,
    block_ids: Vec<String>,
    current_block: Option<String>,
    uses_blocks: bool,
}

impl UploadState {
    /// Create the state for `total_length` bytes. Whether blocks are used is
    /// decided here, once.
    pub fn new(total_length: u64) -> Self {
        Self {
            total_length,
            bytes_sent: 0,
            block_ids: Vec::new(),
            current_block: None,
            uses_blocks: total_length > CHUNK_THRESHOLD,
        }
    }

    /// Bytes the upload will send in total.
    pub fn total_length(&self) -> u64 {
        self.total_length
    }

    /// Bytes confirmed by the service so far.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Identifiers of the uploaded blocks, in upload order.
    pub fn block_ids(&self) -> &[String] {
        &self.block_ids
    }

    /// Identifier of the block in flight, if any.
    pub fn current_block(&self) -> Option<&str> {
        self.current_block.as_deref()
    }

    /// Whether the payload is split into blocks.
    pub fn uses_blocks(&self) -> bool {
        self.uses_blocks
    }

    fn remaining(&self) -> u64 {
        self.total_length - self.bytes_sent
    }

    /// A fresh identifier, distinct from every block of this upload.
    ///
    /// All identifiers share one length as the service requires.
    fn next_block_id(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let id = base64_encode(&rng.gen::<[u8; 16]>());
            if !self.block_ids.contains(&id) {
                return id;
            }
        }
    }

    fn confirm_block(&mut self, len: u64) {
        if let Some(id) = self.current_block.take() {
            self.block_ids.push(id);
        }
        self.bytes_sent += len;
    }
}

/// ChunkedUploader writes a byte stream to one block blob.
///
/// Payloads up to [`CHUNK_THRESHOLD`] go out in a single request. Larger
/// ones are uploaded block by block, strictly one request at a time, and
/// assembled by a final block list commit. Blob properties travel with the
/// single request or with the commit, never with individual blocks.
///
/// Any failure aborts the upload. Blocks already uploaded stay uncommitted
/// and expire on the service side.
pub struct ChunkedUploader<R> {
    resource: Resource,
    signature: Option<SasEntry>,
    properties: BlobProperties,
    reader: Option<R>,
    state: UploadState,
    step: UploadStep,
    last_status: Option<StatusCode>,
}

impl<R> Debug for ChunkedUploader<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedUploader")
            .field("blob", &self.resource.key())
            .field("state", &self.state)
            .field("step", &self.step)
            .finish()
    }
}

impl<R: AsyncRead + Unpin> ChunkedUploader<R> {
    pub(crate) fn new(
        resource: Resource,
        signature: Option<SasEntry>,
        reader: R,
        length: u64,
        properties: BlobProperties,
    ) -> Self {
        Self {
            resource,
            signature,
            properties,
            reader: Some(reader),
            state: UploadState::new(length),
            step: UploadStep::Start,
            last_status: None,
        }
    }

    /// Current progress.
    pub fn state(&self) -> &UploadState {
        &self.state
    }

    /// Current step.
    pub fn step(&self) -> UploadStep {
        self.step
    }

    /// Drive the upload to completion.
    ///
    /// The source is closed once the blob is written.
    pub async fn upload(&mut self) -> OperationResult<()> {
        loop {
            let next = match self.step {
                UploadStep::Start => Ok(if self.state.uses_blocks {
                    UploadStep::UploadBlock
                } else {
                    UploadStep::SingleShot
                }),
                UploadStep::SingleShot => self.single_shot().await,
                UploadStep::UploadBlock => self.upload_block().await,
                UploadStep::CommitBlockList => self.commit_block_list().await,
                UploadStep::Done => {
                    let status = self.last_status.unwrap_or(StatusCode::CREATED);
                    return OperationResult::success(status, ());
                }
                UploadStep::Failed => {
                    return OperationResult::failure(Error::request_invalid(
                        "upload has already failed",
                    ))
                }
            };

            match next {
                Ok(step) => {
                    debug!(
                        "upload of {} moves from {:?} to {:?} ({}/{} bytes)",
                        self.resource.key(),
                        self.step,
                        step,
                        self.state.bytes_sent,
                        self.state.total_length
                    );
                    self.step = step;
                    if step == UploadStep::Done {
                        self.reader = None;
                    }
                }
                Err(err) => {
                    warn!(
                        "upload of {} failed at {:?}: {err}",
                        self.resource.key(),
                        self.step
                    );
                    self.step = UploadStep::Failed;
                    return OperationResult::failure(err);
                }
            }
        }
    }

    async fn single_shot(&mut self) -> Result<UploadStep> {
        let body = self.read_exact(self.state.total_length).await?;
        let len = body.len() as u64;

        let builder = self.request(Method::PUT).await?;
        let req = self
            .properties
            .apply(builder)
            .header(X_MS_BLOB_TYPE, "BlockBlob")
            .body(body)
            .expect(StatusCode::CREATED)
            .build()?;
        self.send(&req).await?;

        self.state.bytes_sent += len;
        Ok(UploadStep::Done)
    }

    async fn upload_block(&mut self) -> Result<UploadStep> {
        let block_id = self.state.next_block_id();
        self.state.current_block = Some(block_id.clone());

        let body = self
            .read_exact(self.state.remaining().min(CHUNK_THRESHOLD))
            .await?;
        let len = body.len() as u64;

        let req = self
            .request(Method::PUT)
            .await?
            .query(COMP, "block")
            .query(BLOCK_ID, block_id)
            .body(body)
            .expect(StatusCode::CREATED)
            .build()?;
        self.send(&req).await?;

        self.state.confirm_block(len);
        if self.state.bytes_sent < self.state.total_length {
            Ok(UploadStep::UploadBlock)
        } else {
            Ok(UploadStep::CommitBlockList)
        }
    }

    async fn commit_block_list(&mut self) -> Result<UploadStep> {
        let builder = self.request(Method::PUT).await?;
        let req = self
            .properties
            .apply(builder)
            .query(COMP, "blocklist")
            .body(block_list_xml(&self.state.block_ids))
            .expect(StatusCode::CREATED)
            .build()?;
        self.send(&req).await?;

        Ok(UploadStep::Done)
    }

    /// Start the next request. A signature that expired while earlier
    /// blocks were in flight is refreshed first.
    async fn request(&mut self, method: Method) -> Result<RequestBuilder> {
        if self.signature.as_ref().is_some_and(|entry| !entry.is_valid()) {
            debug!(
                "signature for {} expired during upload, refreshing",
                self.resource.key()
            );
            self.signature = self.resource.valid_signature().await?;
        }
        Ok(self.resource.request(method, self.signature.as_ref()))
    }

    async fn send(&mut self, req: &reqstore_core::RequestDescriptor) -> Result<()> {
        let result = self.resource.pipeline().send_bool(req).await;
        let status = result.status();
        result.into_result()?;
        self.last_status = status;
        Ok(())
    }

    /// Read exactly `len` bytes from the source.
    async fn read_exact(&mut self, len: u64) -> Result<Bytes> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| Error::request_invalid("upload source is already closed"))?;

        let mut buf = Vec::with_capacity(len as usize);
        reader.take(len).read_to_end(&mut buf).await?;
        if (buf.len() as u64) < len {
            return Err(Error::request_invalid(format!(
                "upload source ended after {} of {} bytes",
                self.state.bytes_sent + buf.len() as u64,
                self.state.total_length
            )));
        }
        Ok(Bytes::from(buf))
    }
}

/// Build the block list document.
///
/// Order is significant: it is the byte order of the committed blob.
pub fn block_list_xml(block_ids: &[String]) -> String {
    let mut s = String::with_capacity(64 + block_ids.len() * 40);
    s.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<BlockList>\n");
    for id in block_ids {
        s.push_str("\t<Latest>");
        s.push_str(id);
        s.push_str("</Latest>\n");
    }
    s.push_str("</BlockList>");
    s
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use reqstore_core::ErrorKind;
    use serde::Deserialize;

    use super::*;
    use crate::mock::{delegated_pipeline, pipeline, MockHttpSend, ENDPOINT};

    const MIB: usize = 1024 * 1024;

    fn uploader<'a>(
        http: &MockHttpSend,
        data: &'a [u8],
        length: u64,
    ) -> ChunkedUploader<&'a [u8]> {
        let resource = Resource::new(pipeline(http), ENDPOINT, "container").child("dir/blob.bin");
        let properties = BlobProperties::default()
            .with_content_type("application/octet-stream")
            .with_metadata("owner", "ops");
        ChunkedUploader::new(resource, None, data, length, properties)
    }

    #[derive(Deserialize)]
    struct BlockList {
        #[serde(rename = "Latest", default)]
        latest: Vec<String>,
    }

    #[tokio::test]
    async fn test_large_payload_is_uploaded_in_blocks() {
        let data: Vec<u8> = (0..10 * MIB).map(|i| (i % 251) as u8).collect();
        let http = MockHttpSend::default()
            .respond(201, "")
            .respond(201, "")
            .respond(201, "")
            .respond(201, "");

        let mut uploader = uploader(&http, &data, data.len() as u64);
        assert!(uploader.state().uses_blocks());
        let result = uploader.upload().await;
        assert!(result.is_success(), "{}", result.error_message());
        assert_eq!(uploader.step(), UploadStep::Done);

        let requests = http.requests();
        assert_eq!(requests.len(), 4);

        let sizes: Vec<_> = requests[..3].iter().map(|r| r.body.len()).collect();
        assert_eq!(sizes, [4 * MIB, 4 * MIB, 2 * MIB]);
        let mut uploaded = Vec::new();
        for req in &requests[..3] {
            assert_eq!(req.method, Method::PUT);
            assert_eq!(req.path, "/container/dir/blob.bin");
            assert_eq!(req.query_get(COMP), Some("block"));
            assert!(req.header("x-ms-meta-owner").is_none());
            assert!(req.header(X_MS_BLOB_CONTENT_TYPE).is_none());
            uploaded.push(req.query_get(BLOCK_ID).unwrap().to_string());
            uploaded_bytes_match(&data, &uploaded, req);
        }

        let commit = &requests[3];
        assert_eq!(commit.query_get(COMP), Some("blocklist"));
        assert_eq!(commit.header("x-ms-meta-owner"), Some("ops"));
        assert_eq!(
            commit.header(X_MS_BLOB_CONTENT_TYPE),
            Some("application/octet-stream")
        );
        let list: BlockList = quick_xml::de::from_reader(commit.body.as_ref()).unwrap();
        assert_eq!(list.latest, uploaded);
        assert_eq!(uploader.state().block_ids(), uploaded.as_slice());
        assert_eq!(uploader.state().bytes_sent(), data.len() as u64);
    }

    fn uploaded_bytes_match(data: &[u8], uploaded: &[String], req: &crate::mock::RecordedRequest) {
        let offset = (uploaded.len() - 1) * 4 * MIB;
        assert_eq!(&data[offset..offset + req.body.len()], req.body.as_ref());
    }

    #[tokio::test]
    async fn test_threshold_payload_is_single_shot() {
        let data = vec![7u8; 4 * MIB];
        let http = MockHttpSend::default().respond(201, "");

        let mut uploader = uploader(&http, &data, data.len() as u64);
        assert!(!uploader.state().uses_blocks());
        assert!(uploader.upload().await.is_success());

        let requests = http.requests();
        assert_eq!(requests.len(), 1);
        let req = &requests[0];
        assert_eq!(req.body.len(), 4 * MIB);
        assert_eq!(req.query_get(COMP), None);
        assert_eq!(req.header(X_MS_BLOB_TYPE), Some("BlockBlob"));
        assert_eq!(req.header("x-ms-meta-owner"), Some("ops"));
        assert!(req
            .header("authorization")
            .unwrap()
            .starts_with("SharedKey account:"));
    }

    #[tokio::test]
    async fn test_empty_payload() {
        let http = MockHttpSend::default().respond(201, "");

        let mut uploader = uploader(&http, &[], 0);
        assert!(uploader.upload().await.is_success());

        let requests = http.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].body.is_empty());
        assert_eq!(requests[0].header("content-length"), Some("0"));
    }

    #[tokio::test]
    async fn test_failed_block_aborts_upload() {
        let data = vec![1u8; 10 * MIB];
        let http = MockHttpSend::default().respond(201, "").respond(
            500,
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><Error><Code>InternalError</Code><Message>Server failed to write block</Message></Error>",
        );

        let mut uploader = uploader(&http, &data, data.len() as u64);
        let result = uploader.upload().await;

        assert!(!result.is_success());
        assert_eq!(result.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(result.error_message(), "Server failed to write block");
        assert_eq!(http.requests().len(), 2);
        assert_eq!(uploader.step(), UploadStep::Failed);
        assert_eq!(uploader.state().block_ids().len(), 1);
        assert_eq!(uploader.state().bytes_sent(), 4 * MIB as u64);
        assert!(uploader.state().current_block().is_some());

        // Failed is absorbing.
        assert!(!uploader.upload().await.is_success());
        assert_eq!(http.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_commit_is_reported() {
        let data = vec![1u8; 5 * MIB];
        let http = MockHttpSend::default()
            .respond(201, "")
            .respond(201, "")
            .respond(400, "");

        let mut uploader = uploader(&http, &data, data.len() as u64);
        let result = uploader.upload().await;

        assert_eq!(result.status(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(result.error_message(), "400: error performing request");
        assert_eq!(http.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_short_source_is_rejected() {
        let data = vec![1u8; 5 * MIB];
        let http = MockHttpSend::default().respond(201, "");

        let mut uploader = uploader(&http, &data, 10 * MIB as u64);
        let result = uploader.upload().await;

        assert_eq!(result.error().unwrap().kind(), ErrorKind::RequestInvalid);
        assert_eq!(result.status(), None);
        assert_eq!(http.requests().len(), 1);
    }

    #[derive(Debug, Default)]
    struct FreshProvider {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl reqstore_core::ProvideSignedUri for FreshProvider {
        async fn provide_signed_uri(
            &self,
            _: &reqstore_core::Context,
            resource: &str,
        ) -> Result<String> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(format!(
                "{ENDPOINT}/{resource}?sv=2019-12-12&se=2099-01-01T00:00:00Z&sp=rw&sig=fresh"
            ))
        }
    }

    #[tokio::test]
    async fn test_expired_signature_is_refreshed_between_blocks() {
        let data: Vec<u8> = vec![1; 5 * MIB];
        let http = MockHttpSend::default()
            .respond(201, "")
            .respond(201, "")
            .respond(201, "");
        let provider = std::sync::Arc::new(FreshProvider::default());
        let resource = Resource::new(delegated_pipeline(&http), ENDPOINT, "container")
            .child("blob.bin")
            .with_sas_provider(provider.clone());
        let stale = SasEntry::new(
            "container/blob.bin",
            format!("{ENDPOINT}/container/blob.bin?se=2000-01-01T00:00:00Z&sig=stale"),
        );

        let mut uploader = ChunkedUploader::new(
            resource,
            Some(stale),
            data.as_slice(),
            data.len() as u64,
            BlobProperties::default(),
        );
        let result = uploader.upload().await;
        assert!(result.is_success(), "{}", result.error_message());

        let requests = http.requests();
        assert_eq!(requests.len(), 3);
        for req in &requests {
            assert_eq!(req.query_get("sig"), Some("fresh"));
        }
        assert_eq!(provider.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_block_list_xml() {
        let ids = vec!["bnVtZXJvMQ==".to_string(), "bnVtZXJvMg==".to_string()];
        assert_eq!(
            block_list_xml(&ids),
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<BlockList>\n\t<Latest>bnVtZXJvMQ==</Latest>\n\t<Latest>bnVtZXJvMg==</Latest>\n</BlockList>"
        );
    }

    #[test]
    fn test_block_ids_are_unique_and_fixed_length() {
        let mut state = UploadState::new(100 * MIB as u64);
        for _ in 0..64 {
            state.current_block = Some(state.next_block_id());
            state.confirm_block(1);
        }
        let ids = state.block_ids();
        assert!(ids.iter().all(|id| id.len() == ids[0].len()));
        let mut dedup = ids.to_vec();
        dedup.sort();
        dedup.dedup();
        assert_eq!(dedup.len(), 64);
    }
}
