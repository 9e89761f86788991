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
//! Azure Storage client
//!
//! This crate provides:
//! - Shared Key and SAS token signing
//! - Account SAS generation, usable as a refresher for delegated signatures
//! - Block blob uploads split into blocks above [`CHUNK_THRESHOLD`]
//! - Container, blob and queue handles
//!
//! # Example
//!
//! ```rust,no_run
//! use reqstore_azure_storage::{BlobProperties, BlobService, Config, Service};
//! use reqstore_core::Context;
//! use reqstore_http_send_reqwest::ReqwestHttpSend;
//!
//! # async fn example() -> reqstore_core::Result<()> {
//! let config = Config::from_connection_string("UseDevelopmentStorage=true", Service::Blob)?;
//! let ctx = Context::new().with_http_send(ReqwestHttpSend::default());
//!
//! let container = BlobService::new(ctx, &config)?.container("photos");
//! container.create_if_not_exists().await.into_result()?;
//!
//! let data = b"hello world".as_slice();
//! let result = container
//!     .blob("greeting.txt")
//!     .upload(data, data.len() as u64, BlobProperties::default().with_content_type("text/plain"))
//!     .await;
//! if !result.is_success() {
//!     eprintln!("{:?}: {}", result.status(), result.error_message());
//! }
//! # Ok(())
//! # }
//! ```

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

mod constants;
pub use constants::{CHUNK_THRESHOLD, STORAGE_VERSION};

mod account_sas;
pub use account_sas::{AccountSasProvider, AccountSharedAccessSignature};
mod config;
pub use config::{Config, Service};
mod connection_string;
mod credential;
pub use credential::Credential;
mod sign_request;
pub use sign_request::RequestSigner;

mod resource;
mod properties;
pub use properties::BlobProperties;
mod upload;
pub use upload::{block_list_xml, ChunkedUploader, UploadState, UploadStep};
mod blob;
pub use blob::{Blob, BlobContainer, BlobItem, BlobList, BlobService};
mod queue;
pub use queue::{Queue, QueueService};

#[cfg(test)]
mod mock;
