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
//! Core components for talking to REST object storage services.
//!
//! This crate turns a logical storage operation into signed HTTP requests and
//! reports every outcome through one typed channel.
//!
//! ## Overview
//!
//! - **Context**: holds the [`HttpSend`] implementation and an optional
//!   [`Dispatch`] execution context for completion callbacks.
//! - **RequestDescriptor**: an immutable, unsigned request.
//! - **RequestPipeline**: signs a descriptor right before sending it, issues
//!   exactly one round trip and maps the response into an [`OperationResult`].
//! - **Retry**: [`TransientRetry`] for idempotent operations hit by service
//!   timeouts, [`OptimisticRetry`] for read-modify-write sequences that lost an
//!   entity tag race.
//! - **SasCache**: keeps a delegated-access URI fresh for one resource.
//!
//! ## Example
//!
//! ```no_run
//! use reqstore_core::{Context, RequestDescriptor, RequestPipeline, SignRequest};
//! use http::{Method, StatusCode};
//!
//! # async fn example(ctx: Context, signer: impl SignRequest) -> reqstore_core::Result<()> {
//! let pipeline = RequestPipeline::new(ctx, signer);
//!
//! let desc = RequestDescriptor::builder(Method::PUT, "https://account.blob.core.windows.net")
//!     .path("container")
//!     .query("restype", "container")
//!     .expect(StatusCode::CREATED)
//!     .build()?;
//!
//! let result = pipeline.send_bool(&desc).await;
//! if !result.is_success() {
//!     eprintln!("{:?}: {}", result.status(), result.error_message());
//! }
//! # Ok(())
//! # }
//! ```

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod hash;
pub mod retry;
pub mod service_error;
pub mod time;
pub mod utils;

mod api;
pub use api::{ProvideSignedUri, SignRequest};
mod context;
pub use context::{Context, Dispatch, HttpSend, NoopHttpSend};
mod error;
pub use error::{Error, ErrorKind, Result};
mod pipeline;
pub use pipeline::{OperationResult, RequestPipeline};
pub mod request;
pub use request::{RequestBuilder, RequestDescriptor};
mod sas;
pub use sas::{SasCache, SasEntry, SIGNATURE_EXPIRY_KEY};

pub use retry::{OptimisticRetry, TransientRetry};
