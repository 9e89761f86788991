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
use std::fmt::Debug;
use std::sync::Arc;

use http::request::Parts;

use crate::{Context, Result};

/// SignRequest attaches authorization to an outgoing request.
///
/// The pipeline calls it immediately before transmission, never at
/// descriptor build time.
#[async_trait::async_trait]
pub trait SignRequest: Debug + Send + Sync + 'static {
    /// Sign the request with account credentials.
    ///
    /// `content_length` is the exact length of the body about to be sent.
    async fn sign_request(&self, ctx: &Context, req: &mut Parts, content_length: u64)
        -> Result<()>;

    /// Reduced signing for a request whose URI already carries a delegated
    /// signature: only protocol headers are stamped, no authorization value.
    async fn sign_lite(&self, ctx: &Context, req: &mut Parts) -> Result<()>;
}

/// ProvideSignedUri fetches a fresh delegated-access URI for a resource.
///
/// Implementations may generate the signature locally from an account key
/// or ask a remote token service for one.
#[async_trait::async_trait]
pub trait ProvideSignedUri: Debug + Send + Sync + 'static {
    /// Return a signed URI for `resource`.
    async fn provide_signed_uri(&self, ctx: &Context, resource: &str) -> Result<String>;
}

#[async_trait::async_trait]
impl<T: ProvideSignedUri + ?Sized> ProvideSignedUri for Arc<T> {
    async fn provide_signed_uri(&self, ctx: &Context, resource: &str) -> Result<String> {
        self.as_ref().provide_signed_uri(ctx, resource).await
    }
}
