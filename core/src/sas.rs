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
use std::future::Future;
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::request::parse_query;
use crate::time::{now, parse_signature_expiry, DateTime};
use crate::utils::Redact;
use crate::{Context, Error, ProvideSignedUri, Result};

/// Query key holding the signature expiry on a delegated-access URI.
pub const SIGNATURE_EXPIRY_KEY: &str = "se";

/// SasEntry is one cached delegated-access URI.
#[derive(Clone)]
pub struct SasEntry {
    resource: String,
    signed_uri: String,
    expires_at: Option<DateTime>,
}

impl Debug for SasEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SasEntry")
            .field("resource", &self.resource)
            .field("signed_uri", &Redact::from(&self.signed_uri))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl SasEntry {
    /// Create an entry, deriving its expiry from the URI's `se` parameter.
    ///
    /// A missing or unparsable expiry leaves the entry already expired.
    pub fn new(resource: impl Into<String>, signed_uri: impl Into<String>) -> Self {
        let signed_uri = signed_uri.into();
        let expires_at = signed_uri
            .split_once('?')
            .map(|(_, q)| parse_query(q))
            .and_then(|q| {
                q.into_iter()
                    .find(|(k, _)| k == SIGNATURE_EXPIRY_KEY)
                    .map(|(_, v)| v)
            })
            .and_then(|v| parse_signature_expiry(&v).ok());

        Self {
            resource: resource.into(),
            signed_uri,
            expires_at,
        }
    }

    /// The resource this signature was issued for.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The full signed URI.
    pub fn signed_uri(&self) -> &str {
        &self.signed_uri
    }

    /// The signature part of the URI, without the leading `?`.
    pub fn sas_query(&self) -> &str {
        self.signed_uri
            .split_once('?')
            .map(|(_, q)| q)
            .unwrap_or_default()
    }

    /// The URI without its signature.
    pub fn base_uri(&self) -> &str {
        self.signed_uri
            .split_once('?')
            .map(|(base, _)| base)
            .unwrap_or(&self.signed_uri)
    }

    /// Parsed expiry, if any.
    pub fn expires_at(&self) -> Option<DateTime> {
        self.expires_at
    }

    /// An entry is valid only while its expiry lies strictly in the future.
    pub fn is_valid(&self) -> bool {
        self.expires_at.is_some_and(|t| t > now())
    }
}

/// SasCache keeps a delegated-access URI for one resource and refreshes it
/// through a [`ProvideSignedUri`] whenever it is missing or expired.
///
/// The cache is scoped to a single container or blob and is owned by the
/// wrapper value representing it. Concurrent refreshes are single-flight:
/// callers that find the entry expired queue behind one refresh and reuse
/// its outcome when it succeeds.
#[derive(Clone)]
pub struct SasCache {
    ctx: Context,
    resource: String,
    provider: Arc<dyn ProvideSignedUri>,
    entry: Arc<Mutex<Option<SasEntry>>>,
    refresh: Arc<tokio::sync::Mutex<()>>,
}

impl Debug for SasCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SasCache")
            .field("resource", &self.resource)
            .field("provider", &self.provider)
            .field("entry", &self.current())
            .finish()
    }
}

impl SasCache {
    /// Create an empty cache for `resource`.
    pub fn new(ctx: Context, resource: impl Into<String>, provider: impl ProvideSignedUri) -> Self {
        Self {
            ctx,
            resource: resource.into(),
            provider: Arc::new(provider),
            entry: Arc::new(Mutex::new(None)),
            refresh: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Seed the cache with a signed URI obtained elsewhere.
    pub fn with_signed_uri(self, signed_uri: impl Into<String>) -> Self {
        let entry = SasEntry::new(self.resource.clone(), signed_uri);
        *self.entry.lock().expect("lock poisoned") = Some(entry);
        self
    }

    /// The resource key of this cache.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The cached entry, valid or not.
    pub fn current(&self) -> Option<SasEntry> {
        self.entry.lock().expect("lock poisoned").clone()
    }

    /// Drop the cached entry so the next call refreshes it.
    pub fn invalidate(&self) {
        *self.entry.lock().expect("lock poisoned") = None;
    }

    /// Run `operation` with a valid signature, refreshing it first if
    /// needed. When no valid signature can be obtained, `on_invalid` receives
    /// the failure instead and `operation` is never invoked.
    pub async fn execute_with_valid_signature<T, F, Fut, E>(
        &self,
        operation: F,
        on_invalid: E,
    ) -> T
    where
        F: FnOnce(SasEntry) -> Fut,
        Fut: Future<Output = T>,
        E: FnOnce(Error) -> T,
    {
        match self.valid_entry().await {
            Ok(entry) => operation(entry).await,
            Err(err) => {
                warn!("no valid signature for {}: {err}", self.resource);
                on_invalid(err)
            }
        }
    }

    /// Return a valid entry, refreshing it when needed.
    pub async fn valid_entry(&self) -> Result<SasEntry> {
        if let Some(entry) = self.current().filter(SasEntry::is_valid) {
            return Ok(entry);
        }

        let _guard = self.refresh.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(entry) = self.current().filter(SasEntry::is_valid) {
            return Ok(entry);
        }

        debug!("signature for {} missing or expired, refreshing", self.resource);
        let signed_uri = self
            .provider
            .provide_signed_uri(&self.ctx, &self.resource)
            .await?;
        let entry = SasEntry::new(self.resource.clone(), signed_uri);
        if !entry.is_valid() {
            return Err(Error::unexpected(format!(
                "refreshed signature for {} has no future expiry",
                self.resource
            )));
        }

        *self.entry.lock().expect("lock poisoned") = Some(entry.clone());
        Ok(entry)
    }
}
