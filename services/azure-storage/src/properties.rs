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
use std::collections::BTreeMap;

use anyhow::Context as _;
use http::header::{
    CACHE_CONTROL, CONTENT_ENCODING, CONTENT_LANGUAGE, CONTENT_LENGTH, CONTENT_TYPE, ETAG,
    LAST_MODIFIED,
};
use http::HeaderMap;
use reqstore_core::RequestBuilder;

use crate::constants::*;

/// Content headers and user metadata of a blob.
///
/// The settable fields are sent when a blob is written. `content_length`,
/// `etag` and `last_modified` are only filled when properties are read back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobProperties {
    /// MIME type.
    pub content_type: Option<String>,
    /// Content encoding, e.g. `gzip`.
    pub content_encoding: Option<String>,
    /// Content language.
    pub content_language: Option<String>,
    /// Cache control directives.
    pub cache_control: Option<String>,
    /// Base64 encoded MD5 of the whole blob.
    pub content_md5: Option<String>,
    /// User metadata, sent as `x-ms-meta-*` headers.
    pub metadata: BTreeMap<String, String>,
    /// Blob size in bytes.
    pub content_length: Option<u64>,
    /// Entity tag.
    pub etag: Option<String>,
    /// Last modification time as an http date.
    pub last_modified: Option<String>,
}

impl BlobProperties {
    /// Set the content type.
    pub fn with_content_type(mut self, v: impl Into<String>) -> Self {
        self.content_type = Some(v.into());
        self
    }

    /// Set the content encoding.
    pub fn with_content_encoding(mut self, v: impl Into<String>) -> Self {
        self.content_encoding = Some(v.into());
        self
    }

    /// Set the content language.
    pub fn with_content_language(mut self, v: impl Into<String>) -> Self {
        self.content_language = Some(v.into());
        self
    }

    /// Set the cache control directives.
    pub fn with_cache_control(mut self, v: impl Into<String>) -> Self {
        self.cache_control = Some(v.into());
        self
    }

    /// Set the base64 encoded MD5 of the whole blob.
    pub fn with_content_md5(mut self, v: impl Into<String>) -> Self {
        self.content_md5 = Some(v.into());
        self
    }

    /// Add one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Attach the settable properties to a blob write.
    pub(crate) fn apply(&self, mut builder: RequestBuilder) -> RequestBuilder {
        let headers = [
            (X_MS_BLOB_CONTENT_TYPE, &self.content_type),
            (X_MS_BLOB_CONTENT_ENCODING, &self.content_encoding),
            (X_MS_BLOB_CONTENT_LANGUAGE, &self.content_language),
            (X_MS_BLOB_CACHE_CONTROL, &self.cache_control),
            (X_MS_BLOB_CONTENT_MD5, &self.content_md5),
        ];
        for (name, value) in headers {
            if let Some(value) = value {
                builder = builder.header(name, value.as_str());
            }
        }
        for (k, v) in &self.metadata {
            builder = builder.header(format!("{X_MS_META_PREFIX}{k}"), v.as_str());
        }
        builder
    }

    /// Read properties from the headers of a blob response.
    pub(crate) fn from_headers(headers: &HeaderMap) -> anyhow::Result<Self> {
        let mut props = BlobProperties::default();
        for (name, value) in headers {
            let value = value
                .to_str()
                .with_context(|| format!("header {name} is not valid text"))?
                .to_string();
            if *name == CONTENT_LENGTH {
                let len = value
                    .parse::<u64>()
                    .with_context(|| format!("invalid content length {value}"))?;
                props.content_length = Some(len);
                continue;
            }

            let slot = if *name == CONTENT_TYPE {
                &mut props.content_type
            } else if *name == CONTENT_ENCODING {
                &mut props.content_encoding
            } else if *name == CONTENT_LANGUAGE {
                &mut props.content_language
            } else if *name == CACHE_CONTROL {
                &mut props.cache_control
            } else if *name == ETAG {
                &mut props.etag
            } else if *name == LAST_MODIFIED {
                &mut props.last_modified
            } else if name.as_str() == CONTENT_MD5 {
                &mut props.content_md5
            } else {
                if let Some(key) = name.as_str().strip_prefix(X_MS_META_PREFIX) {
                    props.metadata.insert(key.to_string(), value);
                }
                continue;
            };
            *slot = Some(value);
        }
        Ok(props)
    }
}
