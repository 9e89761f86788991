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
use std::str::FromStr;

use bytes::Bytes;
use http::header::{HeaderName, CONTENT_LENGTH};
use http::uri::{Authority, PathAndQuery, Scheme};
use http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::utils::Redact;
use crate::{Error, Result};

/// Query keys that belong to a delegated signature.
///
/// They are stripped from every base URI so that a refreshed signature never
/// travels next to a stale one.
pub const SIGNATURE_QUERY_KEYS: &[&str] = &[
    "sv", "ss", "srt", "sr", "sp", "se", "st", "sip", "spr", "sig", "si", "sdd", "ses",
];

/// Query values are encoded strictly, leaving only unreserved characters.
pub const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Path segments keep `/` so blob names with virtual directories survive.
pub const PATH_ENCODE_SET: &AsciiSet = &QUERY_ENCODE_SET.remove(b'/');

/// RequestDescriptor is one fully described, not yet signed, request.
///
/// It is immutable once built. Authorization is attached by the pipeline
/// right before transmission so the signed content length is always the
/// length actually sent.
#[derive(Clone)]
pub struct RequestDescriptor {
    method: Method,
    scheme: Scheme,
    authority: Authority,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    body: Option<Bytes>,
    expected: StatusCode,
    delegated: bool,
}

impl Debug for RequestDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let query: Vec<_> = self
            .query
            .iter()
            .map(|(k, v)| {
                if SIGNATURE_QUERY_KEYS.contains(&k.as_str()) {
                    (k.as_str(), format!("{:?}", Redact::from(v)))
                } else {
                    (k.as_str(), v.clone())
                }
            })
            .collect();
        f.debug_struct("RequestDescriptor")
            .field("method", &self.method)
            .field("authority", &self.authority)
            .field("path", &self.path)
            .field("query", &query)
            .field("body_len", &self.content_length())
            .field("expected", &self.expected)
            .field("delegated", &self.delegated)
            .finish()
    }
}

impl RequestDescriptor {
    /// Start building a request against `base`.
    ///
    /// Any signature parameters present on `base` are dropped.
    pub fn builder(method: Method, base: &str) -> RequestBuilder {
        RequestBuilder {
            method,
            base: base.to_string(),
            segments: Vec::new(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            expected: StatusCode::OK,
            signature: None,
        }
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Percent encoded path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Decoded query pairs, in insertion order.
    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Get query value by key.
    pub fn query_get(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request body, if any.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Length of the body that will be sent.
    pub fn content_length(&self) -> u64 {
        self.body.as_ref().map_or(0, |b| b.len() as u64)
    }

    /// The status code that marks this request as successful.
    pub fn expected_status(&self) -> StatusCode {
        self.expected
    }

    /// Whether the URI carries a delegated signature instead of relying on
    /// account credentials.
    pub fn is_delegated(&self) -> bool {
        self.delegated
    }

    /// Full request URI, including the encoded query.
    pub fn uri(&self) -> Result<Uri> {
        let mut paq = self.path.clone();
        for (i, (k, v)) in self.query.iter().enumerate() {
            paq.push(if i == 0 { '?' } else { '&' });
            paq.push_str(&utf8_percent_encode(k, QUERY_ENCODE_SET).to_string());
            if !v.is_empty() {
                paq.push('=');
                paq.push_str(&utf8_percent_encode(v, QUERY_ENCODE_SET).to_string());
            }
        }

        Ok(Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(PathAndQuery::from_str(&paq)?)
            .build()?)
    }

    /// Convert into an unsigned http request.
    ///
    /// `Content-Length` is always set from the body carried here.
    pub fn to_request(&self) -> Result<http::Request<Bytes>> {
        let mut req = http::Request::builder()
            .method(self.method.clone())
            .uri(self.uri()?)
            .body(self.body.clone().unwrap_or_default())?;
        *req.headers_mut() = self.headers.clone();
        req.headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from(self.content_length()));
        Ok(req)
    }
}

/// Builder for [`RequestDescriptor`].
///
/// Errors are collected and reported by [`RequestBuilder::build`], before any
/// network activity.
pub struct RequestBuilder {
    method: Method,
    base: String,
    segments: Vec<String>,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
    expected: StatusCode,
    signature: Option<String>,
}

impl RequestBuilder {
    /// Append a path segment; `/` inside it is kept as a separator.
    pub fn path(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// Push a decoded query pair.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Set a header, replacing any earlier value for the same name.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Status code considered successful. Defaults to `200 OK`.
    pub fn expect(mut self, status: StatusCode) -> Self {
        self.expected = status;
        self
    }

    /// Attach a delegated signature, given as the query part of a signed URI.
    pub fn signature(mut self, sas_query: impl Into<String>) -> Self {
        self.signature = Some(sas_query.into());
        self
    }

    /// Build the descriptor.
    pub fn build(self) -> Result<RequestDescriptor> {
        let base = Uri::from_str(&self.base)?;
        let parts = base.into_parts();
        let authority = parts
            .authority
            .ok_or_else(|| Error::request_invalid("request without authority is invalid"))?;
        let paq = parts
            .path_and_query
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        let mut path = paq.path().trim_end_matches('/').to_string();
        for segment in &self.segments {
            let segment = segment.trim_matches('/');
            if segment.is_empty() {
                return Err(Error::request_invalid("path segment must not be empty"));
            }
            path.push('/');
            path.push_str(&utf8_percent_encode(segment, PATH_ENCODE_SET).to_string());
        }
        if path.is_empty() {
            path.push('/');
        }

        let mut query: Vec<(String, String)> = paq
            .query()
            .map(parse_query)
            .unwrap_or_default()
            .into_iter()
            .filter(|(k, _)| !SIGNATURE_QUERY_KEYS.contains(&k.as_str()))
            .collect();
        query.extend(self.query);

        let delegated = match &self.signature {
            Some(sas) => {
                let sas = parse_query(sas.trim_start_matches('?'));
                if !sas.iter().any(|(k, _)| k == "sig") {
                    return Err(Error::request_invalid(
                        "delegated signature must contain a sig parameter",
                    ));
                }
                query.extend(sas);
                true
            }
            None => false,
        };

        let mut headers = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in self.headers {
            headers.insert(HeaderName::from_str(&name)?, HeaderValue::from_str(&value)?);
        }

        Ok(RequestDescriptor {
            method: self.method,
            scheme: parts.scheme.unwrap_or(Scheme::HTTPS),
            authority,
            path,
            query,
            headers,
            body: self.body,
            expected: self.expected,
            delegated,
        })
    }
}

/// Parse a URI query string into percent decoded pairs.
///
/// A raw `+` is kept as is: base64 signatures and UTC offsets carry it
/// literally.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|kv| !kv.is_empty())
        .map(|kv| {
            let (k, v) = kv.split_once('=').unwrap_or((kv, ""));
            (
                percent_decode_str(k).decode_utf8_lossy().into_owned(),
                percent_decode_str(v).decode_utf8_lossy().into_owned(),
            )
        })
        .collect()
}
