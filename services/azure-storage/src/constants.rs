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
// Headers used in azure services.
pub const X_MS_DATE: &str = "x-ms-date";
pub const X_MS_VERSION: &str = "x-ms-version";
pub const X_MS_BLOB_TYPE: &str = "x-ms-blob-type";
pub const X_MS_BLOB_CONTENT_TYPE: &str = "x-ms-blob-content-type";
pub const X_MS_BLOB_CONTENT_ENCODING: &str = "x-ms-blob-content-encoding";
pub const X_MS_BLOB_CONTENT_LANGUAGE: &str = "x-ms-blob-content-language";
pub const X_MS_BLOB_CACHE_CONTROL: &str = "x-ms-blob-cache-control";
pub const X_MS_BLOB_CONTENT_MD5: &str = "x-ms-blob-content-md5";
pub const X_MS_META_PREFIX: &str = "x-ms-meta-";
pub const CONTENT_MD5: &str = "content-md5";

/// Service version sent with every request.
pub const STORAGE_VERSION: &str = "2019-12-12";

/// Payloads larger than this are uploaded as a sequence of blocks, each at
/// most this large.
pub const CHUNK_THRESHOLD: u64 = 4 * 1024 * 1024;

// Query parameters.
pub const COMP: &str = "comp";
pub const RESTYPE: &str = "restype";
pub const BLOCK_ID: &str = "blockid";
