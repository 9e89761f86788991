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

use async_trait::async_trait;
use chrono::TimeDelta;
use log::debug;
use percent_encoding::utf8_percent_encode;
use reqstore_core::request::PATH_ENCODE_SET;
use reqstore_core::time::{format_rfc3339, now, DateTime};
use reqstore_core::utils::Redact;
use reqstore_core::{hash, Context, Error, ProvideSignedUri, Result};

use crate::Config;

/// The default parameters that make up a SAS token
/// https://learn.microsoft.com/en-us/rest/api/storageservices/create-account-sas#specify-the-account-sas-parameters
const ACCOUNT_SAS_VERSION: &str = "2018-11-09";
const ACCOUNT_SAS_RESOURCE: &str = "bqtf";
const ACCOUNT_SAS_RESOURCE_TYPE: &str = "sco";
const ACCOUNT_SAS_PERMISSIONS: &str = "rwdlacu";

/// AccountSharedAccessSignature generates an account SAS token from a shared key.
pub struct AccountSharedAccessSignature {
    account: String,
    key: String,
    version: String,
    resource: String,
    resource_type: String,
    permissions: String,
    expiry: DateTime,
    start: Option<DateTime>,
    ip: Option<String>,
    protocol: Option<String>,
}

impl AccountSharedAccessSignature {
    /// Create a SAS token signer with default parameters
    pub fn new(account: String, key: String, expiry: DateTime) -> Self {
        Self {
            account,
            key,
            expiry,
            start: None,
            ip: None,
            protocol: None,
            version: ACCOUNT_SAS_VERSION.to_string(),
            resource: ACCOUNT_SAS_RESOURCE.to_string(),
            resource_type: ACCOUNT_SAS_RESOURCE_TYPE.to_string(),
            permissions: ACCOUNT_SAS_PERMISSIONS.to_string(),
        }
    }

    /// Override the granted permissions, e.g. `rl`.
    pub fn with_permissions(mut self, permissions: impl Into<String>) -> Self {
        self.permissions = permissions.into();
        self
    }

    /// Make the signature valid only from `start`.
    pub fn with_start(mut self, start: DateTime) -> Self {
        self.start = Some(start);
        self
    }

    /// Restrict the signature to HTTPS.
    pub fn https_only(mut self) -> Self {
        self.protocol = Some("https".to_string());
        self
    }

    // Azure documentation: https://learn.microsoft.com/en-us/rest/api/storageservices/create-account-sas#construct-the-signature-string
    fn signature(&self) -> Result<String> {
        let string_to_sign = format!(
            "{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n{}\n",
            self.account,
            self.permissions,
            self.resource,
            self.resource_type,
            self.start.map(format_rfc3339).unwrap_or_default(),
            format_rfc3339(self.expiry),
            self.ip.clone().unwrap_or_default(),
            self.protocol.clone().unwrap_or_default(),
            self.version,
        );

        let key = hash::base64_decode(&self.key)
            .map_err(|e| Error::config_invalid("failed to decode account key").with_source(e))?;
        Ok(hash::base64_hmac_sha256(&key, string_to_sign.as_bytes()))
    }

    /// Encoded `(key, value)` pairs of the token.
    ///
    /// [Example](https://docs.microsoft.com/rest/api/storageservices/create-service-sas#service-sas-example) from Azure documentation.
    pub fn token(&self) -> Result<Vec<(String, String)>> {
        let mut elements: Vec<(String, String)> = vec![
            ("sv".to_string(), self.version.to_string()),
            ("ss".to_string(), self.resource.to_string()),
            ("srt".to_string(), self.resource_type.to_string()),
            ("se".to_string(), urlencoded(format_rfc3339(self.expiry))),
            ("sp".to_string(), self.permissions.to_string()),
        ];

        if let Some(start) = &self.start {
            elements.push(("st".to_string(), urlencoded(format_rfc3339(*start))))
        }
        if let Some(ip) = &self.ip {
            elements.push(("sip".to_string(), ip.to_string()))
        }
        if let Some(protocol) = &self.protocol {
            elements.push(("spr".to_string(), protocol.to_string()))
        }

        let sig = self.signature()?;
        elements.push(("sig".to_string(), urlencoded(sig)));

        Ok(elements)
    }

    /// The token as a query string.
    pub fn query(&self) -> Result<String> {
        Ok(self
            .token()?
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&"))
    }
}

fn urlencoded(s: String) -> String {
    form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

/// AccountSasProvider signs resource URIs locally with an account key.
///
/// It backs a [`reqstore_core::SasCache`] the same way a remote token
/// service would.
#[derive(Clone)]
pub struct AccountSasProvider {
    endpoint: String,
    account_name: String,
    account_key: String,
    permissions: String,
    ttl: TimeDelta,
}

impl Debug for AccountSasProvider {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountSasProvider")
            .field("endpoint", &self.endpoint)
            .field("account_name", &self.account_name)
            .field("account_key", &Redact::from(&self.account_key))
            .field("permissions", &self.permissions)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl AccountSasProvider {
    /// Create a provider issuing one hour signatures.
    pub fn new(
        endpoint: impl Into<String>,
        account_name: impl Into<String>,
        account_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            account_name: account_name.into(),
            account_key: account_key.into(),
            permissions: ACCOUNT_SAS_PERMISSIONS.to_string(),
            ttl: TimeDelta::hours(1),
        }
    }

    /// Build a provider from a shared key configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let endpoint = config.endpoint()?;
        match (&config.account_name, &config.account_key) {
            (Some(name), Some(key)) => Ok(Self::new(endpoint, name, key)),
            _ => Err(Error::config_invalid(
                "account_name and account_key are required to issue signatures",
            )),
        }
    }

    /// Set how long issued signatures stay valid.
    pub fn with_ttl(mut self, ttl: TimeDelta) -> Self {
        self.ttl = ttl;
        self
    }

    /// Override the granted permissions.
    pub fn with_permissions(mut self, permissions: impl Into<String>) -> Self {
        self.permissions = permissions.into();
        self
    }
}

#[async_trait]
impl ProvideSignedUri for AccountSasProvider {
    async fn provide_signed_uri(&self, _: &Context, resource: &str) -> Result<String> {
        let expiry = now() + self.ttl;
        let query = AccountSharedAccessSignature::new(
            self.account_name.clone(),
            self.account_key.clone(),
            expiry,
        )
        .with_permissions(self.permissions.clone())
        .query()?;

        debug!("issued account signature for {resource} until {expiry}");
        Ok(format!(
            "{}/{}?{query}",
            self.endpoint,
            utf8_percent_encode(resource.trim_matches('/'), PATH_ENCODE_SET)
        ))
    }
}
