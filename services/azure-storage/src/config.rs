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

use reqstore_core::utils::Redact;
use reqstore_core::{Error, Result};

use crate::{connection_string, Credential};

/// Storage services reachable with one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Blob service.
    Blob,
    /// Queue service.
    Queue,
    /// Table service.
    Table,
    /// File service.
    File,
}

impl Service {
    /// Sub domain of the service endpoint, e.g. `blob` in `account.blob.core.windows.net`.
    pub fn endpoint_name(&self) -> &'static str {
        match self {
            Service::Blob => "blob",
            Service::Queue => "queue",
            Service::Table => "table",
            Service::File => "file",
        }
    }
}

/// Config carries all the configuration for Azure Storage services.
///
/// Nothing is read from the environment; embedding applications fill the
/// fields directly or parse a connection string.
#[derive(Clone, Default, PartialEq)]
pub struct Config {
    /// Azure storage account name.
    pub account_name: Option<String>,
    /// Azure storage account key, base64 encoded.
    pub account_key: Option<String>,
    /// SAS token, preferred over the account key when both are set.
    pub sas_token: Option<String>,
    /// Service endpoint, e.g. `https://account.blob.core.windows.net`.
    pub endpoint: Option<String>,
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("account_name", &self.account_name)
            .field("account_key", &Redact::from(&self.account_key))
            .field("sas_token", &Redact::from(&self.sas_token))
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl Config {
    /// Parses an [Azure connection string][1] into a configuration object.
    ///
    /// The connection string doesn't have to specify all required parameters
    /// because the user is still allowed to set them later directly on the object.
    ///
    /// The function takes a Service parameter because it determines the fields used
    /// to parse the endpoint.
    ///
    /// An example of a connection string looks like:
    ///
    /// ```txt
    /// AccountName=mystorageaccount;
    /// AccountKey=Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==;
    /// BlobEndpoint=https://mystorageaccount.blob.core.windows.net
    /// ```
    ///
    /// [1]: https://learn.microsoft.com/en-us/azure/storage/common/storage-configure-connection-string
    pub fn from_connection_string(conn_str: &str, service: Service) -> Result<Self> {
        connection_string::parse(conn_str, service)
    }

    /// Set the endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// The configured endpoint without a trailing `/`.
    pub fn endpoint(&self) -> Result<&str> {
        self.endpoint
            .as_deref()
            .map(|v| v.trim_end_matches('/'))
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::config_invalid("endpoint is required"))
    }

    /// Derive the credential: a SAS token if present, the shared key otherwise.
    pub fn credential(&self) -> Result<Credential> {
        if let Some(token) = self.sas_token.as_deref().filter(|v| !v.is_empty()) {
            return Ok(Credential::with_sas_token(token));
        }

        match (&self.account_name, &self.account_key) {
            (Some(name), Some(key)) if !name.is_empty() && !key.is_empty() => {
                Ok(Credential::with_shared_key(name, key))
            }
            _ => Err(Error::config_invalid(
                "either sas_token or account_name with account_key is required",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use reqstore_core::ErrorKind;

    use super::*;

    #[test]
    fn test_credential_prefers_sas_token() {
        let config = Config {
            account_name: Some("account".to_string()),
            account_key: Some("a2V5".to_string()),
            sas_token: Some("sv=2019-12-12&sig=abc".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            config.credential().unwrap(),
            Credential::SasToken { token } if token == "sv=2019-12-12&sig=abc"
        ));
    }

    #[test]
    fn test_credential_requires_key_pair() {
        let config = Config {
            account_name: Some("account".to_string()),
            ..Default::default()
        };
        let err = config.credential().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_endpoint() {
        let config = Config::default().with_endpoint("https://account.blob.core.windows.net/");
        assert_eq!(
            config.endpoint().unwrap(),
            "https://account.blob.core.windows.net"
        );
        assert_eq!(
            Config::default().endpoint().unwrap_err().kind(),
            ErrorKind::ConfigInvalid
        );
    }
}
