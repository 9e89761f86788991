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
use std::collections::HashMap;

use reqstore_core::{Error, Result};

use crate::{Config, Credential, Service};

// Azurite defaults.
const DEVELOPMENT_ACCOUNT_NAME: &str = "devstoreaccount1";
const DEVELOPMENT_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEVELOPMENT_HOST: &str = "http://127.0.0.1";

/// Parses an [Azure connection string][1].
///
/// [1]: https://learn.microsoft.com/en-us/azure/storage/common/storage-configure-connection-string
pub(crate) fn parse(conn_str: &str, service: Service) -> Result<Config> {
    let key_values = parse_into_key_values(conn_str)?;

    if key_values.get("UseDevelopmentStorage").map(String::as_str) == Some("true") {
        // The emulator has no file service.
        return Ok(collect_development_config(&key_values, service).unwrap_or_default());
    }

    let mut config = Config {
        account_name: key_values.get("AccountName").cloned(),
        endpoint: collect_endpoint(&key_values, service)?,
        ..Default::default()
    };

    if let Some(creds) = collect_credentials(&key_values) {
        set_credentials(&mut config, creds);
    };

    Ok(config)
}

fn parse_into_key_values(conn_str: &str) -> Result<HashMap<String, String>> {
    conn_str
        .trim()
        .replace('\n', "")
        .split(';')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(|field| {
            let (key, value) = field.split_once('=').ok_or_else(|| {
                Error::config_invalid(format!(
                    "invalid connection string, expected '=' in field: {field}"
                ))
            })?;
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

fn collect_development_config(
    key_values: &HashMap<String, String>,
    service: Service,
) -> Option<Config> {
    let port = match service {
        Service::Blob => 10000,
        Service::Queue => 10001,
        Service::Table => 10002,
        Service::File => return None,
    };

    let account_name = key_values
        .get("AccountName")
        .cloned()
        .unwrap_or_else(|| DEVELOPMENT_ACCOUNT_NAME.to_string());
    let account_key = key_values
        .get("AccountKey")
        .cloned()
        .unwrap_or_else(|| DEVELOPMENT_ACCOUNT_KEY.to_string());
    let host = match key_values.get("DevelopmentStorageProxyUri") {
        Some(uri) => uri.trim_end_matches('/').to_string(),
        None => format!("{DEVELOPMENT_HOST}:{port}"),
    };

    Some(Config {
        endpoint: Some(format!("{host}/{account_name}")),
        account_name: Some(account_name),
        account_key: Some(account_key),
        sas_token: None,
    })
}

/// Parses an endpoint from the key-value pairs if possible.
///
/// Users are still able to later supplement configuration with an endpoint,
/// so endpoint-related fields aren't enforced.
fn collect_endpoint(
    key_values: &HashMap<String, String>,
    service: Service,
) -> Result<Option<String>> {
    if let Some(endpoint) = key_values.get(endpoint_key(service)) {
        return Ok(Some(endpoint.clone()));
    }

    let (account_name, endpoint_suffix) = match (
        key_values.get("AccountName"),
        key_values.get("EndpointSuffix"),
    ) {
        (Some(name), Some(suffix)) => (name, suffix),
        _ => return Ok(None),
    };

    let protocol = key_values
        .get("DefaultEndpointsProtocol")
        .map(String::as_str)
        .unwrap_or("https");
    if protocol != "http" && protocol != "https" {
        return Err(Error::config_invalid(format!(
            "invalid DefaultEndpointsProtocol: {protocol}"
        )));
    }

    Ok(Some(format!(
        "{protocol}://{account_name}.{}.{endpoint_suffix}",
        service.endpoint_name()
    )))
}

fn collect_credentials(key_values: &HashMap<String, String>) -> Option<Credential> {
    if let Some(token) = key_values.get("SharedAccessSignature") {
        Some(Credential::with_sas_token(token))
    } else if let (Some(account_name), Some(account_key)) =
        (key_values.get("AccountName"), key_values.get("AccountKey"))
    {
        Some(Credential::with_shared_key(account_name, account_key))
    } else {
        // Credentials may still be set on the configuration afterwards.
        None
    }
}

fn set_credentials(config: &mut Config, creds: Credential) {
    match creds {
        Credential::SasToken { token } => {
            config.sas_token = Some(token);
        }
        Credential::SharedKey {
            account_name,
            account_key,
        } => {
            config.account_name = Some(account_name);
            config.account_key = Some(account_key);
        }
    }
}

fn endpoint_key(service: Service) -> &'static str {
    match service {
        Service::Blob => "BlobEndpoint",
        Service::Queue => "QueueEndpoint",
        Service::Table => "TableEndpoint",
        Service::File => "FileEndpoint",
    }
}
