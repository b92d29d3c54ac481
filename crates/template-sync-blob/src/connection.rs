use template_sync::provider::ProviderError;

/// Parsed Azure storage connection string.
///
/// Authentication is SAS-based: the `SharedAccessSignature` query string is
/// appended to every request. Connection strings carrying only an
/// `AccountKey` are rejected, since shared-key request signing is not
/// implemented.
#[derive(Debug, Clone)]
pub struct BlobConnection {
    /// Blob service endpoint, no trailing slash.
    pub endpoint: String,
    /// SAS token without the leading `?`.
    pub sas: Option<String>,
}

impl BlobConnection {
    pub fn parse(connection_string: &str) -> Result<Self, ProviderError> {
        let mut endpoint = None;
        let mut account_name = None;
        let mut suffix = "core.windows.net".to_owned();
        let mut protocol = "https".to_owned();
        let mut sas = None;
        let mut has_account_key = false;

        for pair in connection_string.split(';') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let Some((key, value)) = pair.split_once('=') else {
                return Err(ProviderError::Parse(format!(
                    "malformed connection string segment: {pair}"
                )));
            };

            match key {
                "BlobEndpoint" => endpoint = Some(value.trim_end_matches('/').to_owned()),
                "AccountName" => account_name = Some(value.to_owned()),
                "EndpointSuffix" => suffix = value.to_owned(),
                "DefaultEndpointsProtocol" => protocol = value.to_owned(),
                "SharedAccessSignature" => {
                    sas = Some(value.trim_start_matches('?').to_owned());
                }
                "AccountKey" => has_account_key = true,
                _ => {}
            }
        }

        if sas.is_none() && has_account_key {
            return Err(ProviderError::Unsupported(
                "account-key authentication is not supported; \
                 use a connection string with a SharedAccessSignature"
                    .into(),
            ));
        }

        let endpoint = match (endpoint, account_name) {
            (Some(endpoint), _) => endpoint,
            (None, Some(account)) => format!("{protocol}://{account}.blob.{suffix}"),
            (None, None) => {
                return Err(ProviderError::Parse(
                    "connection string needs a BlobEndpoint or an AccountName".into(),
                ));
            }
        };

        Ok(Self { endpoint, sas })
    }
}
