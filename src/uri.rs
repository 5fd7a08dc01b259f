use std::fmt;

const AZ_SCHEME: &str = "az://";
const HTTPS_SCHEME: &str = "https://";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UriError {
    #[error("unsupported uri scheme: {0}")]
    UnsupportedScheme(String),

    #[error("uri has no container: {0}")]
    MissingContainer(String),

    #[error("uri has no object path: {0}")]
    MissingObjectPath(String),
}

///
/// Container and object path of one blob.
///
/// Accepts `az://container/object/path` or an https endpoint url such as
/// `https://account.blob.core.windows.net/container/object/path`, where the
/// first path segment after the host names the container.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlobLocation {
    pub container: String,
    pub blob: String,
}

impl BlobLocation {
    pub fn parse(uri: &str) -> Result<Self, UriError> {
        let path = if let Some(rest) = uri.strip_prefix(AZ_SCHEME) {
            rest
        } else if let Some(rest) = uri.strip_prefix(HTTPS_SCHEME) {
            // sas tokens ride in the query string
            let rest = rest.split(['?', '#']).next().unwrap_or_default();
            match rest.split_once('/') {
                Some((_host, path)) => path,
                None => "",
            }
        } else {
            return Err(UriError::UnsupportedScheme(uri.to_string()));
        };

        let (container, blob) = path.split_once('/').unwrap_or((path, ""));

        if container.is_empty() {
            return Err(UriError::MissingContainer(uri.to_string()));
        }

        if blob.is_empty() || blob.ends_with('/') {
            return Err(UriError::MissingObjectPath(uri.to_string()));
        }

        Ok(Self {
            container: container.to_string(),
            blob: blob.to_string(),
        })
    }
}

impl fmt::Display for BlobLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}/{}", AZ_SCHEME, self.container, self.blob)
    }
}
