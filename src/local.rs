use std::{
    io::{self, SeekFrom},
    path::{Component, Path, PathBuf},
};

use futures::{future::BoxFuture, FutureExt};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};

use crate::{config::ConfigError, range::BlobTransfer, uri::BlobLocation};

const FILE_SCHEME: &str = "file://";

///
/// Blob store emulated on a local directory: `<root>/<container>/<blob>`.
#[derive(Clone, Debug)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Accepts `file:///some/dir` or an absolute directory path.
    pub fn from_endpoint(endpoint: Option<&str>) -> Result<Self, ConfigError> {
        let unsupported = || ConfigError::UnsupportedEndpoint(endpoint.map(str::to_string));

        let endpoint = endpoint.ok_or_else(unsupported)?;
        let path = Path::new(endpoint.strip_prefix(FILE_SCHEME).unwrap_or(endpoint));

        if !path.is_absolute() {
            return Err(unsupported());
        }

        Ok(Self::new(path))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, location: &BlobLocation) -> io::Result<PathBuf> {
        let relative = Path::new(&location.container).join(&location.blob);

        if !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("blob path escapes the store: {}", location),
            ));
        }

        Ok(self.root.join(relative))
    }
}

impl BlobTransfer for LocalBlobStore {
    fn read_range<'a>(
        &'a self,
        location: &'a BlobLocation,
        offset: u64,
        buf: &'a mut [u8],
    ) -> BoxFuture<'a, io::Result<usize>> {
        async move {
            let mut file = File::open(self.blob_path(location)?).await?;
            file.seek(SeekFrom::Start(offset)).await?;

            let mut filled = 0;
            while filled < buf.len() {
                let read = file.read(&mut buf[filled..]).await?;
                if read == 0 {
                    break;
                }
                filled += read;
            }

            Ok::<_, io::Error>(filled)
        }
        .boxed()
    }
}
