// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::errors::FetchError;

/// Body of an object, still compressed, read as it arrives.
pub type ObjectStream = Box<dyn AsyncRead + Send + Unpin>;

/// Read access to blob storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Opens an object for reading. Errors that happen once the body is being
    /// read surface from the returned stream.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectStream, FetchError>;
}

/// Object store backed by a directory: object `key` of `bucket` lives at
/// `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalObjectStore { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf, FetchError> {
        let relative = Path::new(bucket).join(key);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(FetchError::Backend(format!(
                "object path {} leaves the store root",
                relative.display()
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectStream, FetchError> {
        let path = self.object_path(bucket, key)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(FetchError::NotFound),
            Err(e) => Err(FetchError::Io(e)),
        }
    }
}
