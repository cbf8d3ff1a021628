// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Source of the license key sent with every delivery.
//!
//! A key given in configuration is used as is. Otherwise the key is looked
//! up on first use, usually from a secret store, and the answer is kept for
//! the life of the process. A failed lookup is cached too: every delivery
//! then fails fast with a missing key instead of hitting the store again.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::OnceCell;

pub type LicenseKeyResolverFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Option<String>> + Send>> + Send + Sync>;

#[derive(Clone)]
pub enum LicenseKeyFactory {
    Fixed(String),
    Lookup {
        resolver: LicenseKeyResolverFn,
        resolved: Arc<OnceCell<Option<String>>>,
    },
}

impl LicenseKeyFactory {
    #[must_use]
    pub fn from_key(license_key: &str) -> Self {
        Self::Fixed(license_key.trim().to_string())
    }

    #[must_use]
    pub fn from_resolver(resolver: LicenseKeyResolverFn) -> Self {
        Self::Lookup {
            resolver,
            resolved: Arc::new(OnceCell::new()),
        }
    }

    /// `None` when no usable key exists. Blank keys count as missing.
    pub async fn license_key(&self) -> Option<&str> {
        let key = match self {
            Self::Fixed(license_key) => Some(license_key.as_str()),
            Self::Lookup { resolver, resolved } => resolved
                .get_or_init(|| async {
                    resolver().await.map(|key| key.trim().to_string())
                })
                .await
                .as_deref(),
        };
        key.filter(|key| !key.is_empty())
    }
}

impl fmt::Debug for LicenseKeyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(_) => f.write_str("LicenseKeyFactory::Fixed"),
            Self::Lookup { .. } => f.write_str("LicenseKeyFactory::Lookup"),
        }
    }
}
