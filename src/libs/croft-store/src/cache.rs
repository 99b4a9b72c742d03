//! Typed subscriber cache operations.
//!
//! Two column families:
//! - `impu`, keyed by public identity: `profile`, `is_registered`,
//!   `associated_private_id_<impi>`
//! - `impi`, keyed by private identity: `digest_ha1`, `digest_realm`,
//!   `digest_qop`, `public_id_<impu>`

use std::sync::Arc;

use croft_ims::authvector::DigestAuthVector;
use croft_ims::subscription::RegistrationState;

use crate::error::{StoreError, StoreResult};
use crate::store::{Column, ColumnStore};

/// Column family keyed by public identity
pub const IMPU_FAMILY: &str = "impu";
/// Column family keyed by private identity
pub const IMPI_FAMILY: &str = "impi";

mod col {
    pub const PROFILE: &str = "profile";
    pub const IS_REGISTERED: &str = "is_registered";
    pub const ASSOC_PRIVATE_PREFIX: &str = "associated_private_id_";
    pub const PUBLIC_ID_PREFIX: &str = "public_id_";
    pub const DIGEST_HA1: &str = "digest_ha1";
    pub const DIGEST_REALM: &str = "digest_realm";
    pub const DIGEST_QOP: &str = "digest_qop";
}

/// A cached subscription, as read back from the `impu` family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRecord {
    pub profile: String,
    pub state: RegistrationState,
    pub associated_private_ids: Vec<String>,
    /// Seconds until the record expires; 0 when it never does
    pub ttl: u32,
}

/// Typed operations over the subscriber column families
pub struct SubscriberCache {
    store: Arc<dyn ColumnStore>,
}

impl SubscriberCache {
    pub fn new(store: Arc<dyn ColumnStore>) -> Self {
        Self { store }
    }

    /// Fetch the cached digest vector for a private identity. When a public
    /// identity is supplied the vector is only returned if that binding is
    /// recorded.
    pub async fn get_auth_vector(
        &self,
        private_id: &str,
        public_id: Option<&str>,
    ) -> StoreResult<DigestAuthVector> {
        let row = self.store.get_row(IMPI_FAMILY, private_id).await?;

        if let Some(public_id) = public_id {
            let wanted = format!("{}{}", col::PUBLIC_ID_PREFIX, public_id);
            if !row.iter().any(|c| c.name == wanted) {
                log::debug!("{private_id} has no cached binding to {public_id}");
                return Err(StoreError::NotFound);
            }
        }

        let value = |name: &str| {
            row.iter()
                .find(|c| c.name == name)
                .map(|c| c.value.clone())
        };
        let ha1 = value(col::DIGEST_HA1).ok_or(StoreError::NotFound)?;
        Ok(DigestAuthVector {
            ha1,
            realm: value(col::DIGEST_REALM).unwrap_or_default(),
            qop: value(col::DIGEST_QOP).unwrap_or_default(),
        })
    }

    /// Store digest credentials for a private identity
    pub async fn put_auth_vector(
        &self,
        private_id: &str,
        vector: &DigestAuthVector,
        timestamp: i64,
        ttl: Option<u32>,
    ) -> StoreResult<()> {
        let columns = vec![
            (col::DIGEST_HA1.to_string(), vector.ha1.clone()),
            (col::DIGEST_REALM.to_string(), vector.realm.clone()),
            (col::DIGEST_QOP.to_string(), vector.qop.clone()),
        ];
        self.store
            .put_columns(
                IMPI_FAMILY,
                &[private_id.to_string()],
                &columns,
                timestamp,
                ttl,
            )
            .await
    }

    /// Public identities recorded against a private identity. An absent row
    /// reads as an empty list.
    pub async fn get_associated_public_ids(&self, private_id: &str) -> StoreResult<Vec<String>> {
        let row = match self.store.get_row(IMPI_FAMILY, private_id).await {
            Ok(row) => row,
            Err(StoreError::NotFound) => return Ok(Vec::new()),
            Err(err) => return Err(err),
        };
        Ok(row
            .into_iter()
            .filter_map(|c| {
                c.name
                    .strip_prefix(col::PUBLIC_ID_PREFIX)
                    .map(str::to_string)
            })
            .collect())
    }

    /// Read the subscription record for a public identity.
    /// `Err(NotFound)` when there is no record at all.
    pub async fn get_subscription(&self, public_id: &str) -> StoreResult<SubscriptionRecord> {
        let row = self.store.get_row(IMPU_FAMILY, public_id).await?;

        let mut record = SubscriptionRecord {
            profile: String::new(),
            state: RegistrationState::NotRegistered,
            associated_private_ids: Vec::new(),
            ttl: 0,
        };
        for Column { name, value, ttl } in row {
            if name == col::PROFILE {
                record.profile = value;
            } else if name == col::IS_REGISTERED {
                record.state = if value == "1" {
                    RegistrationState::Registered
                } else {
                    RegistrationState::Unregistered
                };
                record.ttl = ttl.unwrap_or(0);
            } else if let Some(private_id) = name.strip_prefix(col::ASSOC_PRIVATE_PREFIX) {
                record.associated_private_ids.push(private_id.to_string());
            }
        }
        Ok(record)
    }

    /// Write a subscription record against every public identity of the
    /// implicit registration set
    pub async fn put_subscription(
        &self,
        public_ids: &[String],
        profile: &str,
        state: RegistrationState,
        private_ids: &[String],
        timestamp: i64,
        ttl: Option<u32>,
    ) -> StoreResult<()> {
        let mut columns = vec![
            (col::PROFILE.to_string(), profile.to_string()),
            (
                col::IS_REGISTERED.to_string(),
                if state == RegistrationState::Registered {
                    "1".to_string()
                } else {
                    "0".to_string()
                },
            ),
        ];
        for private_id in private_ids {
            columns.push((
                format!("{}{}", col::ASSOC_PRIVATE_PREFIX, private_id),
                private_id.clone(),
            ));
        }
        self.store
            .put_columns(IMPU_FAMILY, public_ids, &columns, timestamp, ttl)
            .await
    }

    /// Record a private identity against every public identity of a set
    pub async fn put_associated_private_id(
        &self,
        public_ids: &[String],
        private_id: &str,
        timestamp: i64,
        ttl: Option<u32>,
    ) -> StoreResult<()> {
        let columns = vec![(
            format!("{}{}", col::ASSOC_PRIVATE_PREFIX, private_id),
            private_id.to_string(),
        )];
        self.store
            .put_columns(IMPU_FAMILY, public_ids, &columns, timestamp, ttl)
            .await
    }

    /// Record that a private identity includes a public identity
    pub async fn put_associated_public_id(
        &self,
        private_id: &str,
        public_id: &str,
        timestamp: i64,
        ttl: Option<u32>,
    ) -> StoreResult<()> {
        let columns = vec![(
            format!("{}{}", col::PUBLIC_ID_PREFIX, public_id),
            public_id.to_string(),
        )];
        self.store
            .put_columns(
                IMPI_FAMILY,
                &[private_id.to_string()],
                &columns,
                timestamp,
                ttl,
            )
            .await
    }

    /// Drop an implicit registration set: the subscription rows themselves
    /// and the bindings recorded against the associated private identities
    pub async fn delete_public_ids(
        &self,
        public_ids: &[String],
        private_ids: &[String],
        timestamp: i64,
    ) -> StoreResult<()> {
        self.store
            .delete_rows(IMPU_FAMILY, public_ids, timestamp)
            .await?;

        let names: Vec<String> = public_ids
            .iter()
            .map(|public_id| format!("{}{}", col::PUBLIC_ID_PREFIX, public_id))
            .collect();
        for private_id in private_ids {
            self.store
                .delete_columns(IMPI_FAMILY, private_id, &names, timestamp)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::generate_timestamp;

    fn cache() -> SubscriberCache {
        SubscriberCache::new(Arc::new(MemoryStore::new()))
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn subscription_round_trip() {
        let cache = cache();
        let ts = generate_timestamp();
        cache
            .put_subscription(
                &ids(&["sip:a@x", "tel:+1"]),
                "<IMSSubscription/>",
                RegistrationState::Registered,
                &ids(&["alice@x"]),
                ts,
                Some(3600),
            )
            .await
            .unwrap();

        for public_id in ["sip:a@x", "tel:+1"] {
            let record = cache.get_subscription(public_id).await.unwrap();
            assert_eq!(record.profile, "<IMSSubscription/>");
            assert_eq!(record.state, RegistrationState::Registered);
            assert_eq!(record.associated_private_ids, ids(&["alice@x"]));
            assert!(record.ttl > 0 && record.ttl <= 3600);
        }
    }

    #[tokio::test]
    async fn unregistered_state_round_trips() {
        let cache = cache();
        cache
            .put_subscription(
                &ids(&["sip:a@x"]),
                "<IMSSubscription/>",
                RegistrationState::Unregistered,
                &[],
                1,
                None,
            )
            .await
            .unwrap();
        let record = cache.get_subscription("sip:a@x").await.unwrap();
        assert_eq!(record.state, RegistrationState::Unregistered);
        assert_eq!(record.ttl, 0);
    }

    #[tokio::test]
    async fn unknown_subscription_is_not_found() {
        assert!(matches!(
            cache().get_subscription("sip:nobody@x").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn auth_vector_requires_recorded_binding() {
        let cache = cache();
        cache
            .put_auth_vector(
                "alice@x",
                &DigestAuthVector {
                    ha1: "abc".to_string(),
                    realm: "x".to_string(),
                    qop: String::new(),
                },
                1,
                None,
            )
            .await
            .unwrap();

        // No binding recorded yet: lookup by (impi, impu) misses
        assert!(cache
            .get_auth_vector("alice@x", Some("sip:a@x"))
            .await
            .is_err());
        // Bare lookup succeeds
        let av = cache.get_auth_vector("alice@x", None).await.unwrap();
        assert_eq!(av.ha1, "abc");

        cache
            .put_associated_public_id("alice@x", "sip:a@x", 2, None)
            .await
            .unwrap();
        let av = cache
            .get_auth_vector("alice@x", Some("sip:a@x"))
            .await
            .unwrap();
        assert_eq!(av.realm, "x");
        assert_eq!(av.qop, "");
    }

    #[tokio::test]
    async fn associated_public_ids_list() {
        let cache = cache();
        assert!(cache
            .get_associated_public_ids("alice@x")
            .await
            .unwrap()
            .is_empty());

        cache
            .put_associated_public_id("alice@x", "sip:a@x", 1, None)
            .await
            .unwrap();
        cache
            .put_associated_public_id("alice@x", "tel:+1", 2, None)
            .await
            .unwrap();
        let mut list = cache.get_associated_public_ids("alice@x").await.unwrap();
        list.sort();
        assert_eq!(list, ids(&["sip:a@x", "tel:+1"]));
    }

    #[tokio::test]
    async fn delete_drops_rows_and_bindings() {
        let cache = cache();
        cache
            .put_subscription(
                &ids(&["sip:a@x"]),
                "<IMSSubscription/>",
                RegistrationState::Registered,
                &ids(&["alice@x"]),
                1,
                None,
            )
            .await
            .unwrap();
        cache
            .put_associated_public_id("alice@x", "sip:a@x", 1, None)
            .await
            .unwrap();

        cache
            .delete_public_ids(&ids(&["sip:a@x"]), &ids(&["alice@x"]), 2)
            .await
            .unwrap();

        assert!(cache.get_subscription("sip:a@x").await.is_err());
        assert!(cache
            .get_associated_public_ids("alice@x")
            .await
            .unwrap()
            .is_empty());
    }
}
