use dashmap::DashMap;

use crate::claim::ClaimId;
use crate::ArbiterError;

/// Storage for claims that have already been paid out.
///
/// A claim recorded here contributes nothing to the amount owed by any later
/// batch. Claims are recorded before the transfer that pays them and released
/// only when that transfer definitely failed. Implementations must be
/// thread-safe (`Send + Sync`).
pub trait SettledClaimStore: Send + Sync {
    /// Whether the claim is recorded. A failed read is an error, never a guess.
    fn is_settled(&self, claim: &ClaimId) -> Result<bool, ArbiterError>;

    /// Record claims as settled at `settled_at` (unix seconds). All or nothing.
    fn record_all(&self, claims: &[ClaimId], settled_at: u64) -> Result<(), ArbiterError>;

    /// Remove claims recorded for a transfer that did not happen.
    fn release_all(&self, claims: &[ClaimId]) -> Result<(), ArbiterError>;

    /// Number of recorded claims.
    fn count(&self) -> usize;
}

/// In-memory store backed by DashMap. Fast but lost on restart.
pub struct InMemorySettledStore {
    claims: DashMap<ClaimId, u64>,
}

impl InMemorySettledStore {
    pub fn new() -> Self {
        Self {
            claims: DashMap::new(),
        }
    }
}

impl Default for InMemorySettledStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettledClaimStore for InMemorySettledStore {
    fn is_settled(&self, claim: &ClaimId) -> Result<bool, ArbiterError> {
        Ok(self.claims.contains_key(claim))
    }

    fn record_all(&self, claims: &[ClaimId], settled_at: u64) -> Result<(), ArbiterError> {
        for claim in claims {
            self.claims.entry(*claim).or_insert(settled_at);
        }
        Ok(())
    }

    fn release_all(&self, claims: &[ClaimId]) -> Result<(), ArbiterError> {
        for claim in claims {
            self.claims.remove(claim);
        }
        Ok(())
    }

    fn count(&self) -> usize {
        self.claims.len()
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSettledStore;

#[cfg(feature = "sqlite")]
mod sqlite {
    use std::sync::{Mutex, MutexGuard};

    use super::SettledClaimStore;
    use crate::claim::ClaimId;
    use crate::ArbiterError;

    /// Persistent store backed by SQLite. Survives restarts.
    pub struct SqliteSettledStore {
        conn: Mutex<rusqlite::Connection>,
    }

    impl SqliteSettledStore {
        /// Open (or create) the settled-claim database at `path`.
        ///
        /// On Unix the file is restricted to 0600: settlement history reveals
        /// which requestors defaulted and when.
        pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
            let conn = rusqlite::Connection::open(path)?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS settled_claims (
                    claim_id BLOB PRIMARY KEY,
                    settled_at INTEGER NOT NULL
                );
                PRAGMA journal_mode=WAL;",
            )?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) =
                    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
                {
                    tracing::warn!(
                        path = %path,
                        error = %e,
                        "failed to set settled-claim database permissions to 0600"
                    );
                }
            }

            Ok(Self {
                conn: Mutex::new(conn),
            })
        }

        pub(super) fn conn(&self) -> MutexGuard<'_, rusqlite::Connection> {
            match self.conn.lock() {
                Ok(c) => c,
                Err(poisoned) => {
                    tracing::error!("settled-claim store mutex poisoned, recovering");
                    poisoned.into_inner()
                }
            }
        }
    }

    impl SettledClaimStore for SqliteSettledStore {
        fn is_settled(&self, claim: &ClaimId) -> Result<bool, ArbiterError> {
            let conn = self.conn();
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM settled_claims WHERE claim_id = ?1",
                    [claim.as_slice()],
                    |row| row.get(0),
                )
                .map_err(|e| {
                    tracing::error!(error = %e, "settled-claim lookup failed");
                    ArbiterError::StoreError(format!("lookup failed: {e}"))
                })?;
            Ok(count > 0)
        }

        fn record_all(&self, claims: &[ClaimId], settled_at: u64) -> Result<(), ArbiterError> {
            let mut conn = self.conn();
            let settled_at = i64::try_from(settled_at).unwrap_or(i64::MAX);
            let tx = conn
                .transaction()
                .map_err(|e| ArbiterError::StoreError(format!("begin failed: {e}")))?;
            for claim in claims {
                tx.execute(
                    "INSERT OR IGNORE INTO settled_claims (claim_id, settled_at) VALUES (?1, ?2)",
                    rusqlite::params![claim.as_slice(), settled_at],
                )
                .map_err(|e| ArbiterError::StoreError(format!("insert failed: {e}")))?;
            }
            tx.commit()
                .map_err(|e| ArbiterError::StoreError(format!("commit failed: {e}")))
        }

        fn release_all(&self, claims: &[ClaimId]) -> Result<(), ArbiterError> {
            let mut conn = self.conn();
            let tx = conn
                .transaction()
                .map_err(|e| ArbiterError::StoreError(format!("begin failed: {e}")))?;
            for claim in claims {
                tx.execute(
                    "DELETE FROM settled_claims WHERE claim_id = ?1",
                    [claim.as_slice()],
                )
                .map_err(|e| ArbiterError::StoreError(format!("delete failed: {e}")))?;
            }
            tx.commit()
                .map_err(|e| ArbiterError::StoreError(format!("commit failed: {e}")))
        }

        fn count(&self) -> usize {
            let conn = self.conn();
            conn.query_row("SELECT COUNT(*) FROM settled_claims", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| usize::try_from(n).unwrap_or(0))
            .unwrap_or(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::FixedBytes;

    #[test]
    fn test_in_memory_store_basic() {
        let store = InMemorySettledStore::new();
        let claim = FixedBytes::new([0x42; 32]);

        assert!(!store.is_settled(&claim).unwrap());
        store.record_all(&[claim], 1_000).unwrap();
        assert!(store.is_settled(&claim).unwrap());
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn test_in_memory_release() {
        let store = InMemorySettledStore::new();
        let a = FixedBytes::new([0x01; 32]);
        let b = FixedBytes::new([0x02; 32]);

        store.record_all(&[a, b], 1_000).unwrap();
        store.release_all(&[a]).unwrap();
        assert!(!store.is_settled(&a).unwrap());
        assert!(store.is_settled(&b).unwrap());
    }

    #[test]
    fn test_in_memory_record_is_idempotent() {
        let store = InMemorySettledStore::new();
        let a = FixedBytes::new([0x01; 32]);
        let b = FixedBytes::new([0x02; 32]);

        store.record_all(&[a, b], 1_000).unwrap();
        store.record_all(&[a], 2_000).unwrap();
        assert_eq!(store.count(), 2);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_store_basic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settled.db");
        let store = SqliteSettledStore::open(path.to_str().unwrap()).unwrap();
        let a = FixedBytes::new([0x42; 32]);
        let b = FixedBytes::new([0x43; 32]);

        assert!(!store.is_settled(&a).unwrap());
        store.record_all(&[a], 1_000).unwrap();
        assert!(store.is_settled(&a).unwrap());
        assert!(!store.is_settled(&b).unwrap());

        store.release_all(&[a, b]).unwrap();
        assert!(!store.is_settled(&a).unwrap());
        assert_eq!(store.count(), 0);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_lookup_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settled.db");
        let store = SqliteSettledStore::open(path.to_str().unwrap()).unwrap();
        store
            .conn()
            .execute_batch("DROP TABLE settled_claims;")
            .unwrap();

        let err = store.is_settled(&FixedBytes::new([0x42; 32])).unwrap_err();
        assert!(matches!(err, ArbiterError::StoreError(_)));
        assert!(err.is_retryable());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settled.db");
        let claim = FixedBytes::new([0xaa; 32]);

        {
            let store = SqliteSettledStore::open(path.to_str().unwrap()).unwrap();
            store.record_all(&[claim], 1_000).unwrap();
        }

        let store = SqliteSettledStore::open(path.to_str().unwrap()).unwrap();
        assert!(store.is_settled(&claim).unwrap());
        assert_eq!(store.count(), 1);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn test_sqlite_record_duplicates_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settled.db");
        let store = SqliteSettledStore::open(path.to_str().unwrap()).unwrap();
        let claim = FixedBytes::new([0x07; 32]);

        store.record_all(&[claim, claim], 1_000).unwrap();
        store.record_all(&[claim], 2_000).unwrap();
        assert_eq!(store.count(), 1);
    }
}
