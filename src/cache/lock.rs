use std::sync::LockResult;

use tracing::warn;

/// Take the guard out of a lock result, continuing past poisoning.
///
/// A panic while the lock was held can leave a half-applied mutation behind;
/// every value the store keeps is a disposable cache entry, so the worst case
/// is a stale or missing read.
pub(crate) fn recover<G>(result: LockResult<G>, op: &'static str) -> G {
    result.unwrap_or_else(|poisoned| {
        warn!(
            op,
            store = "memory",
            result = "poisoned_recovered",
            "Continuing with poisoned cache lock"
        );
        poisoned.into_inner()
    })
}
