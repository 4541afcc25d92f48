//! Process-wide connector slot.
//!
//! Prefer passing a [`Connector`] clone to whatever needs it. This slot exists
//! for code that cannot be handed one; it is meant to be filled once during
//! startup and read afterwards. Filling an occupied slot is a usage fault, so
//! a second startup path cannot silently replace the first connector.

use crate::connector::Connector;
use crate::error::{RepoPoolError, Result};
use crate::pool::PoolOpener;
use std::any::Any;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

type SharedSlot = Option<Arc<dyn Any + Send + Sync>>;

static SHARED: RwLock<SharedSlot> = RwLock::new(None);

/// Stores `connector` in the shared slot, or clears it with `None`.
///
/// # Errors
/// Usage fault if a connector is already stored and `connector` is `Some`
pub fn set_shared<O: PoolOpener>(connector: Option<Connector<O>>) -> Result<()> {
    let mut slot = SHARED.write().unwrap_or_else(PoisonError::into_inner);

    match connector {
        None => {
            debug!("Shared connector cleared");
            *slot = None;
        }
        Some(_) if slot.is_some() => {
            return Err(RepoPoolError::usage(
                "shared connector is already set; clear it before assigning another",
            ));
        }
        Some(connector) => {
            debug!("Shared connector set");
            *slot = Some(Arc::new(connector));
        }
    }
    Ok(())
}

/// Returns the shared connector, if one is stored.
///
/// # Errors
/// Usage fault if the stored connector was built with a different opener type
pub fn shared<O: PoolOpener>() -> Result<Option<Connector<O>>> {
    let slot = SHARED.read().unwrap_or_else(PoisonError::into_inner);

    match slot.as_ref() {
        None => Ok(None),
        Some(any) => any
            .downcast_ref::<Connector<O>>()
            .cloned()
            .map(Some)
            .ok_or_else(|| {
                RepoPoolError::usage(format!(
                    "shared connector does not use opener type {}",
                    std::any::type_name::<O>()
                ))
            }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::error::BoxError;
    use crate::pool::ConnectionPool;
    use async_trait::async_trait;

    struct NullPool;

    #[async_trait]
    impl ConnectionPool for NullPool {
        type Client = ();

        async fn acquire(&self) -> std::result::Result<(), BoxError> {
            Ok(())
        }
    }

    struct NullOpener;

    impl PoolOpener for NullOpener {
        type Pool = NullPool;

        fn open(&self, _name: &str, _config: &DatabaseConfig) -> Result<NullPool> {
            Ok(NullPool)
        }
    }

    struct OtherOpener;

    impl PoolOpener for OtherOpener {
        type Pool = NullPool;

        fn open(&self, _name: &str, _config: &DatabaseConfig) -> Result<NullPool> {
            Ok(NullPool)
        }
    }

    // Single test so the global slot is never touched concurrently.
    #[test]
    fn test_shared_slot_lifecycle() {
        assert!(shared::<NullOpener>().unwrap().is_none());

        let connector = Connector::new(NullOpener);
        set_shared(Some(connector.clone())).unwrap();
        assert!(shared::<NullOpener>().unwrap().is_some());

        let error = set_shared(Some(Connector::new(NullOpener))).unwrap_err();
        assert!(error.is_usage_fault());

        let error = shared::<OtherOpener>().unwrap_err();
        assert!(error.is_usage_fault());

        set_shared::<NullOpener>(None).unwrap();
        assert!(shared::<NullOpener>().unwrap().is_none());

        set_shared(Some(connector)).unwrap();
        set_shared::<NullOpener>(None).unwrap();
    }
}
