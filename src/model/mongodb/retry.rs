use std::{future::Future, time::Duration};

use rocket::tokio::time::sleep;

use super::is_transient_transaction_error;
use crate::error::{Error, Result};

/// How many times a transaction is attempted when it conflicts.
const ATTEMPTS: u32 = 2;
const RETRY_DELAY: Duration = Duration::from_millis(50);

/// Run `transaction` again if it lost a write conflict with a concurrent one.
///
/// Each call of `transaction` must start and commit its own transaction.
/// A conflict on the last attempt is reported as [`Error::StorageConflict`];
/// any other outcome is returned as is.
pub async fn retry_on_conflict<T, F, Fut>(what: &str, mut transaction: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match transaction().await {
            Err(Error::Db(err)) if is_transient_transaction_error(&err) => {
                if attempt >= ATTEMPTS {
                    warn!("Giving up on {} after {} conflicts", what, attempt);
                    return Err(Error::StorageConflict);
                }
                debug!("{} conflicted, retrying: {}", what, err);
                attempt += 1;
                sleep(RETRY_DELAY).await;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[rocket::async_test]
    async fn other_outcomes_are_not_retried() {
        let counter = Cell::new(0);
        let calls = &counter;
        let result = retry_on_conflict("lookup", || async move {
            calls.set(calls.get() + 1);
            Err::<(), _>(Error::not_found("Poll"))
        })
        .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(calls.get(), 1);

        let result = retry_on_conflict("count", || async move {
            calls.set(calls.get() + 1);
            Ok(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.get(), 2);
    }
}
