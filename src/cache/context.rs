//! Task-scoped write context.
//!
//! Writes stamp the emitted event with the account performing the change.
//! The account is carried through a task-local so the store API does not
//! need an extra parameter on every write. Note that task-locals do not
//! follow `tokio::spawn`; scope the spawned future again if needed.
//!
//! The same mechanism marks code running inside a caller-owned write
//! transaction, where opening a second write transaction would wait on
//! the first one forever.

use std::future::Future;

tokio::task_local! {
    static ACCOUNT_ID: i64;
    static WRITE_SCOPE: ();
}

/// Run `future` with `account_id` recorded as the acting account.
pub async fn with_account_id<F>(account_id: i64, future: F) -> F::Output
where
    F: Future,
{
    ACCOUNT_ID.scope(account_id, future).await
}

/// Account recorded by the innermost [`with_account_id`] scope, if any.
pub fn current_account_id() -> Option<i64> {
    ACCOUNT_ID.try_with(|id| *id).ok()
}

/// Run `future` as the body of an open write transaction.
pub async fn within_write_tx<F>(future: F) -> F::Output
where
    F: Future,
{
    WRITE_SCOPE.scope((), future).await
}

/// Whether the current task runs inside [`within_write_tx`].
pub fn in_write_tx() -> bool {
    WRITE_SCOPE.try_with(|_| ()).is_ok()
}
