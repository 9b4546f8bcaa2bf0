use tracing::{debug, warn};

use crate::AdminSession;

/// Owns an open session and guarantees it is released.
///
/// Prefer `close`, which reports failures. If the guard is dropped instead (early
/// return, cancellation), the session is closed on a spawned task.
pub struct SessionGuard<S>
where
    S: AdminSession,
{
    session: Option<S>,
}

impl<S> SessionGuard<S>
where
    S: AdminSession,
{
    /// Take ownership of a session.
    pub const fn new(session: S) -> Self {
        Self {
            session: Some(session),
        }
    }

    /// The guarded session.
    pub fn session(&self) -> &S {
        let Some(session) = self.session.as_ref() else {
            unreachable!("session is only taken by close or drop");
        };
        session
    }

    /// Close the session now.
    ///
    /// # Errors
    ///
    /// Returns the transport's close error.
    pub async fn close(mut self) -> Result<(), S::Error> {
        match self.session.take() {
            Some(session) => session.close().await,
            None => Ok(()),
        }
    }
}

impl<S> Drop for SessionGuard<S>
where
    S: AdminSession,
{
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };

        let node_id = session.node_id().clone();

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        warn!(node = %node_id, "failed to close dropped admin session: {e}");
                    } else {
                        debug!(node = %node_id, "closed dropped admin session");
                    }
                });
            }
            Err(_) => warn!(node = %node_id, "admin session dropped outside a runtime, not closed"),
        }
    }
}
