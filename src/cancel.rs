// src/cancel.rs

//! Shared cancellation signal.
//!
//! A [`CancelToken`] is cheap to clone; all clones observe the same flag.
//! [`CancelToken::child`] derives a token that is cancelled together with its
//! parent but can also be cancelled on its own without affecting the parent.
//! The DAG walker uses a child token so that an action failure stops the
//! walk without flagging the caller's token.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::watch;

#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

struct Inner {
    tx: watch::Sender<bool>,
    children: Mutex<Vec<Weak<Inner>>>,
}

impl Inner {
    fn cancel(&self) {
        self.tx.send_replace(true);
        let children = std::mem::take(
            &mut *self
                .children
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                tx,
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Derive a token that is cancelled when either it or `self` is.
    pub fn child(&self) -> Self {
        let child = Self::new();
        let mut children = self
            .inner
            .children
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Checked under the lock so a concurrent `cancel` cannot slip between
        // the check and the registration.
        if self.is_cancelled() {
            child.inner.tx.send_replace(true);
        } else {
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        child
    }

    /// Signal cancellation to every clone (and every child) of this token.
    pub fn cancel(&self) {
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.tx.borrow()
    }

    /// Resolve once this token (or any ancestor) has been cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.tx.subscribe();
        loop {
            let cancelled = *rx.borrow_and_update();
            if cancelled {
                return;
            }
            // The sender lives as long as `self`, so this only fails while the
            // token is being torn down; nothing will ever cancel it then.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// `Err(MakeError::Cancelled)` if cancellation has been requested.
    pub fn check(&self) -> crate::errors::Result<()> {
        if self.is_cancelled() {
            Err(crate::errors::MakeError::Cancelled)
        } else {
            Ok(())
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
