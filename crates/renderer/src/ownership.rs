//! Single-owner-thread discipline for GPU-resident objects.
//!
//! Every object that allocates device resources carries an
//! [`OwnershipGuard`]. It is empty until the first successful
//! `create_on_gl_thread`, holds the creating thread afterwards and is
//! cleared again by `destroy`.

use std::thread::{self, ThreadId};

use crate::error::RenderError;

/// Result of checking a create request against the current owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// The calling thread already owns the resources; nothing to do.
    AlreadyOwned,
    /// Nothing allocated yet.
    Fresh,
    /// Another thread owns the resources (context migration).
    Migrated { previous: ThreadId },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OwnershipGuard {
    owner: Option<ThreadId>,
}

impl OwnershipGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.owner
    }

    pub fn is_created(&self) -> bool {
        self.owner.is_some()
    }

    pub fn is_owned_by_current(&self) -> bool {
        self.owner == Some(thread::current().id())
    }

    /// Classify a create request. Does not change the owner; call
    /// [`claim`](Self::claim) once allocation succeeded.
    pub fn check_create(&self, what: &'static str) -> Acquire {
        match self.owner {
            None => Acquire::Fresh,
            Some(owner) if owner == thread::current().id() => Acquire::AlreadyOwned,
            Some(previous) => {
                log::warn!(
                    "{} is owned by another GL context ({:?}); re-initializing on {:?}",
                    what,
                    previous,
                    thread::current().id()
                );
                Acquire::Migrated { previous }
            }
        }
    }

    pub fn claim(&mut self) {
        self.owner = Some(thread::current().id());
    }

    /// Ok when the calling thread may release the resources.
    pub fn check_release(&self, what: &'static str) -> Result<(), RenderError> {
        match self.owner {
            Some(owner) if owner == thread::current().id() => Ok(()),
            Some(owner) => {
                log::warn!("Calling destroy() on {} from non-owning thread", what);
                Err(RenderError::WrongThread { what, owner })
            }
            None => Err(RenderError::NotCreated(what)),
        }
    }

    pub fn clear(&mut self) {
        self.owner = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_on_one_thread() {
        let mut guard = OwnershipGuard::new();
        assert_eq!(guard.check_create("buffer"), Acquire::Fresh);
        assert!(matches!(
            guard.check_release("buffer"),
            Err(RenderError::NotCreated("buffer"))
        ));

        guard.claim();
        assert_eq!(guard.owner(), Some(thread::current().id()));
        assert!(guard.is_owned_by_current());
        assert_eq!(guard.check_create("buffer"), Acquire::AlreadyOwned);
        assert!(guard.check_release("buffer").is_ok());

        guard.clear();
        assert!(!guard.is_created());
        assert_eq!(guard.owner(), None);
    }

    #[test]
    fn other_thread_sees_migration_and_refused_release() {
        let mut guard = OwnershipGuard::new();
        guard.claim();
        let owner = thread::current().id();

        thread::scope(|s| {
            s.spawn(|| {
                assert_eq!(
                    guard.check_create("material"),
                    Acquire::Migrated { previous: owner }
                );
                match guard.check_release("material") {
                    Err(RenderError::WrongThread { owner: o, .. }) => assert_eq!(o, owner),
                    other => panic!("expected WrongThread, got {other:?}"),
                }
            });
        });
        assert!(guard.is_owned_by_current());
    }
}
