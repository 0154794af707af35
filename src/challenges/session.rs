//! Challenge widget mount point and the session that owns it.
//!
//! There is exactly one mount per runner. A [`ChallengeSession`] takes an
//! exclusive [`MountLease`] on it for the duration of one suspension; the
//! mount is emptied when the lease is taken and again when it is released, so
//! no widget content survives into the next session or into a resumed run.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::external_deps::captcha::ChallengeError;

/// Default key of the challenge container.
pub const DEFAULT_MOUNT_KEY: &str = "captcha-container";

#[derive(Debug, Default)]
struct MountSlot {
    leased: bool,
    content: Option<String>,
    clears: u64,
    renders: u64,
}

impl MountSlot {
    fn clear(&mut self) {
        self.content = None;
        self.clears += 1;
    }
}

#[derive(Debug)]
struct MountInner {
    key: String,
    slot: Mutex<MountSlot>,
}

/// Shared container a challenge provider renders its widget into.
#[derive(Debug, Clone)]
pub struct MountPoint {
    inner: Arc<MountInner>,
}

impl MountPoint {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(MountInner {
                key: key.into(),
                slot: Mutex::new(MountSlot::default()),
            }),
        }
    }

    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Take exclusive ownership of the mount, emptying it first.
    pub fn lease(&self) -> Result<MountLease, ChallengeError> {
        let mut slot = self.inner.slot.lock().expect("mount lock poisoned");
        if slot.leased {
            return Err(ChallengeError::MountBusy(self.inner.key.clone()));
        }
        slot.leased = true;
        slot.clear();
        Ok(MountLease {
            mount: self.clone(),
        })
    }

    /// Empty the mount unless a session currently owns it.
    pub fn clear(&self) -> bool {
        let mut slot = self.inner.slot.lock().expect("mount lock poisoned");
        if slot.leased {
            return false;
        }
        slot.clear();
        true
    }

    pub fn is_leased(&self) -> bool {
        self.inner.slot.lock().expect("mount lock poisoned").leased
    }

    pub fn is_empty(&self) -> bool {
        self.inner
            .slot
            .lock()
            .expect("mount lock poisoned")
            .content
            .is_none()
    }

    pub fn content(&self) -> Option<String> {
        self.inner
            .slot
            .lock()
            .expect("mount lock poisoned")
            .content
            .clone()
    }

    /// Number of widgets rendered into this mount so far.
    pub fn render_count(&self) -> u64 {
        self.inner.slot.lock().expect("mount lock poisoned").renders
    }

    pub fn clear_count(&self) -> u64 {
        self.inner.slot.lock().expect("mount lock poisoned").clears
    }
}

impl Default for MountPoint {
    fn default() -> Self {
        Self::new(DEFAULT_MOUNT_KEY)
    }
}

/// Exclusive right to render into a [`MountPoint`]. Dropping it clears the mount.
#[derive(Debug)]
pub struct MountLease {
    mount: MountPoint,
}

impl MountLease {
    pub fn key(&self) -> &str {
        self.mount.key()
    }

    /// Record the widget rendered into the mount.
    pub fn attach(&self, content: impl Into<String>) {
        let mut slot = self.mount.inner.slot.lock().expect("mount lock poisoned");
        slot.content = Some(content.into());
        slot.renders += 1;
    }
}

impl Drop for MountLease {
    fn drop(&mut self) {
        let mut slot = self.mount.inner.slot.lock().expect("mount lock poisoned");
        slot.clear();
        slot.leased = false;
    }
}

/// One suspension of the run waiting on a human verification.
#[derive(Debug)]
pub struct ChallengeSession {
    id: u64,
    lease: MountLease,
    opened_at: Instant,
}

impl ChallengeSession {
    pub fn open(id: u64, mount: &MountPoint) -> Result<Self, ChallengeError> {
        let lease = mount.lease()?;
        Ok(Self {
            id,
            lease,
            opened_at: Instant::now(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn lease(&self) -> &MountLease {
        &self.lease
    }

    /// Tear the session down, clearing the mount. Returns how long it lived.
    pub fn close(self) -> Duration {
        self.opened_at.elapsed()
    }
}
