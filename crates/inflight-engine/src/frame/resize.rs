use std::sync::Arc;

use parking_lot::Mutex;

use crate::device::Extent;

/// Order in which resize subscribers run.
///
/// Image owners (swapchain, depth, multisample targets) rebuild in
/// `Resources`; anything that references those images, such as frame buffers
/// or screen-sized render targets, rebuilds afterwards in `Passes`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ResizeStage {
    Resources,
    Passes,
}

/// Opaque subscription handle returned by [`ResizeRegistry::subscribe`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ResizeToken(u64);

type Callback = Box<dyn FnMut(Extent) + Send + 'static>;

struct Subscriber {
    token: ResizeToken,
    stage: ResizeStage,
    callback: Callback,
}

#[derive(Default)]
struct Inner {
    next: u64,
    subscribers: Vec<Subscriber>,
    // Subscribers taken out for a notify, and those of them unsubscribed
    // before it finished.
    notifying: Vec<ResizeToken>,
    removed_during_notify: Vec<ResizeToken>,
}

/// Publish/subscribe registry for surface resize notifications.
///
/// Cloning yields another handle to the same registry. Callbacks run
/// synchronously on the thread calling [`notify`](Self::notify) and may
/// subscribe or unsubscribe re-entrantly.
#[derive(Clone, Default)]
pub struct ResizeRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl ResizeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, stage: ResizeStage, callback: F) -> ResizeToken
    where
        F: FnMut(Extent) + Send + 'static,
    {
        let mut inner = self.inner.lock();
        let token = ResizeToken(inner.next);
        inner.next += 1;
        inner.subscribers.push(Subscriber {
            token,
            stage,
            callback: Box::new(callback),
        });
        token
    }

    /// Removes a subscription. Returns false if the token was unknown.
    pub fn unsubscribe(&self, token: ResizeToken) -> bool {
        let mut inner = self.inner.lock();
        if let Some(pos) = inner.subscribers.iter().position(|s| s.token == token) {
            inner.subscribers.remove(pos);
            return true;
        }
        if inner.notifying.contains(&token) && !inner.removed_during_notify.contains(&token) {
            inner.removed_during_notify.push(token);
            return true;
        }
        false
    }

    pub fn len(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invokes every subscriber, `Resources` stage first, each stage in
    /// registration order.
    pub fn notify(&self, extent: Extent) {
        let mut taken = {
            let mut inner = self.inner.lock();
            let taken = std::mem::take(&mut inner.subscribers);
            inner.notifying = taken.iter().map(|s| s.token).collect();
            taken
        };

        log::debug!(
            "resize notification {}x{} to {} subscriber(s)",
            extent.width,
            extent.height,
            taken.len()
        );

        // Stable sort keeps registration order within a stage.
        taken.sort_by_key(|s| s.stage);
        for stage in [ResizeStage::Resources, ResizeStage::Passes] {
            for sub in taken.iter_mut().filter(|s| s.stage == stage) {
                let skip = self.inner.lock().removed_during_notify.contains(&sub.token);
                if !skip {
                    (sub.callback)(extent);
                }
            }
        }

        let mut inner = self.inner.lock();
        let removed = std::mem::take(&mut inner.removed_during_notify);
        taken.retain(|s| !removed.contains(&s.token));
        // Subscriptions added during the notify come after the existing ones.
        let added = std::mem::take(&mut inner.subscribers);
        taken.extend(added);
        taken.sort_by_key(|s| s.token.0);
        inner.subscribers = taken;
        inner.notifying.clear();
    }
}

impl std::fmt::Debug for ResizeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResizeRegistry")
            .field("subscribers", &self.len())
            .finish()
    }
}
