use super::{Hook, HookKind, Subscriber};
use parking_lot::{Mutex, RwLock};
use std::{
    collections::HashMap,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

/// Registry of the hooks an owner (widget, screen or panel) cares about.
///
/// There is at most one [`Hook`] per [`HookKind`]. Subscriptions made on a
/// pool are forwarded to its parents, so attaching a widget to a screen and a
/// screen to a panel lets the panel listen on behalf of everyone.
#[derive(Default)]
pub struct HooksPool {
    hooks: Mutex<HashMap<HookKind, Arc<Hook>>>,
    listening: AtomicBool,
    parents: RwLock<Vec<Weak<HooksPool>>>,
}

impl HooksPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    /// Forwards every future subscription of this pool to `parent`.
    pub fn add_parent(&self, parent: &Arc<HooksPool>) {
        let mut parents = self.parents.write();
        if !parents
            .iter()
            .any(|known| std::ptr::eq(known.as_ptr(), Arc::as_ptr(parent)))
        {
            parents.push(Arc::downgrade(parent));
        }
    }

    pub fn subscribe(&self, subscriber: &Weak<dyn Subscriber>, kinds: &[HookKind]) {
        {
            let mut hooks = self.hooks.lock();
            for kind in kinds {
                let hook = hooks.entry(kind.clone()).or_insert_with(|| {
                    let hook = Hook::new(kind.clone());
                    if self.is_listening() {
                        hook.start();
                    }
                    hook
                });
                hook.add_subscriber(subscriber.clone());
            }
        }

        let parents: Vec<_> = self.parents.read().iter().filter_map(Weak::upgrade).collect();
        for parent in parents {
            parent.subscribe(subscriber, kinds);
        }
    }

    /// Subscribes every (kind, subscriber) pair found in `pools`.
    pub fn merge(&self, pools: &[&Arc<HooksPool>]) {
        for pool in pools {
            for (kind, subscribers) in pool.subscriptions() {
                for subscriber in &subscribers {
                    self.subscribe(subscriber, std::slice::from_ref(&kind));
                }
            }
        }
    }

    pub fn subscriptions(&self) -> Vec<(HookKind, Vec<Weak<dyn Subscriber>>)> {
        self.hooks
            .lock()
            .iter()
            .map(|(kind, hook)| (kind.clone(), hook.subscribers()))
            .collect()
    }

    pub fn hook(&self, kind: &HookKind) -> Option<Arc<Hook>> {
        self.hooks.lock().get(kind).cloned()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.hooks.lock().len()
    }

    /// Starts every hook, and every hook created from now on.
    pub fn listen(&self) {
        self.listening.store(true, Ordering::SeqCst);
        for hook in self.hooks.lock().values() {
            hook.start();
        }
    }

    pub fn stop(&self) {
        self.listening.store(false, Ordering::SeqCst);
        for hook in self.hooks.lock().values() {
            hook.stop();
        }
    }

    pub async fn join(&self) {
        let hooks: Vec<_> = self.hooks.lock().values().cloned().collect();
        for hook in hooks {
            hook.join().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::tests::Counter;

    fn bspwm() -> HookKind {
        HookKind::Bspwm {
            bspc: "bspc".into(),
        }
    }

    #[test]
    fn one_hook_per_kind() {
        let pool = HooksPool::new();
        let a: Arc<dyn Subscriber> = Arc::new(Counter::default());
        let b: Arc<dyn Subscriber> = Arc::new(Counter::default());

        pool.subscribe(&Arc::downgrade(&a), &[bspwm(), HookKind::XorgWindow]);
        pool.subscribe(&Arc::downgrade(&b), &[bspwm()]);

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.hook(&bspwm()).unwrap().subscribers().len(), 2);
        assert_eq!(
            pool.hook(&HookKind::XorgWindow).unwrap().subscribers().len(),
            1
        );
    }

    #[test]
    fn merging_twice_is_idempotent() {
        let widget_pool = HooksPool::new();
        let screen_pool = HooksPool::new();
        let subscriber: Arc<dyn Subscriber> = Arc::new(Counter::default());
        widget_pool.subscribe(&Arc::downgrade(&subscriber), &[bspwm()]);

        screen_pool.merge(&[&widget_pool]);
        screen_pool.merge(&[&widget_pool]);

        assert_eq!(screen_pool.len(), 1);
        assert_eq!(screen_pool.hook(&bspwm()).unwrap().subscribers().len(), 1);
    }

    #[test]
    fn subscriptions_propagate_to_parents() {
        let panel_pool = HooksPool::new();
        let screen_pool = HooksPool::new();
        screen_pool.add_parent(&panel_pool);
        screen_pool.add_parent(&panel_pool);

        let subscriber: Arc<dyn Subscriber> = Arc::new(Counter::default());
        screen_pool.subscribe(&Arc::downgrade(&subscriber), &[HookKind::XorgWindow]);

        assert_eq!(
            panel_pool
                .hook(&HookKind::XorgWindow)
                .unwrap()
                .subscribers()
                .len(),
            1
        );
    }

    #[test]
    fn different_bspc_binaries_are_different_hooks() {
        let pool = HooksPool::new();
        let subscriber: Arc<dyn Subscriber> = Arc::new(Counter::default());
        pool.subscribe(
            &Arc::downgrade(&subscriber),
            &[
                bspwm(),
                HookKind::Bspwm {
                    bspc: "/opt/bspc".into(),
                },
            ],
        );
        assert_eq!(pool.len(), 2);
    }

    #[tokio::test]
    async fn listening_pool_starts_new_hooks() {
        let pool = HooksPool::new();
        pool.listen();

        let subscriber: Arc<dyn Subscriber> = Arc::new(Counter::default());
        pool.subscribe(&Arc::downgrade(&subscriber), &[HookKind::XorgWindow]);
        assert!(pool.hook(&HookKind::XorgWindow).unwrap().is_running());

        pool.stop();
        pool.join().await;
        assert!(!pool.hook(&HookKind::XorgWindow).unwrap().is_running());
    }
}
