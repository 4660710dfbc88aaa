use std::sync::{Arc, Mutex, RwLock};

use crate::prop::Prop;

/// A synthetic prop combining several member props into one tuple observer.
/// On any member update the matching slot is replaced under the group mutex,
/// the tuple is copied, and the copy is published after the lock is
/// released, so observers never see a tuple torn mid-update.
pub struct Group<T> {
    pub(crate) inner: Arc<GroupInner<T>>,
}

pub(crate) struct GroupInner<T> {
    pub(crate) current: Mutex<T>,
    pub(crate) subscribers: RwLock<Vec<Arc<dyn Fn(&T) + Send + Sync>>>,
}

impl<T> Clone for Group<T> {
    fn clone(&self) -> Self {
        Group {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Group<T> {
    /// Combine 2 to 5 member props into one tuple prop. Slots start from the
    /// members' current cached values.
    pub fn of<M: GroupMembers<Tuple = T>>(members: M) -> Group<T> {
        let group = Group {
            inner: Arc::new(GroupInner {
                current: Mutex::new(members.snapshot()),
                subscribers: RwLock::new(Vec::new()),
            }),
        };
        members.attach(&group);
        group
    }

    /// The current tuple.
    pub fn get(&self) -> T {
        self.inner.current.lock().unwrap().clone()
    }

    /// Register a tuple observer; the current tuple is delivered
    /// synchronously on registration.
    pub fn subscribe(&self, on_tuple: impl Fn(&T) + Send + Sync + 'static) {
        let handler: Arc<dyn Fn(&T) + Send + Sync> = Arc::new(on_tuple);
        self.inner.subscribers.write().unwrap().push(handler.clone());
        let current = self.get();
        handler(&current);
    }

    pub(crate) fn publish(&self, tuple: &T) {
        let subscribers = self.inner.subscribers.read().unwrap().clone();
        for subscriber in &subscribers {
            subscriber(tuple);
        }
    }
}

/// Tuples of member props accepted by [`Group::of`]. Implemented for prop
/// tuples of arity 2 to 5.
pub trait GroupMembers {
    type Tuple: Clone + Send + Sync + 'static;

    fn snapshot(&self) -> Self::Tuple;
    fn attach(&self, group: &Group<Self::Tuple>);
}

macro_rules! group_members {
    ($(($idx:tt, $t:ident)),+) => {
        impl<$($t: Clone + Send + Sync + 'static),+> GroupMembers for ($(Prop<$t>,)+) {
            type Tuple = ($(Option<$t>,)+);

            fn snapshot(&self) -> Self::Tuple {
                ($(self.$idx.cached(),)+)
            }

            fn attach(&self, group: &Group<Self::Tuple>) {
                $(
                    {
                        let g = group.clone();
                        self.$idx.subscribe(
                            move |v| {
                                let tuple = {
                                    let mut current = g.inner.current.lock().unwrap();
                                    current.$idx = v.cloned();
                                    current.clone()
                                };
                                g.publish(&tuple);
                            },
                            |_err| {},
                        );
                    }
                )+
            }
        }
    };
}

group_members!((0, A), (1, B));
group_members!((0, A), (1, B), (2, C));
group_members!((0, A), (1, B), (2, C), (3, D));
group_members!((0, A), (1, B), (2, C), (3, D), (4, E));

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prop::PropDef;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_group_of_two_tracks_members() {
        let a = Prop::new(PropDef::int("a"));
        let b = Prop::new(PropDef::string("b"));
        a.inner.apply_raw(Some("1".to_string()));
        b.inner.apply_raw(Some("x".to_string()));

        let group = Group::of((a.clone(), b.clone()));
        assert_eq!(group.get(), (Some(1), Some("x".to_string())));

        a.inner.apply_raw(Some("2".to_string()));
        assert_eq!(group.get(), (Some(2), Some("x".to_string())));
    }

    #[test]
    fn test_group_of_three_positional_update() {
        let a = Prop::new(PropDef::int("a"));
        let b = Prop::new(PropDef::int("b"));
        let c = Prop::new(PropDef::int("c"));
        for (p, v) in [(&a, "1"), (&b, "2"), (&c, "3")] {
            p.inner.apply_raw(Some(v.to_string()));
        }

        let group = Group::of((a.clone(), b.clone(), c.clone()));
        assert_eq!(group.get(), (Some(1), Some(2), Some(3)));

        b.inner.apply_raw(Some("20".to_string()));
        assert_eq!(group.get(), (Some(1), Some(20), Some(3)));
    }

    #[test]
    fn test_group_publishes_to_subscribers() {
        let a = Prop::new(PropDef::int("a"));
        let b = Prop::new(PropDef::int("b"));
        a.inner.apply_raw(Some("1".to_string()));
        b.inner.apply_raw(Some("2".to_string()));

        let group = Group::of((a.clone(), b.clone()));
        let updates = Arc::new(AtomicUsize::new(0));
        let u = updates.clone();
        group.subscribe(move |_| {
            u.fetch_add(1, Ordering::SeqCst);
        });
        // one synchronous delivery on subscribe
        assert_eq!(updates.load(Ordering::SeqCst), 1);

        a.inner.apply_raw(Some("5".to_string()));
        assert_eq!(updates.load(Ordering::SeqCst), 2);
        assert_eq!(group.get(), (Some(5), Some(2)));
    }

    #[test]
    fn test_group_of_five() {
        let props: Vec<Prop<i32>> = (0..5)
            .map(|i| {
                let p = Prop::new(PropDef::int(format!("p{}", i)));
                p.inner.apply_raw(Some(i.to_string()));
                p
            })
            .collect();
        let group = Group::of((
            props[0].clone(),
            props[1].clone(),
            props[2].clone(),
            props[3].clone(),
            props[4].clone(),
        ));
        assert_eq!(
            group.get(),
            (Some(0), Some(1), Some(2), Some(3), Some(4))
        );
    }
}
