// Combined caches - one cache re-emitting a whole group of member caches
//
// Member channels hold the aggregate WEAKLY; the aggregate holds handles to
// its members inside its value. There is no reference cycle, and dropping the
// aggregate stops the re-emission without touching the members.

use tracing::debug;

use crate::cache::Cache;

impl<T: Clone + Send + Sync + 'static> Cache<T> {
    /// Create a cache whose value is the list of `caches` and whose channel
    /// re-emits that full list whenever any member's channel fires.
    ///
    /// Use it when one observer must react to a change in any of several
    /// values without caring which one changed, such as validating a form:
    ///
    /// ```ignore
    /// let first = Cache::new(String::new());
    /// let last = Cache::new(String::new());
    /// let fields = Cache::combined([first.clone(), last.clone()]);
    ///
    /// fields.channel().subscribe(|members: &Vec<Cache<String>>| {
    ///     let complete = members.iter().all(|m| m.with_snapshot(|t| !t.is_empty()));
    ///     submit_button.set_enabled(complete);
    /// });
    /// ```
    ///
    /// Member snapshots are already up to date when the aggregate's observers
    /// run. Keep the returned cache alive, not only its channel: member
    /// channels reference the aggregate weakly.
    pub fn combined(caches: impl IntoIterator<Item = Cache<T>>) -> Cache<Vec<Cache<T>>> {
        let members: Vec<Cache<T>> = caches.into_iter().collect();
        let combined = Cache::new(members.clone());

        for member in &members {
            member
                .channel()
                .subscribe_with(&combined.inner, |aggregate, _| aggregate.broadcast());
        }
        debug!(members = members.len(), "combined cache created");
        combined
    }
}

impl<T: Clone + Send + Sync + 'static> Cache<Vec<Cache<T>>> {
    /// Current snapshot of every member, in member order.
    pub fn member_snapshots(&self) -> Vec<T> {
        self.with_snapshot(|members| members.iter().map(Cache::snapshot).collect())
    }

    /// Whether every member's current snapshot satisfies `predicate`.
    ///
    /// True for an empty group.
    pub fn all_satisfy(&self, predicate: impl Fn(&T) -> bool) -> bool {
        self.with_snapshot(|members| {
            members
                .iter()
                .all(|member| member.with_snapshot(|value| predicate(value)))
        })
    }
}
