use jtail_journal::{EventKind, JournalEvent};

/// Transform/filter applied to every event, historical and live, before it
/// reaches the consumer. Returning `None` drops the event.
///
/// Called once per event, in event order. Implementations should be pure.
pub trait EventMapper: Send + Sync {
    fn map(&self, event: JournalEvent) -> Option<JournalEvent>;
}

impl<F> EventMapper for F
where
    F: Fn(JournalEvent) -> Option<JournalEvent> + Send + Sync,
{
    fn map(&self, event: JournalEvent) -> Option<JournalEvent> {
        self(event)
    }
}

/// Passes every event through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityMapper;

impl EventMapper for IdentityMapper {
    fn map(&self, event: JournalEvent) -> Option<JournalEvent> {
        Some(event)
    }
}

/// Keeps only events of the listed kinds.
#[derive(Clone, Debug)]
pub struct KindFilter {
    kinds: Vec<EventKind>,
}

impl KindFilter {
    pub fn new(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }
}

impl EventMapper for KindFilter {
    fn map(&self, event: JournalEvent) -> Option<JournalEvent> {
        self.kinds.contains(&event.kind()).then_some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jtail_types::ContentRef;

    fn r(seed: &[u8]) -> ContentRef {
        ContentRef::digest(seed)
    }

    #[test]
    fn identity_keeps_everything() {
        let e = JournalEvent::insert(r(b"a"));
        assert_eq!(IdentityMapper.map(e.clone()), Some(e));
    }

    #[test]
    fn closures_are_mappers() {
        let drop_updates = |e: JournalEvent| (e.kind() != EventKind::Update).then_some(e);
        assert!(drop_updates
            .map(JournalEvent::update(r(b"c"), r(b"n"), None))
            .is_none());
        assert!(drop_updates.map(JournalEvent::insert(r(b"c"))).is_some());
    }

    #[test]
    fn kind_filter_keeps_listed_kinds() {
        let filter = KindFilter::new([EventKind::BlockBoundary]);
        assert!(filter.map(JournalEvent::boundary(r(b"b"))).is_some());
        assert!(filter.map(JournalEvent::insert(r(b"i"))).is_none());
    }
}
