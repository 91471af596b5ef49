use uuid::Uuid;

/// Source of globally unique identifiers for events and variations.
pub trait IdentifierGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// UUID v7 identifiers: millisecond timestamp prefix plus random bits.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeOrderedIds;

impl IdentifierGenerator for TimeOrderedIds {
    fn generate(&self) -> String {
        Uuid::now_v7().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn identifiers_do_not_repeat() {
        let ids: HashSet<String> = (0..1000).map(|_| TimeOrderedIds.generate()).collect();
        assert_eq!(ids.len(), 1000);
    }
}
